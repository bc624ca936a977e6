use core::fmt;
use core::time::Duration;

use programmer_core::config::{ProgrammerConfig, SignalTiming};
use programmer_core::cycle::{CycleError, ProgrammingCycle};
use programmer_core::driver::{DriverError, DriverFault, PdController};
use programmer_core::profile::{
    DESIRED_PROFILE, FIELD_COUNT, PdoIndex, PdoSetting, PowerProfile, ProfileField,
};
use programmer_core::reboot::{RebootError, SystemRestart};
use programmer_core::status::{Indicator, SignalState, StatusSignal};
use programmer_core::telemetry::{BusStage, CycleEvent, CycleLog, SettlePhase};

const FACTORY_PROFILE: PowerProfile = PowerProfile {
    pdo_count: 3,
    pdos: [
        PdoSetting::fixed_supply(1.5, 20),
        PdoSetting::new(15.0, 1.5, 15, 20),
        PdoSetting::new(20.0, 1.0, 15, 20),
    ],
    external_power_only: false,
    usb_comm_capable: false,
    config_ok_mode: 2,
    power_above_5v_only: false,
};

#[test]
fn healthy_controller_ends_in_success_and_reboots_after_dwell() {
    let mut cycle = build_cycle();
    let mut status = StatusSignal::new(MockLed::default(), SignalTiming::DEFAULT);
    let controller = MockController::new().with_store_quirk(quantize);

    let (outcome, controller) = cycle.execute(controller);

    let result = outcome.expect("quantized read-back stays within tolerance");
    assert_eq!(result.mismatch_count(), 0);
    assert_eq!(controller.calls.setters, FIELD_COUNT);
    assert_eq!(controller.calls.commits, 1);
    assert_eq!(controller.calls.resets, 1);
    assert_eq!(cycle.clock().elapsed, Duration::from_millis(1_500 + 50 + 750));

    let state = cycle
        .signal(&mut status, &Ok(result))
        .expect("idle accepts success");
    assert_eq!(state, SignalState::Success);
    assert_eq!(status.indicator().levels.last(), Some(&true));

    let before_reboot = cycle.clock().elapsed;
    let mut restart = MockRestart::default();
    cycle
        .reboot(&status, &mut restart)
        .expect("success arms the reboot");
    assert_eq!(restart.requests, 1);
    assert_eq!(
        cycle.clock().elapsed - before_reboot,
        Duration::from_millis(10_100)
    );
    assert!(cycle.observer().contains(&CycleEvent::RebootScheduled { dwell_ms: 10_000 }));
    assert!(cycle.observer().contains(&CycleEvent::Settling {
        phase: SettlePhase::RebootDwell,
        millis: 10_000,
    }));
}

#[test]
fn commit_waits_are_taken_in_order() {
    let mut cycle = build_cycle();
    let _ = cycle.execute(MockController::new());

    let settles: Vec<_> = cycle
        .observer()
        .oldest_first()
        .filter_map(|event| match event {
            CycleEvent::Settling { phase, millis } => Some((*phase, *millis)),
            _ => None,
        })
        .collect();
    assert_eq!(
        settles,
        vec![
            (SettlePhase::Startup, 1_500),
            (SettlePhase::Store, 50),
            (SettlePhase::SoftReset, 750),
        ]
    );
}

#[test]
fn unresponsive_controller_blinks_fast_and_is_never_configured() {
    let mut cycle = build_cycle();
    let mut status = StatusSignal::new(MockLed::default(), SignalTiming::DEFAULT);
    let controller = MockController::new().unresponsive();

    let (outcome, controller) = cycle.execute(controller);

    assert_eq!(outcome, Err(CycleError::Initialization));
    assert_eq!(controller.calls.inits, 1);
    assert_eq!(controller.calls.setters, 0);
    assert_eq!(controller.calls.commits, 0);
    assert_eq!(controller.calls.resets, 0);
    assert_eq!(controller.calls.reloads, 0);
    assert!(
        cycle
            .observer()
            .contains(&CycleEvent::BringUpFailed(DriverFault::NoAcknowledge))
    );
    assert!(!cycle.observer().contains(&CycleEvent::BringUpComplete));

    let state = cycle
        .signal(&mut status, &outcome)
        .expect("idle accepts init failure");
    assert_eq!(state, SignalState::InitFailure);

    let mut blink_clock = RecordingClock::default();
    status.render(&mut blink_clock, 3);
    assert_eq!(blink_clock.waits, vec![Duration::from_millis(100); 6]);
    assert!(
        status
            .indicator()
            .levels
            .ends_with(&[true, false, true, false, true, false])
    );

    let mut restart = MockRestart::default();
    assert_eq!(
        cycle.reboot(&status, &mut restart),
        Err(RebootError::NotArmed(SignalState::InitFailure))
    );
    assert_eq!(restart.requests, 0);
}

#[test]
fn dropped_pdo_count_blinks_slow_and_never_reboots() {
    let mut cycle = build_cycle();
    let mut status = StatusSignal::new(MockLed::default(), SignalTiming::DEFAULT);
    let controller = MockController::new().with_store_quirk(|store| store.pdo_count = 2);

    let (outcome, _) = cycle.execute(controller);

    let result = match outcome {
        Err(CycleError::Verification(result)) => result,
        other => panic!("unexpected outcome: {other:?}"),
    };
    let mismatches: Vec<_> = result.mismatches().map(|check| check.field).collect();
    assert_eq!(mismatches, vec![ProfileField::PdoCount]);

    let state = cycle
        .signal(&mut status, &Err(CycleError::Verification(result)))
        .expect("idle accepts verify failure");
    assert_eq!(state, SignalState::VerifyFailure);

    let mut blink_clock = RecordingClock::default();
    status.render(&mut blink_clock, 2);
    assert_eq!(blink_clock.waits, vec![Duration::from_millis(1_000); 4]);

    let mut restart = MockRestart::default();
    assert!(cycle.reboot(&status, &mut restart).is_err());
    assert_eq!(restart.requests, 0);
}

#[test]
fn verification_reports_every_mismatch() {
    let mut cycle = build_cycle();
    let controller = MockController::new().with_store_quirk(|store| {
        store.pdo_count = 2;
        store.pdo_mut(PdoIndex::Pdo3).current = 3.0;
        store.config_ok_mode = 0;
    });

    let (outcome, _) = cycle.execute(controller);

    let Err(CycleError::Verification(result)) = outcome else {
        panic!("expected a verification failure");
    };
    assert_eq!(result.checks().len(), FIELD_COUNT);
    let mismatches: Vec<_> = result.mismatches().map(|check| check.field).collect();
    assert_eq!(
        mismatches,
        vec![
            ProfileField::PdoCount,
            ProfileField::Current(PdoIndex::Pdo3),
            ProfileField::ConfigOkMode,
        ]
    );

    let checked = cycle
        .observer()
        .oldest_first()
        .filter(|event| matches!(event, CycleEvent::FieldChecked(_)))
        .count();
    assert_eq!(checked, FIELD_COUNT);
    assert!(cycle.observer().contains(&CycleEvent::VerificationFailed { mismatches: 3 }));
}

#[test]
fn consecutive_cycles_produce_identical_results() {
    let mut first_cycle = build_cycle();
    let controller = MockController::new().with_store_quirk(quantize);
    let (first, controller) = first_cycle.execute(controller);

    let mut second_cycle = build_cycle();
    let (second, controller) = second_cycle.execute(controller);

    assert!(first.is_ok());
    assert_eq!(first, second);
    assert_eq!(controller.calls.commits, 2);
    assert_eq!(controller.store, {
        let mut expected = DESIRED_PROFILE;
        quantize(&mut expected);
        expected
    });
}

#[test]
fn store_fault_is_caught_by_verification() {
    let mut cycle = build_cycle();
    let mut controller = MockController::new();
    controller.fail_store = true;

    let (outcome, controller) = cycle.execute(controller);

    assert_eq!(controller.calls.resets, 1, "commit continues after a store fault");
    assert!(cycle.observer().contains(&CycleEvent::BusFault {
        stage: BusStage::Store,
        fault: DriverFault::NoAcknowledge,
    }));
    let Err(CycleError::Verification(result)) = outcome else {
        panic!("factory profile must not verify");
    };
    assert!(result.mismatch_count() > 0);
}

#[test]
fn unreadable_controller_is_a_verification_failure() {
    let mut cycle = build_cycle();
    let mut controller = MockController::new();
    controller.fail_reload = true;

    let (outcome, _) = cycle.execute(controller);

    let Err(CycleError::Verification(result)) = outcome else {
        panic!("expected a verification failure");
    };
    assert!(!result.is_readable());
    assert!(cycle.observer().contains(&CycleEvent::BusFault {
        stage: BusStage::Reload,
        fault: DriverFault::NoAcknowledge,
    }));
    assert!(cycle.observer().contains(&CycleEvent::ReadbackUnavailable));
}

fn build_cycle() -> ProgrammingCycle<VirtualClock, CycleLog<64>> {
    ProgrammingCycle::new(
        ProgrammerConfig::DEFAULT,
        DESIRED_PROFILE,
        VirtualClock::default(),
        CycleLog::new(),
    )
}

/// Store-side rounding that stays inside the comparison tolerance.
fn quantize(store: &mut PowerProfile) {
    store.pdo_mut(PdoIndex::Pdo2).voltage -= 0.005;
    store.pdo_mut(PdoIndex::Pdo2).current += 0.004;
    store.pdo_mut(PdoIndex::Pdo3).voltage += 0.005;
    store.pdo_mut(PdoIndex::Pdo3).current -= 0.006;
}

#[derive(Debug)]
struct MockBusError;

impl fmt::Display for MockBusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("mock bus error")
    }
}

impl DriverError for MockBusError {
    fn fault(&self) -> DriverFault {
        DriverFault::NoAcknowledge
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct CallCounts {
    inits: usize,
    setters: usize,
    commits: usize,
    resets: usize,
    reloads: usize,
}

/// Controller with a volatile shadow and a persistent store.
///
/// Setters write the shadow, commit copies it to the store through an
/// optional quirk, reload copies the store back.
#[derive(Debug)]
struct MockController {
    responds: bool,
    fail_store: bool,
    fail_reload: bool,
    store_quirk: Option<fn(&mut PowerProfile)>,
    shadow: PowerProfile,
    store: PowerProfile,
    calls: CallCounts,
}

impl MockController {
    fn new() -> Self {
        Self {
            responds: true,
            fail_store: false,
            fail_reload: false,
            store_quirk: None,
            shadow: FACTORY_PROFILE,
            store: FACTORY_PROFILE,
            calls: CallCounts::default(),
        }
    }

    fn unresponsive(mut self) -> Self {
        self.responds = false;
        self
    }

    fn with_store_quirk(mut self, quirk: fn(&mut PowerProfile)) -> Self {
        self.store_quirk = Some(quirk);
        self
    }

    fn staged(&mut self) -> &mut PowerProfile {
        self.calls.setters += 1;
        &mut self.shadow
    }
}

impl PdController for MockController {
    type Error = MockBusError;

    fn initialize(&mut self) -> Result<(), MockBusError> {
        self.calls.inits += 1;
        if !self.responds {
            return Err(MockBusError);
        }
        self.shadow = self.store;
        Ok(())
    }

    fn set_pdo_count(&mut self, count: u8) {
        self.staged().pdo_count = count;
    }

    fn set_voltage(&mut self, pdo: PdoIndex, volts: f32) {
        self.staged().pdo_mut(pdo).voltage = volts;
    }

    fn set_current(&mut self, pdo: PdoIndex, amps: f32) {
        self.staged().pdo_mut(pdo).current = amps;
    }

    fn set_lower_limit(&mut self, pdo: PdoIndex, percent: u8) {
        self.staged().pdo_mut(pdo).lower_limit_pct = percent;
    }

    fn set_upper_limit(&mut self, pdo: PdoIndex, percent: u8) {
        self.staged().pdo_mut(pdo).upper_limit_pct = percent;
    }

    fn set_external_power_only(&mut self, enabled: bool) {
        self.staged().external_power_only = enabled;
    }

    fn set_usb_comm_capable(&mut self, enabled: bool) {
        self.staged().usb_comm_capable = enabled;
    }

    fn set_config_ok_mode(&mut self, mode: u8) {
        self.staged().config_ok_mode = mode;
    }

    fn set_power_above_5v_only(&mut self, enabled: bool) {
        self.staged().power_above_5v_only = enabled;
    }

    fn commit_to_store(&mut self) -> Result<(), MockBusError> {
        self.calls.commits += 1;
        if self.fail_store {
            return Err(MockBusError);
        }
        let mut persisted = self.shadow;
        if let Some(quirk) = self.store_quirk {
            quirk(&mut persisted);
        }
        self.store = persisted;
        Ok(())
    }

    fn soft_reset(&mut self) -> Result<(), MockBusError> {
        self.calls.resets += 1;
        Ok(())
    }

    fn reload(&mut self) -> Result<(), MockBusError> {
        self.calls.reloads += 1;
        if self.fail_reload {
            return Err(MockBusError);
        }
        self.shadow = self.store;
        Ok(())
    }

    fn pdo_count(&self) -> u8 {
        self.shadow.pdo_count
    }

    fn voltage(&self, pdo: PdoIndex) -> f32 {
        self.shadow.pdo(pdo).voltage
    }

    fn current(&self, pdo: PdoIndex) -> f32 {
        self.shadow.pdo(pdo).current
    }

    fn lower_limit(&self, pdo: PdoIndex) -> u8 {
        self.shadow.pdo(pdo).lower_limit_pct
    }

    fn upper_limit(&self, pdo: PdoIndex) -> u8 {
        self.shadow.pdo(pdo).upper_limit_pct
    }

    fn external_power_only(&self) -> bool {
        self.shadow.external_power_only
    }

    fn usb_comm_capable(&self) -> bool {
        self.shadow.usb_comm_capable
    }

    fn config_ok_mode(&self) -> u8 {
        self.shadow.config_ok_mode
    }

    fn power_above_5v_only(&self) -> bool {
        self.shadow.power_above_5v_only
    }
}

#[derive(Default)]
struct VirtualClock {
    elapsed: Duration,
}

impl programmer_core::clock::BlockingClock for VirtualClock {
    fn wait(&mut self, duration: Duration) {
        self.elapsed += duration;
    }
}

#[derive(Default)]
struct RecordingClock {
    waits: Vec<Duration>,
}

impl programmer_core::clock::BlockingClock for RecordingClock {
    fn wait(&mut self, duration: Duration) {
        self.waits.push(duration);
    }
}

#[derive(Default)]
struct MockLed {
    levels: Vec<bool>,
}

impl Indicator for MockLed {
    fn set_lit(&mut self, lit: bool) {
        self.levels.push(lit);
    }
}

#[derive(Default)]
struct MockRestart {
    requests: usize,
}

impl SystemRestart for MockRestart {
    fn restart(&mut self) {
        self.requests += 1;
    }
}
