//! Applies a profile to an initialized controller and commits it.
//!
//! Setters only stage values in the driver's shadow. [`commit`] persists the
//! shadow, soft-resets the controller so it renegotiates with the new
//! configuration, and waits a fixed margin after each step because the
//! controller never reports completion.

use core::time::Duration;

use crate::clock::{BlockingClock, as_millis_u32};
use crate::config::CommitTiming;
use crate::driver::{ControllerSession, DriverError, PdController};
use crate::profile::{FIELD_COUNT, FIELD_ORDER, PowerProfile, ProfileField};
use crate::telemetry::{BusStage, CycleEvent, CycleObserver, SettlePhase};

/// Stages a single field of `profile` on the driver.
pub fn apply_field<D: PdController>(driver: &mut D, profile: &PowerProfile, field: ProfileField) {
    match field {
        ProfileField::PdoCount => driver.set_pdo_count(profile.pdo_count),
        ProfileField::Voltage(pdo) => driver.set_voltage(pdo, profile.pdo(pdo).voltage),
        ProfileField::Current(pdo) => driver.set_current(pdo, profile.pdo(pdo).current),
        ProfileField::LowerLimit(pdo) => {
            driver.set_lower_limit(pdo, profile.pdo(pdo).lower_limit_pct);
        }
        ProfileField::UpperLimit(pdo) => {
            driver.set_upper_limit(pdo, profile.pdo(pdo).upper_limit_pct);
        }
        ProfileField::ExternalPowerOnly => {
            driver.set_external_power_only(profile.external_power_only);
        }
        ProfileField::UsbCommCapable => driver.set_usb_comm_capable(profile.usb_comm_capable),
        ProfileField::ConfigOkMode => driver.set_config_ok_mode(profile.config_ok_mode),
        ProfileField::PowerAbove5vOnly => {
            driver.set_power_above_5v_only(profile.power_above_5v_only);
        }
    }
}

/// Issues every setter in [`FIELD_ORDER`].
///
/// The setters report nothing; a field the controller refused surfaces as a
/// mismatch at verification.
pub fn apply_profile<D, O>(session: &mut ControllerSession<D>, profile: &PowerProfile, observer: &mut O)
where
    D: PdController,
    O: CycleObserver,
{
    let driver = session.driver_mut();
    for field in FIELD_ORDER {
        apply_field(driver, profile, field);
    }
    #[allow(clippy::cast_possible_truncation)]
    observer.record(CycleEvent::ProfileApplied {
        fields: FIELD_COUNT as u8,
    });
}

/// Persists the staged profile, then soft-resets the controller.
///
/// A bus fault is reported and does not stop the commit; whatever state the
/// controller ended up in is judged by the read-back that follows. Both
/// settle waits are always taken, so the read-back never races a write that
/// may still be in flight.
pub fn commit<D, C, O>(
    session: &mut ControllerSession<D>,
    timing: &CommitTiming,
    clock: &mut C,
    observer: &mut O,
)
where
    D: PdController,
    C: BlockingClock,
    O: CycleObserver,
{
    match session.driver_mut().commit_to_store() {
        Ok(()) => observer.record(CycleEvent::StoreWritten),
        Err(error) => observer.record(CycleEvent::BusFault {
            stage: BusStage::Store,
            fault: error.fault(),
        }),
    }
    settle(clock, observer, SettlePhase::Store, timing.store_settle);

    match session.driver_mut().soft_reset() {
        Ok(()) => observer.record(CycleEvent::SoftResetIssued),
        Err(error) => observer.record(CycleEvent::BusFault {
            stage: BusStage::SoftReset,
            fault: error.fault(),
        }),
    }
    settle(clock, observer, SettlePhase::SoftReset, timing.reset_settle);
}

/// Waits `duration` on `clock` and reports it.
pub fn settle<C, O>(clock: &mut C, observer: &mut O, phase: SettlePhase, duration: Duration)
where
    C: BlockingClock,
    O: CycleObserver,
{
    observer.record(CycleEvent::Settling {
        phase,
        millis: as_millis_u32(duration),
    });
    clock.wait(duration);
}
