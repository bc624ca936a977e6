//! Delayed restart after a successful cycle.
//!
//! A reboot can only be armed from a status signal showing
//! [`SignalState::Success`]. Once armed it holds the success indication for
//! the dwell time, waits a short flush margin so pending log output drains,
//! and then asks the platform to restart.

use core::fmt;

use crate::clock::{BlockingClock, as_millis_u32};
use crate::config::RebootTiming;
use crate::sequencer::settle;
use crate::status::{Indicator, SignalState, StatusSignal};
use crate::telemetry::{CycleEvent, CycleObserver, SettlePhase};

/// Platform hook that restarts the device.
///
/// On hardware this never returns. Host implementations record the request
/// and return, which lets the caller start the next cycle.
pub trait SystemRestart {
    fn restart(&mut self);
}

impl<T: SystemRestart + ?Sized> SystemRestart for &mut T {
    fn restart(&mut self) {
        (**self).restart();
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RebootError {
    /// The status signal is not in [`SignalState::Success`].
    NotArmed(SignalState),
}

impl fmt::Display for RebootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebootError::NotArmed(state) => write!(f, "reboot refused in {state} state"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RebootScheduler {
    timing: RebootTiming,
}

impl RebootScheduler {
    #[must_use]
    pub const fn new(timing: RebootTiming) -> Self {
        Self { timing }
    }

    /// Arms a reboot if `signal` shows success.
    ///
    /// # Errors
    ///
    /// Returns [`RebootError::NotArmed`] in any other state.
    pub fn arm<I: Indicator>(&self, signal: &StatusSignal<I>) -> Result<ArmedReboot, RebootError> {
        match signal.state() {
            SignalState::Success => Ok(ArmedReboot {
                timing: self.timing,
            }),
            other => Err(RebootError::NotArmed(other)),
        }
    }
}

/// A reboot that is allowed to fire.
#[derive(Debug, Eq, PartialEq)]
#[must_use = "an armed reboot does nothing until fired"]
pub struct ArmedReboot {
    timing: RebootTiming,
}

impl ArmedReboot {
    /// Dwells, flushes, then restarts through `restart`.
    pub fn fire<C, R, O>(self, clock: &mut C, restart: &mut R, observer: &mut O)
    where
        C: BlockingClock,
        R: SystemRestart,
        O: CycleObserver,
    {
        let RebootTiming { dwell, flush } = self.timing;
        observer.record(CycleEvent::RebootScheduled {
            dwell_ms: as_millis_u32(dwell),
        });
        settle(clock, observer, SettlePhase::RebootDwell, dwell);

        observer.record(CycleEvent::Restarting);
        settle(clock, observer, SettlePhase::RebootFlush, flush);

        restart.restart();
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;
    use core::time::Duration;

    use super::*;
    use crate::config::SignalTiming;
    use crate::telemetry::CycleLog;

    struct Dark;

    impl Indicator for Dark {
        fn set_lit(&mut self, _lit: bool) {}
    }

    struct VirtualClock<'a>(&'a Cell<Duration>);

    impl BlockingClock for VirtualClock<'_> {
        fn wait(&mut self, duration: Duration) {
            self.0.set(self.0.get() + duration);
        }
    }

    struct RecordingRestart<'a> {
        now: &'a Cell<Duration>,
        requested_at: Option<Duration>,
    }

    impl SystemRestart for RecordingRestart<'_> {
        fn restart(&mut self) {
            self.requested_at = Some(self.now.get());
        }
    }

    #[test]
    fn arming_requires_success() {
        let scheduler = RebootScheduler::new(RebootTiming::DEFAULT);
        let mut signal = StatusSignal::new(Dark, SignalTiming::DEFAULT);
        assert_eq!(
            scheduler.arm(&signal),
            Err(RebootError::NotArmed(SignalState::Idle))
        );

        signal.enter(SignalState::VerifyFailure).expect("first transition");
        assert_eq!(
            scheduler.arm(&signal),
            Err(RebootError::NotArmed(SignalState::VerifyFailure))
        );
    }

    #[test]
    fn fire_waits_dwell_and_flush_before_restarting() {
        let scheduler = RebootScheduler::new(RebootTiming::DEFAULT);
        let mut signal = StatusSignal::new(Dark, SignalTiming::DEFAULT);
        signal.enter(SignalState::Success).expect("first transition");
        let armed = scheduler.arm(&signal).expect("success arms the reboot");

        let now = Cell::new(Duration::ZERO);
        let mut clock = VirtualClock(&now);
        let mut restart = RecordingRestart {
            now: &now,
            requested_at: None,
        };
        let mut log = CycleLog::<8>::new();
        armed.fire(&mut clock, &mut restart, &mut log);

        assert_eq!(restart.requested_at, Some(Duration::from_millis(10_100)));
        let events: std::vec::Vec<_> = log.oldest_first().copied().collect();
        assert_eq!(
            events,
            [
                CycleEvent::RebootScheduled { dwell_ms: 10_000 },
                CycleEvent::Settling {
                    phase: SettlePhase::RebootDwell,
                    millis: 10_000,
                },
                CycleEvent::Restarting,
                CycleEvent::Settling {
                    phase: SettlePhase::RebootFlush,
                    millis: 100,
                },
            ]
        );
        assert_eq!(log.fault_count(), 0);
    }
}
