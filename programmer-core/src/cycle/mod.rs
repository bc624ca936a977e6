//! One programming cycle, from power-on settle to restart or halt.
//!
//! ```text
//! settle -> bring-up -> apply -> commit -> verify -> signal -> reboot | halt
//! ```
//!
//! Bring-up failure skips straight to signalling; nothing is written to a
//! controller that did not answer. Every later step always runs, so a single
//! cycle reports every mismatch it can observe.

use core::fmt;

use crate::clock::BlockingClock;
use crate::config::ProgrammerConfig;
use crate::driver::{ControllerSession, PdController};
use crate::profile::DesiredProfile;
use crate::reboot::{RebootError, RebootScheduler, SystemRestart};
use crate::sequencer;
use crate::status::{Indicator, SignalState, StatusSignal, TransitionError};
use crate::telemetry::{CycleEvent, CycleObserver, SettlePhase};
use crate::verify::{self, VerificationResult};

/// Why a cycle did not end in success.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleError {
    /// The controller did not respond to bring-up.
    Initialization,
    /// Read-back disagreed with the desired profile, or was unavailable.
    Verification(VerificationResult),
}

impl CycleError {
    /// Status the indicator shows for this failure.
    #[must_use]
    pub const fn signal_state(&self) -> SignalState {
        match self {
            CycleError::Initialization => SignalState::InitFailure,
            CycleError::Verification(_) => SignalState::VerifyFailure,
        }
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Initialization => f.write_str("controller bring-up failed"),
            CycleError::Verification(result) if !result.is_readable() => {
                f.write_str("verification failed: read-back unavailable")
            }
            CycleError::Verification(result) => write!(
                f,
                "verification failed: {} field(s) mismatched",
                result.mismatch_count()
            ),
        }
    }
}

/// Verified result of a cycle, or the reason it failed.
pub type CycleOutcome = Result<VerificationResult, CycleError>;

/// Status the indicator shows for `outcome`.
#[must_use]
pub const fn outcome_state(outcome: &CycleOutcome) -> SignalState {
    match outcome {
        Ok(_) => SignalState::Success,
        Err(error) => error.signal_state(),
    }
}

/// Drives one programming cycle against a [`PdController`].
pub struct ProgrammingCycle<C, O> {
    config: ProgrammerConfig,
    profile: DesiredProfile,
    clock: C,
    observer: O,
}

impl<C, O> ProgrammingCycle<C, O>
where
    C: BlockingClock,
    O: CycleObserver,
{
    #[must_use]
    pub const fn new(config: ProgrammerConfig, profile: DesiredProfile, clock: C, observer: O) -> Self {
        Self {
            config,
            profile,
            clock,
            observer,
        }
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[must_use]
    pub fn observer(&self) -> &O {
        &self.observer
    }

    #[must_use]
    pub fn into_parts(self) -> (C, O) {
        (self.clock, self.observer)
    }

    /// Runs settle, bring-up, apply, commit and verify.
    ///
    /// The driver is handed back in every case so the caller can release the
    /// bus or run another cycle on it.
    pub fn execute<D: PdController>(&mut self, driver: D) -> (CycleOutcome, D) {
        sequencer::settle(
            &mut self.clock,
            &mut self.observer,
            SettlePhase::Startup,
            self.config.startup_settle,
        );

        self.observer.record(CycleEvent::BringUpStarted {
            address: self.config.bus.address,
        });
        let mut session = match ControllerSession::open(driver) {
            Ok(session) => session,
            Err(error) => {
                self.observer.record(CycleEvent::BringUpFailed(error.fault()));
                return (Err(CycleError::Initialization), error.driver);
            }
        };
        self.observer.record(CycleEvent::BringUpComplete);

        sequencer::apply_profile(&mut session, &self.profile, &mut self.observer);
        sequencer::commit(
            &mut session,
            &self.config.commit,
            &mut self.clock,
            &mut self.observer,
        );
        let result = verify::run(&mut session, &self.profile, &mut self.observer);

        let outcome = if result.passed() {
            Ok(result)
        } else {
            Err(CycleError::Verification(result))
        };
        (outcome, session.into_driver())
    }

    /// Moves `status` into the state matching `outcome`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if `status` already left Idle.
    pub fn signal<I: Indicator>(
        &mut self,
        status: &mut StatusSignal<I>,
        outcome: &CycleOutcome,
    ) -> Result<SignalState, TransitionError> {
        let next = outcome_state(outcome);
        status.enter(next)?;
        self.observer.record(CycleEvent::SignalChanged(next));
        Ok(next)
    }

    /// Holds the success indication, then restarts through `restart`.
    ///
    /// # Errors
    ///
    /// Returns [`RebootError::NotArmed`] unless `status` shows success.
    pub fn reboot<I, R>(&mut self, status: &StatusSignal<I>, restart: &mut R) -> Result<(), RebootError>
    where
        I: Indicator,
        R: SystemRestart,
    {
        let armed = RebootScheduler::new(self.config.reboot).arm(status)?;
        armed.fire(&mut self.clock, restart, &mut self.observer);
        Ok(())
    }

    /// Final step of the firmware: restart on success, otherwise show the
    /// failure pattern forever.
    ///
    /// Also halts if `restart` returns, keeping the last indication visible.
    pub fn conclude<I, R>(mut self, status: StatusSignal<I>, mut restart: R) -> !
    where
        I: Indicator,
        R: SystemRestart,
    {
        if status.state() == SignalState::Success {
            // A refused reboot leaves the solid indication up.
            let _ = self.reboot(&status, &mut restart);
        }
        status.halt(&mut self.clock)
    }
}

#[cfg(test)]
mod tests {
    use std::string::ToString;

    use super::*;

    #[test]
    fn outcome_maps_to_signal_state() {
        let passed: CycleOutcome = Ok(VerificationResult::unreadable());
        assert_eq!(outcome_state(&passed), SignalState::Success);
        assert_eq!(
            outcome_state(&Err(CycleError::Initialization)),
            SignalState::InitFailure
        );
        assert_eq!(
            outcome_state(&Err(CycleError::Verification(VerificationResult::unreadable()))),
            SignalState::VerifyFailure
        );
    }

    #[test]
    fn unreadable_verification_explains_itself() {
        let error = CycleError::Verification(VerificationResult::unreadable());
        assert_eq!(error.to_string(), "verification failed: read-back unavailable");
        assert_eq!(
            CycleError::Initialization.to_string(),
            "controller bring-up failed"
        );
    }
}
