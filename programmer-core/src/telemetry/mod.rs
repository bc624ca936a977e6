//! Cycle event catalog and the in-memory recorder shared by firmware and host.
//!
//! Every step of a programming cycle reports a [`CycleEvent`] to a
//! [`CycleObserver`]. The firmware forwards events to defmt, the emulator
//! prints them, and tests capture them in a [`CycleLog`] to assert on the
//! exact sequence of steps taken.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::driver::DriverFault;
use crate::status::SignalState;
use crate::verify::FieldCheck;

/// Number of events a [`CycleLog`] retains by default.
///
/// One full cycle produces roughly thirty events; the default keeps two.
pub const CYCLE_LOG_CAPACITY: usize = 64;

/// Waits the cycle performs, tagged so logs show which one is in progress.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettlePhase {
    Startup,
    Store,
    SoftReset,
    RebootDwell,
    RebootFlush,
}

impl fmt::Display for SettlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlePhase::Startup => f.write_str("startup"),
            SettlePhase::Store => f.write_str("store"),
            SettlePhase::SoftReset => f.write_str("soft-reset"),
            SettlePhase::RebootDwell => f.write_str("reboot-dwell"),
            SettlePhase::RebootFlush => f.write_str("reboot-flush"),
        }
    }
}

/// Bus operations whose failure is logged without aborting the cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusStage {
    Store,
    SoftReset,
    Reload,
}

impl fmt::Display for BusStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusStage::Store => f.write_str("store write"),
            BusStage::SoftReset => f.write_str("soft reset"),
            BusStage::Reload => f.write_str("read-back reload"),
        }
    }
}

/// Discrete steps of a programming cycle.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleEvent {
    Settling { phase: SettlePhase, millis: u32 },
    BringUpStarted { address: u8 },
    BringUpComplete,
    BringUpFailed(DriverFault),
    ProfileApplied { fields: u8 },
    StoreWritten,
    SoftResetIssued,
    BusFault { stage: BusStage, fault: DriverFault },
    FieldChecked(FieldCheck),
    VerificationPassed,
    VerificationFailed { mismatches: u8 },
    ReadbackUnavailable,
    SignalChanged(SignalState),
    RebootScheduled { dwell_ms: u32 },
    Restarting,
}

impl CycleEvent {
    /// Returns `true` for events that describe a failure.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        match self {
            CycleEvent::BringUpFailed(_)
            | CycleEvent::BusFault { .. }
            | CycleEvent::VerificationFailed { .. }
            | CycleEvent::ReadbackUnavailable => true,
            CycleEvent::FieldChecked(check) => !check.matched,
            _ => false,
        }
    }
}

impl fmt::Display for CycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleEvent::Settling { phase, millis } => write!(f, "settle {phase} {millis} ms"),
            CycleEvent::BringUpStarted { address } => {
                write!(f, "bring-up controller at {address:#04x}")
            }
            CycleEvent::BringUpComplete => f.write_str("controller initialized"),
            CycleEvent::BringUpFailed(fault) => write!(f, "controller bring-up failed: {fault}"),
            CycleEvent::ProfileApplied { fields } => write!(f, "applied {fields} fields"),
            CycleEvent::StoreWritten => f.write_str("profile written to NVM"),
            CycleEvent::SoftResetIssued => f.write_str("soft reset issued"),
            CycleEvent::BusFault { stage, fault } => {
                write!(f, "bus fault during {stage}: {fault}")
            }
            CycleEvent::FieldChecked(check) => write!(f, "{check}"),
            CycleEvent::VerificationPassed => f.write_str("verification passed"),
            CycleEvent::VerificationFailed { mismatches } => {
                write!(f, "verification failed: {mismatches} mismatched")
            }
            CycleEvent::ReadbackUnavailable => f.write_str("read-back unavailable"),
            CycleEvent::SignalChanged(state) => write!(f, "status {state}"),
            CycleEvent::RebootScheduled { dwell_ms } => write!(f, "reboot in {dwell_ms} ms"),
            CycleEvent::Restarting => f.write_str("restarting"),
        }
    }
}

/// Sink for cycle events.
pub trait CycleObserver {
    fn record(&mut self, event: CycleEvent);
}

impl<T: CycleObserver + ?Sized> CycleObserver for &mut T {
    fn record(&mut self, event: CycleEvent) {
        (**self).record(event);
    }
}

/// Fixed-capacity history of the most recent cycle events.
pub struct CycleLog<const CAPACITY: usize = CYCLE_LOG_CAPACITY> {
    ring: HistoryBuf<CycleEvent, CAPACITY>,
}

impl<const CAPACITY: usize> CycleLog<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
        }
    }

    /// Returns an iterator over the retained events in chronological order.
    #[must_use]
    pub fn oldest_first(&self) -> OldestOrdered<'_, CycleEvent> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[must_use]
    pub fn contains(&self, event: &CycleEvent) -> bool {
        self.oldest_first().any(|recorded| recorded == event)
    }

    /// Number of retained events that describe a failure.
    #[must_use]
    pub fn fault_count(&self) -> usize {
        self.oldest_first().filter(|event| event.is_fault()).count()
    }
}

impl<const CAPACITY: usize> Default for CycleLog<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> CycleObserver for CycleLog<CAPACITY> {
    fn record(&mut self, event: CycleEvent) {
        self.ring.write(event);
    }
}
