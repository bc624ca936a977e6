//! Compile-time configuration for a programming cycle.
//!
//! Every timing value here is an empirically chosen safety margin. The
//! controller gives no completion signal for NVM writes or soft resets, so
//! the cycle over-waits instead of polling.

use core::time::Duration;

/// Settle time after bring-up of the board before the bus is touched.
pub const STARTUP_SETTLE: Duration = Duration::from_millis(1_500);

/// I2C settings for the PD controller.
///
/// Pin assignment is board wiring and lives with the peripherals in the
/// firmware.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BusConfig {
    /// 7-bit controller address.
    pub address: u8,
    pub frequency_hz: u32,
}

impl BusConfig {
    pub const DEFAULT: Self = Self {
        address: 0x28,
        frequency_hz: 100_000,
    };
}

/// Delays inserted around the commit of a profile.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CommitTiming {
    /// Wait after persisting to the non-volatile store.
    pub store_settle: Duration,
    /// Wait after the soft reset before any read-back.
    pub reset_settle: Duration,
}

impl CommitTiming {
    pub const DEFAULT: Self = Self {
        store_settle: Duration::from_millis(50),
        reset_settle: Duration::from_millis(750),
    };
}

/// Half-periods of the failure blink patterns.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SignalTiming {
    pub init_failure_blink: Duration,
    pub verify_failure_blink: Duration,
}

impl SignalTiming {
    pub const DEFAULT: Self = Self {
        init_failure_blink: Duration::from_millis(100),
        verify_failure_blink: Duration::from_millis(1_000),
    };
}

/// Timing of the restart that follows a successful cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RebootTiming {
    /// How long the solid success indication stays visible.
    pub dwell: Duration,
    /// Extra margin so the last log lines leave the device.
    pub flush: Duration,
}

impl RebootTiming {
    pub const DEFAULT: Self = Self {
        dwell: Duration::from_secs(10),
        flush: Duration::from_millis(100),
    };
}

/// Aggregate configuration consumed by [`ProgrammingCycle`](crate::cycle::ProgrammingCycle).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ProgrammerConfig {
    pub bus: BusConfig,
    pub commit: CommitTiming,
    pub signal: SignalTiming,
    pub reboot: RebootTiming,
    pub startup_settle: Duration,
}

impl ProgrammerConfig {
    pub const DEFAULT: Self = Self {
        bus: BusConfig::DEFAULT,
        commit: CommitTiming::DEFAULT,
        signal: SignalTiming::DEFAULT,
        reboot: RebootTiming::DEFAULT,
        startup_settle: STARTUP_SETTLE,
    };
}

impl Default for ProgrammerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
