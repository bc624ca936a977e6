//! Blocking time source used for every settle delay and blink period.

use core::time::Duration;

/// Blocks the caller for a fixed duration.
///
/// The firmware backs this with a busy wait on the hardware timer; tests and
/// the emulator use a virtual clock that only accumulates elapsed time.
pub trait BlockingClock {
    fn wait(&mut self, duration: Duration);
}

impl<T: BlockingClock + ?Sized> BlockingClock for &mut T {
    fn wait(&mut self, duration: Duration) {
        (**self).wait(duration);
    }
}

/// Saturating conversion used when durations are reported as milliseconds.
#[must_use]
pub fn as_millis_u32(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}
