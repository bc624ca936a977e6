//! Status indicator state machine.
//!
//! The indicator starts dark in [`SignalState::Idle`] and moves exactly once
//! into one of three absorbing states. Each state maps to a fixed
//! [`IndicatorPattern`]; [`StatusSignal::render`] drives the pattern on the
//! physical output for a number of periods.

use core::fmt;
use core::time::Duration;

use crate::clock::BlockingClock;
use crate::config::SignalTiming;

/// Interval between re-asserting a steady pattern while halted.
pub const PARK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignalState {
    /// Bring-up or programming still in progress.
    Idle,
    /// Profile committed and verified.
    Success,
    /// The controller could not be brought up.
    InitFailure,
    /// Read-back disagreed with the desired profile.
    VerifyFailure,
}

impl SignalState {
    /// Every state except [`SignalState::Idle`] is final.
    #[must_use]
    pub const fn is_absorbing(self) -> bool {
        !matches!(self, Self::Idle)
    }

    #[must_use]
    pub const fn pattern(self, timing: &SignalTiming) -> IndicatorPattern {
        match self {
            Self::Idle => IndicatorPattern::Off,
            Self::Success => IndicatorPattern::Solid,
            Self::InitFailure => IndicatorPattern::Blink {
                on: timing.init_failure_blink,
                off: timing.init_failure_blink,
            },
            Self::VerifyFailure => IndicatorPattern::Blink {
                on: timing.verify_failure_blink,
                off: timing.verify_failure_blink,
            },
        }
    }
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Success => f.write_str("success"),
            Self::InitFailure => f.write_str("init-failure"),
            Self::VerifyFailure => f.write_str("verify-failure"),
        }
    }
}

/// What the indicator output does in a given state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IndicatorPattern {
    Off,
    Solid,
    Blink { on: Duration, off: Duration },
}

impl IndicatorPattern {
    /// Length of one full period, `None` for steady patterns.
    #[must_use]
    pub fn period(self) -> Option<Duration> {
        match self {
            Self::Blink { on, off } => Some(on + off),
            Self::Off | Self::Solid => None,
        }
    }
}

/// Single binary output driving the status LED.
pub trait Indicator {
    fn set_lit(&mut self, lit: bool);
}

/// Rejected state change.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransitionError {
    pub from: SignalState,
    pub to: SignalState,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status cannot move from {} to {}", self.from, self.to)
    }
}

/// Owns the indicator output and the current [`SignalState`].
pub struct StatusSignal<I> {
    indicator: I,
    state: SignalState,
    timing: SignalTiming,
}

impl<I: Indicator> StatusSignal<I> {
    /// Takes ownership of `indicator` and drives it dark.
    #[must_use]
    pub fn new(mut indicator: I, timing: SignalTiming) -> Self {
        indicator.set_lit(false);
        Self {
            indicator,
            state: SignalState::Idle,
            timing,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SignalState {
        self.state
    }

    #[must_use]
    pub const fn pattern(&self) -> IndicatorPattern {
        self.state.pattern(&self.timing)
    }

    /// Moves out of [`SignalState::Idle`].
    ///
    /// Absorbing states reject every further transition, including a
    /// transition to the state already held. Steady patterns take effect
    /// immediately; blink patterns start on the next [`render`](Self::render).
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the signal already left Idle or when
    /// `next` is Idle.
    pub fn enter(&mut self, next: SignalState) -> Result<(), TransitionError> {
        if self.state.is_absorbing() || next == SignalState::Idle {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        match self.pattern() {
            IndicatorPattern::Solid => self.indicator.set_lit(true),
            IndicatorPattern::Off | IndicatorPattern::Blink { .. } => self.indicator.set_lit(false),
        }
        Ok(())
    }

    /// Drives the current pattern for `periods` full periods.
    ///
    /// Steady patterns are asserted once and return without waiting.
    pub fn render<C: BlockingClock>(&mut self, clock: &mut C, periods: u32) {
        match self.pattern() {
            IndicatorPattern::Off => self.indicator.set_lit(false),
            IndicatorPattern::Solid => self.indicator.set_lit(true),
            IndicatorPattern::Blink { on, off } => {
                for _ in 0..periods {
                    self.indicator.set_lit(true);
                    clock.wait(on);
                    self.indicator.set_lit(false);
                    clock.wait(off);
                }
            }
        }
    }

    /// Renders the current pattern forever.
    pub fn halt<C: BlockingClock>(mut self, clock: &mut C) -> ! {
        loop {
            self.render(clock, 1);
            if self.pattern().period().is_none() {
                clock.wait(PARK_INTERVAL);
            }
        }
    }

    #[must_use]
    pub fn indicator(&self) -> &I {
        &self.indicator
    }
}
