//! Read-back and comparison of the committed profile.
//!
//! Verification never short-circuits: every field in
//! [`FIELD_ORDER`](crate::profile::FIELD_ORDER) is read, compared and
//! reported, so a single run surfaces every discrepancy.

use core::fmt;

use crate::driver::{ControllerSession, DriverError, PdController};
use crate::profile::{
    DesiredProfile, FIELD_COUNT, FIELD_ORDER, FieldValue, ObservedProfile, PdoIndex, PowerProfile,
    ProfileField,
};
use crate::telemetry::{BusStage, CycleEvent, CycleObserver};

/// Outcome of comparing one field.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FieldCheck {
    pub field: ProfileField,
    pub desired: FieldValue,
    pub observed: FieldValue,
    pub matched: bool,
}

impl FieldCheck {
    /// Compares `field` between the two profiles using the field's own rule.
    #[must_use]
    pub fn evaluate(field: ProfileField, desired: &PowerProfile, observed: &PowerProfile) -> Self {
        let wanted = desired.value(field);
        let found = observed.value(field);
        Self {
            field,
            desired: wanted,
            observed: found,
            matched: field.comparison().matches(wanted, found),
        }
    }
}

impl fmt::Display for FieldCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: set {}, read {}",
            self.field, self.desired, self.observed
        )?;
        if !self.matched {
            f.write_str(" MISMATCH")?;
        }
        Ok(())
    }
}

/// Per-field verdicts of one verification run.
///
/// A result built with [`VerificationResult::unreadable`] carries no checks
/// and always counts as failed.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VerificationResult {
    checks: Option<[FieldCheck; FIELD_COUNT]>,
}

impl VerificationResult {
    /// Result for a controller whose configuration could not be read back.
    #[must_use]
    pub const fn unreadable() -> Self {
        Self { checks: None }
    }

    #[must_use]
    pub fn checks(&self) -> &[FieldCheck] {
        match &self.checks {
            Some(checks) => checks.as_slice(),
            None => &[],
        }
    }

    #[must_use]
    pub fn check(&self, field: ProfileField) -> Option<&FieldCheck> {
        self.checks().iter().find(|check| check.field == field)
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &FieldCheck> {
        self.checks().iter().filter(|check| !check.matched)
    }

    #[must_use]
    pub fn mismatch_count(&self) -> usize {
        self.mismatches().count()
    }

    #[must_use]
    pub const fn is_readable(&self) -> bool {
        self.checks.is_some()
    }

    /// `true` when any field mismatched or nothing could be read.
    #[must_use]
    pub fn failed(&self) -> bool {
        !self.is_readable() || self.mismatch_count() > 0
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        !self.failed()
    }
}

/// Reads every profile field back from the controller.
///
/// The driver reloads its shadow from the store first, so the values
/// reflect what was persisted rather than what was last set.
///
/// # Errors
///
/// Returns the driver error if the reload fails.
pub fn read_back<D: PdController>(
    session: &mut ControllerSession<D>,
) -> Result<ObservedProfile, D::Error> {
    session.driver_mut().reload()?;
    let driver = session.driver();

    let mut observed = PowerProfile::EMPTY;
    observed.pdo_count = driver.pdo_count();
    for pdo in PdoIndex::ALL {
        let setting = observed.pdo_mut(pdo);
        setting.voltage = driver.voltage(pdo);
        setting.current = driver.current(pdo);
        setting.lower_limit_pct = driver.lower_limit(pdo);
        setting.upper_limit_pct = driver.upper_limit(pdo);
    }
    observed.external_power_only = driver.external_power_only();
    observed.usb_comm_capable = driver.usb_comm_capable();
    observed.config_ok_mode = driver.config_ok_mode();
    observed.power_above_5v_only = driver.power_above_5v_only();
    Ok(observed)
}

/// Compares every field of `observed` against `desired`.
#[must_use]
pub fn verify(desired: &DesiredProfile, observed: &ObservedProfile) -> VerificationResult {
    VerificationResult {
        checks: Some(FIELD_ORDER.map(|field| FieldCheck::evaluate(field, desired, observed))),
    }
}

/// Reads back, compares and reports each field plus the overall verdict.
pub fn run<D, O>(
    session: &mut ControllerSession<D>,
    desired: &DesiredProfile,
    observer: &mut O,
) -> VerificationResult
where
    D: PdController,
    O: CycleObserver,
{
    let observed = match read_back(session) {
        Ok(observed) => observed,
        Err(error) => {
            observer.record(CycleEvent::BusFault {
                stage: BusStage::Reload,
                fault: error.fault(),
            });
            observer.record(CycleEvent::ReadbackUnavailable);
            return VerificationResult::unreadable();
        }
    };

    let result = verify(desired, &observed);
    for check in result.checks() {
        observer.record(CycleEvent::FieldChecked(*check));
    }
    if result.passed() {
        observer.record(CycleEvent::VerificationPassed);
    } else {
        let mismatches = u8::try_from(result.mismatch_count()).unwrap_or(u8::MAX);
        observer.record(CycleEvent::VerificationFailed { mismatches });
    }
    result
}
