//! Field catalog and per-field comparison policy.
//!
//! [`FIELD_ORDER`] is the one list both the sequencer and the verifier walk:
//! it fixes the order setters are issued in and the set of fields a
//! read-back is checked against. Each field declares its own
//! [`Comparison`], so call sites never decide between exact and tolerant
//! equality themselves.

use core::fmt;

use super::PdoIndex;

/// Absolute tolerance absorbing the controller's internal quantization.
pub const FLOAT_TOLERANCE: f32 = 0.01;

/// Number of configurable fields in a profile.
pub const FIELD_COUNT: usize = 15;

/// A single configurable field of a [`PowerProfile`](super::PowerProfile).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProfileField {
    PdoCount,
    Voltage(PdoIndex),
    Current(PdoIndex),
    LowerLimit(PdoIndex),
    UpperLimit(PdoIndex),
    ExternalPowerOnly,
    UsbCommCapable,
    ConfigOkMode,
    PowerAbove5vOnly,
}

/// Apply and verification order.
///
/// The PDO count goes first: the controller only accepts PDO settings for
/// indices covered by the count. PDO1 has no voltage or lower-limit entry.
pub const FIELD_ORDER: [ProfileField; FIELD_COUNT] = [
    ProfileField::PdoCount,
    ProfileField::Current(PdoIndex::Pdo1),
    ProfileField::UpperLimit(PdoIndex::Pdo1),
    ProfileField::Voltage(PdoIndex::Pdo2),
    ProfileField::Current(PdoIndex::Pdo2),
    ProfileField::LowerLimit(PdoIndex::Pdo2),
    ProfileField::UpperLimit(PdoIndex::Pdo2),
    ProfileField::Voltage(PdoIndex::Pdo3),
    ProfileField::Current(PdoIndex::Pdo3),
    ProfileField::LowerLimit(PdoIndex::Pdo3),
    ProfileField::UpperLimit(PdoIndex::Pdo3),
    ProfileField::ExternalPowerOnly,
    ProfileField::UsbCommCapable,
    ProfileField::ConfigOkMode,
    ProfileField::PowerAbove5vOnly,
];

impl ProfileField {
    /// Comparison rule applied when this field is verified.
    #[must_use]
    pub const fn comparison(self) -> Comparison {
        match self {
            Self::Voltage(_) | Self::Current(_) => Comparison::Tolerance(FLOAT_TOLERANCE),
            _ => Comparison::Exact,
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PdoCount => f.write_str("PDO count"),
            Self::Voltage(pdo) => write!(f, "{pdo} voltage"),
            Self::Current(pdo) => write!(f, "{pdo} current"),
            Self::LowerLimit(pdo) => write!(f, "{pdo} lower limit"),
            Self::UpperLimit(pdo) => write!(f, "{pdo} upper limit"),
            Self::ExternalPowerOnly => f.write_str("external power"),
            Self::UsbCommCapable => f.write_str("USB comm capable"),
            Self::ConfigOkMode => f.write_str("config-OK mode"),
            Self::PowerAbove5vOnly => f.write_str("power above 5V only"),
        }
    }
}

/// Value of a field, tagged with its unit.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FieldValue {
    Count(u8),
    Volts(f32),
    Amps(f32),
    Percent(u8),
    Flag(bool),
    Mode(u8),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::Volts(volts) => write!(f, "{volts:.2} V"),
            Self::Amps(amps) => write!(f, "{amps:.2} A"),
            Self::Percent(percent) => write!(f, "{percent}%"),
            Self::Flag(flag) => write!(f, "{flag}"),
            Self::Mode(mode) => write!(f, "mode {mode}"),
        }
    }
}

/// How a desired value is compared with its read-back.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Comparison {
    Exact,
    /// Absolute difference must be strictly below the bound.
    Tolerance(f32),
}

impl Comparison {
    /// Returns `true` when `observed` satisfies `desired` under this rule.
    ///
    /// Integer and boolean values are always compared exactly; the tolerance
    /// only ever widens floating-point comparisons. Values with different
    /// tags never match.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn matches(self, desired: FieldValue, observed: FieldValue) -> bool {
        match (desired, observed) {
            (FieldValue::Volts(a), FieldValue::Volts(b))
            | (FieldValue::Amps(a), FieldValue::Amps(b)) => match self {
                Self::Exact => a == b,
                Self::Tolerance(bound) => within(a, b, bound),
            },
            (FieldValue::Count(a), FieldValue::Count(b))
            | (FieldValue::Percent(a), FieldValue::Percent(b))
            | (FieldValue::Mode(a), FieldValue::Mode(b)) => a == b,
            (FieldValue::Flag(a), FieldValue::Flag(b)) => a == b,
            _ => false,
        }
    }
}

/// `|a - b| < FLOAT_TOLERANCE`.
///
/// Defined for finite values, which is all the driver can decode. NaN and
/// infinities are never close to anything, themselves included.
#[must_use]
pub fn close(a: f32, b: f32) -> bool {
    within(a, b, FLOAT_TOLERANCE)
}

// Written without `abs` so both operand orders take the same path.
fn within(a: f32, b: f32, bound: f32) -> bool {
    a - b < bound && b - a < bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::nvm::current_from_code;

    #[test]
    fn catalog_starts_with_pdo_count_and_ends_with_global_flags() {
        assert_eq!(FIELD_ORDER[0], ProfileField::PdoCount);
        assert_eq!(FIELD_ORDER[FIELD_COUNT - 1], ProfileField::PowerAbove5vOnly);
        assert!(!FIELD_ORDER.contains(&ProfileField::Voltage(PdoIndex::Pdo1)));
        assert!(!FIELD_ORDER.contains(&ProfileField::LowerLimit(PdoIndex::Pdo1)));
    }

    #[test]
    fn catalog_groups_pdo_fields_in_ascending_pdo_order() {
        let pdos = FIELD_ORDER.iter().filter_map(|field| match field {
            ProfileField::Voltage(pdo)
            | ProfileField::Current(pdo)
            | ProfileField::LowerLimit(pdo)
            | ProfileField::UpperLimit(pdo) => Some(*pdo),
            _ => None,
        });
        let mut previous = 0;
        for pdo in pdos {
            assert!(pdo.number() >= previous, "{pdo} appeared after PDO{previous}");
            previous = pdo.number();
        }
    }

    #[test]
    fn only_voltage_and_current_use_a_tolerance() {
        for field in FIELD_ORDER {
            let expected_tolerant = matches!(field, ProfileField::Voltage(_) | ProfileField::Current(_));
            let tolerant = matches!(field.comparison(), Comparison::Tolerance(_));
            assert_eq!(tolerant, expected_tolerant, "{field}");
        }
    }

    #[test]
    fn tolerance_absorbs_quantization_but_not_real_drift() {
        let rule = ProfileField::Voltage(PdoIndex::Pdo2).comparison();
        assert!(rule.matches(FieldValue::Volts(20.0), FieldValue::Volts(20.005)));
        assert!(rule.matches(FieldValue::Volts(20.0), FieldValue::Volts(19.995)));
        assert!(!rule.matches(FieldValue::Volts(20.0), FieldValue::Volts(20.05)));
        assert!(!rule.matches(FieldValue::Volts(20.0), FieldValue::Volts(19.9)));
    }

    #[test]
    fn integer_fields_never_get_tolerance() {
        let rule = Comparison::Tolerance(10.0);
        assert!(!rule.matches(FieldValue::Count(3), FieldValue::Count(2)));
        assert!(!rule.matches(FieldValue::Percent(20), FieldValue::Percent(19)));
        assert!(rule.matches(FieldValue::Mode(2), FieldValue::Mode(2)));
    }

    #[test]
    fn mismatched_tags_never_match() {
        assert!(!Comparison::Exact.matches(FieldValue::Count(3), FieldValue::Mode(3)));
        assert!(
            !Comparison::Tolerance(FLOAT_TOLERANCE)
                .matches(FieldValue::Volts(5.0), FieldValue::Amps(5.0))
        );
    }

    #[test]
    fn close_is_strict_at_the_bound() {
        assert!(close(1.0, 1.0));
        assert!(!close(0.0, FLOAT_TOLERANCE));
        assert!(!close(FLOAT_TOLERANCE, 0.0));
    }

    #[test]
    fn close_is_reflexive_and_symmetric_over_decodable_values() {
        let currents = (0..=15u8).map(current_from_code);
        let voltages = (100..=400u16).map(|code| f32::from(code) / 20.0);
        let values: std::vec::Vec<f32> = currents.chain(voltages).collect();

        for &a in &values {
            assert!(close(a, a), "{a} is not close to itself");
            for &b in &values {
                assert_eq!(close(a, b), close(b, a), "close({a}, {b}) is asymmetric");
            }
        }
    }

    #[test]
    fn non_finite_values_are_never_close() {
        assert!(!close(f32::NAN, f32::NAN));
        assert!(!close(f32::INFINITY, f32::INFINITY));
        assert!(!close(f32::NAN, 5.0));
    }
}
