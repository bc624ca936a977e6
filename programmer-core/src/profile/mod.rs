//! Power-profile data model shared by the sequencer and the verifier.
//!
//! A [`PowerProfile`] describes everything the programmer writes into the PD
//! controller. The desired profile is a compiled-in constant; the observed
//! profile has the same shape and is filled from read-back.

use core::fmt;

pub mod fields;

pub use fields::{
    Comparison, FIELD_COUNT, FIELD_ORDER, FLOAT_TOLERANCE, FieldValue, ProfileField, close,
};

/// Number of PDO slots the controller exposes.
pub const MAX_PDOS: usize = 3;
/// PDO1 voltage is fixed by the USB PD protocol.
pub const PDO1_VOLTAGE: f32 = 5.0;
/// Lowest voltage a configurable PDO may request.
pub const MIN_PDO_VOLTAGE: f32 = 5.0;
/// Highest voltage a configurable PDO may request.
pub const MAX_PDO_VOLTAGE: f32 = 20.0;
/// Lockout thresholds are encoded as `percent - 5` in a nibble.
pub const MIN_LIMIT_PCT: u8 = 5;
pub const MAX_LIMIT_PCT: u8 = 20;
/// Highest config-OK GPIO mode the controller understands.
pub const MAX_CONFIG_OK_MODE: u8 = 3;

/// Identifier for one of the three PDO slots.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PdoIndex {
    Pdo1,
    Pdo2,
    Pdo3,
}

impl PdoIndex {
    pub const ALL: [Self; MAX_PDOS] = [Self::Pdo1, Self::Pdo2, Self::Pdo3];

    /// 1-based number used by the controller and in log output.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Pdo1 => 1,
            Self::Pdo2 => 2,
            Self::Pdo3 => 3,
        }
    }

    /// Position of this PDO inside [`PowerProfile::pdos`].
    #[must_use]
    pub const fn slot(self) -> usize {
        match self {
            Self::Pdo1 => 0,
            Self::Pdo2 => 1,
            Self::Pdo3 => 2,
        }
    }
}

impl fmt::Display for PdoIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PDO{}", self.number())
    }
}

/// One advertised power data object.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PdoSetting {
    pub voltage: f32,
    pub current: f32,
    pub lower_limit_pct: u8,
    pub upper_limit_pct: u8,
}

impl PdoSetting {
    #[must_use]
    pub const fn new(voltage: f32, current: f32, lower_limit_pct: u8, upper_limit_pct: u8) -> Self {
        Self {
            voltage,
            current,
            lower_limit_pct,
            upper_limit_pct,
        }
    }

    /// PDO1 only carries a current and an over-voltage limit.
    #[must_use]
    pub const fn fixed_supply(current: f32, upper_limit_pct: u8) -> Self {
        Self::new(PDO1_VOLTAGE, current, 0, upper_limit_pct)
    }

    const EMPTY: Self = Self::new(0.0, 0.0, 0, 0);
}

/// Complete controller configuration, desired or observed.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerProfile {
    pub pdo_count: u8,
    pub pdos: [PdoSetting; MAX_PDOS],
    pub external_power_only: bool,
    pub usb_comm_capable: bool,
    pub config_ok_mode: u8,
    pub power_above_5v_only: bool,
}

/// Profile the programmer is asked to write.
pub type DesiredProfile = PowerProfile;
/// Profile reconstructed from controller read-back.
pub type ObservedProfile = PowerProfile;

impl PowerProfile {
    /// All-zero profile used as the starting point of a read-back.
    pub const EMPTY: Self = Self {
        pdo_count: 0,
        pdos: [PdoSetting::EMPTY; MAX_PDOS],
        external_power_only: false,
        usb_comm_capable: false,
        config_ok_mode: 0,
        power_above_5v_only: false,
    };

    #[must_use]
    pub const fn pdo(&self, index: PdoIndex) -> &PdoSetting {
        &self.pdos[index.slot()]
    }

    pub fn pdo_mut(&mut self, index: PdoIndex) -> &mut PdoSetting {
        &mut self.pdos[index.slot()]
    }

    /// Checks the invariants a profile must satisfy before it is applied.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        if self.pdo_count == 0 || self.pdo_count as usize > MAX_PDOS {
            return false;
        }
        if self.config_ok_mode > MAX_CONFIG_OK_MODE {
            return false;
        }

        let mut slot = 0;
        while slot < MAX_PDOS {
            let pdo = &self.pdos[slot];
            if !limit_in_range(pdo.upper_limit_pct) || pdo.current < 0.0 {
                return false;
            }
            if slot > 0 {
                if !limit_in_range(pdo.lower_limit_pct) {
                    return false;
                }
                if pdo.voltage < MIN_PDO_VOLTAGE || pdo.voltage > MAX_PDO_VOLTAGE {
                    return false;
                }
            }
            slot += 1;
        }
        true
    }

    /// Extracts the value of `field` tagged with its unit.
    #[must_use]
    pub fn value(&self, field: ProfileField) -> FieldValue {
        match field {
            ProfileField::PdoCount => FieldValue::Count(self.pdo_count),
            ProfileField::Voltage(pdo) => FieldValue::Volts(self.pdo(pdo).voltage),
            ProfileField::Current(pdo) => FieldValue::Amps(self.pdo(pdo).current),
            ProfileField::LowerLimit(pdo) => FieldValue::Percent(self.pdo(pdo).lower_limit_pct),
            ProfileField::UpperLimit(pdo) => FieldValue::Percent(self.pdo(pdo).upper_limit_pct),
            ProfileField::ExternalPowerOnly => FieldValue::Flag(self.external_power_only),
            ProfileField::UsbCommCapable => FieldValue::Flag(self.usb_comm_capable),
            ProfileField::ConfigOkMode => FieldValue::Mode(self.config_ok_mode),
            ProfileField::PowerAbove5vOnly => FieldValue::Flag(self.power_above_5v_only),
        }
    }
}

const fn limit_in_range(percent: u8) -> bool {
    percent >= MIN_LIMIT_PCT && percent <= MAX_LIMIT_PCT
}

/// Profile burned into every controller this programmer touches.
pub const DESIRED_PROFILE: DesiredProfile = PowerProfile {
    pdo_count: 3,
    pdos: [
        PdoSetting::fixed_supply(0.5, 20),
        PdoSetting::new(20.0, 4.5, 10, 20),
        PdoSetting::new(20.0, 5.0, 20, 20),
    ],
    external_power_only: false,
    usb_comm_capable: true,
    config_ok_mode: 2,
    power_above_5v_only: true,
};

const _: () = assert!(DESIRED_PROFILE.is_valid());

#[cfg(test)]
// Every float asserted here is exactly representable.
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn pdo_numbers_and_slots_line_up() {
        for (slot, index) in PdoIndex::ALL.into_iter().enumerate() {
            assert_eq!(index.slot(), slot);
            assert_eq!(usize::from(index.number()), slot + 1);
        }
    }

    #[test]
    fn desired_profile_matches_bench_values() {
        let profile = DESIRED_PROFILE;
        assert_eq!(profile.pdo_count, 3);
        assert_eq!(profile.pdo(PdoIndex::Pdo1).voltage, PDO1_VOLTAGE);
        assert_eq!(profile.pdo(PdoIndex::Pdo1).current, 0.5);
        assert_eq!(profile.pdo(PdoIndex::Pdo2).current, 4.5);
        assert_eq!(profile.pdo(PdoIndex::Pdo2).lower_limit_pct, 10);
        assert_eq!(profile.pdo(PdoIndex::Pdo3).voltage, 20.0);
        assert_eq!(profile.pdo(PdoIndex::Pdo3).current, 5.0);
        assert!(profile.usb_comm_capable);
        assert!(!profile.external_power_only);
        assert_eq!(profile.config_ok_mode, 2);
        assert!(profile.power_above_5v_only);
    }

    #[test]
    fn validity_rejects_out_of_range_pdo_count() {
        for count in [1, 2, 3] {
            let mut profile = DESIRED_PROFILE;
            profile.pdo_count = count;
            assert!(profile.is_valid(), "count {count} should be accepted");
        }
        for count in [0, 4, u8::MAX] {
            let mut profile = DESIRED_PROFILE;
            profile.pdo_count = count;
            assert!(!profile.is_valid(), "count {count} should be rejected");
        }
    }

    #[test]
    fn validity_rejects_bad_limits_and_voltages() {
        let mut profile = DESIRED_PROFILE;
        profile.pdo_mut(PdoIndex::Pdo2).upper_limit_pct = 21;
        assert!(!profile.is_valid());

        let mut profile = DESIRED_PROFILE;
        profile.pdo_mut(PdoIndex::Pdo3).lower_limit_pct = 4;
        assert!(!profile.is_valid());

        let mut profile = DESIRED_PROFILE;
        profile.pdo_mut(PdoIndex::Pdo2).voltage = 21.0;
        assert!(!profile.is_valid());

        let mut profile = DESIRED_PROFILE;
        profile.config_ok_mode = 4;
        assert!(!profile.is_valid());
    }

    #[test]
    fn value_tags_fields_with_their_unit() {
        let profile = DESIRED_PROFILE;
        assert_eq!(profile.value(ProfileField::PdoCount), FieldValue::Count(3));
        assert_eq!(
            profile.value(ProfileField::Voltage(PdoIndex::Pdo2)),
            FieldValue::Volts(20.0)
        );
        assert_eq!(
            profile.value(ProfileField::Current(PdoIndex::Pdo3)),
            FieldValue::Amps(5.0)
        );
        assert_eq!(
            profile.value(ProfileField::UpperLimit(PdoIndex::Pdo1)),
            FieldValue::Percent(20)
        );
        assert_eq!(profile.value(ProfileField::ConfigOkMode), FieldValue::Mode(2));
        assert_eq!(
            profile.value(ProfileField::UsbCommCapable),
            FieldValue::Flag(true)
        );
    }
}
