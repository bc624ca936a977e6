//! STUSB4500 non-volatile memory image.
//!
//! The controller keeps its sink configuration in five 8-byte NVM sectors.
//! [`NvmImage`] is the driver's shadow of those sectors; the accessors below
//! pack and unpack the profile fields at their datasheet bit positions.
//!
//! | Field | Sector/byte | Bits | Encoding |
//! |---|---|---|---|
//! | PDO count | 3/2 | 2:1 | 1..=3 |
//! | USB comm capable | 3/2 | 0 | flag |
//! | External power | 3/2 | 3 | flag |
//! | PDO1 current | 3/2 | 7:4 | current code |
//! | PDO1 OVLO | 3/3 | 7:4 | percent - 5 |
//! | PDO2 current / UVLO | 3/4 | 3:0 / 7:4 | current code / percent - 5 |
//! | PDO2 OVLO / PDO3 current | 3/5 | 3:0 / 7:4 | percent - 5 / current code |
//! | PDO3 UVLO / OVLO | 3/6 | 3:0 / 7:4 | percent - 5 |
//! | PDO2 voltage | 4/0..1 | 7:6 + 7:0 | 50 mV units |
//! | PDO3 voltage | 4/2..3 | 7:0 + 1:0 | 50 mV units |
//! | Config-OK GPIO | 4/4 | 6:5 | mode |
//! | Power above 5V only | 4/6 | 3 | flag |

use crate::profile::{MAX_LIMIT_PCT, MAX_PDO_VOLTAGE, MIN_LIMIT_PCT, MIN_PDO_VOLTAGE, PDO1_VOLTAGE, PdoIndex};

pub const SECTOR_COUNT: usize = 5;
pub const SECTOR_LEN: usize = 8;

pub type Sector = [u8; SECTOR_LEN];

/// PDO voltages are stored in 50 mV steps.
const VOLTAGE_STEPS_PER_VOLT: f32 = 20.0;
/// Largest 4-bit current code (5.0 A).
const MAX_CURRENT_CODE: u8 = 15;

/// Shadow copy of the five NVM sectors.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NvmImage {
    sectors: [Sector; SECTOR_COUNT],
}

impl NvmImage {
    /// Image shipped from the factory: 5 V / 15 V / 20 V at 1.5 A / 1.5 A / 1.0 A.
    pub const FACTORY: Self = Self::from_sectors([
        [0x00, 0x00, 0xB0, 0xAA, 0x00, 0x45, 0x00, 0x00],
        [0x10, 0x40, 0x9C, 0x1C, 0xFF, 0x01, 0x3C, 0xDF],
        [0x02, 0x40, 0x0F, 0x00, 0x32, 0x00, 0xFC, 0xF1],
        [0x00, 0x19, 0x56, 0xAF, 0xF5, 0x35, 0x5F, 0x00],
        [0x00, 0x4B, 0x90, 0x21, 0x43, 0x00, 0x40, 0xFB],
    ]);

    pub const BLANK: Self = Self::from_sectors([[0; SECTOR_LEN]; SECTOR_COUNT]);

    #[must_use]
    pub const fn from_sectors(sectors: [Sector; SECTOR_COUNT]) -> Self {
        Self { sectors }
    }

    #[must_use]
    pub const fn sectors(&self) -> &[Sector; SECTOR_COUNT] {
        &self.sectors
    }

    pub fn sector_mut(&mut self, index: usize) -> &mut Sector {
        &mut self.sectors[index]
    }

    const fn byte(&self, sector: usize, offset: usize) -> u8 {
        self.sectors[sector][offset]
    }

    fn update(&mut self, sector: usize, offset: usize, mask: u8, value: u8) {
        let byte = &mut self.sectors[sector][offset];
        *byte = (*byte & !mask) | (value & mask);
    }

    #[must_use]
    pub const fn pdo_count(&self) -> u8 {
        (self.byte(3, 2) & 0x06) >> 1
    }

    pub fn set_pdo_count(&mut self, count: u8) {
        self.update(3, 2, 0x06, count.min(3) << 1);
    }

    #[must_use]
    pub fn voltage(&self, pdo: PdoIndex) -> f32 {
        match pdo {
            PdoIndex::Pdo1 => PDO1_VOLTAGE,
            PdoIndex::Pdo2 | PdoIndex::Pdo3 => {
                f32::from(self.voltage_code(pdo)) / VOLTAGE_STEPS_PER_VOLT
            }
        }
    }

    /// Raw 10-bit voltage code (50 mV units). PDO1 reads as zero.
    #[must_use]
    pub fn voltage_code(&self, pdo: PdoIndex) -> u16 {
        match pdo {
            PdoIndex::Pdo1 => 0,
            PdoIndex::Pdo2 => (u16::from(self.byte(4, 1)) << 2) | u16::from(self.byte(4, 0) >> 6),
            PdoIndex::Pdo3 => (u16::from(self.byte(4, 3) & 0x03) << 8) | u16::from(self.byte(4, 2)),
        }
    }

    /// Ignored for PDO1, whose voltage is fixed.
    pub fn set_voltage(&mut self, pdo: PdoIndex, volts: f32) {
        let code = voltage_to_code(volts);
        let [low, high] = code.to_le_bytes();
        match pdo {
            PdoIndex::Pdo1 => {}
            PdoIndex::Pdo2 => {
                self.update(4, 0, 0xC0, (low & 0x03) << 6);
                self.sectors[4][1] = (high << 6) | (low >> 2);
            }
            PdoIndex::Pdo3 => {
                self.sectors[4][2] = low;
                self.update(4, 3, 0x03, high);
            }
        }
    }

    #[must_use]
    pub const fn current_code(&self, pdo: PdoIndex) -> u8 {
        match pdo {
            PdoIndex::Pdo1 => self.byte(3, 2) >> 4,
            PdoIndex::Pdo2 => self.byte(3, 4) & 0x0F,
            PdoIndex::Pdo3 => self.byte(3, 5) >> 4,
        }
    }

    #[must_use]
    pub fn current(&self, pdo: PdoIndex) -> f32 {
        current_from_code(self.current_code(pdo))
    }

    pub fn set_current(&mut self, pdo: PdoIndex, amps: f32) {
        let code = current_to_code(amps);
        match pdo {
            PdoIndex::Pdo1 => self.update(3, 2, 0xF0, code << 4),
            PdoIndex::Pdo2 => self.update(3, 4, 0x0F, code),
            PdoIndex::Pdo3 => self.update(3, 5, 0xF0, code << 4),
        }
    }

    /// Under-voltage lockout in percent. PDO1 has none and reads as zero.
    #[must_use]
    pub const fn lower_limit(&self, pdo: PdoIndex) -> u8 {
        match pdo {
            PdoIndex::Pdo1 => 0,
            PdoIndex::Pdo2 => (self.byte(3, 4) >> 4) + MIN_LIMIT_PCT,
            PdoIndex::Pdo3 => (self.byte(3, 6) & 0x0F) + MIN_LIMIT_PCT,
        }
    }

    pub fn set_lower_limit(&mut self, pdo: PdoIndex, percent: u8) {
        let nibble = limit_to_nibble(percent);
        match pdo {
            PdoIndex::Pdo1 => {}
            PdoIndex::Pdo2 => self.update(3, 4, 0xF0, nibble << 4),
            PdoIndex::Pdo3 => self.update(3, 6, 0x0F, nibble),
        }
    }

    /// Over-voltage lockout in percent.
    #[must_use]
    pub const fn upper_limit(&self, pdo: PdoIndex) -> u8 {
        let nibble = match pdo {
            PdoIndex::Pdo1 => self.byte(3, 3) >> 4,
            PdoIndex::Pdo2 => self.byte(3, 5) & 0x0F,
            PdoIndex::Pdo3 => self.byte(3, 6) >> 4,
        };
        nibble + MIN_LIMIT_PCT
    }

    pub fn set_upper_limit(&mut self, pdo: PdoIndex, percent: u8) {
        let nibble = limit_to_nibble(percent);
        match pdo {
            PdoIndex::Pdo1 => self.update(3, 3, 0xF0, nibble << 4),
            PdoIndex::Pdo2 => self.update(3, 5, 0x0F, nibble),
            PdoIndex::Pdo3 => self.update(3, 6, 0xF0, nibble << 4),
        }
    }

    #[must_use]
    pub const fn external_power_only(&self) -> bool {
        self.byte(3, 2) & 0x08 != 0
    }

    pub fn set_external_power_only(&mut self, enabled: bool) {
        self.update(3, 2, 0x08, if enabled { 0x08 } else { 0 });
    }

    #[must_use]
    pub const fn usb_comm_capable(&self) -> bool {
        self.byte(3, 2) & 0x01 != 0
    }

    pub fn set_usb_comm_capable(&mut self, enabled: bool) {
        self.update(3, 2, 0x01, u8::from(enabled));
    }

    #[must_use]
    pub const fn config_ok_mode(&self) -> u8 {
        (self.byte(4, 4) & 0x60) >> 5
    }

    pub fn set_config_ok_mode(&mut self, mode: u8) {
        self.update(4, 4, 0x60, (mode & 0x03) << 5);
    }

    #[must_use]
    pub const fn power_above_5v_only(&self) -> bool {
        self.byte(4, 6) & 0x08 != 0
    }

    pub fn set_power_above_5v_only(&mut self, enabled: bool) {
        self.update(4, 6, 0x08, if enabled { 0x08 } else { 0 });
    }
}

impl Default for NvmImage {
    fn default() -> Self {
        Self::FACTORY
    }
}

/// Decodes a 4-bit current code. Code 0 selects the flex current and reads as 0 A.
#[must_use]
pub fn current_from_code(code: u8) -> f32 {
    let code = code.min(MAX_CURRENT_CODE);
    match code {
        0 => 0.0,
        1..=10 => f32::from(code) * 0.25 + 0.25,
        _ => f32::from(code) * 0.5 - 2.5,
    }
}

/// Encodes a current to the nearest 4-bit code: 0.25 A steps up to 3 A, 0.5 A above.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn current_to_code(amps: f32) -> u8 {
    if amps < 0.5 {
        0
    } else if amps <= 3.0 {
        (amps * 4.0 - 1.0 + 0.5) as u8
    } else {
        ((amps * 2.0 + 5.0 + 0.5) as u8).min(MAX_CURRENT_CODE)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn voltage_to_code(volts: f32) -> u16 {
    (volts.clamp(MIN_PDO_VOLTAGE, MAX_PDO_VOLTAGE) * VOLTAGE_STEPS_PER_VOLT + 0.5) as u16
}

fn limit_to_nibble(percent: u8) -> u8 {
    percent.clamp(MIN_LIMIT_PCT, MAX_LIMIT_PCT) - MIN_LIMIT_PCT
}
