//! Blocking STUSB4500 driver over `embedded-hal` I2C.
//!
//! Profile fields are edited in an [`NvmImage`] shadow. Committing runs the
//! FTP (flash test port) erase/program sequence for all five NVM sectors;
//! reloading reads them back through the same port.

use core::fmt;

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

use super::{DriverError, DriverFault, PdController};
use super::nvm::{NvmImage, SECTOR_COUNT, SECTOR_LEN};
use crate::profile::PdoIndex;

/// Factory 7-bit address with both ADDR pins low.
pub const DEFAULT_ADDRESS: u8 = 0x28;
/// `DEVICE_ID` values reported by STUSB4500 silicon revisions.
pub const KNOWN_DEVICE_IDS: [u8; 2] = [0x21, 0x25];
/// Upper bound on FTP busy polls before the driver gives up.
pub const NVM_POLL_LIMIT: u32 = 1_000;

mod reg {
    pub const PD_COMMAND_CTRL: u8 = 0x1A;
    pub const DEVICE_ID: u8 = 0x2F;
    pub const TX_HEADER_LOW: u8 = 0x51;
    pub const RW_BUFFER: u8 = 0x53;
    pub const FTP_CUST_PASSWORD: u8 = 0x95;
    pub const FTP_CTRL_0: u8 = 0x96;
    pub const FTP_CTRL_1: u8 = 0x97;
}

mod ftp {
    pub const PASSWORD: u8 = 0x47;
    pub const PWR: u8 = 0x80;
    pub const RST_N: u8 = 0x40;
    pub const REQ: u8 = 0x10;
    pub const SECT: u8 = 0x07;
    pub const SER: u8 = 0xF8;
    pub const OPCODE: u8 = 0x07;
    /// Sector mask selecting all five sectors for erase.
    pub const ALL_SECTORS: u8 = 0x1F;
}

/// FTP opcodes written to `FTP_CTRL_1`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FtpOpcode {
    Read = 0x00,
    WritePl = 0x01,
    WriteSer = 0x02,
    ReadPl = 0x03,
    ReadSer = 0x04,
    EraseSector = 0x05,
    ProgSector = 0x06,
    SoftProgSector = 0x07,
}

impl FtpOpcode {
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & ftp::OPCODE {
            0x00 => Self::Read,
            0x01 => Self::WritePl,
            0x02 => Self::WriteSer,
            0x03 => Self::ReadPl,
            0x04 => Self::ReadSer,
            0x05 => Self::EraseSector,
            0x06 => Self::ProgSector,
            _ => Self::SoftProgSector,
        }
    }
}

/// PD message header for a soft reset.
pub const SOFT_RESET_HEADER: u8 = 0x0D;
/// `PD_COMMAND_CTRL` value that transmits the staged message.
pub const SEND_MESSAGE: u8 = 0x26;

/// Failures reported by [`Stusb4500`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Stusb4500Error<E> {
    I2c(E),
    UnexpectedDeviceId(u8),
    /// The FTP request bit never cleared.
    NvmTimeout,
}

impl<E> From<E> for Stusb4500Error<E> {
    fn from(error: E) -> Self {
        Self::I2c(error)
    }
}

impl<E: fmt::Debug> fmt::Display for Stusb4500Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c(error) => write!(f, "i2c error: {error:?}"),
            Self::UnexpectedDeviceId(id) => write!(f, "unexpected device id {id:#04x}"),
            Self::NvmTimeout => f.write_str("nvm request timed out"),
        }
    }
}

impl<E: embedded_hal::i2c::Error> DriverError for Stusb4500Error<E> {
    fn fault(&self) -> DriverFault {
        match self {
            Self::I2c(error) => match error.kind() {
                ErrorKind::NoAcknowledge(_) => DriverFault::NoAcknowledge,
                ErrorKind::ArbitrationLoss => DriverFault::ArbitrationLoss,
                ErrorKind::Bus | ErrorKind::Overrun => DriverFault::Bus,
                _ => DriverFault::Other,
            },
            Self::UnexpectedDeviceId(id) => DriverFault::UnexpectedDeviceId(*id),
            Self::NvmTimeout => DriverFault::NvmTimeout,
        }
    }
}

/// STUSB4500 sink controller on an I2C bus.
pub struct Stusb4500<I2C> {
    i2c: I2C,
    address: u8,
    image: NvmImage,
}

impl<I2C: I2c> Stusb4500<I2C> {
    #[must_use]
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            image: NvmImage::BLANK,
        }
    }

    /// Reads the `DEVICE_ID` register.
    ///
    /// # Errors
    ///
    /// Fails with [`Stusb4500Error::I2c`] if the bus transfer fails.
    pub fn device_id(&mut self) -> Result<u8, Stusb4500Error<I2C::Error>> {
        let mut id = [0u8; 1];
        self.read_regs(reg::DEVICE_ID, &mut id)?;
        Ok(id[0])
    }

    /// Reads all NVM sectors.
    ///
    /// # Errors
    ///
    /// Fails on any bus error, or with [`Stusb4500Error::NvmTimeout`] if a
    /// read request never completes.
    pub fn read_nvm(&mut self) -> Result<NvmImage, Stusb4500Error<I2C::Error>> {
        self.with_ftp(|chip| {
            let mut image = NvmImage::BLANK;
            for sector in 0..SECTOR_COUNT {
                chip.write_reg(reg::FTP_CTRL_0, ftp::PWR | ftp::RST_N)?;
                chip.ftp_request(FtpOpcode::Read as u8, sector_bits(sector))?;
                chip.read_regs(reg::RW_BUFFER, image.sector_mut(sector))?;
            }
            Ok(image)
        })
    }

    /// Erases and reprograms all NVM sectors with `image`.
    ///
    /// # Errors
    ///
    /// Fails on any bus error, or with [`Stusb4500Error::NvmTimeout`] if an
    /// erase or program request never completes.
    pub fn write_nvm(&mut self, image: &NvmImage) -> Result<(), Stusb4500Error<I2C::Error>> {
        self.with_ftp(|chip| {
            // Erase requires a zeroed load buffer.
            chip.write_reg(reg::RW_BUFFER, 0)?;
            chip.ftp_request(
                ((ftp::ALL_SECTORS << 3) & ftp::SER) | FtpOpcode::WriteSer as u8,
                0,
            )?;
            chip.ftp_request(FtpOpcode::SoftProgSector as u8, 0)?;
            chip.ftp_request(FtpOpcode::EraseSector as u8, 0)?;

            for (index, sector) in image.sectors().iter().enumerate() {
                chip.write_regs(reg::RW_BUFFER, sector)?;
                chip.write_reg(reg::FTP_CTRL_0, ftp::PWR | ftp::RST_N)?;
                chip.ftp_request(FtpOpcode::WritePl as u8, 0)?;
                chip.ftp_request(FtpOpcode::ProgSector as u8, sector_bits(index))?;
            }
            Ok(())
        })
    }

    /// Runs `body` with the FTP unlocked and always locks it again afterwards.
    fn with_ftp<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, Stusb4500Error<I2C::Error>>,
    ) -> Result<T, Stusb4500Error<I2C::Error>> {
        self.write_reg(reg::FTP_CUST_PASSWORD, ftp::PASSWORD)?;
        // Reset the NVM controller, then power it.
        self.write_reg(reg::FTP_CTRL_0, 0)?;
        self.write_reg(reg::FTP_CTRL_0, ftp::PWR | ftp::RST_N)?;

        let result = body(self);
        let locked = self.lock_ftp();
        let value = result?;
        locked?;
        Ok(value)
    }

    fn lock_ftp(&mut self) -> Result<(), Stusb4500Error<I2C::Error>> {
        self.write_reg(reg::FTP_CTRL_0, ftp::RST_N)?;
        self.write_reg(reg::FTP_CTRL_1, 0)?;
        self.write_reg(reg::FTP_CUST_PASSWORD, 0)
    }

    fn ftp_request(&mut self, ctrl1: u8, sector: u8) -> Result<(), Stusb4500Error<I2C::Error>> {
        self.write_reg(reg::FTP_CTRL_1, ctrl1)?;
        self.write_reg(
            reg::FTP_CTRL_0,
            (sector & ftp::SECT) | ftp::PWR | ftp::RST_N | ftp::REQ,
        )?;
        self.wait_ftp_idle()
    }

    fn wait_ftp_idle(&mut self) -> Result<(), Stusb4500Error<I2C::Error>> {
        let mut ctrl = [0u8; 1];
        for _ in 0..NVM_POLL_LIMIT {
            self.read_regs(reg::FTP_CTRL_0, &mut ctrl)?;
            if ctrl[0] & ftp::REQ == 0 {
                return Ok(());
            }
        }
        Err(Stusb4500Error::NvmTimeout)
    }

    fn write_reg(&mut self, register: u8, value: u8) -> Result<(), Stusb4500Error<I2C::Error>> {
        self.write_regs(register, &[value])
    }

    fn write_regs(&mut self, register: u8, data: &[u8]) -> Result<(), Stusb4500Error<I2C::Error>> {
        let mut frame = [0u8; SECTOR_LEN + 1];
        frame[0] = register;
        frame[1..=data.len()].copy_from_slice(data);
        self.i2c.write(self.address, &frame[..=data.len()])?;
        Ok(())
    }

    fn read_regs(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), Stusb4500Error<I2C::Error>> {
        self.i2c.write_read(self.address, &[register], buffer)?;
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation)]
fn sector_bits(index: usize) -> u8 {
    index as u8 & ftp::SECT
}

impl<I2C: I2c> PdController for Stusb4500<I2C> {
    type Error = Stusb4500Error<I2C::Error>;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        let id = self.device_id()?;
        if !KNOWN_DEVICE_IDS.contains(&id) {
            return Err(Stusb4500Error::UnexpectedDeviceId(id));
        }
        self.image = self.read_nvm()?;
        Ok(())
    }

    fn set_pdo_count(&mut self, count: u8) {
        self.image.set_pdo_count(count);
    }

    fn set_voltage(&mut self, pdo: PdoIndex, volts: f32) {
        self.image.set_voltage(pdo, volts);
    }

    fn set_current(&mut self, pdo: PdoIndex, amps: f32) {
        self.image.set_current(pdo, amps);
    }

    fn set_lower_limit(&mut self, pdo: PdoIndex, percent: u8) {
        self.image.set_lower_limit(pdo, percent);
    }

    fn set_upper_limit(&mut self, pdo: PdoIndex, percent: u8) {
        self.image.set_upper_limit(pdo, percent);
    }

    fn set_external_power_only(&mut self, enabled: bool) {
        self.image.set_external_power_only(enabled);
    }

    fn set_usb_comm_capable(&mut self, enabled: bool) {
        self.image.set_usb_comm_capable(enabled);
    }

    fn set_config_ok_mode(&mut self, mode: u8) {
        self.image.set_config_ok_mode(mode);
    }

    fn set_power_above_5v_only(&mut self, enabled: bool) {
        self.image.set_power_above_5v_only(enabled);
    }

    fn commit_to_store(&mut self) -> Result<(), Self::Error> {
        let image = self.image;
        self.write_nvm(&image)
    }

    fn soft_reset(&mut self) -> Result<(), Self::Error> {
        self.write_reg(reg::TX_HEADER_LOW, SOFT_RESET_HEADER)?;
        self.write_reg(reg::PD_COMMAND_CTRL, SEND_MESSAGE)
    }

    fn reload(&mut self) -> Result<(), Self::Error> {
        self.image = self.read_nvm()?;
        Ok(())
    }

    fn pdo_count(&self) -> u8 {
        self.image.pdo_count()
    }

    fn voltage(&self, pdo: PdoIndex) -> f32 {
        self.image.voltage(pdo)
    }

    fn current(&self, pdo: PdoIndex) -> f32 {
        self.image.current(pdo)
    }

    fn lower_limit(&self, pdo: PdoIndex) -> u8 {
        self.image.lower_limit(pdo)
    }

    fn upper_limit(&self, pdo: PdoIndex) -> u8 {
        self.image.upper_limit(pdo)
    }

    fn external_power_only(&self) -> bool {
        self.image.external_power_only()
    }

    fn usb_comm_capable(&self) -> bool {
        self.image.usb_comm_capable()
    }

    fn config_ok_mode(&self) -> u8 {
        self.image.config_ok_mode()
    }

    fn power_above_5v_only(&self) -> bool {
        self.image.power_above_5v_only()
    }
}

/// Register map shared with bus-level test doubles.
pub mod registers {
    pub use super::reg::*;

    pub use super::ftp::{ALL_SECTORS, OPCODE, PASSWORD, PWR, REQ, RST_N, SECT, SER};
    pub use super::{SEND_MESSAGE, SOFT_RESET_HEADER};
}
