//! Register-level STUSB4500 model behind an `embedded-hal` I2C bus.
//!
//! The model keeps a volatile register file and a persistent five-sector NVM.
//! FTP requests are executed the moment `FTP_CTRL_0` is written with the
//! request bit set, so every poll after that sees the port idle unless a
//! fault is injected.

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use programmer_core::driver::NvmImage;
use programmer_core::driver::nvm::{SECTOR_COUNT, SECTOR_LEN, Sector};
use programmer_core::driver::stusb4500::{DEFAULT_ADDRESS, FtpOpcode, registers as reg};

const REGISTER_COUNT: usize = 256;
const STUSB4500_ID: u8 = 0x21;
/// `DEVICE_ID` reported by the wrong-part fault.
pub const FOREIGN_DEVICE_ID: u8 = 0x11;

/// Fault injected into the model.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ChipFault {
    #[default]
    None,
    /// Nothing acknowledges on the bus.
    Absent,
    /// Erase and program requests never complete.
    StuckStore,
    /// A different part answers at the controller address.
    WrongId,
}

pub struct EmulatedStusb4500 {
    address: u8,
    fault: ChipFault,
    registers: [u8; REGISTER_COUNT],
    pointer: u8,
    nvm: [Sector; SECTOR_COUNT],
    load_buffer: Sector,
    erase_mask: u8,
    soft_resets: u32,
    nvm_writes: u32,
}

impl EmulatedStusb4500 {
    #[must_use]
    pub fn new(fault: ChipFault) -> Self {
        let mut chip = Self {
            address: DEFAULT_ADDRESS,
            fault,
            registers: [0; REGISTER_COUNT],
            pointer: 0,
            nvm: *NvmImage::FACTORY.sectors(),
            load_buffer: [0; SECTOR_LEN],
            erase_mask: 0,
            soft_resets: 0,
            nvm_writes: 0,
        };
        chip.power_cycle();
        chip
    }

    /// Clears volatile state; the NVM survives.
    pub fn power_cycle(&mut self) {
        self.registers = [0; REGISTER_COUNT];
        self.registers[usize::from(reg::DEVICE_ID)] = match self.fault {
            ChipFault::WrongId => FOREIGN_DEVICE_ID,
            _ => STUSB4500_ID,
        };
        self.pointer = 0;
        self.load_buffer = [0; SECTOR_LEN];
        self.erase_mask = 0;
    }

    pub fn nvm(&self) -> NvmImage {
        NvmImage::from_sectors(self.nvm)
    }

    pub fn soft_resets(&self) -> u32 {
        self.soft_resets
    }

    /// Number of sectors programmed since creation.
    pub fn nvm_writes(&self) -> u32 {
        self.nvm_writes
    }

    fn register(&self, address: u8) -> u8 {
        self.registers[usize::from(address)]
    }

    fn write_register(&mut self, address: u8, value: u8) {
        self.registers[usize::from(address)] = value;
        match address {
            reg::FTP_CTRL_0 if value & reg::REQ != 0 => self.run_ftp_request(value),
            reg::PD_COMMAND_CTRL
                if value == reg::SEND_MESSAGE
                    && self.register(reg::TX_HEADER_LOW) == reg::SOFT_RESET_HEADER =>
            {
                self.soft_resets += 1;
            }
            _ => {}
        }
    }

    fn ftp_unlocked(&self) -> bool {
        self.register(reg::FTP_CUST_PASSWORD) == reg::PASSWORD
    }

    fn run_ftp_request(&mut self, ctrl0: u8) {
        let powered = (ctrl0 & (reg::PWR | reg::RST_N)) == (reg::PWR | reg::RST_N);
        if !self.ftp_unlocked() || !powered {
            return;
        }

        let ctrl1 = self.register(reg::FTP_CTRL_1);
        let sector = usize::from(ctrl0 & reg::SECT);
        let opcode = FtpOpcode::from_bits(ctrl1 & reg::OPCODE);
        if self.fault == ChipFault::StuckStore
            && matches!(opcode, FtpOpcode::EraseSector | FtpOpcode::ProgSector)
        {
            return;
        }

        match opcode {
            FtpOpcode::Read => {
                if let Some(data) = self.nvm.get(sector).copied() {
                    self.rw_buffer_mut().copy_from_slice(&data);
                }
            }
            FtpOpcode::WritePl => {
                let mut staged = [0; SECTOR_LEN];
                staged.copy_from_slice(self.rw_buffer_mut());
                self.load_buffer = staged;
            }
            FtpOpcode::WriteSer => self.erase_mask = (ctrl1 & reg::SER) >> 3,
            FtpOpcode::EraseSector => {
                for (index, data) in self.nvm.iter_mut().enumerate() {
                    if self.erase_mask & (1 << index) != 0 {
                        *data = [0; SECTOR_LEN];
                    }
                }
            }
            FtpOpcode::ProgSector => {
                if let Some(data) = self.nvm.get_mut(sector) {
                    *data = self.load_buffer;
                    self.nvm_writes += 1;
                }
            }
            FtpOpcode::ReadPl | FtpOpcode::ReadSer | FtpOpcode::SoftProgSector => {}
        }

        self.registers[usize::from(reg::FTP_CTRL_0)] &= !reg::REQ;
    }

    fn rw_buffer_mut(&mut self) -> &mut [u8] {
        let start = usize::from(reg::RW_BUFFER);
        &mut self.registers[start..start + SECTOR_LEN]
    }
}

impl ErrorType for EmulatedStusb4500 {
    type Error = ErrorKind;
}

impl I2c for EmulatedStusb4500 {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.fault == ChipFault::Absent || address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    let Some((&register, payload)) = bytes.split_first() else {
                        continue;
                    };
                    self.pointer = register;
                    for &value in payload {
                        self.write_register(self.pointer, value);
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
                Operation::Read(buffer) => {
                    for slot in buffer.iter_mut() {
                        *slot = self.register(self.pointer);
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}
