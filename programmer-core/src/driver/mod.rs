//! Controller driver abstraction.
//!
//! [`PdController`] is the capability set the programming cycle consumes.
//! Setters follow "set now, commit later" semantics: they only touch an
//! in-memory shadow and report nothing, so a misapplied field shows up at
//! verification time. Everything that crosses the bus returns a `Result`.

use core::fmt;

use crate::profile::PdoIndex;

pub mod nvm;
pub mod stusb4500;

pub use nvm::NvmImage;
pub use stusb4500::{Stusb4500, Stusb4500Error};

/// Driver-independent cause of a failed bus operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverFault {
    /// Nothing acknowledged the address or a data byte.
    NoAcknowledge,
    ArbitrationLoss,
    /// Bus error or overrun reported by the I2C peripheral.
    Bus,
    /// Something answered at the address but it is not the expected part.
    UnexpectedDeviceId(u8),
    /// An NVM request never completed.
    NvmTimeout,
    Other,
}

impl fmt::Display for DriverFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverFault::NoAcknowledge => f.write_str("no acknowledge"),
            DriverFault::ArbitrationLoss => f.write_str("arbitration lost"),
            DriverFault::Bus => f.write_str("bus error"),
            DriverFault::UnexpectedDeviceId(id) => write!(f, "unexpected device id {id:#04x}"),
            DriverFault::NvmTimeout => f.write_str("nvm request timed out"),
            DriverFault::Other => f.write_str("unclassified bus error"),
        }
    }
}

/// Driver errors that can name their [`DriverFault`].
///
/// Telemetry events are `Copy` and driver-agnostic, so they carry the fault
/// rather than the driver's own error type.
pub trait DriverError {
    fn fault(&self) -> DriverFault;
}

/// Get/set access to a PD controller's power profile.
pub trait PdController {
    /// Bus or device error surfaced by the driver.
    type Error: fmt::Debug + fmt::Display + DriverError;

    /// Checks the controller identity and loads its current configuration.
    fn initialize(&mut self) -> Result<(), Self::Error>;

    fn set_pdo_count(&mut self, count: u8);
    fn set_voltage(&mut self, pdo: PdoIndex, volts: f32);
    fn set_current(&mut self, pdo: PdoIndex, amps: f32);
    fn set_lower_limit(&mut self, pdo: PdoIndex, percent: u8);
    fn set_upper_limit(&mut self, pdo: PdoIndex, percent: u8);
    fn set_external_power_only(&mut self, enabled: bool);
    fn set_usb_comm_capable(&mut self, enabled: bool);
    fn set_config_ok_mode(&mut self, mode: u8);
    fn set_power_above_5v_only(&mut self, enabled: bool);

    /// Persists the shadow configuration to the non-volatile store.
    fn commit_to_store(&mut self) -> Result<(), Self::Error>;

    /// Reloads active registers from the store and renegotiates the contract.
    fn soft_reset(&mut self) -> Result<(), Self::Error>;

    /// Refreshes the shadow from the non-volatile store.
    fn reload(&mut self) -> Result<(), Self::Error>;

    fn pdo_count(&self) -> u8;
    fn voltage(&self, pdo: PdoIndex) -> f32;
    fn current(&self, pdo: PdoIndex) -> f32;
    fn lower_limit(&self, pdo: PdoIndex) -> u8;
    fn upper_limit(&self, pdo: PdoIndex) -> u8;
    fn external_power_only(&self) -> bool;
    fn usb_comm_capable(&self) -> bool;
    fn config_ok_mode(&self) -> u8;
    fn power_above_5v_only(&self) -> bool;
}

/// Bring-up failure reported when a session cannot be opened.
///
/// The driver is handed back so the caller keeps ownership of the bus.
pub struct InitError<D: PdController> {
    pub source: D::Error,
    pub driver: D,
}

impl<D: PdController> fmt::Debug for InitError<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitError")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl<D: PdController> fmt::Display for InitError<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "controller bring-up failed: {}", self.source)
    }
}

impl<D: PdController> InitError<D> {
    #[must_use]
    pub fn fault(&self) -> DriverFault {
        self.source.fault()
    }
}

/// An initialized controller, owned for the lifetime of one cycle.
///
/// The only way to build a session is [`ControllerSession::open`], so holding
/// one proves bring-up succeeded. The sequencer and the verifier borrow it in
/// turn; nothing else touches the bus.
pub struct ControllerSession<D> {
    driver: D,
}

impl<D: PdController> ControllerSession<D> {
    /// Initializes `driver` and wraps it in a session.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`], holding the driver, if `initialize` fails.
    pub fn open(mut driver: D) -> Result<Self, InitError<D>> {
        match driver.initialize() {
            Ok(()) => Ok(Self { driver }),
            Err(source) => Err(InitError { source, driver }),
        }
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    #[must_use]
    pub fn into_driver(self) -> D {
        self.driver
    }
}
