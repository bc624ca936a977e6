//! Board bindings for the core traits.

use core::time::Duration;

use embassy_rp::Peripherals;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::i2c::{self, Blocking, I2c};
use embassy_rp::peripherals::I2C1;
use embassy_rp::watchdog::Watchdog;
use programmer_core::clock::BlockingClock;
use programmer_core::config::BusConfig;
use programmer_core::reboot::SystemRestart;
use programmer_core::status::Indicator;

/// Controller bus type on this board.
pub type ControllerBus = I2c<'static, I2C1, Blocking>;

/// Raspberry Pi Pico wiring.
///
/// | Signal | Pin |
/// |---|---|
/// | status LED | GP25 (on-board) |
/// | controller SDA | GP14, I2C1 |
/// | controller SCL | GP15, I2C1 |
pub struct Board {
    pub status_led: LedIndicator,
    pub controller_bus: ControllerBus,
    pub restart: WatchdogRestart,
}

impl Board {
    pub fn new(p: Peripherals, bus: &BusConfig) -> Self {
        let mut bus_config = i2c::Config::default();
        bus_config.frequency = bus.frequency_hz;
        bus_config.sda_pullup = true;
        bus_config.scl_pullup = true;

        Self {
            status_led: LedIndicator::new(Output::new(p.PIN_25, Level::Low)),
            controller_bus: I2c::new_blocking(p.I2C1, p.PIN_15, p.PIN_14, bus_config),
            restart: WatchdogRestart::new(Watchdog::new(p.WATCHDOG)),
        }
    }
}

/// Status LED output.
pub struct LedIndicator {
    pin: Output<'static>,
}

impl LedIndicator {
    pub fn new(pin: Output<'static>) -> Self {
        Self { pin }
    }
}

impl Indicator for LedIndicator {
    fn set_lit(&mut self, lit: bool) {
        self.pin.set_level(Level::from(lit));
    }
}

/// Busy-waits on the embassy time driver.
///
/// The cycle is strictly sequential, so nothing else needs the core while
/// it waits.
pub struct BusyWaitClock;

impl BlockingClock for BusyWaitClock {
    fn wait(&mut self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        embassy_time::block_for(embassy_time::Duration::from_micros(micros));
    }
}

/// Restarts the chip through the watchdog.
pub struct WatchdogRestart {
    watchdog: Watchdog,
}

impl WatchdogRestart {
    pub fn new(watchdog: Watchdog) -> Self {
        Self { watchdog }
    }
}

impl SystemRestart for WatchdogRestart {
    fn restart(&mut self) {
        self.watchdog.trigger_reset();
    }
}
