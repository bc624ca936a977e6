//! Firmware entry point: one programming cycle per boot.

use defmt::{error, info};
use defmt_rtt as _;
use embassy_executor::Spawner;
use programmer_core::config::ProgrammerConfig;
use programmer_core::cycle::ProgrammingCycle;
use programmer_core::driver::Stusb4500;
use programmer_core::profile::DESIRED_PROFILE;
use programmer_core::status::StatusSignal;

use crate::hw::{Board, BusyWaitClock};
use crate::telemetry::DefmtObserver;

#[embassy_executor::main]
pub async fn main(_spawner: Spawner) {
    let config = ProgrammerConfig::DEFAULT;
    let p = embassy_rp::init(embassy_rp::config::Config::default());
    let board = Board::new(p, &config.bus);

    let mut status = StatusSignal::new(board.status_led, config.signal);
    let controller = Stusb4500::new(board.controller_bus, config.bus.address);

    info!(
        "PD programmer starting, controller at {=u8:#x}",
        config.bus.address
    );

    let mut cycle = ProgrammingCycle::new(config, DESIRED_PROFILE, BusyWaitClock, DefmtObserver);
    let (outcome, _controller) = cycle.execute(controller);
    match &outcome {
        Ok(_) => info!("profile programmed and verified"),
        Err(failure) => error!("{}", defmt::Display2Format(failure)),
    }

    if let Err(rejected) = cycle.signal(&mut status, &outcome) {
        error!("{}", rejected);
    }

    cycle.conclude(status, board.restart)
}
