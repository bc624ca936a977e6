#![no_std]

#[cfg(test)]
extern crate std;

// Shared logic for the PD programmer.
//
// Everything that decides *what* happens during a programming cycle lives
// here so the RP2040 firmware and the host emulator drive the exact same
// configure, commit, verify and signal state machine.

pub mod clock;
pub mod config;
pub mod cycle;
pub mod driver;
pub mod profile;
pub mod reboot;
pub mod sequencer;
pub mod status;
pub mod telemetry;
pub mod verify;
