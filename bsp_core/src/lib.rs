//! Board support policies and drivers for the uv RISC-V microcontroller.
//!
//! Everything in this crate is expressed over the [`platform::mmio::Bus`] register access
//! primitive, so it runs unmodified on the real SoC and on the host against a simulated board.
#![no_std]
#![deny(missing_docs)]

#[cfg(all(test, not(target_os = "none")))]
#[macro_use]
extern crate std;

pub mod exceptions;
pub mod logger;
pub mod platform;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod sim;
