//! I2C controller driver.
//!
//! A transfer is a number of frames queued in the transmit queue, started explicitly and
//! finished when the controller drops its busy flag.

use bitfield::bitfield;
use log::{debug, trace};

use super::{
    fifo::{FifoChannel, SPI_LAYOUT},
    memory_map,
    mmio::{Bus, RegisterBlock},
};

bitfield! {
    /// The I2C global configuration register (`glb_cfg`).
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct GlobalConfig(u32);
    impl Debug;
    u32;
    /// Hold time of SDA after the SCL falling edge, in main clock cycles.
    pub u16, sda_delay, set_sda_delay: 15, 0;
    /// SCL clock divider.
    pub u16, clock_divider, set_clock_divider: 31, 16;
}

/// Clocking of the I2C controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct I2cConfig {
    /// See [`GlobalConfig::sda_delay`].
    pub sda_delay: u16,
    /// See [`GlobalConfig::clock_divider`].
    pub clock_divider: u16,
}

impl Default for I2cConfig {
    fn default() -> Self {
        // 100 kHz standard mode from the main clock
        Self {
            sda_delay: 10,
            clock_divider: 250,
        }
    }
}

impl I2cConfig {
    /// Encode this configuration as a `glb_cfg` value.
    pub fn encode(&self) -> GlobalConfig {
        let mut cfg = GlobalConfig(0);
        cfg.set_sda_delay(self.sda_delay);
        cfg.set_clock_divider(self.clock_divider);
        cfg
    }
}

mod regs {
    pub const GLB_CFG: usize = 0x0;
    pub const NFRAMES: usize = 0x4;
    pub const START: usize = 0x8;
    pub const BUSY: usize = 0xc;
}

/// The I2C controller. Shares its queue layout with the SPI controllers.
pub struct I2c<'b, B: ?Sized> {
    regs: RegisterBlock<'b, B>,
    channel: FifoChannel<'b, B>,
}

impl<'b, B: Bus + ?Sized> I2c<'b, B> {
    /// Create a handle to the I2C controller.
    pub fn new(bus: &'b B) -> Self {
        let regs = RegisterBlock::new(bus, memory_map::I2C_BASE);
        Self {
            regs,
            channel: FifoChannel::new(regs, &SPI_LAYOUT),
        }
    }

    /// Write the clocking configuration.
    pub fn init(&self, config: &I2cConfig) {
        let cfg = config.encode();
        debug!("i2c config {config:?} -> {cfg:?}");
        self.regs.write(regs::GLB_CFG, cfg.0);
    }

    /// True while a transfer is in progress.
    pub fn is_busy(&self) -> bool {
        self.regs.read(regs::BUSY) != 0
    }

    /// Start a transfer of `frames` frames from the transmit queue.
    pub fn start(&self, frames: u32) {
        trace!("i2c start, {frames} frames");
        self.regs.write(regs::NFRAMES, frames);
        self.regs.write(regs::START, 1);
    }

    /// Spin until the current transfer finishes.
    pub fn wait_idle(&self) {
        while self.is_busy() {
            core::hint::spin_loop();
        }
    }

    /// Queue `frames`, run the transfer and wait for it to finish.
    #[allow(clippy::cast_possible_truncation)]
    pub fn transfer(&self, frames: &[u8]) {
        self.channel.send(frames);
        self.start(frames.len() as u32);
        self.wait_idle();
    }

    /// The transmit and receive queues of the controller.
    pub fn channel(&self) -> &FifoChannel<'b, B> {
        &self.channel
    }
}
