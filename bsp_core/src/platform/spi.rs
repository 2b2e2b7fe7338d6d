//! SPI controller driver.
//!
//! Both controllers move units of 1 to 32 bits through the same 32-bit queue data ports; the
//! configured unit length decides how many bits of each queued word go on the wire.

use bitfield::bitfield;
use log::debug;
use snafu::{ensure, OptionExt};

use super::{
    fifo::{FifoChannel, Unit, SPI_LAYOUT},
    memory_map,
    mmio::{Bus, RegisterBlock},
    ConfigError, DividerOutOfRangeSnafu, Endian, UnitLengthSnafu, ZeroBaudRateSnafu,
};

bitfield! {
    /// The SPI global configuration register (`glb_cfg`).
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct GlobalConfig(u32);
    impl Debug;
    u32;
    /// Clock polarity: SCK idles high.
    pub cpol, set_cpol: 0;
    /// Clock phase: data is sampled on the second edge.
    pub cpha, set_cpha: 1;
    /// Most significant bit first.
    pub big_endian, set_big_endian: 2;
    /// Bits per unit, minus one.
    pub u8, unit_len_minus_1, set_unit_len_minus_1: 7, 3;
    /// Delay between chip select and the first SCK edge, in SCK half periods.
    pub u8, sck_delay, set_sck_delay: 15, 8;
    /// SCK is the main clock divided by `2 * (clock_divider + 1)`.
    pub u16, clock_divider, set_clock_divider: 31, 16;
}

impl GlobalConfig {
    /// Interpret a raw register value.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw register value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Chip select lines idle high unless told otherwise.
pub const DEFAULT_CS_IDLE: u32 = 0xf;

/// Framing and clocking of an SPI controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SpiConfig {
    /// Clock polarity.
    pub cpol: bool,
    /// Clock phase.
    pub cpha: bool,
    /// Bit order of each unit.
    pub endian: Endian,
    /// Bits per unit, 1 through 32.
    pub unit_len: u8,
    /// See [`GlobalConfig::sck_delay`].
    pub sck_delay: u8,
    /// See [`GlobalConfig::clock_divider`].
    pub clock_divider: u16,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            cpol: false,
            cpha: false,
            endian: Endian::Little,
            unit_len: 8,
            sck_delay: 1,
            clock_divider: 1,
        }
    }
}

/// Compute the clock divider that produces an SCK of at most `sck_hz` from `clock_hz`.
pub fn sck_divider(clock_hz: u32, sck_hz: u32) -> Result<u16, ConfigError> {
    ensure!(sck_hz != 0, ZeroBaudRateSnafu);
    let half_periods = clock_hz / sck_hz.saturating_mul(2);
    let divider = half_periods.saturating_sub(1);
    ensure!(
        half_periods != 0,
        DividerOutOfRangeSnafu {
            rate: sck_hz,
            divider: 0u32,
        }
    );
    u16::try_from(divider).ok().context(DividerOutOfRangeSnafu {
        rate: sck_hz,
        divider,
    })
}

impl SpiConfig {
    /// Encode this configuration as a `glb_cfg` value.
    pub fn encode(&self) -> Result<GlobalConfig, ConfigError> {
        ensure!(
            (1..=32).contains(&self.unit_len),
            UnitLengthSnafu {
                bits: self.unit_len
            }
        );
        let mut cfg = GlobalConfig(0);
        cfg.set_cpol(self.cpol);
        cfg.set_cpha(self.cpha);
        cfg.set_big_endian(self.endian.is_big());
        cfg.set_unit_len_minus_1(self.unit_len - 1);
        cfg.set_sck_delay(self.sck_delay);
        cfg.set_clock_divider(self.clock_divider);
        Ok(cfg)
    }

    /// Recover the configuration held in a `glb_cfg` value.
    pub fn decode(cfg: GlobalConfig) -> Self {
        Self {
            cpol: cfg.cpol(),
            cpha: cfg.cpha(),
            endian: Endian::from_bit(cfg.big_endian()),
            unit_len: cfg.unit_len_minus_1() + 1,
            sck_delay: cfg.sck_delay(),
            clock_divider: cfg.clock_divider(),
        }
    }
}

mod regs {
    pub const GLB_CFG: usize = 0x0;
    pub const RECV_EN: usize = 0x4;
    pub const CS_IDLE: usize = 0x8;
    pub const CS_MASK: usize = 0xc;
}

/// One of the two SPI controllers.
pub struct Spi<'b, B: ?Sized> {
    regs: RegisterBlock<'b, B>,
    channel: FifoChannel<'b, B>,
}

impl<'b, B: Bus + ?Sized> Spi<'b, B> {
    fn at(bus: &'b B, base: usize) -> Self {
        let regs = RegisterBlock::new(bus, base);
        Self {
            regs,
            channel: FifoChannel::new(regs, &SPI_LAYOUT),
        }
    }

    /// The first SPI controller.
    pub fn spi0(bus: &'b B) -> Self {
        Self::at(bus, memory_map::SPI0_BASE)
    }

    /// The second SPI controller.
    pub fn spi1(bus: &'b B) -> Self {
        Self::at(bus, memory_map::SPI1_BASE)
    }

    /// Configure the controller.
    ///
    /// Only the low four bits of `cs_mask` select chip select lines. When `recv_enable` is false
    /// the units shifted in during a transfer are discarded instead of queued.
    pub fn init(&self, config: &SpiConfig, cs_mask: u32, recv_enable: bool) -> Result<(), ConfigError> {
        let cfg = config.encode()?;
        debug!(
            "{:?}: spi config {config:?} -> {cfg:?}, cs_mask=0x{cs_mask:x}, recv={recv_enable}",
            self.regs
        );
        self.regs.write(regs::GLB_CFG, cfg.0);
        self.regs.write(regs::CS_IDLE, DEFAULT_CS_IDLE);
        self.set_cs_mask(cs_mask);
        self.regs.write(regs::RECV_EN, u32::from(recv_enable));
        Ok(())
    }

    /// The configuration currently held by the hardware.
    pub fn config(&self) -> SpiConfig {
        SpiConfig::decode(GlobalConfig(self.regs.read(regs::GLB_CFG)))
    }

    /// Select which chip select lines are driven during transfers.
    pub fn set_cs_mask(&self, cs_mask: u32) {
        self.regs.write(regs::CS_MASK, cs_mask & 0xf);
    }

    /// Set the level chip select lines rest at between transfers.
    pub fn set_cs_idle(&self, cs_idle: u32) {
        self.regs.write(regs::CS_IDLE, cs_idle & 0xf);
    }

    /// The transmit and receive queues of this controller.
    pub fn channel(&self) -> &FifoChannel<'b, B> {
        &self.channel
    }

    /// Transmit every unit of `buf`, waiting for queue space as needed.
    pub fn send<U: Unit>(&self, buf: &[U]) {
        self.channel.send(buf);
    }

    /// Fill `buf` with received units, waiting for each as needed.
    pub fn recv<U: Unit>(&self, buf: &mut [U]) {
        self.channel.recv(buf);
    }
}
