//! UART driver.

use bitfield::bitfield;
use log::debug;
use snafu::{ensure, OptionExt};

use super::{
    fifo::{FifoChannel, UART_LAYOUT},
    memory_map,
    mmio::{Bus, RegisterBlock},
    ConfigError, DataBitsSnafu, DividerOutOfRangeSnafu, Endian, ZeroBaudRateSnafu,
};

bitfield! {
    /// The UART global configuration register (`glb_cfg`).
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct GlobalConfig(u32);
    impl Debug;
    u32;
    /// Transmitter enabled.
    pub tx_enable, set_tx_enable: 0;
    /// Receiver enabled.
    pub rx_enable, set_rx_enable: 1;
    /// Number of data bits per frame, minus 5.
    pub u8, data_bits_minus_5, set_data_bits_minus_5: 3, 2;
    /// Two stop bits instead of one.
    pub two_stop_bits, set_two_stop_bits: 4;
    /// Most significant bit first.
    pub big_endian, set_big_endian: 5;
    /// A parity bit is sent and checked.
    pub parity_enable, set_parity_enable: 7;
    /// Parity kind, see [`Parity`].
    pub u8, parity_type, set_parity_type: 9, 8;
    /// Bit clock is the main clock divided by this.
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

    fn set_parity(&mut self, parity: Parity) {
        match parity.field() {
            Some(ty) => {
                self.set_parity_type(ty);
                self.set_parity_enable(true);
            }
            None => self.set_parity_enable(false),
        }
    }
}

/// Parity mode of a UART frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,
    /// Parity bit always 0.
    Space,
    /// Parity bit always 1.
    Mark,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

impl Parity {
    fn field(self) -> Option<u8> {
        match self {
            Parity::None => None,
            Parity::Space => Some(0),
            Parity::Mark => Some(1),
            Parity::Odd => Some(2),
            Parity::Even => Some(3),
        }
    }

    fn from_fields(enabled: bool, ty: u8) -> Self {
        if !enabled {
            return Parity::None;
        }
        match ty {
            0 => Parity::Space,
            1 => Parity::Mark,
            2 => Parity::Odd,
            _ => Parity::Even,
        }
    }
}

/// Number of stop bits in a UART frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum StopBits {
    /// One stop bit.
    #[default]
    One,
    /// Two stop bits.
    Two,
}

/// Framing and clocking of the UART.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UartConfig {
    /// Enable the transmitter.
    pub tx_enable: bool,
    /// Enable the receiver.
    pub rx_enable: bool,
    /// Bits per second.
    pub baud_rate: u32,
    /// Data bits per frame, 5 through 8.
    pub data_bits: u8,
    /// Stop bits per frame.
    pub stop_bits: StopBits,
    /// Parity mode.
    pub parity: Parity,
    /// Bit order on the wire.
    pub endian: Endian,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            tx_enable: true,
            rx_enable: true,
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: StopBits::One,
            parity: Parity::None,
            endian: Endian::Little,
        }
    }
}

/// Compute the clock divider that produces `baud_rate` from `clock_hz`.
///
/// The quotient is rounded up only when the remainder is strictly more than half the baud rate.
pub fn baud_divider(clock_hz: u32, baud_rate: u32) -> Result<u16, ConfigError> {
    ensure!(baud_rate != 0, ZeroBaudRateSnafu);
    let mut divider = clock_hz / baud_rate;
    if clock_hz % baud_rate > baud_rate / 2 {
        divider += 1;
    }
    u16::try_from(divider)
        .ok()
        .filter(|d| *d > 0)
        .context(DividerOutOfRangeSnafu {
            rate: baud_rate,
            divider,
        })
}

impl UartConfig {
    /// Encode this configuration as a `glb_cfg` value for a UART clocked at `clock_hz`.
    pub fn encode(&self, clock_hz: u32) -> Result<GlobalConfig, ConfigError> {
        ensure!(
            (5..=8).contains(&self.data_bits),
            DataBitsSnafu {
                bits: self.data_bits
            }
        );
        let mut cfg = GlobalConfig(0);
        cfg.set_tx_enable(self.tx_enable);
        cfg.set_rx_enable(self.rx_enable);
        cfg.set_data_bits_minus_5(self.data_bits - 5);
        cfg.set_two_stop_bits(self.stop_bits == StopBits::Two);
        cfg.set_big_endian(self.endian.is_big());
        cfg.set_parity(self.parity);
        cfg.set_clock_divider(baud_divider(clock_hz, self.baud_rate)?);
        Ok(cfg)
    }

    /// Recover the configuration held in a `glb_cfg` value.
    ///
    /// The baud rate is the nominal rate of the divider, which may differ slightly from the rate
    /// originally requested.
    pub fn decode(cfg: GlobalConfig, clock_hz: u32) -> Self {
        let divider = u32::from(cfg.clock_divider());
        Self {
            tx_enable: cfg.tx_enable(),
            rx_enable: cfg.rx_enable(),
            baud_rate: clock_hz.checked_div(divider).unwrap_or(0),
            data_bits: cfg.data_bits_minus_5() + 5,
            stop_bits: if cfg.two_stop_bits() {
                StopBits::Two
            } else {
                StopBits::One
            },
            parity: Parity::from_fields(cfg.parity_enable(), cfg.parity_type()),
            endian: Endian::from_bit(cfg.big_endian()),
        }
    }
}

/// The UART controller.
pub struct Uart<'b, B: ?Sized> {
    regs: RegisterBlock<'b, B>,
    channel: FifoChannel<'b, B>,
}

const GLB_CFG: usize = 0x0;

impl<'b, B: Bus + ?Sized> Uart<'b, B> {
    /// Create a handle to the UART.
    pub fn new(bus: &'b B) -> Self {
        let regs = RegisterBlock::new(bus, memory_map::UART_BASE);
        Self {
            regs,
            channel: FifoChannel::new(regs, &UART_LAYOUT),
        }
    }

    /// Write the framing and clocking configuration, derived from the main clock.
    pub fn init(&self, config: &UartConfig) -> Result<(), ConfigError> {
        let cfg = config.encode(super::MAIN_CLOCK_HZ)?;
        debug!("uart config {config:?} -> {cfg:?}");
        self.regs.write(GLB_CFG, cfg.0);
        Ok(())
    }

    /// The configuration currently held by the hardware.
    pub fn config(&self) -> UartConfig {
        UartConfig::decode(self.global_config(), super::MAIN_CLOCK_HZ)
    }

    /// The raw global configuration register.
    pub fn global_config(&self) -> GlobalConfig {
        GlobalConfig(self.regs.read(GLB_CFG))
    }

    /// Change only the parity of the frame, leaving every other field as configured.
    pub fn set_parity(&self, parity: Parity) {
        self.regs.modify(GLB_CFG, |v| {
            let mut cfg = GlobalConfig(v);
            cfg.set_parity(parity);
            debug!("uart parity {parity:?} -> {cfg:?}");
            cfg.0
        });
    }

    /// The transmit and receive queues of the UART.
    pub fn channel(&self) -> &FifoChannel<'b, B> {
        &self.channel
    }

    /// Transmit `buf`, waiting for queue space as needed.
    pub fn send(&self, buf: &[u8]) {
        self.channel.send(buf);
    }

    /// Fill `buf` with received bytes, waiting for each as needed.
    pub fn recv(&self, buf: &mut [u8]) {
        self.channel.recv(buf);
    }
}
