//! Definitions and drivers for the peripherals of the uv SoC.

use snafu::Snafu;

pub mod console;
pub mod fifo;
pub mod gpio;
pub mod i2c;
pub mod mmio;
pub mod spi;
pub mod timer;
pub mod uart;

/// Frequency of the main clock that feeds every peripheral clock divider.
pub const MAIN_CLOCK_HZ: u32 = 100_000_000;

/// Physical base addresses of every register block and memory on the board.
pub mod memory_map {
    /// System-level controller: reset vector, system timer, scratch register and the external
    /// interrupt controller.
    pub const SLC_BASE: usize = 0x0800_0000;
    /// General purpose IO.
    pub const GPIO_BASE: usize = 0x7000_0000;
    /// UART.
    pub const UART_BASE: usize = 0x7000_1000;
    /// I2C controller.
    pub const I2C_BASE: usize = 0x7000_2000;
    /// First SPI controller.
    pub const SPI0_BASE: usize = 0x7000_3000;
    /// Second SPI controller.
    pub const SPI1_BASE: usize = 0x7000_4000;
    /// General purpose timer.
    pub const TIMER_BASE: usize = 0x7000_5000;
    /// Watchdog timer.
    pub const WATCHDOG_BASE: usize = 0x7000_6000;
    /// Debug module.
    pub const DEBUG_BASE: usize = 0x7000_7000;

    /// Boot ROM.
    pub const ROM_START: usize = 0x0400_0000;
    /// Size of the boot ROM in bytes.
    pub const ROM_LENGTH: usize = 8;
    /// On-chip SRAM.
    pub const SRAM_START: usize = 0x1000_0000;
    /// Size of the SRAM in bytes.
    pub const SRAM_LENGTH: usize = 64 * 1024;
    /// Embedded flash that holds the program image.
    pub const EFLASH_START: usize = 0x2000_0000;
    /// Size of the embedded flash in bytes.
    pub const EFLASH_LENGTH: usize = 1024 * 1024;
}

/// Register offsets of the system-level controller (relative to [`memory_map::SLC_BASE`]).
#[allow(unused)]
pub(crate) mod slc_regs {
    pub const RST_VEC: usize = 0x00;
    pub const SFT_IRQ: usize = 0x04;
    pub const TMR_CFG: usize = 0x08;
    pub const TMR_VAL: usize = 0x0c;
    pub const TMR_VALH: usize = 0x10;
    pub const TMR_CMP: usize = 0x14;
    pub const TMR_CMPH: usize = 0x18;
    pub const SLC_RST: usize = 0x1c;
    pub const DEV_RST: usize = 0x20;
    pub const SYS_ICG: usize = 0x24;
    pub const SCRATCH: usize = 0x28;
    pub const GPIO_MODE: usize = 0x2c;
}

/// Bit/byte order of the mapping between queue units and the wire.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Endian {
    /// Least significant bit first.
    #[default]
    Little,
    /// Most significant bit first.
    Big,
}

impl Endian {
    fn from_bit(big: bool) -> Self {
        if big {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    fn is_big(self) -> bool {
        matches!(self, Endian::Big)
    }
}

/// Errors from turning a peripheral configuration into register values.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ConfigError {
    /// A baud rate of zero was requested.
    #[snafu(display("baud rate must be non-zero"))]
    ZeroBaudRate,
    /// The clock divider for the requested rate does not fit in its register field.
    #[snafu(display("clock divider {divider} for {rate} does not fit in 16 bits"))]
    DividerOutOfRange {
        /// The requested rate.
        rate: u32,
        /// The divider that would be required.
        divider: u32,
    },
    /// UART frames carry between 5 and 8 data bits.
    #[snafu(display("unsupported number of UART data bits: {bits}"))]
    DataBits {
        /// The requested number of bits.
        bits: u8,
    },
    /// SPI units are between 1 and 32 bits long.
    #[snafu(display("unsupported SPI unit length: {bits}"))]
    UnitLength {
        /// The requested number of bits.
        bits: u8,
    },
}

/// The software interrupt line of the core, driven through the system controller.
pub struct SoftwareInterrupt<'b, B: ?Sized> {
    regs: mmio::RegisterBlock<'b, B>,
}

impl<'b, B: mmio::Bus + ?Sized> SoftwareInterrupt<'b, B> {
    /// Create a handle to the software interrupt register.
    pub fn new(bus: &'b B) -> Self {
        Self {
            regs: mmio::RegisterBlock::new(bus, memory_map::SLC_BASE),
        }
    }

    /// Assert the software interrupt.
    pub fn raise(&self) {
        self.regs.write(slc_regs::SFT_IRQ, 1);
    }

    /// Deassert the software interrupt; handlers call this before returning.
    pub fn clear(&self) {
        self.regs.write(slc_regs::SFT_IRQ, 0);
    }
}
