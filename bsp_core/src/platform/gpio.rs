//! General purpose IO.
//!
//! Every register holds one bit per pin. Interrupts from pin `n` reach the external interrupt
//! controller as source [`crate::exceptions::interrupt::source::gpio`]`(n)`.

use log::{debug, warn};

use super::{
    memory_map,
    mmio::{Bus, RegisterBlock},
    slc_regs,
};

mod regs {
    pub const PULL_UP: usize = 0x00;
    pub const PULL_DOWN: usize = 0x04;
    pub const IN_VALUE: usize = 0x08;
    pub const IN_ENABLE: usize = 0x0c;
    pub const OUT_VALUE: usize = 0x10;
    pub const OUT_ENABLE: usize = 0x14;
    pub const IRQ_PEND: usize = 0x18;
    pub const IRQ_ENABLE: usize = 0x1c;
}

/// Number of GPIO pins.
pub const PIN_COUNT: u32 = 32;

/// Which way a pin is driven.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    /// Neither driven nor sampled.
    Disabled,
    /// Sampled into `in_value`.
    Input,
    /// Driven from `out_value`.
    Output,
}

/// Internal pull resistor of a pin.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Pull {
    /// Floating.
    #[default]
    None,
    /// Pulled up.
    Up,
    /// Pulled down.
    Down,
}

/// The GPIO block.
pub struct Gpio<'b, B: ?Sized> {
    regs: RegisterBlock<'b, B>,
    slc: RegisterBlock<'b, B>,
}

/// Bit of `pin`, or no bits at all for a pin the block does not have.
fn pin_mask(pin: u32) -> u32 {
    match 1u32.checked_shl(pin) {
        Some(mask) if pin < PIN_COUNT => mask,
        _ => {
            warn!("gpio pin {pin} out of range");
            0
        }
    }
}

fn with_bit(value: u32, pin: u32, set: bool) -> u32 {
    let mask = pin_mask(pin);
    if set {
        value | mask
    } else {
        value & !mask
    }
}

impl<'b, B: Bus + ?Sized> Gpio<'b, B> {
    /// Create a handle to the GPIO block.
    pub fn new(bus: &'b B) -> Self {
        Self {
            regs: RegisterBlock::new(bus, memory_map::GPIO_BASE),
            slc: RegisterBlock::new(bus, memory_map::SLC_BASE),
        }
    }

    /// Select the pin function multiplexing in the system controller.
    pub fn set_mode(&self, mode: u32) {
        debug!("gpio mode 0x{mode:x}");
        self.slc.write(slc_regs::GPIO_MODE, mode);
    }

    /// Set the direction of `pin`.
    pub fn set_direction(&self, pin: u32, direction: Direction) {
        self.regs.modify(regs::IN_ENABLE, |v| {
            with_bit(v, pin, direction == Direction::Input)
        });
        self.regs.modify(regs::OUT_ENABLE, |v| {
            with_bit(v, pin, direction == Direction::Output)
        });
    }

    /// Set the pull resistor of `pin`.
    pub fn set_pull(&self, pin: u32, pull: Pull) {
        self.regs
            .modify(regs::PULL_UP, |v| with_bit(v, pin, pull == Pull::Up));
        self.regs
            .modify(regs::PULL_DOWN, |v| with_bit(v, pin, pull == Pull::Down));
    }

    /// Drive output `pin` high or low.
    pub fn write(&self, pin: u32, high: bool) {
        self.regs
            .modify(regs::OUT_VALUE, |v| with_bit(v, pin, high));
    }

    /// Sample input `pin`.
    pub fn read(&self, pin: u32) -> bool {
        self.regs.read(regs::IN_VALUE) & pin_mask(pin) != 0
    }

    /// Sample every input pin at once.
    pub fn read_all(&self) -> u32 {
        self.regs.read(regs::IN_VALUE)
    }

    /// Enable or disable the interrupt of `pin`.
    pub fn set_irq(&self, pin: u32, enabled: bool) {
        self.regs
            .modify(regs::IRQ_ENABLE, |v| with_bit(v, pin, enabled));
    }

    /// Bitmap of pins with a pending interrupt.
    pub fn pending(&self) -> u32 {
        self.regs.read(regs::IRQ_PEND)
    }
}
