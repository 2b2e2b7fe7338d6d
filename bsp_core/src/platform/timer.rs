//! Timer drivers: the 64-bit system timer in the system controller, and the 32-bit general
//! purpose timer and watchdog blocks.

use bitfield::bitfield;
use log::{debug, trace};

use super::{
    memory_map,
    mmio::{Bus, RegisterBlock},
    slc_regs,
};

bitfield! {
    /// The configuration register shared by every timer block (`tmr_cfg` in the system
    /// controller, `cfg` in the timer and watchdog blocks).
    ///
    /// The system timer has no event enable bit, it always raises the core timer interrupt.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct TimerConfig(u32);
    impl Debug;
    u32;
    /// The counter is running.
    pub count_enable, set_count_enable: 0;
    /// Reset the counter to zero when it reaches the compare value.
    pub auto_clear, set_auto_clear: 1;
    /// Raise an interrupt when the counter reaches the compare value.
    pub event_enable, set_event_enable: 2;
    /// Counter clock is the main clock divided by `clock_divider + 1`.
    pub u16, clock_divider, set_clock_divider: 31, 16;
}

impl TimerConfig {
    /// Interpret a raw register value.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw register value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// The free-running 64-bit system timer whose compare match raises the core timer interrupt.
///
/// The counter is exposed as two independent 32-bit registers, so reads must detect a carry from
/// the low half into the high half between samples.
pub struct SystemTimer<'b, B: ?Sized> {
    regs: RegisterBlock<'b, B>,
}

impl<'b, B: Bus + ?Sized> SystemTimer<'b, B> {
    /// Create a handle to the system timer.
    pub fn new(bus: &'b B) -> Self {
        Self {
            regs: RegisterBlock::new(bus, memory_map::SLC_BASE),
        }
    }

    fn config(&self) -> TimerConfig {
        TimerConfig(self.regs.read(slc_regs::TMR_CFG))
    }

    /// Configure the counter clock, the auto-clear behavior and the compare value.
    /// Does not start or stop the counter.
    pub fn init(&self, auto_clear: bool, clock_divider: u16, compare: u64) {
        let mut cfg = self.config();
        cfg.set_auto_clear(auto_clear);
        cfg.set_clock_divider(clock_divider);
        debug!("system timer config {cfg:?}, compare={compare}");
        self.regs.write(slc_regs::TMR_CFG, cfg.0);
        self.set_compare(compare);
    }

    /// Start counting.
    pub fn start(&self) {
        self.regs.modify(slc_regs::TMR_CFG, |v| {
            let mut cfg = TimerConfig(v);
            cfg.set_count_enable(true);
            cfg.0
        });
    }

    /// Stop counting. The current value is kept.
    pub fn stop(&self) {
        self.regs.modify(slc_regs::TMR_CFG, |v| {
            let mut cfg = TimerConfig(v);
            cfg.set_count_enable(false);
            cfg.0
        });
    }

    /// True if the counter is currently running.
    pub fn is_running(&self) -> bool {
        self.config().count_enable()
    }

    /// Set the compare value, low half first.
    pub fn set_compare(&self, compare: u64) {
        let (high, low) = split(compare);
        self.regs.write(slc_regs::TMR_CMP, low);
        self.regs.write(slc_regs::TMR_CMPH, high);
    }

    /// Read the 64-bit counter value.
    ///
    /// The high half is sampled before and after the low half; if they differ the low half
    /// rolled over in between and the whole read is retried. A retry needs another full rollover
    /// of the low half to fail again, so this returns after at most two passes in practice.
    pub fn value(&self) -> u64 {
        loop {
            let high = self.regs.read(slc_regs::TMR_VALH);
            let low = self.regs.read(slc_regs::TMR_VAL);
            if high == self.regs.read(slc_regs::TMR_VALH) {
                return (u64::from(high) << 32) | u64::from(low);
            }
            trace!("torn system timer read (high=0x{high:x}, low=0x{low:x}), retrying");
        }
    }

    /// Overwrite the 64-bit counter value.
    ///
    /// A running counter is stopped around the two half writes so that it cannot carry between
    /// them, and restarted afterwards only if it had been running.
    pub fn set_value(&self, value: u64) {
        let was_running = self.is_running();
        if was_running {
            self.stop();
        }
        let (high, low) = split(value);
        self.regs.write(slc_regs::TMR_VAL, low);
        self.regs.write(slc_regs::TMR_VALH, high);
        if was_running {
            self.start();
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn split(value: u64) -> (u32, u32) {
    ((value >> 32) as u32, value as u32)
}

/// Register offsets of a general purpose timer block.
mod regs {
    pub const CFG: usize = 0x0;
    pub const VAL: usize = 0x4;
    pub const CMP: usize = 0x8;
    pub const CLR: usize = 0xc;
}

/// A 32-bit timer block: either the general purpose timer or the watchdog.
pub struct GeneralTimer<'b, B: ?Sized> {
    regs: RegisterBlock<'b, B>,
}

impl<'b, B: Bus + ?Sized> GeneralTimer<'b, B> {
    /// The general purpose timer, which raises [`crate::exceptions::interrupt::source::TIMER`].
    pub fn timer(bus: &'b B) -> Self {
        Self {
            regs: RegisterBlock::new(bus, memory_map::TIMER_BASE),
        }
    }

    /// The watchdog, which raises [`crate::exceptions::interrupt::source::WATCHDOG`].
    pub fn watchdog(bus: &'b B) -> Self {
        Self {
            regs: RegisterBlock::new(bus, memory_map::WATCHDOG_BASE),
        }
    }

    /// Configure the block. The counter is left stopped.
    pub fn init(&self, auto_clear: bool, event_enable: bool, clock_divider: u16, compare: u32) {
        let mut cfg = TimerConfig(0);
        cfg.set_auto_clear(auto_clear);
        cfg.set_event_enable(event_enable);
        cfg.set_clock_divider(clock_divider);
        debug!("timer {:?} config {cfg:?}, compare={compare}", self.regs);
        self.regs.write(regs::CFG, cfg.0);
        self.regs.write(regs::CMP, compare);
    }

    /// Start counting.
    pub fn start(&self) {
        self.regs.modify(regs::CFG, |v| {
            let mut cfg = TimerConfig(v);
            cfg.set_count_enable(true);
            cfg.0
        });
    }

    /// Stop counting.
    pub fn stop(&self) {
        self.regs.modify(regs::CFG, |v| {
            let mut cfg = TimerConfig(v);
            cfg.set_count_enable(false);
            cfg.0
        });
    }

    /// The current counter value.
    pub fn value(&self) -> u32 {
        self.regs.read(regs::VAL)
    }

    /// Reset the counter to zero. For the watchdog this is the periodic feed.
    pub fn clear(&self) {
        self.regs.write(regs::CLR, 1);
    }
}
