//! Hardware queue channels shared by the UART, SPI and I2C controllers.
//!
//! Each controller has a transmit queue and a receive queue. A queue exposes its capacity, its
//! current length, a clear control and a single data port: writing the port enqueues, reading it
//! dequeues. The hardware ignores writes to a full queue and returns garbage for reads of an empty
//! one, so every access here is preceded by observing the length.

use bitfield::bitfield;
use log::{debug, trace};

use super::mmio::{Bus, RegisterBlock};

/// A value that can be moved through a queue data port.
///
/// The data port is always 32 bits wide; narrower units occupy its low bits.
pub trait Unit: Copy + Send + 'static {
    /// The all-zero unit, used to initialize buffers.
    const ZERO: Self;

    /// Widen the unit to a data port word.
    fn into_word(self) -> u32;

    /// Take the unit from the low bits of a data port word.
    fn from_word(word: u32) -> Self;
}

impl Unit for u8 {
    const ZERO: Self = 0;

    fn into_word(self) -> u32 {
        u32::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_word(word: u32) -> Self {
        word as u8
    }
}

impl Unit for u16 {
    const ZERO: Self = 0;

    fn into_word(self) -> u32 {
        u32::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_word(word: u32) -> Self {
        word as u16
    }
}

impl Unit for u32 {
    const ZERO: Self = 0;

    fn into_word(self) -> u32 {
        self
    }

    fn from_word(word: u32) -> Self {
        word
    }
}

bitfield! {
    /// The per-channel interrupt enable (`ie`) and pending (`ip`) registers.
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct IrqFlags(u32);
    impl Debug;
    u32;
    /// The transmit queue length is at or below the transmit threshold.
    pub transmit, set_transmit: 0;
    /// The receive queue length is at or above the receive threshold.
    pub receive, set_receive: 1;
}

impl IrqFlags {
    /// Interpret a raw register value.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw register value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Offsets of one queue's registers relative to the queue's first register.
mod queue {
    pub const CAP: usize = 0x0;
    pub const LEN: usize = 0x4;
    pub const CLR: usize = 0x8;
    pub const DAT: usize = 0xc;
}

/// Where the queue and interrupt registers of a channel live inside its register block.
#[derive(Debug)]
pub struct Layout {
    /// First register of the transmit queue.
    pub txq: usize,
    /// First register of the receive queue.
    pub rxq: usize,
    /// Interrupt enable register.
    pub ie: usize,
    /// Interrupt pending register.
    pub ip: usize,
    /// Transmit interrupt threshold register.
    pub tx_threshold: usize,
    /// Receive interrupt threshold register.
    pub rx_threshold: usize,
}

/// The UART packs its queues directly after the global configuration register.
pub(crate) static UART_LAYOUT: Layout = Layout {
    txq: 0x04,
    rxq: 0x14,
    ie: 0x24,
    ip: 0x28,
    tx_threshold: 0x2c,
    rx_threshold: 0x30,
};

/// SPI and I2C have four control registers before their queues.
pub(crate) static SPI_LAYOUT: Layout = Layout {
    txq: 0x10,
    rxq: 0x20,
    ie: 0x30,
    ip: 0x34,
    tx_threshold: 0x38,
    rx_threshold: 0x3c,
};

/// Clamp a requested receive interrupt threshold into `[1, capacity]`.
///
/// A threshold of zero would keep the interrupt asserted on an empty queue and one above the
/// capacity could never be reached, so out-of-range requests use the full capacity instead.
pub fn clamp_rx_threshold(threshold: u32, capacity: u32) -> u32 {
    if threshold > 0 && threshold <= capacity {
        threshold
    } else {
        capacity
    }
}

/// Clamp a requested transmit interrupt threshold into `[0, capacity)`.
///
/// A full queue can never be at or below a threshold equal to the capacity in a useful way, so
/// out-of-range requests fall back to interrupting on an empty queue.
pub fn clamp_tx_threshold(threshold: u32, capacity: u32) -> u32 {
    if threshold < capacity {
        threshold
    } else {
        0
    }
}

/// The queues and interrupt controls of one peripheral controller.
pub struct FifoChannel<'b, B: ?Sized> {
    regs: RegisterBlock<'b, B>,
    layout: &'static Layout,
}

impl<B: ?Sized> Clone for FifoChannel<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: ?Sized> Copy for FifoChannel<'_, B> {}

impl<'b, B: Bus + ?Sized> FifoChannel<'b, B> {
    pub(crate) fn new(regs: RegisterBlock<'b, B>, layout: &'static Layout) -> Self {
        Self { regs, layout }
    }

    /// Capacity of the transmit queue in units.
    pub fn tx_capacity(&self) -> u32 {
        self.regs.read(self.layout.txq + queue::CAP)
    }

    /// Number of units waiting in the transmit queue.
    pub fn tx_len(&self) -> u32 {
        self.regs.read(self.layout.txq + queue::LEN)
    }

    /// Capacity of the receive queue in units.
    pub fn rx_capacity(&self) -> u32 {
        self.regs.read(self.layout.rxq + queue::CAP)
    }

    /// Number of units waiting in the receive queue.
    pub fn rx_len(&self) -> u32 {
        self.regs.read(self.layout.rxq + queue::LEN)
    }

    /// Discard everything in the transmit queue.
    pub fn clear_tx(&self) {
        self.regs.write(self.layout.txq + queue::CLR, 1);
    }

    /// Discard everything in the receive queue.
    pub fn clear_rx(&self) {
        self.regs.write(self.layout.rxq + queue::CLR, 1);
    }

    /// Enqueue every unit of `buf`, waiting for space as needed.
    ///
    /// This busy-waits on the transmit queue length with no timeout; it must only be called from
    /// program context.
    pub fn send<U: Unit>(&self, buf: &[U]) {
        let capacity = self.tx_capacity();
        for unit in buf {
            while self.tx_len() == capacity {
                core::hint::spin_loop();
            }
            self.regs
                .write(self.layout.txq + queue::DAT, unit.into_word());
        }
    }

    /// Fill `buf` with received units in arrival order, waiting for each one as needed.
    ///
    /// This busy-waits on the receive queue length with no timeout; it must only be called from
    /// program context.
    pub fn recv<U: Unit>(&self, buf: &mut [U]) {
        for slot in buf {
            while self.rx_len() == 0 {
                core::hint::spin_loop();
            }
            *slot = self.read_unit();
        }
    }

    /// Enqueue `unit` if the transmit queue has space. Returns false if it was full.
    pub fn try_send<U: Unit>(&self, unit: U) -> bool {
        if self.tx_len() < self.tx_capacity() {
            self.regs
                .write(self.layout.txq + queue::DAT, unit.into_word());
            true
        } else {
            false
        }
    }

    /// Dequeue one unit if the receive queue is not empty.
    pub fn try_recv<U: Unit>(&self) -> Option<U> {
        (self.rx_len() > 0).then(|| self.read_unit())
    }

    /// Dequeue one unit without checking the queue length first.
    ///
    /// Callers must already have observed that at least one unit is waiting.
    pub(crate) fn read_unit<U: Unit>(&self) -> U {
        U::from_word(self.regs.read(self.layout.rxq + queue::DAT))
    }

    /// Enable or disable the transmit interrupt.
    ///
    /// When enabling, `threshold` is clamped into `[0, capacity)` (see [`clamp_tx_threshold`]) and
    /// written before the enable bit is set. Disabling leaves the threshold register untouched.
    pub fn set_tx_irq(&self, enabled: bool, threshold: u32) {
        if enabled {
            let effective = clamp_tx_threshold(threshold, self.tx_capacity());
            debug!(
                "{:?}: tx irq threshold {effective} (requested {threshold})",
                self.regs
            );
            self.regs.write(self.layout.tx_threshold, effective);
        }
        self.set_enable_bit(enabled, |flags, e| flags.set_transmit(e));
    }

    /// Enable or disable the receive interrupt.
    ///
    /// When enabling, `threshold` is clamped into `[1, capacity]` (see [`clamp_rx_threshold`])
    /// and written before the enable bit is set. Disabling leaves the threshold register
    /// untouched.
    pub fn set_rx_irq(&self, enabled: bool, threshold: u32) {
        if enabled {
            let effective = clamp_rx_threshold(threshold, self.rx_capacity());
            debug!(
                "{:?}: rx irq threshold {effective} (requested {threshold})",
                self.regs
            );
            self.regs.write(self.layout.rx_threshold, effective);
        }
        self.set_enable_bit(enabled, |flags, e| flags.set_receive(e));
    }

    fn set_enable_bit(&self, enabled: bool, set: impl FnOnce(&mut IrqFlags, bool)) {
        self.regs.modify(self.layout.ie, |v| {
            let mut flags = IrqFlags(v);
            set(&mut flags, enabled);
            trace!("{:?}: ie 0x{v:x} -> 0x{:x}", self.regs, flags.0);
            flags.0
        });
    }

    /// The interrupts this channel currently has enabled.
    pub fn enabled_irqs(&self) -> IrqFlags {
        IrqFlags(self.regs.read(self.layout.ie))
    }

    /// The interrupt conditions this channel is currently signalling.
    pub fn pending(&self) -> IrqFlags {
        IrqFlags(self.regs.read(self.layout.ip))
    }
}
