//! Typed volatile access to memory-mapped registers.

/// The width of a single register access.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Width {
    /// 8-bit access.
    Byte,
    /// 16-bit access.
    Half,
    /// 32-bit access.
    Word,
}

/// The register access primitive that every driver is built on.
///
/// Each call performs exactly one access of the requested width at the given physical address.
/// Accesses are never cached, merged or reordered relative to each other, and may have side
/// effects in the peripheral (reading a queue data port dequeues an element, for instance).
/// Invalid addresses are a configuration defect and are not detected.
#[cfg_attr(test, mockall::automock)]
pub trait Bus {
    /// Load a value of `width` from `address`, zero-extended to 32 bits.
    fn load(&self, address: usize, width: Width) -> u32;

    /// Store the low `width` bits of `value` to `address`.
    fn store(&self, address: usize, width: Width, value: u32);
}

/// The bus of the running processor, where every access is a volatile pointer access.
#[derive(Debug)]
pub struct Volatile {
    _private: (),
}

impl Volatile {
    /// Create a handle to the processor's physical address space.
    ///
    /// # Safety
    /// Every address later passed to [`Bus::load`] or [`Bus::store`] must be valid for an access
    /// of the requested width and alignment, which in practice means the caller only uses it with
    /// the addresses in [`super::memory_map`] on the real board.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Bus for Volatile {
    fn load(&self, address: usize, width: Width) -> u32 {
        // SAFETY: validity of `address` is guaranteed by the creator of this bus.
        unsafe {
            match width {
                Width::Byte => u32::from((address as *const u8).read_volatile()),
                Width::Half => u32::from((address as *const u16).read_volatile()),
                Width::Word => (address as *const u32).read_volatile(),
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn store(&self, address: usize, width: Width, value: u32) {
        // SAFETY: validity of `address` is guaranteed by the creator of this bus.
        unsafe {
            match width {
                Width::Byte => (address as *mut u8).write_volatile(value as u8),
                Width::Half => (address as *mut u16).write_volatile(value as u16),
                Width::Word => (address as *mut u32).write_volatile(value),
            }
        }
    }
}

/// A group of registers at a fixed base address on a [`Bus`].
///
/// All offsets are in bytes relative to the base of the block.
pub struct RegisterBlock<'b, B: ?Sized> {
    bus: &'b B,
    base: usize,
}

impl<B: ?Sized> Clone for RegisterBlock<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: ?Sized> Copy for RegisterBlock<'_, B> {}

impl<B: ?Sized> core::fmt::Debug for RegisterBlock<'_, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RegisterBlock@0x{:x}", self.base)
    }
}

impl<'b, B: Bus + ?Sized> RegisterBlock<'b, B> {
    /// Create a register block at `base` on `bus`.
    pub const fn new(bus: &'b B, base: usize) -> Self {
        Self { bus, base }
    }

    /// The physical base address of the block.
    pub fn base(&self) -> usize {
        self.base
    }

    /// The bus this block lives on.
    pub fn bus(&self) -> &'b B {
        self.bus
    }

    /// Read the 32-bit register at `offset`.
    #[inline]
    pub fn read(&self, offset: usize) -> u32 {
        self.bus.load(self.base + offset, Width::Word)
    }

    /// Write the 32-bit register at `offset`.
    #[inline]
    pub fn write(&self, offset: usize, value: u32) {
        self.bus.store(self.base + offset, Width::Word, value);
    }

    /// Read the register at `offset`, transform it and write the result back.
    ///
    /// This is two separate bus accesses. If an interrupt handler also touches the register, the
    /// caller must mask that interrupt class around the call.
    #[inline]
    pub fn modify(&self, offset: usize, f: impl FnOnce(u32) -> u32) {
        let value = self.read(offset);
        self.write(offset, f(value));
    }

    /// Write the low byte of the register at `offset`.
    #[inline]
    pub fn write_byte(&self, offset: usize, value: u8) {
        self.bus.store(self.base + offset, Width::Byte, u32::from(value));
    }
}

/// Expect a single word load from `address` in `seq`, answering `value`.
#[cfg(test)]
pub(crate) fn expect_load(bus: &mut MockBus, seq: &mut mockall::Sequence, address: usize, value: u32) {
    bus.expect_load()
        .once()
        .in_sequence(seq)
        .with(
            mockall::predicate::eq(address),
            mockall::predicate::eq(Width::Word),
        )
        .return_const(value);
}

/// Expect a single word store of `value` to `address` in `seq`.
#[cfg(test)]
pub(crate) fn expect_store(bus: &mut MockBus, seq: &mut mockall::Sequence, address: usize, value: u32) {
    bus.expect_store()
        .once()
        .in_sequence(seq)
        .with(
            mockall::predicate::eq(address),
            mockall::predicate::eq(Width::Word),
            mockall::predicate::eq(value),
        )
        .return_const(());
}
