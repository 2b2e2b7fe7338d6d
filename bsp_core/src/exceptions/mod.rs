//! Policies and definitions for processing traps.
//! This includes interrupts from the core and the external interrupt controller, and synchronous
//! exceptions.

pub mod interrupt;
pub mod trap;

pub use interrupt::Controller as InterruptController;
pub use interrupt::Id as InterruptId;

bitfield::bitfield! {
    /// A value of the `mcause` register, which indicates why a trap was taken.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct TrapCause(u32);
    u32;
    /// The trap was caused by an interrupt rather than by the instruction at the return address.
    pub is_interrupt, _: 31;
    /// The interrupt or exception code.
    pub u32, code, _: 30, 0;
}

impl TrapCause {
    /// Interpret a raw `mcause` value.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw `mcause` value.
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// The interrupt class, if this is an interrupt with a recognized code.
    pub fn class(&self) -> Option<Class> {
        if self.is_interrupt() {
            Class::from_code(self.code())
        } else {
            None
        }
    }
}

/// The classes of interrupt the core distinguishes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Class {
    /// Raised through the system controller's software interrupt register.
    Software,
    /// Raised when the system timer reaches its compare value.
    Timer,
    /// Raised by the external interrupt controller on behalf of a peripheral.
    External,
}

impl Class {
    /// The `mcause` interrupt code of this class, which is also its bit position in `mie`/`mip`.
    pub fn code(self) -> u32 {
        match self {
            Class::Software => 3,
            Class::Timer => 7,
            Class::External => 11,
        }
    }

    /// Decode an `mcause` interrupt code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            3 => Some(Class::Software),
            7 => Some(Class::Timer),
            11 => Some(Class::External),
            _ => None,
        }
    }
}

fn exception_description(code: u32) -> &'static str {
    match code {
        0 => "Instruction address misaligned",
        1 => "Instruction access fault",
        2 => "Illegal instruction",
        3 => "Breakpoint",
        4 => "Load address misaligned",
        5 => "Load access fault",
        6 => "Store/AMO address misaligned",
        7 => "Store/AMO access fault",
        8 => "Environment call from U-mode",
        9 => "Environment call from S-mode",
        11 => "Environment call from M-mode",
        12 => "Instruction page fault",
        13 => "Load page fault",
        15 => "Store/AMO page fault",
        _ => "?",
    }
}

impl core::fmt::Debug for TrapCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self}")
    }
}

impl core::fmt::Display for TrapCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_interrupt() {
            match self.class() {
                Some(class) => write!(f, "interrupt {}=[{class:?}]", self.code()),
                None => write!(f, "interrupt {}=[Unknown]", self.code()),
            }
        } else {
            write!(
                f,
                "exception {}=[{}]",
                self.code(),
                exception_description(self.code())
            )
        }
    }
}
