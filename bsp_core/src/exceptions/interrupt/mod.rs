//! Interrupts are exceptions caused by hardware devices.
//!
//! Peripherals raise interrupts through the external interrupt controller, which arbitrates
//! between them and presents a single external interrupt to the core. The core also has its own
//! timer and software interrupt lines, masked independently (see [`CoreInterrupts`]).

mod controller;
mod handler;
mod receive;

pub use controller::ExternalController;
pub use handler::{Error as HandlerError, Handler, SourceHandler};
pub use receive::{ReceiveBuffer, ReceiveCompletion, Writer as ReceiveWriter};

#[cfg(test)]
pub use handler::MockSourceHandler;

use super::Class;

/// The identifier of an external interrupt source.
pub type Id = u32;

/// Number of sources the external interrupt controller supports.
pub const EXT_IRQ_NUM: u32 = 64;

/// The interrupt source number of every peripheral.
pub mod source {
    use super::Id;

    /// UART transmit/receive thresholds.
    pub const UART: Id = 0;
    /// First SPI controller.
    pub const SPI0: Id = 1;
    /// Second SPI controller.
    pub const SPI1: Id = 2;
    /// I2C controller.
    pub const I2C: Id = 3;
    /// General purpose timer.
    pub const TIMER: Id = 4;
    /// Watchdog.
    pub const WATCHDOG: Id = 5;

    /// GPIO `pin`.
    pub const fn gpio(pin: u32) -> Id {
        8 + pin
    }
}

/// Trigger mode for an interrupt.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum TriggerMode {
    /// Use level triggering.
    #[default]
    Level,
    /// Use edge triggering.
    Edge,
}

/// The configuration of an interrupt with the interrupt controller.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    /// Priority level; higher is more urgent. A source is only presented to the core while its
    /// priority is strictly greater than the controller threshold.
    pub priority: u32,
    /// Triggering mode for the interrupt.
    pub mode: TriggerMode,
}

/// An interrupt controller manages and collates interrupts for the processor.
/// This is the generic interface for the interrupt controller mechanism.
#[cfg_attr(test, mockall::automock)]
pub trait Controller {
    /// Set the priority and trigger mode of a source.
    fn configure(&self, id: Id, config: &Config);

    /// Enable an interrupt to raise an exception.
    fn enable(&self, id: Id);
    /// Disable an interrupt from raising an exception.
    fn disable(&self, id: Id);
    /// True if the source is enabled.
    fn is_enabled(&self, id: Id) -> bool;

    /// True if the source is currently requesting service.
    fn is_pending(&self, id: Id) -> bool;

    /// Set the priority a source must exceed to be presented to the core.
    fn set_threshold(&self, level: u32);

    /// Claim the highest priority pending source, if any qualifies.
    ///
    /// Every `Some` must be answered with exactly one [`Controller::complete`] of the same id
    /// before the next claim.
    fn claim(&self) -> Option<Id>;

    /// Inform the interrupt controller that the system has finished processing an interrupt.
    fn complete(&self, id: Id);
}

/// The interrupt enables of the core itself.
#[cfg_attr(test, mockall::automock)]
pub trait CoreInterrupts {
    /// Enable or disable every interrupt at once. Returns the previous state.
    fn set_global(&self, enabled: bool) -> bool;

    /// Enable or disable one class of interrupt. Returns the previous state.
    fn set_class(&self, class: Class, enabled: bool) -> bool;

    /// True if the class is enabled.
    fn class_enabled(&self, class: Class) -> bool;
}

/// Run `f` with interrupts of `class` masked, then restore the previous mask state.
///
/// Program context uses this around read-modify-write sequences on registers that handlers of
/// that class also modify.
pub fn with_class_masked<C: CoreInterrupts + ?Sized, R>(
    core: &C,
    class: Class,
    f: impl FnOnce() -> R,
) -> R {
    let was_enabled = core.set_class(class, false);
    let r = f();
    if was_enabled {
        core.set_class(class, true);
    }
    r
}

/// Run `f` with every interrupt masked, then restore the previous global enable.
pub fn without_interrupts<C: CoreInterrupts + ?Sized, R>(core: &C, f: impl FnOnce() -> R) -> R {
    let was_enabled = core.set_global(false);
    let r = f();
    if was_enabled {
        core.set_global(true);
    }
    r
}
