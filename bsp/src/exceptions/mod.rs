//! Mechanisms for trap handling.

mod handlers;
mod interrupt;

pub use interrupt::init as init_interrupts;

use bsp_core::exceptions::{interrupt::CoreInterrupts, Class};
use riscv::register::{mie, mstatus};

/// The interrupt enables of the running hart, in `mstatus` and `mie`.
pub struct Hart;

impl CoreInterrupts for Hart {
    fn set_global(&self, enabled: bool) -> bool {
        let was_enabled = mstatus::read().mie();
        unsafe {
            if enabled {
                mstatus::set_mie();
            } else {
                mstatus::clear_mie();
            }
        }
        was_enabled
    }

    fn set_class(&self, class: Class, enabled: bool) -> bool {
        let was_enabled = self.class_enabled(class);
        unsafe {
            match (class, enabled) {
                (Class::Software, true) => mie::set_msoft(),
                (Class::Software, false) => mie::clear_msoft(),
                (Class::Timer, true) => mie::set_mtimer(),
                (Class::Timer, false) => mie::clear_mtimer(),
                (Class::External, true) => mie::set_mext(),
                (Class::External, false) => mie::clear_mext(),
            }
        }
        was_enabled
    }

    fn class_enabled(&self, class: Class) -> bool {
        let mie = mie::read();
        match class {
            Class::Software => mie.msoft(),
            Class::Timer => mie.mtimer(),
            Class::External => mie.mext(),
        }
    }
}
