use bsp_core::{exceptions::TrapCause, platform::console::Console};
use log::error;

use crate::BUS;

// assembly definition of the trap entry that saves the caller-saved registers and calls into the
// Rust code. `start.S` installs it in `mtvec`.
core::arch::global_asm!(include_str!("trap.S"));

#[no_mangle]
unsafe extern "C" fn handle_trap(mcause: usize, mepc: usize) -> usize {
    let dispatcher = super::interrupt::DISPATCHER
        .get()
        .expect("trap dispatcher to be initialized before interrupts are enabled");

    #[allow(clippy::cast_possible_truncation)]
    let cause = TrapCause::from_raw(mcause as u32);
    match dispatcher.dispatch(cause, mepc) {
        Ok(resume) => resume,
        Err(e) => {
            error!("{e}");
            Console::new(&BUS).write_bytes(b"trap\n");
            crate::exit(e.exit_code())
        }
    }
}
