//! Board support executable for the uv RISC-V microcontroller.
//!
//! Brings the board up, installs the trap dispatcher and runs the interrupt driven loopback
//! self-test, reporting its result through the scratch console.
#![no_std]
#![no_main]
#![deny(missing_docs)]

use bsp_core::platform::{console::Console, mmio::Volatile, timer::SystemTimer};

mod exceptions;
mod logging;
mod running_image;

core::arch::global_asm!(include_str!("./start.S"));

/// The physical address space of the processor.
// SAFETY: the drivers only ever address the register blocks in `memory_map`.
pub static BUS: Volatile = unsafe { Volatile::new() };

/// The main entry point.
///
/// This function is called by `start.S` after it sets up the global pointer, the stack and the
/// trap vector.
#[no_mangle]
pub extern "C" fn bsp_main() -> ! {
    unsafe {
        running_image::init_sections();
    }

    // free running tick source for log records
    let timer = SystemTimer::new(&BUS);
    timer.init(false, 0, u64::MAX);
    timer.start();

    logging::init_logging();

    exit(self_test::run())
}

/// End the program with `code`, reporting it on the console.
pub fn exit(code: u32) -> ! {
    Console::new(&BUS).report_exit(code);
    loop {
        unsafe {
            core::arch::asm!("wfi");
        }
    }
}

/// The program-wide panic handler.
#[panic_handler]
pub fn panic_handler(info: &core::panic::PanicInfo) -> ! {
    use core::fmt::Write;

    let mut console = Console::new(&BUS);
    let _ = writeln!(console, "\x1b[31mpanic\x1b[0m: {info}");
    exit(1)
}
