//! The debug console: a character stream made of byte stores to the system controller's scratch
//! register, which the simulator and debugger capture.

use core::fmt::Write;

use super::{
    memory_map,
    mmio::{Bus, RegisterBlock},
    slc_regs,
};
use crate::logger::LogSink;

/// Word written to the scratch register to tell the host that the program has finished.
pub const EXIT_TOKEN: u32 = 0xcafe_0235;

/// The scratch register character console.
pub struct Console<'b, B: ?Sized> {
    slc: RegisterBlock<'b, B>,
}

impl<'b, B: Bus + ?Sized> Console<'b, B> {
    /// Create a handle to the console.
    pub fn new(bus: &'b B) -> Self {
        Self {
            slc: RegisterBlock::new(bus, memory_map::SLC_BASE),
        }
    }

    /// Emit raw bytes.
    pub fn write_bytes(&self, bytes: &[u8]) {
        for b in bytes {
            self.slc.write_byte(slc_regs::SCRATCH, *b);
        }
    }

    /// Report that the program finished with `code` and emit the exit token.
    ///
    /// After this the host considers the program terminated; the caller must not return to
    /// normal execution.
    pub fn report_exit(&mut self, code: u32) {
        // console writes cannot fail
        let _ = write!(self, "\nProgram exited: {code:x}\n");
        self.slc.write(slc_regs::SCRATCH, EXIT_TOKEN);
    }
}

impl<B: Bus + ?Sized> Write for Console<'_, B> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

impl<B: Bus + ?Sized> LogSink for Console<'_, B> {
    fn accept(&mut self, chunk: &[u8]) {
        self.write_bytes(chunk);
    }
}
