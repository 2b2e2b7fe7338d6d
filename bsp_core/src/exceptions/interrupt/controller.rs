//! Driver for the external interrupt controller in the system controller block.
//!
//! Each source has a priority word, a trigger mode word, an enable bit and a pending bit. The
//! controller presents the highest priority source that is enabled, pending and above the target
//! threshold; reading the claim register takes that source and writing its id back to the same
//! register completes it.

use log::{debug, trace};

use super::{Config, Controller, Id, TriggerMode, EXT_IRQ_NUM};
use crate::platform::{
    memory_map,
    mmio::{Bus, RegisterBlock},
};

/// Register offsets relative to the system controller base.
mod regs {
    /// Claim on read, complete on write.
    pub const CLAIM: usize = 0x038;
    pub const THRESHOLD: usize = 0x03c;
    /// Bitmap, one word per 32 sources.
    pub const PENDING: usize = 0x040;
    /// Bitmap, one word per 32 sources.
    pub const ENABLE: usize = 0x048;
    /// One word per source.
    pub const PRIORITY: usize = 0x050;
    /// One word per source. A non-zero word selects edge triggering.
    pub const TRIGGER: usize = 0x150;
}

/// The external interrupt controller.
pub struct ExternalController<'b, B: ?Sized> {
    regs: RegisterBlock<'b, B>,
}

/// Byte offset of the bitmap word holding `id`, and the bit of `id` within it.
fn id_to_bit_offset(id: Id) -> (usize, u32) {
    debug_assert!(id < EXT_IRQ_NUM, "interrupt source {id} out of range");
    (((id / 32) * 4) as usize, 1 << (id % 32))
}

impl<'b, B: Bus + ?Sized> ExternalController<'b, B> {
    /// Create a handle to the controller.
    pub fn new(bus: &'b B) -> Self {
        Self {
            regs: RegisterBlock::new(bus, memory_map::SLC_BASE),
        }
    }

    fn set_bit_for_id(&self, register: usize, id: Id, set: bool) {
        let (word_offset, mask) = id_to_bit_offset(id);
        self.regs.modify(register + word_offset, |v| {
            let n = if set { v | mask } else { v & !mask };
            trace!("register 0x{:x} for id={id}: 0x{v:x} -> 0x{n:x}", register + word_offset);
            n
        });
    }

    fn bit_for_id(&self, register: usize, id: Id) -> bool {
        let (word_offset, mask) = id_to_bit_offset(id);
        self.regs.read(register + word_offset) & mask != 0
    }
}

impl<B: Bus + ?Sized> Controller for ExternalController<'_, B> {
    fn configure(&self, id: Id, config: &Config) {
        debug!("configuring interrupt {id} {config:?}");
        self.regs
            .write(regs::PRIORITY + id as usize * 4, config.priority);
        self.regs.write(
            regs::TRIGGER + id as usize * 4,
            u32::from(config.mode == TriggerMode::Edge),
        );
    }

    fn enable(&self, id: Id) {
        debug!("enable interrupt {id}");
        self.set_bit_for_id(regs::ENABLE, id, true);
    }

    fn disable(&self, id: Id) {
        debug!("disable interrupt {id}");
        self.set_bit_for_id(regs::ENABLE, id, false);
    }

    fn is_enabled(&self, id: Id) -> bool {
        self.bit_for_id(regs::ENABLE, id)
    }

    fn is_pending(&self, id: Id) -> bool {
        self.bit_for_id(regs::PENDING, id)
    }

    fn set_threshold(&self, level: u32) {
        debug!("interrupt threshold {level}");
        self.regs.write(regs::THRESHOLD, level);
    }

    fn claim(&self) -> Option<Id> {
        let id = self.regs.read(regs::CLAIM);
        if id < EXT_IRQ_NUM {
            trace!("claim interrupt {id}");
            Some(id)
        } else {
            None
        }
    }

    fn complete(&self, id: Id) {
        trace!("complete interrupt {id}");
        self.regs.write(regs::CLAIM, id);
    }
}
