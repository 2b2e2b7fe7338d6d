//! Definitions for the current running program image.
#![allow(clippy::cast_sign_loss)]
use core::ptr::{addr_of, addr_of_mut, copy_nonoverlapping, write_bytes};

/// These are defined by the linker script so we know where the sections are.
/// Notably not the value but the *address* of these symbols is what is relevant.
mod markers {
    extern "C" {
        /// Beginning of the `bss` section.
        pub static mut __bss_start: u8;
        /// End of the `bss` section.
        pub static mut __bss_end: u8;
        /// Beginning of the `data` section in RAM.
        pub static mut __data_start: u8;
        /// End of the `data` section in RAM.
        pub static mut __data_end: u8;
        /// Where the initial contents of `data` live in flash.
        pub static __data_load: u8;
        /// Beginning of the image in flash.
        pub static __image_start: u8;
        /// End of the image in flash.
        pub static __image_end: u8;
    }
}

/// Copy the initial values of `data` from flash and zero `bss`, as is expected by the ELF.
///
/// # Safety
/// This function should only be called exactly *once* at the beginning of boot, before any static
/// is touched.
pub unsafe fn init_sections() {
    let data_start = addr_of_mut!(markers::__data_start);
    let data_end = addr_of_mut!(markers::__data_end);
    let data_size = data_end.offset_from(data_start) as usize;
    copy_nonoverlapping(addr_of!(markers::__data_load), data_start, data_size);

    let bss_start = addr_of_mut!(markers::__bss_start);
    let bss_end = addr_of_mut!(markers::__bss_end);
    let bss_size = bss_end.offset_from(bss_start) as usize;
    write_bytes(bss_start, 0, bss_size);
}

/// Find the region of flash that contains the program image.
///
/// # Safety
/// The validity of the returned region depends entirely on the correctness of the linker and
/// linker script to make sure the marker symbols are defined in the correct places.
pub unsafe fn memory_region() -> (*const u8, usize) {
    let start = addr_of!(markers::__image_start);
    let end = addr_of!(markers::__image_end);
    (start, end.offset_from(start) as usize)
}
