//! Logging mechanism: the ring buffer logger from `bsp_core` writing to the scratch console.
use log::{debug, info, LevelFilter};
use spin::once::Once;

use bsp_core::{
    logger::{GlobalValueReader, GlobalValues, Logger},
    platform::{console::Console, mmio::Volatile, timer::SystemTimer},
};

use crate::BUS;

/// Implementation of [`GlobalValueReader`] that reads the real hart id and system timer.
struct HartGlobalValueReader;

impl GlobalValueReader for HartGlobalValueReader {
    fn read() -> GlobalValues {
        GlobalValues {
            hart_id: riscv::register::mhartid::read(),
            ticks: SystemTimer::new(&BUS).value(),
        }
    }
}

/// The global logger instance.
static LOGGER: Once<Logger<Console<'static, Volatile>, HartGlobalValueReader>> = Once::new();

/// Initialize the global logger.
pub fn init_logging() {
    let level = if cfg!(feature = "verbose") {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };

    log::set_max_level(level);
    log::set_logger(LOGGER.call_once(|| Logger::new(Console::new(&BUS), level)) as _)
        .expect("install logger");

    info!(
        "\x1b[1muv board support\x1b[0m v{} (git: {}@{})",
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_BRANCH"),
        env!("VERGEN_GIT_SHA"),
    );

    debug!("Build timestamp: {}", env!("VERGEN_BUILD_TIMESTAMP"));
    debug!("Image memory region: {:x?}", unsafe {
        crate::running_image::memory_region()
    });
}
