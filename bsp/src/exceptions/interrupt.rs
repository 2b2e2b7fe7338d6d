//! Interrupts from hardware devices.
use bsp_core::{
    exceptions::{
        interrupt::{Config, Controller, CoreInterrupts, ExternalController, Handler, Id, SourceHandler},
        trap::{Dispatcher, Vector},
        Class,
    },
    platform::{mmio::Volatile, SoftwareInterrupt},
};
use log::{info, trace};
use spin::once::Once;

use super::Hart;
use crate::BUS;

/// The external interrupt controller.
pub static CONTROLLER: Once<ExternalController<'static, Volatile>> = Once::new();

/// The global external interrupt handler policy.
pub static HANDLER_POLICY: Once<Handler<'static, ExternalController<'static, Volatile>>> =
    Once::new();

/// The global trap dispatcher.
pub static DISPATCHER: Once<Dispatcher<'static>> = Once::new();

fn clear_software_interrupt() {
    SoftwareInterrupt::new(&BUS).clear();
}

/// Initialize the interrupt controller and trap dispatcher with `handler` servicing external
/// source `id`, then enable interrupts on this hart.
pub fn init(id: Id, config: Config, handler: &'static (dyn SourceHandler + Sync)) {
    trace!("Initializing interrupts…");

    let controller = CONTROLLER.call_once(|| ExternalController::new(&BUS));
    controller.configure(id, &config);
    controller.set_threshold(0);

    let policy = HANDLER_POLICY.call_once(|| {
        let mut policy = Handler::new(controller);
        policy
            .register(id, handler)
            .expect("register interrupt source handler");
        policy
    });

    DISPATCHER.call_once(|| {
        Dispatcher::new(
            Vector::new()
                .with_external(policy)
                .with_software(&clear_software_interrupt),
        )
    });

    controller.enable(id);
    Hart.set_class(Class::External, true);
    Hart.set_class(Class::Software, true);
    Hart.set_global(true);

    info!("Interrupts initialized!");
}
