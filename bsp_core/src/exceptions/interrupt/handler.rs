use log::{trace, warn};
use snafu::{ensure, OptionExt as _, Snafu};

use super::{Controller, Id as InterruptId, EXT_IRQ_NUM};
use crate::exceptions::trap::InterruptHandler;

/// Services one external interrupt source after it has been claimed.
#[cfg_attr(test, mockall::automock)]
pub trait SourceHandler {
    /// Called in interrupt context between the claim and the completion of `id`.
    fn handle(&self, id: InterruptId);
}

/// External interrupt handler policy.
///
/// Sources are registered once at start-up. Afterwards the handler is only used through shared
/// references from interrupt context.
pub struct Handler<'h, IC: ?Sized> {
    controller: &'h IC,
    sources: [Option<&'h (dyn SourceHandler + Sync)>; EXT_IRQ_NUM as usize],
}

/// An error that could occur while registering a source handler.
#[derive(Debug, Snafu)]
pub enum Error {
    /// The controller has no such source.
    #[snafu(display("interrupt source {id} is out of range"))]
    OutOfRange {
        /// The requested source.
        id: InterruptId,
    },
    /// Each source can only have one handler.
    #[snafu(display("interrupt source {id} already has a handler"))]
    AlreadyRegistered {
        /// The requested source.
        id: InterruptId,
    },
}

impl<'h, IC: Controller + ?Sized> Handler<'h, IC> {
    /// Create a new interrupt handler policy with no sources registered.
    pub fn new(controller: &'h IC) -> Self {
        Self {
            controller,
            sources: [None; EXT_IRQ_NUM as usize],
        }
    }

    /// Route claims of `id` to `handler`.
    ///
    /// # Errors
    /// - [`Error::OutOfRange`]: `id` is not a source of the controller.
    /// - [`Error::AlreadyRegistered`]: `id` already has a handler.
    pub fn register(
        &mut self,
        id: InterruptId,
        handler: &'h (dyn SourceHandler + Sync),
    ) -> Result<(), Error> {
        let slot = self
            .sources
            .get_mut(id as usize)
            .context(OutOfRangeSnafu { id })?;
        ensure!(slot.is_none(), AlreadyRegisteredSnafu { id });
        *slot = Some(handler);
        Ok(())
    }

    /// The controller this handler claims from.
    pub fn controller(&self) -> &'h IC {
        self.controller
    }

    /// Claim every pending interrupt, handle the ones that are known and complete all of them.
    ///
    /// A claimed source with no registered handler is logged and completed so that the
    /// controller can present other sources. Returns the number of interrupts claimed.
    pub fn process_interrupts(&self) -> usize {
        let mut claimed = 0;
        while let Some(int_id) = self.controller.claim() {
            trace!("handling interrupt {int_id}");

            match self.sources.get(int_id as usize).copied().flatten() {
                Some(handler) => handler.handle(int_id),
                None => warn!("unexpected external interrupt {int_id}"),
            }

            trace!("finished interrupt {int_id}");
            self.controller.complete(int_id);
            claimed += 1;
        }
        claimed
    }
}

impl<IC: Controller + ?Sized> InterruptHandler for Handler<'_, IC> {
    fn handle(&self) {
        self.process_interrupts();
    }
}
