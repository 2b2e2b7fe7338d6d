//! The trap dispatcher: routes every trap taken by the core to the handler of its interrupt
//! class, or ends the program on a synchronous exception.

use core::sync::atomic::{AtomicU8, Ordering};

use log::{error, trace, warn};
use snafu::Snafu;

use super::{Class, TrapCause};

/// Handles one class of core interrupt.
#[cfg_attr(test, mockall::automock)]
pub trait InterruptHandler {
    /// Service the interrupt. Called in interrupt context.
    fn handle(&self);
}

impl<F: Fn()> InterruptHandler for F {
    fn handle(&self) {
        self()
    }
}

/// The handler installed for a class nobody registered for.
pub struct Ignore;

impl InterruptHandler for Ignore {
    fn handle(&self) {}
}

static IGNORE: Ignore = Ignore;

/// The handler of each interrupt class.
#[derive(Clone, Copy)]
pub struct Vector<'h> {
    external: &'h (dyn InterruptHandler + Sync),
    timer: &'h (dyn InterruptHandler + Sync),
    software: &'h (dyn InterruptHandler + Sync),
}

impl<'h> Vector<'h> {
    /// A vector that ignores every interrupt.
    pub fn new() -> Self {
        Self {
            external: &IGNORE,
            timer: &IGNORE,
            software: &IGNORE,
        }
    }

    /// Handle external interrupts with `handler`.
    pub fn with_external(mut self, handler: &'h (dyn InterruptHandler + Sync)) -> Self {
        self.external = handler;
        self
    }

    /// Handle system timer interrupts with `handler`.
    pub fn with_timer(mut self, handler: &'h (dyn InterruptHandler + Sync)) -> Self {
        self.timer = handler;
        self
    }

    /// Handle software interrupts with `handler`.
    pub fn with_software(mut self, handler: &'h (dyn InterruptHandler + Sync)) -> Self {
        self.software = handler;
        self
    }

    fn handler(&self, class: Class) -> &'h (dyn InterruptHandler + Sync) {
        match class {
            Class::External => self.external,
            Class::Timer => self.timer,
            Class::Software => self.software,
        }
    }
}

impl Default for Vector<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// A trap that cannot be returned from.
#[derive(Debug, Snafu)]
pub enum Error {
    /// The instruction at `return_address` raised an exception.
    #[snafu(display("synchronous exception {cause} at 0x{return_address:x}"))]
    SynchronousException {
        /// The decoded trap cause.
        cause: TrapCause,
        /// The address of the faulting instruction.
        return_address: usize,
    },
}

impl Error {
    /// The exit code the program terminates with: one more than the exception code.
    pub fn exit_code(&self) -> u32 {
        match self {
            Error::SynchronousException { cause, .. } => cause.code() + 1,
        }
    }
}

/// What the dispatcher is doing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// Waiting for a trap.
    Idle = 0,
    /// Running an interrupt handler.
    Dispatching = 1,
    /// A synchronous exception was taken; no further trap is serviced.
    Terminating = 2,
}

impl State {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => State::Idle,
            1 => State::Dispatching,
            _ => State::Terminating,
        }
    }
}

/// Decodes trap causes and dispatches them through a [`Vector`].
pub struct Dispatcher<'h> {
    vector: Vector<'h>,
    state: AtomicU8,
}

impl<'h> Dispatcher<'h> {
    /// Create a dispatcher over a fully populated vector.
    pub fn new(vector: Vector<'h>) -> Self {
        Self {
            vector,
            state: AtomicU8::new(State::Idle as u8),
        }
    }

    /// The current state.
    pub fn state(&self) -> State {
        State::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Handle the trap described by `cause` that interrupted the instruction at
    /// `return_address`.
    ///
    /// Interrupts run the handler of their class and return `return_address` unchanged so the
    /// interrupted instruction resumes. Interrupt codes outside the known classes are logged and
    /// otherwise ignored.
    ///
    /// # Errors
    /// [`Error::SynchronousException`] if the interrupt bit of `cause` is clear. The dispatcher
    /// then stays terminated and every later trap reports an error as well.
    pub fn dispatch(&self, cause: TrapCause, return_address: usize) -> Result<usize, Error> {
        if !cause.is_interrupt() || self.state() == State::Terminating {
            self.state.store(State::Terminating as u8, Ordering::Release);
            error!("{cause} at 0x{return_address:x}");
            return SynchronousExceptionSnafu {
                cause,
                return_address,
            }
            .fail();
        }

        let Some(class) = cause.class() else {
            warn!("unknown {cause} at 0x{return_address:x}");
            return Ok(return_address);
        };

        let previous = match self.state.compare_exchange(
            State::Idle as u8,
            State::Dispatching as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(previous) => previous,
            Err(previous) => {
                warn!("nested {cause} while dispatching");
                previous
            }
        };
        trace!("dispatch {cause}");
        self.vector.handler(class).handle();
        // a handler that ended in an exception leaves the dispatcher terminated
        let _ = self.state.compare_exchange(
            State::Dispatching as u8,
            previous,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        Ok(return_address)
    }
}
