//! Interrupt driven reception: drain a channel's receive queue into a software buffer whenever
//! the channel signals that its receive threshold has been reached.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{trace, warn};

use super::{Id, SourceHandler};
use crate::platform::{
    fifo::{FifoChannel, Unit},
    mmio::Bus,
};

/// A fixed-capacity buffer appended to from interrupt context and read from program context.
///
/// Units are only appended through the buffer's single [`Writer`]. The count is published with
/// release ordering after the units are written, so every unit below an observed count is
/// complete and never changes again. Units that arrive once the buffer is full are discarded
/// and counted in [`ReceiveBuffer::dropped`].
pub struct ReceiveBuffer<U, const N: usize> {
    data: UnsafeCell<[U; N]>,
    count: AtomicUsize,
    dropped: AtomicUsize,
    has_writer: AtomicBool,
}

// SAFETY: the one `Writer` only touches slots at or above `count`, and readers only slots below
// it.
unsafe impl<U: Send, const N: usize> Sync for ReceiveBuffer<U, N> {}

impl<U: Unit, const N: usize> ReceiveBuffer<U, N> {
    /// Create an empty buffer.
    pub const fn new() -> Self {
        Self {
            data: UnsafeCell::new([U::ZERO; N]),
            count: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            has_writer: AtomicBool::new(false),
        }
    }

    /// Take the writing end of the buffer. Only the first call succeeds until the buffer is
    /// cleared.
    pub fn writer(&self) -> Option<Writer<'_, U, N>> {
        self.has_writer
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Writer { buffer: self })
    }

    /// Number of units received so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Number of units discarded because the buffer was full.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// The units received so far, in arrival order.
    pub fn received(&self) -> &[U] {
        let count = self.count();
        // SAFETY: slots below a published count are never written again.
        unsafe { core::slice::from_raw_parts(self.data.get().cast::<U>(), count) }
    }

    /// Forget everything received and release the writing end.
    pub fn clear(&mut self) {
        *self.count.get_mut() = 0;
        *self.dropped.get_mut() = 0;
        *self.has_writer.get_mut() = false;
    }
}

impl<U: Unit, const N: usize> Default for ReceiveBuffer<U, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The only handle that can append to a [`ReceiveBuffer`].
///
/// Appends through one writer must not overlap. The receive completion of a source runs between
/// its claim and complete, and the controller does not present a claimed source again, so this
/// holds for a writer owned by a [`ReceiveCompletion`].
pub struct Writer<'a, U, const N: usize> {
    buffer: &'a ReceiveBuffer<U, N>,
}

impl<'a, U: Unit, const N: usize> Writer<'a, U, N> {
    /// The buffer being written.
    pub fn buffer(&self) -> &'a ReceiveBuffer<U, N> {
        self.buffer
    }

    /// Append up to `n` units produced by `next`, then publish them all at once.
    ///
    /// `next` is called exactly `n` times even if the buffer fills up.
    pub fn append(&self, n: usize, mut next: impl FnMut() -> U) -> usize {
        let ReceiveBuffer {
            data,
            count,
            dropped,
            ..
        } = self.buffer;
        let start = count.load(Ordering::Relaxed);
        let mut stored = 0;
        for _ in 0..n {
            let unit = next();
            if start + stored < N {
                // SAFETY: the slot is above the published count, so no reader can observe it,
                // and this is the only writer.
                unsafe {
                    data.get()
                        .cast::<U>()
                        .add(start + stored)
                        .write(unit);
                }
                stored += 1;
            }
        }
        if stored < n {
            dropped.fetch_add(n - stored, Ordering::Relaxed);
            warn!(
                "receive buffer full, dropped {} of {n} units",
                n - stored
            );
        }
        count.store(start + stored, Ordering::Release);
        stored
    }
}

/// The receive completion path of one channel, registered as the [`SourceHandler`] of the
/// channel's interrupt source.
///
/// On every claim where the channel signals its receive condition, the receive queue length is
/// read exactly once and exactly that many units are moved into the buffer.
pub struct ReceiveCompletion<'a, B: ?Sized, U, const N: usize> {
    channel: FifoChannel<'a, B>,
    writer: Writer<'a, U, N>,
    completions: AtomicUsize,
}

impl<'a, B: Bus + ?Sized, U: Unit, const N: usize> ReceiveCompletion<'a, B, U, N> {
    /// Drain `channel` through `writer`.
    pub fn new(channel: FifoChannel<'a, B>, writer: Writer<'a, U, N>) -> Self {
        Self {
            channel,
            writer,
            completions: AtomicUsize::new(0),
        }
    }

    /// Number of drains performed.
    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::Acquire)
    }

    /// The buffer being filled.
    pub fn buffer(&self) -> &'a ReceiveBuffer<U, N> {
        self.writer.buffer()
    }
}

impl<B: Bus + ?Sized, U: Unit, const N: usize> SourceHandler for ReceiveCompletion<'_, B, U, N> {
    fn handle(&self, id: Id) {
        if !self.channel.pending().receive() {
            warn!("interrupt {id} claimed without a receive condition");
            return;
        }
        let snapshot = self.channel.rx_len() as usize;
        let stored = self.writer.append(snapshot, || self.channel.read_unit());
        let n = self.completions.fetch_add(1, Ordering::Release) + 1;
        trace!(
            "interrupt {id}: drained {snapshot} units, stored {stored}, {} total after {n} completions",
            self.buffer().count()
        );
    }
}
