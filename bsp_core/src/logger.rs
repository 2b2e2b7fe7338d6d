//! A lock-free logger that is safe to call from both program and interrupt context.
//!
//! Records are formatted straight into a ring of fixed-size slots. Slots are claimed with atomics,
//! so a record logged from an interrupt handler never waits on one being written by the code it
//! interrupted; it lands in its own slot. The sink is drained opportunistically under `try_lock`,
//! and a full ring drops records and reports the loss on the next drain.
use core::cell::UnsafeCell;
use core::fmt::Write;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Source of the per-record context values.
pub trait GlobalValueReader {
    /// Sample the current values.
    fn read() -> GlobalValues;
}

/// Context stamped on every record.
pub struct GlobalValues {
    /// The hart that logged the record.
    pub hart_id: usize,
    /// The system timer value when the record was logged.
    pub ticks: u64,
}

/// Destination of formatted log output.
pub trait LogSink {
    /// Accepts a log chunk.
    fn accept(&mut self, chunk: &[u8]);
}

/// ANSI SGR color of each level, indexed by `Level as usize - 1`.
const LEVEL_COLORS: [&str; 5] = ["31", "33", "32", "34", "35"];

const LOST_RECORDS_NOTICE: &[u8] = b"\x1b[31mlog records lost\x1b[0m\n";

const SLOT_LEN: usize = 120;

/// A slot's state and the number of valid bytes in it share one word: `len << TAG_BITS | tag`.
mod tag {
    pub const EMPTY: usize = 0;
    pub const WRITING: usize = 1;
    pub const READY: usize = 2;
    pub const BITS: usize = 2;
    pub const MASK: usize = (1 << BITS) - 1;
}

struct Slot {
    bytes: UnsafeCell<[u8; SLOT_LEN]>,
    word: AtomicUsize,
}

// SAFETY: `bytes` is only touched by the holder of the WRITING claim or, once READY is published,
// by the drain holding the sink lock.
unsafe impl Sync for Slot {}

/// Exclusive access to a slot between claiming it and publishing it.
struct SlotWriter<'a> {
    slot: &'a Slot,
    bytes: &'a mut [u8; SLOT_LEN],
    len: usize,
}

impl SlotWriter<'_> {
    /// Copy as much of `s` as fits and return the rest.
    fn fill<'s>(&mut self, s: &'s [u8]) -> &'s [u8] {
        let n = (SLOT_LEN - self.len).min(s.len());
        self.bytes[self.len..self.len + n].copy_from_slice(&s[..n]);
        self.len += n;
        &s[n..]
    }

    fn is_full(&self) -> bool {
        self.len == SLOT_LEN
    }

    fn publish(self) {
        self.slot
            .word
            .store(tag::READY | (self.len << tag::BITS), Ordering::Release);
    }
}

impl Slot {
    const fn new() -> Self {
        Self {
            bytes: UnsafeCell::new([0; SLOT_LEN]),
            word: AtomicUsize::new(tag::EMPTY),
        }
    }

    fn claim(&self) -> Option<SlotWriter<'_>> {
        self.word
            .compare_exchange(tag::EMPTY, tag::WRITING, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;
        // SAFETY: winning the exchange grants exclusive access until `publish`.
        let bytes = unsafe { &mut *self.bytes.get() };
        Some(SlotWriter {
            slot: self,
            bytes,
            len: 0,
        })
    }

    /// Pass the contents of a published slot to `f` and free it. False if the slot is not
    /// published yet.
    fn take(&self, f: impl FnOnce(&[u8])) -> bool {
        let word = self.word.load(Ordering::Acquire);
        if word & tag::MASK != tag::READY {
            return false;
        }
        // SAFETY: a READY slot is not written until it is freed below.
        let bytes = unsafe { &*self.bytes.get() };
        f(&bytes[..word >> tag::BITS]);
        self.word.store(tag::EMPTY, Ordering::Release);
        true
    }
}

/// A lock-free concurrent logger with a ring buffer.
///
/// By default `N = 32` slots, which is just under 4KiB of buffer.
pub struct Logger<S, G, const N: usize = 32> {
    slots: [Slot; N],
    /// Next slot to claim for writing.
    head: AtomicUsize,
    /// Next slot to drain.
    tail: AtomicUsize,
    lost_records: AtomicUsize,
    sink: Mutex<S>,
    level_filter: LevelFilter,
    _values: PhantomData<fn() -> G>,
}

impl<S: LogSink, G: GlobalValueReader, const N: usize> Logger<S, G, N> {
    /// Creates a new `Logger` with the specified sink and log level filter.
    pub fn new(sink: S, level_filter: LevelFilter) -> Self {
        Self {
            slots: [const { Slot::new() }; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            lost_records: AtomicUsize::new(0),
            sink: Mutex::new(sink),
            level_filter,
            _values: PhantomData,
        }
    }

    /// The most verbose level this logger accepts.
    pub fn level_filter(&self) -> LevelFilter {
        self.level_filter
    }

    fn write_record(&self, record: &Record) {
        let values = G::read();
        let level = record.level();
        let mut w = RecordWriter::new(self);
        // the record writer drops what does not fit instead of failing
        let _ = writeln!(
            w,
            "\x1b[{}m{:<5}\x1b[0m [{}:{:>10}] {}@{}| {}",
            LEVEL_COLORS[level as usize - 1],
            level,
            values.hart_id,
            values.ticks,
            record.module_path().unwrap_or("unknown module"),
            record.line().unwrap_or(0),
            record.args()
        );
    }

    /// Move up to `limit` published slots, in ring order, to the sink.
    fn drain(&self, sink: &mut S, limit: usize) {
        if self.lost_records.swap(0, Ordering::Acquire) > 0 {
            sink.accept(LOST_RECORDS_NOTICE);
        }
        for _ in 0..limit {
            let tail = self.tail.load(Ordering::Acquire);
            if tail == self.head.load(Ordering::Acquire) {
                break;
            }
            // an unpublished slot holds back everything after it
            if !self.slots[tail % N].take(|bytes| sink.accept(bytes)) {
                break;
            }
            self.tail.fetch_add(1, Ordering::Release);
        }
    }
}

impl<S: LogSink + Send, G: GlobalValueReader, const N: usize> Log for Logger<S, G, N> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level_filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.write_record(record);
        // an interrupted drain keeps the lock; the record is picked up by the next one
        if let Some(mut sink) = self.sink.try_lock() {
            self.drain(&mut sink, N / 3);
        }
    }

    fn flush(&self) {
        self.drain(&mut self.sink.lock(), N);
    }
}

/// Formats one record into as many consecutive slots as it needs.
struct RecordWriter<'a, S, G, const N: usize> {
    logger: &'a Logger<S, G, N>,
    slot: Option<SlotWriter<'a>>,
    truncated: bool,
}

impl<'a, S, G, const N: usize> RecordWriter<'a, S, G, N> {
    fn new(logger: &'a Logger<S, G, N>) -> Self {
        Self {
            logger,
            slot: None,
            truncated: false,
        }
    }

    /// Reserve the next ring position and claim its slot.
    fn next_slot(&self) -> Option<SlotWriter<'a>> {
        let logger = self.logger;
        let mut head = logger.head.load(Ordering::Acquire);
        loop {
            if head.wrapping_sub(logger.tail.load(Ordering::Acquire)) >= N {
                return None;
            }
            match logger.head.compare_exchange_weak(
                head,
                head.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return logger.slots[head % N].claim(),
                Err(current) => head = current,
            }
        }
    }
}

impl<S, G, const N: usize> Write for RecordWriter<'_, S, G, N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let mut rest = s.as_bytes();
        while !rest.is_empty() && !self.truncated {
            if self.slot.as_ref().map_or(true, SlotWriter::is_full) {
                if let Some(full) = self.slot.take() {
                    full.publish();
                }
                self.slot = self.next_slot();
                if self.slot.is_none() {
                    self.truncated = true;
                    self.logger.lost_records.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
            if let Some(slot) = self.slot.as_mut() {
                rest = slot.fill(rest);
            }
        }
        Ok(())
    }
}

impl<S, G, const N: usize> Drop for RecordWriter<'_, S, G, N> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.publish();
        }
    }
}
