//! double_buffer.rs
//! Two fixed-capacity sample buffers, one active at a time. A full buffer is
//! swapped out and handed to a short-lived drain thread that writes it to
//! storage without ever blocking the control loop.
//!
//! Buffer ownership is an atomic state tag per buffer:
//! `Empty -> Active -> Queued -> Draining -> Empty`, with `Queued -> Retained`
//! when the drain finds storage busy. The drain that holds the storage lock
//! writes any retained buffer before it lets go (`Retained -> Draining`).

use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    thread::{self, JoinHandle},
};

use crossbeam_queue::ArrayQueue;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::{
    error::{DaqError, Result},
    logging::{
        record::{RECORD_LEN, Sample},
        storage::Storage,
    },
    utils::metrics::{DaqCounters, SharedCounters},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum BufferState {
    Empty = 0,
    Active = 1,
    Queued = 2,
    Draining = 3,
    Retained = 4,
}

impl BufferState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => BufferState::Empty,
            1 => BufferState::Active,
            2 => BufferState::Queued,
            3 => BufferState::Draining,
            _ => BufferState::Retained,
        }
    }
}

struct LogBuffer {
    samples: ArrayQueue<Sample>,
    state: AtomicU8,
}

impl LogBuffer {
    fn new(capacity: usize, state: BufferState) -> Self {
        Self {
            samples: ArrayQueue::new(capacity),
            state: AtomicU8::new(state as u8),
        }
    }

    fn state(&self) -> BufferState {
        BufferState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set(&self, state: BufferState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: BufferState, to: BufferState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct Shared<S> {
    buffers: [LogBuffer; 2],
    storage: Mutex<S>,
    counters: SharedCounters,
}

/// Outcome of a drain's non-blocking attempt at the storage lock.
pub enum DrainAttempt<'a, S> {
    Acquired(MutexGuard<'a, S>),
    /// Another drain is writing; this one must not wait.
    Busy,
}

impl<'a, S> DrainAttempt<'a, S> {
    pub fn try_acquire(lock: &'a Mutex<S>) -> Self {
        match lock.try_lock() {
            Some(guard) => DrainAttempt::Acquired(guard),
            None => DrainAttempt::Busy,
        }
    }
}

fn label(idx: usize) -> char {
    if idx == 0 { 'A' } else { 'B' }
}

/// Move every sample out of buffer `idx` and append them as one batch.
fn write_buffer<S: Storage>(shared: &Shared<S>, idx: usize, storage: &mut S) {
    let buffer = &shared.buffers[idx];
    let mut batch = Vec::with_capacity(buffer.samples.len());
    while let Some(sample) = buffer.samples.pop() {
        batch.push(sample);
    }
    // samples are out; the control loop may reuse the buffer now
    buffer.set(BufferState::Empty);

    let mut text = String::with_capacity(batch.len() * RECORD_LEN);
    for sample in &batch {
        sample.write_record(&mut text);
    }
    match storage.append(text.as_bytes()) {
        Ok(()) => {
            DaqCounters::add(&shared.counters.records_written, batch.len() as u64);
            DaqCounters::incr(&shared.counters.drains_completed);
            debug!("[Drain] buffer {}: wrote {} records", label(idx), batch.len());
        }
        Err(e) => {
            DaqCounters::incr(&shared.counters.storage_errors);
            error!("[Drain] buffer {}: {} records lost: {e}", label(idx), batch.len());
        }
    }
}

fn drain<S: Storage>(shared: &Shared<S>, idx: usize) {
    let buffer = &shared.buffers[idx];
    let mut storage = match DrainAttempt::try_acquire(&shared.storage) {
        DrainAttempt::Busy => {
            if buffer.transition(BufferState::Queued, BufferState::Retained) {
                DaqCounters::incr(&shared.counters.drains_skipped);
                warn!(
                    "[Drain] storage busy, buffer {} retained with {} samples",
                    label(idx),
                    buffer.samples.len()
                );
            }
            return;
        }
        DrainAttempt::Acquired(guard) => guard,
    };

    if buffer.transition(BufferState::Queued, BufferState::Draining) {
        write_buffer(shared, idx, &mut storage);
    }
    // a drain skipped while this one held the lock is written under the same lock
    while let Some(retained) = (0..2).find(|&i| {
        shared.buffers[i].transition(BufferState::Retained, BufferState::Draining)
    }) {
        debug!("[Drain] picking up retained buffer {}", label(retained));
        write_buffer(shared, retained, &mut storage);
    }
}

/// Producer side of the buffer pair, owned by the control loop.
pub struct SampleLogger<S: Storage> {
    shared: Arc<Shared<S>>,
    active: usize,
    drains: Vec<JoinHandle<()>>,
    /// Samples dropped since the active buffer last had room.
    stalled_drops: u64,
}

impl<S: Storage> SampleLogger<S> {
    pub fn new(capacity: usize, storage: S, counters: SharedCounters) -> Result<Self> {
        if capacity == 0 {
            return Err(DaqError::Config("log buffer capacity must be non-zero".into()));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                buffers: [
                    LogBuffer::new(capacity, BufferState::Active),
                    LogBuffer::new(capacity, BufferState::Empty),
                ],
                storage: Mutex::new(storage),
                counters,
            }),
            active: 0,
            drains: Vec::new(),
            stalled_drops: 0,
        })
    }

    /// Mount the storage medium. Called once, before the first push.
    pub fn mount(&self) -> Result<()> {
        self.shared.storage.lock().mount()
    }

    /// Samples waiting in the active buffer.
    pub fn active_len(&self) -> usize {
        self.shared.buffers[self.active].samples.len()
    }

    /// Record one sample. Never blocks.
    pub fn push(&mut self, sample: Sample) {
        if self.shared.buffers[self.active].samples.is_full() && !self.try_swap() {
            DaqCounters::incr(&self.shared.counters.samples_dropped);
            if self.stalled_drops == 0 {
                warn!(
                    "[Logger] buffer {} full and swap deferred, dropping samples",
                    label(self.active)
                );
            }
            self.stalled_drops += 1;
            return;
        }
        if self.shared.buffers[self.active].samples.push(sample).is_err() {
            DaqCounters::incr(&self.shared.counters.samples_dropped);
            return;
        }
        DaqCounters::incr(&self.shared.counters.samples_logged);
        if self.stalled_drops > 0 {
            warn!("[Logger] logging resumed after {} dropped samples", self.stalled_drops);
            self.stalled_drops = 0;
        }
        if self.shared.buffers[self.active].samples.is_full() {
            self.try_swap();
        }
    }

    /// Swap a full active buffer out. Counted as a swap when it happens.
    fn try_swap(&mut self) -> bool {
        let swapped = self.rotate();
        if swapped {
            DaqCounters::incr(&self.shared.counters.swaps);
        }
        swapped
    }

    /// Make the other buffer active and hand the current one to a drain.
    /// Only an `Empty` partner can take over.
    fn rotate(&mut self) -> bool {
        self.reap_finished();
        let other = 1 - self.active;
        let shared = Arc::clone(&self.shared);
        let buffers = &shared.buffers;
        match buffers[other].state() {
            BufferState::Retained => {
                // with the lock held, its owner writes the retained buffer
                if !shared.storage.is_locked()
                    && buffers[other].transition(BufferState::Retained, BufferState::Queued)
                {
                    debug!("[Logger] re-queueing retained buffer {}", label(other));
                    self.spawn_drain(other);
                }
                false
            }
            BufferState::Empty => {
                if !buffers[other].transition(BufferState::Empty, BufferState::Active) {
                    return false;
                }
                buffers[self.active].set(BufferState::Queued);
                let outgoing = self.active;
                self.active = other;
                self.spawn_drain(outgoing);
                true
            }
            BufferState::Active | BufferState::Queued | BufferState::Draining => false,
        }
    }

    /// Hand a partially filled active buffer to a drain without waiting.
    /// Returns false when the other buffer is still busy; retry later.
    pub fn hand_off(&mut self) -> bool {
        let pending = self.active_len();
        if pending == 0 {
            return true;
        }
        if !self.rotate() {
            return false;
        }
        info!("[Logger] handed off {pending} samples from a partial buffer");
        self.stalled_drops = 0;
        true
    }

    fn spawn_drain(&mut self, idx: usize) {
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("drain-{}", label(idx)))
            .spawn(move || drain(&shared, idx));
        match spawned {
            Ok(handle) => self.drains.push(handle),
            Err(e) => {
                // retried at the next swap opportunity
                self.shared.buffers[idx].set(BufferState::Retained);
                error!("[Logger] failed to spawn drain for buffer {}: {e}", label(idx));
            }
        }
    }

    fn reap_finished(&mut self) {
        let (done, running): (Vec<_>, Vec<_>) =
            self.drains.drain(..).partition(|h| h.is_finished());
        self.drains = running;
        for handle in done {
            if handle.join().is_err() {
                error!("[Logger] drain thread panicked");
            }
        }
    }

    fn join_all(&mut self) {
        for handle in self.drains.drain(..) {
            if handle.join().is_err() {
                error!("[Logger] drain thread panicked");
            }
        }
    }

    /// Join every outstanding drain and retry retained buffers until both
    /// inactive buffers are empty. Blocks; not for use from the tick path.
    pub fn wait_idle(&mut self) {
        loop {
            self.join_all();
            let retained: Vec<usize> = (0..2)
                .filter(|&i| i != self.active)
                .filter(|&i| {
                    self.shared.buffers[i].transition(BufferState::Retained, BufferState::Queued)
                })
                .collect();
            if retained.is_empty() {
                break;
            }
            for idx in retained {
                self.spawn_drain(idx);
            }
        }
    }

    /// Hand the active buffer to a drain regardless of fullness. Waits for
    /// the other buffer to become free first.
    pub fn flush(&mut self) {
        if self.active_len() == 0 {
            return;
        }
        self.wait_idle();
        if !self.hand_off() {
            error!(
                "[Logger] flush: buffer {} not free after drains",
                label(1 - self.active)
            );
        }
    }
}

impl<S: Storage> Drop for SampleLogger<S> {
    fn drop(&mut self) {
        self.join_all();
    }
}
