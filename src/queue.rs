//! Bounded worker pool dispatching per-record key-value batches.
//!
//! An [`EntityQueue`] owns a fixed set of worker threads consuming from one
//! bounded channel. Each finished record arrives as a single job — the
//! ordered key-value batch the reducer accumulated — and moves through
//! queued → dispatched → building → completing → done, assigned to exactly
//! one worker throughout. The worker creates a fresh [`EntityBuilderState`],
//! walks the batch strictly in emission order, resolves each key through the
//! shared [`Specification`], and dispatches to the resolved handler or the
//! unmapped-key listener. When the batch is exhausted the sink hooks run:
//! `before_completion`, then the state is sealed, then `after_completion`.
//!
//! Shutdown is an explicit state, not a poison value: [`EntityQueue::close`]
//! stops admissions, lets the workers drain the channel, and waits up to a
//! timeout for in-flight jobs. Workers are never interrupted mid-record, so
//! a sink cannot observe a half-built resource. Jobs submitted after close
//! are dropped, logged, and counted.
//!
//! Ordering: within one record, pairs are processed in emission order.
//! Across records no order is guaranteed — workers complete records as they
//! finish.

use crate::entity::{place_by_default, place_verbatim, BuildContext, Dispatch};
use crate::error::{MarcMapError, Result};
use crate::field::FieldList;
use crate::keyvalue::KeyValueListener;
use crate::specification::Specification;
use crate::state::EntityBuilderState;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// One record job: the ordered key-value batch of a single record.
pub type KeyValueBatch = Vec<(FieldList, Option<String>)>;

/// Boundary to downstream serialization or indexing.
///
/// `before_completion` runs while the state is still mutable — the place to
/// assign the final identifier. `after_completion` runs on the sealed state
/// and is where the finished resource is written out.
pub trait Sink: Send + Sync {
    /// Called after all pairs are dispatched, before the state is sealed.
    ///
    /// # Errors
    ///
    /// An error abandons the record; it is counted as failed.
    fn before_completion(&self, state: &mut EntityBuilderState) -> Result<()> {
        let _ = state;
        Ok(())
    }

    /// Called once the state is sealed.
    ///
    /// # Errors
    ///
    /// An error is logged and the record is counted as failed.
    fn after_completion(&self, state: &mut EntityBuilderState) -> Result<()> {
        let _ = state;
        Ok(())
    }
}

/// A sink that ignores every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {}

/// Collects completed resources behind a mutex. Useful for tests and small
/// batch runs.
#[derive(Debug, Default)]
pub struct CollectingSink {
    resources: Mutex<Vec<crate::resource::Resource>>,
}

impl CollectingSink {
    /// The resources collected so far.
    ///
    /// # Panics
    ///
    /// Panics if a worker panicked while holding the lock.
    #[must_use]
    pub fn resources(&self) -> Vec<crate::resource::Resource> {
        self.resources.lock().unwrap().clone()
    }
}

impl Sink for CollectingSink {
    fn after_completion(&self, state: &mut EntityBuilderState) -> Result<()> {
        self.resources.lock().unwrap().push(state.resource().clone());
        Ok(())
    }
}

/// Receiver for keys no specification entry matches.
pub trait UnmappedKeyListener: Send + Sync {
    /// Called once per distinct unmapped key per record.
    fn unknown(&self, record_number: u64, key: &FieldList);
}

impl<F> UnmappedKeyListener for F
where
    F: Fn(u64, &FieldList) + Send + Sync,
{
    fn unknown(&self, record_number: u64, key: &FieldList) {
        self(record_number, key);
    }
}

/// Snapshot of the pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    /// Jobs accepted into the queue.
    pub submitted: u64,
    /// Records that ran to completion, including both sink hooks.
    pub completed: u64,
    /// Jobs dropped because the queue was closed.
    pub dropped: u64,
    /// Records abandoned by a handler or sink error.
    pub failed: u64,
}

#[derive(Default)]
struct AtomicCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

struct QueueShared {
    specification: Arc<Specification>,
    sink: Arc<dyn Sink>,
    unmapped: Option<Arc<dyn UnmappedKeyListener>>,
    copy_unmapped: bool,
    closed: AtomicBool,
    counters: AtomicCounters,
    record_counter: AtomicU64,
}

/// Configures and spawns an [`EntityQueue`].
pub struct EntityQueueBuilder {
    specification: Arc<Specification>,
    workers: usize,
    depth: usize,
    sink: Arc<dyn Sink>,
    unmapped: Option<Arc<dyn UnmappedKeyListener>>,
    copy_unmapped: bool,
}

impl std::fmt::Debug for EntityQueueBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityQueueBuilder")
            .field("workers", &self.workers)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl EntityQueueBuilder {
    /// Number of worker threads. Default 1.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Bounded queue depth. Submission blocks when full. Default 32.
    #[must_use]
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth.max(1);
        self
    }

    /// The downstream sink. Default: [`NullSink`].
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = sink;
        self
    }

    /// Listener for unmapped keys.
    #[must_use]
    pub fn unmapped_listener(mut self, listener: Arc<dyn UnmappedKeyListener>) -> Self {
        self.unmapped = Some(listener);
        self
    }

    /// Copy unmapped field groups verbatim onto the resource instead of
    /// dropping them.
    #[must_use]
    pub fn copy_unmapped(mut self, copy: bool) -> Self {
        self.copy_unmapped = copy;
        self
    }

    /// Spawn the workers and return the running queue.
    #[must_use]
    pub fn build(self) -> EntityQueue {
        let shared = Arc::new(QueueShared {
            specification: self.specification,
            sink: self.sink,
            unmapped: self.unmapped,
            copy_unmapped: self.copy_unmapped,
            closed: AtomicBool::new(false),
            counters: AtomicCounters::default(),
            record_counter: AtomicU64::new(0),
        });
        let (sender, receiver) = bounded::<KeyValueBatch>(self.depth);
        let (done_tx, done_rx) = bounded::<()>(self.workers);
        let mut workers = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let receiver = receiver.clone();
            let shared = shared.clone();
            let done = done_tx.clone();
            workers.push(thread::spawn(move || {
                worker_loop(&receiver, &shared);
                let _ = done.send(());
            }));
        }
        EntityQueue {
            sender: Some(sender),
            workers,
            done: done_rx,
            shared,
        }
    }
}

/// The running worker pool.
pub struct EntityQueue {
    sender: Option<Sender<KeyValueBatch>>,
    workers: Vec<thread::JoinHandle<()>>,
    done: Receiver<()>,
    shared: Arc<QueueShared>,
}

impl std::fmt::Debug for EntityQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityQueue")
            .field("workers", &self.workers.len())
            .field("counters", &self.counters())
            .finish_non_exhaustive()
    }
}

impl EntityQueue {
    /// Start configuring a queue over a loaded specification.
    #[must_use]
    pub fn builder(specification: Arc<Specification>) -> EntityQueueBuilder {
        EntityQueueBuilder {
            specification,
            workers: 1,
            depth: 32,
            sink: Arc::new(NullSink),
            unmapped: None,
            copy_unmapped: false,
        }
    }

    /// Submit one record's batch. Blocks while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`MarcMapError::QueueClosed`] after shutdown has begun; the
    /// job is dropped and counted.
    pub fn submit(&self, batch: KeyValueBatch) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            log::warn!("job submitted after shutdown, dropped");
            return Err(MarcMapError::QueueClosed);
        }
        if let Some(sender) = &self.sender {
            if sender.send(batch).is_ok() {
                self.shared
                    .counters
                    .submitted
                    .fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }
        self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
        log::warn!("queue disconnected, job dropped");
        Err(MarcMapError::QueueClosed)
    }

    /// A cloneable submission handle implementing [`KeyValueListener`], for
    /// wiring the queue behind a reducer.
    #[must_use]
    pub fn submitter(&self) -> QueueSubmitter {
        QueueSubmitter {
            sender: self.sender.clone(),
            shared: self.shared.clone(),
            batch: Vec::new(),
        }
    }

    /// Snapshot the pipeline counters.
    #[must_use]
    pub fn counters(&self) -> Counters {
        Counters {
            submitted: self.shared.counters.submitted.load(Ordering::Relaxed),
            completed: self.shared.counters.completed.load(Ordering::Relaxed),
            dropped: self.shared.counters.dropped.load(Ordering::Relaxed),
            failed: self.shared.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop admissions, drain the queue, and wait for the workers.
    ///
    /// In-flight jobs always finish; no worker is interrupted mid-record.
    ///
    /// # Errors
    ///
    /// Returns [`MarcMapError::ShutdownTimeout`] if workers are still
    /// running when the timeout elapses. The queue is unusable afterwards
    /// either way.
    pub fn close(&mut self, timeout: Duration) -> Result<()> {
        self.shared.closed.store(true, Ordering::Release);
        // dropping the sender moves the channel into its draining state
        self.sender.take();
        let deadline = Instant::now() + timeout;
        let mut finished = 0usize;
        while finished < self.workers.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let still_running = self.workers.len() - finished;
                log::error!("shutdown timed out, {still_running} workers still running");
                return Err(MarcMapError::ShutdownTimeout(timeout, still_running));
            }
            match self.done.recv_timeout(remaining) {
                Ok(()) => finished += 1,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        Ok(())
    }
}

/// Submission handle implementing [`KeyValueListener`].
///
/// Accumulates one record's pairs between `begin` and `end`, then submits
/// the batch. Dropped batches (submission after close) are logged and
/// counted by the queue.
pub struct QueueSubmitter {
    sender: Option<Sender<KeyValueBatch>>,
    shared: Arc<QueueShared>,
    batch: KeyValueBatch,
}

impl std::fmt::Debug for QueueSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSubmitter")
            .field("pending", &self.batch.len())
            .finish_non_exhaustive()
    }
}

impl KeyValueListener for QueueSubmitter {
    fn begin(&mut self) {
        self.batch = Vec::new();
    }

    fn key_value(&mut self, key: &FieldList, value: Option<&str>) {
        self.batch
            .push((key.clone(), value.map(ToString::to_string)));
    }

    fn end(&mut self) {
        let batch = std::mem::take(&mut self.batch);
        if self.shared.closed.load(Ordering::Acquire) {
            self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            log::warn!("record finished after shutdown, dropped");
            return;
        }
        if let Some(sender) = &self.sender {
            if sender.send(batch).is_ok() {
                self.shared
                    .counters
                    .submitted
                    .fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
        log::warn!("queue disconnected, record dropped");
    }
}

fn worker_loop(receiver: &Receiver<KeyValueBatch>, shared: &Arc<QueueShared>) {
    loop {
        match receiver.recv_timeout(Duration::from_millis(50)) {
            Ok(batch) => execute_job(batch, shared),
            Err(RecvTimeoutError::Timeout) => {
                // draining: closed and nothing left to take
                if shared.closed.load(Ordering::Acquire) && receiver.is_empty() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn execute_job(batch: KeyValueBatch, shared: &Arc<QueueShared>) {
    let record_number = shared.record_counter.fetch_add(1, Ordering::SeqCst) + 1;
    let mut state = EntityBuilderState::new(record_number);
    let mut reported: HashSet<String> = HashSet::new();

    for (key, value) in &batch {
        if key.is_empty() {
            continue;
        }
        let derived = key.key();
        match shared.specification.lookup(&derived) {
            Some(entry) => {
                let mut ctx = BuildContext {
                    state: &mut state,
                    settings: &entry.settings,
                    handler_name: &entry.handler_name,
                };
                match entry.handler.fields(&mut ctx, key, value.as_deref()) {
                    Ok(Dispatch::Done) => {}
                    Ok(Dispatch::Continue) => match state.resource_mut() {
                        Ok(resource) => {
                            place_by_default(resource, key, &entry.handler_name, &entry.settings);
                        }
                        Err(err) => {
                            abandon_record(shared, record_number, &err);
                            return;
                        }
                    },
                    Err(err) => {
                        abandon_record(shared, record_number, &err);
                        return;
                    }
                }
            }
            None => {
                if reported.insert(derived) {
                    if let Some(listener) = &shared.unmapped {
                        listener.unknown(record_number, key);
                    }
                }
                if shared.copy_unmapped {
                    if let Ok(resource) = state.resource_mut() {
                        place_verbatim(resource, key);
                    }
                }
            }
        }
    }

    if let Err(err) = shared.sink.before_completion(&mut state) {
        abandon_record(shared, record_number, &err);
        return;
    }
    state.complete();
    if let Err(err) = shared.sink.after_completion(&mut state) {
        abandon_record(shared, record_number, &err);
        return;
    }
    shared.counters.completed.fetch_add(1, Ordering::Relaxed);
}

fn abandon_record(shared: &Arc<QueueShared>, record_number: u64, err: &MarcMapError) {
    log::warn!("record {record_number} abandoned: {err}");
    shared.counters.failed.fetch_add(1, Ordering::Relaxed);
}
