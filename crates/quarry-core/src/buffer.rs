//! Change-coalescing buffer.
//!
//! `BufferSet` absorbs bursts of items keyed by an identifier. A later item
//! with the same key replaces the earlier one, so a save-save-save burst on
//! one file becomes a single operation. Once the buffer holds
//! `auto_flush_threshold` items a flush is scheduled on a worker thread;
//! scheduled flushes are throttled to at most one per cooldown window and
//! fire on the trailing edge. `force_flush` drains immediately.
//!
//! A flush takes the current batch out of the map before the handler runs,
//! so items added while a handler is busy accumulate into the next batch.

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// Receives each flushed batch.
pub type FlushHandler<T> = Box<dyn Fn(Vec<T>) + Send + Sync>;

/// Maps an item to its coalescing key.
pub type Identifier<T, K> = Box<dyn Fn(&T) -> K + Send + Sync>;

enum Signal {
    Schedule,
    Shutdown,
}

struct Shared<T, K> {
    items: Mutex<HashMap<K, T>>,
    handler: FlushHandler<T>,
    identifier: Identifier<T, K>,
    /// Serializes handler invocations
    flushing: Mutex<()>,
}

impl<T, K> Shared<T, K>
where
    K: Eq + Hash,
{
    fn flush(&self, reason: &str) -> usize {
        let _guard = self.flushing.lock();

        let batch: Vec<T> = {
            let mut items = self.items.lock();
            if items.is_empty() {
                return 0;
            }
            std::mem::take(&mut *items).into_values().collect()
        };

        let count = batch.len();
        debug!(reason = reason, items = count, "Flushing buffered items");
        (self.handler)(batch);
        count
    }
}

/// A keyed, last-write-wins buffer with throttled automatic flushing.
pub struct BufferSet<T, K>
where
    T: Send + 'static,
    K: Eq + Hash + Send + 'static,
{
    shared: Arc<Shared<T, K>>,
    auto_flush_threshold: usize,
    trigger: Sender<Signal>,
    worker: Option<JoinHandle<()>>,
}

impl<T, K> BufferSet<T, K>
where
    T: Send + 'static,
    K: Eq + Hash + Send + 'static,
{
    /// Create a buffer and start its flush worker.
    pub fn new(
        handler: impl Fn(Vec<T>) + Send + Sync + 'static,
        identifier: impl Fn(&T) -> K + Send + Sync + 'static,
        auto_flush_threshold: usize,
        cooldown: Duration,
    ) -> Self {
        let shared = Arc::new(Shared {
            items: Mutex::new(HashMap::new()),
            handler: Box::new(handler),
            identifier: Box::new(identifier),
            flushing: Mutex::new(()),
        });

        let (trigger, signals) = unbounded::<Signal>();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || {
            while let Ok(Signal::Schedule) = signals.recv() {
                // Trailing edge: hold the window open and absorb further
                // schedule requests until the cooldown elapses.
                let deadline = Instant::now() + cooldown;
                let mut shutdown = false;
                loop {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    match signals.recv_timeout(deadline - now) {
                        Ok(Signal::Schedule) => continue,
                        Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                            shutdown = true;
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => break,
                    }
                }
                if shutdown {
                    break;
                }
                worker_shared.flush("threshold");
            }
        });

        BufferSet {
            shared,
            auto_flush_threshold: auto_flush_threshold.max(1),
            trigger,
            worker: Some(worker),
        }
    }

    /// Add an item, replacing any pending item with the same key.
    pub fn add(&self, item: T) {
        let key = (self.shared.identifier)(&item);
        let len = {
            let mut items = self.shared.items.lock();
            items.insert(key, item);
            items.len()
        };

        if len >= self.auto_flush_threshold {
            let _ = self.trigger.send(Signal::Schedule);
        }
    }

    /// Hand the current contents to the handler now, bypassing the throttle.
    ///
    /// Returns the number of items flushed; an empty buffer is a no-op.
    pub fn force_flush(&self) -> usize {
        self.shared.flush("forced")
    }

    /// Number of pending items
    pub fn len(&self) -> usize {
        self.shared.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, K> Drop for BufferSet<T, K>
where
    T: Send + 'static,
    K: Eq + Hash + Send + 'static,
{
    fn drop(&mut self) {
        let pending = self.len();
        if pending > 0 {
            debug!(pending = pending, "Dropping buffer with unflushed items");
        }
        let _ = self.trigger.send(Signal::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
