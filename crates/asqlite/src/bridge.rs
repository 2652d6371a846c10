// SPDX-FileCopyrightText: 2026 Asqlite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The concurrency bridge: a bounded LIFO work buffer shared by dispatcher
//! threads, plus the call-submission path that turns a blocking closure into
//! an awaitable resolved on the owning scheduler.
//!
//! Ordering is last-in-first-out by design: the most recently submitted call
//! is serviced before older, still-pending ones, and a push beyond capacity
//! silently discards the oldest unconsumed entry. Callers must not assume
//! submission order implies completion order.

use std::collections::VecDeque;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::thread;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{AsqliteError, Result};

/// Fixed capacity of the shared work buffer.
const WORK_BUFFER_CAPACITY: usize = 20;

/// A queued unit of work: runs the blocking call on the dispatcher thread and
/// spawns the resolution of its pending-result handle onto the owning
/// scheduler.
struct WorkItem {
    run: Box<dyn FnOnce() + Send>,
}

impl WorkItem {
    fn run(self) {
        (self.run)();
    }
}

/// Bounded, fixed-capacity LIFO buffer of pending work items.
struct WorkBuffer {
    items: Mutex<VecDeque<WorkItem>>,
}

impl WorkBuffer {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(WORK_BUFFER_CAPACITY)),
        }
    }

    fn push(&self, item: WorkItem) {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.push_back(item);
        if items.len() > WORK_BUFFER_CAPACITY {
            warn!(
                capacity = WORK_BUFFER_CAPACITY,
                "work buffer full; discarding oldest pending call"
            );
            if let Some(evicted) = items.pop_front() {
                // The evicted caller's future must stay pending forever, not
                // fail: leaking the item keeps its result sender alive without
                // ever resolving it.
                std::mem::forget(evicted);
            }
        }
    }

    /// Removes the most recently pushed item.
    fn pop(&self) -> Option<WorkItem> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_back()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// The scheduler bridge: owns one work buffer and hands it to every
/// dispatcher spawned through it.
///
/// Connections opened through the same bridge share its buffer, so any of
/// their dispatchers may service any connection's calls. Independent bridges
/// are fully isolated from each other.
#[derive(Clone)]
pub struct Bridge {
    buffer: Arc<WorkBuffer>,
}

impl Bridge {
    /// Creates a bridge with an empty work buffer and no dispatchers.
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(WorkBuffer::new()),
        }
    }

    /// Spawns one detached dispatcher thread draining this bridge's buffer.
    ///
    /// The thread is never joined and lives for the rest of the process.
    pub(crate) fn spawn_dispatcher(&self) -> Result<()> {
        let buffer = Arc::clone(&self.buffer);
        let _ = thread::Builder::new()
            .name("asqlite-dispatcher".into())
            .spawn(move || dispatcher_loop(&buffer))?;
        debug!("dispatcher thread spawned");
        Ok(())
    }

    /// Enqueues `f` and returns a future that suspends until a dispatcher has
    /// executed it and its result has been delivered back onto `scheduler`.
    ///
    /// Exactly one resolution occurs per submission, unless the work item is
    /// evicted from the buffer before being drained, in which case the
    /// returned future never resolves.
    pub(crate) fn submit<T, F>(
        &self,
        scheduler: &Handle,
        f: F,
    ) -> impl Future<Output = Result<T>> + Send + use<T, F>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let scheduler = scheduler.clone();
        self.buffer.push(WorkItem {
            run: Box::new(move || {
                let outcome = f();
                // Resolution happens on the scheduler, not on this thread.
                scheduler.spawn(async move {
                    let _ = tx.send(outcome);
                });
            }),
        });
        async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(AsqliteError::Disconnected),
            }
        }
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").finish_non_exhaustive()
    }
}

/// Returns the process-wide bridge backing the convenience `connect` path.
pub(crate) fn default_bridge() -> Bridge {
    static DEFAULT: LazyLock<Bridge> = LazyLock::new(Bridge::new);
    DEFAULT.clone()
}

fn dispatcher_loop(buffer: &WorkBuffer) {
    loop {
        match buffer.pop() {
            Some(item) => item.run(),
            // Empty buffer: retry immediately, yielding the timeslice instead
            // of sleeping.
            None => thread::yield_now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn submit_resolves_with_the_closure_value() {
        let bridge = Bridge::new();
        bridge.spawn_dispatcher().unwrap();

        let value = bridge
            .submit(&Handle::current(), || Ok(6 * 7))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn lifo_drains_most_recent_submission_first() {
        let bridge = Bridge::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = Arc::clone(&order);
        let fut_a = bridge.submit(&Handle::current(), move || {
            order_a.lock().unwrap().push('a');
            Ok(())
        });
        let order_b = Arc::clone(&order);
        let fut_b = bridge.submit(&Handle::current(), move || {
            order_b.lock().unwrap().push('b');
            Ok(())
        });

        // Drain by hand: the second submission must be eligible first.
        bridge.buffer.pop().unwrap().run();
        bridge.buffer.pop().unwrap().run();
        fut_b.await.unwrap();
        fut_a.await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!['b', 'a']);
    }

    #[tokio::test]
    async fn overflow_evicts_the_oldest_submission_without_resolving_it() {
        let bridge = Bridge::new();
        let scheduler = Handle::current();

        let mut futures = Vec::new();
        for i in 0..21 {
            futures.push(bridge.submit(&scheduler, move || Ok(i)));
        }
        assert_eq!(bridge.buffer.len(), WORK_BUFFER_CAPACITY);

        bridge.spawn_dispatcher().unwrap();

        let mut futures = futures.into_iter();
        let first = futures.next().unwrap();
        // The first submission was silently discarded; its future never
        // resolves.
        let timed_out = tokio::time::timeout(Duration::from_millis(200), first)
            .await
            .is_err();
        assert!(timed_out, "evicted submission must stay pending");

        for (i, fut) in futures.enumerate() {
            assert_eq!(fut.await.unwrap(), i as i32 + 1);
        }
    }

    #[tokio::test]
    async fn closure_errors_are_delivered_and_do_not_kill_the_dispatcher() {
        let bridge = Bridge::new();
        bridge.spawn_dispatcher().unwrap();
        let scheduler = Handle::current();

        let err = bridge
            .submit::<(), _>(&scheduler, || {
                Err(AsqliteError::Config("boom".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AsqliteError::Config(_)));

        // The same dispatcher keeps servicing later submissions.
        let value = bridge.submit(&scheduler, || Ok("still alive")).await.unwrap();
        assert_eq!(value, "still alive");
    }

    #[tokio::test]
    async fn independent_bridges_do_not_share_a_buffer() {
        let serviced = Bridge::new();
        let idle = Bridge::new();
        serviced.spawn_dispatcher().unwrap();
        let scheduler = Handle::current();

        let resolved = serviced.submit(&scheduler, || Ok(1)).await.unwrap();
        assert_eq!(resolved, 1);

        let stuck = idle.submit(&scheduler, || Ok(2));
        let timed_out = tokio::time::timeout(Duration::from_millis(200), stuck)
            .await
            .is_err();
        assert!(timed_out, "a bridge with no dispatcher must not be drained");
        assert_eq!(idle.buffer.len(), 1);
    }
}
