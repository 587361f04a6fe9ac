use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use graphflow_query::ResultChange;

/// §5 back-pressure: "the processor must not buffer more than a bounded
/// number of events per query... a bounded queue with drop-oldest is
/// acceptable and must be reported via an error counter." Modeled on the
/// shape of the teacher's `ClientConnectionSender::send` (try-push, handle
/// a full queue) in `crates/core/src/client/client_connection.rs`, but the
/// policy there is to disconnect the client on overflow; here §5 mandates
/// drop-oldest instead, so the queue is hand-rolled rather than a bare
/// `tokio::sync::mpsc` (whose bounded sender blocks, and whose `try_send`
/// only rejects — neither can evict the head).
pub(crate) struct OutputQueue {
    buffer: Mutex<VecDeque<ResultChange>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

/// The default bound on a subscriber's undelivered-change backlog, the same
/// order of magnitude as the teacher's `CLIENT_CHANNEL_CAPACITY` in
/// `client_connection.rs`.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16 * 1024;

impl OutputQueue {
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        Arc::new(OutputQueue {
            buffer: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Pushes one change, evicting the oldest undelivered entry if the
    /// queue is already at capacity (§5, §7 "Backpressure saturation").
    pub(crate) fn push(&self, change: ResultChange) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut buf = self.buffer.lock();
            if buf.len() >= self.capacity {
                buf.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            buf.push_back(change);
        }
        self.notify.notify_one();
    }

    /// Replay items are pushed ahead of anything already buffered so a
    /// subscriber that joins mid-stream sees "current set, then live
    /// deltas in arrival order" (§6) rather than deltas interleaved with
    /// the snapshot.
    pub(crate) fn push_replay_front(&self, changes: Vec<ResultChange>) {
        let mut buf = self.buffer.lock();
        for change in changes.into_iter().rev() {
            buf.push_front(change);
        }
        drop(buf);
        self.notify.notify_one();
    }

    pub(crate) async fn recv(&self) -> Option<ResultChange> {
        loop {
            {
                let mut buf = self.buffer.lock();
                if let Some(change) = buf.pop_front() {
                    return Some(change);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(crate) fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A live handle to one `subscribe(queryId)` call (§4.4, §6): first drains
/// the replayed current set, then live deltas in arrival order, until the
/// query is deleted or the subscription is explicitly closed (§5
/// cancellation).
pub struct Subscription {
    pub(crate) queue: Arc<OutputQueue>,
}

impl Subscription {
    /// Awaits the next `ResultChange`. Returns `None` once the owning query
    /// has been removed and every buffered change has been drained.
    pub async fn recv(&mut self) -> Option<ResultChange> {
        self.queue.recv().await
    }

    /// Consumers may have downstream delivery treated as at-most-once (§6,
    /// §7): this is how many buffered changes were evicted to make room for
    /// newer ones before this subscriber ever saw them.
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// §5 cancellation: stop consuming without touching shared state; the
    /// engine itself is responsible for `clear-query` when the whole query
    /// is torn down, not when one subscriber walks away.
    pub fn close(&self) {
        self.queue.close();
    }
}
