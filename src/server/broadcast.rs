//! Snapshot queue between the session and the push connection

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::session::Snapshot;

/// Message on the push queue; `None` ends the current run's stream
pub type PushMessage = Option<Snapshot>;

/// Backlog size at which an unread queue is compacted
const MAX_BACKLOG: usize = 512;

#[derive(Debug, Default)]
struct Shared {
    backlog: parking_lot::Mutex<VecDeque<PushMessage>>,
    ready: Notify,
    senders: AtomicUsize,
}

/// Create a broadcaster and the queue it feeds
pub fn channel() -> (Broadcaster, BroadcastQueue) {
    let shared = Arc::new(Shared::default());
    let reader = Arc::new(Mutex::new(()));
    shared.senders.store(1, Ordering::SeqCst);
    (
        Broadcaster {
            shared: Arc::clone(&shared),
            reader: Arc::clone(&reader),
        },
        BroadcastQueue { shared, reader },
    )
}

/// Producer half, held by the session
#[derive(Debug)]
pub struct Broadcaster {
    shared: Arc<Shared>,
    reader: Arc<Mutex<()>>,
}

impl Broadcaster {
    /// Queue a snapshot, or the end-of-stream sentinel, for delivery
    ///
    /// While no connection reads the queue, a backlog that reaches
    /// [`MAX_BACKLOG`] is cut down to what a connecting UI still needs.
    pub fn broadcast(&self, message: PushMessage) {
        let mut backlog = self.shared.backlog.lock();
        backlog.push_back(message);
        if backlog.len() >= MAX_BACKLOG && self.reader.try_lock().is_ok() {
            let before = backlog.len();
            compact(&mut backlog);
            tracing::debug!(before, after = backlog.len(), "Compacted unread push queue");
        }
        drop(backlog);
        self.shared.ready.notify_one();
    }
}

impl Clone for Broadcaster {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: Arc::clone(&self.shared),
            reader: Arc::clone(&self.reader),
        }
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.ready.notify_one();
        }
    }
}

/// Keep the end of the last finished run and the newest snapshot after it
///
/// Every other snapshot is superseded by a later one of the same run.
fn compact(backlog: &mut VecDeque<PushMessage>) {
    let last_end = backlog.iter().rposition(Option::is_none);
    let latest = backlog
        .iter()
        .rposition(Option::is_some)
        .filter(|&i| last_end.map_or(true, |end| i > end));

    let mut kept = VecDeque::with_capacity(3);
    if let Some(end) = last_end {
        if let Some(final_snapshot) = end.checked_sub(1).filter(|&i| backlog[i].is_some()) {
            kept.push_back(backlog[final_snapshot].take());
        }
        kept.push_back(None);
    }
    if let Some(i) = latest {
        kept.push_back(backlog[i].take());
    }
    *backlog = kept;
}

/// Consumer half, shared by push connections
///
/// Only the connection holding the subscription reads from the queue, so a
/// second client cannot steal or interleave the first one's snapshots.
#[derive(Debug, Clone)]
pub struct BroadcastQueue {
    shared: Arc<Shared>,
    reader: Arc<Mutex<()>>,
}

impl BroadcastQueue {
    /// Take every message queued so far without waiting
    ///
    /// Returns nothing while a push connection holds the queue.
    pub fn drain(&self) -> Vec<PushMessage> {
        let Ok(_reader) = self.reader.try_lock() else {
            return Vec::new();
        };
        self.shared.backlog.lock().drain(..).collect()
    }

    /// Wait until no other connection reads the queue, then read it
    pub(crate) async fn subscribe(&self) -> Subscription<'_> {
        Subscription {
            shared: &self.shared,
            _reader: self.reader.lock().await,
        }
    }
}

/// Exclusive read access to the push queue
pub(crate) struct Subscription<'q> {
    shared: &'q Shared,
    _reader: MutexGuard<'q, ()>,
}

impl Subscription<'_> {
    /// Next queued message; `None` once every broadcaster is gone
    pub(crate) async fn recv(&mut self) -> Option<PushMessage> {
        loop {
            let next = self.shared.backlog.lock().pop_front();
            if let Some(message) = next {
                return Some(message);
            }
            if self.shared.senders.load(Ordering::SeqCst) == 0 {
                return None;
            }
            self.shared.ready.notified().await;
        }
    }
}
