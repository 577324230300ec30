use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::messenger::Messenger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScheduledDeletion {
    pub due: Instant,
    pub chat_id: i64,
    pub message_id: i32,
}

struct QueueInner {
    entries: Mutex<BinaryHeap<Reverse<ScheduledDeletion>>>,
    notify: Notify,
}

/// Work queue of messages to delete once their due time passes.
///
/// Entries cannot be cancelled. Deletion failures are ignored.
#[derive(Clone)]
pub struct DeletionQueue {
    inner: Arc<QueueInner>,
}

impl Default for DeletionQueue {
    fn default() -> Self {
        DeletionQueue::new()
    }
}

impl DeletionQueue {
    pub fn new() -> Self {
        DeletionQueue {
            inner: Arc::new(QueueInner {
                entries: Mutex::new(BinaryHeap::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Schedules every `(chat_id, message_id)` for deletion `delay` from now.
    pub fn schedule(&self, delivered: &[(i64, i32)], delay: Duration) -> Instant {
        let due = Instant::now() + delay;
        self.schedule_at(delivered, due);
        due
    }

    pub fn schedule_at(&self, delivered: &[(i64, i32)], due: Instant) {
        if delivered.is_empty() {
            return;
        }
        {
            let mut entries = self.inner.entries.lock();
            for &(chat_id, message_id) in delivered {
                entries.push(Reverse(ScheduledDeletion {
                    due,
                    chat_id,
                    message_id,
                }));
            }
        }
        self.inner.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.inner
            .entries
            .lock()
            .peek()
            .map(|Reverse(entry)| entry.due)
    }

    /// Removes and returns every entry due at or before `now`, earliest first.
    pub fn take_due(&self, now: Instant) -> Vec<ScheduledDeletion> {
        let mut entries = self.inner.entries.lock();
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = entries.peek() {
            if entry.due > now {
                break;
            }
            due.push(*entry);
            entries.pop();
        }
        due
    }

    pub fn spawn(&self, messenger: Arc<dyn Messenger>) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move { queue.run(messenger).await })
    }

    pub async fn run(&self, messenger: Arc<dyn Messenger>) {
        info!("Deletion queue worker started");
        loop {
            let notified = self.inner.notify.notified();
            match self.next_due() {
                Some(due) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(due) => {}
                        _ = notified => continue,
                    }
                }
                None => {
                    notified.await;
                    continue;
                }
            }

            let batch = self.take_due(Instant::now());
            delete_batch(messenger.as_ref(), &batch).await;
        }
    }
}

pub async fn delete_batch(messenger: &dyn Messenger, batch: &[ScheduledDeletion]) {
    let mut deleted = 0usize;
    for entry in batch {
        match messenger.delete_message(entry.chat_id, entry.message_id).await {
            Ok(()) => deleted += 1,
            Err(err) => debug!(
                "Scheduled deletion of {} in {} failed: {err}",
                entry.message_id, entry.chat_id
            ),
        }
    }
    if !batch.is_empty() {
        info!("Scheduled deletions ran: {deleted}/{} removed", batch.len());
    }
}
