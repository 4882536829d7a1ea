use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

use super::event::ProgressEvent;
use crate::jobs::JobId;

/// Default per-subscriber queue depth
pub const DEFAULT_BUFFER: usize = 64;

/// Handle identifying one registered observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle(u64);

/// A registered observer.
///
/// `job_id == None` marks a global listener that sees every job's events.
struct Subscriber {
    job_id: Option<JobId>,
    sender: mpsc::Sender<ProgressEvent>,
}

impl Subscriber {
    fn wants(&self, job_id: &JobId) -> bool {
        self.job_id.as_ref().map_or(true, |id| id == job_id)
    }
}

/// Fan-out of progress events to per-job and global observers.
///
/// Every subscriber owns a bounded queue. `publish` only ever does a
/// non-blocking `try_send` into those queues, so a slow transport on the
/// receiving side can never stall the publisher or the other subscribers.
/// Subscribers whose queue is closed, or too full to take a mandatory
/// event, are dropped from the hub. Once closed, the hub accepts no new
/// subscribers.
pub struct ObserverHub {
    next_id: AtomicU64,
    buffer: usize,
    closed: AtomicBool,
    subscribers: RwLock<HashMap<SubscriberHandle, Subscriber>>,
}

impl ObserverHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            closed: AtomicBool::new(false),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register an observer for one job, or for all jobs when `job_id` is `None`.
    ///
    /// Returns the handle used to unsubscribe and the receiving end of the
    /// subscriber's queue. After `close_all` the returned stream is already
    /// ended.
    pub async fn subscribe(
        &self,
        job_id: Option<JobId>,
    ) -> (SubscriberHandle, mpsc::Receiver<ProgressEvent>) {
        let handle = SubscriberHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.buffer);

        let mut subscribers = self.subscribers.write().await;
        if self.closed.load(Ordering::Acquire) {
            debug!(subscriber = handle.0, job_id = ?job_id, "Hub closed, subscriber rejected");
            return (handle, receiver);
        }

        debug!(subscriber = handle.0, job_id = ?job_id, "Subscriber registered");
        subscribers.insert(handle, Subscriber { job_id, sender });
        drop(subscribers);

        (handle, receiver)
    }

    /// Deliver `event` to every subscriber of `job_id` and every global subscriber.
    ///
    /// Never fails: undeliverable subscribers are removed, nothing is retried.
    pub async fn publish(&self, job_id: &JobId, event: ProgressEvent) {
        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (handle, subscriber) in subscribers.iter().filter(|(_, s)| s.wants(job_id)) {
                match subscriber.sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) if event.advisory => {
                        trace!(subscriber = handle.0, %job_id, "Subscriber busy, skipped intermediate update");
                    }
                    Err(TrySendError::Full(_)) => {
                        warn!(subscriber = handle.0, %job_id, "Subscriber queue full, dropping subscriber");
                        dead.push(*handle);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(subscriber = handle.0, %job_id, "Subscriber gone, dropping subscriber");
                        dead.push(*handle);
                    }
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for handle in dead {
                subscribers.remove(&handle);
            }
        }
    }

    /// Remove a subscriber. Unknown or already removed handles are ignored.
    pub async fn unsubscribe(&self, handle: SubscriberHandle) {
        if self.subscribers.write().await.remove(&handle).is_some() {
            debug!(subscriber = handle.0, "Subscriber removed");
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Drop every subscriber and refuse new ones; receivers observe the end
    /// of the stream
    pub async fn close_all(&self) {
        let mut subscribers = self.subscribers.write().await;
        self.closed.store(true, Ordering::Release);
        let count = subscribers.len();
        subscribers.clear();
        info!(count, "Closed all progress subscribers");
    }
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}
