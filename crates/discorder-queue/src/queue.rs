use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

use discorder_core::types::{QueueRequest, RequestStatus};

use crate::error::{QueueError, Result};

/// Default bound on in-flight + waiting requests (`M` in the spec).
pub const DEFAULT_CAPACITY: usize = 50;

/// How long `next()` waits for a wakeup before returning `None` so callers
/// can check a shutdown signal between polls.
const NEXT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum EnqueueOutcome {
    Accepted { position: usize },
    RejectedFull,
    RejectedDuplicateUser,
}

struct Inner {
    items: VecDeque<QueueRequest>,
    active_users: HashSet<String>,
    capacity: usize,
}

/// Bounded FIFO with single-flight-per-user enforcement.
///
/// In-memory only: the queue is a dispatch buffer, not an audit log — the
/// durable record of what was asked and answered lives in the Conversation
/// Store once a request completes.
pub struct RequestQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                active_users: HashSet::new(),
                capacity,
            }),
            notify: Notify::new(),
        }
    }

    #[instrument(skip(self, req), fields(user_id = %req.user_id))]
    pub fn enqueue(&self, req: QueueRequest) -> EnqueueOutcome {
        let mut inner = self.inner.lock().unwrap();
        let user_key = req.user_id.as_str().to_string();
        if inner.active_users.contains(&user_key) {
            warn!("duplicate in-flight request rejected");
            return EnqueueOutcome::RejectedDuplicateUser;
        }
        if inner.items.len() >= inner.capacity {
            warn!("queue full, request rejected");
            return EnqueueOutcome::RejectedFull;
        }
        inner.active_users.insert(user_key);
        inner.items.push_back(req);
        let position = inner.items.len();
        drop(inner);
        self.notify.notify_one();
        debug!(position, "request enqueued");
        EnqueueOutcome::Accepted { position }
    }

    /// Try to enqueue, translating rejection into a [`QueueError`].
    pub fn try_enqueue(&self, req: QueueRequest) -> Result<usize> {
        let user_id = req.user_id.as_str().to_string();
        match self.enqueue(req) {
            EnqueueOutcome::Accepted { position } => Ok(position),
            EnqueueOutcome::RejectedFull => Err(QueueError::Full),
            EnqueueOutcome::RejectedDuplicateUser => Err(QueueError::DuplicateUser(user_id)),
        }
    }

    /// Pop the next request, transitioning it to `Processing`. Blocks up to
    /// a short timeout so the worker loop can re-check shutdown signals.
    #[instrument(skip(self))]
    pub async fn next(&self) -> Option<QueueRequest> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(mut req) = inner.items.pop_front() {
                    req.status = RequestStatus::Processing;
                    return Some(req);
                }
            }
            let notified = self.notify.notified();
            if tokio::time::timeout(NEXT_POLL_TIMEOUT, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Release a user's single-flight slot and update counters. `success` is
    /// reserved for metrics hookup; the queue itself tracks no history.
    #[instrument(skip(self))]
    pub fn complete(&self, user_id: &str, success: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.active_users.remove(user_id);
        info!(success, "request completed, user slot released");
    }

    /// 1-based position of `user_id`'s request in the waiting FIFO, if any.
    pub fn position(&self, user_id: &str) -> Option<usize> {
        let inner = self.inner.lock().unwrap();
        inner
            .items
            .iter()
            .position(|r| r.user_id.as_str() == user_id)
            .map(|idx| idx + 1)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use discorder_core::types::{OriginChannelRef, RequestType, ServerId, UserId};

    fn sample_request(user: &str) -> QueueRequest {
        QueueRequest {
            user_id: UserId::from(user),
            server_id: ServerId::from("s1"),
            message: "hello".to_string(),
            request_type: RequestType::Chat,
            enqueued_at: Utc::now(),
            status: RequestStatus::Queued,
            origin_channel: OriginChannelRef {
                channel_id: 1,
                status_message_id: None,
            },
        }
    }

    #[test]
    fn enqueue_reports_fifo_position() {
        let q = RequestQueue::new(10);
        match q.enqueue(sample_request("u1")) {
            EnqueueOutcome::Accepted { position } => assert_eq!(position, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
        match q.enqueue(sample_request("u2")) {
            EnqueueOutcome::Accepted { position } => assert_eq!(position, 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn duplicate_user_is_rejected() {
        let q = RequestQueue::new(10);
        q.enqueue(sample_request("u1"));
        match q.enqueue(sample_request("u1")) {
            EnqueueOutcome::RejectedDuplicateUser => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn full_queue_is_rejected() {
        let q = RequestQueue::new(1);
        q.enqueue(sample_request("u1"));
        match q.enqueue(sample_request("u2")) {
            EnqueueOutcome::RejectedFull => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn next_pops_in_fifo_order_and_frees_slot_on_complete() {
        let q = RequestQueue::new(10);
        q.enqueue(sample_request("u1"));
        q.enqueue(sample_request("u2"));

        let first = q.next().await.unwrap();
        assert_eq!(first.user_id.as_str(), "u1");
        q.complete("u1", true);

        // u1 can re-enqueue now that its slot is freed.
        match q.enqueue(sample_request("u1")) {
            EnqueueOutcome::Accepted { .. } => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn next_returns_none_when_empty_after_timeout() {
        let q = RequestQueue::new(10);
        assert!(q.next().await.is_none());
    }

    #[test]
    fn position_reflects_fifo_order() {
        let q = RequestQueue::new(10);
        q.enqueue(sample_request("u1"));
        q.enqueue(sample_request("u2"));
        assert_eq!(q.position("u2"), Some(2));
        assert_eq!(q.position("missing"), None);
    }
}
