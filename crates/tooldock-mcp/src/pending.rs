//! Correlation of outstanding requests with their replies.
//!
//! Every request registers a single-use slot keyed by its id. The slot is
//! removed exactly once: by the receive loop when the reply arrives, by
//! [`PendingRequests::fail_all`] at shutdown, or by the [`PendingRequest`]
//! handle's `Drop` when the caller times out or stops waiting. Whoever comes
//! second finds nothing to remove.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{McpError, Result};
use crate::protocol::RequestId;

type Slot = oneshot::Sender<Result<Value>>;

/// Table of requests awaiting a reply.
#[derive(Debug)]
pub struct PendingRequests {
    slots: Mutex<HashMap<RequestId, Slot>>,
    next_id: AtomicU64,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequests {
    /// Create an empty table. Ids start at 1.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh id and register a slot for it.
    pub fn register(self: &Arc<Self>) -> PendingRequest {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(id.clone(), tx);
        PendingRequest {
            id,
            rx,
            table: Arc::clone(self),
        }
    }

    /// Complete the slot for `id`.
    ///
    /// Returns `false` when no request is waiting on that id (already
    /// answered, timed out, or never issued).
    pub fn resolve(&self, id: &RequestId, outcome: Result<Value>) -> bool {
        let Some(slot) = self.slots.lock().remove(id) else {
            return false;
        };
        if slot.send(outcome).is_err() {
            tracing::debug!(id = %id, "waiter went away before its reply arrived");
        }
        true
    }

    /// Fail every outstanding request with [`McpError::ConnectionClosed`].
    ///
    /// Returns how many requests were failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.slots.lock().drain().collect();
        let count = drained.len();
        for (_, slot) in drained {
            let _ = slot.send(Err(McpError::ConnectionClosed));
        }
        count
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    fn cancel(&self, id: &RequestId) -> bool {
        self.slots.lock().remove(id).is_some()
    }
}

/// Handle for one outstanding request.
///
/// Dropping it without a reply removes the slot from the table.
#[derive(Debug)]
pub struct PendingRequest {
    id: RequestId,
    rx: oneshot::Receiver<Result<Value>>,
    table: Arc<PendingRequests>,
}

impl PendingRequest {
    /// The id assigned to this request.
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Wait for the reply, giving up after `timeout`.
    pub async fn wait(self, method: &str, timeout: Duration) -> Result<Value> {
        self.wait_until(method, Instant::now() + timeout, timeout).await
    }

    /// Wait for the reply until `deadline`. `timeout` is the budget the
    /// deadline was derived from, reported in the timeout error.
    pub async fn wait_until(
        mut self,
        method: &str,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<Value> {
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::ConnectionClosed),
            Err(_) => {
                tracing::debug!(id = %self.id, method, ?timeout, "request timed out");
                Err(McpError::timeout(method, timeout))
            }
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if self.table.cancel(&self.id) {
            tracing::trace!(id = %self.id, "cleared abandoned request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_are_unique() {
        let table = Arc::new(PendingRequests::new());
        let a = table.register();
        let b = table.register();
        let c = table.register();
        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_eq!(a.id(), &RequestId::Number(1));
        assert_eq!(table.len(), 3);
    }

    #[tokio::test]
    async fn test_out_of_order_resolution() {
        let table = Arc::new(PendingRequests::new());
        let first = table.register();
        let second = table.register();
        let (id1, id2) = (first.id().clone(), second.id().clone());

        assert!(table.resolve(&id2, Ok(json!("two"))));
        assert!(table.resolve(&id1, Ok(json!("one"))));

        let t = Duration::from_secs(1);
        assert_eq!(first.wait("a", t).await.unwrap(), json!("one"));
        assert_eq!(second.wait("b", t).await.unwrap(), json!("two"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_unknown_and_duplicate_replies_are_ignored() {
        let table = Arc::new(PendingRequests::new());
        let req = table.register();
        let id = req.id().clone();

        assert!(!table.resolve(&RequestId::Number(999), Ok(Value::Null)));
        assert!(table.resolve(&id, Ok(Value::Null)));
        assert!(!table.resolve(&id, Ok(Value::Null)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_clears_slot_and_late_reply_is_noop() {
        let table = Arc::new(PendingRequests::new());
        let req = table.register();
        let id = req.id().clone();

        let err = req
            .wait("tools/call", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(table.is_empty());
        assert!(!table.resolve(&id, Ok(json!("late"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_honours_an_already_spent_budget() {
        let table = Arc::new(PendingRequests::new());
        let req = table.register();
        let deadline = Instant::now() + Duration::from_millis(200);
        tokio::time::sleep(Duration::from_millis(150)).await;

        let started = Instant::now();
        let err = req
            .wait_until("tools/call", deadline, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(started.elapsed(), Duration::from_millis(50));
        assert!(table.is_empty());
    }

    #[test]
    fn test_dropped_handle_clears_slot() {
        let table = Arc::new(PendingRequests::new());
        let req = table.register();
        assert_eq!(table.len(), 1);
        drop(req);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_fail_all() {
        let table = Arc::new(PendingRequests::new());
        let a = table.register();
        let b = table.register();

        assert_eq!(table.fail_all(), 2);
        let t = Duration::from_secs(1);
        assert!(matches!(
            a.wait("x", t).await,
            Err(McpError::ConnectionClosed)
        ));
        assert!(matches!(
            b.wait("y", t).await,
            Err(McpError::ConnectionClosed)
        ));
        assert_eq!(table.fail_all(), 0);
    }
}
