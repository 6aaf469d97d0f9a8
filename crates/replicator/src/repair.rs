//! Repair queue contract and the per-failure enqueuer.
//!
//! Every replica that fails to acknowledge a write gets one durable repair
//! event, keyed by the object's placement group, so a background consumer
//! can reconcile the replica later. The queue itself (durability, ordering,
//! deduplication, retry) lives outside this crate.

use bytes::Bytes;
use strata_common::ReplicationMethod;

/// Queue message kinds the replicator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairKind {
    /// A put replica did not acknowledge.
    Replicate,
    /// A delete replica did not acknowledge.
    Delete,
}

impl RepairKind {
    pub fn for_method(method: ReplicationMethod) -> Self {
        match method {
            ReplicationMethod::Put => Self::Replicate,
            ReplicationMethod::Delete => Self::Delete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replicate => "replicate",
            Self::Delete => "delete",
        }
    }
}

/// One durable reconciliation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairEvent {
    pub kind: RepairKind,
    /// Placement-group identifier of the object (queue routing key).
    pub addr_id: u64,
    pub key: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
}

/// Durable per-object repair queue.
#[async_trait::async_trait]
pub trait RepairQueue: Send + Sync + 'static {
    /// Append one event. Durable once this returns.
    async fn publish(&self, event: RepairEvent) -> Result<(), QueueError>;

    /// Take up to `max` pending events for handling. Events stay pending
    /// until acked and are redelivered otherwise.
    async fn take(&self, max: usize) -> Result<Vec<RepairEvent>, QueueError>;

    /// Mark an event handled.
    async fn ack(&self, event: &RepairEvent) -> Result<(), QueueError>;
}

/// Enqueue a repair for one failed replica.
///
/// Best-effort: a queue error is logged and swallowed, it never reaches
/// the replication caller.
pub async fn enqueue_repair<Q: RepairQueue>(
    queue: &Q,
    method: ReplicationMethod,
    addr_id: u64,
    key: &Bytes,
) {
    let event = RepairEvent {
        kind: RepairKind::for_method(method),
        addr_id,
        key: key.clone(),
    };
    match queue.publish(event).await {
        Ok(()) => strata_metrics::metrics().repair_enqueued.inc(),
        Err(e) => {
            tracing::warn!(
                "failed to enqueue repair for addr {} key '{}': {}",
                addr_id,
                String::from_utf8_lossy(key),
                e
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_kind_for_method() {
        assert_eq!(
            RepairKind::for_method(ReplicationMethod::Put),
            RepairKind::Replicate
        );
        assert_eq!(
            RepairKind::for_method(ReplicationMethod::Delete),
            RepairKind::Delete
        );
        assert_eq!(RepairKind::Replicate.as_str(), "replicate");
        assert_eq!(RepairKind::Delete.as_str(), "delete");
    }

    #[derive(Default)]
    struct RecordingQueue {
        published: Mutex<Vec<RepairEvent>>,
        fail_publish: bool,
    }

    #[async_trait::async_trait]
    impl RepairQueue for RecordingQueue {
        async fn publish(&self, event: RepairEvent) -> Result<(), QueueError> {
            if self.fail_publish {
                return Err(QueueError::Publish("queue down".into()));
            }
            self.published.lock().unwrap().push(event);
            Ok(())
        }

        async fn take(&self, _max: usize) -> Result<Vec<RepairEvent>, QueueError> {
            Ok(vec![])
        }

        async fn ack(&self, _event: &RepairEvent) -> Result<(), QueueError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_enqueue_publishes_mapped_kind() {
        let queue = RecordingQueue::default();
        let key = Bytes::from_static(b"bucket/obj");

        enqueue_repair(&queue, ReplicationMethod::Put, 7, &key).await;
        enqueue_repair(&queue, ReplicationMethod::Delete, 7, &key).await;

        let published = queue.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].kind, RepairKind::Replicate);
        assert_eq!(published[0].addr_id, 7);
        assert_eq!(published[0].key, key);
        assert_eq!(published[1].kind, RepairKind::Delete);
    }

    #[tokio::test]
    async fn test_enqueue_swallows_queue_errors() {
        let queue = RecordingQueue {
            fail_publish: true,
            ..Default::default()
        };
        let key = Bytes::from_static(b"bucket/obj");

        // Must not panic or propagate
        enqueue_repair(&queue, ReplicationMethod::Put, 1, &key).await;
        assert!(queue.published.lock().unwrap().is_empty());
    }
}
