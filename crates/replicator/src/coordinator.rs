//! Per-request replication coordinator.
//!
//! One coordinator task owns the state of a single replication request: it
//! consumes replica outcomes from its inbox, applies the write-quorum rule,
//! replies to the caller exactly once, and keeps draining stragglers after
//! the reply so that every failed replica still gets a repair enqueued.

use crate::repair::{self, RepairQueue};
use bytes::Bytes;
use std::sync::Arc;
use strata_common::{Checksum, NodeId, ReplicationMethod};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, timeout_at, Instant};

/// Sender half of a coordinator inbox. Endpoints and transports post
/// exactly one outcome per replica target through this handle.
pub type OutcomeSender = mpsc::Sender<ReplicaOutcome>;

/// Why a single replica did not acknowledge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplicaError {
    /// The target was marked unreachable by the redundancy map.
    #[error("nodedown")]
    NodeDown,
    /// The replica's store rejected the write.
    #[error("store: {0}")]
    Store(String),
    /// The transport could not hand the write to the replica.
    #[error("transport: {0}")]
    Transport(String),
}

/// A single replica's result.
#[derive(Debug, Clone)]
pub enum ReplicaOutcome {
    /// The replica accepted the write; payload is the store checksum.
    Ack(Checksum),
    /// The replica rejected the write or was unreachable.
    Fail(NodeId, ReplicaError),
}

/// Successful reply: the method echoed back plus the checksum of the ack
/// that completed the quorum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replicated {
    pub method: ReplicationMethod,
    pub checksum: Checksum,
}

/// Caller-facing failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplicateError {
    /// The write quorum can no longer be met. Per-replica failures are
    /// listed most recent first.
    #[error("quorum not reached ({} replica(s) failed)", .0.len())]
    Quorum(Vec<(NodeId, ReplicaError)>),
    /// The request deadline elapsed before a reply.
    #[error("replication timed out")]
    Timeout,
}

pub type ReplicateResult = Result<Replicated, ReplicateError>;

/// State for one in-flight replication request.
///
/// Owned by a single spawned task; nothing here is shared. The reply
/// sender doubles as the reply latch: once taken, no later transition can
/// reach the caller again.
pub(crate) struct Coordinator<Q> {
    method: ReplicationMethod,
    addr_id: u64,
    key: Bytes,
    req_id: u64,
    num_targets: usize,
    /// Replies still awaited.
    remaining: usize,
    /// Acks still required before the quorum is satisfied.
    needed: usize,
    acks: Vec<Checksum>,
    errors: Vec<(NodeId, ReplicaError)>,
    reply: Option<oneshot::Sender<ReplicateResult>>,
    repair_queue: Arc<Q>,
}

impl<Q: RepairQueue> Coordinator<Q> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: ReplicationMethod,
        addr_id: u64,
        key: Bytes,
        req_id: u64,
        num_targets: usize,
        quorum: usize,
        reply: oneshot::Sender<ReplicateResult>,
        repair_queue: Arc<Q>,
    ) -> Self {
        Self {
            method,
            addr_id,
            key,
            req_id,
            num_targets,
            remaining: num_targets,
            needed: quorum,
            acks: Vec::new(),
            errors: Vec::new(),
            reply: Some(reply),
            repair_queue,
        }
    }

    /// Drive the request to completion.
    ///
    /// Consumes outcomes until all targets have reported or the deadline
    /// fires; after a timeout reply, stragglers are still drained so their
    /// repairs are enqueued.
    pub(crate) async fn run(mut self, mut inbox: mpsc::Receiver<ReplicaOutcome>, deadline: Instant) {
        while self.remaining > 0 {
            match timeout_at(deadline, inbox.recv()).await {
                Ok(Some(outcome)) => self.on_outcome(outcome).await,
                Ok(None) => {
                    // Every endpoint is gone with outcomes missing; nothing
                    // more can arrive. Hold the caller to the full deadline
                    // before the timeout verdict.
                    if self.reply.is_some() {
                        sleep_until(deadline).await;
                        self.send_reply(Err(ReplicateError::Timeout));
                    }
                    self.log_settled();
                    return;
                }
                Err(_) => {
                    self.send_reply(Err(ReplicateError::Timeout));
                    self.drain(&mut inbox).await;
                    self.log_settled();
                    return;
                }
            }
        }
        if self.reply.is_some() {
            self.finish();
        }
        self.log_settled();
    }

    /// Consume late outcomes with the reply already sent. Failures among
    /// them still enqueue repairs.
    async fn drain(&mut self, inbox: &mut mpsc::Receiver<ReplicaOutcome>) {
        while self.remaining > 0 {
            match inbox.recv().await {
                Some(outcome) => self.on_outcome(outcome).await,
                None => break,
            }
        }
    }

    async fn on_outcome(&mut self, outcome: ReplicaOutcome) {
        self.remaining = self.remaining.saturating_sub(1);
        match outcome {
            ReplicaOutcome::Ack(checksum) => {
                strata_metrics::metrics().replica_acks.inc();
                self.needed = self.needed.saturating_sub(1);
                self.acks.push(checksum.clone());
                if self.needed == 0 {
                    self.send_reply(Ok(Replicated {
                        method: self.method,
                        checksum,
                    }));
                }
            }
            ReplicaOutcome::Fail(node, cause) => {
                strata_metrics::metrics().replica_failures.inc();
                if self.reply.is_none() {
                    tracing::debug!(
                        "late failure from {} for key '{}' (req {}): {}",
                        node,
                        String::from_utf8_lossy(&self.key),
                        self.req_id,
                        cause
                    );
                }
                repair::enqueue_repair(
                    self.repair_queue.as_ref(),
                    self.method,
                    self.addr_id,
                    &self.key,
                )
                .await;
                self.errors.push((node, cause));
                // The acks still outstanding can no longer cover the quorum
                if self.needed > self.remaining {
                    self.send_reply(Err(ReplicateError::Quorum(self.errors_most_recent_first())));
                }
            }
        }
    }

    /// All outcomes are in and no transition fired. Reachable only for
    /// degenerate quorums; settle with whatever arrived.
    fn finish(&mut self) {
        let result = match self.acks.last() {
            Some(checksum) => Ok(Replicated {
                method: self.method,
                checksum: checksum.clone(),
            }),
            None => Err(ReplicateError::Quorum(self.errors_most_recent_first())),
        };
        self.send_reply(result);
    }

    /// Send the single caller reply. Later calls are no-ops: this latch is
    /// the invariant everything else leans on.
    fn send_reply(&mut self, result: ReplicateResult) {
        let Some(tx) = self.reply.take() else {
            return;
        };
        let m = strata_metrics::metrics();
        match &result {
            Ok(_) => m.replications_ok.inc(),
            Err(ReplicateError::Quorum(_)) => m.quorum_failures.inc(),
            Err(ReplicateError::Timeout) => m.timeouts.inc(),
        }
        // The facade bounds its own wait; a dropped receiver is fine.
        let _ = tx.send(result);
    }

    fn errors_most_recent_first(&self) -> Vec<(NodeId, ReplicaError)> {
        self.errors.iter().rev().cloned().collect()
    }

    fn log_settled(&self) {
        tracing::debug!(
            "replication req {} settled: {} ack(s), {} error(s) across {} target(s)",
            self.req_id,
            self.acks.len(),
            self.errors.len(),
            self.num_targets
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repair::{QueueError, RepairEvent, RepairKind};
    use std::sync::Mutex;
    use tokio::time::Duration;

    #[derive(Default)]
    struct RecordingQueue {
        published: Mutex<Vec<RepairEvent>>,
    }

    impl RecordingQueue {
        fn events(&self) -> Vec<RepairEvent> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl RepairQueue for RecordingQueue {
        async fn publish(&self, event: RepairEvent) -> Result<(), QueueError> {
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

    fn ack(name: &str) -> ReplicaOutcome {
        ReplicaOutcome::Ack(Checksum::of(name.as_bytes()))
    }

    fn fail(node: &str, cause: &str) -> ReplicaOutcome {
        ReplicaOutcome::Fail(NodeId::new(node), ReplicaError::Store(cause.into()))
    }

    /// Spawn a coordinator over `num_targets`/`quorum`, returning the inbox
    /// sender, the reply receiver and the recording queue.
    fn spawn_coordinator(
        method: ReplicationMethod,
        num_targets: usize,
        quorum: usize,
        timeout: Duration,
    ) -> (
        OutcomeSender,
        oneshot::Receiver<ReplicateResult>,
        Arc<RecordingQueue>,
    ) {
        let queue = Arc::new(RecordingQueue::default());
        let (reply_tx, reply_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = mpsc::channel(num_targets.max(1));
        let coordinator = Coordinator::new(
            method,
            42,
            Bytes::from_static(b"bucket/obj"),
            7,
            num_targets,
            quorum,
            reply_tx,
            queue.clone(),
        );
        tokio::spawn(coordinator.run(outcome_rx, Instant::now() + timeout));
        (outcome_tx, reply_rx, queue)
    }

    #[tokio::test]
    async fn test_quorum_success_on_second_ack() {
        let (tx, rx, queue) =
            spawn_coordinator(ReplicationMethod::Put, 3, 2, Duration::from_secs(5));

        tx.send(ack("a")).await.unwrap();
        tx.send(ack("b")).await.unwrap();
        tx.send(ack("c")).await.unwrap();
        drop(tx);

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.method, ReplicationMethod::Put);
        // The winning checksum is the ack that completed the quorum
        assert_eq!(result.checksum, Checksum::of(b"b"));
        assert!(queue.events().is_empty());
    }

    #[tokio::test]
    async fn test_one_failure_still_succeeds() {
        let (tx, rx, queue) =
            spawn_coordinator(ReplicationMethod::Put, 3, 2, Duration::from_secs(5));

        tx.send(ack("a")).await.unwrap();
        tx.send(fail("b", "io_error")).await.unwrap();
        tx.send(ack("c")).await.unwrap();
        drop(tx);

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.checksum, Checksum::of(b"c"));

        // Give the drained straggler path a moment, then check repair
        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = queue.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RepairKind::Replicate);
        assert_eq!(events[0].addr_id, 42);
    }

    #[tokio::test]
    async fn test_quorum_failure_lists_most_recent_first() {
        let (tx, rx, queue) =
            spawn_coordinator(ReplicationMethod::Put, 3, 2, Duration::from_secs(5));

        tx.send(ReplicaOutcome::Fail(NodeId::new("b"), ReplicaError::NodeDown))
            .await
            .unwrap();
        tx.send(ack("a")).await.unwrap();
        tx.send(fail("c", "disk_full")).await.unwrap();
        drop(tx);

        let err = rx.await.unwrap().unwrap_err();
        match err {
            ReplicateError::Quorum(errors) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].0, NodeId::new("c"));
                assert_eq!(errors[0].1, ReplicaError::Store("disk_full".into()));
                assert_eq!(errors[1].0, NodeId::new("b"));
                assert_eq!(errors[1].1, ReplicaError::NodeDown);
            }
            other => panic!("expected quorum failure, got {:?}", other),
        }
        assert_eq!(queue.events().len(), 2);
    }

    #[tokio::test]
    async fn test_all_down_quorum_one() {
        let (tx, rx, queue) =
            spawn_coordinator(ReplicationMethod::Put, 3, 1, Duration::from_secs(5));

        for node in ["a", "b", "c"] {
            tx.send(ReplicaOutcome::Fail(NodeId::new(node), ReplicaError::NodeDown))
                .await
                .unwrap();
        }
        drop(tx);

        let err = rx.await.unwrap().unwrap_err();
        match err {
            ReplicateError::Quorum(errors) => {
                let nodes: Vec<_> = errors.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(nodes, vec!["c", "b", "a"]);
                assert!(errors.iter().all(|(_, e)| *e == ReplicaError::NodeDown));
            }
            other => panic!("expected quorum failure, got {:?}", other),
        }
        assert_eq!(queue.events().len(), 3);
    }

    #[tokio::test]
    async fn test_timeout_when_quorum_never_met() {
        let (tx, rx, _queue) =
            spawn_coordinator(ReplicationMethod::Put, 3, 2, Duration::from_millis(50));

        tx.send(ack("a")).await.unwrap();
        // Keep the sender alive so the inbox stays open past the deadline
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err, ReplicateError::Timeout);
        drop(tx);
    }

    #[tokio::test]
    async fn test_late_failure_after_timeout_still_enqueues_repair() {
        let (tx, rx, queue) =
            spawn_coordinator(ReplicationMethod::Put, 3, 2, Duration::from_millis(50));

        tx.send(ack("a")).await.unwrap();
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err, ReplicateError::Timeout);

        // Outcomes landing after the reply are absorbed, not answered
        tx.send(fail("b", "io_error")).await.unwrap();
        tx.send(fail("c", "io_error")).await.unwrap();
        drop(tx);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.events().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_failures_enqueue_delete_kind() {
        let (tx, rx, queue) =
            spawn_coordinator(ReplicationMethod::Delete, 2, 1, Duration::from_secs(5));

        tx.send(fail("b", "io_error")).await.unwrap();
        tx.send(ack("a")).await.unwrap();
        drop(tx);

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.method, ReplicationMethod::Delete);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = queue.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RepairKind::Delete);
    }

    #[tokio::test]
    async fn test_zero_quorum_succeeds_on_first_ack() {
        let (tx, rx, queue) =
            spawn_coordinator(ReplicationMethod::Put, 2, 0, Duration::from_secs(5));

        // A failure first must not produce a phantom success
        tx.send(fail("b", "io_error")).await.unwrap();
        tx.send(ack("a")).await.unwrap();
        drop(tx);

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.checksum, Checksum::of(b"a"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.events().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_quorum_all_failed_is_failure() {
        let (tx, rx, _queue) =
            spawn_coordinator(ReplicationMethod::Put, 2, 0, Duration::from_secs(5));

        tx.send(fail("a", "io_error")).await.unwrap();
        tx.send(fail("b", "io_error")).await.unwrap();
        drop(tx);

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, ReplicateError::Quorum(ref errors) if errors.len() == 2));
    }

    #[tokio::test]
    async fn test_quorum_larger_than_targets_fails_on_first_failure() {
        let (tx, rx, _queue) =
            spawn_coordinator(ReplicationMethod::Put, 3, 4, Duration::from_secs(5));

        tx.send(fail("a", "io_error")).await.unwrap();

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, ReplicateError::Quorum(ref errors) if errors.len() == 1));
        drop(tx);
    }

    #[tokio::test]
    async fn test_closed_inbox_holds_timeout_until_deadline() {
        let started = Instant::now();
        let (tx, rx, _queue) =
            spawn_coordinator(ReplicationMethod::Put, 3, 2, Duration::from_millis(80));

        tx.send(ack("a")).await.unwrap();
        drop(tx); // remaining endpoints vanish without posting

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err, ReplicateError::Timeout);
        assert!(
            started.elapsed() >= Duration::from_millis(80),
            "timeout must not fire before the deadline"
        );
    }
}
