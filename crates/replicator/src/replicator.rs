//! Replication facade: fans one write out to its replica set and awaits
//! the coordinator's single reply.
//!
//! The facade:
//! 1. Spawns a fresh coordinator with a private inbox
//! 2. Starts one endpoint per target (local store call, remote cast, or
//!    a synthesized failure for unreachable targets)
//! 3. Blocks on the single-slot reply channel, bounded by the request
//!    deadline

use crate::coordinator::{
    Coordinator, OutcomeSender, ReplicaError, ReplicaOutcome, ReplicateError, ReplicateResult,
};
use crate::repair::RepairQueue;
use crate::store::ObjectStore;
use crate::transport::{ReplicaRequest, ReplicaTransport};
use std::sync::Arc;
use strata_common::{NodeId, Object, ReplicaTarget, ReplicationMethod};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration, Instant};

/// Facade tuning.
#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    /// Total per-request deadline.
    pub req_timeout: Duration,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            req_timeout: Duration::from_millis(5000),
        }
    }
}

/// Entry point for replicated writes.
///
/// Generic over the store, transport and repair queue so tests can drop in
/// mocks — same pattern as the transport seam itself; a deployment wires
/// the real implementations at node startup.
pub struct Replicator<S, T, Q> {
    local_node: NodeId,
    store: Arc<S>,
    transport: Arc<T>,
    repair_queue: Arc<Q>,
    config: ReplicatorConfig,
}

impl<S, T, Q> std::fmt::Debug for Replicator<S, T, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("local_node", &self.local_node)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore, T: ReplicaTransport, Q: RepairQueue> Replicator<S, T, Q> {
    pub fn new(
        local_node: NodeId,
        store: Arc<S>,
        transport: Arc<T>,
        repair_queue: Arc<Q>,
        config: ReplicatorConfig,
    ) -> Self {
        Self {
            local_node,
            store,
            transport,
            repair_queue,
            config,
        }
    }

    /// Replicate one object write (or delete) to `targets`, succeeding once
    /// `quorum` replicas acknowledge.
    ///
    /// Returns exactly one result per call: the winning checksum, the
    /// collected failures once the quorum became unreachable, or a timeout.
    /// Replicas that fail are repaired asynchronously either way.
    pub async fn replicate(
        &self,
        method: ReplicationMethod,
        quorum: usize,
        targets: &[ReplicaTarget],
        object: Arc<Object>,
    ) -> ReplicateResult {
        let m = strata_metrics::metrics();
        m.replications.with_label_values(&[method.as_str()]).inc();
        let _timer = strata_metrics::start_replication_timer(method.as_str());

        if targets.is_empty() {
            // An empty replica set can never ack; fail now instead of
            // parking the caller on an inbox nobody will ever write to.
            return Err(ReplicateError::Quorum(Vec::new()));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = mpsc::channel(targets.len());

        let coordinator = Coordinator::new(
            method,
            object.addr_id,
            object.key.clone(),
            object.req_id,
            targets.len(),
            quorum,
            reply_tx,
            self.repair_queue.clone(),
        );
        let deadline = Instant::now() + self.config.req_timeout;
        tokio::spawn(coordinator.run(outcome_rx, deadline));

        self.fan_out(method, targets, &object, &outcome_tx).await;
        drop(outcome_tx);

        match timeout(self.config.req_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            // A dead coordinator or an elapsed wait both surface as timeout
            Ok(Err(_)) | Err(_) => Err(ReplicateError::Timeout),
        }
    }

    /// Start one endpoint per target. Every target accounts for exactly one
    /// outcome on the inbox: unavailable targets are settled here without
    /// any I/O, the local node writes through its store, and remote nodes
    /// get the request cast at them.
    async fn fan_out(
        &self,
        method: ReplicationMethod,
        targets: &[ReplicaTarget],
        object: &Arc<Object>,
        inbox: &OutcomeSender,
    ) {
        for target in targets {
            if !target.available {
                // Inbox capacity covers all targets, so this cannot block
                let _ = inbox
                    .send(ReplicaOutcome::Fail(
                        target.node.clone(),
                        ReplicaError::NodeDown,
                    ))
                    .await;
            } else if target.node == self.local_node {
                self.spawn_local_endpoint(method, object.clone(), inbox.clone());
            } else {
                self.spawn_remote_endpoint(
                    method,
                    target.node.clone(),
                    object.clone(),
                    inbox.clone(),
                );
            }
        }
    }

    fn spawn_local_endpoint(
        &self,
        method: ReplicationMethod,
        object: Arc<Object>,
        inbox: OutcomeSender,
    ) {
        let store = self.store.clone();
        let node = self.local_node.clone();
        tokio::spawn(async move {
            let write_id = uuid::Uuid::new_v4().to_string();
            let result = match method {
                ReplicationMethod::Put => store.put(&object, &write_id).await,
                ReplicationMethod::Delete => store.delete(&object, &write_id).await,
            };
            let outcome = match result {
                Ok(checksum) => ReplicaOutcome::Ack(checksum),
                Err(e) => {
                    tracing::warn!(
                        "local {} of key '{}' on {} failed (req {}): {}",
                        method,
                        object.key_lossy(),
                        node,
                        object.req_id,
                        e
                    );
                    ReplicaOutcome::Fail(node, ReplicaError::Store(e.to_string()))
                }
            };
            let _ = inbox.send(outcome).await;
        });
    }

    fn spawn_remote_endpoint(
        &self,
        method: ReplicationMethod,
        node: NodeId,
        object: Arc<Object>,
        inbox: OutcomeSender,
    ) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            let request = ReplicaRequest { method, object };
            // The remote node replies straight into the inbox; only a
            // failed handoff is accounted for here
            if let Err(e) = transport.cast(&node, request, inbox.clone()).await {
                let _ = inbox
                    .send(ReplicaOutcome::Fail(
                        node,
                        ReplicaError::Transport(e.to_string()),
                    ))
                    .await;
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
