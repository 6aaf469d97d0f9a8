//! Object replication for a strata storage node.
//!
//! A write (or delete) of one object is pushed to its replica set in
//! parallel and declared successful once W replicas acknowledge, within a
//! per-request deadline. Replicas that never acknowledge are reconciled
//! later through a durable repair queue.
//!
//! Provides: the [`Replicator`] facade for replicated writes, the
//! per-request coordinator behind it, contracts for the local store,
//! remote transport, repair queue and redundancy map (implemented by the
//! embedding node), and the background repair consumer in [`worker`].

pub mod coordinator;
pub mod membership;
pub mod repair;
pub mod replicator;
pub mod store;
pub mod transport;
pub mod worker;

pub use coordinator::{
    OutcomeSender, ReplicaError, ReplicaOutcome, Replicated, ReplicateError, ReplicateResult,
};
pub use replicator::{Replicator, ReplicatorConfig};
