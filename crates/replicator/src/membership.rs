//! Redundancy-map contract.
//!
//! The map that assembles replica sets and tracks reachability lives in
//! the cluster-membership layer. Replication callers hand the replicator
//! an already-resolved target list; the repair worker is the only part of
//! this crate that queries the map, to check whether this node still has
//! charge of a key before reconciling it.

use strata_common::NodeId;

/// Placement oracle backed by the cluster's redundancy map.
#[async_trait::async_trait]
pub trait RedundancyMap: Send + Sync + 'static {
    /// Whether `node` is currently one of the replica owners of `key`.
    async fn has_charge_of_node(&self, node: &NodeId, key: &[u8]) -> bool;
}
