//! Local object store contract.
//!
//! The store that actually persists bytes lives outside this crate; the
//! replicator only needs its write surface and the content checksum it
//! returns. Same pattern as [`crate::transport::ReplicaTransport`] — a
//! trait here, the concrete store wired in by the embedding node.

use strata_common::{Checksum, Object};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Write surface of the local object store.
///
/// `write_id` is a fresh correlation token per call; it lets a store that
/// interleaves writes match its reply to the request.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Persist `object`, returning its content checksum.
    async fn put(&self, object: &Object, write_id: &str) -> Result<Checksum, StoreError>;

    /// Remove `object`, returning the checksum of the removal record.
    async fn delete(&self, object: &Object, write_id: &str) -> Result<Checksum, StoreError>;
}
