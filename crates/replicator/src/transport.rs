//! Remote replica cast contract.
//!
//! A replica write to another node is a cast: the request carries the
//! coordinator's inbox handle, and the remote node posts its outcome
//! straight back onto that inbox once its local store has run the write.
//! The concrete transport lives outside this crate.

use crate::coordinator::OutcomeSender;
use std::sync::Arc;
use strata_common::{NodeId, Object, ReplicationMethod};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("cast failed: {0}")]
    Cast(String),
}

/// One replica write on the wire.
#[derive(Debug, Clone)]
pub struct ReplicaRequest {
    pub method: ReplicationMethod,
    pub object: Arc<Object>,
}

/// Transport for replica casts.
#[async_trait::async_trait]
pub trait ReplicaTransport: Send + Sync + 'static {
    /// Hand one replica write to `target`.
    ///
    /// Returns once the request has been handed off — it does not wait for
    /// the remote write. The remote side posts exactly one outcome to
    /// `inbox`. An `Err` means the handoff itself failed and no outcome
    /// will ever arrive; the caller accounts for the replica instead.
    async fn cast(
        &self,
        target: &NodeId,
        request: ReplicaRequest,
        inbox: OutcomeSender,
    ) -> Result<(), TransportError>;
}
