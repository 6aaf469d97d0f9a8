//! strata-common: shared types for the strata storage node.
//!
//! Provides node identity, the replicated [`Object`], content checksums,
//! and the per-request replication method and target types used across
//! the replication subsystem.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Identity of a storage node, e.g. `"storage_0@10.0.1.21"`.
///
/// Opaque to the replicator: it is compared for equality to tell the local
/// node from remote ones, and echoed in failure reports and logs.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for NodeId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Checksum
// ---------------------------------------------------------------------------

/// Opaque content checksum returned by an object store.
///
/// The replicator never inspects a checksum; it only carries the one that
/// completed the write quorum back to the caller.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(Bytes);

impl Checksum {
    /// Wrap store-provided checksum bytes.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// SHA-1 of the given content.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha1::digest(data);
        Self(Bytes::copy_from_slice(&digest))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 4 bytes are enough to tell checksums apart in logs
        for byte in self.0.iter().take(4) {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "…")
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

// ---------------------------------------------------------------------------
// Replication method
// ---------------------------------------------------------------------------

/// Which store operation a replication request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationMethod {
    Put,
    Delete,
}

impl ReplicationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "put",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ReplicationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// The unit of replication: one object plus the identity the coordinator
/// and repair queue key it by. Immutable for the lifetime of a request.
#[derive(Debug, Clone)]
pub struct Object {
    /// Placement-group identifier; doubles as the repair-queue routing key.
    pub addr_id: u64,
    /// Object key.
    pub key: Bytes,
    /// Caller-supplied request identifier, echoed in logs and replica RPCs.
    pub req_id: u64,
    /// Object payload. Empty for deletes.
    pub data: Bytes,
}

impl Object {
    /// Key rendered for log lines; object keys are usually UTF-8 paths.
    pub fn key_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
}

// ---------------------------------------------------------------------------
// Replica target
// ---------------------------------------------------------------------------

/// One entry of the ordered replica set handed to the replicator.
///
/// Reachability is whatever the redundancy map reported at selection time;
/// an unavailable target is accounted as failed without any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaTarget {
    pub node: NodeId,
    pub available: bool,
}

impl ReplicaTarget {
    pub fn available(node: impl Into<NodeId>) -> Self {
        Self {
            node: node.into(),
            available: true,
        }
    }

    pub fn unavailable(node: impl Into<NodeId>) -> Self {
        Self {
            node: node.into(),
            available: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
