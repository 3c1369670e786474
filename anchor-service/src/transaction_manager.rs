use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use blockudp_anchor_tree::Digest;

/// Identifier the ledger returns for an accepted anchor transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wrap a ledger transaction identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as the ledger reported it.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// The outcome of sealing one batch: its root and where the ledger recorded it.
///
/// Not retained by the manager; callers persist it if they need it later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRecord {
    /// Root digest of the sealed batch
    pub root: Digest,
    /// Ledger transaction that carries the root
    pub txid: TransactionId,
    /// Number of packets in the batch
    pub leaf_count: usize,
    /// When the ledger accepted the root
    pub anchored_at: DateTime<Utc>,
}

/// Interface for the ledger collaborator that accepts a root and returns a transaction identifier.
///
/// Submission may block for as long as the ledger takes; there is no timeout or retry on this side.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Submit a batch root to the ledger.
    async fn submit_root(&self, root: Digest) -> Result<TransactionId>;
}
