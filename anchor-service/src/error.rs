use blockudp_anchor_tree::Digest;

#[derive(Debug, thiserror::Error)]
/// The Errors that can be raised while batching and anchoring packets
pub enum Error {
    #[error("cannot seal an empty batch")]
    /// A seal was attempted with nothing buffered. This is a caller error.
    EmptyInput,
    #[error("ledger submission failed for root {root}: {error}")]
    /// The ledger rejected or failed to accept a root. The batch stays buffered.
    Submission {
        /// The root that was being anchored
        root: Digest,
        /// The error details returned by the ledger collaborator
        error: anyhow::Error,
    },
    #[error("packet store error: {error}")]
    /// The packet store failed to fetch or mark packets
    Store {
        /// The error details that may include context and other information
        error: anyhow::Error,
    },
    #[error(transparent)]
    /// Building the hash tree for a batch failed
    Tree(#[from] blockudp_anchor_tree::Error),
    #[error("invalid configuration: {reason}")]
    /// Thresholds supplied at startup were not usable
    InvalidConfig {
        /// Why the configuration was rejected
        reason: String,
    },
}

impl Error {
    /// Create a store error
    pub fn new_store(error: impl Into<anyhow::Error>) -> Self {
        Self::Store {
            error: error.into(),
        }
    }
}

/// Result alias for anchoring operations.
pub type Result<T> = std::result::Result<T, Error>;
