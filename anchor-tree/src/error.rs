/// Errors raised while building or querying a [`crate::HashTree`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// A tree was requested over zero leaves.
    #[error("cannot build a hash tree with no leaves")]
    EmptyInput,
    /// A proof was requested for a leaf that does not exist.
    #[error("leaf index {index} out of range for tree with {leaf_count} leaves")]
    IndexOutOfRange {
        /// The requested leaf index
        index: usize,
        /// The number of leaves in the tree
        leaf_count: usize,
    },
    /// A digest could not be parsed from its hex form.
    #[error("invalid digest: {reason}")]
    InvalidDigest {
        /// Why the input was rejected
        reason: String,
    },
}

/// Result alias for hash tree operations.
pub type Result<T> = std::result::Result<T, Error>;
