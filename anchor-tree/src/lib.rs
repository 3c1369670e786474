//! This crate contains the hash tree used to commit a batch of packets to a single root digest, together
//! with the inclusion proofs that let any holder of a packet show it was part of an anchored batch.
#![warn(missing_docs)]
mod digest;
mod error;
mod merkle_tree;
mod proof;
mod verify;

pub use digest::{hash, hash_pair, Digest, DIGEST_LEN};
pub use error::{Error, Result};
pub use merkle_tree::HashTree;
pub use proof::{Proof, ProofStep};
pub use verify::verify_inclusion;
