//! This crate holds the machinery that turns a stream of packets into anchored batches: a buffer that
//! seals itself into a hash tree on a size or time threshold, the ledger and store seams it talks to,
//! and the background scheduler that feeds it.
#![warn(missing_docs)]
mod anchor_batch;
mod config;
mod error;
mod metrics;
mod mock;
mod service;
mod store;
mod transaction_manager;

pub use anchor_batch::BatchAnchorManager;
pub use blockudp_anchor_tree::{verify_inclusion, Digest, HashTree, Proof, ProofStep};
pub use config::AnchorConfig;
pub use error::{Error, Result};
pub use metrics::{AnchorEvent, Metrics};
pub use mock::{InMemoryStore, MockLedger};
pub use service::{AnchorScheduler, SchedulerHandle};
pub use store::{Packet, Store};
pub use transaction_manager::{AnchorRecord, TransactionId, TransactionManager};
