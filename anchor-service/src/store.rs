use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::AnchorRecord;

/// A packet waiting to be anchored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Store specific identifier of the packet
    pub id: String,
    /// Opaque packet content
    pub data: Bytes,
}

impl Packet {
    /// Create a packet from an identifier and its content.
    pub fn new(id: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }
}

/// Durable packet storage the scheduler drains.
#[async_trait]
pub trait Store: Send + Sync {
    /// All packets not yet marked anchored, oldest first.
    async fn fetch_unanchored(&self) -> Result<Vec<Packet>>;

    /// Mark a packet as handed to the anchoring pipeline. Marking the same packet twice is not an error.
    async fn mark_anchored(&self, id: &str) -> Result<()>;

    /// Persist the record of an anchored batch along with the ids of its packets in leaf order.
    async fn record_anchor(&self, _record: &AnchorRecord, _packet_ids: &[String]) -> Result<()> {
        Ok(())
    }
}
