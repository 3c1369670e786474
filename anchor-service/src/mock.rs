use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Mutex,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;

use blockudp_anchor_tree::Digest;

use crate::{AnchorRecord, Packet, Store, TransactionId, TransactionManager};

/// MockLedger stands in for a real ledger: it accepts every root and returns a `mock-` transaction id.
#[derive(Debug, Default)]
pub struct MockLedger {
    submitted: Mutex<Vec<Digest>>,
    failures: AtomicUsize,
    sequence: AtomicU64,
}

impl MockLedger {
    /// Reject the next `count` submissions.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Every root accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<Digest> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionManager for MockLedger {
    async fn submit_root(&self, root: Digest) -> Result<TransactionId> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(anyhow!("mock ledger rejected root {}", root));
        }
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(root);
        Ok(TransactionId::new(format!("mock-{:x}-{}", millis, sequence)))
    }
}

#[derive(Debug, Default)]
struct StoreState {
    packets: Vec<(Packet, bool)>,
    anchors: Vec<(AnchorRecord, Vec<String>)>,
}

/// InMemoryStore keeps packets in insertion order and remembers which ones were anchored.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    /// Add a new unanchored packet.
    pub fn insert(&self, id: impl Into<String>, data: impl Into<Bytes>) {
        self.state
            .lock()
            .unwrap()
            .packets
            .push((Packet::new(id, data), false));
    }

    /// Ids of the packets that were marked anchored.
    pub fn anchored_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .packets
            .iter()
            .filter(|(_, anchored)| *anchored)
            .map(|(packet, _)| packet.id.clone())
            .collect()
    }

    /// Anchor records persisted through [`Store::record_anchor`].
    pub fn anchors(&self) -> Vec<(AnchorRecord, Vec<String>)> {
        self.state.lock().unwrap().anchors.clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn fetch_unanchored(&self) -> Result<Vec<Packet>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .packets
            .iter()
            .filter(|(_, anchored)| !anchored)
            .map(|(packet, _)| packet.clone())
            .collect())
    }

    async fn mark_anchored(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let (_, anchored) = state
            .packets
            .iter_mut()
            .find(|(packet, _)| packet.id == id)
            .ok_or_else(|| anyhow!("unknown packet {}", id))?;
        *anchored = true;
        Ok(())
    }

    async fn record_anchor(&self, record: &AnchorRecord, packet_ids: &[String]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .anchors
            .push((record.clone(), packet_ids.to_vec()));
        Ok(())
    }
}
