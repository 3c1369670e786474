use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, warn};

use blockudp_anchor_tree::HashTree;
use blockudp_metrics::{NoopRecorder, Recorder};

use crate::{
    AnchorConfig, AnchorEvent, AnchorRecord, Error, Result, TransactionManager,
};

struct BatchState {
    buffer: Vec<Bytes>,
    last_anchor: Instant,
}

/// Buffers packets and seals them into an anchored hash tree when a size or time threshold is met.
///
/// The threshold check, the tree construction and the ledger submission happen under one lock, so
/// concurrent producers can never seal the same packets twice or lose a packet across a seal.
pub struct BatchAnchorManager {
    config: AnchorConfig,
    tx_manager: Arc<dyn TransactionManager>,
    recorder: Arc<dyn Recorder<AnchorEvent> + Send + Sync>,
    state: Mutex<BatchState>,
}

impl BatchAnchorManager {
    /// Create an empty manager. The anchor interval starts counting now.
    pub fn new(config: AnchorConfig, tx_manager: Arc<dyn TransactionManager>) -> Self {
        Self {
            config,
            tx_manager,
            recorder: Arc::new(NoopRecorder),
            state: Mutex::new(BatchState {
                buffer: Vec::new(),
                last_anchor: Instant::now(),
            }),
        }
    }

    /// Report buffering and anchoring events to `recorder`.
    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder<AnchorEvent> + Send + Sync>) -> Self {
        self.recorder = recorder;
        self
    }

    /// The thresholds this manager was built with.
    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    /// Number of packets waiting to be sealed.
    pub async fn buffered(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    /// Append a packet, sealing the buffer if it reached the batch size.
    pub async fn add_packet(&self, data: impl Into<Bytes>) -> Result<Option<AnchorRecord>> {
        let mut state = self.state.lock().await;
        state.buffer.push(data.into());
        self.recorder.record(&AnchorEvent::PacketBuffered);
        if state.buffer.len() >= self.config.batch_size.get() {
            debug!(buffered = state.buffer.len(), "batch size reached");
            return self.seal(&mut state).await.map(Some);
        }
        Ok(None)
    }

    /// Seal the buffer if it is non-empty and the anchor interval has passed since the last anchor.
    pub async fn tick(&self) -> Result<Option<AnchorRecord>> {
        let mut state = self.state.lock().await;
        if state.buffer.is_empty() || state.last_anchor.elapsed() < self.config.anchor_interval {
            return Ok(None);
        }
        debug!(buffered = state.buffer.len(), "anchor interval elapsed");
        self.seal(&mut state).await.map(Some)
    }

    /// Seal whatever is buffered right now. Fails with [`Error::EmptyInput`] when nothing is buffered.
    pub async fn seal_and_anchor(&self) -> Result<AnchorRecord> {
        let mut state = self.state.lock().await;
        self.seal(&mut state).await
    }

    async fn seal(&self, state: &mut BatchState) -> Result<AnchorRecord> {
        if state.buffer.is_empty() {
            return Err(Error::EmptyInput);
        }
        // The tree is built from a snapshot and dropped once the root is read.
        let (root, leaf_count) = {
            let tree = HashTree::new(state.buffer.clone())?;
            (tree.root(), tree.leaf_count())
        };

        // Only clear the buffer once the ledger has the root, otherwise these packets could never be
        // proven against an anchored root.
        let txid = match self.tx_manager.submit_root(root).await {
            Ok(txid) => txid,
            Err(error) => {
                self.recorder.record(&AnchorEvent::SubmissionFailed);
                warn!(%root, leaf_count, %error, "ledger submission failed, keeping batch buffered");
                return Err(Error::Submission { root, error });
            }
        };

        state.buffer.clear();
        state.last_anchor = Instant::now();
        self.recorder
            .record(&AnchorEvent::BatchAnchored { leaf_count });
        info!(%root, %txid, leaf_count, "anchored batch");

        Ok(AnchorRecord {
            root,
            txid,
            leaf_count,
            anchored_at: Utc::now(),
        })
    }
}
