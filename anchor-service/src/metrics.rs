use blockudp_metrics::Recorder;
use prometheus_client::{metrics::counter::Counter, registry::Registry};

/// Something the anchoring pipeline did that is worth counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnchorEvent {
    /// A packet was appended to the buffer.
    PacketBuffered,
    /// A batch of `leaf_count` packets was anchored.
    BatchAnchored {
        /// Packets in the batch
        leaf_count: usize,
    },
    /// The ledger failed to accept a root.
    SubmissionFailed,
}

/// Prometheus counters for the anchoring pipeline.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    packets_buffered: Counter,
    packets_anchored: Counter,
    batches_anchored: Counter,
    submission_failures: Counter,
}

impl Metrics {
    /// Create the counters and register them with `registry`.
    pub fn register(registry: &mut Registry) -> Self {
        let sub_registry = registry.sub_registry_with_prefix("blockudp_anchor");
        let metrics = Self::default();

        sub_registry.register(
            "packets_buffered",
            "Number of packets accepted into the anchor buffer",
            metrics.packets_buffered.clone(),
        );
        sub_registry.register(
            "packets_anchored",
            "Number of packets included in an anchored batch",
            metrics.packets_anchored.clone(),
        );
        sub_registry.register(
            "batches_anchored",
            "Number of batch roots accepted by the ledger",
            metrics.batches_anchored.clone(),
        );
        sub_registry.register(
            "submission_failures",
            "Number of failed ledger submissions",
            metrics.submission_failures.clone(),
        );

        metrics
    }
}

impl Recorder<AnchorEvent> for Metrics {
    fn record(&self, event: &AnchorEvent) {
        match event {
            AnchorEvent::PacketBuffered => {
                self.packets_buffered.inc();
            }
            AnchorEvent::BatchAnchored { leaf_count } => {
                self.batches_anchored.inc();
                self.packets_anchored.inc_by(*leaf_count as u64);
            }
            AnchorEvent::SubmissionFailed => {
                self.submission_failures.inc();
            }
        }
    }
}
