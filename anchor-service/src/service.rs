use std::{collections::HashSet, future::Future, pin::pin, sync::Arc, time::Duration};

use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{AnchorRecord, BatchAnchorManager, Error, Packet, Result, Store};

/// Background loop that moves unanchored packets from the store into the [`BatchAnchorManager`].
///
/// The scheduler must be the only producer feeding its manager: it tracks which packet ids make up
/// the current buffer so that each anchored batch can be recorded against its packets.
pub struct AnchorScheduler {
    store: Arc<dyn Store>,
    manager: Arc<BatchAnchorManager>,
    poll_interval: Duration,
    pending: Vec<String>,
    // Accepted into the manager but not yet marked in the store.
    unmarked: HashSet<String>,
}

impl AnchorScheduler {
    /// Create a scheduler that polls `store` every `poll_interval`.
    pub fn new(
        store: Arc<dyn Store>,
        manager: Arc<BatchAnchorManager>,
        poll_interval: Duration,
    ) -> Self {
        if poll_interval > manager.config().anchor_interval {
            warn!(
                ?poll_interval,
                anchor_interval = ?manager.config().anchor_interval,
                "poll interval is longer than the anchor interval, batches will be sealed late"
            );
        }
        Self {
            store,
            manager,
            poll_interval,
            pending: Vec::new(),
            unmarked: HashSet::new(),
        }
    }

    /// Spawn the loop onto the tokio runtime.
    ///
    /// Only [`SchedulerHandle::stop`] ends the loop; dropping the handle detaches it.
    pub fn start(mut self) -> SchedulerHandle {
        let (shutdown, mut shutdown_signal) = broadcast::channel::<()>(1);
        let task = tokio::spawn(async move {
            self.run(async move {
                if let Err(RecvError::Closed) = shutdown_signal.recv().await {
                    std::future::pending::<()>().await;
                }
            })
            .await
        });
        SchedulerHandle { shutdown, task }
    }

    /// Run until `shutdown_signal` resolves.
    ///
    /// The signal is only observed between cycles, so a cycle that has started always completes.
    /// Packets still buffered when the loop exits are sealed once more, since the store already
    /// considers them handed off.
    ///
    /// Panics if the poll interval is zero.
    pub async fn run(&mut self, shutdown_signal: impl Future<Output = ()>) {
        let mut shutdown_signal = pin!(shutdown_signal);
        let mut interval = interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(poll_interval = ?self.poll_interval, "anchor scheduler started");
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_signal => break,
                _ = interval.tick() => {}
            }
            if let Err(err) = self.run_cycle().await {
                error!(%err, "anchor cycle failed");
            }
        }
        if !self.pending.is_empty() {
            info!(pending = self.pending.len(), "sealing buffered packets before stopping");
            let sealed = self.manager.seal_and_anchor().await.map(Some);
            self.handle_seal(sealed).await;
        }
        info!(pending = self.pending.len(), "anchor scheduler stopped");
    }

    /// Drain the store into the manager, then give the time threshold a chance to fire.
    pub async fn run_cycle(&mut self) -> Result<()> {
        let packets = self
            .store
            .fetch_unanchored()
            .await
            .map_err(Error::new_store)?;
        if !packets.is_empty() {
            debug!(count = packets.len(), "fetched unanchored packets");
        }
        // Ids the store no longer reports were marked by some earlier attempt.
        self.unmarked.retain(|id| packets.iter().any(|packet| &packet.id == id));
        for Packet { id, data } in packets {
            if self.unmarked.contains(&id) {
                debug!(%id, "retrying mark of an already buffered packet");
                self.mark(id).await?;
                continue;
            }
            let added = self.manager.add_packet(data).await;
            self.pending.push(id.clone());
            self.unmarked.insert(id.clone());
            self.handle_seal(added).await;
            // The packet is in the buffer whether or not a seal just failed.
            self.mark(id).await?;
        }
        let ticked = self.manager.tick().await;
        self.handle_seal(ticked).await;
        Ok(())
    }

    async fn mark(&mut self, id: String) -> Result<()> {
        self.store
            .mark_anchored(&id)
            .await
            .map_err(Error::new_store)?;
        self.unmarked.remove(&id);
        Ok(())
    }

    async fn handle_seal(&mut self, result: Result<Option<AnchorRecord>>) {
        match result {
            Ok(Some(record)) => {
                let packet_ids = std::mem::take(&mut self.pending);
                info!(
                    root = %record.root,
                    txid = %record.txid,
                    leaf_count = record.leaf_count,
                    "batch anchored"
                );
                if let Err(err) = self.store.record_anchor(&record, &packet_ids).await {
                    error!(%err, txid = %record.txid, "failed to persist anchor record");
                }
            }
            Ok(None) => {}
            Err(err) => {
                error!(%err, buffered = self.pending.len(), "failed to anchor batch, packets remain buffered");
            }
        }
    }
}

/// Handle to a running [`AnchorScheduler`].
///
/// Dropping the handle leaves the scheduler running until the runtime shuts down.
pub struct SchedulerHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask the scheduler to stop and wait for its current cycle to finish.
    pub async fn stop(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(());
        self.task.await?;
        Ok(())
    }

    /// True once the scheduler task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use test_log::test;

    use crate::{AnchorConfig, InMemoryStore, MockLedger};
    use blockudp_anchor_tree::{verify_inclusion, HashTree};

    fn scheduler(
        batch_size: usize,
        store: Arc<InMemoryStore>,
    ) -> (Arc<MockLedger>, Arc<BatchAnchorManager>, AnchorScheduler) {
        let ledger = Arc::new(MockLedger::default());
        let manager = Arc::new(BatchAnchorManager::new(
            AnchorConfig::new(batch_size, Duration::from_secs(60)).unwrap(),
            ledger.clone(),
        ));
        let scheduler = AnchorScheduler::new(store, manager.clone(), Duration::from_secs(5));
        (ledger, manager, scheduler)
    }

    #[test(tokio::test(start_paused = true))]
    async fn cycle_feeds_marks_and_records() {
        let store = Arc::new(InMemoryStore::default());
        for n in 0..5 {
            store.insert(format!("p{n}"), format!("packet {n}").into_bytes());
        }
        let (ledger, manager, mut scheduler) = scheduler(2, store.clone());

        scheduler.run_cycle().await.unwrap();

        assert_eq!(
            vec!["p0", "p1", "p2", "p3", "p4"],
            store.anchored_ids()
        );
        assert_eq!(1, manager.buffered().await);
        assert_eq!(2, ledger.submitted().len());

        let anchors = store.anchors();
        assert_eq!(2, anchors.len());
        assert_eq!(vec!["p0".to_owned(), "p1".to_owned()], anchors[0].1);
        assert_eq!(vec!["p2".to_owned(), "p3".to_owned()], anchors[1].1);

        // the recorded ids are enough to rebuild the batch and prove membership
        let tree = HashTree::new(["packet 2", "packet 3"]).unwrap();
        assert_eq!(anchors[1].0.root, tree.root());
        let proof = tree.proof_for(1).unwrap();
        assert!(verify_inclusion("packet 3", &proof, &anchors[1].0.root));

        // nothing left to fetch
        scheduler.run_cycle().await.unwrap();
        assert_eq!(2, ledger.submitted().len());
    }

    #[test(tokio::test(start_paused = true))]
    async fn cycle_ticks_after_interval() {
        let store = Arc::new(InMemoryStore::default());
        store.insert("only", &b"lonely packet"[..]);
        let (ledger, manager, mut scheduler) = scheduler(100, store.clone());

        scheduler.run_cycle().await.unwrap();
        assert_eq!(1, manager.buffered().await);
        assert!(ledger.submitted().is_empty());

        tokio::time::advance(Duration::from_secs(60)).await;
        scheduler.run_cycle().await.unwrap();
        assert_eq!(0, manager.buffered().await);
        assert_eq!(
            vec![HashTree::new([b"lonely packet"]).unwrap().root()],
            ledger.submitted()
        );
        assert_eq!(vec!["only".to_owned()], store.anchors()[0].1);
    }

    #[test(tokio::test(start_paused = true))]
    async fn submission_failure_is_not_fatal() {
        let store = Arc::new(InMemoryStore::default());
        store.insert("a", &b"a"[..]);
        store.insert("b", &b"b"[..]);
        let (ledger, manager, mut scheduler) = scheduler(2, store.clone());
        ledger.fail_next(1);

        scheduler.run_cycle().await.unwrap();
        // accepted into the buffer, so marked even though the seal failed
        assert_eq!(vec!["a", "b"], store.anchored_ids());
        assert_eq!(2, manager.buffered().await);
        assert!(store.anchors().is_empty());

        store.insert("c", &b"c"[..]);
        scheduler.run_cycle().await.unwrap();
        let anchors = store.anchors();
        assert_eq!(1, anchors.len());
        assert_eq!(3, anchors[0].0.leaf_count);
        assert_eq!(
            vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
            anchors[0].1
        );
    }

    #[test(tokio::test(start_paused = true))]
    async fn stop_with_failing_ledger_keeps_buffer() {
        let store = Arc::new(InMemoryStore::default());
        store.insert("a", &b"a"[..]);
        let (ledger, manager, mut scheduler) = scheduler(10, store.clone());
        ledger.fail_next(1);

        scheduler.run(tokio::time::sleep(Duration::from_secs(1))).await;
        assert_eq!(vec!["a"], store.anchored_ids());
        assert_eq!(1, manager.buffered().await);
        assert!(store.anchors().is_empty());
    }

    /// Fails to mark `flaky` exactly once.
    struct FlakyStore {
        inner: InMemoryStore,
        flaky: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn fetch_unanchored(&self) -> anyhow::Result<Vec<Packet>> {
            self.inner.fetch_unanchored().await
        }
        async fn mark_anchored(&self, id: &str) -> anyhow::Result<()> {
            {
                let mut flaky = self.flaky.lock().unwrap();
                if flaky.as_deref() == Some(id) {
                    *flaky = None;
                    return Err(anyhow::anyhow!("transient"));
                }
            }
            self.inner.mark_anchored(id).await
        }
        async fn record_anchor(
            &self,
            record: &AnchorRecord,
            packet_ids: &[String],
        ) -> anyhow::Result<()> {
            self.inner.record_anchor(record, packet_ids).await
        }
    }

    #[test(tokio::test(start_paused = true))]
    async fn failed_mark_is_retried_without_buffering_twice() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryStore::default(),
            flaky: std::sync::Mutex::new(Some("b".to_owned())),
        });
        store.inner.insert("a", &b"a"[..]);
        store.inner.insert("b", &b"b"[..]);
        let ledger = Arc::new(MockLedger::default());
        let manager = Arc::new(BatchAnchorManager::new(
            AnchorConfig::new(2, Duration::from_secs(60)).unwrap(),
            ledger.clone(),
        ));
        let mut scheduler =
            AnchorScheduler::new(store.clone(), manager.clone(), Duration::from_secs(5));

        let err = scheduler.run_cycle().await.unwrap_err();
        assert_eq!("packet store error: transient", err.to_string());
        assert_eq!(vec!["a"], store.inner.anchored_ids());

        scheduler.run_cycle().await.unwrap();
        assert_eq!(vec!["a", "b"], store.inner.anchored_ids());
        assert_eq!(0, manager.buffered().await);
        assert_eq!(1, ledger.submitted().len());
        let anchors = store.inner.anchors();
        assert_eq!(1, anchors.len());
        assert_eq!(vec!["a".to_owned(), "b".to_owned()], anchors[0].1);
        assert!(scheduler.pending.is_empty());
        assert!(scheduler.unmarked.is_empty());
    }

    #[test(tokio::test(start_paused = true))]
    async fn dropped_handle_keeps_scheduler_running() {
        let store = Arc::new(InMemoryStore::default());
        let (ledger, _manager, scheduler) = scheduler(1, store.clone());
        drop(scheduler.start());

        store.insert("late", &b"late"[..]);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(vec!["late"], store.anchored_ids());
        assert_eq!(1, ledger.submitted().len());
    }

    struct FailingStore;

    #[async_trait]
    impl Store for FailingStore {
        async fn fetch_unanchored(&self) -> anyhow::Result<Vec<Packet>> {
            Err(anyhow::anyhow!("store offline"))
        }
        async fn mark_anchored(&self, _id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test(tokio::test(start_paused = true))]
    async fn store_errors_surface_from_cycle() {
        let ledger = Arc::new(MockLedger::default());
        let manager = Arc::new(BatchAnchorManager::new(AnchorConfig::default(), ledger));
        let mut scheduler =
            AnchorScheduler::new(Arc::new(FailingStore), manager, Duration::from_secs(5));
        let err = scheduler.run_cycle().await.unwrap_err();
        assert_eq!("packet store error: store offline", err.to_string());
    }

    #[test(tokio::test(start_paused = true))]
    async fn start_and_stop() {
        let store = Arc::new(InMemoryStore::default());
        let (ledger, manager, scheduler) = scheduler(3, store.clone());
        let handle = scheduler.start();

        store.insert("1", &b"1"[..]);
        store.insert("2", &b"2"[..]);
        store.insert("3", &b"3"[..]);
        // paused time auto-advances while the scheduler sleeps between polls
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(1, ledger.submitted().len());

        store.insert("4", &b"4"[..]);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(1, manager.buffered().await);

        handle.stop().await.unwrap();
        // the leftover packet was sealed on the way out
        assert_eq!(0, manager.buffered().await);
        assert_eq!(2, ledger.submitted().len());
        assert_eq!(vec!["4".to_owned()], store.anchors()[1].1);

        store.insert("5", &b"5"[..]);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(vec!["1", "2", "3", "4"], store.anchored_ids());
    }
}
