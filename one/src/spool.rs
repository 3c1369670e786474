use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use blockudp_anchor_service::{AnchorRecord, Packet, Store};

use crate::anchors::AnchorsFile;

/// Directory that handed-off packets are moved into.
pub const ANCHORED_DIR: &str = "anchored";

/// Packets are the regular files of a spool directory; a packet's id is its file name.
///
/// Packets handed to the anchoring pipeline are moved into `<spool>/anchored/` and anchor records
/// are appended to an [`AnchorsFile`]. An archived packet is never replaced: a spool file reusing
/// an archived name is left in place and skipped until it is renamed.
#[derive(Debug)]
pub struct SpoolStore {
    dir: PathBuf,
    anchored_dir: PathBuf,
    anchors: AnchorsFile,
}

impl SpoolStore {
    /// Open the spool at `dir`, creating it and its `anchored` directory when missing.
    pub async fn open(dir: impl Into<PathBuf>, anchors: AnchorsFile) -> Result<Self> {
        let dir = dir.into();
        let anchored_dir = dir.join(ANCHORED_DIR);
        tokio::fs::create_dir_all(&anchored_dir)
            .await
            .with_context(|| format!("failed to create {}", anchored_dir.display()))?;
        debug!(dir = %dir.display(), "opened spool");
        Ok(Self {
            dir,
            anchored_dir,
            anchors,
        })
    }

    /// Location of the spool.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn packet_paths(&self, id: &str) -> Result<(PathBuf, PathBuf)> {
        // Ids are bare file names, never paths into other directories.
        if Path::new(id).file_name() != Some(OsStr::new(id)) {
            return Err(anyhow!("invalid packet id {:?}", id));
        }
        Ok((self.dir.join(id), self.anchored_dir.join(id)))
    }
}

#[async_trait]
impl Store for SpoolStore {
    /// Spooled packets ordered by modification time, then by name.
    async fn fetch_unanchored(&self) -> Result<Vec<Packet>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to list {}", self.dir.display()))?;
        let mut found: Vec<(SystemTime, String, PathBuf)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                warn!(path = %entry.path().display(), "skipping packet with a non UTF-8 name");
                continue;
            };
            // Hidden files are partial writes by convention.
            if name.starts_with('.') {
                continue;
            }
            if tokio::fs::try_exists(self.anchored_dir.join(&name)).await? {
                warn!(id = %name, "skipping packet whose name is already archived");
                continue;
            }
            found.push((metadata.modified()?, name, entry.path()));
        }
        found.sort();

        let mut packets = Vec::with_capacity(found.len());
        for (_, id, path) in found {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read packet {}", path.display()))?;
            packets.push(Packet::new(id, data));
        }
        Ok(packets)
    }

    async fn mark_anchored(&self, id: &str) -> Result<()> {
        let (spooled, anchored) = self.packet_paths(id)?;
        if tokio::fs::try_exists(&anchored).await? {
            if tokio::fs::try_exists(&spooled).await? {
                bail!("packet {} is already archived, refusing to replace it", id);
            }
            return Ok(());
        }
        tokio::fs::rename(&spooled, &anchored)
            .await
            .with_context(|| format!("failed to mark packet {} anchored", id))
    }

    async fn record_anchor(&self, record: &AnchorRecord, packet_ids: &[String]) -> Result<()> {
        self.anchors.append(record, packet_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use std::sync::Arc;

    use bytes::Bytes;
    use chrono::Utc;

    use blockudp_anchor_service::{AnchorConfig, AnchorScheduler, BatchAnchorManager, MockLedger};
    use blockudp_anchor_tree::hash;

    use crate::proofs::{prove, verify};

    async fn spool() -> (tempfile::TempDir, SpoolStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SpoolStore::open(
            dir.path().join("spool"),
            AnchorsFile::new(dir.path().join("anchors.json")),
        )
        .await
        .unwrap();
        (dir, store)
    }

    fn set_mtime(path: &Path, secs: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[tokio::test]
    async fn fetches_files_oldest_first() {
        let (_dir, store) = spool().await;
        std::fs::write(store.dir().join("b"), "packet b").unwrap();
        std::fs::write(store.dir().join("a"), "packet a").unwrap();
        std::fs::write(store.dir().join("c"), "packet c").unwrap();
        std::fs::write(store.dir().join(".partial"), "ignored").unwrap();
        set_mtime(&store.dir().join("b"), 1_000);
        set_mtime(&store.dir().join("a"), 2_000);
        set_mtime(&store.dir().join("c"), 2_000);

        let packets = store.fetch_unanchored().await.unwrap();
        assert_eq!(
            vec![
                Packet::new("b", Bytes::from_static(b"packet b")),
                Packet::new("a", Bytes::from_static(b"packet a")),
                Packet::new("c", Bytes::from_static(b"packet c")),
            ],
            packets
        );
    }

    #[tokio::test]
    async fn marking_moves_the_file_once() {
        let (_dir, store) = spool().await;
        std::fs::write(store.dir().join("p1"), "one").unwrap();
        std::fs::write(store.dir().join("p2"), "two").unwrap();

        store.mark_anchored("p1").await.unwrap();
        store.mark_anchored("p1").await.unwrap();
        assert!(store.dir().join(ANCHORED_DIR).join("p1").is_file());

        let ids: Vec<_> = store
            .fetch_unanchored()
            .await
            .unwrap()
            .into_iter()
            .map(|packet| packet.id)
            .collect();
        assert_eq!(vec!["p2"], ids);
    }

    #[tokio::test]
    async fn reused_name_never_replaces_archived_packet() {
        let (_dir, store) = spool().await;
        let spooled = store.dir().join("p");
        let archived = store.dir().join(ANCHORED_DIR).join("p");
        std::fs::write(&spooled, "first").unwrap();
        store.mark_anchored("p").await.unwrap();

        std::fs::write(&spooled, "second").unwrap();
        assert!(store.fetch_unanchored().await.unwrap().is_empty());
        let err = store.mark_anchored("p").await.unwrap_err();
        assert_eq!(
            "packet p is already archived, refusing to replace it",
            err.to_string()
        );
        assert_eq!("first", std::fs::read_to_string(&archived).unwrap());
        assert_eq!("second", std::fs::read_to_string(&spooled).unwrap());
    }

    #[tokio::test]
    async fn marking_unknown_or_foreign_ids_fails() {
        let (_dir, store) = spool().await;
        assert!(store.mark_anchored("missing").await.is_err());
        assert!(store.mark_anchored("../anchors.json").await.is_err());
        assert!(store.mark_anchored("").await.is_err());
    }

    #[tokio::test]
    async fn records_go_to_the_anchors_file() {
        let (dir, store) = spool().await;
        let record = AnchorRecord {
            root: hash(b"root"),
            txid: "mock-1".into(),
            leaf_count: 1,
            anchored_at: Utc::now(),
        };
        store.record_anchor(&record, &["p1".into()]).await.unwrap();
        let entry = AnchorsFile::new(dir.path().join("anchors.json"))
            .get("mock-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.root, entry.root);
        assert_eq!(vec!["p1"], entry.packets);
    }

    #[test_log::test(tokio::test)]
    async fn anchored_spool_packets_can_be_proven() {
        let (dir, store) = spool().await;
        for (n, name) in ["x", "y", "z"].iter().enumerate() {
            let path = store.dir().join(name);
            std::fs::write(&path, format!("packet {name}")).unwrap();
            set_mtime(&path, 1_000 + n as u64);
        }
        let spool_dir = store.dir().to_owned();
        let manager = Arc::new(BatchAnchorManager::new(
            AnchorConfig::new(3, Duration::from_secs(60)).unwrap(),
            Arc::new(MockLedger::default()),
        ));
        let mut scheduler =
            AnchorScheduler::new(Arc::new(store), manager, Duration::from_secs(1));
        scheduler.run_cycle().await.unwrap();

        let anchors = AnchorsFile::new(dir.path().join("anchors.json"))
            .load()
            .await
            .unwrap();
        assert_eq!(1, anchors.len());
        let entry = anchors.into_values().next().unwrap();
        assert_eq!(vec!["x", "y", "z"], entry.packets);

        // every packet now lives in the anchored directory and proves against the recorded root
        let archived: Vec<PathBuf> = entry
            .packets
            .iter()
            .map(|id| spool_dir.join(ANCHORED_DIR).join(id))
            .collect();
        let proof = prove(&archived, 1).await.unwrap();
        assert_eq!(entry.root, proof.root);
        let proof_path = dir.path().join("proof.json");
        std::fs::write(&proof_path, serde_json::to_vec(&proof.proof).unwrap()).unwrap();
        assert!(verify(&archived[1], &entry.root, &proof_path).await.unwrap());
    }
}
