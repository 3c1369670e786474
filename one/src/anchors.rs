use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use blockudp_anchor_service::AnchorRecord;
use blockudp_anchor_tree::Digest;

/// One anchored batch as stored in the anchors file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorEntry {
    /// Root submitted to the ledger
    pub root: Digest,
    /// Unix seconds when the ledger accepted the root
    pub ts: i64,
    /// Number of packets in the batch
    pub count: usize,
    /// Packet ids in leaf order, enough to rebuild the tree and prove any of them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packets: Vec<String>,
}

impl AnchorEntry {
    fn new(record: &AnchorRecord, packet_ids: &[String]) -> Self {
        Self {
            root: record.root,
            ts: record.anchored_at.timestamp(),
            count: record.leaf_count,
            packets: packet_ids.to_vec(),
        }
    }
}

/// JSON object on disk mapping transaction ids to [`AnchorEntry`] values.
#[derive(Clone, Debug)]
pub struct AnchorsFile {
    path: PathBuf,
}

impl AnchorsFile {
    /// Use the anchors file at `path`. The file is created on the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every entry. A missing file reads as empty.
    pub async fn load(&self) -> Result<BTreeMap<String, AnchorEntry>> {
        let json = match tokio::fs::read(&self.path).await {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        serde_json::from_slice(&json)
            .with_context(|| format!("malformed anchors file {}", self.path.display()))
    }

    /// Look up the entry for `txid`.
    pub async fn get(&self, txid: &str) -> Result<Option<AnchorEntry>> {
        Ok(self.load().await?.remove(txid))
    }

    /// Add the entry for an anchored batch, replacing the file in one rename.
    pub async fn append(&self, record: &AnchorRecord, packet_ids: &[String]) -> Result<()> {
        let mut anchors = self.load().await?;
        anchors.insert(record.txid.to_string(), AnchorEntry::new(record, packet_ids));

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let json = serde_json::to_vec_pretty(&anchors)?;
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), txid = %record.txid, "anchor entry written");
        Ok(())
    }
}
