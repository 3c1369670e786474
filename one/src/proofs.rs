use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use blockudp_anchor_tree::{verify_inclusion, Digest, HashTree, Proof};

use crate::anchors::AnchorsFile;

#[derive(Args, Debug)]
pub struct ProveOpts {
    /// Position of the packet to prove, counted from zero.
    #[arg(short, long)]
    index: usize,
    /// Packet files of the batch in leaf order.
    #[arg(required = true)]
    packets: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VerifyOpts {
    /// File holding the packet bytes.
    packet: PathBuf,
    /// Hex encoded root the packet should belong to.
    root: Digest,
    /// JSON file holding the proof steps.
    proof: PathBuf,
}

#[derive(Args, Debug)]
pub struct AnchorsOpts {
    /// Transaction to look up. Lists every anchor when omitted.
    txid: Option<String>,
    /// Anchors file written by the daemon.
    #[arg(long, default_value = "anchors.json", env = "BLOCKUDP_ANCHORS_FILE")]
    anchors_file: PathBuf,
}

/// Output of the `prove` command.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    /// Root of the tree built over the packet files
    pub root: Digest,
    /// Steps from the packet up to `root`
    pub proof: Proof,
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

/// Build the tree over `packets` in order and prove the packet at `index`.
pub async fn prove(packets: &[PathBuf], index: usize) -> Result<InclusionProof> {
    let mut leaves = Vec::with_capacity(packets.len());
    for path in packets {
        leaves.push(read(path).await?);
    }
    let tree = HashTree::new(&leaves)?;
    Ok(InclusionProof {
        root: tree.root(),
        proof: tree.proof_for(index)?,
    })
}

/// Check the packet in `packet` against `root` using the proof stored in `proof`.
pub async fn verify(packet: &Path, root: &Digest, proof: &Path) -> Result<bool> {
    let data = read(packet).await?;
    let proof: Proof = serde_json::from_slice(&read(proof).await?)
        .with_context(|| format!("malformed proof {}", proof.display()))?;
    Ok(verify_inclusion(data, &proof, root))
}

pub async fn prove_command(opts: ProveOpts) -> Result<()> {
    let proof = prove(&opts.packets, opts.index).await?;
    println!("{}", serde_json::to_string_pretty(&proof)?);
    Ok(())
}

pub async fn verify_command(opts: VerifyOpts) -> Result<bool> {
    let included = verify(&opts.packet, &opts.root, &opts.proof).await?;
    println!("{}", if included { "PASS" } else { "FAIL" });
    Ok(included)
}

pub async fn anchors_command(opts: AnchorsOpts) -> Result<bool> {
    let anchors = AnchorsFile::new(opts.anchors_file);
    match opts.txid {
        Some(txid) => match anchors.get(&txid).await? {
            Some(entry) => {
                println!("{}", serde_json::to_string_pretty(&entry)?);
                Ok(true)
            }
            None => {
                eprintln!("no anchor recorded for {}", txid);
                Ok(false)
            }
        },
        None => {
            println!("{}", serde_json::to_string_pretty(&anchors.load().await?)?);
            Ok(true)
        }
    }
}
