use crate::{Digest, HashTree, Proof};

/// Confirm that `packet` was committed to `root`.
///
/// This is the only check a third party needs: the raw packet bytes, the proof handed out alongside
/// it, and a root they already trust, e.g. one read back from the ledger.
pub fn verify_inclusion(packet: impl AsRef<[u8]>, proof: &Proof, root: &Digest) -> bool {
    HashTree::verify_proof(packet, proof, root)
}
