use crate::{hash, hash_pair, Digest, Error, Proof, ProofStep, Result};

/// A binary hash tree over an ordered list of leaves.
///
/// Level 0 holds the digest of every leaf in order. Each following level pairs adjacent nodes and
/// hashes their concatenation; the last node of an odd-length level is paired with itself. The single
/// node of the final level is the root.
#[derive(Clone, Debug)]
pub struct HashTree {
    levels: Vec<Vec<Digest>>,
}

impl HashTree {
    /// Build a tree over `leaves`, preserving their order.
    pub fn new<I, T>(leaves: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let leaf_level: Vec<Digest> = leaves.into_iter().map(hash).collect();
        if leaf_level.is_empty() {
            return Err(Error::EmptyInput);
        }

        let mut levels = vec![leaf_level];
        while let Some(level) = levels.last().filter(|level| level.len() > 1) {
            let next: Vec<Digest> = level
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    // odd length: the last node is its own right sibling
                    let right = pair.get(1).unwrap_or(left);
                    hash_pair(left, right)
                })
                .collect();
            levels.push(next);
        }
        Ok(Self { levels })
    }

    /// The root digest summarizing every leaf.
    pub fn root(&self) -> Digest {
        // new() never produces an empty level.
        self.levels[self.levels.len() - 1][0]
    }

    /// Number of leaves the tree was built from.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// All levels, leaf digests first and the root level last.
    pub fn levels(&self) -> &[Vec<Digest>] {
        &self.levels
    }

    /// Produce the inclusion proof for the leaf at `index`.
    ///
    /// At each level below the root the sibling is at `index ^ 1`. When that position is past the end
    /// of the level the node was paired with itself and a [`ProofStep::Duplicate`] is recorded instead
    /// of a sibling digest.
    pub fn proof_for(&self, index: usize) -> Result<Proof> {
        let leaf_count = self.leaf_count();
        if index >= leaf_count {
            return Err(Error::IndexOutOfRange { index, leaf_count });
        }

        let mut index = index;
        let mut steps = Vec::with_capacity(self.levels.len() - 1);
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = index ^ 1;
            let step = match level.get(sibling) {
                Some(digest) if index % 2 == 0 => ProofStep::Right(*digest),
                Some(digest) => ProofStep::Left(*digest),
                None => ProofStep::Duplicate,
            };
            steps.push(step);
            index /= 2;
        }
        Ok(Proof::new(steps))
    }

    /// Check that `leaf` together with `proof` recomputes `root`.
    pub fn verify_proof(leaf: impl AsRef<[u8]>, proof: &Proof, root: &Digest) -> bool {
        proof.compute_root(hash(leaf)) == *root
    }
}
