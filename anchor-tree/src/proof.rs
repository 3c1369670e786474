use serde::{Deserialize, Serialize};

use crate::{hash_pair, Digest};

/// One level of an inclusion proof, ordered from the leaf towards the root.
///
/// Serialized as `{"position": "left" | "right", "hash": "<hex>"}` or
/// `{"position": "duplicate"}`.
///
/// A `duplicate` step carries no `hash`, so verifiers that require one on every step reject it.
/// Such proofs use `{"position": "right", "hash": <the node's own digest>}` for that level instead;
/// that form is read back as [`ProofStep::Right`] and recomputes the same root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "position", content = "hash", rename_all = "lowercase")]
pub enum ProofStep {
    /// The sibling was the left operand when the parent was built.
    Left(Digest),
    /// The sibling was the right operand when the parent was built.
    Right(Digest),
    /// The node was the unpaired last element of an odd-length level and was hashed with itself.
    /// No sibling digest is recorded for this level.
    Duplicate,
}

impl ProofStep {
    /// Fold this step into the digest computed so far.
    pub fn apply(&self, computed: &Digest) -> Digest {
        match self {
            ProofStep::Left(sibling) => hash_pair(sibling, computed),
            ProofStep::Right(sibling) => hash_pair(computed, sibling),
            ProofStep::Duplicate => hash_pair(computed, computed),
        }
    }

    /// The recorded sibling digest, if any.
    pub fn sibling(&self) -> Option<&Digest> {
        match self {
            ProofStep::Left(sibling) | ProofStep::Right(sibling) => Some(sibling),
            ProofStep::Duplicate => None,
        }
    }
}

/// An inclusion proof for a single leaf of a [`crate::HashTree`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Proof {
    steps: Vec<ProofStep>,
}

impl Proof {
    /// Build a proof from its steps, leaf level first.
    pub fn new(steps: Vec<ProofStep>) -> Self {
        Self { steps }
    }

    /// All steps from the leaf level up to the level below the root.
    pub fn steps(&self) -> &[ProofStep] {
        &self.steps
    }

    /// The sibling digests in proof order, skipping levels where the node was paired with itself.
    pub fn siblings(&self) -> impl Iterator<Item = &Digest> + '_ {
        self.steps.iter().filter_map(ProofStep::sibling)
    }

    /// Number of levels the proof spans.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True for the proof of a single-leaf tree.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Recompute the root implied by `leaf_digest` and this proof.
    pub fn compute_root(&self, leaf_digest: Digest) -> Digest {
        self.steps
            .iter()
            .fold(leaf_digest, |computed, step| step.apply(&computed))
    }
}

impl From<Vec<ProofStep>> for Proof {
    fn from(steps: Vec<ProofStep>) -> Self {
        Self::new(steps)
    }
}
