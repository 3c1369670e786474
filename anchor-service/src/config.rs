use std::{num::NonZeroUsize, time::Duration};

use crate::{Error, Result};

/// Thresholds that decide when the buffer is sealed. Supplied once when the manager is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnchorConfig {
    /// Seal as soon as this many packets are buffered.
    pub batch_size: NonZeroUsize,
    /// Seal a non-empty buffer once this much time has passed since the last anchor.
    pub anchor_interval: Duration,
}

impl AnchorConfig {
    /// Validate and build a config. Both thresholds must be positive.
    pub fn new(batch_size: usize, anchor_interval: Duration) -> Result<Self> {
        let batch_size = NonZeroUsize::new(batch_size).ok_or_else(|| Error::InvalidConfig {
            reason: "batch size must be at least 1".to_owned(),
        })?;
        if anchor_interval.is_zero() {
            return Err(Error::InvalidConfig {
                reason: "anchor interval must be positive".to_owned(),
            });
        }
        Ok(Self {
            batch_size,
            anchor_interval,
        })
    }
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::new(100).expect("100 is non-zero"),
            anchor_interval: Duration::from_secs(60),
        }
    }
}
