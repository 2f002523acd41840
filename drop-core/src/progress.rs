//! Reduces per-file progress snapshots into session-wide numbers.
//!
//! Engines push full snapshots rather than deltas. A snapshot replaces the
//! whole table, so a lost or repeated snapshot never skews the totals.

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{DropError, DropResult};

/// Byte progress of a single file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobProgress {
    pub name: String,
    pub transferred: u64,
    pub total: u64,
}

impl BlobProgress {
    /// Clamps `transferred` to `total`.
    pub fn new(name: impl Into<String>, transferred: u64, total: u64) -> Self {
        Self {
            name: name.into(),
            transferred: transferred.min(total),
            total,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.transferred >= self.total
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.transferred)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressTable {
    blobs: BTreeMap<String, BlobProgress>,
}

impl ProgressTable {
    /// Replaces the table with `blobs` and returns how many are complete.
    pub fn apply_snapshot(
        &mut self,
        blobs: impl IntoIterator<Item = BlobProgress>,
    ) -> usize {
        self.blobs = blobs
            .into_iter()
            .map(|b| {
                let b = BlobProgress::new(b.name, b.transferred, b.total);
                (b.name.clone(), b)
            })
            .collect();
        self.completed_names().count()
    }

    pub fn get(&self, name: &str) -> Option<&BlobProgress> {
        self.blobs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlobProgress> {
        self.blobs.values()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn completed_names(&self) -> impl Iterator<Item = &String> {
        self.blobs
            .values()
            .filter(|b| b.is_complete())
            .map(|b| &b.name)
    }

    pub(crate) fn mark_complete(&mut self, name: &str) {
        if let Some(blob) = self.blobs.get_mut(name) {
            blob.transferred = blob.total;
        }
    }

    /// Sum over all blobs, reported under the name `"*"`.
    pub fn totals(&self) -> BlobProgress {
        let (transferred, total) =
            self.blobs.values().fold((0u64, 0u64), |(t, n), b| {
                (t.saturating_add(b.transferred), n.saturating_add(b.total))
            });
        BlobProgress::new("*", transferred, total)
    }

    /// `floor(100 * transferred / total)`, or 0 when nothing is known yet.
    pub fn overall_percent(&self) -> u8 {
        percent(&self.totals())
    }
}

pub fn percent(progress: &BlobProgress) -> u8 {
    if progress.total == 0 {
        return 0;
    }
    let pct =
        u128::from(progress.transferred) * 100 / u128::from(progress.total);
    pct.min(100) as u8
}

/// Estimates the time left for `current` from the rate observed since
/// `previous`.
///
/// Fails with [`DropError::RateUnavailable`] when no forward progress was
/// observed or `elapsed` is zero; callers show a placeholder instead of a
/// number.
pub fn estimated_time_remaining(
    previous: &BlobProgress,
    current: &BlobProgress,
    elapsed: Duration,
) -> DropResult<Duration> {
    let elapsed = elapsed.as_secs_f64();
    if elapsed <= 0.0 || current.transferred <= previous.transferred {
        return Err(DropError::RateUnavailable);
    }

    let rate = (current.transferred - previous.transferred) as f64 / elapsed;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(DropError::RateUnavailable);
    }

    let remaining = current.remaining() as f64 / rate;
    Duration::try_from_secs_f64(remaining)
        .map_err(|_| DropError::RateUnavailable)
}
