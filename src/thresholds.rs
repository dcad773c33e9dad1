//! Threshold previews over similarity score distributions.
//!
//! Previews are pure and view-only: they never touch persisted tag state.
//! The session applies them through the selection state machine when the
//! user confirms.

use std::collections::HashMap;
use std::hash::Hash;

use crate::services::types::HistogramStatistics;

/// Untagged keys falling outside the open middle band.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdPreview<K> {
    pub auto_selected: Vec<K>,
    pub auto_rejected: Vec<K>,
}

// Manual impl: an empty preview exists for any key type, while a derived
// `Default` would demand `K: Default`.
impl<K> Default for ThresholdPreview<K> {
    fn default() -> Self {
        Self {
            auto_selected: Vec::new(),
            auto_rejected: Vec::new(),
        }
    }
}

/// Select/reject threshold pair; `select >= reject` is kept by construction
/// in [`default_thresholds`] but not enforced here, matching the drag UI.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub select: f32,
    pub reject: f32,
}

/// Compute the preview sets for the current thresholds. Only keys the
/// predicate reports as untagged participate; everything else is already
/// decided.
pub fn preview_auto_tags<K: Eq + Hash + Clone + Ord>(
    scores: &HashMap<K, f32>,
    is_tagged: impl Fn(&K) -> bool,
    thresholds: Thresholds,
) -> ThresholdPreview<K> {
    let mut preview = ThresholdPreview::default();
    for (key, score) in scores {
        if is_tagged(key) {
            continue;
        }
        if *score >= thresholds.select {
            preview.auto_selected.push(key.clone());
        } else if *score <= thresholds.reject {
            preview.auto_rejected.push(key.clone());
        }
    }
    // Deterministic ordering for rendering and tests.
    preview.auto_selected.sort();
    preview.auto_rejected.sort();
    preview
}

/// Derive default thresholds from the server-computed score statistics:
/// midpoints between the median and each extreme.
pub fn default_thresholds(statistics: &HistogramStatistics) -> Thresholds {
    let select = (statistics.median + statistics.max) / 2.0;
    let reject = (statistics.median + statistics.min) / 2.0;
    Thresholds {
        select: select.max(reject),
        reject,
    }
}
