//! Weighted-distance candidate matching against a metric signature.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use ordered_float::OrderedFloat;

use crate::scoring::signature::{Metric, MetricSignature, MetricValues, MetricWeights};

/// Default cap on returned matches.
pub const DEFAULT_MATCH_LIMIT: usize = 100;

/// One candidate feature ranked against a signature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureMatch {
    pub feature_id: u32,
    /// Weighted Euclidean distance in the six-metric space.
    pub distance: f32,
    /// Bounded similarity in (0, 1], monotone decreasing in distance.
    pub score: f32,
    pub values: MetricValues,
}

/// Matcher signature/weights with reversible relaxation toggles.
///
/// Disabling the range filter widens every range to [0, 1] but remembers the
/// signature so re-enabling restores it exactly; disabling weighted distance
/// does the same with the weights. Neither toggle recomputes anything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatcherSettings {
    pub signature: MetricSignature,
    pub weights: MetricWeights,
    pub limit: Option<usize>,
    saved_signature: Option<MetricSignature>,
    saved_weights: Option<MetricWeights>,
}

impl MatcherSettings {
    pub fn new(signature: MetricSignature, weights: MetricWeights) -> Self {
        Self {
            signature,
            weights,
            limit: None,
            saved_signature: None,
            saved_weights: None,
        }
    }

    pub fn use_range_filter(&self) -> bool {
        self.saved_signature.is_none()
    }

    pub fn use_weighted_distance(&self) -> bool {
        self.saved_weights.is_none()
    }

    pub fn set_use_range_filter(&mut self, enabled: bool) {
        if enabled {
            if let Some(saved) = self.saved_signature.take() {
                self.signature = saved;
            }
        } else if self.saved_signature.is_none() {
            self.saved_signature = Some(self.signature);
            self.signature = MetricSignature::full();
        }
    }

    pub fn set_use_weighted_distance(&mut self, enabled: bool) {
        if enabled {
            if let Some(saved) = self.saved_weights.take() {
                self.weights = saved;
            }
        } else if self.saved_weights.is_none() {
            self.saved_weights = Some(self.weights);
            self.weights = MetricWeights::uniform();
        }
    }

    /// Replace the signature/weights, e.g. after fresh inference. Clears any
    /// saved toggle state since it no longer corresponds to the new values.
    pub fn replace(&mut self, signature: MetricSignature, weights: MetricWeights) {
        self.signature = signature;
        self.weights = weights;
        self.saved_signature = None;
        self.saved_weights = None;
    }
}

/// Score every eligible feature against the signature and return the ranked
/// matches.
///
/// Features in `exclude` or `rejected` never appear in the result. With the
/// range filter on, a feature with any metric value outside its range is
/// dropped outright. Metrics missing on a feature are skipped in the
/// distance, never treated as a miss.
pub fn find_candidate_features(
    features: &BTreeMap<u32, MetricValues>,
    settings: &MatcherSettings,
    exclude: &HashSet<u32>,
    rejected: &HashSet<u32>,
) -> Vec<FeatureMatch> {
    let use_range_filter = settings.use_range_filter();
    let mut matches: Vec<FeatureMatch> = features
        .iter()
        .filter(|(id, _)| !exclude.contains(id) && !rejected.contains(id))
        .filter(|(_, values)| !use_range_filter || within_signature(values, &settings.signature))
        .map(|(id, values)| {
            let distance = weighted_distance(values, &settings.signature, &settings.weights);
            FeatureMatch {
                feature_id: *id,
                distance,
                score: 1.0 / (1.0 + distance),
                values: *values,
            }
        })
        .collect();

    matches.sort_by_key(|m| (Reverse(OrderedFloat(m.score)), m.feature_id));
    matches.truncate(settings.limit.unwrap_or(DEFAULT_MATCH_LIMIT));
    matches
}

/// True when every present metric value sits inside its signature range.
pub fn within_signature(values: &MetricValues, signature: &MetricSignature) -> bool {
    Metric::ALL.iter().all(|&metric| {
        values
            .get(metric)
            .is_none_or(|value| signature.get(metric).contains(value))
    })
}

/// Weighted Euclidean distance from the feature's metric values to the
/// signature midpoints, skipping metrics the feature has no value for.
pub fn weighted_distance(
    values: &MetricValues,
    signature: &MetricSignature,
    weights: &MetricWeights,
) -> f32 {
    let mut sum = 0.0_f32;
    for metric in Metric::ALL {
        let Some(value) = values.get(metric) else {
            continue;
        };
        let deviation = value - signature.get(metric).midpoint();
        sum += weights.get(metric) * deviation * deviation;
    }
    sum.sqrt()
}
