//! Wire types for the compute-backend endpoints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Request for one-vs-rest cause classification over the given features.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CauseSortRequest {
    /// Current per-feature category assignments used as training labels.
    pub cause_selections: HashMap<u32, String>,
    pub feature_ids: Vec<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CauseSortedFeature {
    pub feature_id: u32,
    /// Opaque ranking signal per category; higher means more confidently
    /// that category.
    pub category_decision_margins: HashMap<String, f32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CauseSortResponse {
    pub sorted_features: Vec<CauseSortedFeature>,
    pub total_features: usize,
}

/// Request to rank pairs by similarity to the selected/rejected examples.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PairSortRequest {
    pub selected_pair_keys: Vec<String>,
    pub rejected_pair_keys: Vec<String>,
    pub pair_keys: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SortedPair {
    pub pair_key: String,
    pub score: f32,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PairSortResponse {
    pub sorted_pairs: Vec<SortedPair>,
    pub total_pairs: usize,
    #[serde(default)]
    pub weights_used: HashMap<String, f32>,
}

/// Request for a similarity-score histogram over ids or pair keys.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HistogramRequest {
    pub selected: Vec<String>,
    pub rejected: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct HistogramBins {
    pub bins: usize,
    pub counts: Vec<u32>,
    pub bin_edges: Vec<f32>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct HistogramStatistics {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub median: f32,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct HistogramResponse {
    /// Score per id or canonical pair key.
    pub scores: HashMap<String, f32>,
    pub histogram: HistogramBins,
    pub statistics: HistogramStatistics,
    pub total_items: usize,
}
