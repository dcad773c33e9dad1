//! Feature-row data model as delivered by the feature data provider.
//!
//! Rows are loaded once per filter query and treated as immutable afterwards;
//! the engine only reads them. All scores are optional: a missing value means
//! the scorer never ran, not a zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Up to three scorer scalars for one metric from one explainer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ScorerScoreSet {
    pub s1: Option<f32>,
    pub s2: Option<f32>,
    pub s3: Option<f32>,
}

impl ScorerScoreSet {
    pub fn scores(&self) -> [Option<f32>; 3] {
        [self.s1, self.s2, self.s3]
    }
}

/// Scores one explainer produced for a feature.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ExplainerScores {
    pub embedding: Option<f32>,
    pub quality_score: Option<f32>,
    #[serde(default)]
    pub fuzz: ScorerScoreSet,
    #[serde(default)]
    pub detection: ScorerScoreSet,
    /// Cosine similarity of this explainer's explanation to each other
    /// explainer's, keyed by the other explainer id.
    #[serde(default)]
    pub semantic_similarity: BTreeMap<String, f32>,
}

/// One decoder-space nearest neighbor of a feature.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct DecoderNeighbor {
    pub feature_id: u32,
    pub cosine_similarity: f32,
}

/// Activation-example material used for intra-feature repetition checks.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ActivationSummary {
    #[serde(default)]
    pub examples: Vec<String>,
    pub semantic_similarity: Option<f32>,
}

/// A single SAE feature with everything the backend knows about it.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct FeatureRow {
    pub feature_id: u32,
    #[serde(default)]
    pub explainers: BTreeMap<String, ExplainerScores>,
    /// Up to four nearest neighbors by decoder cosine similarity.
    #[serde(default)]
    pub decoder_similarity: Vec<DecoderNeighbor>,
    pub activation: Option<ActivationSummary>,
}

/// Canonical pair key: ids joined ascending so both sides of a lookup agree.
pub fn pair_key(a: u32, b: u32) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}-{hi}")
}

/// Parse a canonical pair key back into its two feature ids.
pub fn parse_pair_key(key: &str) -> Option<(u32, u32)> {
    let (lo, hi) = key.split_once('-')?;
    let lo = lo.parse().ok()?;
    let hi = hi.parse().ok()?;
    if lo > hi {
        return None;
    }
    Some((lo, hi))
}
