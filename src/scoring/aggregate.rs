//! Null-skipping aggregation of per-explainer scores into composite scalars.
//!
//! Every function here follows one rule: missing values are skipped, and the
//! aggregate is `None` only when every input was missing. A null is never
//! treated as zero.

use std::collections::BTreeMap;

use crate::features::{ExplainerScores, FeatureRow, ScorerScoreSet};
use crate::scoring::ngram;
use crate::scoring::signature::MetricValues;

/// Mean over the present values; `None` when nothing is present.
pub fn mean_optional(values: impl IntoIterator<Item = Option<f32>>) -> Option<f32> {
    let mut sum = 0.0_f32;
    let mut count = 0usize;
    for value in values.into_iter().flatten() {
        sum += value;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f32)
    }
}

/// Mean of whichever of s1/s2/s3 are present.
pub fn average_scorer_scores(set: &ScorerScoreSet) -> Option<f32> {
    mean_optional(set.scores())
}

/// Mean embedding score across explainers.
pub fn average_embedding(explainers: &BTreeMap<String, ExplainerScores>) -> Option<f32> {
    mean_optional(explainers.values().map(|e| e.embedding))
}

/// Mean quality score across explainers.
pub fn average_quality_score(explainers: &BTreeMap<String, ExplainerScores>) -> Option<f32> {
    mean_optional(explainers.values().map(|e| e.quality_score))
}

/// Two-stage detection composite: each explainer's scorer set is averaged
/// first, then the per-explainer averages are averaged. Explainers with more
/// populated scorer slots do not dominate.
pub fn average_detection(explainers: &BTreeMap<String, ExplainerScores>) -> Option<f32> {
    mean_optional(
        explainers
            .values()
            .map(|e| average_scorer_scores(&e.detection)),
    )
}

/// Two-stage fuzz composite, same shape as [`average_detection`].
pub fn average_fuzz(explainers: &BTreeMap<String, ExplainerScores>) -> Option<f32> {
    mean_optional(explainers.values().map(|e| average_scorer_scores(&e.fuzz)))
}

/// Flatten every explainer's pairwise semantic similarities into one mean.
pub fn average_explainer_semantic_similarity(
    explainers: &BTreeMap<String, ExplainerScores>,
) -> Option<f32> {
    mean_optional(
        explainers
            .values()
            .flat_map(|e| e.semantic_similarity.values())
            .map(|v| Some(*v)),
    )
}

/// Mean cosine similarity to the feature's decoder-space neighbors.
pub fn average_decoder_similarity(row: &FeatureRow) -> Option<f32> {
    mean_optional(
        row.decoder_similarity
            .iter()
            .map(|n| Some(n.cosine_similarity)),
    )
}

/// Compute all six composite metric scalars for one feature.
pub fn metric_values(row: &FeatureRow) -> MetricValues {
    MetricValues {
        decoder_similarity: average_decoder_similarity(row),
        embedding: average_embedding(&row.explainers),
        fuzz: average_fuzz(&row.explainers),
        detection: average_detection(&row.explainers),
        semantic_similarity: average_explainer_semantic_similarity(&row.explainers),
        quality_score: average_quality_score(&row.explainers),
    }
}

/// Strongest repetition signal across activation examples: max of char
/// n-gram Jaccard, word n-gram Jaccard, and the provided semantic
/// similarity. Max, not mean: any one strong repetition pattern indicates
/// noise.
pub fn intra_feature_similarity(row: &FeatureRow) -> Option<f32> {
    let activation = row.activation.as_ref()?;
    let char_sim = ngram::char_ngram_jaccard(&activation.examples, ngram::CHAR_NGRAM_SIZE);
    let word_sim = ngram::word_ngram_jaccard(&activation.examples, ngram::WORD_NGRAM_SIZE);
    [char_sim, word_sim, activation.semantic_similarity]
        .into_iter()
        .flatten()
        .reduce(f32::max)
}
