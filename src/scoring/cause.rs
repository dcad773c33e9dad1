//! Cause classification: why did a feature's explanation score poorly.
//!
//! Scores are deficiency measures, so the *minimum* aggregate names the root
//! cause. Server-side one-vs-rest decision margins, when available, override
//! the local rule via argmax; the local rule only fills the gaps.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::features::FeatureRow;
use crate::scoring::aggregate;

/// Hypothesized reason an explanation scored poorly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum CauseCategory {
    #[serde(rename = "noisy-activation")]
    NoisyActivation,
    #[serde(rename = "missed-context")]
    MissedContext,
    #[serde(rename = "missed-N-gram")]
    MissedNgram,
}

impl CauseCategory {
    pub const ALL: [CauseCategory; 3] = [
        CauseCategory::NoisyActivation,
        CauseCategory::MissedContext,
        CauseCategory::MissedNgram,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CauseCategory::NoisyActivation => "noisy-activation",
            CauseCategory::MissedContext => "missed-context",
            CauseCategory::MissedNgram => "missed-N-gram",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

/// Named component scalars feeding the cause aggregates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct CauseComponents {
    pub intra_feature_sim: Option<f32>,
    pub explainer_semantic_sim: Option<f32>,
    pub embedding: Option<f32>,
    pub detection: Option<f32>,
    pub fuzz: Option<f32>,
}

/// Per-feature aggregate cause scores with their components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct CauseMetricScores {
    pub noisy_activation: Option<f32>,
    pub missed_context: Option<f32>,
    pub missed_ngram: Option<f32>,
    pub components: CauseComponents,
}

/// Compute a feature's cause scores from its explainer data and activation
/// examples.
pub fn cause_scores_for_feature(row: &FeatureRow) -> CauseMetricScores {
    let components = CauseComponents {
        intra_feature_sim: aggregate::intra_feature_similarity(row),
        explainer_semantic_sim: aggregate::average_explainer_semantic_similarity(&row.explainers),
        embedding: aggregate::average_embedding(&row.explainers),
        detection: aggregate::average_detection(&row.explainers),
        fuzz: aggregate::average_fuzz(&row.explainers),
    };
    CauseMetricScores {
        noisy_activation: aggregate::mean_optional([
            components.intra_feature_sim,
            components.explainer_semantic_sim,
        ]),
        missed_context: aggregate::mean_optional([components.embedding, components.detection]),
        missed_ngram: components.fuzz,
        components,
    }
}

/// Pick the category with the minimum non-null aggregate score; lower score
/// means the deficiency is clearer. All-null falls back to noisy activation.
pub fn determine_cause_tag(scores: &CauseMetricScores) -> CauseCategory {
    let candidates = [
        (CauseCategory::NoisyActivation, scores.noisy_activation),
        (CauseCategory::MissedContext, scores.missed_context),
        (CauseCategory::MissedNgram, scores.missed_ngram),
    ];
    candidates
        .into_iter()
        .filter_map(|(category, score)| score.map(|s| (category, s)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(category, _)| category)
        .unwrap_or(CauseCategory::NoisyActivation)
}

/// Argmax over server decision margins; `None` when no known category is
/// present in the map.
pub fn category_from_margins(margins: &HashMap<String, f32>) -> Option<CauseCategory> {
    CauseCategory::ALL
        .into_iter()
        .filter_map(|category| margins.get(category.as_str()).map(|m| (category, *m)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(category, _)| category)
}

/// Label a feature: server margins win when present, otherwise the local
/// minimum-score rule.
pub fn auto_cause_label(row: &FeatureRow, margins: Option<&HashMap<String, f32>>) -> CauseCategory {
    if let Some(category) = margins.and_then(category_from_margins) {
        return category;
    }
    determine_cause_tag(&cause_scores_for_feature(row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ActivationSummary;

    fn scores(
        noisy: Option<f32>,
        context: Option<f32>,
        ngram: Option<f32>,
    ) -> CauseMetricScores {
        CauseMetricScores {
            noisy_activation: noisy,
            missed_context: context,
            missed_ngram: ngram,
            components: CauseComponents::default(),
        }
    }

    #[test]
    fn minimum_score_names_the_cause() {
        let tag = determine_cause_tag(&scores(Some(0.8), Some(0.3), Some(0.5)));
        assert_eq!(tag, CauseCategory::MissedContext);
    }

    #[test]
    fn null_aggregates_are_skipped() {
        let tag = determine_cause_tag(&scores(None, Some(0.9), Some(0.4)));
        assert_eq!(tag, CauseCategory::MissedNgram);
    }

    #[test]
    fn all_null_defaults_to_noisy_activation() {
        let tag = determine_cause_tag(&scores(None, None, None));
        assert_eq!(tag, CauseCategory::NoisyActivation);
    }

    #[test]
    fn margins_argmax_overrides_local_rule() {
        let mut margins = HashMap::new();
        margins.insert("noisy-activation".to_string(), -0.2);
        margins.insert("missed-context".to_string(), 1.4);
        margins.insert("missed-N-gram".to_string(), 0.3);
        assert_eq!(
            category_from_margins(&margins),
            Some(CauseCategory::MissedContext)
        );

        let row = FeatureRow::default();
        assert_eq!(
            auto_cause_label(&row, Some(&margins)),
            CauseCategory::MissedContext
        );
        // Without margins the empty row falls back to the local default.
        assert_eq!(auto_cause_label(&row, None), CauseCategory::NoisyActivation);
    }

    #[test]
    fn unknown_margin_keys_are_ignored() {
        let mut margins = HashMap::new();
        margins.insert("something-else".to_string(), 9.0);
        assert_eq!(category_from_margins(&margins), None);
    }

    #[test]
    fn cause_scores_wire_intra_feature_similarity_into_noisy_activation() {
        let row = FeatureRow {
            feature_id: 1,
            activation: Some(ActivationSummary {
                examples: vec!["same text".to_string(), "same text".to_string()],
                semantic_similarity: None,
            }),
            ..FeatureRow::default()
        };
        let scores = cause_scores_for_feature(&row);
        assert_eq!(scores.components.intra_feature_sim, Some(1.0));
        assert_eq!(scores.noisy_activation, Some(1.0));
        assert_eq!(scores.missed_context, None);
        assert_eq!(scores.missed_ngram, None);
    }

    #[test]
    fn category_names_round_trip() {
        for category in CauseCategory::ALL {
            assert_eq!(CauseCategory::from_str(category.as_str()), Some(category));
        }
    }
}
