//! Metric signatures: per-metric acceptance ranges and importance weights.

use serde::{Deserialize, Serialize};

use crate::features::FeatureRow;
use crate::scoring::aggregate;

/// Floor for range widths when deriving weights, so a degenerate point range
/// cannot divide by zero.
pub const WEIGHT_FLOOR: f32 = 0.05;

/// Minimum exemplar count before inferred weights are trusted; below this the
/// weights stay uniform.
pub const MIN_EXEMPLARS_FOR_WEIGHTS: usize = 3;

/// Default spread multiplier applied to the exemplar standard deviation.
pub const DEFAULT_STD_MULTIPLIER: f32 = 1.5;

/// The closed set of composite metrics a signature ranges over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    DecoderSimilarity,
    Embedding,
    Fuzz,
    Detection,
    SemanticSimilarity,
    QualityScore,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::DecoderSimilarity,
        Metric::Embedding,
        Metric::Fuzz,
        Metric::Detection,
        Metric::SemanticSimilarity,
        Metric::QualityScore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::DecoderSimilarity => "decoder_similarity",
            Metric::Embedding => "embedding",
            Metric::Fuzz => "fuzz",
            Metric::Detection => "detection",
            Metric::SemanticSimilarity => "semantic_similarity",
            Metric::QualityScore => "quality_score",
        }
    }
}

/// Inclusive acceptance range for one metric, kept inside [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct MetricRange {
    pub min: f32,
    pub max: f32,
}

impl MetricRange {
    pub const FULL: MetricRange = MetricRange { min: 0.0, max: 1.0 };

    /// Build a range from unordered bounds, clamped to [0, 1].
    pub fn clamped(lo: f32, hi: f32) -> Self {
        let lo = lo.clamp(0.0, 1.0);
        let hi = hi.clamp(0.0, 1.0);
        if lo <= hi {
            Self { min: lo, max: hi }
        } else {
            Self { min: hi, max: lo }
        }
    }

    pub fn midpoint(&self) -> f32 {
        (self.min + self.max) / 2.0
    }

    pub fn width(&self) -> f32 {
        self.max - self.min
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for MetricRange {
    fn default() -> Self {
        MetricRange::FULL
    }
}

/// One acceptance range per metric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct MetricSignature {
    pub decoder_similarity: MetricRange,
    pub embedding: MetricRange,
    pub fuzz: MetricRange,
    pub detection: MetricRange,
    pub semantic_similarity: MetricRange,
    pub quality_score: MetricRange,
}

impl MetricSignature {
    /// Signature accepting everything: every range is [0, 1].
    pub fn full() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: Metric) -> MetricRange {
        match metric {
            Metric::DecoderSimilarity => self.decoder_similarity,
            Metric::Embedding => self.embedding,
            Metric::Fuzz => self.fuzz,
            Metric::Detection => self.detection,
            Metric::SemanticSimilarity => self.semantic_similarity,
            Metric::QualityScore => self.quality_score,
        }
    }

    pub fn set(&mut self, metric: Metric, range: MetricRange) {
        match metric {
            Metric::DecoderSimilarity => self.decoder_similarity = range,
            Metric::Embedding => self.embedding = range,
            Metric::Fuzz => self.fuzz = range,
            Metric::Detection => self.detection = range,
            Metric::SemanticSimilarity => self.semantic_similarity = range,
            Metric::QualityScore => self.quality_score = range,
        }
    }
}

/// One non-negative importance weight per metric.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct MetricWeights {
    pub decoder_similarity: f32,
    pub embedding: f32,
    pub fuzz: f32,
    pub detection: f32,
    pub semantic_similarity: f32,
    pub quality_score: f32,
}

impl MetricWeights {
    pub fn uniform() -> Self {
        Self {
            decoder_similarity: 1.0,
            embedding: 1.0,
            fuzz: 1.0,
            detection: 1.0,
            semantic_similarity: 1.0,
            quality_score: 1.0,
        }
    }

    pub fn get(&self, metric: Metric) -> f32 {
        match metric {
            Metric::DecoderSimilarity => self.decoder_similarity,
            Metric::Embedding => self.embedding,
            Metric::Fuzz => self.fuzz,
            Metric::Detection => self.detection,
            Metric::SemanticSimilarity => self.semantic_similarity,
            Metric::QualityScore => self.quality_score,
        }
    }

    pub fn set(&mut self, metric: Metric, weight: f32) {
        let weight = weight.max(0.0);
        match metric {
            Metric::DecoderSimilarity => self.decoder_similarity = weight,
            Metric::Embedding => self.embedding = weight,
            Metric::Fuzz => self.fuzz = weight,
            Metric::Detection => self.detection = weight,
            Metric::SemanticSimilarity => self.semantic_similarity = weight,
            Metric::QualityScore => self.quality_score = weight,
        }
    }
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self::uniform()
    }
}

/// The six aggregated metric scalars for one feature. Absent means no scorer
/// produced data for that metric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct MetricValues {
    pub decoder_similarity: Option<f32>,
    pub embedding: Option<f32>,
    pub fuzz: Option<f32>,
    pub detection: Option<f32>,
    pub semantic_similarity: Option<f32>,
    pub quality_score: Option<f32>,
}

impl MetricValues {
    pub fn get(&self, metric: Metric) -> Option<f32> {
        match metric {
            Metric::DecoderSimilarity => self.decoder_similarity,
            Metric::Embedding => self.embedding,
            Metric::Fuzz => self.fuzz,
            Metric::Detection => self.detection,
            Metric::SemanticSimilarity => self.semantic_similarity,
            Metric::QualityScore => self.quality_score,
        }
    }

    pub fn set(&mut self, metric: Metric, value: Option<f32>) {
        match metric {
            Metric::DecoderSimilarity => self.decoder_similarity = value,
            Metric::Embedding => self.embedding = value,
            Metric::Fuzz => self.fuzz = value,
            Metric::Detection => self.detection = value,
            Metric::SemanticSimilarity => self.semantic_similarity = value,
            Metric::QualityScore => self.quality_score = value,
        }
    }
}

/// Signature plus weights inferred from a set of exemplar features.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InferredSignature {
    pub signature: MetricSignature,
    pub weights: MetricWeights,
}

/// Derive a signature and weights from exemplar features.
///
/// Each metric's range is `mean ± std_multiplier * std` over the exemplars
/// that have a value for it, clamped to [0, 1]. A metric with no exemplar
/// data keeps the full range. Weights are the inverse of the range width;
/// with fewer than [`MIN_EXEMPLARS_FOR_WEIGHTS`] exemplars the inferred
/// widths are noise, so weights stay uniform.
pub fn infer_signature(exemplars: &[&FeatureRow], std_multiplier: f32) -> InferredSignature {
    let values: Vec<MetricValues> = exemplars
        .iter()
        .map(|row| aggregate::metric_values(row))
        .collect();
    infer_signature_from_values(&values, std_multiplier)
}

/// Same as [`infer_signature`] over precomputed metric values.
pub fn infer_signature_from_values(
    values: &[MetricValues],
    std_multiplier: f32,
) -> InferredSignature {
    let mut signature = MetricSignature::full();
    let mut weights = MetricWeights::uniform();
    let infer_weights = values.len() >= MIN_EXEMPLARS_FOR_WEIGHTS;

    for metric in Metric::ALL {
        let samples: Vec<f32> = values.iter().filter_map(|v| v.get(metric)).collect();
        let Some((mean, std)) = mean_and_std(&samples) else {
            continue;
        };
        let spread = std_multiplier * std;
        let range = MetricRange::clamped(mean - spread, mean + spread);
        signature.set(metric, range);
        if infer_weights {
            weights.set(metric, 1.0 / range.width().max(WEIGHT_FLOOR));
        }
    }

    InferredSignature { signature, weights }
}

fn mean_and_std(samples: &[f32]) -> Option<(f32, f32)> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    Some((mean, variance.sqrt()))
}
