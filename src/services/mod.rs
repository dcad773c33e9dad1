//! Boundary with the compute backend: similarity sorting and histograms.
//!
//! The session talks to the backend through [`SimilarityBackend`] so tests
//! can script responses without a network; [`http::HttpBackend`] is the
//! production implementation.

pub mod http;
pub mod types;

use types::{
    CauseSortRequest, CauseSortResponse, HistogramRequest, HistogramResponse, PairSortRequest,
    PairSortResponse,
};

/// Errors from a backend call. Failures are local: the caller logs, clears
/// its loading flag, and leaves state untouched.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("JSON error: {0}")]
    Json(String),
}

/// The three compute-backend round trips the engine depends on.
pub trait SimilarityBackend {
    fn sort_cause_by_similarity(
        &self,
        request: &CauseSortRequest,
    ) -> Result<CauseSortResponse, ServiceError>;

    fn sort_pairs_by_similarity(
        &self,
        request: &PairSortRequest,
    ) -> Result<PairSortResponse, ServiceError>;

    fn fetch_similarity_histogram(
        &self,
        request: &HistogramRequest,
    ) -> Result<HistogramResponse, ServiceError>;
}
