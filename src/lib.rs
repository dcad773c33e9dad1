//! featlens: similarity scoring and auto-tagging for SAE feature audits.
//!
//! The engine aggregates per-explainer scores into composite metrics, infers
//! metric signatures from exemplar features, ranks candidates by weighted
//! distance, classifies low-quality explanations by cause, and drives the
//! threshold/histogram tagging workflow with a bounded commit history.

/// Application directory resolution under the `.featlens` root.
pub mod app_dirs;
/// Persisted engine settings.
pub mod config;
/// Feature-row data model and pair keys.
pub mod features;
/// Shared HTTP agent and bounded response reads.
pub mod http_client;
/// Tracing setup with stdout and rotating file output.
pub mod logging;
/// Metric aggregation, signatures, candidate matching, cause scores.
pub mod scoring;
/// Compute-backend boundary: trait, wire types, HTTP implementation.
pub mod services;
/// The owning audit session and its mutating operations.
pub mod session;
/// Selection state machine, commit history, tag roster.
pub mod tagging;
/// Threshold previews over score distributions.
pub mod thresholds;
