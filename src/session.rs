//! The audit session: one owning state object with explicit mutating
//! methods.
//!
//! All local recomputation (candidate refresh, preview sets, commit
//! snapshots) is synchronous and visible to the next read. The only
//! suspension points are the three backend calls; each sets its loading flag
//! before the call and clears it on both success and error, and the
//! histogram fetch is stamped with a monotonic generation so a stale
//! response cannot stomp newer state.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, error, warn};

use crate::config::Settings;
use crate::features::{FeatureRow, pair_key, parse_pair_key};
use crate::scoring::cause::{self, CauseCategory};
use crate::scoring::matcher::{self, FeatureMatch, MatcherSettings};
use crate::scoring::signature::{self, MetricValues, MetricWeights};
use crate::services::types::{CauseSortRequest, HistogramRequest, HistogramResponse, PairSortRequest};
use crate::services::{ServiceError, SimilarityBackend};
use crate::tagging::commits::{CommitKind, CommitLog};
use crate::tagging::selection::{SelectionMap, SelectionSource, SelectionState};
use crate::tagging::tags::{CandidateWorkingState, TagRoster};
use crate::thresholds::{self, ThresholdPreview, Thresholds};

/// Outcome of an action that may be skipped without being an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    Done,
    /// Preconditions not met or the response went stale; nothing changed.
    Skipped,
}

/// Owning state for one audit of a loaded feature set.
pub struct AuditSession {
    features: BTreeMap<u32, FeatureRow>,
    metric_values: BTreeMap<u32, MetricValues>,
    std_multiplier: f32,

    tags: TagRoster,
    matcher: MatcherSettings,
    candidates: Vec<FeatureMatch>,
    /// Transient per-candidate verification marks; not durable without an
    /// active tag.
    candidate_review: SelectionMap<u32>,

    feature_selection: SelectionMap<u32>,
    pair_selection: SelectionMap<String>,
    commits: CommitLog,

    cause_labels: HashMap<u32, CauseCategory>,
    cause_sources: HashMap<u32, SelectionSource>,
    cause_margins: HashMap<u32, HashMap<String, f32>>,

    pair_scores: HashMap<String, f32>,
    histogram: Option<HistogramResponse>,
    thresholds: Thresholds,
    preview: ThresholdPreview<String>,

    cause_sort_loading: bool,
    pair_sort_loading: bool,
    histogram_loading: bool,
    histogram_generation: u64,
}

impl AuditSession {
    /// Build a session over a loaded feature set. Composite metric values
    /// are computed once here; rows are never mutated afterwards.
    pub fn new(features: Vec<FeatureRow>, settings: &Settings) -> Self {
        let features: BTreeMap<u32, FeatureRow> = features
            .into_iter()
            .map(|row| (row.feature_id, row))
            .collect();
        let metric_values = features
            .iter()
            .map(|(id, row)| (*id, crate::scoring::aggregate::metric_values(row)))
            .collect();
        let feature_selection = SelectionMap::new();
        let commits = CommitLog::new(feature_selection.snapshot());
        let mut matcher = MatcherSettings::default();
        matcher.limit = Some(settings.candidate_limit);
        Self {
            features,
            metric_values,
            std_multiplier: settings.std_multiplier,
            tags: TagRoster::new(),
            matcher,
            candidates: Vec::new(),
            candidate_review: SelectionMap::new(),
            feature_selection,
            pair_selection: SelectionMap::new(),
            commits,
            cause_labels: HashMap::new(),
            cause_sources: HashMap::new(),
            cause_margins: HashMap::new(),
            pair_scores: HashMap::new(),
            histogram: None,
            thresholds: Thresholds {
                select: settings.select_threshold,
                reject: settings.reject_threshold,
            },
            preview: ThresholdPreview::default(),
            cause_sort_loading: false,
            pair_sort_loading: false,
            histogram_loading: false,
            histogram_generation: 0,
        }
    }

    pub fn feature(&self, id: u32) -> Option<&FeatureRow> {
        self.features.get(&id)
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn metric_values(&self, id: u32) -> Option<&MetricValues> {
        self.metric_values.get(&id)
    }

    pub fn tags(&self) -> &TagRoster {
        &self.tags
    }

    pub fn matcher(&self) -> &MatcherSettings {
        &self.matcher
    }

    pub fn candidates(&self) -> &[FeatureMatch] {
        &self.candidates
    }

    pub fn feature_selection(&self) -> &SelectionMap<u32> {
        &self.feature_selection
    }

    pub fn pair_selection(&self) -> &SelectionMap<String> {
        &self.pair_selection
    }

    pub fn commits(&self) -> &CommitLog {
        &self.commits
    }

    pub fn cause_label(&self, id: u32) -> Option<CauseCategory> {
        self.cause_labels.get(&id).copied()
    }

    pub fn cause_margins(&self, id: u32) -> Option<&HashMap<String, f32>> {
        self.cause_margins.get(&id)
    }

    pub fn pair_scores(&self) -> &HashMap<String, f32> {
        &self.pair_scores
    }

    pub fn histogram(&self) -> Option<&HistogramResponse> {
        self.histogram.as_ref()
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn preview(&self) -> &ThresholdPreview<String> {
        &self.preview
    }

    pub fn cause_sort_loading(&self) -> bool {
        self.cause_sort_loading
    }

    pub fn pair_sort_loading(&self) -> bool {
        self.pair_sort_loading
    }

    pub fn histogram_loading(&self) -> bool {
        self.histogram_loading
    }

    /// Canonical pair keys for every decoder-similar neighbor in the set.
    pub fn all_pair_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .features
            .values()
            .flat_map(|row| {
                row.decoder_similarity
                    .iter()
                    .map(|n| pair_key(row.feature_id, n.feature_id))
            })
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    // ----- selection transitions -----

    /// Single-step toggle for a feature; recomputes the preview since the
    /// tagged set changed.
    pub fn toggle_feature_selection(&mut self, id: u32) -> Option<SelectionState> {
        let state = self.feature_selection.toggle(id);
        self.recompute_preview();
        state
    }

    /// Reach a target feature state directly (composes toggles).
    pub fn set_feature_selection(&mut self, id: u32, target: Option<SelectionState>) {
        self.feature_selection.set_manual(id, target);
        self.recompute_preview();
    }

    /// Single-step toggle for a main-feature/neighbor pair.
    pub fn toggle_pair_selection(&mut self, a: u32, b: u32) -> Option<SelectionState> {
        let state = self.pair_selection.toggle(pair_key(a, b));
        self.recompute_preview();
        state
    }

    /// Bulk replace the feature selection maps from a commit snapshot.
    pub fn restore_commit(&mut self, commit_id: u64) -> ActionOutcome {
        let Some(commit) = self.commits.find(commit_id) else {
            warn!(commit_id, "Cannot restore: commit not found");
            return ActionOutcome::Skipped;
        };
        let snapshot = commit.snapshot.clone();
        self.feature_selection.restore(snapshot);
        self.recompute_preview();
        ActionOutcome::Done
    }

    // ----- tags and candidate matching -----

    pub fn create_tag(&mut self, name: impl Into<String>, color: impl Into<String>) -> u64 {
        self.tags.create(name, color)
    }

    /// Activate a tag, parking the current working candidate state on the
    /// outgoing tag and restoring the incoming tag's saved state.
    pub fn activate_tag(&mut self, id: u64) -> ActionOutcome {
        let outgoing = CandidateWorkingState {
            settings: self.matcher.clone(),
            matches: self.candidates.clone(),
            verification: self.candidate_review.snapshot(),
        };
        let Some(incoming) = self.tags.activate(id, Some(outgoing)) else {
            warn!(tag_id = id, "Cannot activate: tag not found");
            return ActionOutcome::Skipped;
        };
        match incoming {
            Some(state) => {
                self.matcher = state.settings;
                self.candidates = state.matches;
                self.candidate_review.restore(state.verification);
            }
            None => {
                let tag = self.tags.get(id).unwrap_or_else(|| unreachable!());
                self.matcher.replace(
                    tag.saved_manual_signature.unwrap_or(tag.signature),
                    tag.weights.unwrap_or_default(),
                );
                self.candidates.clear();
                self.candidate_review = SelectionMap::new();
                self.refresh_candidates();
            }
        }
        ActionOutcome::Done
    }

    /// Infer the active tag's signature and weights from exemplar features
    /// and rank candidates against it.
    pub fn infer_active_signature(&mut self, exemplar_ids: &[u32]) -> ActionOutcome {
        if self.tags.active_id().is_none() {
            warn!("Cannot infer signature: no active tag");
            return ActionOutcome::Skipped;
        }
        let values: Vec<MetricValues> = exemplar_ids
            .iter()
            .filter_map(|id| self.metric_values.get(id).copied())
            .collect();
        if values.is_empty() {
            warn!("Cannot infer signature: no exemplar has metric values");
            return ActionOutcome::Skipped;
        }
        let inferred = signature::infer_signature_from_values(&values, self.std_multiplier);
        if let Some(tag) = self.tags.active_mut() {
            tag.signature = inferred.signature;
            tag.weights = Some(inferred.weights);
            tag.working_feature_ids = exemplar_ids.to_vec();
        }
        self.matcher.replace(inferred.signature, inferred.weights);
        self.refresh_candidates();
        ActionOutcome::Done
    }

    /// Override the active tag's weights by hand; uniform weights stay
    /// available through the matcher toggle instead.
    pub fn set_active_weights(&mut self, weights: MetricWeights) {
        if let Some(tag) = self.tags.active_mut() {
            tag.weights = Some(weights);
        }
        self.matcher.weights = weights;
        self.refresh_candidates();
    }

    pub fn set_use_range_filter(&mut self, enabled: bool) {
        self.matcher.set_use_range_filter(enabled);
        self.refresh_candidates();
    }

    pub fn set_use_weighted_distance(&mut self, enabled: bool) {
        self.matcher.set_use_weighted_distance(enabled);
        self.refresh_candidates();
    }

    /// Re-rank candidates for the active tag. Synchronous; the result is
    /// visible immediately.
    pub fn refresh_candidates(&mut self) {
        let Some(tag) = self.tags.active() else {
            self.candidates.clear();
            return;
        };
        let mut exclude: HashSet<u32> = tag.feature_ids.clone();
        exclude.extend(self.feature_selection.keys_in_state(SelectionState::Selected));
        let mut rejected: HashSet<u32> = tag.rejected_feature_ids.clone();
        rejected.extend(self.candidate_review.keys_in_state(SelectionState::Rejected));
        self.candidates =
            matcher::find_candidate_features(&self.metric_values, &self.matcher, &exclude, &rejected);
        debug!(
            candidates = self.candidates.len(),
            tag = %tag.name,
            "Candidate list refreshed"
        );
    }

    /// Confirm a candidate into the active tag.
    pub fn accept_candidate(&mut self, id: u32) -> ActionOutcome {
        let Some(tag) = self.tags.active_mut() else {
            warn!(feature_id = id, "Cannot accept candidate: no active tag");
            return ActionOutcome::Skipped;
        };
        tag.feature_ids.insert(id);
        tag.rejected_feature_ids.remove(&id);
        self.candidate_review.set_manual(id, Some(SelectionState::Selected));
        self.refresh_candidates();
        ActionOutcome::Done
    }

    /// Reject a candidate for the active tag. Without an active tag the
    /// rejection is recorded only as a transient verification mark.
    pub fn reject_candidate(&mut self, id: u32) -> ActionOutcome {
        self.candidate_review.set_manual(id, Some(SelectionState::Rejected));
        let Some(tag) = self.tags.active_mut() else {
            warn!(
                feature_id = id,
                "No active tag; rejection is transient and will not persist"
            );
            return ActionOutcome::Skipped;
        };
        tag.rejected_feature_ids.insert(id);
        tag.feature_ids.remove(&id);
        self.refresh_candidates();
        ActionOutcome::Done
    }

    // ----- cause labels -----

    /// Manually assign (or clear) a feature's cause label.
    pub fn set_cause_label(&mut self, id: u32, category: Option<CauseCategory>) {
        match category {
            Some(category) => {
                self.cause_labels.insert(id, category);
                self.cause_sources.insert(id, SelectionSource::Manual);
            }
            None => {
                self.cause_labels.remove(&id);
                self.cause_sources.remove(&id);
            }
        }
    }

    pub fn cause_label_source(&self, id: u32) -> Option<SelectionSource> {
        self.cause_sources.get(&id).copied()
    }

    /// Fill cause labels for every unlabeled feature: server margins win,
    /// the local minimum-score rule covers the rest. Existing labels,
    /// manual or auto, are never touched.
    pub fn auto_label_causes(&mut self) -> usize {
        let mut labeled = 0usize;
        for (id, row) in &self.features {
            if self.cause_labels.contains_key(id) {
                continue;
            }
            let category = cause::auto_cause_label(row, self.cause_margins.get(id));
            self.cause_labels.insert(*id, category);
            self.cause_sources.insert(*id, SelectionSource::Auto);
            labeled += 1;
        }
        debug!(labeled, "Auto cause labeling complete");
        labeled
    }

    /// Rank features by cause-category confidence via the backend
    /// classifier. Requires at least one existing cause label to train on.
    pub fn sort_cause_by_similarity(
        &mut self,
        backend: &impl SimilarityBackend,
    ) -> Result<ActionOutcome, ServiceError> {
        if self.cause_labels.is_empty() {
            warn!("Cause similarity sort requires at least one cause label");
            return Ok(ActionOutcome::Skipped);
        }
        let request = CauseSortRequest {
            cause_selections: self
                .cause_labels
                .iter()
                .map(|(id, category)| (*id, category.as_str().to_string()))
                .collect(),
            feature_ids: self.features.keys().copied().collect(),
        };

        self.cause_sort_loading = true;
        let result = backend.sort_cause_by_similarity(&request);
        self.cause_sort_loading = false;

        match result {
            Ok(response) => {
                self.cause_margins = response
                    .sorted_features
                    .into_iter()
                    .map(|f| (f.feature_id, f.category_decision_margins))
                    .collect();
                Ok(ActionOutcome::Done)
            }
            Err(err) => {
                error!("Cause similarity sort failed: {err}");
                Err(err)
            }
        }
    }

    /// Rank decoder-similar pairs against the current pair selections.
    /// Requires at least one selected and one rejected pair.
    pub fn sort_pairs_by_similarity(
        &mut self,
        backend: &impl SimilarityBackend,
    ) -> Result<ActionOutcome, ServiceError> {
        let selected = self.pair_selection.keys_in_state(SelectionState::Selected);
        let rejected = self.pair_selection.keys_in_state(SelectionState::Rejected);
        if selected.is_empty() || rejected.is_empty() {
            warn!(
                selected = selected.len(),
                rejected = rejected.len(),
                "Pair similarity sort requires at least one selected and one rejected pair"
            );
            return Ok(ActionOutcome::Skipped);
        }
        let request = PairSortRequest {
            selected_pair_keys: selected,
            rejected_pair_keys: rejected,
            pair_keys: self.all_pair_keys(),
        };

        self.pair_sort_loading = true;
        let result = backend.sort_pairs_by_similarity(&request);
        self.pair_sort_loading = false;

        match result {
            Ok(response) => {
                self.pair_scores = response
                    .sorted_pairs
                    .into_iter()
                    .map(|p| (p.pair_key, p.score))
                    .collect();
                Ok(ActionOutcome::Done)
            }
            Err(err) => {
                error!("Pair similarity sort failed: {err}");
                Err(err)
            }
        }
    }

    /// Start a histogram fetch: validates preconditions and returns the
    /// request stamped with a fresh generation. Drivers that run requests
    /// concurrently hand the stamp back to [`apply_histogram_response`],
    /// which discards responses a newer fetch or invalidation has outdated.
    pub fn begin_histogram_fetch(&mut self) -> Option<(u64, HistogramRequest)> {
        let selected = self.selected_keys();
        let rejected = self.rejected_keys();
        if selected.is_empty() || rejected.is_empty() {
            warn!(
                selected = selected.len(),
                rejected = rejected.len(),
                "Histogram fetch requires at least one selected and one rejected item"
            );
            return None;
        }
        self.histogram_generation += 1;
        Some((
            self.histogram_generation,
            HistogramRequest { selected, rejected },
        ))
    }

    /// Install a histogram response unless its generation stamp has been
    /// superseded. The first accepted response also seeds the thresholds
    /// from the server statistics.
    pub fn apply_histogram_response(
        &mut self,
        generation: u64,
        response: HistogramResponse,
    ) -> ActionOutcome {
        if generation != self.histogram_generation {
            debug!(generation, "Discarding stale histogram response");
            return ActionOutcome::Skipped;
        }
        let first_fetch = self.histogram.is_none();
        if first_fetch {
            self.thresholds = thresholds::default_thresholds(&response.statistics);
        }
        self.histogram = Some(response);
        self.recompute_preview();
        ActionOutcome::Done
    }

    /// Fetch the similarity-score histogram for the current selections in
    /// one blocking round trip. Requires at least one selected and one
    /// rejected key.
    pub fn fetch_similarity_histogram(
        &mut self,
        backend: &impl SimilarityBackend,
    ) -> Result<ActionOutcome, ServiceError> {
        let Some((generation, request)) = self.begin_histogram_fetch() else {
            return Ok(ActionOutcome::Skipped);
        };

        self.histogram_loading = true;
        let result = backend.fetch_similarity_histogram(&request);
        self.histogram_loading = false;

        match result {
            Ok(response) => Ok(self.apply_histogram_response(generation, response)),
            Err(err) => {
                error!("Histogram fetch failed: {err}");
                Err(err)
            }
        }
    }

    // ----- thresholds, preview, apply -----

    pub fn set_thresholds(&mut self, select: f32, reject: f32) {
        self.thresholds = Thresholds { select, reject };
        self.recompute_preview();
    }

    /// Write the preview bands as manual selections, commit, and invalidate
    /// the histogram so the next fetch sees the larger tagged set.
    pub fn apply_threshold_tags(&mut self) -> ActionOutcome {
        if self.histogram.is_none() {
            warn!("Nothing to apply: no histogram scores loaded");
            return ActionOutcome::Skipped;
        }
        let preview = std::mem::take(&mut self.preview);
        self.commits.update_head_snapshot(self.feature_selection.snapshot());
        for key in &preview.auto_selected {
            self.write_selection(key, SelectionState::Selected, SelectionSource::Manual);
        }
        for key in &preview.auto_rejected {
            self.write_selection(key, SelectionState::Rejected, SelectionSource::Manual);
        }
        self.commits.push(CommitKind::Apply, self.feature_selection.snapshot());
        self.invalidate_histogram();
        ActionOutcome::Done
    }

    /// Tag every scored untagged key automatically using the same bands as
    /// Apply, with auto provenance. Entries that already exist are never
    /// overridden.
    pub fn tag_all(&mut self) -> ActionOutcome {
        let Some(histogram) = &self.histogram else {
            warn!("Nothing to tag: no histogram scores loaded");
            return ActionOutcome::Skipped;
        };
        let assignments: Vec<(String, SelectionState)> = histogram
            .scores
            .iter()
            .filter_map(|(key, score)| {
                if *score >= self.thresholds.select {
                    Some((key.clone(), SelectionState::Selected))
                } else if *score <= self.thresholds.reject {
                    Some((key.clone(), SelectionState::Rejected))
                } else {
                    None
                }
            })
            .collect();

        self.commits.update_head_snapshot(self.feature_selection.snapshot());
        let mut feature_fill = Vec::new();
        let mut pair_fill = Vec::new();
        for (key, state) in assignments {
            match key.parse::<u32>() {
                Ok(id) => feature_fill.push((id, state)),
                Err(_) if parse_pair_key(&key).is_some() => pair_fill.push((key, state)),
                Err(_) => warn!(key, "Ignoring unparseable score key"),
            }
        }
        self.feature_selection.auto_fill(feature_fill);
        self.pair_selection.auto_fill(pair_fill);
        self.commits.push(CommitKind::TagAll, self.feature_selection.snapshot());
        self.invalidate_histogram();
        ActionOutcome::Done
    }

    fn write_selection(&mut self, key: &str, state: SelectionState, source: SelectionSource) {
        match key.parse::<u32>() {
            Ok(id) => {
                if !self.feature_selection.is_tagged(&id) {
                    self.feature_selection.set_with_source(id, state, source);
                }
            }
            Err(_) if parse_pair_key(key).is_some() => {
                if !self.pair_selection.is_tagged(&key.to_string()) {
                    self.pair_selection
                        .set_with_source(key.to_string(), state, source);
                }
            }
            Err(_) => warn!(key, "Ignoring unparseable score key"),
        }
    }

    fn invalidate_histogram(&mut self) {
        self.histogram = None;
        self.preview = ThresholdPreview::default();
        // A response already in flight is now stale.
        self.histogram_generation += 1;
    }

    fn recompute_preview(&mut self) {
        let Some(histogram) = &self.histogram else {
            self.preview = ThresholdPreview::default();
            return;
        };
        let feature_selection = &self.feature_selection;
        let pair_selection = &self.pair_selection;
        self.preview = thresholds::preview_auto_tags(
            &histogram.scores,
            |key: &String| match key.parse::<u32>() {
                Ok(id) => feature_selection.is_tagged(&id),
                Err(_) => pair_selection.is_tagged(key),
            },
            self.thresholds,
        );
    }

    fn selected_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .feature_selection
            .keys_in_state(SelectionState::Selected)
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        keys.extend(self.pair_selection.keys_in_state(SelectionState::Selected));
        keys.sort();
        keys
    }

    fn rejected_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .feature_selection
            .keys_in_state(SelectionState::Rejected)
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        keys.extend(self.pair_selection.keys_in_state(SelectionState::Rejected));
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{ActivationSummary, DecoderNeighbor, ExplainerScores, ScorerScoreSet};
    use crate::services::types::{
        CauseSortResponse, CauseSortedFeature, HistogramBins, HistogramStatistics,
        PairSortResponse, SortedPair,
    };
    use std::cell::RefCell;

    /// Scripted backend: pops pre-seeded responses, records requests.
    #[derive(Default)]
    struct ScriptedBackend {
        cause: RefCell<Vec<Result<CauseSortResponse, ServiceError>>>,
        pairs: RefCell<Vec<Result<PairSortResponse, ServiceError>>>,
        histograms: RefCell<Vec<Result<HistogramResponse, ServiceError>>>,
        histogram_requests: RefCell<Vec<HistogramRequest>>,
    }

    impl SimilarityBackend for ScriptedBackend {
        fn sort_cause_by_similarity(
            &self,
            _request: &CauseSortRequest,
        ) -> Result<CauseSortResponse, ServiceError> {
            self.cause.borrow_mut().remove(0)
        }

        fn sort_pairs_by_similarity(
            &self,
            _request: &PairSortRequest,
        ) -> Result<PairSortResponse, ServiceError> {
            self.pairs.borrow_mut().remove(0)
        }

        fn fetch_similarity_histogram(
            &self,
            request: &HistogramRequest,
        ) -> Result<HistogramResponse, ServiceError> {
            self.histogram_requests.borrow_mut().push(request.clone());
            self.histograms.borrow_mut().remove(0)
        }
    }

    fn feature(id: u32, embedding: f32) -> FeatureRow {
        let mut row = FeatureRow {
            feature_id: id,
            ..FeatureRow::default()
        };
        row.explainers.insert(
            "gpt".to_string(),
            ExplainerScores {
                embedding: Some(embedding),
                ..ExplainerScores::default()
            },
        );
        row
    }

    fn session(features: Vec<FeatureRow>) -> AuditSession {
        AuditSession::new(features, &Settings::default())
    }

    fn histogram_response(scores: &[(&str, f32)]) -> HistogramResponse {
        HistogramResponse {
            scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            histogram: HistogramBins::default(),
            statistics: HistogramStatistics {
                min: -1.0,
                max: 1.0,
                mean: 0.0,
                median: 0.0,
            },
            total_items: scores.len(),
        }
    }

    #[test]
    fn toggle_cycle_closes_in_three_steps() {
        let mut session = session(vec![feature(1, 0.5)]);
        assert_eq!(
            session.toggle_feature_selection(1),
            Some(SelectionState::Selected)
        );
        assert_eq!(
            session.toggle_feature_selection(1),
            Some(SelectionState::Rejected)
        );
        assert_eq!(session.toggle_feature_selection(1), None);
        assert!(!session.feature_selection().is_tagged(&1));
    }

    #[test]
    fn signature_inference_ranks_candidates_for_active_tag() {
        let mut session = session(vec![
            feature(1, 0.70),
            feature(2, 0.72),
            feature(3, 0.71),
            feature(4, 0.95),
            feature(5, 0.715),
        ]);
        let tag = session.create_tag("splitting", "#aa0000");
        session.activate_tag(tag);
        session.infer_active_signature(&[1, 2, 3]);
        let ids: Vec<u32> = session.candidates().iter().map(|m| m.feature_id).collect();
        // 5 sits nearest the exemplar midpoint; 4 is outside the range.
        assert!(ids.contains(&5));
        assert!(!ids.contains(&4));
    }

    #[test]
    fn reject_without_active_tag_is_transient() {
        let mut session = session(vec![feature(1, 0.5)]);
        assert_eq!(session.reject_candidate(1), ActionOutcome::Skipped);
        assert_eq!(
            session.candidate_review.state(&1),
            Some(SelectionState::Rejected)
        );
    }

    #[test]
    fn rejected_candidates_stay_out_of_the_match_list() {
        let mut session = session(vec![feature(1, 0.70), feature(2, 0.70), feature(3, 0.70)]);
        let tag = session.create_tag("t", "#00aa00");
        session.activate_tag(tag);
        session.infer_active_signature(&[1, 2, 3]);
        session.reject_candidate(2);
        let ids: Vec<u32> = session.candidates().iter().map(|m| m.feature_id).collect();
        assert!(!ids.contains(&2));
        assert!(
            session
                .tags()
                .active()
                .unwrap()
                .rejected_feature_ids
                .contains(&2)
        );
    }

    #[test]
    fn tag_switch_round_trips_working_state() {
        let mut session = session(vec![feature(1, 0.70), feature(2, 0.70), feature(3, 0.70)]);
        let a = session.create_tag("a", "#111111");
        let b = session.create_tag("b", "#222222");
        session.activate_tag(a);
        session.infer_active_signature(&[1, 2, 3]);
        let saved_candidates = session.candidates().to_vec();
        let saved_signature = session.matcher().signature;

        session.activate_tag(b);
        session.activate_tag(a);
        assert_eq!(session.candidates(), saved_candidates.as_slice());
        assert_eq!(session.matcher().signature, saved_signature);
    }

    #[test]
    fn pair_sort_requires_one_selected_and_one_rejected() {
        let mut session = session(vec![feature(1, 0.5)]);
        let backend = ScriptedBackend::default();
        session.toggle_pair_selection(1, 2);
        let outcome = session.sort_pairs_by_similarity(&backend).unwrap();
        assert_eq!(outcome, ActionOutcome::Skipped);
        assert!(session.pair_scores().is_empty());
        assert!(!session.pair_sort_loading());
    }

    #[test]
    fn pair_sort_stores_scores_on_success() {
        let mut row = feature(1, 0.5);
        row.decoder_similarity.push(DecoderNeighbor {
            feature_id: 2,
            cosine_similarity: 0.9,
        });
        let mut session = session(vec![row, feature(2, 0.6)]);
        session.toggle_pair_selection(1, 2); // selected
        session.toggle_pair_selection(3, 4);
        session.toggle_pair_selection(3, 4); // rejected

        let backend = ScriptedBackend::default();
        backend.pairs.borrow_mut().push(Ok(PairSortResponse {
            sorted_pairs: vec![SortedPair {
                pair_key: "1-2".to_string(),
                score: 0.83,
            }],
            total_pairs: 1,
            weights_used: HashMap::new(),
        }));
        let outcome = session.sort_pairs_by_similarity(&backend).unwrap();
        assert_eq!(outcome, ActionOutcome::Done);
        assert_eq!(session.pair_scores()["1-2"], 0.83);
    }

    #[test]
    fn service_failure_clears_loading_flag_and_leaves_state() {
        let mut session = session(vec![feature(1, 0.5)]);
        session.set_feature_selection(1, Some(SelectionState::Selected));
        session.set_feature_selection(2, Some(SelectionState::Rejected));
        let backend = ScriptedBackend::default();
        backend
            .histograms
            .borrow_mut()
            .push(Err(ServiceError::Transport("connection refused".to_string())));
        let err = session.fetch_similarity_histogram(&backend);
        assert!(err.is_err());
        assert!(!session.histogram_loading());
        assert!(session.histogram().is_none());
    }

    #[test]
    fn histogram_flow_previews_and_applies_manual_tags() {
        let mut session = session(vec![feature(1, 0.5), feature(2, 0.5), feature(3, 0.5)]);
        session.set_feature_selection(10, Some(SelectionState::Selected));
        session.set_feature_selection(11, Some(SelectionState::Rejected));

        let backend = ScriptedBackend::default();
        backend
            .histograms
            .borrow_mut()
            .push(Ok(histogram_response(&[("1", 0.9), ("2", -0.9), ("3", 0.1)])));
        session.fetch_similarity_histogram(&backend).unwrap();

        // Defaults derived from statistics: select 0.5, reject -0.5.
        assert_eq!(session.preview().auto_selected, vec!["1".to_string()]);
        assert_eq!(session.preview().auto_rejected, vec!["2".to_string()]);

        let commits_before = session.commits().len();
        session.apply_threshold_tags();
        assert_eq!(
            session.feature_selection().state(&1),
            Some(SelectionState::Selected)
        );
        assert_eq!(
            session.feature_selection().source(&1),
            Some(SelectionSource::Manual)
        );
        assert_eq!(
            session.feature_selection().state(&2),
            Some(SelectionState::Rejected)
        );
        // Middle band untouched, histogram invalidated, commit appended.
        assert_eq!(session.feature_selection().state(&3), None);
        assert!(session.histogram().is_none());
        assert_eq!(session.commits().len(), commits_before + 1);
        assert_eq!(session.commits().head().kind, CommitKind::Apply);
    }

    #[test]
    fn superseded_histogram_response_is_discarded() {
        let mut session = session(vec![feature(1, 0.5)]);
        session.set_feature_selection(10, Some(SelectionState::Selected));
        session.set_feature_selection(11, Some(SelectionState::Rejected));

        // Two overlapping fetches: the first response comes back after the
        // second fetch has already advanced the generation.
        let (stale, _request) = session.begin_histogram_fetch().unwrap();
        let (current, _request) = session.begin_histogram_fetch().unwrap();
        assert_eq!(
            session.apply_histogram_response(stale, histogram_response(&[("1", 0.9)])),
            ActionOutcome::Skipped
        );
        assert!(session.histogram().is_none());
        assert_eq!(
            session.apply_histogram_response(current, histogram_response(&[("2", 0.9)])),
            ActionOutcome::Done
        );
        assert!(session.histogram().unwrap().scores.contains_key("2"));

        // Invalidation also outdates an in-flight stamp.
        let (pending, _request) = session.begin_histogram_fetch().unwrap();
        session.apply_threshold_tags();
        assert_eq!(
            session.apply_histogram_response(pending, histogram_response(&[("3", 0.9)])),
            ActionOutcome::Skipped
        );
    }

    #[test]
    fn threshold_moves_recompute_preview_without_mutating_state() {
        let mut session = session(vec![feature(1, 0.5)]);
        session.set_feature_selection(10, Some(SelectionState::Selected));
        session.set_feature_selection(11, Some(SelectionState::Rejected));
        let backend = ScriptedBackend::default();
        backend
            .histograms
            .borrow_mut()
            .push(Ok(histogram_response(&[("1", 0.4), ("2", 0.2)])));
        session.fetch_similarity_histogram(&backend).unwrap();

        session.set_thresholds(0.3, -0.3);
        assert_eq!(session.preview().auto_selected, vec!["1".to_string()]);
        session.set_thresholds(0.1, -0.3);
        assert_eq!(
            session.preview().auto_selected,
            vec!["1".to_string(), "2".to_string()]
        );
        // Preview never wrote any persisted state.
        assert_eq!(session.feature_selection().state(&1), None);
    }

    #[test]
    fn tag_all_uses_auto_source_and_respects_existing_entries() {
        let mut session = session(vec![feature(1, 0.5)]);
        session.set_feature_selection(2, Some(SelectionState::Selected));
        session.set_feature_selection(10, Some(SelectionState::Selected));
        session.set_feature_selection(11, Some(SelectionState::Rejected));
        let backend = ScriptedBackend::default();
        backend
            .histograms
            .borrow_mut()
            .push(Ok(histogram_response(&[("1", 0.9), ("2", -0.9)])));
        session.fetch_similarity_histogram(&backend).unwrap();

        session.tag_all();
        assert_eq!(
            session.feature_selection().state(&1),
            Some(SelectionState::Selected)
        );
        assert_eq!(
            session.feature_selection().source(&1),
            Some(SelectionSource::Auto)
        );
        // Feature 2 was manually selected; tag_all must not flip it.
        assert_eq!(
            session.feature_selection().state(&2),
            Some(SelectionState::Selected)
        );
        assert_eq!(
            session.feature_selection().source(&2),
            Some(SelectionSource::Manual)
        );
        assert_eq!(session.commits().head().kind, CommitKind::TagAll);
    }

    #[test]
    fn restore_commit_rewinds_feature_selection() {
        let mut session = session(vec![feature(1, 0.5)]);
        session.set_feature_selection(10, Some(SelectionState::Selected));
        session.set_feature_selection(11, Some(SelectionState::Rejected));
        let backend = ScriptedBackend::default();
        backend
            .histograms
            .borrow_mut()
            .push(Ok(histogram_response(&[("1", 0.9)])));
        session.fetch_similarity_histogram(&backend).unwrap();
        session.apply_threshold_tags();
        assert!(session.feature_selection().is_tagged(&1));

        // Apply rewrote the previous head's snapshot with the pre-apply
        // state, so restoring it drops the applied tag but keeps the
        // manual selections made before the apply.
        let previous = session.commits().get(0).unwrap().id;
        session.restore_commit(previous);
        assert!(!session.feature_selection().is_tagged(&1));
        assert!(session.feature_selection().is_tagged(&10));
        assert!(session.feature_selection().is_tagged(&11));
    }

    #[test]
    fn cause_sort_and_auto_labeling_fill_untagged_only() {
        let mut noisy = feature(1, 0.9);
        noisy.activation = Some(ActivationSummary {
            examples: vec!["same".to_string(), "same".to_string()],
            semantic_similarity: None,
        });
        let mut low_context = feature(2, 0.1);
        low_context.explainers.get_mut("gpt").unwrap().detection = ScorerScoreSet {
            s1: Some(0.2),
            s2: None,
            s3: None,
        };
        let mut session = session(vec![noisy, low_context, feature(3, 0.5)]);

        session.set_cause_label(1, Some(CauseCategory::NoisyActivation));
        let backend = ScriptedBackend::default();
        backend.cause.borrow_mut().push(Ok(CauseSortResponse {
            sorted_features: vec![CauseSortedFeature {
                feature_id: 3,
                category_decision_margins: HashMap::from([
                    ("missed-N-gram".to_string(), 2.0),
                    ("missed-context".to_string(), 0.5),
                ]),
            }],
            total_features: 1,
        }));
        session.sort_cause_by_similarity(&backend).unwrap();

        session.auto_label_causes();
        // Manual label untouched.
        assert_eq!(session.cause_label(1), Some(CauseCategory::NoisyActivation));
        assert_eq!(
            session.cause_label_source(1),
            Some(SelectionSource::Manual)
        );
        // Feature 3 got the server argmax; feature 2 the local minimum rule.
        assert_eq!(session.cause_label(3), Some(CauseCategory::MissedNgram));
        assert_eq!(session.cause_label(2), Some(CauseCategory::MissedContext));
        assert_eq!(session.cause_label_source(2), Some(SelectionSource::Auto));
    }

    #[test]
    fn cause_sort_without_labels_is_skipped() {
        let mut session = session(vec![feature(1, 0.5)]);
        let backend = ScriptedBackend::default();
        let outcome = session.sort_cause_by_similarity(&backend).unwrap();
        assert_eq!(outcome, ActionOutcome::Skipped);
    }

    #[test]
    fn all_pair_keys_are_canonical_and_deduplicated() {
        let mut a = feature(7, 0.5);
        a.decoder_similarity.push(DecoderNeighbor {
            feature_id: 3,
            cosine_similarity: 0.8,
        });
        let mut b = feature(3, 0.5);
        b.decoder_similarity.push(DecoderNeighbor {
            feature_id: 7,
            cosine_similarity: 0.8,
        });
        let session = session(vec![a, b]);
        assert_eq!(session.all_pair_keys(), vec!["3-7".to_string()]);
    }
}
