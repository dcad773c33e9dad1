//! User-defined tags and the roster holding them.
//!
//! At most one tag is active at a time. Switching the active tag saves the
//! outgoing tag's working candidate state so reactivating it later restores
//! the session exactly where the user left it.

use std::collections::HashSet;

use crate::scoring::matcher::{FeatureMatch, MatcherSettings};
use crate::scoring::signature::{MetricSignature, MetricWeights};
use crate::tagging::selection::SelectionSnapshot;

/// Ephemeral matcher/selection state carried per tag across activations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateWorkingState {
    pub settings: MatcherSettings,
    pub matches: Vec<FeatureMatch>,
    pub verification: SelectionSnapshot<u32>,
}

/// A user-defined quality/cause label with its matching criteria.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    pub id: u64,
    pub name: String,
    pub color: String,
    pub signature: MetricSignature,
    pub weights: Option<MetricWeights>,
    /// Features confirmed as members of this tag.
    pub feature_ids: HashSet<u32>,
    /// Features explicitly rejected for this tag; the matcher skips them.
    pub rejected_feature_ids: HashSet<u32>,
    /// Exemplars currently assembled for signature inference.
    pub working_feature_ids: Vec<u32>,
    /// A hand-edited signature preserved across inference runs.
    pub saved_manual_signature: Option<MetricSignature>,
    pub saved_candidate_state: Option<CandidateWorkingState>,
}

impl Tag {
    pub fn new(id: u64, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: color.into(),
            signature: MetricSignature::full(),
            weights: None,
            feature_ids: HashSet::new(),
            rejected_feature_ids: HashSet::new(),
            working_feature_ids: Vec::new(),
            saved_manual_signature: None,
            saved_candidate_state: None,
        }
    }
}

/// All tags plus the at-most-one active tag.
#[derive(Clone, Debug, Default)]
pub struct TagRoster {
    tags: Vec<Tag>,
    active: Option<u64>,
    next_id: u64,
}

impl TagRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: impl Into<String>, color: impl Into<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.tags.push(Tag::new(id, name, color));
        id
    }

    pub fn delete(&mut self, id: u64) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t.id != id);
        if self.active == Some(id) {
            self.active = None;
        }
        self.tags.len() != before
    }

    pub fn get(&self, id: u64) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Tag> {
        self.tags.iter_mut().find(|t| t.id == id)
    }

    pub fn active_id(&self) -> Option<u64> {
        self.active
    }

    pub fn active(&self) -> Option<&Tag> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut Tag> {
        let id = self.active?;
        self.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    /// Activate `id`, saving the outgoing tag's working state and returning
    /// the incoming tag's previously-saved state for the caller to restore.
    /// Returns `None` when the tag does not exist (active tag unchanged).
    pub fn activate(
        &mut self,
        id: u64,
        outgoing_state: Option<CandidateWorkingState>,
    ) -> Option<Option<CandidateWorkingState>> {
        self.get(id)?;
        if let Some(previous) = self.active
            && previous != id
            && let Some(tag) = self.get_mut(previous)
        {
            tag.saved_candidate_state = outgoing_state;
        }
        self.active = Some(id);
        let incoming = self
            .get_mut(id)
            .and_then(|tag| tag.saved_candidate_state.take());
        Some(incoming)
    }

    /// Deactivate the current tag, saving its working state in place.
    pub fn deactivate(&mut self, outgoing_state: Option<CandidateWorkingState>) {
        if let Some(id) = self.active.take()
            && let Some(tag) = self.get_mut(id)
        {
            tag.saved_candidate_state = outgoing_state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::signature::MetricValues;

    fn working_state(feature_id: u32) -> CandidateWorkingState {
        CandidateWorkingState {
            matches: vec![FeatureMatch {
                feature_id,
                distance: 0.0,
                score: 1.0,
                values: MetricValues::default(),
            }],
            ..CandidateWorkingState::default()
        }
    }

    #[test]
    fn at_most_one_tag_is_active() {
        let mut roster = TagRoster::new();
        let a = roster.create("splitting", "#ff0000");
        let b = roster.create("dead", "#00ff00");
        roster.activate(a, None);
        assert_eq!(roster.active_id(), Some(a));
        roster.activate(b, None);
        assert_eq!(roster.active_id(), Some(b));
    }

    #[test]
    fn switching_saves_outgoing_and_restores_incoming_state() {
        let mut roster = TagRoster::new();
        let a = roster.create("a", "#111111");
        let b = roster.create("b", "#222222");
        roster.activate(a, None);

        // Switch to b, saving a's working state.
        let incoming = roster.activate(b, Some(working_state(5))).unwrap();
        assert_eq!(incoming, None);
        assert_eq!(
            roster.get(a).unwrap().saved_candidate_state,
            Some(working_state(5))
        );

        // Switch back: a's saved state comes out and is cleared from the tag.
        let incoming = roster.activate(a, Some(working_state(9))).unwrap();
        assert_eq!(incoming, Some(working_state(5)));
        assert_eq!(roster.get(a).unwrap().saved_candidate_state, None);
        assert_eq!(
            roster.get(b).unwrap().saved_candidate_state,
            Some(working_state(9))
        );
    }

    #[test]
    fn delete_clears_active_when_needed() {
        let mut roster = TagRoster::new();
        let a = roster.create("a", "#111111");
        roster.activate(a, None);
        assert!(roster.delete(a));
        assert_eq!(roster.active_id(), None);
        assert!(!roster.delete(a));
    }

    #[test]
    fn activating_unknown_tag_is_a_no_op() {
        let mut roster = TagRoster::new();
        let a = roster.create("a", "#111111");
        roster.activate(a, None);
        assert!(roster.activate(99, None).is_none());
        assert_eq!(roster.active_id(), Some(a));
    }
}
