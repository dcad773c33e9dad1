//! Selected/rejected/unsure transitions with manual-over-auto precedence.
//!
//! Absence from the map is the "unsure" state. The single toggle primitive
//! walks the cycle unsure → selected → rejected → unsure; higher-level
//! actions compose it. Automatic bulk tagging only ever fills keys that have
//! no entry at all, so a manual (or earlier auto) decision is never
//! overwritten by an automatic process.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// A decided selection state; "unsure" is the absence of an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionState {
    Selected,
    Rejected,
}

/// Who decided: the user, or an automatic process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionSource {
    Manual,
    Auto,
}

/// Snapshot of a selection map, used by commit history.
#[derive(Clone, Debug, Default)]
pub struct SelectionSnapshot<K> {
    pub states: HashMap<K, SelectionState>,
    pub sources: HashMap<K, SelectionSource>,
}

// Manual impl: comparing the HashMap fields needs `K: Eq + Hash`, which a
// derived `PartialEq` would not require.
impl<K: Eq + Hash> PartialEq for SelectionSnapshot<K> {
    fn eq(&self, other: &Self) -> bool {
        self.states == other.states && self.sources == other.sources
    }
}

/// Selection states keyed by feature id or pair key.
#[derive(Clone, Debug, Default)]
pub struct SelectionMap<K> {
    states: HashMap<K, SelectionState>,
    sources: HashMap<K, SelectionSource>,
}

impl<K: Eq + Hash> PartialEq for SelectionMap<K> {
    fn eq(&self, other: &Self) -> bool {
        self.states == other.states && self.sources == other.sources
    }
}

impl<K: Eq + Hash + Clone> SelectionMap<K> {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            sources: HashMap::new(),
        }
    }

    pub fn state(&self, key: &K) -> Option<SelectionState> {
        self.states.get(key).copied()
    }

    pub fn source(&self, key: &K) -> Option<SelectionSource> {
        self.sources.get(key).copied()
    }

    pub fn is_tagged(&self, key: &K) -> bool {
        self.states.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Keys currently in the given state.
    pub fn keys_in_state(&self, state: SelectionState) -> Vec<K> {
        self.states
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Advance one step through unsure → selected → rejected → unsure.
    /// Always records a manual source; clearing back to unsure removes the
    /// source as well.
    pub fn toggle(&mut self, key: K) -> Option<SelectionState> {
        let next = match self.states.get(&key) {
            None => Some(SelectionState::Selected),
            Some(SelectionState::Selected) => Some(SelectionState::Rejected),
            Some(SelectionState::Rejected) => None,
        };
        match next {
            Some(state) => {
                self.states.insert(key.clone(), state);
                self.sources.insert(key, SelectionSource::Manual);
            }
            None => {
                self.states.remove(&key);
                self.sources.remove(&key);
            }
        }
        next
    }

    /// Reach `target` from any current state by issuing 0–2 toggles.
    pub fn set_manual(&mut self, key: K, target: Option<SelectionState>) {
        for _ in 0..3 {
            if self.state(&key) == target {
                return;
            }
            self.toggle(key.clone());
        }
    }

    /// Write a decided state with an explicit source, bypassing the cycle.
    /// Used by threshold application, which records the user's confirmation.
    pub fn set_with_source(&mut self, key: K, state: SelectionState, source: SelectionSource) {
        self.states.insert(key.clone(), state);
        self.sources.insert(key, source);
    }

    /// Populate untagged keys only: any key that already has an entry,
    /// manual or auto, is left untouched. Returns how many keys were tagged.
    pub fn auto_fill(&mut self, entries: impl IntoIterator<Item = (K, SelectionState)>) -> usize {
        let mut tagged = 0usize;
        for (key, state) in entries {
            if self.states.contains_key(&key) {
                continue;
            }
            self.states.insert(key.clone(), state);
            self.sources.insert(key, SelectionSource::Auto);
            tagged += 1;
        }
        tagged
    }

    /// Full bulk replacement, used by commit restore.
    pub fn restore(&mut self, snapshot: SelectionSnapshot<K>) {
        self.states = snapshot.states;
        self.sources = snapshot.sources;
    }

    pub fn snapshot(&self) -> SelectionSnapshot<K> {
        SelectionSnapshot {
            states: self.states.clone(),
            sources: self.sources.clone(),
        }
    }
}
