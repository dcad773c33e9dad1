//! Bounded commit history over feature selection snapshots.
//!
//! The log is a ring with a pinned head: index 0 is always the `Initial`
//! commit, and when the log is full the oldest non-initial commit (index 1)
//! is evicted. Apply/TagAll flows snapshot the pre-change state into the
//! head commit before mutating, then push a post-change commit.

use std::collections::VecDeque;

use crate::tagging::selection::SelectionSnapshot;

/// Maximum retained commits, including the initial one.
pub const MAX_COMMITS: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitKind {
    Initial,
    Apply,
    TagAll,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Commit {
    pub id: u64,
    pub kind: CommitKind,
    pub snapshot: SelectionSnapshot<u32>,
}

#[derive(Clone, Debug)]
pub struct CommitLog {
    commits: VecDeque<Commit>,
    next_id: u64,
}

impl CommitLog {
    /// Start a log with the pinned initial snapshot.
    pub fn new(initial: SelectionSnapshot<u32>) -> Self {
        let mut commits = VecDeque::with_capacity(MAX_COMMITS);
        commits.push_back(Commit {
            id: 0,
            kind: CommitKind::Initial,
            snapshot: initial,
        });
        Self {
            commits,
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Commit> {
        self.commits.get(index)
    }

    pub fn head(&self) -> &Commit {
        // The initial commit is never evicted, so the log is never empty.
        self.commits.back().unwrap_or_else(|| unreachable!())
    }

    pub fn find(&self, id: u64) -> Option<&Commit> {
        self.commits.iter().find(|c| c.id == id)
    }

    /// Overwrite the head commit's snapshot with the current (pre-change)
    /// state, so restoring the head lands just before the next mutation.
    pub fn update_head_snapshot(&mut self, snapshot: SelectionSnapshot<u32>) {
        if let Some(head) = self.commits.back_mut() {
            head.snapshot = snapshot;
        }
    }

    /// Append a post-change commit, evicting the oldest non-initial commit
    /// once the log is full. Returns the new commit id.
    pub fn push(&mut self, kind: CommitKind, snapshot: SelectionSnapshot<u32>) -> u64 {
        debug_assert!(kind != CommitKind::Initial);
        if self.commits.len() >= MAX_COMMITS {
            self.commits.remove(1);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.commits.push_back(Commit { id, kind, snapshot });
        id
    }
}
