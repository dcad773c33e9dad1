//! Tag state: selection transitions, commit history, and the tag roster.

pub mod commits;
pub mod selection;
pub mod tags;
