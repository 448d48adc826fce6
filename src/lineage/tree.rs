//! Tagged documentation tree.
//!
//! A column's documentation is an ordered sequence of [`DocEntry`]s: a leaf
//! is one annotation string, a branch is the merged trail of one contributing
//! input column. Nesting depth equals the number of merge operations the
//! column has passed through without intervening flattening.
//!
//! The serde representation is untagged, so the JSON form is the plain
//! nested-list-of-strings shape found in sidecar files:
//! `[["Imported"], ["Imported"], "Column A plus B."]`.

use serde::{Deserialize, Serialize};

/// Marker appended when a column is first loaded into a session.
pub const IMPORTED: &str = "Imported";

/// Marker seeded when an undocumented column appears in a saved dataframe.
pub const CREATED: &str = "Created";

/// Marker appended when a documented column is absent from a saved dataframe.
pub const DROPPED: &str = "Dropped";

/// Prefix of origin assertions recorded by
/// [`Documenter::document_origin`](crate::lineage::Documenter::document_origin).
pub const ORIGIN_PREFIX: &str = "origin: ";

/// Maximum branch depth accepted by the recursive traversals. Honest trails
/// never get near this; a sidecar nested deeper is treated as truncated.
const MAX_DEPTH: usize = 64;

/// One entry in a column's documentation trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocEntry {
    /// A literal annotation.
    Note(String),
    /// The trail of one contributing input column, frozen at merge time.
    Merge(Vec<DocEntry>),
}

impl DocEntry {
    pub fn note(text: impl Into<String>) -> Self {
        Self::Note(text.into())
    }

    pub fn merge(entries: impl Into<Vec<DocEntry>>) -> Self {
        Self::Merge(entries.into())
    }

    pub fn is_note(&self, text: &str) -> bool {
        matches!(self, Self::Note(s) if s == text)
    }
}

/// A column's full documentation trail.
pub type DocTrail = Vec<DocEntry>;

/// Flatten a trail into its annotation strings, depth-first, preserving
/// order. Iterative with an explicit stack.
pub fn flatten(trail: &[DocEntry]) -> Vec<String> {
    let mut out = Vec::new();
    // Stack of (entries, next index) frames.
    let mut stack: Vec<(&[DocEntry], usize)> = vec![(trail, 0)];
    while let Some((entries, idx)) = stack.pop() {
        if idx >= entries.len() {
            continue;
        }
        stack.push((entries, idx + 1));
        match &entries[idx] {
            DocEntry::Note(s) => out.push(s.clone()),
            DocEntry::Merge(sub) => stack.push((sub.as_slice(), 0)),
        }
    }
    out
}

/// Keep only notes starting with `prefix`, preserving the branch structure.
/// Branches are kept (possibly emptied) so merge arity stays visible.
pub fn filter_by_prefix(trail: &[DocEntry], prefix: &str) -> DocTrail {
    filter_at_depth(trail, prefix, 0)
}

fn filter_at_depth(trail: &[DocEntry], prefix: &str, depth: usize) -> DocTrail {
    if depth > MAX_DEPTH {
        return Vec::new();
    }
    trail
        .iter()
        .filter_map(|entry| match entry {
            DocEntry::Note(s) if s.starts_with(prefix) => Some(DocEntry::Note(s.clone())),
            DocEntry::Note(_) => None,
            DocEntry::Merge(sub) => {
                Some(DocEntry::Merge(filter_at_depth(sub, prefix, depth + 1)))
            }
        })
        .collect()
}

/// Remove a leading `prefix` from every note, preserving structure.
pub fn strip_prefix(trail: &[DocEntry], prefix: &str) -> DocTrail {
    strip_at_depth(trail, prefix, 0)
}

fn strip_at_depth(trail: &[DocEntry], prefix: &str, depth: usize) -> DocTrail {
    if depth > MAX_DEPTH {
        return Vec::new();
    }
    trail
        .iter()
        .map(|entry| match entry {
            DocEntry::Note(s) => {
                DocEntry::Note(s.strip_prefix(prefix).unwrap_or(s).to_owned())
            }
            DocEntry::Merge(sub) => DocEntry::Merge(strip_at_depth(sub, prefix, depth + 1)),
        })
        .collect()
}
