//! Filesystem change classification.
//!
//! The host delivers change notifications as a tree mirroring the
//! filesystem hierarchy; [`tree_indicates_change`] decides whether a batch
//! is relevant to a project's build outputs. The policy is deliberately
//! biased toward false positives: additions, removals, and metadata events
//! count even inside the output directory, where plain content edits are
//! filtered against the artifact set. An extra rebuild is cheap; a missed
//! one is not.

use crate::artifacts::ArtifactSet;
use std::ops::BitOr;
use std::path::{Path, PathBuf};

/// Bitmask describing what happened to one filesystem entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeKind(u8);

impl ChangeKind {
    /// No change at this node; the entry merely parents changed children.
    pub const NONE: Self = Self(0);
    /// The entry's content changed.
    pub const CONTENT: Self = Self(1);
    /// The entry was created.
    pub const ADDED: Self = Self(1 << 1);
    /// The entry was deleted.
    pub const REMOVED: Self = Self(1 << 2);
    /// Only metadata (permissions, timestamps) changed.
    pub const METADATA: Self = Self(1 << 3);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the mask carries any bit beyond plain content change.
    /// Such events bypass the artifact-set filter inside the output
    /// directory.
    pub fn beyond_content(self) -> bool {
        self.0 & !Self::CONTENT.0 != 0
    }
}

impl BitOr for ChangeKind {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One node of a hierarchical filesystem-change notification. Transient:
/// consumed once per notification cycle, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDelta {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub children: Vec<ChangeDelta>,
}

impl ChangeDelta {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: ChangeDelta) -> Self {
        self.children.push(child);
        self
    }
}

/// Whether the delta tree contains any change relevant to the project.
///
/// Recursive descent with a sticky "inside the output directory" flag: the
/// flag flips on the node whose path equals `output_directory` (not on set
/// membership — intermediate directories are not artifacts) and stays set
/// for all descendants. Short-circuits on the first signalling node.
pub fn tree_indicates_change(
    root: &ChangeDelta,
    output_directory: &Path,
    artifacts: &ArtifactSet,
) -> bool {
    signals_below(root, output_directory, artifacts, false)
}

fn signals_below(
    node: &ChangeDelta,
    output_directory: &Path,
    artifacts: &ArtifactSet,
    parent_inside: bool,
) -> bool {
    let inside = parent_inside || node.path == output_directory;

    if node_signals(node, inside, artifacts) {
        return true;
    }

    node.children
        .iter()
        .any(|child| signals_below(child, output_directory, artifacts, inside))
}

fn node_signals(node: &ChangeDelta, inside_output: bool, artifacts: &ArtifactSet) -> bool {
    if node.kind.is_empty() {
        return false;
    }
    // Inside the output directory a pure content edit must hit a tracked
    // artifact; anything stronger (added/removed/metadata) always counts.
    !inside_output || artifacts.contains(&node.path) || node.kind.beyond_content()
}
