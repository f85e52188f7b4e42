use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The set of absolute paths constituting one project's published build
/// outputs as of the last successful build: the primary artifact (absent
/// for packaging types that produce none) plus attached artifacts.
///
/// Replaced wholesale after each build, never merged incrementally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub primary: Option<PathBuf>,
    pub attached: Vec<PathBuf>,
}

impl ArtifactSet {
    pub fn new(primary: Option<PathBuf>, attached: Vec<PathBuf>) -> Self {
        Self { primary, attached }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.attached.is_empty()
    }

    /// Whether the path is one of the tracked artifacts.
    pub fn contains(&self, path: &Path) -> bool {
        self.primary.as_deref() == Some(path) || self.attached.iter().any(|a| a == path)
    }

    /// Whether a change to the path is relevant to the project's outputs.
    ///
    /// Everything outside the build output directory is source and always
    /// relevant; inside it, only the tracked artifacts matter — the rest is
    /// intermediate build noise.
    pub fn is_relevant(&self, path: &Path, output_directory: &Path) -> bool {
        !path.starts_with(output_directory) || self.contains(path)
    }
}

impl From<berth_runtime::BuildArtifacts> for ArtifactSet {
    fn from(produced: berth_runtime::BuildArtifacts) -> Self {
        Self::new(produced.primary, produced.attached)
    }
}
