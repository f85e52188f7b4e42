use crate::RuntimeError;
use berth_schema::{EnvironmentId, GeneratedConfig, ProjectId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Build phases the orchestrator asks the build tool to skip. Regeneration
/// must not re-run the project's test phase.
pub const DEFAULT_SKIPPED_PHASES: &[&str] = &["test"];

/// One build invocation: which project/environment to build and which
/// lifecycle phases to leave out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildRequest {
    pub project: ProjectId,
    pub project_name: String,
    pub environment_id: EnvironmentId,
    pub skip_phases: HashSet<String>,
}

impl BuildRequest {
    pub fn new(
        project: ProjectId,
        project_name: impl Into<String>,
        environment_id: EnvironmentId,
    ) -> Self {
        Self {
            project,
            project_name: project_name.into(),
            environment_id,
            skip_phases: DEFAULT_SKIPPED_PHASES
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
        }
    }
}

/// Artifact paths a successful build produced: the primary artifact (absent
/// for packaging types that produce none) plus any attached artifacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildArtifacts {
    pub primary: Option<PathBuf>,
    pub attached: Vec<PathBuf>,
}

/// Addresses one environment's runtime slot. Rendered as
/// `environment_id/project_name`, which is unique across projects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentSlot {
    pub environment_id: EnvironmentId,
    pub project_name: String,
}

impl EnvironmentSlot {
    pub fn new(environment_id: EnvironmentId, project_name: impl Into<String>) -> Self {
        Self {
            environment_id,
            project_name: project_name.into(),
        }
    }
}

impl fmt::Display for EnvironmentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.environment_id, self.project_name)
    }
}

/// Opaque external build execution. Synchronous from the caller's
/// perspective and potentially long-running.
pub trait BuildInvoker: Send + Sync {
    /// Run the build for one project/environment. A build-tool-reported
    /// failure is an `Err(RuntimeError::BuildFailed)`; success returns the
    /// artifact paths the build produced.
    fn execute_build(&self, request: &BuildRequest) -> Result<BuildArtifacts, RuntimeError>;
}

/// Refreshes any external view or cache of an output directory so that
/// subsequent artifact resolution sees up-to-date files.
pub trait OutputResync: Send + Sync {
    fn resync(&self, output_directory: &Path) -> Result<(), RuntimeError>;
}

/// Looks up the generated launch document of one environment, if generation
/// has produced one.
pub trait GeneratedConfigSource: Send + Sync {
    fn load(
        &self,
        output_directory: &Path,
        environment_id: &EnvironmentId,
    ) -> Result<Option<GeneratedConfig>, RuntimeError>;
}

/// The process supervisor's only window into OS-level processes.
pub trait ProcessHandles: Send + Sync {
    /// Whether a live process handle currently exists for the slot.
    fn has_live_handle(&self, slot: &EnvironmentSlot) -> bool;

    /// Ask the external process to terminate. `force` requests a hard kill
    /// rather than a graceful shutdown.
    fn request_termination(&self, slot: &EnvironmentSlot, force: bool)
        -> Result<(), RuntimeError>;
}

/// The four collaborator seams the engine is constructed over.
#[derive(Clone)]
pub struct Collaborators {
    pub build: Arc<dyn BuildInvoker>,
    pub resync: Arc<dyn OutputResync>,
    pub config: Arc<dyn GeneratedConfigSource>,
    pub process: Arc<dyn ProcessHandles>,
}

impl Collaborators {
    /// Build the bundle from a single object implementing all four seams,
    /// which is how tests wire a `MockRuntime`.
    pub fn shared<T>(runtime: Arc<T>) -> Self
    where
        T: BuildInvoker + OutputResync + GeneratedConfigSource + ProcessHandles + 'static,
    {
        Self {
            build: Arc::clone(&runtime) as Arc<dyn BuildInvoker>,
            resync: Arc::clone(&runtime) as Arc<dyn OutputResync>,
            config: Arc::clone(&runtime) as Arc<dyn GeneratedConfigSource>,
            process: runtime as Arc<dyn ProcessHandles>,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_skips_test_phase_by_default() {
        let request = BuildRequest::new(
            ProjectId::new("p1"),
            "demo",
            EnvironmentId::new("equinox-test"),
        );
        assert!(request.skip_phases.contains("test"));
        assert_eq!(request.skip_phases.len(), 1);
    }

    #[test]
    fn slot_renders_environment_then_project() {
        let slot = EnvironmentSlot::new(EnvironmentId::new("equinox-test"), "demo");
        assert_eq!(slot.to_string(), "equinox-test/demo");
    }
}
