use crate::backend::{
    BuildArtifacts, BuildInvoker, BuildRequest, EnvironmentSlot, GeneratedConfigSource,
    OutputResync, ProcessHandles,
};
use crate::RuntimeError;
use berth_schema::{EnvironmentId, GeneratedConfig};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
struct MockState {
    live: HashSet<String>,
    configs: HashMap<EnvironmentId, GeneratedConfig>,
    artifacts: BuildArtifacts,
    fail_next_build: bool,
    fail_termination: bool,
    builds: Vec<BuildRequest>,
    resyncs: Vec<PathBuf>,
    terminations: Vec<(String, bool)>,
}

/// In-memory implementation of all four collaborator seams, with knobs for
/// driving failure paths and recorded invocations for assertions.
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Make `has_live_handle` answer `live` for the slot from now on.
    pub fn set_live(&self, slot: &EnvironmentSlot, live: bool) {
        self.with_state(|s| {
            if live {
                s.live.insert(slot.to_string());
            } else {
                s.live.remove(&slot.to_string());
            }
        });
    }

    /// Artifact paths returned by every subsequent successful build.
    pub fn set_build_artifacts(&self, artifacts: BuildArtifacts) {
        self.with_state(|s| s.artifacts = artifacts);
    }

    /// Launch document returned for the environment id.
    pub fn set_generated_config(&self, environment_id: EnvironmentId, config: GeneratedConfig) {
        self.with_state(|s| {
            s.configs.insert(environment_id, config);
        });
    }

    /// Make the next `execute_build` report a build-tool failure.
    pub fn fail_next_build(&self) {
        self.with_state(|s| s.fail_next_build = true);
    }

    /// Make every `request_termination` fail until reset.
    pub fn set_termination_failure(&self, fail: bool) {
        self.with_state(|s| s.fail_termination = fail);
    }

    pub fn build_invocations(&self) -> Vec<BuildRequest> {
        self.with_state(|s| s.builds.clone())
    }

    pub fn resync_invocations(&self) -> Vec<PathBuf> {
        self.with_state(|s| s.resyncs.clone())
    }

    /// Recorded termination requests as `(slot, force)` pairs.
    pub fn termination_invocations(&self) -> Vec<(String, bool)> {
        self.with_state(|s| s.terminations.clone())
    }
}

impl BuildInvoker for MockRuntime {
    fn execute_build(&self, request: &BuildRequest) -> Result<BuildArtifacts, RuntimeError> {
        self.with_state(|s| {
            s.builds.push(request.clone());
            if s.fail_next_build {
                s.fail_next_build = false;
                return Err(RuntimeError::BuildFailed(format!(
                    "mock build failure for {}",
                    request.environment_id
                )));
            }
            Ok(s.artifacts.clone())
        })
    }
}

impl OutputResync for MockRuntime {
    fn resync(&self, output_directory: &Path) -> Result<(), RuntimeError> {
        self.with_state(|s| s.resyncs.push(output_directory.to_path_buf()));
        Ok(())
    }
}

impl GeneratedConfigSource for MockRuntime {
    fn load(
        &self,
        _output_directory: &Path,
        environment_id: &EnvironmentId,
    ) -> Result<Option<GeneratedConfig>, RuntimeError> {
        Ok(self.with_state(|s| s.configs.get(environment_id).cloned()))
    }
}

impl ProcessHandles for MockRuntime {
    fn has_live_handle(&self, slot: &EnvironmentSlot) -> bool {
        self.with_state(|s| s.live.contains(&slot.to_string()))
    }

    fn request_termination(
        &self,
        slot: &EnvironmentSlot,
        force: bool,
    ) -> Result<(), RuntimeError> {
        self.with_state(|s| {
            s.terminations.push((slot.to_string(), force));
            if s.fail_termination {
                return Err(RuntimeError::TerminationFailed(
                    slot.to_string(),
                    "mock termination failure".to_owned(),
                ));
            }
            s.live.remove(&slot.to_string());
            Ok(())
        })
    }
}
