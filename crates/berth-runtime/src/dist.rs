use crate::backend::GeneratedConfigSource;
use crate::RuntimeError;
use berth_schema::{launch_config_path, parse_launch_file, EnvironmentId, GeneratedConfig};
use std::path::Path;
use tracing::debug;

/// File-backed [`GeneratedConfigSource`] reading the launch document a
/// generation run leaves under `<output_dir>/dist/<environment_id>/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistConfigSource;

impl DistConfigSource {
    pub fn new() -> Self {
        Self
    }
}

impl GeneratedConfigSource for DistConfigSource {
    fn load(
        &self,
        output_directory: &Path,
        environment_id: &EnvironmentId,
    ) -> Result<Option<GeneratedConfig>, RuntimeError> {
        let path = launch_config_path(output_directory, environment_id);
        if !path.is_file() {
            debug!("no launch document at {}", path.display());
            return Ok(None);
        }
        let config = parse_launch_file(&path)?;
        debug!("loaded launch document from {}", path.display());
        Ok(Some(config))
    }
}
