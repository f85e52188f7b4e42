use crate::CoreError;
use berth_schema::{dist_directory, ClasspathSpec, EnvironmentId, GeneratedConfig};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// VM options carrying this token configure a debug transport owned by the
/// host; they must not leak into the launched process.
const DEBUG_TRANSPORT_TOKEN: &str = "Xrunjdwp";

/// File extension of archive files picked up by a wildcard classpath.
const ARCHIVE_EXTENSION: &str = "jar";

/// Everything needed to run one generated environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchDescriptor {
    pub environment_id: EnvironmentId,
    pub project_name: String,
    pub working_directory: PathBuf,
    pub main_class: String,
    pub program_arguments: Vec<String>,
    pub vm_arguments: Vec<String>,
    pub classpath: Vec<PathBuf>,
}

/// Translate a generated launch document into a launch descriptor.
///
/// The working directory is the environment's dist directory. A `*`
/// classpath expands to the archive files directly under it (sorted for
/// determinism); an explicit colon-delimited list resolves each entry
/// against it.
pub fn build_launch_descriptor(
    project_name: &str,
    environment_id: &EnvironmentId,
    build_directory: &Path,
    config: &GeneratedConfig,
) -> Result<LaunchDescriptor, CoreError> {
    let working_directory = dist_directory(build_directory, environment_id);

    let vm_arguments: Vec<String> = config
        .vm_arguments
        .iter()
        .filter(|option| !option.contains(DEBUG_TRANSPORT_TOKEN))
        .cloned()
        .collect();

    let classpath = match config.classpath_spec() {
        ClasspathSpec::Wildcard => archive_files(&working_directory)?,
        ClasspathSpec::Explicit(entries) => entries
            .iter()
            .map(|entry| working_directory.join(entry))
            .collect(),
    };

    debug!(
        "launch descriptor for {environment_id}: main class {}, {} classpath entries",
        config.main_class,
        classpath.len()
    );

    Ok(LaunchDescriptor {
        environment_id: environment_id.clone(),
        project_name: project_name.to_owned(),
        working_directory,
        main_class: config.main_class.clone(),
        program_arguments: config.program_arguments.clone(),
        vm_arguments,
        classpath,
    })
}

/// Archive files directly under the root, non-recursive.
fn archive_files(root: &Path) -> Result<Vec<PathBuf>, CoreError> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut archives = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION) {
            archives.push(path);
        }
    }
    archives.sort();
    Ok(archives)
}
