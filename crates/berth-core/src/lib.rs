//! Core orchestration for Berth environment lifecycles.
//!
//! This crate ties together change classification, the per-project
//! environment model, process supervision, and the generation pipeline into
//! the `Engine` — the central API a host embeds to keep its projects'
//! runnable environments in sync with their build outputs. Model changes
//! are published to observers through a typed event bus.

pub mod artifacts;
pub mod changes;
pub mod engine;
pub mod events;
pub mod gate;
pub mod launcher;
pub mod model;
pub mod supervisor;

pub use artifacts::ArtifactSet;
pub use changes::{tree_indicates_change, ChangeDelta, ChangeKind};
pub use engine::Engine;
pub use events::{EventBus, ModelEvent, ModelObserver, SubscriptionId};
pub use gate::{CompatibilityGate, VersionCheck};
pub use launcher::{build_launch_descriptor, LaunchDescriptor};
pub use model::{EnvironmentSnapshot, GenerationStatus, ProjectChange};
pub use supervisor::{ProcessState, ProcessSupervisor};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] berth_schema::ConfigError),
    #[error("runtime error: {0}")]
    Runtime(#[from] berth_runtime::RuntimeError),
    #[error("environment id must not be empty")]
    EmptyEnvironmentId,
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("project '{0}' has no build directory configured")]
    NoBuildDirectory(String),
    #[error("build failed for environment '{0}': {1}")]
    BuildFailed(String, String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
