//! External collaborator interfaces for Berth.
//!
//! The core never talks to a build tool, a filesystem cache, or an OS
//! process directly; it goes through the trait seams defined here:
//! `BuildInvoker` (opaque build execution), `OutputResync` (output-tree view
//! refresh), `GeneratedConfigSource` (launch document lookup), and
//! `ProcessHandles` (the supervisor's only window into live processes).
//! `DistConfigSource` is the file-backed config source; `MockRuntime`
//! implements all four seams for tests.

pub mod backend;
pub mod dist;
pub mod mock;

pub use backend::{
    BuildArtifacts, BuildInvoker, BuildRequest, Collaborators, EnvironmentSlot,
    GeneratedConfigSource, OutputResync, ProcessHandles, DEFAULT_SKIPPED_PHASES,
};
pub use dist::DistConfigSource;
pub use mock::MockRuntime;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("build invocation failed: {0}")]
    BuildFailed(String),
    #[error("termination request failed for '{0}': {1}")]
    TerminationFailed(String, String),
    #[error("output resynchronization failed: {0}")]
    ResyncFailed(String),
    #[error("generated configuration error: {0}")]
    Config(#[from] berth_schema::ConfigError),
}
