//! Supervisor error types.

use std::path::PathBuf;

use snafu::Snafu;

use lattice_worker::WorkerError;

/// Errors raised by the supervisor and its collaborators.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub), module)]
pub enum SupervisorError {
    /// The module directory has no manifest file.
    #[snafu(display("no module manifest found in {}", dir.display()))]
    ManifestMissing { dir: PathBuf },

    /// Reading the manifest file failed.
    #[snafu(display("failed to read manifest in {}: {source}", dir.display()))]
    ManifestRead {
        dir: PathBuf,
        source: std::io::Error,
    },

    /// The manifest file is not valid JSON or is missing required fields.
    #[snafu(display("failed to parse manifest in {}: {source}", dir.display()))]
    ManifestParse {
        dir: PathBuf,
        source: serde_json::Error,
    },

    /// The manifest parsed but failed a validation rule.
    #[snafu(display("invalid manifest for module '{name}': {reason}"))]
    ManifestInvalid { name: String, reason: String },

    /// A module with this name is already loaded.
    #[snafu(display("module '{name}' is already loaded"))]
    AlreadyLoaded { name: String },

    /// No module with this name is loaded.
    #[snafu(display("module '{name}' is not loaded"))]
    NotLoaded { name: String },

    /// Enable requires the module to be in the disabled state.
    #[snafu(display("module '{name}' is not disabled (state: {state})"))]
    NotDisabled { name: String, state: String },

    /// The manifest names an entry point with no registered factory.
    #[snafu(display("module '{name}' names unknown entry point '{entry}'"))]
    UnknownEntry { name: String, entry: String },

    /// Spawning or talking to the execution unit failed.
    #[snafu(display("worker error for module '{name}': {source}"))]
    Worker { name: String, source: WorkerError },
}

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;
