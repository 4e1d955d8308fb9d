//! Error types for buildenv-core

use thiserror::Error;

/// Errors that can occur while preparing a build environment.
///
/// Any of these failing the pipeline marks the build failed and leaves the
/// store untouched for that run. Non-fatal conditions (unresolved
/// placeholders, a secret provider that cannot list its entries) are logged
/// instead of surfacing here.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("injection script failed with exit code {code}")]
    ScriptFailed { code: i32 },

    #[error("property source '{path}' failed: {message}")]
    Properties { path: String, message: String },

    #[error("contributor '{name}' failed: {message}")]
    Contribution { name: String, message: String },

    #[error("environment store error: {0}")]
    Store(String),

    #[error("no environment recorded for parent build '{0}'")]
    MissingParent(String),

    #[error("build was cancelled before the environment was persisted")]
    Cancelled,

    #[error("platform error: {0}")]
    Platform(#[from] buildenv_platform::PlatformError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
