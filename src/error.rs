//! Error types for the recipe pipeline.
//!
//! Only fatal conditions are represented here. A missing shared source tree
//! and packaging rules that match nothing are normal outcomes and never
//! surface as errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal pipeline failure, surfaced unmodified to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Removing or copying the shared tree into an isolated folder failed.
    #[error("synchronizing '{}' into '{}' failed while {action}", source_path.display(), destination.display())]
    Sync {
        source_path: PathBuf,
        destination: PathBuf,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The external build tool could not be started.
    #[error("failed to launch build tool '{}' for {step}", program.display())]
    BuildToolSpawn {
        program: PathBuf,
        step: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The external build tool ran but reported failure.
    #[error("build tool {step} failed with exit code {code}")]
    BuildTool { step: &'static str, code: i32 },

    /// No usable build tool binary was found.
    #[error("could not find build tool '{name}': {reason}")]
    ToolNotFound { name: String, reason: String },

    /// Copying a harvested artifact into the package folder failed.
    #[error("packaging '{}' into '{}' failed", from.display(), to.display())]
    Package {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A packaging rule carries a glob that cannot be compiled.
    #[error("invalid glob pattern '{pattern}'")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// A recipe declaration is invalid.
    #[error("invalid recipe '{}': {message}", path.display())]
    Recipe { path: PathBuf, message: String },

    /// The isolated folders of this recipe are held by another invocation.
    #[error("isolated folders '{}' are locked by another invocation", path.display())]
    Locked { path: PathBuf },

    /// Any other I/O failure, with what was being done at the time.
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serializing package manifest")]
    Manifest(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn recipe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Recipe {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for failures reported by (or while launching) the external build tool.
    pub fn is_build_tool_failure(&self) -> bool {
        matches!(
            self,
            Error::BuildTool { .. } | Error::BuildToolSpawn { .. } | Error::ToolNotFound { .. }
        )
    }

    /// True for failures raised while synchronizing the shared tree.
    pub fn is_sync_failure(&self) -> bool {
        matches!(self, Error::Sync { .. })
    }
}
