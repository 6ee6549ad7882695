//! External build tool invocation.
//!
//! The pipeline only ever talks to a build tool through [`BuildTool`]: one
//! configure call with a project root and key/value definitions, then one
//! build call. Everything the tool does internally is opaque.
//!
//! - [`cmake`] - the CMake driver and binary resolution
//! - [`settings`] - settings axes and the concrete values a build uses

pub mod cmake;
pub mod settings;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use cmake::{find_cmake, CMake};
pub use settings::{Settings, SettingsAxis};

/// State handed from [`BuildTool::configure`] to [`BuildTool::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredBuild {
    /// Project root the tool was configured against.
    pub source_dir: PathBuf,
    /// Directory the tool writes its outputs into.
    pub build_dir: PathBuf,
    pub definitions: BTreeMap<String, String>,
}

/// An external build tool driven by the build phase.
pub trait BuildTool {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Configure a build of `source_dir` into `build_dir`.
    ///
    /// A non-success result from the tool is fatal.
    fn configure(
        &self,
        source_dir: &Path,
        build_dir: &Path,
        definitions: &BTreeMap<String, String>,
    ) -> Result<ConfiguredBuild>;

    /// Compile and link a configured build. Blocks until the tool exits.
    fn build(&self, configured: &ConfiguredBuild) -> Result<()>;
}
