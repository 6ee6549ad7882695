//! CMake driver.
//!
//! Resolution order for the binary:
//! 1. `DIAG_RECIPES_CMAKE` env var (path to an executable)
//! 2. `cmake` on the system PATH

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use super::{BuildTool, ConfiguredBuild};
use crate::error::{Error, Result};

/// Environment variable overriding the CMake binary.
pub const CMAKE_ENV: &str = "DIAG_RECIPES_CMAKE";

/// Definition that selects the single-config build type.
pub const BUILD_TYPE_DEFINITION: &str = "CMAKE_BUILD_TYPE";

/// A resolved CMake binary.
#[derive(Debug, Clone)]
pub struct CMake {
    program: PathBuf,
    /// Arguments placed before every CMake invocation (for wrappers).
    launcher_args: Vec<OsString>,
}

impl CMake {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            launcher_args: Vec::new(),
        }
    }

    /// Run `program` with `args` first, e.g. `sh wrapper.sh <cmake args>`.
    pub fn with_launcher_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.launcher_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.launcher_args);
        cmd
    }

    fn run(&self, mut cmd: Command, step: &'static str) -> Result<()> {
        debug!(program = %self.program.display(), ?cmd, step, "running build tool");
        let status = cmd
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| Error::BuildToolSpawn {
                program: self.program.clone(),
                step,
                source,
            })?;

        if !status.success() {
            return Err(Error::BuildTool {
                step,
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

impl BuildTool for CMake {
    fn name(&self) -> &str {
        "cmake"
    }

    fn configure(
        &self,
        source_dir: &Path,
        build_dir: &Path,
        definitions: &BTreeMap<String, String>,
    ) -> Result<ConfiguredBuild> {
        fs::create_dir_all(build_dir).map_err(|err| {
            Error::io(
                format!("creating build directory '{}'", build_dir.display()),
                err,
            )
        })?;

        let mut cmd = self.command();
        cmd.arg("-S").arg(source_dir).arg("-B").arg(build_dir);
        for (key, value) in definitions {
            cmd.arg(format!("-D{}={}", key, value));
        }

        info!(
            source = %source_dir.display(),
            build = %build_dir.display(),
            definitions = definitions.len(),
            "configuring"
        );
        self.run(cmd, "configure")?;

        Ok(ConfiguredBuild {
            source_dir: source_dir.to_path_buf(),
            build_dir: build_dir.to_path_buf(),
            definitions: definitions.clone(),
        })
    }

    fn build(&self, configured: &ConfiguredBuild) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("--build").arg(&configured.build_dir);
        if let Some(build_type) = configured.definitions.get(BUILD_TYPE_DEFINITION) {
            cmd.arg("--config").arg(build_type);
        }

        info!(build = %configured.build_dir.display(), "building");
        self.run(cmd, "build")
    }
}

/// Find the CMake binary using the resolution order.
pub fn find_cmake() -> Result<CMake> {
    resolve_cmake(std::env::var_os(CMAKE_ENV).map(PathBuf::from))
}

fn resolve_cmake(override_path: Option<PathBuf>) -> Result<CMake> {
    if let Some(path) = override_path {
        if !path.exists() {
            return Err(Error::ToolNotFound {
                name: "cmake".to_string(),
                reason: format!("{} points to non-existent path: {}", CMAKE_ENV, path.display()),
            });
        }
        if !is_executable(&path) {
            return Err(Error::ToolNotFound {
                name: "cmake".to_string(),
                reason: format!(
                    "{} points to a file that is not executable: {}",
                    CMAKE_ENV,
                    path.display()
                ),
            });
        }
        return Ok(CMake::new(path));
    }

    which::which("cmake")
        .map(CMake::new)
        .map_err(|err| Error::ToolNotFound {
            name: "cmake".to_string(),
            reason: format!("not on PATH ({err}); install cmake or set {CMAKE_ENV}"),
        })
}

fn is_executable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => {
            if !meta.is_file() {
                return false;
            }
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if meta.permissions().mode() & 0o111 == 0 {
                    return false;
                }
            }
            true
        }
        Err(_) => false,
    }
}
