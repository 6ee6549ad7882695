//! Preflight checks before the build phase.
//!
//! Validates that the host has the tools a recipe build needs, so a missing
//! compiler is reported up front instead of halfway through configure.
//!
//! # Example
//!
//! ```rust
//! use diag_recipes::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("cmake") {
//!     println!("cmake not installed");
//! }
//!
//! let tools = &[("cmake", "cmake"), ("c++", "g++")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use crate::build::{find_cmake, CMake};
use crate::error::{Error, Result};

/// Check if a command exists on the host's PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Host tools a recipe build needs besides CMake.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("c++", "g++")];

/// Check that specific tools are available.
///
/// * `Ok(())` if all tools are found
/// * `Err` listing every missing tool and the package providing it
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect::<Vec<_>>();

    if !missing.is_empty() {
        let names = missing
            .iter()
            .map(|(tool, _)| *tool)
            .collect::<Vec<_>>()
            .join(", ");
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        return Err(Error::ToolNotFound {
            name: names,
            reason: format!("missing required host tools:\n{}", msg),
        });
    }

    Ok(())
}

/// Resolve CMake and check the rest of [`REQUIRED_TOOLS`].
pub fn check_host_tools() -> Result<CMake> {
    let cmake = find_cmake()?;
    check_required_tools(REQUIRED_TOOLS)?;
    Ok(cmake)
}
