//! Out-of-tree builds for components that share one source tree.
//!
//! Several independently versioned components (`ara-diag`,
//! `diagnostic-manager`, `TestApp`) draw from a single `dev/` tree that sits
//! next to their recipe directories. This crate makes an isolated,
//! reproducible build of each one possible:
//!
//! - **Recipes** - declarative descriptions of each component ([`recipe`])
//! - **Synchronization** - materialize the shared tree in isolated folders ([`pipeline`])
//! - **Build tool** - configure and compile with CMake ([`build`])
//! - **Packaging** - harvest headers and libraries by rule table ([`pipeline::package`])
//! - **Harness** - lay out isolated folders and run the lifecycle ([`harness`])
//!
//! # Architecture
//!
//! ```text
//! recipe.toml / builtin ──► Recipe
//!                              │
//! harness::create ─────────────┤
//!     │                        ▼
//!     ├── export_sources   sync ../dev ─► export/dev, exports ─► export/
//!     ├── source           export/ ─► source/, sync ../dev ─► source/dev
//!     ├── build            source/ ─► build/, cmake -S build -B build
//!     └── package          rules ─► package/{include,lib}, package-info.json
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use diag_recipes::{find_cmake, harness, recipe, Settings};
//!
//! # fn main() -> diag_recipes::Result<()> {
//! let loaded = recipe::load_builtin("ara-diag", Path::new("ara-diag/buildconfig"))?;
//! let cmake = find_cmake()?;
//! let cache_root = harness::default_cache_root();
//! let report = harness::create(&loaded, &cmake, &Settings::detect(), &cache_root)?;
//! println!("{}", report.package_folder.display());
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod error;
pub mod harness;
pub mod lifecycle;
pub mod manifest;
pub mod pipeline;
pub mod preflight;
pub mod recipe;

pub use build::{find_cmake, BuildTool, CMake, Settings, SettingsAxis};
pub use error::{Error, Result};
pub use lifecycle::{Lifecycle, LifecyclePhase, PackageInfo, RecipeLifecycle};
pub use recipe::{LoadedRecipe, Recipe};
