//! Source synchronization and artifact packaging.
//!
//! - [`paths`] - where the shared tree is and where it is materialized
//! - [`sync`] - idempotent remove-then-copy of the shared tree
//! - [`package`] - rule-driven harvesting of build outputs

pub mod package;
pub mod paths;
pub mod sync;

pub use package::{package_artifacts, PackageRoots, PackageRule, PackagedArtifact, RuleOrigin};
pub use paths::{resolve_destination, resolve_shared_tree};
pub use sync::{synchronize, SyncOperation};
