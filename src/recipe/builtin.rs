//! The recipes shipped with the crate.
//!
//! These mirror the three components that share one `dev/` tree: the
//! `ara-diag` library, the `diagnostic-manager` built on the same tree, and
//! the `TestApp` functional test application.

use std::collections::BTreeMap;

use super::{Recipe, DEFAULT_TREE_SUBDIR};
use crate::build::SettingsAxis;
use crate::pipeline::package::PackageRule;

/// Relative location of the shared tree seen from a `buildconfig/` directory.
pub const SHARED_TREE: &str = "../dev";

/// Build definition `ara-diag` receives the materialized tree path through.
pub const ARA_DEV_ROOT: &str = "ARA_DEV_ROOT";

/// Every built-in recipe, in listing order.
pub fn all() -> Vec<Recipe> {
    vec![ara_diag(), diagnostic_manager(), test_app()]
}

/// Names of the built-in recipes.
pub fn names() -> Vec<String> {
    all().into_iter().map(|recipe| recipe.name).collect()
}

/// Look up a built-in recipe by name (case-insensitive).
pub fn find(name: &str) -> Option<Recipe> {
    all()
        .into_iter()
        .find(|recipe| recipe.name.eq_ignore_ascii_case(name.trim()))
}

pub fn ara_diag() -> Recipe {
    Recipe {
        name: "ara-diag".to_string(),
        version: "0.1".to_string(),
        settings: SettingsAxis::ALL.to_vec(),
        shared_tree: Some(SHARED_TREE.to_string()),
        tree_subdir: DEFAULT_TREE_SUBDIR.to_string(),
        exports: vec!["CMakeLists.txt".to_string()],
        build_definitions: BTreeMap::new(),
        tree_root_definition: Some(ARA_DEV_ROOT.to_string()),
        package_rules: vec![
            PackageRule::new("*.h", "include").from_tree("inc/public"),
            PackageRule::new("*.so*", "lib").flatten(),
            PackageRule::new("*.a", "lib").flatten(),
        ],
        libs: vec!["ara-diag".to_string()],
        requires: Vec::new(),
        default_options: BTreeMap::new(),
    }
}

pub fn diagnostic_manager() -> Recipe {
    Recipe {
        name: "diagnostic-manager".to_string(),
        version: "0.1".to_string(),
        settings: SettingsAxis::ALL.to_vec(),
        shared_tree: Some(SHARED_TREE.to_string()),
        tree_subdir: DEFAULT_TREE_SUBDIR.to_string(),
        exports: vec!["CMakeLists.txt".to_string()],
        build_definitions: BTreeMap::new(),
        tree_root_definition: None,
        package_rules: vec![
            PackageRule::new("*.h", "include").from_tree("inc"),
            PackageRule::new("*.a", "lib").flatten(),
            PackageRule::new("*.lib", "lib").flatten(),
            PackageRule::new("*.so*", "lib").flatten(),
        ],
        libs: vec!["diagnostic-manager".to_string()],
        requires: Vec::new(),
        default_options: BTreeMap::new(),
    }
}

pub fn test_app() -> Recipe {
    Recipe {
        name: "TestApp".to_string(),
        version: "0.1".to_string(),
        settings: SettingsAxis::ALL.to_vec(),
        shared_tree: None,
        tree_subdir: DEFAULT_TREE_SUBDIR.to_string(),
        exports: vec!["CMakeLists.txt".to_string()],
        build_definitions: BTreeMap::new(),
        tree_root_definition: None,
        package_rules: Vec::new(),
        libs: Vec::new(),
        requires: vec!["gtest/1.14.0".to_string()],
        default_options: BTreeMap::from([("gtest:shared".to_string(), "False".to_string())]),
    }
}
