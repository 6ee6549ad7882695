//! Lifecycle callbacks invoked by the harness.
//!
//! A recipe participates in a build only through the callbacks of
//! [`Lifecycle`], each receiving the isolated folder it works in. The
//! per-recipe differences are data on [`Recipe`]; [`RecipeLifecycle`] is the
//! one implementation that interprets them.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::build::cmake::BUILD_TYPE_DEFINITION;
use crate::build::{BuildTool, Settings, SettingsAxis};
use crate::error::{Error, Result};
use crate::pipeline::package::{copy_matching, package_artifacts, PackageRoots, PackagedArtifact};
use crate::pipeline::paths::{resolve_destination, resolve_shared_tree};
use crate::pipeline::sync::{synchronize, SyncOperation};
use crate::recipe::Recipe;

/// Phases that own an isolated folder, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LifecyclePhase {
    /// Copy the shared tree and recipe-local files into the export folder.
    ExportSources = 1,
    /// Re-materialize the shared tree in the source folder.
    FetchSource = 2,
    /// Configure and compile in the build folder.
    Build = 3,
    /// Harvest outputs into the package folder.
    Package = 4,
}

impl LifecyclePhase {
    pub const ALL: [LifecyclePhase; 4] = [
        LifecyclePhase::ExportSources,
        LifecyclePhase::FetchSource,
        LifecyclePhase::Build,
        LifecyclePhase::Package,
    ];

    /// Name of this phase's isolated folder.
    pub fn folder_name(&self) -> &'static str {
        match self {
            LifecyclePhase::ExportSources => "export",
            LifecyclePhase::FetchSource => "source",
            LifecyclePhase::Build => "build",
            LifecyclePhase::Package => "package",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::ExportSources => write!(f, "export_sources"),
            LifecyclePhase::FetchSource => write!(f, "source"),
            LifecyclePhase::Build => write!(f, "build"),
            LifecyclePhase::Package => write!(f, "package"),
        }
    }
}

/// What a consumer of the package links against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub libs: Vec<String>,
    pub include_dirs: Vec<String>,
    pub lib_dirs: Vec<String>,
    pub requires: Vec<String>,
}

/// Folders the package callback reads from and writes into.
#[derive(Debug, Clone, Copy)]
pub struct PackageContext<'a> {
    pub source_folder: &'a Path,
    pub build_folder: &'a Path,
    pub package_folder: &'a Path,
}

/// Callbacks a recipe exposes, called once each in declaration order.
pub trait Lifecycle {
    /// Recipe name for logging.
    fn name(&self) -> &str;

    /// Populate the export folder. Returns the tree synchronization, if the
    /// recipe has a shared tree.
    fn export_sources(&self, export_folder: &Path) -> Result<Option<SyncOperation>>;

    /// Materialize the shared tree in the source folder.
    fn source(&self, source_folder: &Path) -> Result<Option<SyncOperation>>;

    /// Configure and compile in-source inside the build folder.
    fn build(&self, build_folder: &Path) -> Result<()>;

    /// Apply the recipe's packaging rules.
    fn package(&self, ctx: &PackageContext<'_>) -> Result<Vec<PackagedArtifact>>;

    fn package_info(&self) -> PackageInfo;
}

/// [`Lifecycle`] driven entirely by a [`Recipe`].
pub struct RecipeLifecycle<'a, T: BuildTool> {
    recipe: &'a Recipe,
    recipe_dir: &'a Path,
    tool: &'a T,
    settings: &'a Settings,
}

impl<'a, T: BuildTool> RecipeLifecycle<'a, T> {
    pub fn new(
        recipe: &'a Recipe,
        recipe_dir: &'a Path,
        tool: &'a T,
        settings: &'a Settings,
    ) -> Self {
        Self {
            recipe,
            recipe_dir,
            tool,
            settings,
        }
    }

    /// Absolute location of the shared tree, if the recipe has one.
    pub fn shared_tree(&self) -> Option<PathBuf> {
        self.recipe
            .shared_tree
            .as_deref()
            .map(|spec| resolve_shared_tree(self.recipe_dir, spec))
    }

    fn sync_tree_into(&self, folder: &Path) -> Result<Option<SyncOperation>> {
        let Some(tree) = self.shared_tree() else {
            debug!(recipe = %self.recipe.name, "recipe has no shared tree");
            return Ok(None);
        };
        let destination = resolve_destination(folder, &self.recipe.tree_subdir);
        synchronize(&tree, &destination).map(Some)
    }

    /// Definitions handed to the build tool for a build in `build_folder`.
    pub fn definitions(&self, build_folder: &Path) -> BTreeMap<String, String> {
        let mut defs = self.recipe.build_definitions.clone();

        if let Some(key) = &self.recipe.tree_root_definition {
            let tree = resolve_destination(build_folder, &self.recipe.tree_subdir);
            if tree.is_dir() {
                defs.insert(key.clone(), tree.to_string_lossy().into_owned());
            } else {
                debug!(
                    recipe = %self.recipe.name,
                    definition = %key,
                    "materialized tree absent; definition omitted"
                );
            }
        }

        if self.recipe.settings.contains(&SettingsAxis::BuildType) {
            if let Some(build_type) = self.settings.get(SettingsAxis::BuildType) {
                defs.entry(BUILD_TYPE_DEFINITION.to_string())
                    .or_insert_with(|| build_type.to_string());
            }
        }
        defs
    }
}

impl<T: BuildTool> Lifecycle for RecipeLifecycle<'_, T> {
    fn name(&self) -> &str {
        &self.recipe.name
    }

    fn export_sources(&self, export_folder: &Path) -> Result<Option<SyncOperation>> {
        create_folder(export_folder)?;
        let op = self.sync_tree_into(export_folder)?;

        for pattern in &self.recipe.exports {
            let copied = copy_matching(pattern, self.recipe_dir, export_folder, true)?;
            debug!(
                recipe = %self.recipe.name,
                pattern = %pattern,
                count = copied.len(),
                "exported recipe files"
            );
        }
        Ok(op)
    }

    fn source(&self, source_folder: &Path) -> Result<Option<SyncOperation>> {
        create_folder(source_folder)?;
        self.sync_tree_into(source_folder)
    }

    fn build(&self, build_folder: &Path) -> Result<()> {
        let defs = self.definitions(build_folder);
        info!(
            recipe = %self.recipe.name,
            tool = self.tool.name(),
            folder = %build_folder.display(),
            "building"
        );
        let configured = self.tool.configure(build_folder, build_folder, &defs)?;
        self.tool.build(&configured)
    }

    fn package(&self, ctx: &PackageContext<'_>) -> Result<Vec<PackagedArtifact>> {
        create_folder(ctx.package_folder)?;
        let tree = resolve_destination(ctx.source_folder, &self.recipe.tree_subdir);
        let roots = PackageRoots {
            tree: &tree,
            build: ctx.build_folder,
        };
        package_artifacts(&self.recipe.package_rules, &roots, ctx.package_folder)
    }

    fn package_info(&self) -> PackageInfo {
        PackageInfo {
            name: self.recipe.name.clone(),
            version: self.recipe.version.clone(),
            libs: self.recipe.libs.clone(),
            include_dirs: vec!["include".to_string()],
            lib_dirs: vec!["lib".to_string()],
            requires: self.recipe.requires.clone(),
        }
    }
}

fn create_folder(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|err| Error::io(format!("creating isolated folder '{}'", path.display()), err))
}
