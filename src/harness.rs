//! Local build harness.
//!
//! Lays out the isolated folders of one recipe invocation under the cache
//! root and drives the lifecycle callbacks in order:
//!
//! ```text
//! <cache>/<name>/<version>/
//!     export/    export_sources
//!     source/    copy of export/, then source
//!     build/     copy of source/, then build (in-source)
//!     package/   package + package-info.json
//! <cache>/.locks/<name>/<version>.lock
//! ```
//!
//! Lock files live outside the workspaces so that removing a workspace never
//! unlinks a lock another invocation may be holding or about to take.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info};

use crate::build::{BuildTool, Settings};
use crate::error::{Error, Result};
use crate::lifecycle::{Lifecycle, LifecyclePhase, PackageContext, PackageInfo, RecipeLifecycle};
use crate::manifest::{write_manifest, PackageManifest};
use crate::pipeline::package::PackagedArtifact;
use crate::pipeline::sync::{synchronize, SyncOperation};
use crate::recipe::{validate_segment, LoadedRecipe, Recipe};

/// Environment variable overriding the cache root.
pub const CACHE_ENV: &str = "DIAG_RECIPES_CACHE";

const LOCKS_DIR: &str = ".locks";

/// Cache root: `DIAG_RECIPES_CACHE`, else `~/.cache/diag-recipes`.
pub fn default_cache_root() -> PathBuf {
    if let Some(dir) = std::env::var_os(CACHE_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("diag-recipes")
}

/// The isolated folders of one recipe version.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    lock_path: PathBuf,
}

impl Workspace {
    pub fn new(cache_root: &Path, recipe: &Recipe) -> Self {
        Self::at(cache_root, &recipe.name, &recipe.version)
    }

    fn at(cache_root: &Path, name: &str, version: &str) -> Self {
        Self {
            root: cache_root.join(name).join(version),
            lock_path: cache_root
                .join(LOCKS_DIR)
                .join(name)
                .join(format!("{}.lock", version)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder(&self, phase: LifecyclePhase) -> PathBuf {
        self.root.join(phase.folder_name())
    }

    /// Take the exclusive lock on this workspace, failing fast if it is held.
    pub fn lock(&self) -> Result<WorkspaceLock> {
        fs::create_dir_all(&self.root).map_err(|err| {
            Error::io(format!("creating workspace '{}'", self.root.display()), err)
        })?;
        let path = self.lock_path.clone();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                Error::io(format!("creating lock directory '{}'", parent.display()), err)
            })?;
        }

        // The lock file is never unlinked: a second process could otherwise
        // create a fresh file at the same path and lock that instead.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| Error::io(format!("opening lock file '{}'", path.display()), err))?;

        if let Err(err) = file.try_lock_exclusive() {
            if is_contended(&err) {
                return Err(Error::Locked { path });
            }
            return Err(Error::io(
                format!("locking workspace '{}'", path.display()),
                err,
            ));
        }
        debug!(lock = %path.display(), "workspace locked");
        Ok(WorkspaceLock { _file: file, path })
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Held for the duration of an invocation; released on drop.
#[derive(Debug)]
pub struct WorkspaceLock {
    _file: File,
    path: PathBuf,
}

impl WorkspaceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Outcome of a full `create` run.
#[derive(Debug, Clone)]
pub struct CreateReport {
    pub reference: String,
    pub workspace: PathBuf,
    pub package_folder: PathBuf,
    pub manifest_path: PathBuf,
    pub export_sync: Option<SyncOperation>,
    pub source_sync: Option<SyncOperation>,
    pub artifacts: Vec<PackagedArtifact>,
    pub info: PackageInfo,
}

impl CreateReport {
    pub fn packaged_files(&self) -> usize {
        self.artifacts.iter().map(|a| a.files.len()).sum()
    }
}

/// Run every lifecycle phase of `loaded` and produce its package.
///
/// The package folder from an earlier run is removed first, so a failed
/// build never leaves a package behind.
pub fn create<T: BuildTool>(
    loaded: &LoadedRecipe,
    tool: &T,
    settings: &Settings,
    cache_root: &Path,
) -> Result<CreateReport> {
    let recipe = &loaded.recipe;
    let workspace = Workspace::new(cache_root, recipe);
    let _lock = workspace.lock()?;
    let lifecycle = RecipeLifecycle::new(recipe, &loaded.recipe_dir, tool, settings);
    let reference = recipe.reference();

    let package_folder = workspace.folder(LifecyclePhase::Package);
    remove_stale(&package_folder)?;

    let export_folder = workspace.folder(LifecyclePhase::ExportSources);
    info!(recipe = %reference, phase = %LifecyclePhase::ExportSources, "running phase");
    let export_sync = lifecycle.export_sources(&export_folder)?;

    let source_folder = workspace.folder(LifecyclePhase::FetchSource);
    synchronize(&export_folder, &source_folder)?;
    info!(recipe = %reference, phase = %LifecyclePhase::FetchSource, "running phase");
    let source_sync = lifecycle.source(&source_folder)?;

    let build_folder = workspace.folder(LifecyclePhase::Build);
    synchronize(&source_folder, &build_folder)?;
    info!(recipe = %reference, phase = %LifecyclePhase::Build, "running phase");
    lifecycle.build(&build_folder)?;

    info!(recipe = %reference, phase = %LifecyclePhase::Package, "running phase");
    let artifacts = lifecycle.package(&PackageContext {
        source_folder: &source_folder,
        build_folder: &build_folder,
        package_folder: &package_folder,
    })?;

    let info = lifecycle.package_info();
    let manifest = PackageManifest::collect(
        info.clone(),
        settings.restricted_to(&recipe.settings),
        &package_folder,
        &artifacts,
    )?;
    let manifest_path = write_manifest(&package_folder, &manifest)?;

    info!(
        recipe = %reference,
        package = %package_folder.display(),
        files = manifest.files.len(),
        "package created"
    );

    Ok(CreateReport {
        reference,
        workspace: workspace.root().to_path_buf(),
        package_folder,
        manifest_path,
        export_sync,
        source_sync,
        artifacts,
        info,
    })
}

/// Remove cached workspaces: every version of `name`, or everything.
///
/// `name` must be a plain recipe name; anything that could step outside the
/// cache root is rejected. Each workspace is locked before removal and one in
/// use fails the clean. Lock files are kept. Returns the removed workspace
/// roots.
pub fn clean(cache_root: &Path, name: Option<&str>) -> Result<Vec<PathBuf>> {
    let names = match name {
        Some(name) => {
            validate_segment(name, "recipe name", cache_root)?;
            vec![name.to_string()]
        }
        None => list_dirs(cache_root)?
            .into_iter()
            .filter(|name| !name.starts_with('.'))
            .collect(),
    };

    let mut removed = Vec::new();
    for name in names {
        let recipe_dir = cache_root.join(&name);
        for version in list_dirs(&recipe_dir)? {
            let workspace = Workspace::at(cache_root, &name, &version);
            let lock = workspace.lock()?;
            fs::remove_dir_all(workspace.root()).map_err(|err| {
                Error::io(
                    format!("removing workspace '{}'", workspace.root().display()),
                    err,
                )
            })?;
            drop(lock);
            debug!(workspace = %workspace.root().display(), "workspace removed");
            removed.push(workspace.root);
        }
        let emptied = fs::read_dir(&recipe_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if emptied {
            fs::remove_dir(&recipe_dir).map_err(|err| {
                Error::io(format!("removing '{}'", recipe_dir.display()), err)
            })?;
        }
    }
    Ok(removed)
}

/// Names of the subdirectories of `dir`, sorted. Non-UTF-8 names are skipped.
fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    let entries = fs::read_dir(dir)
        .map_err(|err| Error::io(format!("reading cache directory '{}'", dir.display()), err))?;
    for entry in entries {
        let entry = entry.map_err(|err| {
            Error::io(format!("iterating cache directory '{}'", dir.display()), err)
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn remove_stale(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .map_err(|err| Error::io(format!("removing stale folder '{}'", path.display()), err))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::CMake;
    use crate::manifest::read_manifest;
    use crate::recipe::load_builtin;
    use serial_test::serial;
    use tempfile::TempDir;

    // configure fails unless the materialized tree is present;
    // build drops liba.so into the build directory.
    const FAKE_CMAKE: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
if [ "$1" = "-S" ]; then
    [ -d "$2/dev" ] || { echo "dev tree missing" >&2; exit 2; }
    exit 0
fi
if [ "$1" = "--build" ]; then
    : > "$2/liba.so"
    exit 0
fi
exit 1
"#;

    struct Fixture {
        temp: TempDir,
        recipe_dir: PathBuf,
        tree: PathBuf,
        cache: PathBuf,
        cmake: CMake,
    }

    fn fixture(with_tree: bool) -> Fixture {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("ara-diag");
        let recipe_dir = project.join("buildconfig");
        let tree = project.join("dev");
        fs::create_dir_all(&recipe_dir).unwrap();
        fs::write(recipe_dir.join("CMakeLists.txt"), "project(ara_diag)\n").unwrap();
        if with_tree {
            fs::create_dir_all(tree.join("inc/public")).unwrap();
            fs::write(tree.join("inc/public/x.h"), "#pragma once\n").unwrap();
            fs::write(tree.join("README"), "shared\n").unwrap();
        }
        let tools = temp.path().join("tools");
        fs::create_dir_all(&tools).unwrap();
        let script = tools.join("cmake.sh");
        fs::write(&script, FAKE_CMAKE).unwrap();
        let cmake = CMake::new("sh").with_launcher_args([script]);
        let cache = temp.path().join("cache");
        Fixture {
            temp,
            recipe_dir,
            tree,
            cache,
            cmake,
        }
    }

    fn calls(fixture: &Fixture) -> String {
        fs::read_to_string(fixture.temp.path().join("tools/calls.log")).unwrap_or_default()
    }

    #[test]
    fn shared_tree_headers_and_built_libraries_are_packaged() {
        let fx = fixture(true);
        let loaded = load_builtin("ara-diag", &fx.recipe_dir).unwrap();

        let report = create(&loaded, &fx.cmake, &Settings::detect(), &fx.cache).unwrap();

        assert!(report.package_folder.join("include/x.h").is_file());
        assert!(report.package_folder.join("lib/liba.so").is_file());
        assert!(report.export_sync.as_ref().unwrap().source_exists);
        assert!(report.source_sync.as_ref().unwrap().source_exists);

        let build = report.workspace.join("build");
        assert!(build.join("CMakeLists.txt").is_file(), "exported files reach the build folder");
        let log = calls(&fx);
        assert!(log.contains(&format!("-S {} -B {}", build.display(), build.display())));
        assert!(log.contains(&format!("-DARA_DEV_ROOT={}", build.join("dev").display())));

        let manifest = read_manifest(&report.package_folder).unwrap();
        let paths: Vec<_> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["include/x.h", "lib/liba.so"]);
        assert_eq!(manifest.info.libs, vec!["ara-diag".to_string()]);
    }

    #[test]
    fn absent_tree_surfaces_the_build_tool_failure() {
        let fx = fixture(false);
        let loaded = load_builtin("ara-diag", &fx.recipe_dir).unwrap();

        let err = create(&loaded, &fx.cmake, &Settings::detect(), &fx.cache).unwrap_err();

        assert!(err.is_build_tool_failure(), "got {err}");
        assert!(!err.is_sync_failure());
        assert!(calls(&fx).contains("-S"), "the build tool was invoked");
        assert!(!calls(&fx).contains("ARA_DEV_ROOT"));

        let workspace = fx.cache.join("ara-diag/0.1");
        assert!(!workspace.join("export/dev").exists());
        assert!(!workspace.join("package").exists(), "no partial package");
    }

    #[test]
    fn stale_files_do_not_survive_a_rerun() {
        let fx = fixture(true);
        let loaded = load_builtin("ara-diag", &fx.recipe_dir).unwrap();
        let stale = fx.cache.join("ara-diag/0.1/source/dev/old.txt");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "stale").unwrap();

        create(&loaded, &fx.cmake, &Settings::detect(), &fx.cache).unwrap();

        assert!(!stale.exists());
        assert!(stale.with_file_name("README").is_file());
    }

    #[test]
    fn rerun_reflects_the_current_tree() {
        let fx = fixture(true);
        let loaded = load_builtin("ara-diag", &fx.recipe_dir).unwrap();
        create(&loaded, &fx.cmake, &Settings::detect(), &fx.cache).unwrap();

        fs::remove_file(fx.tree.join("inc/public/x.h")).unwrap();
        fs::write(fx.tree.join("inc/public/y.h"), "// y").unwrap();
        let report = create(&loaded, &fx.cmake, &Settings::detect(), &fx.cache).unwrap();

        assert!(!report.package_folder.join("include/x.h").exists());
        assert!(report.package_folder.join("include/y.h").is_file());
    }

    #[test]
    fn concurrent_invocation_of_same_recipe_is_refused() {
        let fx = fixture(true);
        let loaded = load_builtin("ara-diag", &fx.recipe_dir).unwrap();
        let held = Workspace::new(&fx.cache, &loaded.recipe).lock().unwrap();

        let err = create(&loaded, &fx.cmake, &Settings::detect(), &fx.cache).unwrap_err();

        assert!(matches!(err, Error::Locked { .. }));
        drop(held);
        assert!(create(&loaded, &fx.cmake, &Settings::detect(), &fx.cache).is_ok());
    }

    #[test]
    fn clean_removes_named_recipe_only() {
        let fx = fixture(true);
        let loaded = load_builtin("ara-diag", &fx.recipe_dir).unwrap();
        create(&loaded, &fx.cmake, &Settings::detect(), &fx.cache).unwrap();
        fs::create_dir_all(fx.cache.join("TestApp/0.1/export")).unwrap();

        let removed = clean(&fx.cache, Some("ara-diag")).unwrap();

        assert_eq!(removed, vec![fx.cache.join("ara-diag/0.1")]);
        assert!(!fx.cache.join("ara-diag").exists());
        assert!(fx.cache.join("TestApp/0.1").is_dir());

        let removed = clean(&fx.cache, None).unwrap();
        assert_eq!(removed.len(), 1);
    }

    #[test]
    fn clean_of_missing_cache_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(clean(&temp.path().join("nope"), None).unwrap().is_empty());
    }

    #[test]
    fn clean_rejects_names_outside_the_cache() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("cache");
        fs::create_dir_all(cache.join("ara-diag/0.1/build")).unwrap();
        let neighbour = temp.path().join("user-project/src");
        fs::create_dir_all(&neighbour).unwrap();
        fs::write(neighbour.join("main.cpp"), "int main() {}\n").unwrap();

        let absolute = temp.path().to_string_lossy().into_owned();
        for name in ["..", "a/b", ".", "", absolute.as_str()] {
            let err = clean(&cache, Some(name)).unwrap_err();
            assert!(matches!(err, Error::Recipe { .. }), "{name:?} gave {err}");
        }

        assert!(neighbour.join("main.cpp").is_file());
        assert!(cache.join("ara-diag/0.1/build").is_dir());
    }

    #[test]
    fn clean_keeps_lock_files() {
        let fx = fixture(true);
        let loaded = load_builtin("ara-diag", &fx.recipe_dir).unwrap();
        create(&loaded, &fx.cmake, &Settings::detect(), &fx.cache).unwrap();
        let lock_path = Workspace::new(&fx.cache, &loaded.recipe)
            .lock()
            .unwrap()
            .path()
            .to_path_buf();

        clean(&fx.cache, None).unwrap();

        assert!(!fx.cache.join("ara-diag").exists());
        assert!(lock_path.is_file(), "lock file survives the clean");
        assert!(!lock_path.starts_with(fx.cache.join("ara-diag")));
    }

    #[test]
    fn clean_refuses_a_workspace_in_use() {
        let fx = fixture(true);
        let loaded = load_builtin("ara-diag", &fx.recipe_dir).unwrap();
        create(&loaded, &fx.cmake, &Settings::detect(), &fx.cache).unwrap();
        let held = Workspace::new(&fx.cache, &loaded.recipe).lock().unwrap();

        let err = clean(&fx.cache, Some("ara-diag")).unwrap_err();

        assert!(matches!(err, Error::Locked { .. }));
        assert!(fx.cache.join("ara-diag/0.1/package").is_dir());
        drop(held);
    }

    #[test]
    fn only_contention_counts_as_locked() {
        assert!(is_contended(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_contended(&fs2::lock_contended_error()));
        assert!(!is_contended(&io::Error::other("no locks available")));
        assert!(!is_contended(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    #[serial]
    fn cache_root_honours_environment() {
        let previous = std::env::var_os(CACHE_ENV);
        std::env::set_var(CACHE_ENV, "/srv/diag-cache");
        assert_eq!(default_cache_root(), PathBuf::from("/srv/diag-cache"));
        std::env::remove_var(CACHE_ENV);
        assert!(default_cache_root().ends_with("diag-recipes"));
        if let Some(previous) = previous {
            std::env::set_var(CACHE_ENV, previous);
        }
    }
}
