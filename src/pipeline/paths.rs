//! Path arithmetic for locating the shared tree and the per-phase destinations.
//!
//! Nothing here touches the filesystem.

use std::path::{Component, Path, PathBuf};

/// Resolve the shared source tree relative to the recipe's own directory.
///
/// `relative_spec` may use `/` or `\` separators and may contain `.`/`..`
/// segments. The result is absolute and lexically normalized. A relative
/// `recipe_self_path` is anchored at the current directory once; an absolute
/// one yields the same answer from any working directory.
pub fn resolve_shared_tree(recipe_self_path: &Path, relative_spec: &str) -> PathBuf {
    let anchored = absolute(recipe_self_path);

    let spec = unify_separators(relative_spec);
    let candidate = Path::new(&spec);
    if candidate.is_absolute() {
        normalize(candidate)
    } else {
        normalize(&anchored.join(candidate))
    }
}

/// Destination of the materialized tree inside a phase's isolated folder.
pub fn resolve_destination(isolated_folder: &Path, subdir_name: &str) -> PathBuf {
    isolated_folder.join(unify_separators(subdir_name))
}

/// Anchor a relative path at the current directory; absolute paths pass through.
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    }
}

/// Lexically normalize a path: drop `.` segments and fold `..` into its parent.
///
/// `..` above the root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

fn unify_separators(raw: &str) -> String {
    raw.trim().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn shared_tree_is_one_level_above_recipe() {
        let resolved = resolve_shared_tree(Path::new("/work/ara-diag/buildconfig"), "../dev");
        assert_eq!(resolved, PathBuf::from("/work/ara-diag/dev"));
    }

    #[test]
    fn shared_tree_accepts_backslash_separators() {
        let resolved =
            resolve_shared_tree(Path::new("/work/ara-diag/buildconfig"), r"..\dev\.\inc");
        assert_eq!(resolved, PathBuf::from("/work/ara-diag/dev/inc"));
    }

    #[test]
    fn shared_tree_folds_redundant_segments_in_recipe_path() {
        let resolved = resolve_shared_tree(
            Path::new("/work/./ara-diag/tmp/../buildconfig/"),
            "./../dev/",
        );
        assert_eq!(resolved, PathBuf::from("/work/ara-diag/dev"));
    }

    #[test]
    fn shared_tree_keeps_absolute_spec() {
        let resolved = resolve_shared_tree(Path::new("/work/recipe"), "/opt/shared/../dev");
        assert_eq!(resolved, PathBuf::from("/opt/dev"));
    }

    #[test]
    #[serial]
    fn shared_tree_is_independent_of_current_directory() {
        let recipe = Path::new("/srv/checkout/diagnostic-manager/buildconfig");
        let first = resolve_shared_tree(recipe, "../dev");

        let temp = tempfile::TempDir::new().unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp.path()).unwrap();
        let second = resolve_shared_tree(recipe, "../dev");
        std::env::set_current_dir(original).unwrap();

        assert_eq!(first, second);
        assert!(second.is_absolute());
    }

    #[test]
    #[serial]
    fn relative_recipe_path_resolves_to_absolute() {
        let resolved = resolve_shared_tree(Path::new("ara-diag/buildconfig"), "../dev");
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("ara-diag/dev"));
    }

    #[test]
    fn parent_of_root_stays_at_root() {
        assert_eq!(normalize(Path::new("/../../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn relative_normalization_keeps_leading_parents() {
        assert_eq!(normalize(Path::new("../a/../../b")), PathBuf::from("../../b"));
        assert_eq!(normalize(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn destination_joins_without_checking_existence() {
        let dest = resolve_destination(Path::new("/cache/ara-diag/0.1/source"), "dev");
        assert_eq!(dest, PathBuf::from("/cache/ara-diag/0.1/source/dev"));
        assert!(!dest.exists());
    }
}
