//! Harvest build outputs into the package layout.
//!
//! Every recipe describes its packaging as an ordered table of
//! [`PackageRule`]s; [`package_artifacts`] is the one implementation that
//! interprets those tables. A rule matching nothing is a normal outcome.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::pipeline::paths::normalize;

// `*` crosses directory separators, the way fnmatch-style copy patterns do.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Which tree a rule searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOrigin {
    /// The shared tree as materialized in the source folder.
    Tree,
    /// The build folder the external tool wrote into.
    #[default]
    Build,
}

/// One `(pattern, dst, src)` packaging entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageRule {
    pub pattern: String,
    pub dst: String,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub origin: RuleOrigin,
    /// Preserve the path below the search root; `false` flattens.
    #[serde(default = "keep_path_default")]
    pub keep_path: bool,
}

fn keep_path_default() -> bool {
    true
}

impl PackageRule {
    pub fn new(pattern: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            dst: dst.into(),
            src: None,
            origin: RuleOrigin::Build,
            keep_path: true,
        }
    }

    /// Search the materialized shared tree below `src`.
    pub fn from_tree(mut self, src: impl Into<String>) -> Self {
        self.origin = RuleOrigin::Tree;
        self.src = Some(src.into());
        self
    }

    pub fn flatten(mut self) -> Self {
        self.keep_path = false;
        self
    }
}

/// Roots a rule's `origin` refers to.
#[derive(Debug, Clone, Copy)]
pub struct PackageRoots<'a> {
    pub tree: &'a Path,
    pub build: &'a Path,
}

impl PackageRoots<'_> {
    fn search_root(&self, rule: &PackageRule) -> PathBuf {
        let base = match rule.origin {
            RuleOrigin::Tree => self.tree,
            RuleOrigin::Build => self.build,
        };
        match rule.src.as_deref() {
            Some(src) if !src.trim().is_empty() => normalize(&base.join(src.trim())),
            _ => base.to_path_buf(),
        }
    }
}

/// Files one rule placed in the package, relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArtifact {
    pub rule: PackageRule,
    pub files: Vec<PathBuf>,
}

/// Apply `rules` in order, copying matches into `output_root`.
pub fn package_artifacts(
    rules: &[PackageRule],
    roots: &PackageRoots<'_>,
    output_root: &Path,
) -> Result<Vec<PackagedArtifact>> {
    let mut results = Vec::with_capacity(rules.len());
    for rule in rules {
        let search_root = roots.search_root(rule);
        let dst_root = output_root.join(&rule.dst);
        let files = copy_matching(&rule.pattern, &search_root, &dst_root, rule.keep_path)?
            .into_iter()
            .map(|file| Path::new(&rule.dst).join(file))
            .collect::<Vec<_>>();

        if files.is_empty() {
            info!(
                pattern = %rule.pattern,
                search_root = %search_root.display(),
                "packaging rule matched no files"
            );
        } else {
            info!(
                pattern = %rule.pattern,
                dst = %rule.dst,
                count = files.len(),
                "packaged files"
            );
        }
        results.push(PackagedArtifact {
            rule: rule.clone(),
            files,
        });
    }
    Ok(results)
}

/// Copy every file below `search_root` whose relative path matches `pattern`
/// into `dst_root`, returning the copied paths relative to `dst_root`.
///
/// A missing `search_root` yields an empty list.
pub fn copy_matching(
    pattern: &str,
    search_root: &Path,
    dst_root: &Path,
    keep_path: bool,
) -> Result<Vec<PathBuf>> {
    let matcher = Pattern::new(pattern).map_err(|source| Error::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    if !search_root.is_dir() {
        debug!(search_root = %search_root.display(), "search root absent");
        return Ok(Vec::new());
    }

    let mut copied = Vec::new();
    let mut seen = HashSet::new();
    let walker = WalkDir::new(search_root)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !entry.path().starts_with(dst_root));

    for entry in walker {
        let entry = entry.map_err(|err| {
            Error::io(
                format!("walking '{}'", search_root.display()),
                std::io::Error::from(err),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(search_root) else {
            continue;
        };
        let relative_str = relative.to_string_lossy().replace('\\', "/");
        if !matcher.matches_with(&relative_str, MATCH_OPTIONS) {
            continue;
        }

        let placed = if keep_path {
            relative.to_path_buf()
        } else {
            PathBuf::from(entry.file_name())
        };
        let target = dst_root.join(&placed);
        copy_file(entry.path(), &target)?;
        if seen.insert(placed.clone()) {
            copied.push(placed);
        } else {
            warn!(
                file = %placed.display(),
                from = %entry.path().display(),
                "flattened file name collides with an earlier match; overwritten"
            );
        }
    }

    Ok(copied)
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    let package_err = |source| Error::Package {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(package_err)?;
    }
    fs::copy(from, to).map_err(package_err)?;
    Ok(())
}
