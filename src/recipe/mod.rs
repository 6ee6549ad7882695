//! Recipe declarations.
//!
//! A recipe names one package, the shared tree it draws from, what the build
//! tool is told, and the table of rules that harvest its outputs. Recipes
//! come either from a `recipe.toml` next to the recipe or from the built-in
//! table in [`builtin`]; once loaded they are never mutated.

pub mod builtin;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::build::SettingsAxis;
use crate::error::{Error, Result};
use crate::pipeline::package::{PackageRule, RuleOrigin};

/// File name of a recipe declaration inside its directory.
pub const RECIPE_FILE: &str = "recipe.toml";

/// Name the materialized shared tree gets inside isolated folders.
pub const DEFAULT_TREE_SUBDIR: &str = "dev";

/// One buildable, packageable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipe {
    pub name: String,
    pub version: String,
    pub settings: Vec<SettingsAxis>,
    /// Shared tree relative to the recipe directory; `None` when the recipe
    /// builds only what it exports itself.
    pub shared_tree: Option<String>,
    pub tree_subdir: String,
    /// Recipe-local files (globs) exported next to the shared tree.
    pub exports: Vec<String>,
    pub build_definitions: BTreeMap<String, String>,
    /// Definition that receives the materialized tree path when it exists.
    pub tree_root_definition: Option<String>,
    pub package_rules: Vec<PackageRule>,
    pub libs: Vec<String>,
    /// Declared `name/version` requirements. Recorded, never resolved.
    pub requires: Vec<String>,
    pub default_options: BTreeMap<String, String>,
}

impl Recipe {
    /// `name/version`.
    pub fn reference(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    /// Check the declaration; `origin` is only used in messages.
    pub fn validate(&self, origin: &Path) -> Result<()> {
        validate_segment(&self.name, "package name", origin)?;
        validate_segment(&self.version, "package version", origin)?;
        validate_segment(&self.tree_subdir, "sources.subdir", origin)?;

        for rule in &self.package_rules {
            if rule.pattern.trim().is_empty() {
                return Err(Error::recipe(origin, "packaging rule has an empty pattern"));
            }
            if let Err(err) = glob::Pattern::new(&rule.pattern) {
                return Err(Error::recipe(
                    origin,
                    format!("rule pattern '{}' is not a valid glob: {}", rule.pattern, err),
                ));
            }
            validate_relative(&rule.dst, "rules.dst", origin)?;
            if rule.origin == RuleOrigin::Tree && self.shared_tree.is_none() {
                return Err(Error::recipe(
                    origin,
                    format!(
                        "rule '{}' searches the shared tree but no sources.shared_tree is declared",
                        rule.pattern
                    ),
                ));
            }
        }

        if self.tree_root_definition.is_some() && self.shared_tree.is_none() {
            return Err(Error::recipe(
                origin,
                "build.tree_root_definition requires sources.shared_tree",
            ));
        }

        for export in &self.exports {
            validate_relative(export, "package.exports", origin)?;
        }

        for requirement in &self.requires {
            let valid = requirement
                .split_once('/')
                .map(|(name, version)| !name.trim().is_empty() && !version.trim().is_empty())
                .unwrap_or(false);
            if !valid {
                return Err(Error::recipe(
                    origin,
                    format!("requirement '{}' must look like name/version", requirement),
                ));
            }
        }

        for lib in &self.libs {
            if lib.trim().is_empty() {
                return Err(Error::recipe(origin, "package.libs contains an empty name"));
            }
        }
        Ok(())
    }
}

/// A recipe together with the directory it was declared in.
#[derive(Debug, Clone)]
pub struct LoadedRecipe {
    pub recipe: Recipe,
    /// Absolute directory the recipe lives in; the shared tree is resolved from here.
    pub recipe_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecipeToml {
    package: PackageToml,
    sources: Option<SourcesToml>,
    #[serde(default)]
    build: BuildToml,
    #[serde(default)]
    rules: Vec<PackageRule>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackageToml {
    name: String,
    version: String,
    #[serde(default)]
    settings: Vec<String>,
    #[serde(default)]
    libs: Vec<String>,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    exports: Vec<String>,
    #[serde(default)]
    default_options: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourcesToml {
    shared_tree: String,
    subdir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildToml {
    tree_root_definition: Option<String>,
    #[serde(default)]
    definitions: BTreeMap<String, String>,
}

/// Parse a recipe declaration. `origin` names the source in error messages.
pub fn parse_recipe(content: &str, origin: &Path) -> Result<Recipe> {
    let parsed: RecipeToml =
        toml::from_str(content).map_err(|err| Error::recipe(origin, err.to_string()))?;

    let mut settings = parsed
        .package
        .settings
        .iter()
        .map(|raw| raw.parse::<SettingsAxis>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|message| Error::recipe(origin, message))?;
    settings.sort();
    settings.dedup();

    let (shared_tree, tree_subdir) = match parsed.sources {
        Some(sources) => (
            Some(sources.shared_tree.trim().to_string()),
            sources
                .subdir
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| DEFAULT_TREE_SUBDIR.to_string()),
        ),
        None => (None, DEFAULT_TREE_SUBDIR.to_string()),
    };

    let recipe = Recipe {
        name: parsed.package.name.trim().to_string(),
        version: parsed.package.version.trim().to_string(),
        settings,
        shared_tree,
        tree_subdir,
        exports: parsed.package.exports,
        build_definitions: parsed.build.definitions,
        tree_root_definition: parsed
            .build
            .tree_root_definition
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty()),
        package_rules: parsed.rules,
        libs: parsed.package.libs,
        requires: parsed.package.requires,
        default_options: parsed.package.default_options,
    };
    recipe.validate(origin)?;
    Ok(recipe)
}

/// Load `<recipe_dir>/recipe.toml`.
pub fn load_recipe(recipe_dir: &Path) -> Result<LoadedRecipe> {
    let recipe_dir = absolute_dir(recipe_dir)?;
    let path = recipe_dir.join(RECIPE_FILE);
    let content = fs::read_to_string(&path)
        .map_err(|err| Error::io(format!("reading recipe '{}'", path.display()), err))?;
    let recipe = parse_recipe(&content, &path)?;
    Ok(LoadedRecipe { recipe, recipe_dir })
}

/// Pair a built-in recipe with the directory it is invoked from.
pub fn load_builtin(name: &str, recipe_dir: &Path) -> Result<LoadedRecipe> {
    let recipe = builtin::find(name).ok_or_else(|| {
        Error::recipe(
            recipe_dir,
            format!(
                "unknown built-in recipe '{}'; expected one of: {}",
                name,
                builtin::names().join(", ")
            ),
        )
    })?;
    Ok(LoadedRecipe {
        recipe,
        recipe_dir: absolute_dir(recipe_dir)?,
    })
}

fn absolute_dir(dir: &Path) -> Result<PathBuf> {
    fs::canonicalize(dir)
        .map_err(|err| Error::io(format!("resolving recipe directory '{}'", dir.display()), err))
}

pub(crate) fn validate_segment(value: &str, field: &str, origin: &Path) -> Result<()> {
    let valid = !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'));
    if !valid {
        return Err(Error::recipe(
            origin,
            format!(
                "{} '{}' must be a non-empty name made of letters, digits, '.', '_', '-' or '+'",
                field, value
            ),
        ));
    }
    Ok(())
}

fn validate_relative(raw: &str, field: &str, origin: &Path) -> Result<()> {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        return Err(Error::recipe(
            origin,
            format!("{field} must be relative, got absolute path '{raw}'"),
        ));
    }
    for component in candidate.components() {
        if matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        ) {
            return Err(Error::recipe(
                origin,
                format!("{field} contains invalid traversal/root component in '{raw}'"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ARA_DIAG: &str = r#"
[package]
name = "ara-diag"
version = "0.1"
settings = ["os", "compiler", "build_type", "arch", "os"]
libs = ["ara-diag"]
exports = ["CMakeLists.txt"]

[sources]
shared_tree = "../dev"

[build]
tree_root_definition = "ARA_DEV_ROOT"

[[rules]]
pattern = "*.h"
dst = "include"
src = "inc/public"
origin = "tree"

[[rules]]
pattern = "*.so*"
dst = "lib"
keep_path = false
"#;

    fn origin() -> PathBuf {
        PathBuf::from("ara-diag/buildconfig/recipe.toml")
    }

    #[test]
    fn parses_full_declaration() {
        let recipe = parse_recipe(ARA_DIAG, &origin()).unwrap();

        assert_eq!(recipe.reference(), "ara-diag/0.1");
        assert_eq!(recipe.settings, SettingsAxis::ALL.to_vec());
        assert_eq!(recipe.shared_tree.as_deref(), Some("../dev"));
        assert_eq!(recipe.tree_subdir, DEFAULT_TREE_SUBDIR);
        assert_eq!(recipe.tree_root_definition.as_deref(), Some("ARA_DEV_ROOT"));
        assert_eq!(recipe.package_rules.len(), 2);
        assert_eq!(recipe.package_rules[0].origin, RuleOrigin::Tree);
        assert!(!recipe.package_rules[1].keep_path);
        assert_eq!(recipe.libs, vec!["ara-diag".to_string()]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let content = ARA_DIAG.replace("[build]", "[build]\ngenerator = \"cmake\"");
        let err = parse_recipe(&content, &origin()).unwrap_err();
        assert!(matches!(err, Error::Recipe { .. }));
    }

    #[test]
    fn unknown_settings_axis_is_rejected() {
        let content = ARA_DIAG.replace("\"arch\", \"os\"", "\"flavour\"");
        assert!(parse_recipe(&content, &origin()).is_err());
    }

    #[test]
    fn destination_must_not_escape_package_root() {
        let content = ARA_DIAG.replace("dst = \"include\"", "dst = \"../include\"");
        let err = parse_recipe(&content, &origin()).unwrap_err();
        assert!(err.to_string().contains("invalid recipe"));
    }

    #[test]
    fn tree_rules_need_a_shared_tree() {
        let content = ARA_DIAG
            .replace("[sources]\nshared_tree = \"../dev\"\n", "")
            .replace("tree_root_definition = \"ARA_DEV_ROOT\"", "");
        assert!(parse_recipe(&content, &origin()).is_err());
    }

    #[test]
    fn requirements_must_be_references() {
        let content = ARA_DIAG.replace("libs = [", "requires = [\"gtest\"]\nlibs = [");
        assert!(parse_recipe(&content, &origin()).is_err());

        let content = ARA_DIAG.replace("libs = [", "requires = [\"gtest/1.14.0\"]\nlibs = [");
        let recipe = parse_recipe(&content, &origin()).unwrap();
        assert_eq!(recipe.requires, vec!["gtest/1.14.0".to_string()]);
    }

    #[test]
    fn names_must_be_path_safe() {
        let content = ARA_DIAG.replace("name = \"ara-diag\"", "name = \"ara/diag\"");
        assert!(parse_recipe(&content, &origin()).is_err());
    }

    #[test]
    fn load_reads_recipe_file_and_makes_dir_absolute() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("ara-diag/buildconfig");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(RECIPE_FILE), ARA_DIAG).unwrap();

        let loaded = load_recipe(&dir).unwrap();

        assert!(loaded.recipe_dir.is_absolute());
        assert_eq!(loaded.recipe.name, "ara-diag");
    }

    #[test]
    fn load_reports_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = load_recipe(temp.path()).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn unknown_builtin_lists_alternatives() {
        let temp = TempDir::new().unwrap();
        let err = load_builtin("nope", temp.path()).unwrap_err();
        assert!(err.to_string().contains("ara-diag"));
    }
}
