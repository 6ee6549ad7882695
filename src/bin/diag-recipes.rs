use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use diag_recipes::harness::{self, CreateReport};
use diag_recipes::lifecycle::LifecyclePhase;
use diag_recipes::recipe::{self, builtin, LoadedRecipe};
use diag_recipes::{find_cmake, preflight, Lifecycle, RecipeLifecycle, Settings};
use tracing_subscriber::EnvFilter;

/// Build and package components that share one source tree
#[derive(Parser)]
#[command(name = "diag-recipes")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every lifecycle phase and produce the package
    Create {
        /// Recipe directory (holds recipe.toml unless --builtin is given)
        recipe_dir: PathBuf,

        /// Use a built-in recipe invoked from RECIPE_DIR
        #[arg(long)]
        builtin: Option<String>,

        /// Cache root for isolated folders (default: DIAG_RECIPES_CACHE or ~/.cache/diag-recipes)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Override a setting, e.g. -s build_type=Debug
        #[arg(short = 's', long = "setting", value_name = "KEY=VALUE")]
        settings: Vec<String>,

        /// Skip host tool checks (CMake is still resolved)
        #[arg(long)]
        no_preflight: bool,
    },

    /// Print the declared recipe metadata as JSON
    Info {
        recipe_dir: PathBuf,

        #[arg(long)]
        builtin: Option<String>,
    },

    /// List the built-in recipes
    List,

    /// Remove cached isolated folders
    Clean {
        /// Only this recipe (default: everything)
        name: Option<String>,

        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Create {
            recipe_dir,
            builtin,
            cache_dir,
            settings,
            no_preflight,
        } => cmd_create(
            &recipe_dir,
            builtin.as_deref(),
            cache_dir,
            &settings,
            no_preflight,
        ),
        Commands::Info {
            recipe_dir,
            builtin,
        } => cmd_info(&recipe_dir, builtin.as_deref()),
        Commands::List => cmd_list(),
        Commands::Clean { name, cache_dir } => cmd_clean(name.as_deref(), cache_dir),
    }
}

fn load(recipe_dir: &Path, builtin: Option<&str>) -> Result<LoadedRecipe> {
    match builtin {
        Some(name) => recipe::load_builtin(name, recipe_dir)
            .with_context(|| format!("loading built-in recipe '{}'", name)),
        None => recipe::load_recipe(recipe_dir)
            .with_context(|| format!("loading recipe from '{}'", recipe_dir.display())),
    }
}

fn cmd_create(
    recipe_dir: &Path,
    builtin: Option<&str>,
    cache_dir: Option<PathBuf>,
    overrides: &[String],
    no_preflight: bool,
) -> Result<()> {
    let loaded = load(recipe_dir, builtin)?;
    let reference = loaded.recipe.reference();

    let mut settings = Settings::detect();
    for raw in overrides {
        settings
            .apply_override(raw)
            .map_err(|msg| anyhow!(msg))
            .with_context(|| format!("applying setting '{}'", raw))?;
    }

    let cmake = if no_preflight {
        find_cmake().context("resolving cmake")?
    } else {
        preflight::check_host_tools().context("checking host tools")?
    };

    let cache_root = cache_dir.unwrap_or_else(harness::default_cache_root);
    println!(
        "[{}] creating in '{}' with {}",
        reference,
        cache_root.display(),
        cmake.program().display()
    );

    let report = harness::create(&loaded, &cmake, &settings, &cache_root)
        .with_context(|| format!("creating package '{}'", reference))?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &CreateReport) {
    let synced = [
        (LifecyclePhase::ExportSources, &report.export_sync),
        (LifecyclePhase::FetchSource, &report.source_sync),
    ];
    for (phase, sync) in synced {
        match sync {
            Some(op) if op.source_exists => println!(
                "[{}:{}] synchronized {} file(s) into '{}'",
                report.reference,
                phase,
                op.files_copied,
                op.destination_path.display()
            ),
            Some(op) => println!(
                "[{}:{}] shared tree '{}' absent; skipped",
                report.reference,
                phase,
                op.source_path.display()
            ),
            None => println!("[{}:{}] no shared tree", report.reference, phase),
        }
    }
    println!("[{}:{}] done", report.reference, LifecyclePhase::Build);
    for artifact in &report.artifacts {
        println!(
            "[{}:{}] {} -> {}: {} file(s)",
            report.reference,
            LifecyclePhase::Package,
            artifact.rule.pattern,
            artifact.rule.dst,
            artifact.files.len()
        );
    }
    println!(
        "[{}] package: {} ({} file(s), manifest {})",
        report.reference,
        report.package_folder.display(),
        report.packaged_files(),
        report.manifest_path.display()
    );
}

fn cmd_info(recipe_dir: &Path, builtin: Option<&str>) -> Result<()> {
    let loaded = load(recipe_dir, builtin)?;
    let cmake = diag_recipes::CMake::new("cmake");
    let settings = Settings::detect();
    let lifecycle = RecipeLifecycle::new(&loaded.recipe, &loaded.recipe_dir, &cmake, &settings);

    let info = serde_json::json!({
        "recipe": &loaded.recipe,
        "recipe_dir": &loaded.recipe_dir,
        "shared_tree": lifecycle.shared_tree(),
        "package_info": lifecycle.package_info(),
    });
    let rendered = serde_json::to_string_pretty(&info).context("rendering recipe metadata")?;
    println!("{}", rendered);
    Ok(())
}

fn cmd_list() -> Result<()> {
    for recipe in builtin::all() {
        println!(
            "{:<20} {:<6} shared tree: {}",
            recipe.name,
            recipe.version,
            recipe.shared_tree.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn cmd_clean(name: Option<&str>, cache_dir: Option<PathBuf>) -> Result<()> {
    let cache_root = cache_dir.unwrap_or_else(harness::default_cache_root);
    let removed = harness::clean(&cache_root, name)
        .with_context(|| format!("cleaning cache '{}'", cache_root.display()))?;
    if removed.is_empty() {
        println!("nothing to clean in '{}'", cache_root.display());
    }
    for path in removed {
        println!("removed {}", path.display());
    }
    Ok(())
}
