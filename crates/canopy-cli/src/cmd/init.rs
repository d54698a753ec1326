use crate::output::{OutputMode, pretty_kv, render};
use anyhow::{Context as _, Result};
use canopy_core::config::{self, StoreConfig};
use canopy_core::db;
use clap::Args;
use serde::Serialize;
use std::path::Path;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file.
    #[arg(long)]
    pub force: bool,

    /// Default content language written to the config.
    #[arg(long)]
    pub lang: Option<String>,

    /// Length of generated entity ids.
    #[arg(long)]
    pub id_length: Option<usize>,
}

#[derive(Debug, Serialize)]
struct InitReport {
    config: String,
    store: String,
    default_language: String,
}

/// Execute `cnp init`. Creates the project skeleton:
///
/// ```text
/// .canopy/
///   config.toml   (store settings)
///   canopy.db     (SQLite store, migrated to the latest schema)
/// ```
///
/// # Errors
///
/// Returns an error if a config already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config_path = config::config_path(project_root);
    if config_path.exists() && !args.force {
        anyhow::bail!(".canopy/ already exists. Use `cnp init --force` to reinitialize.");
    }

    let mut store_config = StoreConfig::default();
    if let Some(lang) = args.lang.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        store_config.default_language = lang.to_string();
    }
    if let Some(length) = args.id_length {
        store_config.short_id_length = length;
    }

    let state_dir = project_root.join(config::STATE_DIR);
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("Failed to create {}", state_dir.display()))?;
    std::fs::write(&config_path, config::to_toml(&store_config)?)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let store_path = config::store_path(project_root);
    db::open_store(&store_path)?;
    tracing::info!(path = %store_path.display(), "initialized store");

    let report = InitReport {
        config: config_path.display().to_string(),
        store: store_path.display().to_string(),
        default_language: store_config.default_language,
    };
    render(output, &report, |r, w| {
        writeln!(w, "Initialized canopy store")?;
        pretty_kv(w, "Config", &r.config)?;
        pretty_kv(w, "Store", &r.store)?;
        pretty_kv(w, "Language", &r.default_language)
    })
}
