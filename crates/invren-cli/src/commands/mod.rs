//! Subcommands and the setup they share.

pub mod config;
pub mod rename;
pub mod resolve;
pub mod status;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use invren_core::models::config::InvrenConfig;
use invren_core::{CallGovernor, EntityResolver, ReferenceCatalog};

/// Explicit config file, else the default one if present, else defaults.
/// Environment ceilings are applied last.
pub fn load_config(path: Option<&str>) -> anyhow::Result<InvrenConfig> {
    let mut config = match path {
        Some(path) => InvrenConfig::from_file(Path::new(path))
            .with_context(|| format!("Failed to read config file {path}"))?,
        None => {
            let default = config::default_config_path();
            if default.exists() {
                debug!("Using config file {}", default.display());
                InvrenConfig::from_file(&default)
                    .with_context(|| format!("Failed to read config file {}", default.display()))?
            } else {
                InvrenConfig::default()
            }
        }
    };

    config.apply_env_overrides()?;
    Ok(config)
}

/// Configured ledger location, else the user data directory.
pub fn ledger_path(config: &InvrenConfig) -> PathBuf {
    config.governor.ledger_path.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("invren")
            .join("rate_ledger.json")
    })
}

pub fn open_governor(config: &InvrenConfig) -> anyhow::Result<CallGovernor> {
    let path = ledger_path(config);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let governor = CallGovernor::builder(&path)
        .with_config(&config.governor)
        .open()?;
    Ok(governor)
}

/// Load the catalog and wrap it in a configured resolver.
pub fn open_resolver(config: &InvrenConfig) -> anyhow::Result<EntityResolver> {
    let catalog = ReferenceCatalog::load(&config.catalog)
        .context("Reference catalog could not be loaded")?;

    Ok(EntityResolver::new(Arc::new(catalog))
        .with_config(config.resolution.clone())
        .with_operator(&config.operator))
}
