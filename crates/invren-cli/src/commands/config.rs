//! Config command - inspect and edit the invren configuration file.
//!
//! Every subcommand acts on the `--config` file when one is given, else on
//! the file under the user config directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};
use console::style;

use invren_core::models::config::{ENV_MAX_PER_DAY, ENV_MAX_PER_MINUTE, InvrenConfig};

use super::{ledger_path, open_resolver};

/// Ceilings the environment may override, with the key they replace.
const ENV_OVERRIDES: [(&str, &str); 2] = [
    (ENV_MAX_PER_MINUTE, "governor.max_requests_per_minute"),
    (ENV_MAX_PER_DAY, "governor.max_requests_per_day"),
];

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show {
        /// Print the full configuration as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a configuration file with default values
    Init(InitArgs),

    /// Get a value (e.g. "governor.max_requests_per_day")
    Get {
        /// Dotted configuration key
        key: String,
    },

    /// Set a value in the configuration file
    Set {
        /// Dotted configuration key
        key: String,
        /// New value, JSON or a bare string
        value: String,
    },

    /// Load the reference catalog and summarise it
    Check,

    /// Show the configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path (default: --config, else the user config directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

pub async fn run(args: ConfigArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let path = target_path(config_path);
    match args.command {
        ConfigCommand::Show { json } => show_config(&path, json),
        ConfigCommand::Init(init_args) => init_config(init_args, &path),
        ConfigCommand::Get { key } => get_config(&path, &key),
        ConfigCommand::Set { key, value } => set_config(&path, &key, &value),
        ConfigCommand::Check => check_config(&path),
        ConfigCommand::Path => show_path(&path),
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invren")
        .join("config.json")
}

fn target_path(config_path: Option<&str>) -> PathBuf {
    config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

/// File values only, as `set` must write them back.
fn read_file(path: &Path) -> anyhow::Result<InvrenConfig> {
    if path.exists() {
        InvrenConfig::from_file(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))
    } else {
        Ok(InvrenConfig::default())
    }
}

/// File values with the environment ceilings applied.
fn read_effective(path: &Path) -> anyhow::Result<InvrenConfig> {
    let mut config = read_file(path)?;
    config.apply_env_overrides()?;
    Ok(config)
}

fn active_overrides() -> Vec<(&'static str, &'static str, String)> {
    ENV_OVERRIDES
        .iter()
        .filter_map(|&(var, key)| std::env::var(var).ok().map(|value| (var, key, value)))
        .collect()
}

fn show_config(path: &Path, json: bool) -> anyhow::Result<()> {
    let config = read_effective(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let source = if path.exists() {
        style("file").green()
    } else {
        style("defaults, no file").yellow()
    };
    println!("{} {} ({})", style("Configuration").bold(), path.display(), source);

    println!();
    println!("{}", style("Catalog").bold());
    println!("  Sites:              {}", present(&config.catalog.sites_path()));
    println!("  Collectors:         {}", present(&config.catalog.collectors_path()));
    println!("  Extra aliases:      {}", config.catalog.aliases.len());

    println!();
    println!("{}", style("Governor").bold());
    println!(
        "  Per minute:         {}",
        config.governor.max_requests_per_minute
    );
    println!("  Per day:            {}", config.governor.max_requests_per_day);
    println!("  Ledger:             {}", ledger_path(&config).display());
    for (var, key, value) in active_overrides() {
        println!(
            "  {} {}={} overrides {}",
            style("⚠").yellow(),
            var,
            value,
            key
        );
    }

    println!();
    println!("{}", style("Operator").bold());
    println!("  Names:              {}", list(&config.operator.names));
    println!("  Addresses:          {}", list(&config.operator.addresses));

    println!();
    println!("{}", style("Naming").bold());
    println!("  Extension:          .{}", config.naming.extension);
    println!(
        "  Site-hint collectors: {}",
        list(&config.naming.site_hint_collectors)
    );
    println!(
        "  Waste suffix:       {}",
        if config.naming.waste_suffix { "on" } else { "off" }
    );

    Ok(())
}

fn present(path: &Path) -> String {
    if path.exists() {
        format!("{} {}", path.display(), style("✓").green())
    } else {
        format!("{} {}", path.display(), style("missing").red())
    }
}

fn list(values: &[String]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join("; ")
    }
}

fn init_config(args: InitArgs, path: &Path) -> anyhow::Result<()> {
    let output_path = args.output.unwrap_or_else(|| path.to_path_buf());

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    InvrenConfig::default().save(&output_path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        output_path.display()
    );

    Ok(())
}

fn get_config(path: &Path, key: &str) -> anyhow::Result<()> {
    let json = serde_json::to_value(read_effective(path)?)?;

    let mut current = &json;
    for part in key.split('.') {
        current = current
            .get(part)
            .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
    }

    println!("{}", serde_json::to_string_pretty(current)?);

    Ok(())
}

fn set_config(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let config = read_file(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    // Bare words are taken as strings
    let parsed_value: serde_json::Value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));

    let mut json = serde_json::to_value(&config)?;

    let parts: Vec<&str> = key.split('.').collect();
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| anyhow::anyhow!("Empty configuration key"))?;

    let mut current = &mut json;
    for part in parents {
        current = current
            .get_mut(*part)
            .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;
    }
    match current.as_object_mut() {
        Some(obj) if obj.contains_key(*last) => {
            obj.insert((*last).to_string(), parsed_value.clone());
        }
        Some(_) => anyhow::bail!("Configuration key not found: {}", key),
        None => anyhow::bail!("Cannot set value at non-object path"),
    }

    let config: InvrenConfig = serde_json::from_value(json)
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e))?;
    config.save(path)?;

    println!(
        "{} Set {} = {} in {}",
        style("✓").green(),
        key,
        serde_json::to_string(&parsed_value)?,
        path.display()
    );
    if let Some((var, _, value)) = active_overrides().into_iter().find(|(_, k, _)| *k == key) {
        println!(
            "{} {}={} still overrides this value",
            style("⚠").yellow(),
            var,
            value
        );
    }

    Ok(())
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = read_effective(path)?;
    let resolver = open_resolver(&config)?;
    let catalog = resolver.catalog();
    let collectors = catalog.collectors();

    println!(
        "{} Loaded {} sites and {} approved collectors",
        style("✓").green(),
        catalog.len(),
        collectors.len()
    );

    let unscoped = catalog
        .sites()
        .iter()
        .filter(|site| site.collectors.is_empty())
        .count();
    if unscoped > 0 {
        println!("  {} sites accept any collector", unscoped);
    }
    let unlocated = catalog
        .sites()
        .iter()
        .filter(|site| !site.has_location())
        .count();
    if unlocated > 0 {
        println!(
            "  {} {} sites have no address or postal code (name matches stay unvalidated)",
            style("⚠").yellow(),
            unlocated
        );
    }

    for key in &config.naming.site_hint_collectors {
        if !collectors.is_approved(key) {
            println!(
                "  {} Site-hint collector {} is not approved",
                style("⚠").yellow(),
                key
            );
        }
    }

    Ok(())
}

fn show_path(path: &Path) -> anyhow::Result<()> {
    println!("Configuration file: {}", path.display());

    if path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'invren config init' to create a configuration file.");
    }

    Ok(())
}
