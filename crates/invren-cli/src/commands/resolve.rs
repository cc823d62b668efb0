//! Resolve command - check how a company name and provider resolve.

use clap::Args;
use console::style;

use invren_core::MatchConfidence;

use super::{load_config, open_resolver};

/// Arguments for the resolve command.
#[derive(Args)]
pub struct ResolveArgs {
    /// Company / restaurant name as printed on the invoice
    #[arg(long)]
    entreprise: String,

    /// Invoicing provider as printed on the invoice
    #[arg(long)]
    provider: String,

    /// Site address as printed on the invoice
    #[arg(long)]
    address: Option<String>,

    /// Print the resolution as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: ResolveArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let resolver = open_resolver(&config)?;

    let resolution = resolver
        .resolve(&args.entreprise, &args.provider, args.address.as_deref())
        .map_err(|e| anyhow::anyhow!("Resolution failed: {}", e))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
        return Ok(());
    }

    let site_name = resolver
        .catalog()
        .site(&resolution.site_id)
        .map(|site| site.canonical_name.as_str())
        .unwrap_or_default();
    println!(
        "{} Site {} ({}) via {}",
        style("✓").green(),
        style(&resolution.site_id).bold(),
        site_name,
        resolution.site_strategy
    );
    println!(
        "{} Collector {} via {}",
        style("✓").green(),
        style(&resolution.collector_key).bold(),
        resolution.collector_strategy
    );

    let confidence = resolution.confidence();
    if confidence == MatchConfidence::Unvalidated {
        println!(
            "{} Confidence: {} (name match only, nothing corroborates it)",
            style("⚠").yellow(),
            style(confidence).yellow()
        );
    } else {
        println!("  Confidence: {}", confidence);
    }

    Ok(())
}
