//! Status and reset commands - inspect or clear the call ledger.

use clap::Args;
use console::style;

use super::{load_config, open_governor};

/// Arguments for the status command.
#[derive(Args)]
pub struct StatusArgs {
    /// Print the status as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: StatusArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let status = open_governor(&config)?.status()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", style(format!("Oracle calls on {}", status.date)).bold());
    println!(
        "  Requests today:       {}/{}",
        status.requests_today, status.max_per_day
    );
    println!(
        "  Requests last minute: {}/{}",
        status.requests_last_minute, status.max_per_minute
    );

    let remaining = if status.remaining_today == 0 {
        style(status.remaining_today).red()
    } else {
        style(status.remaining_today).green()
    };
    println!("  Remaining today:      {}", remaining);
    println!("  Ledger:               {}", status.ledger_path.display());

    Ok(())
}

pub async fn reset(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let governor = open_governor(&config)?;
    governor.reset()?;

    println!(
        "{} Cleared call ledger at {}",
        style("✓").green(),
        governor.ledger_path().display()
    );

    Ok(())
}
