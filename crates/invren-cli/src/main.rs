//! CLI application for renaming scanned waste-collection invoices.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{config, rename, resolve, status};

/// Invoice renamer - name scanned invoices `{site}-{collector}-{MMYYYY}-{number}`
#[derive(Parser)]
#[command(name = "invren")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rename every invoice in a directory
    Rename(rename::RenameArgs),

    /// Show oracle call counts and remaining quota
    Status(status::StatusArgs),

    /// Forget all recorded oracle calls
    Reset,

    /// Resolve a company name and provider against the catalog
    Resolve(resolve::ResolveArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Rename(args) => rename::run(args, config_path).await,
        Commands::Status(args) => status::run(args, config_path).await,
        Commands::Reset => status::reset(config_path).await,
        Commands::Resolve(args) => resolve::run(args, config_path).await,
        Commands::Config(args) => config::run(args, config_path).await,
    }
}
