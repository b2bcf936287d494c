//! memwarden — restart an over-memory service without breaking fleet quorum.
//!
//! Meant to be run from cron on a manager node:
//!
//! ```text
//! */10 * * * * memwarden run --config /etc/memwarden/memwarden.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "memwarden",
    about = "Quorum-safe restarts of high-memory service instances",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Diagnostic log format on stderr.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every host once and restart over-threshold ones where quorum allows.
    Run {
        /// Config file. Without it, /etc/memwarden/memwarden.toml is used if present.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the inventory file.
        #[arg(long)]
        inventory_file: Option<PathBuf>,
        /// Override the systemd service name.
        #[arg(long)]
        service: Option<String>,
        /// Override the memory threshold (percent of total RAM).
        #[arg(long)]
        threshold: Option<u32>,
        /// Override the minimum number of other running nodes.
        #[arg(long)]
        min_other_running: Option<usize>,
        /// Override the number of concurrent probes (0 = all hosts at once).
        #[arg(long)]
        probe_workers: Option<usize>,
        /// Evaluate the safety gate but do not restart anything.
        #[arg(long)]
        dry_run: bool,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Write a config file with every default filled in.
    Init {
        #[arg(short, long, default_value = "memwarden.toml")]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Commands::Run {
            config,
            inventory_file,
            service,
            threshold,
            min_other_running,
            probe_workers,
            dry_run,
            format,
        } => {
            let overrides = commands::run::Overrides {
                inventory_file,
                service,
                threshold,
                min_other_running,
                probe_workers,
            };
            commands::run::run(config.as_deref(), overrides, dry_run, &format).await
        }
        Commands::Init { path, force } => commands::init::init(&path, force),
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,memwarden=debug"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
