//! simgate: session gateway between a driving simulation and remote agent
//! clients. The binary runs the demo episode loop over scripted clients and
//! provides a one-shot configuration check.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use simgate_core::SimulatorSettings;
use simgate_session::runtime::{self, DemoOptions};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "simgate",
    about = "Session gateway between a driving simulation and remote agent clients"
)]
struct Cli {
    /// Path to the settings TOML file
    #[arg(long, global = true, default_value = "simgate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo episode loop against scripted clients (default)
    Run {
        /// Number of frames to simulate
        #[arg(long, default_value_t = 300)]
        ticks: u64,

        /// Frame interval in milliseconds
        #[arg(long, default_value_t = 16)]
        frame_ms: u64,

        /// Override the configured number of additional observer clients
        #[arg(long)]
        additional: Option<usize>,
    },
    /// Load the settings and log the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing. Respects RUST_LOG env var, defaults to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = SimulatorSettings::load(&cli.config)?;

    let command = cli.command.unwrap_or(Commands::Run {
        ticks: 300,
        frame_ms: 16,
        additional: None,
    });

    match command {
        Commands::Run {
            ticks,
            frame_ms,
            additional,
        } => {
            if let Some(n) = additional {
                settings.server.additional_clients = n;
            }
            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    signal_cancel.cancel();
                }
            });
            let opts = DemoOptions {
                ticks,
                frame: Duration::from_millis(frame_ms),
            };
            runtime::run_demo(settings, opts, cancel).await?;
        }
        Commands::CheckConfig => {
            settings.log();
        }
    }

    Ok(())
}
