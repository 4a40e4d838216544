//! layerprobe - container image layer extraction.
//!
//! Saves a local image, reads its manifest and runtime history, and lists
//! its layers base first.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use layerprobe::config::Config;
use layerprobe::process;

#[derive(Parser)]
#[command(name = "layerprobe")]
#[command(about = "Extract the ordered layers of a local container image")]
#[command(
    after_help = "QUICK START:\n  layerprobe preflight        Check host tools\n  layerprobe layers IMAGE     List image layers\n  layerprobe clean            Remove temporary exports"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the layers of IMAGE (name[:tag]), base layer first
    Layers {
        /// Image reference
        image: String,

        /// Skip the export and use the engine's history only
        #[arg(long)]
        history_only: bool,

        /// Remove the temporary export tree afterwards
        #[arg(long)]
        clean: bool,

        /// Print layers as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove all temporary export trees
    Clean,

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Print the local server address (ip:port)
    LocalIp,

    /// Check that the required host tools are installed
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Engine pipelines run in their own process groups, which terminal
/// signals do not reach. Take them down with us.
fn install_signal_handler() {
    let installed = ctrlc::set_handler(|| {
        process::kill_active_groups();
        std::process::exit(130);
    });
    if let Err(e) = installed {
        tracing::warn!("failed to install signal handler: {}", e);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    install_signal_handler();

    let config = Config::load();

    match cli.command {
        Commands::Layers {
            image,
            history_only,
            clean,
            json,
        } => {
            let mode = if history_only {
                commands::layers::Mode::HistoryOnly
            } else {
                commands::layers::Mode::Full
            };
            let options = commands::layers::LayersOptions { mode, clean, json };
            commands::cmd_layers(&config, &image, options)?;
        }

        Commands::Clean => {
            commands::cmd_clean(&config)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
            };
            commands::cmd_show(&config, show_target)?;
        }

        Commands::LocalIp => {
            commands::cmd_local_ip(&config)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }
    }

    Ok(())
}
