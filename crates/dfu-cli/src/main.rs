//! DFU CLI - Drive the DFU target router from the command line
//!
//! Plays the part of the DFU session driver: reads an image file, lets the
//! router identify it, and streams it to the selected backend.
//!
//! # Usage
//!
//! ```bash
//! dfu-cli identify firmware.bin
//! dfu-cli --config dfu.toml apply firmware.bin --chunk-size 1024
//! dfu-cli apply modem-delta.bin --abort-after 4096
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dfu_backends::DfuConfig;
use dfu_cli::session::DEFAULT_CHUNK_SIZE;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dfu-cli")]
#[command(author, version, about = "Device firmware update target router CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "DFU_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the image type of a firmware file
    Identify {
        /// Firmware image file
        file: PathBuf,

        /// Bytes added to the inspected prefix per attempt
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        step: usize,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stream a firmware file through the router to its backend
    Apply {
        /// Firmware image file
        file: PathBuf,

        /// Bytes per write
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Interrupt after this many bytes, then resume
        #[arg(long)]
        abort_after: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("dfu=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => {
            info!("Loading config from: {}", path.display());
            DfuConfig::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?
        }
        None => DfuConfig::default(),
    };

    match cli.command {
        Commands::Identify { file, step, json } => {
            commands::identify(&config, &file, step, json)?;
        }
        Commands::Apply {
            file,
            chunk_size,
            abort_after,
            json,
        } => {
            commands::apply(&config, &file, chunk_size, abort_after, json)?;
        }
    }

    Ok(())
}
