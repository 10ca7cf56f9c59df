// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use qsend::pipelines::crop::CropRegion;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "qsend")]
#[command(about = "Scan, decorate, save and share payment QR codes")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Configuration file (default: <config dir>/qsend/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a payment QR code from an image file
    Scan {
        /// Image to scan (PNG, JPEG, WebP, HEIC, ...)
        file: PathBuf,

        /// Override the MIME type guessed from the extension
        #[arg(long)]
        mime: Option<String>,

        /// Region to retry on when the full image does not decode (X,Y,W,H)
        #[arg(long)]
        crop: Option<CropRegion>,

        /// Save the decoded code to the gallery under this label
        #[arg(long)]
        save: Option<String>,
    },

    /// Scan frames from image files as if they came from a camera
    Camera {
        /// Image files or directories, played back in order
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Replay the frames until a code is found (Ctrl-C to stop)
        #[arg(long = "loop")]
        looping: bool,
    },

    /// Manage saved QR codes
    Gallery {
        #[command(subcommand)]
        action: cli::GalleryAction,
    },

    /// Show or reset tracked expenses
    Expenses {
        #[command(subcommand)]
        action: cli::ExpensesAction,
    },

    /// Render a saved code as a payment card PNG
    Export {
        /// Gallery record id
        id: String,

        /// Amount to show on the card and track as an expense
        #[arg(short, long)]
        amount: Option<String>,

        /// Expense label (default: the record's label)
        #[arg(short, long)]
        label: Option<String>,

        /// Output directory (default: ~/Pictures/qsend)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=qsend=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Scan {
            file,
            mime,
            crop,
            save,
        } => cli::scan(&config, file, mime, crop, save),
        Commands::Camera { images, looping } => cli::camera(&config, &images, looping),
        Commands::Gallery { action } => cli::gallery(&config, action),
        Commands::Expenses { action } => cli::expenses(&config, action),
        Commands::Export {
            id,
            amount,
            label,
            out,
        } => cli::export(&config, &id, amount, label, out),
    }
}
