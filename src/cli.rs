// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Scanning an image file, with an optional manual crop retry
//! - Scanning a directory of frames through the virtual camera
//! - Managing the gallery and recycle bin
//! - Viewing and resetting tracked expenses
//! - Exporting payment cards

use chrono::{Local, Utc};
use clap::Subcommand;
use qsend::Config;
use qsend::app::acquisition::{AcquisitionOrchestrator, AcquisitionOutcome, PreviewRegistry, UxSignal};
use qsend::app::expenses::{ExpenseLedger, GraphView, RECENT_LIMIT};
use qsend::app::gallery::{CardSettings, Gallery, QrRecord};
use qsend::backends::camera::{CameraBackend, NoCamera};
use qsend::backends::virtual_camera::{VirtualCamera, load_frames};
use qsend::media::SourceFile;
use qsend::pipelines::card::{self, CardExport, CardStyle};
use qsend::pipelines::crop::CropRegion;
use qsend::storage::KeyValueStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

const DEFAULT_EXPORT_FOLDER: &str = "qsend";

#[derive(Subcommand)]
pub enum GalleryAction {
    /// List saved codes, optionally filtered by label
    List {
        #[arg(short, long, default_value = "")]
        search: String,
    },
    /// List codes in the recycle bin
    Bin,
    /// Rename a saved code
    Rename { id: String, label: String },
    /// Move a code to the recycle bin
    Delete { id: String },
    /// Bring a code back from the recycle bin
    Restore { id: String },
    /// Delete a code for good
    Purge { id: String },
    /// Delete everything in the recycle bin
    EmptyBin,
    /// Delete every saved code
    Wipe,
}

#[derive(Subcommand)]
pub enum ExpensesAction {
    /// Totals for this week, month and year
    Summary,
    /// Most recent expenses
    Recent {
        #[arg(short = 'n', long, default_value_t = RECENT_LIMIT)]
        limit: usize,
    },
    /// Totals per day or month (week, month or year)
    Graph {
        #[arg(long, default_value = "week")]
        view: GraphView,
    },
    /// Forget every expense
    Reset,
}

/// Load the configuration from `path` or the default location
pub fn load_config(path: Option<&Path>) -> Config {
    match path.map(Path::to_path_buf).or_else(Config::default_path) {
        Some(path) => Config::load_or_default(&path),
        None => Config::default(),
    }
}

/// Decode a QR code from an image file
pub fn scan(
    config: &Config,
    file: PathBuf,
    mime: Option<String>,
    crop: Option<CropRegion>,
    save: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let rt = runtime()?;
    let payload = rt.block_on(async {
        let source = SourceFile::read(&file, mime).await?;
        let orchestrator = build_orchestrator(config, Arc::new(NoCamera));
        report_signals(&orchestrator);

        let mut outcome = orchestrator.submit_file(source).await;
        if let (AcquisitionOutcome::NeedsManualCrop(target), Some(region)) = (&outcome, crop) {
            println!(
                "No QR code in the full {}x{} image, retrying on {}",
                target.width, target.height, region
            );
            outcome = orchestrator.confirm_crop(region).await?;
        }
        let payload = into_payload(outcome);
        orchestrator.cancel();
        payload
    })?;

    println!("{}", payload.as_str());

    if let Some(label) = save {
        let mut gallery = open_gallery(config)?;
        let record = gallery.save_new(&payload, &label, CardSettings::default(), Utc::now())?;
        println!("Saved as {} ({})", record.display_label(), record.id);
    }
    Ok(())
}

/// Scan frames loaded from image files through the virtual camera
pub fn camera(
    config: &Config,
    images: &[PathBuf],
    looping: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let frames = load_frames(images)?;
    println!("Scanning {} frame(s)...", frames.len());
    let backend = Arc::new(VirtualCamera::from_frames(frames).looping(looping));

    let rt = runtime()?;
    let payload = rt.block_on(async {
        let orchestrator = Arc::new(build_orchestrator(config, backend));
        report_signals(&orchestrator);

        let canceller = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                canceller.cancel();
            }
        });

        into_payload(orchestrator.start_camera().await)
    })?;

    println!("{}", payload.as_str());
    Ok(())
}

pub fn gallery(config: &Config, action: GalleryAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut gallery = open_gallery(config)?;
    let now = Utc::now();

    match action {
        GalleryAction::List { search } => {
            let records = gallery.active(&search);
            if records.is_empty() {
                println!("No saved codes.");
            }
            for record in records {
                print_record(record);
            }
        }
        GalleryAction::Bin => {
            let records = gallery.recycle_bin();
            if records.is_empty() {
                println!("Recycle bin is empty.");
            }
            for record in records {
                print_record(record);
            }
        }
        GalleryAction::Rename { id, label } => {
            gallery.rename(&id, &label)?;
            println!("Renamed {}", id);
        }
        GalleryAction::Delete { id } => {
            gallery.soft_delete(&id, now)?;
            println!("Moved {} to the recycle bin", id);
        }
        GalleryAction::Restore { id } => {
            gallery.restore(&id)?;
            println!("Restored {}", id);
        }
        GalleryAction::Purge { id } => {
            gallery.delete_permanently(&id)?;
            println!("Deleted {}", id);
        }
        GalleryAction::EmptyBin => {
            let removed = gallery.empty_bin()?;
            println!("Deleted {} code(s) from the recycle bin", removed);
        }
        GalleryAction::Wipe => {
            gallery.delete_all()?;
            println!("Deleted all saved codes");
        }
    }
    Ok(())
}

pub fn expenses(config: &Config, action: ExpensesAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = open_ledger(config)?;
    let now = Local::now();

    match action {
        ExpensesAction::Summary => {
            let summary = ledger.summary(&now);
            println!("This week:  {:>10.2}", summary.week_total);
            println!("This month: {:>10.2}", summary.month_total);
            println!("This year:  {:>10.2}", summary.year_total);
        }
        ExpensesAction::Recent { limit } => {
            for expense in ledger.recent(limit) {
                let when = chrono::DateTime::from_timestamp_millis(expense.timestamp)
                    .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {:>10.2}  {}",
                    when,
                    expense.amount,
                    expense.label.as_deref().unwrap_or("")
                );
            }
        }
        ExpensesAction::Graph { view } => {
            let graph = ledger.graph(view, &now);
            // Bars scaled against the graph maximum
            const WIDTH: f64 = 40.0;
            for (label, value) in graph.labels.iter().zip(&graph.data) {
                let bar = "#".repeat((value / graph.max * WIDTH).round() as usize);
                println!("{:>4} {:>10.2} {}", label, value, bar);
            }
        }
        ExpensesAction::Reset => {
            ledger.reset()?;
            println!("Expenses reset");
        }
    }
    Ok(())
}

/// Render a saved code as a card and track its amount
pub fn export(
    config: &Config,
    id: &str,
    amount: Option<String>,
    label: Option<String>,
    out: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let gallery = open_gallery(config)?;
    let record = gallery.open(id)?;
    let mut ledger = open_ledger(config)?;

    let export = CardExport {
        payload: record.payload(),
        style: CardStyle::for_record(record)?,
        amount: amount.or_else(|| record.amount.clone()),
        label,
        record_label: record.label.clone(),
    };
    let out_dir = out.unwrap_or_else(default_export_dir);

    let rt = runtime()?;
    let result = rt.block_on(card::export_card(&export, &out_dir, &mut ledger, &Local::now()));
    match result {
        Ok(path) => {
            println!("Card written to {}", path.display());
            Ok(())
        }
        Err(e) => {
            let notice = card::share_failed_notice(config.pipeline_settings().transient_error);
            eprintln!("{}", notice);
            Err(e.into())
        }
    }
}

/// Single-threaded runtime; blocking decode work still runs on the blocking pool
fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

fn build_orchestrator(config: &Config, camera: Arc<dyn CameraBackend>) -> AcquisitionOrchestrator {
    AcquisitionOrchestrator::new(
        config.pipeline_settings(),
        camera,
        PreviewRegistry::new(config.preview_dir()),
    )
}

/// Print user-facing notices as the orchestrator publishes them
fn report_signals(orchestrator: &AcquisitionOrchestrator) {
    let mut signals = orchestrator.subscribe();
    tokio::spawn(async move {
        loop {
            match signals.recv().await {
                Ok(UxSignal::Scanning(attempt)) => tracing::debug!(%attempt, "Scanning"),
                Ok(UxSignal::ManualCropRequired(_, target)) => eprintln!(
                    "Manual crop required: pass --crop X,Y,W,H within {}x{}",
                    target.width, target.height
                ),
                Ok(UxSignal::CameraPermissionDenied(_, notice) | UxSignal::Error(_, notice)) => {
                    eprintln!("{}", notice)
                }
                Ok(UxSignal::Decoded(..) | UxSignal::Idle) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn into_payload(
    outcome: AcquisitionOutcome,
) -> Result<qsend::DecodedPayload, Box<dyn std::error::Error>> {
    match outcome {
        AcquisitionOutcome::Decoded(payload) => Ok(payload),
        AcquisitionOutcome::NeedsManualCrop(_) => Err("No QR code found".into()),
        AcquisitionOutcome::Failed(reason) => Err(reason.to_string().into()),
        AcquisitionOutcome::Cancelled => Err("Cancelled".into()),
    }
}

fn print_record(record: &QrRecord) {
    let created = chrono::DateTime::from_timestamp_millis(record.created_at)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    println!(
        "{}  {}  {}  {}",
        record.id,
        created,
        record.display_label(),
        record.raw_value
    );
}

fn open_gallery(config: &Config) -> Result<Gallery, Box<dyn std::error::Error>> {
    let store = KeyValueStore::open(config.resolve_data_dir())?;
    Ok(Gallery::load(store)?)
}

fn open_ledger(config: &Config) -> Result<ExpenseLedger, Box<dyn std::error::Error>> {
    let store = KeyValueStore::open(config.resolve_data_dir())?;
    Ok(ExpenseLedger::load(store)?)
}

fn default_export_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_EXPORT_FOLDER)
}
