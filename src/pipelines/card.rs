// SPDX-License-Identifier: GPL-3.0-only

//! Payment card export
//!
//! Re-encodes a decoded payload as a fresh QR symbol (error correction
//! level H, one-module margin) and centres it on a square card with a solid
//! or image background. The card title sits above the symbol and the
//! amount below it. Exporting writes the card as PNG and records the card's
//! amount in the expense ledger.

use crate::app::expenses::ExpenseLedger;
use crate::app::frame_processor::DecodedPayload;
use crate::app::gallery::QrRecord;
use crate::app::notice::{Notice, NoticeKind};
use crate::constants::card;
use crate::errors::ShareError;
use chrono::{DateTime, TimeZone};
use ab_glyph::{FontRef, PxScale};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use qrcode::render::Renderer;
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace};

const DARK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const LIGHT: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([24, 24, 27, 255]);
const MUTED: Rgba<u8> = Rgba([113, 113, 122, 255]);

/// Bold face for card text, bundled so cards look the same everywhere
const CARD_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");

/// Quiet zone around the symbol, in modules
const MARGIN_MODULES: u32 = 1;

const MSG_SHARE_FAILED: &str = "Sharing failed. Please try saving instead.";

#[derive(Debug, Clone)]
pub enum CardBackground {
    Solid(Rgba<u8>),
    /// Scaled to cover the card, cropping whatever overflows
    Image(DynamicImage),
}

impl CardBackground {
    /// Load a user-picked background image
    pub fn from_file(path: &Path) -> Result<Self, ShareError> {
        image::open(path)
            .map(CardBackground::Image)
            .map_err(|e| ShareError::Background(format!("{}: {}", path.display(), e)))
    }
}

impl Default for CardBackground {
    fn default() -> Self {
        CardBackground::Solid(LIGHT)
    }
}

#[derive(Debug, Clone)]
pub struct CardStyle {
    /// Card edge length in pixels
    pub size: u32,
    pub background: CardBackground,
}

impl Default for CardStyle {
    fn default() -> Self {
        Self {
            size: card::DEFAULT_SIZE,
            background: CardBackground::default(),
        }
    }
}

impl CardStyle {
    /// Style for a saved record: its custom background if it has one
    pub fn for_record(record: &QrRecord) -> Result<Self, ShareError> {
        let background = match record.custom_background.as_deref() {
            Some(path) => CardBackground::from_file(Path::new(path))?,
            None => CardBackground::default(),
        };
        Ok(Self {
            background,
            ..Self::default()
        })
    }
}

/// Words printed around the symbol
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardText {
    /// Title above the symbol
    pub label: Option<String>,
    /// Amount printed below the symbol
    pub amount: Option<String>,
}

impl CardText {
    /// Upper-cased label, or the generic title
    pub fn title(&self) -> String {
        non_blank(self.label.as_deref())
            .unwrap_or(card::DEFAULT_TITLE)
            .to_uppercase()
    }

    /// `₹<amount>`, or nothing for a blank amount
    pub fn amount_line(&self) -> Option<String> {
        non_blank(self.amount.as_deref()).map(|a| format!("{}{}", card::CURRENCY_SYMBOL, a))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Render `payload` onto a card with its title and amount
pub fn render_card(
    payload: &DecodedPayload,
    style: &CardStyle,
    text: &CardText,
) -> Result<RgbaImage, ShareError> {
    let code = QrCode::with_error_correction_level(payload.as_str().as_bytes(), EcLevel::H)
        .map_err(|e| ShareError::Encode(e.to_string()))?;
    let modules = code.width() as u32;

    let size = style.size.max(1);
    let mut canvas = match &style.background {
        CardBackground::Solid(color) => RgbaImage::from_pixel(size, size, *color),
        CardBackground::Image(image) => image
            .resize_to_fill(size, size, FilterType::Triangle)
            .to_rgba8(),
    };

    let span = modules + 2 * MARGIN_MODULES;
    let module_px = ((size as f32 * card::QR_FRACTION) as u32 / span).max(1);
    let plate = Renderer::<Rgba<u8>>::new(&code.to_colors(), code.width(), MARGIN_MODULES)
        .module_dimensions(module_px, module_px)
        .dark_color(DARK)
        .light_color(LIGHT)
        .build();
    let origin = (size as i64 - plate.width() as i64) / 2;
    debug!(modules, module_px, plate = plate.width(), "Rendering card QR");
    imageops::replace(&mut canvas, &plate, origin, origin);

    let font = FontRef::try_from_slice(CARD_FONT)
        .map_err(|e| ShareError::Encode(format!("card font unusable: {}", e)))?;
    draw_text_bands(&mut canvas, &font, origin, plate.height(), text);
    Ok(canvas)
}

/// Title in the band above the plate, amount (or a hint) in the band below
fn draw_text_bands(
    canvas: &mut RgbaImage,
    font: &FontRef<'_>,
    plate_top: i64,
    plate_height: u32,
    text: &CardText,
) {
    let size = canvas.width() as f32;
    let top_band = plate_top;
    let bottom = plate_top + plate_height as i64;
    let bottom_band = canvas.height() as i64 - bottom;
    if top_band <= 0 || bottom_band <= 0 {
        trace!(size, "No room for card text");
        return;
    }

    let title = text.title();
    let scale = fit_scale(font, &title, size * 0.045, size * 0.85);
    let (_, height) = text_size(scale, font, &title);
    draw_centered(canvas, font, &title, INK, scale, (top_band - height as i64) / 2);

    match text.amount_line() {
        Some(amount) => {
            let caption_scale = fit_scale(font, card::AMOUNT_CAPTION, size * 0.025, size * 0.85);
            let amount_scale = fit_scale(font, &amount, size * 0.065, size * 0.85);
            let (_, caption_h) = text_size(caption_scale, font, card::AMOUNT_CAPTION);
            let (_, amount_h) = text_size(amount_scale, font, &amount);
            let gap = (size * 0.01) as i64;
            let block = caption_h as i64 + gap + amount_h as i64;
            let y = bottom + (bottom_band - block) / 2;
            draw_centered(canvas, font, card::AMOUNT_CAPTION, MUTED, caption_scale, y);
            draw_centered(canvas, font, &amount, INK, amount_scale, y + caption_h as i64 + gap);
        }
        None => {
            let scale = fit_scale(font, card::NO_AMOUNT_CAPTION, size * 0.03, size * 0.85);
            let (_, height) = text_size(scale, font, card::NO_AMOUNT_CAPTION);
            let y = bottom + (bottom_band - height as i64) / 2;
            draw_centered(canvas, font, card::NO_AMOUNT_CAPTION, MUTED, scale, y);
        }
    }
}

/// Shrink `preferred` until `line` fits in `max_width`
fn fit_scale(font: &FontRef<'_>, line: &str, preferred: f32, max_width: f32) -> PxScale {
    let scale = PxScale::from(preferred.max(1.0));
    let (width, _) = text_size(scale, font, line);
    if width as f32 > max_width {
        PxScale::from((preferred * max_width / width as f32).max(1.0))
    } else {
        scale
    }
}

fn draw_centered(
    canvas: &mut RgbaImage,
    font: &FontRef<'_>,
    line: &str,
    color: Rgba<u8>,
    scale: PxScale,
    y: i64,
) {
    let (width, _) = text_size(scale, font, line);
    let x = (canvas.width() as i64 - width as i64) / 2;
    draw_text_mut(canvas, color, x as i32, y as i32, scale, font, line);
}

/// What to export and how to account for it
#[derive(Debug, Clone)]
pub struct CardExport {
    pub payload: DecodedPayload,
    pub style: CardStyle,
    /// Amount typed on the card, tracked as an expense when positive
    pub amount: Option<String>,
    /// Label typed in the editor
    pub label: Option<String>,
    /// Label of the saved record the card came from
    pub record_label: Option<String>,
}

impl CardExport {
    /// Label for the expense: typed label, then the record's, then a default
    pub fn expense_label(&self) -> &str {
        [self.label.as_deref(), self.record_label.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or(card::DEFAULT_EXPENSE_LABEL)
    }

    /// Text printed on the card: typed label or the record's, and the amount
    pub fn text(&self) -> CardText {
        CardText {
            label: non_blank(self.label.as_deref())
                .or_else(|| non_blank(self.record_label.as_deref()))
                .map(str::to_string),
            amount: self.amount.clone(),
        }
    }
}

/// Write the card to `out_dir` and track its amount
///
/// Returns the path of the written PNG.
pub async fn export_card<Tz: TimeZone>(
    export: &CardExport,
    out_dir: &Path,
    ledger: &mut ExpenseLedger,
    now: &DateTime<Tz>,
) -> Result<PathBuf, ShareError> {
    let payload = export.payload.clone();
    let style = export.style.clone();
    let text = export.text();
    let png = tokio::task::spawn_blocking(move || {
        let card = render_card(&payload, &style, &text)?;
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(card)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| ShareError::Encode(format!("PNG encoding failed: {}", e)))?;
        Ok::<_, ShareError>(bytes)
    })
    .await
    .map_err(|e| ShareError::Encode(format!("render task failed: {}", e)))??;

    tokio::fs::create_dir_all(out_dir).await?;
    let path = out_dir.join(card::EXPORT_FILE_NAME);
    tokio::fs::write(&path, &png).await?;
    info!(path = %path.display(), size = png.len(), "Card exported");

    let amount = export.amount.as_deref().unwrap_or_default();
    if let Err(e) = ledger.track(amount, export.expense_label(), now) {
        error!(error = %e, "Card exported but the expense could not be recorded");
    }
    Ok(path)
}

/// The notice shown when exporting fails
pub fn share_failed_notice(after: std::time::Duration) -> Notice {
    Notice::transient(NoticeKind::Share, MSG_SHARE_FAILED, after)
}
