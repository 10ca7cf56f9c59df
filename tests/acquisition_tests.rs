// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end acquisition through the public API

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qsend::app::acquisition::{
    AcquisitionOrchestrator, AcquisitionOutcome, AcquisitionState, FailureReason, PreviewRegistry,
    UxSignal,
};
use qsend::app::gallery::{CardSettings, Gallery};
use qsend::backends::camera::{CameraBackend, CameraFrame, NoCamera};
use qsend::backends::virtual_camera::VirtualCamera;
use qsend::config::PipelineSettings;
use qsend::media::SourceFile;
use qsend::pipelines::crop::CropRegion;
use qsend::storage::KeyValueStore;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const PAYLOAD: &str = "upi://pay?pa=merchant@upi&pn=Test%20Merchant&am=42.00";

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("qsend-it-{}-{}", tag, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// No pacing so tests run at decoder speed
fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        min_scan_duration: Duration::ZERO,
        success_confirm: Duration::ZERO,
        transient_error: Duration::from_millis(10),
        ..PipelineSettings::default()
    }
}

fn orchestrator(camera: Arc<dyn CameraBackend>, previews: &PathBuf) -> AcquisitionOrchestrator {
    AcquisitionOrchestrator::new(fast_settings(), camera, PreviewRegistry::new(previews))
}

fn qr_image(content: &str, module_px: u32) -> GrayImage {
    qrcode::QrCode::new(content.as_bytes())
        .unwrap()
        .render::<Luma<u8>>()
        .module_dimensions(module_px, module_px)
        .build()
}

fn png(image: GrayImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn frame(image: GrayImage, sequence: u64) -> CameraFrame {
    let rgba = DynamicImage::ImageLuma8(image).to_rgba8();
    CameraFrame::from_rgba(rgba.width(), rgba.height(), rgba.into_raw(), sequence)
}

fn drain(signals: &mut tokio::sync::broadcast::Receiver<UxSignal>) -> Vec<UxSignal> {
    std::iter::from_fn(|| signals.try_recv().ok()).collect()
}

#[tokio::test]
async fn test_upload_decodes_and_saves_to_gallery() {
    let dir = scratch_dir("upload");
    let orchestrator = orchestrator(Arc::new(NoCamera), &dir.join("previews"));
    let mut signals = orchestrator.subscribe();

    let file = SourceFile::new("qr.png", Some("image/png".into()), png(qr_image(PAYLOAD, 4)));
    let outcome = orchestrator.submit_file(file).await;
    let payload = outcome.payload().cloned().expect("decoded");
    assert_eq!(payload.as_str(), PAYLOAD);
    assert!(matches!(orchestrator.state(), AcquisitionState::Resolved { .. }));
    assert_eq!(orchestrator.live_resource(), None);

    let signals = drain(&mut signals);
    assert!(matches!(signals.first(), Some(UxSignal::Scanning(_))));
    assert!(
        signals
            .iter()
            .any(|s| matches!(s, UxSignal::Decoded(_, p) if p.as_str() == PAYLOAD))
    );

    let mut gallery = Gallery::load(KeyValueStore::open(dir.join("data")).unwrap()).unwrap();
    gallery
        .save_new(&payload, "Test merchant", CardSettings::default(), chrono::Utc::now())
        .unwrap();
    let reloaded = Gallery::load(KeyValueStore::open(dir.join("data")).unwrap()).unwrap();
    assert_eq!(reloaded.active("merchant").len(), 1);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_blank_upload_needs_manual_crop_until_cancelled() {
    let dir = scratch_dir("blank");
    let orchestrator = orchestrator(Arc::new(NoCamera), &dir.join("previews"));

    let blank = GrayImage::from_pixel(120, 90, Luma([255]));
    let file = SourceFile::new("blank.png", None, png(blank));
    let target = match orchestrator.submit_file(file).await {
        AcquisitionOutcome::NeedsManualCrop(target) => target,
        other => panic!("expected manual crop, got {:?}", other),
    };
    assert_eq!((target.width, target.height), (120, 90));
    assert_eq!(orchestrator.live_resource(), Some("preview"));
    assert_eq!(orchestrator.previews().live_count(), 1);

    // A miss keeps the crop view and its preview
    let retry = orchestrator
        .confirm_crop(CropRegion::new(10, 10, 50, 50))
        .await
        .unwrap();
    assert!(matches!(retry, AcquisitionOutcome::NeedsManualCrop(_)));
    assert!(matches!(orchestrator.state(), AcquisitionState::ManualCrop { .. }));
    assert_eq!(orchestrator.previews().live_count(), 1);

    orchestrator.cancel();
    assert!(matches!(orchestrator.state(), AcquisitionState::Idle));
    assert_eq!(orchestrator.previews().live_count(), 0);
    assert!(orchestrator.confirm_crop(target.full_region()).await.is_err());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_corrupt_upload_fails_without_leaking() {
    let dir = scratch_dir("corrupt");
    let orchestrator = orchestrator(Arc::new(NoCamera), &dir.join("previews"));

    let file = SourceFile::new("broken.png", Some("image/png".into()), b"not an image".to_vec());
    let outcome = orchestrator.submit_file(file).await;
    assert!(matches!(outcome, AcquisitionOutcome::Failed(FailureReason::Format(_))));
    assert_eq!(orchestrator.live_resource(), None);
    assert_eq!(orchestrator.previews().live_count(), 0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_camera_decodes_and_releases_tracks() {
    let dir = scratch_dir("camera");
    let blank = GrayImage::from_pixel(64, 64, Luma([255]));
    let camera = Arc::new(VirtualCamera::from_frames(vec![
        frame(blank.clone(), 0),
        frame(blank, 1),
        frame(qr_image(PAYLOAD, 4), 2),
    ]));
    let orchestrator = orchestrator(camera.clone(), &dir.join("previews"));

    let outcome = orchestrator.start_camera().await;
    assert_eq!(outcome.payload().map(|p| p.as_str()), Some(PAYLOAD));
    assert_eq!(camera.streams_opened(), 1);
    assert_eq!(camera.live_tracks(), 0);
    assert_eq!(orchestrator.live_resource(), None);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_denied_camera_offers_upload() {
    let dir = scratch_dir("denied");
    let orchestrator = orchestrator(Arc::new(VirtualCamera::denied()), &dir.join("previews"));
    let mut signals = orchestrator.subscribe();

    let outcome = orchestrator.start_camera().await;
    assert!(matches!(
        outcome,
        AcquisitionOutcome::Failed(FailureReason::PermissionDenied(_))
    ));
    assert!(
        drain(&mut signals)
            .iter()
            .any(|s| matches!(s, UxSignal::CameraPermissionDenied(..)))
    );

    // Upload still works afterwards
    let file = SourceFile::new("qr.png", None, png(qr_image(PAYLOAD, 4)));
    assert!(orchestrator.submit_file(file).await.payload().is_some());

    let _ = std::fs::remove_dir_all(&dir);
}
