// SPDX-License-Identifier: GPL-3.0-only

//! Acquisition orchestrator
//!
//! Drives one acquisition attempt at a time from input (picked file or
//! camera) to a single terminal outcome. Every attempt gets an
//! [`AttemptId`]; after each suspension point the orchestrator checks that
//! its attempt is still current and discards the result otherwise.
//!
//! The orchestrator owns at most one live resource, either the crop preview
//! or the camera scan session, in a single slot. All releases go through
//! `release_live`, which runs on every transition to rest and before every
//! new attempt.

use super::pacing::{paced, watchdog};
use super::preview::{PreviewRegistry, PreviewUrl};
use super::state::{
    AcquisitionEvent, AcquisitionOutcome, AcquisitionState, AttemptId, CropTarget, FailureReason,
    UxSignal, transition,
};
use crate::app::frame_processor::qr_detector::{DecodeInput, QrDetector, decode_off_runtime};
use crate::app::frame_processor::{DecodedPayload, Detection, FrameDecoder};
use crate::app::notice::{Notice, NoticeKind};
use crate::backends::camera::{CameraBackend, CameraFacing, IntervalClock, ScanEnd, ScanSession};
use crate::config::PipelineSettings;
use crate::errors::{AppError, CameraError, CropError, NormalizeError};
use crate::media::{ImageBlob, ImageNormalizer, RawImageSource, SourceFile};
use crate::pipelines::crop::{CropRegion, CropResolver};
use image::{DynamicImage, GenericImageView};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const SIGNAL_CAPACITY: usize = 64;

const MSG_UNREADABLE: &str = "Unable to read this image. Please try another file.";
const MSG_MANUAL_CROP: &str = "Manual crop required. Please frame the QR code.";
const MSG_PREVIEW_FAILED: &str = "Failed to load image for alignment.";
const MSG_CROP_MISS: &str = "Still can't detect a valid QR code. Ensure it's clear and centered.";
const MSG_CAMERA_DENIED: &str =
    "Camera access needed. Enable camera permissions or upload an image instead.";
const MSG_CAMERA_ENDED: &str = "The camera stopped before a QR code was found.";
const MSG_TIMEOUT: &str = "Scanning took too long. Please try again.";

/// The resource currently backing what the user sees
enum LiveResource {
    Preview(PreviewUrl),
    Camera(ScanSession),
}

impl LiveResource {
    fn kind(&self) -> &'static str {
        match self {
            LiveResource::Preview(_) => "preview",
            LiveResource::Camera(_) => "camera",
        }
    }
}

struct Inner {
    /// Identity of the current attempt; bumped on every new attempt and cancel
    generation: AttemptId,
    state: AcquisitionState,
    live: Option<LiveResource>,
}

/// Coordinates normalizer, decoder, camera and crop resolver
pub struct AcquisitionOrchestrator {
    inner: Mutex<Inner>,
    settings: PipelineSettings,
    normalizer: ImageNormalizer,
    decoder: Arc<dyn FrameDecoder>,
    cropper: CropResolver,
    previews: PreviewRegistry,
    camera: Arc<dyn CameraBackend>,
    signals: broadcast::Sender<UxSignal>,
}

impl AcquisitionOrchestrator {
    pub fn new(
        settings: PipelineSettings,
        camera: Arc<dyn CameraBackend>,
        previews: PreviewRegistry,
    ) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                generation: AttemptId::default(),
                state: AcquisitionState::Idle,
                live: None,
            }),
            normalizer: ImageNormalizer::new(settings.heif_jpeg_quality),
            decoder: Arc::new(QrDetector::new()),
            cropper: CropResolver::new(settings.crop_jpeg_quality),
            settings,
            previews,
            camera,
            signals,
        }
    }

    /// Replace the QR decoder used for stills and camera frames
    pub fn with_decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_normalizer(mut self, normalizer: ImageNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Snapshot of the current state
    pub fn state(&self) -> AcquisitionState {
        self.lock().state.clone()
    }

    /// Subscribe to presentation signals
    pub fn subscribe(&self) -> broadcast::Receiver<UxSignal> {
        self.signals.subscribe()
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Kind of the live resource, if any ("preview" or "camera")
    pub fn live_resource(&self) -> Option<&'static str> {
        self.lock().live.as_ref().map(LiveResource::kind)
    }

    /// Acquire a payload from a picked file
    ///
    /// Supersedes any attempt in flight.
    pub async fn submit_file(&self, file: SourceFile) -> AcquisitionOutcome {
        let attempt = self.begin(AcquisitionEvent::FileSelected);
        info!(%attempt, name = file.name(), mime = ?file.mime(), "Acquisition started from file");
        self.emit(UxSignal::Scanning(attempt));

        let blob = match self.normalizer.normalize(&file).await {
            Ok(blob) => blob,
            Err(e) => {
                warn!(%attempt, error = %e, "Normalization failed");
                return self.fail(
                    attempt,
                    FailureReason::Format(e),
                    Notice::persistent(NoticeKind::UnsupportedFormat, MSG_UNREADABLE),
                );
            }
        };
        if !self.commit(attempt, AcquisitionEvent::Normalized, None) {
            return AcquisitionOutcome::Cancelled;
        }

        // An unreadable raster is a format error, not a decode miss
        let image = match load_raster(&blob).await {
            Ok(image) => image,
            Err(e) => {
                warn!(%attempt, error = %e, "Normalized image is unreadable");
                return self.fail(
                    attempt,
                    FailureReason::Format(e),
                    Notice::persistent(NoticeKind::UnsupportedFormat, MSG_UNREADABLE),
                );
            }
        };
        let (width, height) = image.dimensions();

        let decoded = paced(
            self.settings.min_scan_duration,
            watchdog(self.settings.decode_timeout, self.decode_still(image)),
        )
        .await;

        match decoded {
            Err(_) => {
                warn!(%attempt, "Still decode exceeded the watchdog");
                self.fail(
                    attempt,
                    FailureReason::Timeout,
                    self.transient_notice(NoticeKind::Timeout, MSG_TIMEOUT),
                )
            }
            Ok(Detection::Found(detection)) => self.confirm(attempt, detection.payload).await,
            Ok(Detection::NotFound) => self.fall_back_to_crop(attempt, &blob, width, height).await,
        }
    }

    /// Retry decoding on a user-chosen crop of the manual-crop image
    ///
    /// Only valid while in manual crop. A miss keeps the crop view open and
    /// returns [`AcquisitionOutcome::NeedsManualCrop`] again; there is no
    /// retry limit.
    pub async fn confirm_crop(&self, region: CropRegion) -> Result<AcquisitionOutcome, AppError> {
        let (attempt, target) = {
            let mut inner = self.lock();
            let (attempt, target) = match &inner.state {
                AcquisitionState::ManualCrop { attempt, target } => (*attempt, target.clone()),
                other => return Err(AppError::InvalidState(other.name())),
            };
            Self::apply(&mut inner, AcquisitionEvent::CropConfirmed);
            (attempt, target)
        };
        info!(%attempt, %region, "Retrying decode on crop");
        self.emit(UxSignal::Scanning(attempt));

        let result = paced(
            self.settings.min_scan_duration,
            watchdog(
                self.settings.decode_timeout,
                self.crop_and_decode(&target.source, region),
            ),
        )
        .await;

        let notice = match result {
            Ok(Ok(Detection::Found(detection))) => {
                return Ok(self.confirm(attempt, detection.payload).await);
            }
            Ok(Ok(Detection::NotFound)) => {
                debug!(%attempt, "Crop retry found nothing");
                self.transient_notice(NoticeKind::DecodeError, MSG_CROP_MISS)
            }
            Ok(Err(e)) => {
                warn!(%attempt, error = %e, "Crop rasterization failed");
                self.transient_notice(NoticeKind::Rasterization, e.to_string())
            }
            Err(_) => {
                warn!(%attempt, "Crop decode exceeded the watchdog");
                self.transient_notice(NoticeKind::Timeout, MSG_TIMEOUT)
            }
        };

        if !self.commit(attempt, AcquisitionEvent::CropMissed, None) {
            return Ok(AcquisitionOutcome::Cancelled);
        }
        self.emit(UxSignal::Error(attempt, notice));
        Ok(AcquisitionOutcome::NeedsManualCrop(target))
    }

    /// Acquire a payload from the rear camera
    ///
    /// Supersedes any attempt in flight. Resolves when a frame decodes, the
    /// camera is refused or ends, or the attempt is cancelled.
    pub async fn start_camera(&self) -> AcquisitionOutcome {
        let attempt = self.begin(AcquisitionEvent::CameraRequested);
        info!(%attempt, backend = self.camera.name(), "Acquisition started from camera");
        self.emit(UxSignal::Scanning(attempt));

        let stream = match self.camera.open(CameraFacing::Environment).await {
            Ok(stream) => stream,
            Err(e) => {
                info!(%attempt, error = %e, "Camera unavailable, offering upload instead");
                return self.fail(
                    attempt,
                    FailureReason::PermissionDenied(e),
                    Notice::persistent(NoticeKind::PermissionDenied, MSG_CAMERA_DENIED),
                );
            }
        };

        let (session, ended) = ScanSession::start(
            stream,
            Arc::clone(&self.decoder),
            Box::new(IntervalClock::new(self.settings.frame_rate)),
        );
        // A stale session is dropped here, which stops its tracks
        if !self.install(attempt, LiveResource::Camera(session)) {
            debug!(%attempt, "Camera opened for a superseded attempt");
            return AcquisitionOutcome::Cancelled;
        }

        match ended.await {
            Ok(ScanEnd::Decoded(detection)) => self.confirm(attempt, detection.payload).await,
            Ok(ScanEnd::StreamEnded) => self.fail(
                attempt,
                FailureReason::Camera(CameraError::StreamEnded),
                self.transient_notice(NoticeKind::Camera, MSG_CAMERA_ENDED),
            ),
            Err(_) => {
                debug!(%attempt, "Camera scan stopped before it ended");
                AcquisitionOutcome::Cancelled
            }
        }
    }

    /// Navigate away: release everything and return to idle
    pub fn cancel(&self) {
        let mut inner = self.lock();
        inner.generation = inner.generation.next();
        if let Some(attempt) = inner.state.attempt() {
            info!(%attempt, state = inner.state.name(), "Acquisition cancelled");
        }
        Self::release_live(&mut inner);
        inner.state = AcquisitionState::Idle;
        drop(inner);
        self.emit(UxSignal::Idle);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, signal: UxSignal) {
        // No subscribers is fine
        let _ = self.signals.send(signal);
    }

    fn transient_notice(&self, kind: NoticeKind, message: impl Into<String>) -> Notice {
        Notice::transient(kind, message, self.settings.transient_error)
    }

    /// Supersede whatever is in flight and start a new attempt
    fn begin(&self, event: fn(AttemptId) -> AcquisitionEvent) -> AttemptId {
        let mut inner = self.lock();
        if let Some(previous) = inner.state.attempt().filter(|_| !inner.state.is_at_rest()) {
            info!(%previous, "Superseding attempt in flight");
        }
        Self::release_live(&mut inner);
        let attempt = inner.generation.next();
        inner.generation = attempt;
        Self::apply(&mut inner, event(attempt));
        attempt
    }

    fn is_current(&self, attempt: AttemptId) -> bool {
        self.lock().generation == attempt
    }

    /// Apply `event` if `attempt` is still current, optionally swapping in a
    /// new live resource. Returns false for stale attempts or invalid events.
    fn commit(
        &self,
        attempt: AttemptId,
        event: AcquisitionEvent,
        resource: Option<LiveResource>,
    ) -> bool {
        let mut inner = self.lock();
        if inner.generation != attempt {
            debug!(%attempt, current = %inner.generation, "Discarding result of superseded attempt");
            return false;
        }
        if !Self::apply(&mut inner, event) {
            return false;
        }
        if let Some(resource) = resource {
            Self::release_live(&mut inner);
            debug!(%attempt, kind = resource.kind(), "Live resource acquired");
            inner.live = Some(resource);
        }
        true
    }

    fn install(&self, attempt: AttemptId, resource: LiveResource) -> bool {
        let mut inner = self.lock();
        if inner.generation != attempt {
            return false;
        }
        Self::release_live(&mut inner);
        inner.live = Some(resource);
        true
    }

    fn apply(inner: &mut Inner, event: AcquisitionEvent) -> bool {
        let from = inner.state.name();
        match transition(&inner.state, event) {
            Some(next) => {
                debug!(from, to = next.name(), "Acquisition transition");
                inner.state = next;
                if inner.state.is_at_rest() {
                    Self::release_live(inner);
                }
                true
            }
            None => {
                warn!(state = from, "Ignoring event not valid in this state");
                false
            }
        }
    }

    /// The single release point for previews and camera streams
    fn release_live(inner: &mut Inner) {
        match inner.live.take() {
            Some(LiveResource::Preview(mut url)) => url.revoke(),
            Some(LiveResource::Camera(mut session)) => session.stop(),
            None => {}
        }
    }

    /// Resolve `attempt` as failed and surface `notice`
    fn fail(&self, attempt: AttemptId, reason: FailureReason, notice: Notice) -> AcquisitionOutcome {
        if !self.commit(attempt, AcquisitionEvent::Failed(reason.clone()), None) {
            return AcquisitionOutcome::Cancelled;
        }
        info!(%attempt, %reason, "Acquisition failed");
        let signal = match reason {
            FailureReason::PermissionDenied(_) => UxSignal::CameraPermissionDenied(attempt, notice),
            _ => UxSignal::Error(attempt, notice),
        };
        self.emit(signal);
        AcquisitionOutcome::Failed(reason)
    }

    /// Success confirmation, then hand the payload off
    async fn confirm(&self, attempt: AttemptId, payload: DecodedPayload) -> AcquisitionOutcome {
        if !self.commit(attempt, AcquisitionEvent::Decoded(payload.clone()), None) {
            return AcquisitionOutcome::Cancelled;
        }
        self.emit(UxSignal::Decoded(attempt, payload.clone()));
        tokio::time::sleep(self.settings.success_confirm).await;

        if !self.commit(attempt, AcquisitionEvent::ConfirmationShown, None) {
            return AcquisitionOutcome::Cancelled;
        }
        info!(%attempt, content = %payload, "Acquisition decoded");
        AcquisitionOutcome::Decoded(payload)
    }

    async fn fall_back_to_crop(
        &self,
        attempt: AttemptId,
        blob: &ImageBlob,
        width: u32,
        height: u32,
    ) -> AcquisitionOutcome {
        if !self.is_current(attempt) {
            return AcquisitionOutcome::Cancelled;
        }
        let preview = match self.previews.create(blob).await {
            Ok(preview) => preview,
            Err(e) => {
                warn!(%attempt, error = %e, "Preview allocation failed");
                return self.fail(
                    attempt,
                    FailureReason::Resource(e),
                    self.transient_notice(NoticeKind::Resource, MSG_PREVIEW_FAILED),
                );
            }
        };

        let target = CropTarget {
            source: RawImageSource::ObjectUrl(preview.reference()),
            width,
            height,
        };
        // A stale preview is dropped here, which revokes it
        if !self.commit(
            attempt,
            AcquisitionEvent::NotFound(target.clone()),
            Some(LiveResource::Preview(preview)),
        ) {
            return AcquisitionOutcome::Cancelled;
        }
        info!(%attempt, width, height, "No QR code found, manual crop required");
        self.emit(UxSignal::ManualCropRequired(attempt, target.clone()));
        self.emit(UxSignal::Error(
            attempt,
            self.transient_notice(NoticeKind::ManualCropRequired, MSG_MANUAL_CROP),
        ));
        AcquisitionOutcome::NeedsManualCrop(target)
    }

    /// Downscale and decode a still off the runtime
    ///
    /// Decoder faults on a still count as "not found" so they lead to the
    /// manual crop path.
    async fn decode_still(&self, image: DynamicImage) -> Detection {
        let input = DecodeInput::Still {
            image,
            max_dimension: self.settings.max_decode_dimension,
        };
        match decode_off_runtime(Arc::clone(&self.decoder), input).await {
            Ok(detection) => detection,
            Err(fault) => {
                warn!(error = %fault, "Still decode fault");
                Detection::NotFound
            }
        }
    }

    async fn crop_and_decode(
        &self,
        source: &RawImageSource,
        region: CropRegion,
    ) -> Result<Detection, CropError> {
        let cropped = self.cropper.crop(source, region).await?;
        let image = load_raster(&cropped)
            .await
            .map_err(|e| CropError::SourceUnreadable(e.to_string()))?;
        Ok(self.decode_still(image).await)
    }
}

/// Decode blob bytes into a raster off the runtime
async fn load_raster(blob: &ImageBlob) -> Result<DynamicImage, NormalizeError> {
    let bytes = Arc::clone(blob.bytes());
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| NormalizeError::UnsupportedFormat(format!("image load task failed: {}", e)))?
        .map_err(|e| NormalizeError::UnsupportedFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::CameraFrame;
    use crate::backends::virtual_camera::VirtualCamera;
    use crate::errors::FrameFault;
    use crate::media::heif::HeifTranscoder;
    use crate::test_utils::{embed, png_bytes, qr_gray, scratch_dir};
    use std::time::Duration;
    use tokio::time::Instant;

    const PAYLOAD: &str = "upi://pay?pa=test@bank";

    fn build(camera: Arc<dyn CameraBackend>) -> (AcquisitionOrchestrator, std::path::PathBuf) {
        let dir = scratch_dir("orchestrator");
        let previews = PreviewRegistry::new(dir.join("previews"));
        // Small decode box so a small code in a large photo is a reliable miss
        let settings = PipelineSettings {
            max_decode_dimension: 200,
            ..PipelineSettings::default()
        };
        (AcquisitionOrchestrator::new(settings, camera, previews), dir)
    }

    fn orchestrator(camera: Arc<dyn CameraBackend>) -> (Arc<AcquisitionOrchestrator>, std::path::PathBuf) {
        let (orch, dir) = build(camera);
        (Arc::new(orch), dir)
    }

    fn qr_png(content: &str) -> SourceFile {
        SourceFile::new("code.png", Some("image/png".into()), png_bytes(&qr_gray(content, 6)))
    }

    /// Photo where a small QR code sits in a corner
    fn hard_photo() -> (SourceFile, CropRegion) {
        let code = qr_gray(PAYLOAD, 3);
        let photo = embed(&code, 1000, 800, 850, 650);
        let region = CropRegion::new(840, 640, code.width() + 20, code.height() + 20);
        (SourceFile::new("photo.png", None, png_bytes(&photo)), region)
    }

    fn blank_frame() -> CameraFrame {
        CameraFrame::from_rgba(8, 8, vec![255u8; 8 * 8 * 4], 0)
    }

    fn qr_frame(content: &str) -> CameraFrame {
        let gray = qr_gray(content, 4);
        let rgba = image::DynamicImage::ImageLuma8(gray).to_rgba8();
        CameraFrame::from_rgba(rgba.width(), rgba.height(), rgba.into_raw(), 0)
    }

    /// Decoder that never finds anything
    struct Blind;

    impl FrameDecoder for Blind {
        fn decode(&self, _: &[u8], _: u32, _: u32) -> Result<Detection, FrameFault> {
            Ok(Detection::NotFound)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_upload_decodes_after_minimum_duration() {
        let (orch, dir) = orchestrator(Arc::new(VirtualCamera::denied()));
        let mut signals = orch.subscribe();
        let start = Instant::now();

        let outcome = orch.submit_file(qr_png(PAYLOAD)).await;
        assert_eq!(outcome.payload().map(|p| p.as_str()), Some(PAYLOAD));
        // 800ms pacing plus 600ms confirmation
        assert!(start.elapsed() >= Duration::from_millis(1400));
        assert!(matches!(orch.state(), AcquisitionState::Resolved { .. }));
        assert_eq!(orch.live_resource(), None);

        assert!(matches!(signals.try_recv(), Ok(UxSignal::Scanning(_))));
        assert!(matches!(signals.try_recv(), Ok(UxSignal::Decoded(_, _))));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_scanning_state_holds_for_minimum_duration() {
        let (orch, dir) = orchestrator(Arc::new(VirtualCamera::denied()));
        let task = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.submit_file(qr_png(PAYLOAD)).await })
        };
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(orch.state().is_scanning());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(orch.state().name(), "confirming");
        assert!(task.await.unwrap().payload().is_some());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_code_needs_manual_crop_then_decodes() {
        let (orch, dir) = orchestrator(Arc::new(VirtualCamera::denied()));
        let (photo, region) = hard_photo();

        let outcome = orch.submit_file(photo).await;
        let AcquisitionOutcome::NeedsManualCrop(target) = outcome else {
            panic!("expected manual crop, got {:?}", outcome);
        };
        assert_eq!((target.width, target.height), (1000, 800));
        assert!(matches!(target.source, RawImageSource::ObjectUrl(_)));
        assert_eq!(orch.live_resource(), Some("preview"));
        assert_eq!(orch.previews().live_count(), 1);

        // A bad crop keeps the crop view open
        let miss = orch.confirm_crop(CropRegion::new(0, 0, 200, 200)).await.unwrap();
        assert!(matches!(miss, AcquisitionOutcome::NeedsManualCrop(_)));
        assert_eq!(orch.state().name(), "manual-crop");
        assert_eq!(orch.previews().live_count(), 1);

        let hit = orch.confirm_crop(region).await.unwrap();
        assert_eq!(hit.payload().map(|p| p.as_str()), Some(PAYLOAD));
        assert_eq!(orch.previews().live_count(), 0);
        assert_eq!(orch.live_resource(), None);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_crop_keeps_crop_view_open() {
        let (orch, dir) = orchestrator(Arc::new(VirtualCamera::denied()));
        let (photo, region) = hard_photo();
        let outcome = orch.submit_file(photo).await;
        assert!(matches!(outcome, AcquisitionOutcome::NeedsManualCrop(_)));

        let mut signals = orch.subscribe();
        let outcome = orch
            .confirm_crop(CropRegion::new(0, 0, 30_000, 30_000))
            .await
            .unwrap();
        assert!(matches!(outcome, AcquisitionOutcome::NeedsManualCrop(_)));
        assert_eq!(orch.state().name(), "manual-crop");
        let rasterization_notice = std::iter::from_fn(|| signals.try_recv().ok()).any(|signal| {
            matches!(signal, UxSignal::Error(_, notice) if notice.kind == NoticeKind::Rasterization)
        });
        assert!(rasterization_notice);

        let hit = orch.confirm_crop(region).await.unwrap();
        assert_eq!(hit.payload().map(|p| p.as_str()), Some(PAYLOAD));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_confirm_crop_outside_manual_crop_is_rejected() {
        let (orch, dir) = orchestrator(Arc::new(VirtualCamera::denied()));
        let err = orch.confirm_crop(CropRegion::new(0, 0, 1, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState("idle")));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_file_fails_before_decode() {
        let (orch, dir) = orchestrator(Arc::new(VirtualCamera::denied()));
        let mut signals = orch.subscribe();
        let start = Instant::now();
        let file = SourceFile::new("broken.jpg", Some("image/jpeg".into()), vec![0xFFu8, 0xD8, 0x00, 0x13]);

        let outcome = orch.submit_file(file).await;
        assert!(matches!(
            outcome,
            AcquisitionOutcome::Failed(FailureReason::Format(_))
        ));
        // Never reached the paced decode
        assert!(start.elapsed() < Duration::from_millis(800));
        assert_eq!(orch.previews().live_count(), 0);

        let _scanning = signals.try_recv().unwrap();
        match signals.try_recv() {
            Ok(UxSignal::Error(_, notice)) => assert!(notice.is_persistent()),
            other => panic!("expected error notice, got {:?}", other),
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_denied_allocates_nothing() {
        let camera = Arc::new(VirtualCamera::denied());
        let (orch, dir) = orchestrator(Arc::clone(&camera) as Arc<dyn CameraBackend>);
        let mut signals = orch.subscribe();

        let outcome = orch.start_camera().await;
        assert!(matches!(
            outcome,
            AcquisitionOutcome::Failed(FailureReason::PermissionDenied(CameraError::PermissionDenied))
        ));
        assert_eq!(camera.streams_opened(), 0);
        assert_eq!(orch.live_resource(), None);

        let _scanning = signals.try_recv().unwrap();
        match signals.try_recv() {
            Ok(UxSignal::CameraPermissionDenied(_, notice)) => assert!(notice.is_persistent()),
            other => panic!("expected permission notice, got {:?}", other),
        }
        // Upload still works afterwards
        assert!(orch.submit_file(qr_png(PAYLOAD)).await.payload().is_some());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_decodes_on_frame_47_and_stops_stream() {
        let mut frames = vec![blank_frame(); 46];
        frames.push(qr_frame(PAYLOAD));
        frames.push(blank_frame());
        let camera = Arc::new(VirtualCamera::from_frames(frames));
        let (orch, dir) = orchestrator(Arc::clone(&camera) as Arc<dyn CameraBackend>);

        let outcome = orch.start_camera().await;
        assert_eq!(outcome.payload().map(|p| p.as_str()), Some(PAYLOAD));
        assert_eq!(camera.streams_opened(), 1);
        assert_eq!(camera.live_tracks(), 0);
        assert_eq!(orch.live_resource(), None);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_stream_end_fails_attempt() {
        let camera = Arc::new(VirtualCamera::from_frames(vec![blank_frame(); 3]));
        let (orch, dir) = orchestrator(Arc::clone(&camera) as Arc<dyn CameraBackend>);
        let outcome = orch.start_camera().await;
        assert!(matches!(
            outcome,
            AcquisitionOutcome::Failed(FailureReason::Camera(CameraError::StreamEnded))
        ));
        assert_eq!(camera.live_tracks(), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_attempt_supersedes_camera() {
        let camera = Arc::new(VirtualCamera::from_frames(vec![blank_frame()]).looping(true));
        let (orch, dir) = orchestrator(Arc::clone(&camera) as Arc<dyn CameraBackend>);

        let scan = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.start_camera().await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(camera.live_tracks(), 1);
        assert_eq!(orch.live_resource(), Some("camera"));

        let (photo, _) = hard_photo();
        let upload = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.submit_file(photo).await })
        };
        // The camera is released as soon as the new attempt begins
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(camera.live_tracks(), 0);
        assert!(scan.await.unwrap().is_cancelled());

        let outcome = upload.await.unwrap();
        assert!(matches!(outcome, AcquisitionOutcome::NeedsManualCrop(_)));
        assert_eq!(camera.live_tracks() + orch.previews().live_count(), 1);

        orch.cancel();
        assert_eq!(orch.previews().live_count(), 0);
        assert!(matches!(orch.state(), AcquisitionState::Idle));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_supersedes_pending_camera_open() {
        let camera = Arc::new(
            VirtualCamera::from_frames(vec![qr_frame("camera")])
                .looping(true)
                .with_open_delay(Duration::from_millis(500)),
        );
        let (orch, dir) = orchestrator(Arc::clone(&camera) as Arc<dyn CameraBackend>);

        let scan = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.start_camera().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(camera.streams_opened(), 0);

        // The permission prompt resolves while the upload is being paced
        let outcome = orch.submit_file(qr_png("upload")).await;
        assert_eq!(outcome.payload().map(|p| p.as_str()), Some("upload"));
        assert!(scan.await.unwrap().is_cancelled());

        // The late stream was opened and stopped without ever being installed
        assert_eq!(camera.streams_opened(), 1);
        assert_eq!(camera.live_tracks(), 0);
        assert_eq!(orch.live_resource(), None);
        assert!(matches!(orch.state(), AcquisitionState::Resolved { .. }));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_pending_camera_open() {
        let camera = Arc::new(
            VirtualCamera::from_frames(vec![blank_frame()])
                .looping(true)
                .with_open_delay(Duration::from_millis(500)),
        );
        let (orch, dir) = orchestrator(Arc::clone(&camera) as Arc<dyn CameraBackend>);

        let scan = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.start_camera().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        orch.cancel();

        assert!(scan.await.unwrap().is_cancelled());
        assert_eq!(camera.streams_opened(), 1);
        assert_eq!(camera.live_tracks(), 0);
        assert!(matches!(orch.state(), AcquisitionState::Idle));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    /// HEIF container holding a QR code followed by a second, blank image
    struct BurstHeif;

    impl HeifTranscoder for BurstHeif {
        fn decode_all(&self, _bytes: &[u8]) -> Result<Vec<image::RgbImage>, String> {
            let code = image::DynamicImage::ImageLuma8(qr_gray(PAYLOAD, 6)).to_rgb8();
            let blank = image::RgbImage::from_pixel(code.width(), code.height(), image::Rgb([255; 3]));
            Ok(vec![code, blank])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_heic_upload_decodes_through_transcoder() {
        let (orch, dir) = build(Arc::new(VirtualCamera::denied()));
        let orch = orch.with_normalizer(ImageNormalizer::without_heif(80).with_transcoder(Arc::new(BurstHeif)));

        // Extension wins over the MIME type the picker reported
        let file = SourceFile::new("IMG_0042.HEIC", Some("image/jpeg".into()), vec![0u8, 1, 2, 3]);
        let outcome = orch.submit_file(file).await;
        assert_eq!(outcome.payload().map(|p| p.as_str()), Some(PAYLOAD));
        assert_eq!(orch.previews().live_count(), 0);

        let (refused, refused_dir) = build(Arc::new(VirtualCamera::denied()));
        let outcome = refused
            .with_normalizer(ImageNormalizer::without_heif(80))
            .submit_file(SourceFile::new("IMG_0043.heic", None, vec![0u8, 1, 2, 3]))
            .await;
        assert!(matches!(outcome, AcquisitionOutcome::Failed(FailureReason::Format(_))));
        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::remove_dir_all(&refused_dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_upload_discards_late_result() {
        let (orch, dir) = orchestrator(Arc::new(VirtualCamera::denied()));
        let first = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.submit_file(qr_png("first")).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = orch.submit_file(qr_png("second")).await;

        assert!(first.await.unwrap().is_cancelled());
        assert_eq!(second.payload().map(|p| p.as_str()), Some("second"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_leaks_across_sequential_attempts() {
        let camera = Arc::new(VirtualCamera::from_frames(vec![blank_frame()]).looping(true));
        let (orch, dir) = build(Arc::clone(&camera) as Arc<dyn CameraBackend>);
        let orch = Arc::new(orch.with_decoder(Arc::new(Blind)));

        for _ in 0..5 {
            let outcome = orch.submit_file(qr_png(PAYLOAD)).await;
            assert!(matches!(outcome, AcquisitionOutcome::NeedsManualCrop(_)));
            let scan = {
                let orch = Arc::clone(&orch);
                tokio::spawn(async move { orch.start_camera().await })
            };
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert_eq!(orch.previews().live_count(), 0);
            orch.cancel();
            assert!(scan.await.unwrap().is_cancelled());
        }
        assert_eq!(camera.live_tracks(), 0);
        assert_eq!(camera.streams_opened(), 5);
        assert_eq!(orch.previews().live_count(), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
