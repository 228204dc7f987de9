//! Drives capture, recognition, translation and rendering for one session.
//!
//! Automatic mode samples a cheap fingerprint on a fixed period and feeds
//! changes into a [`DebounceScheduler`]; manual and fixed-interval requests
//! go straight to a cycle. All cycles share one guard so at most one is in
//! flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use screen_translate_capture::CaptureResource;
use screen_translate_comparator::{ChangeDetector, Fingerprint};
use screen_translate_ocr::layout::order_vertical_columns;
use screen_translate_ocr::{OcrEnginePool, OcrRequest};
use screen_translate_translation::{TranslationConfig, TranslationGateway};
use screen_translate_types::{Frame, Rect, TextBlock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::{Responsiveness, ResultSurface, TranslationMode};
use crate::render::{Notice, RenderItem, RenderSurface};
use crate::scheduler::{CycleTask, DebounceScheduler, DebounceTiming};
use crate::settings::SessionSettings;

/// Screen change between trigger and render above which a result is stale.
pub const STALE_THRESHOLD: f32 = 0.04;
pub const CAPTURE_ATTEMPTS: usize = 3;
pub const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(50);
/// Share of a block's area that must fall inside the region to keep it.
pub const REGION_COVERAGE: f32 = 0.25;
pub const MAX_OVERLAY_ITEMS: usize = 50;
const LANDSCAPE_SENSITIVITY: f32 = 0.6;

/// Timing and sensitivity derived from the responsiveness profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    pub sample_period: Duration,
    pub change_threshold: f32,
    /// Changes right after rendering are our own output settling.
    pub overlay_cooldown: Duration,
    pub timing: DebounceTiming,
    /// Settle delay after hiding the overlay for manual and fixed cycles.
    pub settle_delay: Duration,
    pub auto_settle_delay: Duration,
}

impl Tuning {
    pub fn new(responsiveness: Responsiveness, landscape: bool) -> Self {
        let mut tuning = match responsiveness {
            Responsiveness::Subtitle => Tuning {
                sample_period: Duration::from_millis(250),
                change_threshold: 0.010,
                overlay_cooldown: Duration::from_millis(500),
                timing: DebounceTiming {
                    debounce: Duration::from_millis(80),
                    min_interval: Duration::from_millis(350),
                },
                settle_delay: Duration::from_millis(60),
                auto_settle_delay: Duration::from_millis(60),
            },
            Responsiveness::Normal => Tuning {
                sample_period: Duration::from_millis(500),
                change_threshold: 0.018,
                overlay_cooldown: Duration::from_millis(1500),
                timing: DebounceTiming {
                    debounce: Duration::from_millis(450),
                    min_interval: Duration::from_millis(900),
                },
                settle_delay: Duration::from_millis(300),
                auto_settle_delay: Duration::from_millis(150),
            },
        };
        if landscape {
            tuning.change_threshold *= LANDSCAPE_SENSITIVITY;
        }
        tuning
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Manual,
    Auto,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Rendered { items: usize },
    /// Same text as the previous cycle.
    Repeated,
    NoText,
    NoFrame,
    /// The screen moved on while translating; a new cycle was requested.
    Stale,
    /// Another cycle holds the guard.
    Busy,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    NoFrame,
    Cooling,
    Unchanged,
    Changed,
}

/// Coarse session state published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Running with automatic triggering switched off.
    Paused,
    Armed,
    Busy,
}

/// Everything a session consumes from outside.
#[derive(Clone)]
pub struct Collaborators {
    pub capture: CaptureResource,
    pub ocr: Arc<OcrEnginePool>,
    pub gateway: Arc<TranslationGateway>,
    pub surface: Arc<dyn RenderSurface>,
}

#[derive(Default)]
struct CycleState {
    region: Option<Rect>,
    last_text: String,
    last_render: Option<Instant>,
    armed: bool,
    epoch: u64,
}

struct Inner {
    capture: CaptureResource,
    ocr: Arc<OcrEnginePool>,
    gateway: Arc<TranslationGateway>,
    surface: Arc<dyn RenderSurface>,
    settings: watch::Receiver<SessionSettings>,
    cancel: CancellationToken,
    scheduler: DebounceScheduler,
    state: Mutex<CycleState>,
    phase: watch::Sender<SessionPhase>,
}

#[derive(Clone)]
pub struct CaptureOrchestrator {
    inner: Arc<Inner>,
}

impl CaptureOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        settings: watch::Receiver<SessionSettings>,
        region: Option<Rect>,
        cancel: CancellationToken,
    ) -> Self {
        let Collaborators {
            capture,
            ocr,
            gateway,
            surface,
        } = collaborators;
        let guard = Arc::new(tokio::sync::Mutex::new(()));
        let (phase, _) = watch::channel(SessionPhase::Armed);
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let task: CycleTask = Arc::new(move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.run_cycle(CycleKind::Auto).await;
                    }
                }
                .boxed()
            });
            Inner {
                capture,
                ocr,
                gateway,
                surface,
                settings,
                scheduler: DebounceScheduler::new(task, guard, cancel.child_token()),
                cancel,
                state: Mutex::new(CycleState {
                    region,
                    armed: true,
                    ..CycleState::default()
                }),
                phase,
            }
        });
        Self { inner }
    }

    pub fn settings(&self) -> SessionSettings {
        self.inner.settings()
    }

    pub fn tuning(&self) -> Tuning {
        self.inner.tuning(&self.inner.settings())
    }

    pub fn phase(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase.subscribe()
    }

    pub fn region(&self) -> Option<Rect> {
        self.inner.state().region
    }

    pub fn set_region(&self, region: Option<Rect>) {
        let mut state = self.inner.state();
        state.region = region.filter(|rect| !rect.is_empty());
        state.last_text.clear();
        state.epoch = state.epoch.wrapping_add(1);
    }

    pub fn is_armed(&self) -> bool {
        self.inner.state().armed
    }

    /// Switches automatic triggering on or off. Arming requests a cycle
    /// straight away.
    pub fn set_armed(&self, armed: bool) {
        self.inner.state().armed = armed;
        if armed {
            self.request();
        } else {
            self.inner.scheduler.cancel_pending();
        }
        self.inner.settle_phase();
    }

    /// Queues a debounced automatic cycle.
    pub fn request(&self) {
        let tuning = self.tuning();
        self.inner.scheduler.signal(tuning.timing);
    }

    /// Runs one cycle now unless another is in flight.
    pub async fn request_manual(&self) -> CycleOutcome {
        if self.inner.cancel.is_cancelled() {
            return CycleOutcome::Cancelled;
        }
        let Ok(_permit) = self.inner.scheduler.guard().try_lock() else {
            debug!("manual request while a cycle is in flight");
            return CycleOutcome::Busy;
        };
        self.inner.run_cancellable(CycleKind::Manual).await
    }

    /// Takes one fingerprint sample and signals the scheduler on change.
    pub fn sample(&self, detector: &mut ChangeDetector) -> SampleOutcome {
        self.inner.sample(detector)
    }

    /// Forgets text, render time and pending triggers.
    pub fn reset(&self) {
        self.inner.scheduler.reset();
        let mut state = self.inner.state();
        state.last_text.clear();
        state.last_render = None;
        state.epoch = state.epoch.wrapping_add(1);
    }

    /// Starts the background loop for `mode`. Manual mode has none.
    pub fn launch(&self, mode: TranslationMode) -> Option<JoinHandle<()>> {
        let inner = Arc::clone(&self.inner);
        match mode {
            TranslationMode::Manual => None,
            TranslationMode::Auto => {
                self.request();
                Some(tokio::spawn(inner.sampling_loop()))
            }
            TranslationMode::Fixed => Some(tokio::spawn(inner.fixed_loop())),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.inner.scheduler.is_busy()
    }

    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
        self.inner.cancel.cancel();
        self.inner.phase.send_replace(SessionPhase::Idle);
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, CycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settings(&self) -> SessionSettings {
        self.settings.borrow().clone()
    }

    fn tuning(&self, settings: &SessionSettings) -> Tuning {
        let landscape = self.capture.display_metrics().is_landscape();
        Tuning::new(settings.responsiveness, landscape)
    }

    fn settle_phase(&self) {
        let phase = if self.cancel.is_cancelled() {
            SessionPhase::Idle
        } else if self.scheduler.is_busy() {
            SessionPhase::Busy
        } else if self.state().armed {
            SessionPhase::Armed
        } else {
            SessionPhase::Paused
        };
        self.phase.send_replace(phase);
    }

    async fn sampling_loop(self: Arc<Self>) {
        let mut detector = ChangeDetector::new();
        let mut epoch = self.state().epoch;
        loop {
            let (armed, current_epoch) = {
                let state = self.state();
                (state.armed, state.epoch)
            };
            if current_epoch != epoch {
                detector.reset();
                epoch = current_epoch;
            }
            // A cycle in flight hides and redraws the overlay; sampling then
            // would only see our own output.
            if armed && !self.scheduler.is_busy() {
                self.sample(&mut detector);
            }
            let period = self.tuning(&self.settings()).sample_period;
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }
        debug!("sampling loop stopped");
    }

    async fn fixed_loop(self: Arc<Self>) {
        loop {
            if self.state().armed {
                if let Ok(_permit) = self.scheduler.guard().try_lock() {
                    self.run_cancellable(CycleKind::Fixed).await;
                }
            }
            let interval = self.settings().fixed_interval;
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        debug!("fixed-interval loop stopped");
    }

    fn sample(&self, detector: &mut ChangeDetector) -> SampleOutcome {
        let settings = self.settings();
        let tuning = self.tuning(&settings);
        let cooling = self
            .state()
            .last_render
            .is_some_and(|at| at.elapsed() < tuning.overlay_cooldown);

        let Some(frame) = self.capture.capture() else {
            return SampleOutcome::NoFrame;
        };
        let (target, _) = self.crop_to_region(&frame);
        let fingerprint = Fingerprint::of(&target);

        if cooling {
            detector.observe(fingerprint);
            return SampleOutcome::Cooling;
        }
        if detector.changed(fingerprint, tuning.change_threshold) {
            self.scheduler.signal(tuning.timing);
            SampleOutcome::Changed
        } else {
            SampleOutcome::Unchanged
        }
    }

    async fn run_cancellable(&self, kind: CycleKind) -> CycleOutcome {
        tokio::select! {
            _ = self.cancel.cancelled() => CycleOutcome::Cancelled,
            outcome = self.run_cycle(kind) => outcome,
        }
    }

    /// One full cycle. The caller holds the cycle guard.
    async fn run_cycle(&self, kind: CycleKind) -> CycleOutcome {
        self.phase.send_replace(SessionPhase::Busy);
        let outcome = self.cycle(kind).await;
        debug!(?kind, ?outcome, "cycle finished");
        // The guard is still held here; report the phase the session
        // returns to once it is released.
        let phase = if self.cancel.is_cancelled() {
            SessionPhase::Idle
        } else if self.state().armed {
            SessionPhase::Armed
        } else {
            SessionPhase::Paused
        };
        self.phase.send_replace(phase);
        outcome
    }

    async fn cycle(&self, kind: CycleKind) -> CycleOutcome {
        let settings = self.settings();
        let tuning = self.tuning(&settings);

        let (frame, validation) = match kind {
            CycleKind::Auto => {
                let validation = if self.fast_track(&settings) {
                    None
                } else {
                    self.capture.capture().map(|frame| Fingerprint::of(&frame))
                };
                let frame = self.clean_capture(&settings, tuning.auto_settle_delay).await;
                (frame, validation)
            }
            CycleKind::Manual => {
                self.state().last_text.clear();
                (self.clean_capture(&settings, tuning.settle_delay).await, None)
            }
            CycleKind::Fixed => (self.clean_capture(&settings, tuning.settle_delay).await, None),
        };

        let Some(frame) = frame else {
            if kind == CycleKind::Manual {
                self.surface.notify(Notice::NoFrame);
            }
            return CycleOutcome::NoFrame;
        };
        self.process(frame, validation, kind, &settings, &tuning).await
    }

    /// True when the result window provably does not cover the region, so
    /// capturing needs no hiding.
    fn fast_track(&self, settings: &SessionSettings) -> bool {
        settings.result_surface == ResultSurface::Window
            && self.state().region.is_some()
            && !self.overlay_overlaps_region()
    }

    fn overlay_overlaps_region(&self) -> bool {
        let Some(region) = self.state().region else {
            return true;
        };
        match self.surface.bounds() {
            Some(bounds) => region.intersects(&bounds),
            None => false,
        }
    }

    /// Captures with our own overlay and trigger control out of the picture.
    async fn clean_capture(&self, settings: &SessionSettings, settle: Duration) -> Option<Frame> {
        if self.fast_track(settings) {
            return self.capture_with_retry().await;
        }
        let was_visible = self.surface.is_visible();
        self.surface.set_visible(false);
        self.surface.set_control_visible(false);
        tokio::time::sleep(settle).await;
        let frame = self.capture_with_retry().await;
        self.surface.set_control_visible(true);
        self.surface.set_visible(was_visible);
        frame
    }

    async fn capture_with_retry(&self) -> Option<Frame> {
        for attempt in 1..=CAPTURE_ATTEMPTS {
            if let Some(frame) = self.capture.capture() {
                return Some(frame);
            }
            if attempt < CAPTURE_ATTEMPTS {
                tokio::time::sleep(CAPTURE_RETRY_DELAY).await;
            }
        }
        debug!(attempts = CAPTURE_ATTEMPTS, "no frame available");
        None
    }

    /// Region in frame pixels, scaled from screen coordinates.
    fn frame_region(&self, frame: &Frame) -> Option<Rect> {
        let region = self.state().region?;
        let (sx, sy) = self.screen_to_frame(frame);
        Some(region.scale(sx, sy))
    }

    fn screen_to_frame(&self, frame: &Frame) -> (f32, f32) {
        let metrics = self.capture.display_metrics();
        (
            frame.width() as f32 / metrics.width.max(1) as f32,
            frame.height() as f32 / metrics.height.max(1) as f32,
        )
    }

    fn crop_to_region(&self, frame: &Frame) -> (Frame, (u32, u32)) {
        let Some(pixels) = self
            .frame_region(frame)
            .and_then(|rect| rect.to_pixel_rect(frame.width(), frame.height()))
        else {
            return (frame.clone(), (0, 0));
        };
        match frame.crop(pixels) {
            Ok(cropped) => (cropped, (pixels.x, pixels.y)),
            Err(err) => {
                warn!(error = %err, "region crop failed; using full frame");
                (frame.clone(), (0, 0))
            }
        }
    }

    async fn recognize(&self, frame: &Frame, settings: &SessionSettings) -> Vec<TextBlock> {
        let (target, (x, y)) = self.crop_to_region(frame);
        let pool = Arc::clone(&self.ocr);
        let kind = settings.ocr_engine;
        let language = settings.source_language.clone();
        // Switching kinds shuts down and warms engines, so the lookup blocks too.
        let result = tokio::task::spawn_blocking(move || {
            let engine = pool.get(kind)?;
            let request = OcrRequest::new(&target)
                .with_language(language.as_deref())
                .with_origin(x, y);
            engine.recognize(&request)
        })
        .await;
        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(engine = %kind, error = %err, "recognition failed");
                return Vec::new();
            }
            Err(err) => {
                warn!(error = %err, "recognition task failed");
                return Vec::new();
            }
        };
        response
            .blocks
            .into_iter()
            .map(|block| TextBlock {
                bounds: block.bounds.offset(x as f32, y as f32),
                text: block.text,
            })
            .collect()
    }

    async fn process(
        &self,
        frame: Frame,
        validation: Option<Fingerprint>,
        kind: CycleKind,
        settings: &SessionSettings,
        tuning: &Tuning,
    ) -> CycleOutcome {
        let mut blocks = self.recognize(&frame, settings).await;
        if let Some(region) = self.frame_region(&frame) {
            blocks.retain(|block| covered_by(&block.bounds, &region));
        }
        if settings.vertical_columns {
            blocks = order_vertical_columns(blocks);
        }

        let text = blocks
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
        if text.is_empty() {
            if kind == CycleKind::Manual {
                self.surface.notify(Notice::NoText);
            }
            return CycleOutcome::NoText;
        }
        {
            let mut state = self.state();
            if kind != CycleKind::Manual && state.last_text == text {
                return CycleOutcome::Repeated;
            }
            state.last_text = text.clone();
        }

        let items = match settings.result_surface {
            ResultSurface::Window => {
                let translated = if settings.same_language() {
                    text
                } else {
                    self.gateway
                        .translate_or_original(
                            &text,
                            settings.source_language.as_deref(),
                            &settings.target_language,
                            &translation_config(settings),
                        )
                        .await
                };
                vec![RenderItem::text(translated)]
            }
            ResultSurface::Overlay => self.overlay_items(&frame, &blocks, settings).await,
        };

        if self.cancel.is_cancelled() {
            return CycleOutcome::Cancelled;
        }
        if let Some(before) = validation {
            if let Some(now) = self.capture.capture() {
                let moved = before.difference(&Fingerprint::of(&now));
                if moved > STALE_THRESHOLD {
                    debug!(difference = moved, "screen changed during cycle; retrying");
                    self.scheduler.signal(tuning.timing);
                    return CycleOutcome::Stale;
                }
            }
        }

        self.surface.show(&items);
        self.state().last_render = Some(Instant::now());
        info!(items = items.len(), ?kind, "rendered translation");
        CycleOutcome::Rendered { items: items.len() }
    }

    /// Per-block translations placed in screen coordinates. Blocks the
    /// gateway cannot translate are left out.
    async fn overlay_items(
        &self,
        frame: &Frame,
        blocks: &[TextBlock],
        settings: &SessionSettings,
    ) -> Vec<RenderItem> {
        let (sx, sy) = self.screen_to_frame(frame);
        let config = translation_config(settings);
        let mut items = Vec::new();
        let candidates = blocks
            .iter()
            .filter(|block| {
                !block.text.trim().is_empty()
                    && block.bounds.width() > 1.0
                    && block.bounds.height() > 1.0
            })
            .take(MAX_OVERLAY_ITEMS);
        for block in candidates {
            let source = block.text.trim();
            let translated = if settings.same_language() {
                Some(source.to_string())
            } else {
                self.gateway
                    .translate(
                        source,
                        settings.source_language.as_deref(),
                        &settings.target_language,
                        &config,
                    )
                    .await
            };
            let Some(translated) = translated.filter(|text| !text.trim().is_empty()) else {
                continue;
            };
            items.push(RenderItem::placed(
                translated,
                block.bounds.scale(1.0 / sx, 1.0 / sy),
            ));
        }
        items
    }
}

fn translation_config(settings: &SessionSettings) -> TranslationConfig {
    TranslationConfig {
        engine: settings.engine.clone(),
        cache_enabled: settings.cache_enabled,
    }
}

fn covered_by(bounds: &Rect, region: &Rect) -> bool {
    let area = bounds.area();
    if area <= 0.0 {
        return false;
    }
    bounds
        .intersection(region)
        .is_some_and(|inside| inside.area() / area >= REGION_COVERAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ScreenLayerSurface;
    use async_trait::async_trait;
    use screen_translate_capture::backends::mock::{MockPlatform, MockScreen};
    use screen_translate_capture::{CapturePlatform, ReleasePolicy};
    use screen_translate_ocr::{OcrEngine, OcrEngineKind, OcrError, OcrResponse};
    use screen_translate_translation::{
        LruTranslationCache, TranslateError, TranslationEngine, TranslationRequest,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Recognizes whatever blocks the test scripted, in frame coordinates.
    struct ScriptedOcr {
        blocks: Mutex<Vec<TextBlock>>,
        calls: AtomicUsize,
    }

    impl OcrEngine for ScriptedOcr {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn recognize(&self, request: &OcrRequest<'_>) -> Result<OcrResponse, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (x, y) = request.origin();
            let blocks = self
                .blocks
                .lock()
                .unwrap()
                .iter()
                .map(|block| {
                    TextBlock::new(
                        block.text.clone(),
                        block.bounds.offset(-(x as f32), -(y as f32)),
                    )
                })
                .collect();
            Ok(OcrResponse::new(blocks))
        }
    }

    struct Upper;

    #[async_trait]
    impl TranslationEngine for Upper {
        fn id(&self) -> &str {
            "upper"
        }

        async fn translate(&self, request: &TranslationRequest<'_>) -> Result<String, TranslateError> {
            Ok(request.text.to_uppercase())
        }
    }

    struct Fixture {
        screen: Arc<MockScreen>,
        platform: Arc<MockPlatform>,
        surface: Arc<ScreenLayerSurface>,
        ocr: Arc<ScriptedOcr>,
        engine_builds: Arc<Mutex<Vec<(OcrEngineKind, std::thread::ThreadId)>>>,
        settings: watch::Sender<SessionSettings>,
        orchestrator: CaptureOrchestrator,
    }

    impl Fixture {
        fn new(settings: SessionSettings, region: Option<Rect>, window: Option<Rect>) -> Self {
            let screen = MockScreen::new(200, 100);
            let platform = Arc::new(MockPlatform::new(Arc::clone(&screen)));
            let capture = CaptureResource::new(
                Arc::clone(&platform) as Arc<dyn CapturePlatform>,
                ReleasePolicy::default(),
            );
            capture.start(&MockPlatform::grant()).unwrap();
            let surface = Arc::new(ScreenLayerSurface::new(
                Arc::clone(&screen),
                window,
                Some(Rect::new(190.0, 0.0, 200.0, 10.0)),
            ));
            let ocr = Arc::new(ScriptedOcr {
                blocks: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            });
            let pool_engine = Arc::clone(&ocr);
            let engine_builds = Arc::new(Mutex::new(Vec::new()));
            let builds = Arc::clone(&engine_builds);
            let pool = OcrEnginePool::new(Box::new(move |kind: OcrEngineKind| {
                builds.lock().unwrap().push((kind, std::thread::current().id()));
                Ok(Arc::clone(&pool_engine) as Arc<dyn OcrEngine>)
            }));
            let gateway = TranslationGateway::new(Arc::new(LruTranslationCache::new(64)))
                .with_engine(Arc::new(Upper));
            let (settings_tx, settings_rx) = watch::channel(settings);
            let orchestrator = CaptureOrchestrator::new(
                Collaborators {
                    capture,
                    ocr: Arc::new(pool),
                    gateway: Arc::new(gateway),
                    surface: Arc::clone(&surface) as Arc<dyn RenderSurface>,
                },
                settings_rx,
                region,
                CancellationToken::new(),
            );
            Self {
                screen,
                platform,
                surface,
                ocr,
                engine_builds,
                settings: settings_tx,
                orchestrator,
            }
        }

        fn script(&self, blocks: &[(&str, Rect)]) {
            *self.ocr.blocks.lock().unwrap() = blocks
                .iter()
                .map(|(text, bounds)| TextBlock::new(*text, *bounds))
                .collect();
        }
    }

    fn settings(surface: ResultSurface) -> SessionSettings {
        SessionSettings {
            mode: TranslationMode::Manual,
            result_surface: surface,
            source_language: Some("ja".into()),
            target_language: "en".into(),
            engine: "upper".into(),
            ..SessionSettings::default()
        }
    }

    #[test]
    fn landscape_lowers_the_change_threshold() {
        let portrait = Tuning::new(Responsiveness::Normal, false);
        let landscape = Tuning::new(Responsiveness::Normal, true);
        assert!((portrait.change_threshold - 0.018).abs() < 1e-6);
        assert!((landscape.change_threshold - 0.0108).abs() < 1e-6);
        assert!(Tuning::new(Responsiveness::Subtitle, false).sample_period < portrait.sample_period);
    }

    #[test]
    fn coverage_filter_uses_a_quarter_of_the_block() {
        let region = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(covered_by(&Rect::new(75.0, 0.0, 175.0, 10.0), &region));
        assert!(!covered_by(&Rect::new(80.0, 0.0, 180.0, 10.0), &region));
        assert!(!covered_by(&Rect::new(10.0, 10.0, 10.0, 20.0), &region));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_window_cycle_translates_joined_text() {
        let fx = Fixture::new(settings(ResultSurface::Window), None, None);
        fx.script(&[
            ("konnichiwa", Rect::new(0.0, 0.0, 50.0, 10.0)),
            ("sekai", Rect::new(0.0, 20.0, 50.0, 30.0)),
        ]);
        let outcome = fx.orchestrator.request_manual().await;
        assert_eq!(outcome, CycleOutcome::Rendered { items: 1 });
        assert_eq!(
            fx.surface.last_shown().unwrap(),
            vec![RenderItem::text("KONNICHIWA\nSEKAI")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn manual_cycle_reports_missing_text() {
        let fx = Fixture::new(settings(ResultSurface::Window), None, None);
        assert_eq!(fx.orchestrator.request_manual().await, CycleOutcome::NoText);
        assert_eq!(fx.surface.notices(), vec![Notice::NoText]);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_cycle_reports_missing_frame() {
        let fx = Fixture::new(settings(ResultSurface::Window), None, None);
        fx.platform.starve(10);
        assert_eq!(fx.orchestrator.request_manual().await, CycleOutcome::NoFrame);
        assert_eq!(fx.surface.notices(), vec![Notice::NoFrame]);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_retries_transient_gaps() {
        let fx = Fixture::new(settings(ResultSurface::Window), None, None);
        fx.script(&[("hi", Rect::new(0.0, 0.0, 50.0, 10.0))]);
        fx.platform.starve(CAPTURE_ATTEMPTS - 1);
        assert_eq!(
            fx.orchestrator.request_manual().await,
            CycleOutcome::Rendered { items: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn overlay_items_are_scaled_filtered_and_capped() {
        let fx = Fixture::new(settings(ResultSurface::Overlay), None, None);
        let mut script: Vec<(String, Rect)> = (0..60)
            .map(|i| (format!("w{i}"), Rect::new(0.0, i as f32, 20.0, i as f32 + 2.0)))
            .collect();
        script.insert(0, ("   ".into(), Rect::new(0.0, 0.0, 10.0, 10.0)));
        script.insert(1, ("thin".into(), Rect::new(0.0, 0.0, 1.0, 10.0)));
        let borrowed: Vec<(&str, Rect)> = script.iter().map(|(t, r)| (t.as_str(), *r)).collect();
        fx.script(&borrowed);

        let outcome = fx.orchestrator.request_manual().await;
        // Blank and one-pixel blocks are dropped before the cap applies.
        assert_eq!(outcome, CycleOutcome::Rendered { items: MAX_OVERLAY_ITEMS });
        let shown = fx.surface.last_shown().unwrap();
        assert_eq!(shown[0], RenderItem::placed("W0", Rect::new(0.0, 0.0, 20.0, 2.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn same_language_skips_translation() {
        let mut s = settings(ResultSurface::Window);
        s.target_language = "ja".into();
        let fx = Fixture::new(s, None, None);
        fx.script(&[("konnichiwa", Rect::new(0.0, 0.0, 50.0, 10.0))]);
        fx.orchestrator.request_manual().await;
        assert_eq!(
            fx.surface.last_shown().unwrap(),
            vec![RenderItem::text("konnichiwa")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn region_keeps_blocks_mostly_inside() {
        let region = Rect::new(0.0, 0.0, 100.0, 50.0);
        let fx = Fixture::new(settings(ResultSurface::Window), Some(region), None);
        fx.script(&[
            ("inside", Rect::new(10.0, 10.0, 60.0, 20.0)),
            ("outside", Rect::new(120.0, 10.0, 180.0, 20.0)),
            ("edge", Rect::new(92.0, 30.0, 132.0, 40.0)),
        ]);
        fx.orchestrator.request_manual().await;
        assert_eq!(
            fx.surface.last_shown().unwrap(),
            vec![RenderItem::text("INSIDE")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn clean_capture_hides_overlay_and_restores_it() {
        let fx = Fixture::new(settings(ResultSurface::Overlay), None, None);
        fx.surface.show(&[RenderItem::placed("old", Rect::new(0.0, 0.0, 50.0, 50.0))]);
        assert!(fx.screen.has_layer("overlay-0"));

        let inner = Arc::clone(&fx.orchestrator.inner);
        let frame = inner
            .clean_capture(&fx.orchestrator.settings(), Duration::from_millis(60))
            .await
            .unwrap();
        // Neither the overlay nor the trigger control made it into the frame.
        assert_eq!(&frame.data()[..4], &[0, 0, 0, 0]);
        let control = (5 * 200 + 195) * 4;
        assert_eq!(&frame.data()[control..control + 4], &[0, 0, 0, 0]);
        assert!(fx.screen.has_layer("overlay-0"));
        assert!(fx.surface.control_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn fast_track_skips_hiding_when_window_is_clear_of_region() {
        let region = Rect::new(0.0, 0.0, 100.0, 50.0);
        let window = Rect::new(0.0, 80.0, 200.0, 100.0);
        let fx = Fixture::new(settings(ResultSurface::Window), Some(region), Some(window));
        let inner = Arc::clone(&fx.orchestrator.inner);
        assert!(inner.fast_track(&fx.orchestrator.settings()));

        fx.orchestrator.set_region(Some(Rect::new(0.0, 50.0, 100.0, 90.0)));
        assert!(!inner.fast_track(&fx.orchestrator.settings()));
        fx.orchestrator.set_region(None);
        assert!(!inner.fast_track(&fx.orchestrator.settings()));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_text_is_skipped_outside_manual_mode() {
        let fx = Fixture::new(settings(ResultSurface::Window), None, None);
        fx.script(&[("same", Rect::new(0.0, 0.0, 50.0, 10.0))]);
        let inner = Arc::clone(&fx.orchestrator.inner);
        let permit = inner.scheduler.guard().try_lock().unwrap();
        assert_eq!(
            inner.run_cycle(CycleKind::Fixed).await,
            CycleOutcome::Rendered { items: 1 }
        );
        assert_eq!(inner.run_cycle(CycleKind::Fixed).await, CycleOutcome::Repeated);
        drop(permit);
        assert_eq!(
            fx.orchestrator.request_manual().await,
            CycleOutcome::Rendered { items: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn manual_request_is_refused_while_a_cycle_runs() {
        let fx = Fixture::new(settings(ResultSurface::Window), None, None);
        let _held = fx.orchestrator.inner.scheduler.guard().try_lock().unwrap();
        assert_eq!(fx.orchestrator.request_manual().await, CycleOutcome::Busy);
    }

    #[tokio::test(start_paused = true)]
    async fn sampling_signals_on_change_and_ignores_cooldown() {
        let mut s = settings(ResultSurface::Window);
        s.responsiveness = Responsiveness::Normal;
        let fx = Fixture::new(s, None, None);
        let mut detector = ChangeDetector::new();

        assert_eq!(fx.orchestrator.sample(&mut detector), SampleOutcome::Changed);
        fx.orchestrator.inner.scheduler.cancel_pending();
        assert_eq!(fx.orchestrator.sample(&mut detector), SampleOutcome::Unchanged);

        fx.orchestrator.inner.state().last_render = Some(Instant::now());
        fx.screen.fill([200, 200, 200, 255]);
        assert_eq!(fx.orchestrator.sample(&mut detector), SampleOutcome::Cooling);
        // The cooled sample became the baseline.
        tokio::time::advance(Duration::from_millis(1600)).await;
        assert_eq!(fx.orchestrator.sample(&mut detector), SampleOutcome::Unchanged);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_results_are_discarded_and_rescheduled() {
        let fx = Fixture::new(settings(ResultSurface::Window), None, None);
        fx.script(&[("hello", Rect::new(0.0, 0.0, 50.0, 10.0))]);
        let inner = Arc::clone(&fx.orchestrator.inner);
        let frame = inner.capture.capture().unwrap();
        let before = Fingerprint::of(&frame);
        fx.screen.fill([255, 255, 255, 255]);

        let settings = fx.orchestrator.settings();
        let tuning = fx.orchestrator.tuning();
        let outcome = inner
            .process(frame, Some(before), CycleKind::Auto, &settings, &tuning)
            .await;
        assert_eq!(outcome, CycleOutcome::Stale);
        assert!(fx.surface.last_shown().is_none());
        assert!(inner.scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn settings_changes_apply_to_the_next_cycle() {
        let fx = Fixture::new(settings(ResultSurface::Window), None, None);
        fx.script(&[("hello", Rect::new(0.0, 0.0, 50.0, 10.0))]);
        fx.settings.send_modify(|s| s.target_language = "ja".into());
        fx.orchestrator.request_manual().await;
        assert_eq!(fx.surface.last_shown().unwrap(), vec![RenderItem::text("hello")]);
        assert_eq!(fx.ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_switch_happens_off_the_async_thread() {
        let fx = Fixture::new(settings(ResultSurface::Window), None, None);
        fx.script(&[("hello", Rect::new(0.0, 0.0, 50.0, 10.0))]);
        fx.orchestrator.request_manual().await;
        fx.settings.send_modify(|s| s.ocr_engine = OcrEngineKind::Sidecar);
        fx.orchestrator.request_manual().await;

        let here = std::thread::current().id();
        let builds = fx.engine_builds.lock().unwrap().clone();
        let kinds: Vec<_> = builds.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds, vec![OcrEngineKind::Noop, OcrEngineKind::Sidecar]);
        assert!(builds.iter().all(|(_, thread)| *thread != here));
        assert_eq!(fx.ocr.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_and_reports_idle() {
        let fx = Fixture::new(settings(ResultSurface::Window), None, None);
        let phase = fx.orchestrator.phase();
        fx.orchestrator.shutdown();
        assert_eq!(*phase.borrow(), SessionPhase::Idle);
        assert_eq!(fx.orchestrator.request_manual().await, CycleOutcome::Cancelled);
    }
}
