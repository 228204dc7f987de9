use std::sync::Arc;

use screen_translate_capture::{CaptureError, CaptureGrant, CaptureResource, CaptureState, StopMode};
use screen_translate_ocr::{OcrEnginePool, OcrError};
use screen_translate_translation::TranslationGateway;
use screen_translate_types::Rect;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::{CaptureOrchestrator, Collaborators, CycleOutcome, SessionPhase};
use crate::render::{Notice, RenderSurface};
use crate::settings::{SessionSettings, clamp_cache_capacity};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("screen capture permission is required to start")]
    PermissionRequired,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("ocr engine unavailable: {0}")]
    Ocr(#[from] OcrError),
}

/// One running translation session: owns the orchestrator loops and the
/// watchers that follow capture state and live settings.
pub struct TranslationSession {
    orchestrator: CaptureOrchestrator,
    capture: CaptureResource,
    surface: Arc<dyn RenderSurface>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TranslationSession {
    /// Resumes the retained capture token if there is one, otherwise trades
    /// `grant` for a new token.
    pub async fn start(
        collaborators: Collaborators,
        settings: watch::Receiver<SessionSettings>,
        region: Option<Rect>,
        grant: Option<&CaptureGrant>,
    ) -> Result<Self, SessionError> {
        let capture = collaborators.capture.clone();
        if !capture.resume() {
            let Some(grant) = grant else {
                return Err(SessionError::PermissionRequired);
            };
            capture.start(grant)?;
        }

        let snapshot = settings.borrow().clone();
        if let Err(err) = warm_up(&collaborators.ocr, &snapshot).await {
            capture.stop(StopMode::Graceful);
            return Err(err);
        }
        collaborators
            .gateway
            .cache()
            .set_capacity(clamp_cache_capacity(snapshot.cache_capacity));

        let cancel = CancellationToken::new();
        let surface = Arc::clone(&collaborators.surface);
        let gateway = Arc::clone(&collaborators.gateway);
        let orchestrator =
            CaptureOrchestrator::new(collaborators, settings.clone(), region, cancel.child_token());

        let tasks = vec![
            tokio::spawn(watch_capture(
                capture.subscribe(),
                orchestrator.clone(),
                Arc::clone(&surface),
                cancel.clone(),
            )),
            tokio::spawn(watch_settings(
                settings,
                orchestrator.clone(),
                gateway,
                cancel.clone(),
            )),
        ];

        info!(
            mode = ?snapshot.mode,
            responsiveness = ?snapshot.responsiveness,
            surface = ?snapshot.result_surface,
            "translation session started"
        );
        Ok(Self {
            orchestrator,
            capture,
            surface,
            cancel,
            tasks,
        })
    }

    pub fn orchestrator(&self) -> &CaptureOrchestrator {
        &self.orchestrator
    }

    pub fn phase(&self) -> watch::Receiver<SessionPhase> {
        self.orchestrator.phase()
    }

    pub async fn request_manual(&self) -> CycleOutcome {
        self.orchestrator.request_manual().await
    }

    pub fn set_armed(&self, armed: bool) {
        self.orchestrator.set_armed(armed);
    }

    pub fn set_region(&self, region: Option<Rect>) {
        self.orchestrator.set_region(region);
    }

    /// Display size or orientation changed: rebuild the capture surface and
    /// drop the region, which no longer maps onto the screen.
    pub fn on_layout_changed(&self) {
        if self.capture.resize() {
            info!(metrics = ?self.capture.display_metrics(), "capture surface resized");
        }
        self.orchestrator.set_region(None);
        self.orchestrator.reset();
    }

    pub fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the session has stopped, by request or because capture
    /// permission was lost.
    pub async fn terminated(&self) {
        self.cancel.cancelled().await;
    }

    pub fn stop(&self, mode: StopMode) {
        self.shutdown();
        self.surface.hide();
        self.capture.stop(mode);
        info!(?mode, "translation session stopped");
    }

    fn shutdown(&self) {
        self.cancel.cancel();
        self.orchestrator.shutdown();
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for TranslationSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn warm_up(ocr: &Arc<OcrEnginePool>, settings: &SessionSettings) -> Result<(), SessionError> {
    let pool = Arc::clone(ocr);
    let kind = settings.ocr_engine;
    match tokio::task::spawn_blocking(move || pool.get(kind).map(|_| ())).await {
        Ok(result) => result.map_err(SessionError::from),
        Err(err) => Err(SessionError::Ocr(OcrError::backend(err.to_string()))),
    }
}

fn status_line(state: CaptureState) -> &'static str {
    match state {
        CaptureState::Active => "capturing the screen",
        CaptureState::Paused => "capture paused",
        CaptureState::WaitingToken => "waiting for capture permission",
        CaptureState::Idle => "capture stopped",
    }
}

async fn watch_capture(
    mut states: watch::Receiver<CaptureState>,
    orchestrator: CaptureOrchestrator,
    surface: Arc<dyn RenderSurface>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let state = *states.borrow_and_update();
        info!(%state, "{}", status_line(state));
        if state == CaptureState::Idle {
            warn!("capture ended underneath the session; terminating");
            orchestrator.shutdown();
            surface.hide();
            surface.notify(Notice::CaptureLost);
            cancel.cancel();
            break;
        }
    }
}

async fn watch_settings(
    mut settings: watch::Receiver<SessionSettings>,
    orchestrator: CaptureOrchestrator,
    gateway: Arc<TranslationGateway>,
    cancel: CancellationToken,
) {
    let mut current = settings.borrow_and_update().clone();
    let mut mode_task = orchestrator.launch(current.mode);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = settings.changed() => {
                if changed.is_err() {
                    // No more updates; keep the current mode until stopped.
                    cancel.cancelled().await;
                    break;
                }
            }
        }
        let next = settings.borrow_and_update().clone();
        if next.cache_capacity != current.cache_capacity {
            let capacity = clamp_cache_capacity(next.cache_capacity);
            gateway.cache().set_capacity(capacity);
            info!(capacity, "translation cache resized");
        }
        if next.mode != current.mode {
            if let Some(task) = mode_task.take() {
                task.abort();
            }
            orchestrator.reset();
            mode_task = orchestrator.launch(next.mode);
            info!(mode = ?next.mode, "translation mode changed");
        }
        if next.ocr_engine != current.ocr_engine {
            debug!(engine = %next.ocr_engine, "ocr engine switches on the next cycle");
        }
        current = next;
    }
    if let Some(task) = mode_task {
        task.abort();
    }
}
