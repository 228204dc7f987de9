use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable};
use screen_translate_types::Frame;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::CaptureResult;
use crate::platform::{
    CaptureGrant, CapturePlatform, CaptureToken, DisplayMetrics, DisplayMirror, OutputSurface,
    SurfaceDescriptor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Active,
    Paused,
    WaitingToken,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Active => "active",
            CaptureState::Paused => "paused",
            CaptureState::WaitingToken => "waiting-token",
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Keep the token warm and release it in stages.
    Graceful,
    /// Release everything now.
    Force,
}

/// How long a paused capture keeps its surface and its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleasePolicy {
    pub surface_grace: Duration,
    pub token_grace: Duration,
}

impl ReleasePolicy {
    pub const DEFAULT_SURFACE_GRACE: Duration = Duration::from_secs(60);
    pub const DEFAULT_TOKEN_GRACE: Duration = Duration::from_secs(180);
}

impl Default for ReleasePolicy {
    fn default() -> Self {
        Self {
            surface_grace: Self::DEFAULT_SURFACE_GRACE,
            token_grace: Self::DEFAULT_TOKEN_GRACE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Expiry {
    DetachSurface,
    ReleaseToken,
}

#[derive(Default)]
struct Slots {
    state: CaptureState,
    token: Option<Arc<dyn CaptureToken>>,
    mirror: Option<Box<dyn DisplayMirror>>,
    surface: Option<Arc<dyn OutputSurface>>,
    timers: Vec<AbortHandle>,
    // Bumped whenever pending timers are cancelled; a timer that wakes with a
    // stale epoch does nothing.
    epoch: u64,
    // Bumped per token so a late revocation of an old token is ignored.
    generation: u64,
}

impl Slots {
    fn cancel_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn release_surfaces(&mut self) {
        if let Some(mirror) = self.mirror.take() {
            mirror.release();
        }
        if let Some(surface) = self.surface.take() {
            surface.close();
        }
    }

    fn release_all(&mut self) {
        self.release_surfaces();
        if let Some(token) = self.token.take() {
            token.release();
        }
    }
}

struct Shared {
    platform: Arc<dyn CapturePlatform>,
    policy: ReleasePolicy,
    slots: Mutex<Slots>,
    state_tx: watch::Sender<CaptureState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, slots: &mut Slots, next: CaptureState) {
        if slots.state == next {
            return;
        }
        debug!(from = %slots.state, to = %next, "capture state changed");
        slots.state = next;
        self.state_tx.send_replace(next);
    }

    fn revoke(&self, generation: u64) {
        let mut guard = self.lock();
        let slots = &mut *guard;
        if slots.generation != generation || slots.token.is_none() {
            return;
        }
        warn!(platform = self.platform.name(), "capture token revoked");
        slots.cancel_timers();
        slots.release_all();
        self.set_state(slots, CaptureState::Idle);
    }

    fn expire(&self, epoch: u64, expiry: Expiry) {
        let mut guard = self.lock();
        let slots = &mut *guard;
        if slots.epoch != epoch || slots.token.is_none() {
            return;
        }
        match expiry {
            Expiry::DetachSurface => {
                if let Some(mirror) = slots.mirror.as_ref() {
                    if let Err(err) = mirror.set_surface(None) {
                        warn!(error = %err, "failed to detach output surface");
                    }
                }
                if let Some(surface) = slots.surface.take() {
                    surface.close();
                }
                self.set_state(slots, CaptureState::WaitingToken);
                debug!("output surface detached after grace period");
            }
            Expiry::ReleaseToken => {
                slots.timers.clear();
                slots.release_all();
                self.set_state(slots, CaptureState::Idle);
                info!("capture token released after grace period");
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let slots = self.slots.get_mut().unwrap_or_else(PoisonError::into_inner);
        slots.cancel_timers();
        slots.release_all();
    }
}

/// Owner of the scarce, revocable capture token and the surfaces built on it.
///
/// Clones share the same underlying resource. Every state change happens under
/// one lock; frame copies and timer waits happen outside it.
#[derive(Clone)]
pub struct CaptureResource {
    shared: Arc<Shared>,
}

impl fmt::Debug for CaptureResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureResource")
            .field("platform", &self.shared.platform.name())
            .field("state", &self.state())
            .finish()
    }
}

impl CaptureResource {
    pub fn new(platform: Arc<dyn CapturePlatform>, policy: ReleasePolicy) -> Self {
        let (state_tx, _) = watch::channel(CaptureState::Idle);
        Self {
            shared: Arc::new(Shared {
                platform,
                policy,
                slots: Mutex::new(Slots::default()),
                state_tx,
            }),
        }
    }

    pub fn platform(&self) -> &Arc<dyn CapturePlatform> {
        &self.shared.platform
    }

    pub fn display_metrics(&self) -> DisplayMetrics {
        self.shared.platform.display_metrics()
    }

    pub fn state(&self) -> CaptureState {
        self.shared.lock().state
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.shared.state_tx.subscribe()
    }

    pub fn has_token(&self) -> bool {
        self.shared.lock().token.is_some()
    }

    /// Exchanges `grant` for a fresh token and brings capture up.
    ///
    /// Any previous token and surfaces are released first. On failure the
    /// resource is left idle and the error is returned unchanged.
    pub fn start(&self, grant: &CaptureGrant) -> CaptureResult<()> {
        let shared = &self.shared;
        let mut guard = shared.lock();
        let slots = &mut *guard;
        slots.cancel_timers();
        slots.release_all();
        slots.generation = slots.generation.wrapping_add(1);

        match self.open(slots, grant) {
            Ok(()) => {
                shared.set_state(slots, CaptureState::Active);
                info!(platform = shared.platform.name(), "capture started");
                Ok(())
            }
            Err(err) => {
                slots.release_all();
                shared.set_state(slots, CaptureState::Idle);
                warn!(error = %err, "capture start failed");
                Err(err)
            }
        }
    }

    fn open(&self, slots: &mut Slots, grant: &CaptureGrant) -> CaptureResult<()> {
        let platform = &self.shared.platform;
        let token = platform.acquire_token(grant)?;
        slots.token = Some(Arc::clone(&token));

        let weak = Arc::downgrade(&self.shared);
        let generation = slots.generation;
        token.watch_revocation(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.revoke(generation);
            }
        }));

        let metrics = platform.display_metrics();
        let surface = platform.open_surface(SurfaceDescriptor::for_display(metrics))?;
        slots.surface = Some(Arc::clone(&surface));
        slots.mirror = Some(token.create_mirror(metrics, &surface)?);
        surface.drain();
        Ok(())
    }

    /// Reuses the retained token. Returns `false` when there is none or the
    /// surfaces cannot be rebuilt; callers then fall back to [`start`]. A failed
    /// rebuild releases the token too, so nothing outlives the grace timers.
    ///
    /// [`start`]: CaptureResource::start
    pub fn resume(&self) -> bool {
        let shared = &self.shared;
        let mut guard = shared.lock();
        let slots = &mut *guard;
        slots.cancel_timers();

        let Some(token) = slots.token.clone() else {
            slots.release_surfaces();
            shared.set_state(slots, CaptureState::Idle);
            debug!("resume requested without a capture token");
            return false;
        };

        let metrics = shared.platform.display_metrics();
        let wanted = SurfaceDescriptor::for_display(metrics);
        let surface = match slots.surface.take() {
            Some(surface) if surface.descriptor() == wanted => surface,
            stale => {
                if let Some(old) = stale {
                    old.close();
                }
                match shared.platform.open_surface(wanted) {
                    Ok(surface) => surface,
                    Err(err) => {
                        warn!(error = %err, "failed to recreate output surface");
                        slots.release_all();
                        shared.set_state(slots, CaptureState::Idle);
                        return false;
                    }
                }
            }
        };
        slots.surface = Some(Arc::clone(&surface));

        if slots.mirror.as_ref().is_some_and(|mirror| !mirror.is_valid()) {
            if let Some(mirror) = slots.mirror.take() {
                mirror.release();
            }
        }
        let attached = if let Some(mirror) = slots.mirror.as_ref() {
            mirror
                .resize(metrics)
                .and_then(|()| mirror.set_surface(Some(&surface)))
        } else {
            token
                .create_mirror(metrics, &surface)
                .map(|mirror| slots.mirror = Some(mirror))
        };
        if let Err(err) = attached {
            warn!(error = %err, "failed to reattach display mirror");
            slots.release_all();
            shared.set_state(slots, CaptureState::Idle);
            return false;
        }

        surface.drain();
        shared.set_state(slots, CaptureState::Active);
        info!("capture resumed with retained token");
        true
    }

    /// Latest frame, or `None` unless capture is active. Never blocks on the
    /// platform while holding the lock.
    pub fn capture(&self) -> Option<Frame> {
        let surface = {
            let slots = self.shared.lock();
            if slots.state != CaptureState::Active {
                return None;
            }
            slots.surface.clone()?
        };

        match surface.acquire_latest() {
            Ok(Some(raw)) => match raw.into_frame() {
                Ok(frame) => Some(frame),
                Err(err) => {
                    warn!(error = %err, "discarding malformed capture image");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                debug!(error = %err, "frame acquisition failed");
                None
            }
        }
    }

    pub fn stop(&self, mode: StopMode) {
        let shared = &self.shared;
        let mut guard = shared.lock();
        let slots = &mut *guard;
        slots.cancel_timers();

        if mode == StopMode::Force {
            slots.release_all();
            shared.set_state(slots, CaptureState::Idle);
            info!("capture released");
            return;
        }

        if slots.state == CaptureState::Active {
            shared.set_state(slots, CaptureState::Paused);
        }
        if slots.token.is_none() {
            slots.release_surfaces();
            shared.set_state(slots, CaptureState::Idle);
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("no async runtime for release timers; releasing capture now");
            slots.release_all();
            shared.set_state(slots, CaptureState::Idle);
            return;
        };
        let policy = shared.policy;
        self.arm(slots, &runtime, policy.surface_grace, Expiry::DetachSurface);
        self.arm(slots, &runtime, policy.token_grace, Expiry::ReleaseToken);
        debug!(
            surface_grace = ?policy.surface_grace,
            token_grace = ?policy.token_grace,
            "capture paused"
        );
    }

    fn arm(&self, slots: &mut Slots, runtime: &Handle, delay: Duration, expiry: Expiry) {
        let weak = Arc::downgrade(&self.shared);
        let epoch = slots.epoch;
        let (handle, registration) = AbortHandle::new_pair();
        let timer = Abortable::new(
            async move {
                tokio::time::sleep(delay).await;
                if let Some(shared) = weak.upgrade() {
                    shared.expire(epoch, expiry);
                }
            },
            registration,
        );
        runtime.spawn(timer);
        slots.timers.push(handle);
    }

    /// Rebuilds the output surface when the display size changed, keeping the
    /// token and mirror. Returns whether a new surface was created.
    pub fn resize(&self) -> bool {
        let shared = &self.shared;
        let mut guard = shared.lock();
        let slots = &mut *guard;
        let Some(current) = slots.surface.clone() else {
            return false;
        };
        let metrics = shared.platform.display_metrics();
        let wanted = SurfaceDescriptor::for_display(metrics);
        if current.descriptor() == wanted {
            return false;
        }

        let surface = match shared.platform.open_surface(wanted) {
            Ok(surface) => surface,
            Err(err) => {
                warn!(error = %err, "failed to resize output surface");
                return false;
            }
        };
        if let Some(mirror) = slots.mirror.as_ref() {
            if let Err(err) = mirror
                .resize(metrics)
                .and_then(|()| mirror.set_surface(Some(&surface)))
            {
                warn!(error = %err, "failed to retarget display mirror");
            }
        }
        current.close();
        slots.surface = Some(surface);
        info!(
            width = metrics.width,
            height = metrics.height,
            "output surface resized"
        );
        true
    }
}
