use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use screen_translate_capture::backends::mock::MockScreen;
use screen_translate_types::Rect;
use serde::Serialize;
use tracing::{info, warn};

/// One piece of translated text. `bounds` is in screen coordinates; `None`
/// means free-standing text for the result window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderItem {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Rect>,
}

impl RenderItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bounds: None,
        }
    }

    pub fn placed(text: impl Into<String>, bounds: Rect) -> Self {
        Self {
            text: text.into(),
            bounds: Some(bounds),
        }
    }
}

/// User-facing status messages that are not translations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NoFrame,
    NoText,
    TranslationFailed(String),
    CaptureLost,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NoFrame => f.write_str("no screen frame available"),
            Notice::NoText => f.write_str("no text recognized"),
            Notice::TranslationFailed(reason) => write!(f, "translation failed: {reason}"),
            Notice::CaptureLost => f.write_str("screen capture permission was revoked"),
        }
    }
}

/// Where results are drawn. Implementations live on the UI side; the
/// orchestrator only toggles visibility and asks for bounds.
pub trait RenderSurface: Send + Sync {
    fn show(&self, items: &[RenderItem]);

    /// Clears content and hides the surface.
    fn hide(&self);

    /// Temporarily hides or restores the surface without touching content.
    fn set_visible(&self, visible: bool);

    fn is_visible(&self) -> bool;

    /// The floating trigger control drawn above captured content.
    fn set_control_visible(&self, visible: bool);

    /// Bounds of the separate result window, if there is one.
    fn bounds(&self) -> Option<Rect>;

    fn notify(&self, notice: Notice);
}

/// Writes results to the log, or to stdout as JSON lines.
#[derive(Debug)]
pub struct LogSurface {
    json: bool,
    visible: AtomicBool,
}

impl LogSurface {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            visible: AtomicBool::new(true),
        }
    }
}

impl RenderSurface for LogSurface {
    fn show(&self, items: &[RenderItem]) {
        if self.json {
            match serde_json::to_string(items) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(error = %err, "failed to encode rendered items"),
            }
            return;
        }
        for item in items {
            match item.bounds {
                Some(bounds) => info!(
                    left = bounds.left,
                    top = bounds.top,
                    right = bounds.right,
                    bottom = bounds.bottom,
                    "{}",
                    item.text
                ),
                None => info!("{}", item.text),
            }
        }
    }

    fn hide(&self) {
        self.visible.store(false, Ordering::Relaxed);
    }

    fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Relaxed);
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    fn set_control_visible(&self, _visible: bool) {}

    fn bounds(&self) -> Option<Rect> {
        None
    }

    fn notify(&self, notice: Notice) {
        info!(notice = %notice, "status");
    }
}

const OVERLAY_COLOR: [u8; 4] = [255, 255, 255, 255];
const WINDOW_COLOR: [u8; 4] = [240, 240, 240, 255];
const CONTROL_COLOR: [u8; 4] = [255, 64, 64, 255];

#[derive(Default)]
struct LayerState {
    items: Vec<RenderItem>,
    painted: usize,
    visible: bool,
    control_visible: bool,
    history: Vec<Vec<RenderItem>>,
    notices: Vec<Notice>,
}

/// Paints results onto a [`MockScreen`] as layers, so whatever is shown
/// ends up in the next captured frame just like a real overlay would.
pub struct ScreenLayerSurface {
    screen: Arc<MockScreen>,
    window: Option<Rect>,
    control: Option<Rect>,
    state: Mutex<LayerState>,
}

impl ScreenLayerSurface {
    /// `window` is the result window when results are shown in one;
    /// `control` is where the floating trigger sits.
    pub fn new(screen: Arc<MockScreen>, window: Option<Rect>, control: Option<Rect>) -> Self {
        let surface = Self {
            screen,
            window,
            control,
            state: Mutex::new(LayerState {
                visible: true,
                control_visible: true,
                ..LayerState::default()
            }),
        };
        surface.repaint(&mut surface.lock());
        surface
    }

    fn lock(&self) -> MutexGuard<'_, LayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every batch passed to [`RenderSurface::show`], oldest first.
    pub fn history(&self) -> Vec<Vec<RenderItem>> {
        self.lock().history.clone()
    }

    pub fn last_shown(&self) -> Option<Vec<RenderItem>> {
        self.lock().history.last().cloned()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.lock().notices.clone()
    }

    pub fn control_visible(&self) -> bool {
        self.lock().control_visible
    }

    fn repaint(&self, state: &mut LayerState) {
        for index in 0..state.painted {
            self.screen.set_layer(&format!("overlay-{index}"), None);
        }
        state.painted = 0;

        let showing = state.visible && !state.items.is_empty();
        match self.window {
            Some(window) => {
                self.screen
                    .set_layer("window", showing.then_some((window, WINDOW_COLOR)));
            }
            None if showing => {
                for (index, item) in state.items.iter().enumerate() {
                    if let Some(bounds) = item.bounds {
                        self.screen
                            .set_layer(&format!("overlay-{index}"), Some((bounds, OVERLAY_COLOR)));
                    }
                }
                state.painted = state.items.len();
            }
            None => {}
        }

        if let Some(control) = self.control {
            self.screen.set_layer(
                "control",
                state.control_visible.then_some((control, CONTROL_COLOR)),
            );
        }
    }
}

impl RenderSurface for ScreenLayerSurface {
    fn show(&self, items: &[RenderItem]) {
        let mut state = self.lock();
        state.items = items.to_vec();
        state.visible = true;
        state.history.push(items.to_vec());
        self.repaint(&mut state);
    }

    fn hide(&self) {
        let mut state = self.lock();
        state.items.clear();
        state.visible = false;
        self.repaint(&mut state);
    }

    fn set_visible(&self, visible: bool) {
        let mut state = self.lock();
        state.visible = visible;
        self.repaint(&mut state);
    }

    fn is_visible(&self) -> bool {
        self.lock().visible
    }

    fn set_control_visible(&self, visible: bool) {
        let mut state = self.lock();
        state.control_visible = visible;
        self.repaint(&mut state);
    }

    fn bounds(&self) -> Option<Rect> {
        self.window
    }

    fn notify(&self, notice: Notice) {
        self.lock().notices.push(notice);
    }
}
