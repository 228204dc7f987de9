//! In-memory capture platform for tests and headless runs.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use screen_translate_types::{BYTES_PER_PIXEL, Rect};

use crate::error::{CaptureError, CaptureResult};
use crate::platform::{
    CaptureGrant, CapturePlatform, CaptureToken, DisplayMetrics, DisplayMirror, OutputSurface,
    RawImage, RevocationCallback, SurfaceDescriptor,
};

struct Layer {
    key: String,
    rect: Rect,
    color: [u8; 4],
}

struct ScreenContent {
    metrics: DisplayMetrics,
    pixels: Vec<u8>,
    layers: Vec<Layer>,
}

/// A fake display: a base image plus named layers painted on top, standing
/// in for windows the application itself draws.
pub struct MockScreen {
    content: Mutex<ScreenContent>,
}

impl MockScreen {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            content: Mutex::new(ScreenContent {
                metrics: DisplayMetrics::new(width, height),
                pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
                layers: Vec::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ScreenContent> {
        self.content.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn metrics(&self) -> DisplayMetrics {
        self.lock().metrics
    }

    /// Swaps width and height and clears the base image.
    pub fn rotate(&self) {
        let mut content = self.lock();
        let metrics = content.metrics;
        content.metrics = DisplayMetrics {
            width: metrics.height,
            height: metrics.width,
            ..metrics
        };
        content.pixels.fill(0);
    }

    pub fn fill(&self, color: [u8; 4]) {
        let mut content = self.lock();
        for px in content.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&color);
        }
    }

    pub fn fill_rect(&self, rect: Rect, color: [u8; 4]) {
        let mut content = self.lock();
        let metrics = content.metrics;
        paint(&mut content.pixels, metrics, rect, color);
    }

    /// Shows (`Some`) or removes (`None`) the layer named `key`.
    pub fn set_layer(&self, key: &str, layer: Option<(Rect, [u8; 4])>) {
        let mut content = self.lock();
        content.layers.retain(|existing| existing.key != key);
        if let Some((rect, color)) = layer {
            content.layers.push(Layer {
                key: key.to_string(),
                rect,
                color,
            });
        }
    }

    pub fn has_layer(&self, key: &str) -> bool {
        self.lock().layers.iter().any(|layer| layer.key == key)
    }

    fn compose(&self, descriptor: SurfaceDescriptor, row_padding: usize) -> Option<RawImage> {
        let content = self.lock();
        let metrics = content.metrics;
        if metrics.width != descriptor.width || metrics.height != descriptor.height {
            return None;
        }
        let mut pixels = content.pixels.clone();
        for layer in &content.layers {
            paint(&mut pixels, metrics, layer.rect, layer.color);
        }
        drop(content);

        let row_bytes = metrics.width as usize * BYTES_PER_PIXEL;
        let row_stride = row_bytes + row_padding;
        let mut data = Vec::with_capacity(row_stride * metrics.height as usize);
        for row in pixels.chunks_exact(row_bytes.max(1)) {
            data.extend_from_slice(row);
            data.resize(data.len() + row_padding, 0);
        }
        Some(RawImage {
            width: metrics.width,
            height: metrics.height,
            row_stride,
            pixel_stride: BYTES_PER_PIXEL,
            frame_index: None,
            timestamp: None,
            data,
        })
    }
}

fn paint(pixels: &mut [u8], metrics: DisplayMetrics, rect: Rect, color: [u8; 4]) {
    if rect.is_empty() {
        return;
    }
    let Some(px) = rect.to_pixel_rect(metrics.width, metrics.height) else {
        return;
    };
    let stride = metrics.width as usize * BYTES_PER_PIXEL;
    for y in px.y..px.y + px.height {
        for x in px.x..px.x + px.width {
            let offset = y as usize * stride + x as usize * BYTES_PER_PIXEL;
            pixels[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&color);
        }
    }
}

/// Lifetime counters exposed for assertions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MockCounts {
    pub tokens_acquired: usize,
    pub tokens_released: usize,
    pub surfaces_opened: usize,
    pub surfaces_closed: usize,
    pub mirrors_created: usize,
    pub mirrors_released: usize,
    pub frames_delivered: usize,
}

#[derive(Default)]
struct MockStats {
    tokens_acquired: AtomicUsize,
    tokens_released: AtomicUsize,
    surfaces_opened: AtomicUsize,
    surfaces_closed: AtomicUsize,
    mirrors_created: AtomicUsize,
    mirrors_released: AtomicUsize,
    frames_delivered: AtomicUsize,
    next_frame: AtomicU64,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

pub struct MockPlatform {
    screen: Arc<MockScreen>,
    row_padding: usize,
    deny_grants: AtomicBool,
    fail_surfaces: AtomicBool,
    starved: Arc<AtomicUsize>,
    stats: Arc<MockStats>,
    current: Mutex<Option<Arc<MockToken>>>,
}

impl MockPlatform {
    pub fn new(screen: Arc<MockScreen>) -> Self {
        Self {
            screen,
            row_padding: 0,
            deny_grants: AtomicBool::new(false),
            fail_surfaces: AtomicBool::new(false),
            starved: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(MockStats::default()),
            current: Mutex::new(None),
        }
    }

    /// Pads every delivered row with `bytes` of alignment filler.
    pub fn with_row_padding(mut self, bytes: usize) -> Self {
        self.row_padding = bytes;
        self
    }

    pub fn grant() -> CaptureGrant {
        CaptureGrant::new("mock")
    }

    pub fn screen(&self) -> &Arc<MockScreen> {
        &self.screen
    }

    pub fn deny_grants(&self, deny: bool) {
        self.deny_grants.store(deny, Ordering::SeqCst);
    }

    pub fn fail_surfaces(&self, fail: bool) {
        self.fail_surfaces.store(fail, Ordering::SeqCst);
    }

    /// The next `count` acquisitions report that no image is buffered yet.
    pub fn starve(&self, count: usize) {
        self.starved.store(count, Ordering::SeqCst);
    }

    /// Simulates the system withdrawing the current token. Returns whether a
    /// live token was revoked.
    pub fn revoke(&self) -> bool {
        let token = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match token {
            Some(token) => token.fire_revocation(),
            None => false,
        }
    }

    pub fn counts(&self) -> MockCounts {
        let load = |counter: &AtomicUsize| counter.load(Ordering::SeqCst);
        let stats = &self.stats;
        MockCounts {
            tokens_acquired: load(&stats.tokens_acquired),
            tokens_released: load(&stats.tokens_released),
            surfaces_opened: load(&stats.surfaces_opened),
            surfaces_closed: load(&stats.surfaces_closed),
            mirrors_created: load(&stats.mirrors_created),
            mirrors_released: load(&stats.mirrors_released),
            frames_delivered: load(&stats.frames_delivered),
        }
    }
}

impl CapturePlatform for MockPlatform {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn display_metrics(&self) -> DisplayMetrics {
        self.screen.metrics()
    }

    fn acquire_token(&self, _grant: &CaptureGrant) -> CaptureResult<Arc<dyn CaptureToken>> {
        if self.deny_grants.load(Ordering::SeqCst) {
            return Err(CaptureError::denied("mock platform denies all grants"));
        }
        bump(&self.stats.tokens_acquired);
        let token = Arc::new(MockToken {
            stats: Arc::clone(&self.stats),
            callback: Mutex::new(None),
            released: AtomicBool::new(false),
        });
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&token));
        Ok(token)
    }

    fn open_surface(&self, descriptor: SurfaceDescriptor) -> CaptureResult<Arc<dyn OutputSurface>> {
        if self.fail_surfaces.load(Ordering::SeqCst) {
            return Err(CaptureError::backend("mock surface allocation failed"));
        }
        bump(&self.stats.surfaces_opened);
        Ok(Arc::new(MockSurface {
            descriptor,
            screen: Arc::clone(&self.screen),
            row_padding: self.row_padding,
            starved: Arc::clone(&self.starved),
            stats: Arc::clone(&self.stats),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MockToken {
    stats: Arc<MockStats>,
    callback: Mutex<Option<RevocationCallback>>,
    released: AtomicBool,
}

impl MockToken {
    fn fire_revocation(&self) -> bool {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match callback {
            Some(callback) if !self.released.load(Ordering::SeqCst) => {
                callback();
                true
            }
            _ => false,
        }
    }
}

impl CaptureToken for MockToken {
    fn create_mirror(
        &self,
        _metrics: DisplayMetrics,
        _surface: &Arc<dyn OutputSurface>,
    ) -> CaptureResult<Box<dyn DisplayMirror>> {
        if self.released.load(Ordering::SeqCst) {
            return Err(CaptureError::unavailable("mock token already released"));
        }
        bump(&self.stats.mirrors_created);
        Ok(Box::new(MockMirror {
            stats: Arc::clone(&self.stats),
            released: AtomicBool::new(false),
        }))
    }

    fn watch_revocation(&self, callback: RevocationCallback) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            bump(&self.stats.tokens_released);
        }
    }
}

struct MockMirror {
    stats: Arc<MockStats>,
    released: AtomicBool,
}

impl DisplayMirror for MockMirror {
    fn is_valid(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }

    fn resize(&self, _metrics: DisplayMetrics) -> CaptureResult<()> {
        Ok(())
    }

    fn set_surface(&self, _surface: Option<&Arc<dyn OutputSurface>>) -> CaptureResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CaptureError::backend("mirror already released"))
        }
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            bump(&self.stats.mirrors_released);
        }
    }
}

struct MockSurface {
    descriptor: SurfaceDescriptor,
    screen: Arc<MockScreen>,
    row_padding: usize,
    starved: Arc<AtomicUsize>,
    stats: Arc<MockStats>,
    closed: AtomicBool,
}

impl OutputSurface for MockSurface {
    fn descriptor(&self) -> SurfaceDescriptor {
        self.descriptor
    }

    fn acquire_latest(&self) -> CaptureResult<Option<RawImage>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CaptureError::backend("surface is closed"));
        }
        let starved = self
            .starved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if starved {
            return Ok(None);
        }
        let Some(mut image) = self.screen.compose(self.descriptor, self.row_padding) else {
            return Ok(None);
        };
        image.frame_index = Some(self.stats.next_frame.fetch_add(1, Ordering::SeqCst));
        bump(&self.stats.frames_delivered);
        Ok(Some(image))
    }

    fn drain(&self) {}

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            bump(&self.stats.surfaces_closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_paint_over_base_image() {
        let screen = MockScreen::new(4, 4);
        screen.fill([0, 0, 0, 255]);
        screen.set_layer("overlay", Some((Rect::new(0.0, 0.0, 2.0, 2.0), [255; 4])));
        let image = screen.compose(SurfaceDescriptor::rgba(4, 4), 0).unwrap();
        assert_eq!(&image.data[..4], &[255; 4]);
        assert_eq!(&image.data[12..16], &[0, 0, 0, 255]);

        screen.set_layer("overlay", None);
        assert!(!screen.has_layer("overlay"));
        let image = screen.compose(SurfaceDescriptor::rgba(4, 4), 0).unwrap();
        assert_eq!(&image.data[..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn starved_surface_reports_no_image() {
        let platform = MockPlatform::new(MockScreen::new(2, 2));
        let surface = platform.open_surface(SurfaceDescriptor::rgba(2, 2)).unwrap();
        platform.starve(2);
        assert!(surface.acquire_latest().unwrap().is_none());
        assert!(surface.acquire_latest().unwrap().is_none());
        assert!(surface.acquire_latest().unwrap().is_some());
    }
}
