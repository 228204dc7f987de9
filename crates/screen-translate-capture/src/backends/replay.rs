//! Mirrors a directory of still images as the display, advancing one image per
//! period. Useful for exercising the whole pipeline without a real screen.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use image::imageops::FilterType;
use screen_translate_types::BYTES_PER_PIXEL;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{CaptureError, CaptureResult};
use crate::platform::{
    CaptureGrant, CapturePlatform, CaptureToken, DisplayMetrics, DisplayMirror, OutputSurface,
    RawImage, RevocationCallback, SurfaceDescriptor,
};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Image files in `dir`, sorted by file name.
pub fn list_frames(dir: &Path) -> CaptureResult<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if supported && path.is_file() {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

pub struct ReplayPlatform {
    frames: Arc<[PathBuf]>,
    period: Duration,
    metrics: DisplayMetrics,
    origin: Instant,
}

impl ReplayPlatform {
    pub fn open(dir: &Path, period: Duration) -> CaptureResult<Self> {
        let frames = list_frames(dir)?;
        let Some(first) = frames.first() else {
            return Err(CaptureError::configuration(format!(
                "no png or jpeg frames found in {}",
                dir.display()
            )));
        };
        let (width, height) = image::image_dimensions(first)
            .map_err(|err| CaptureError::backend(format!("{}: {err}", first.display())))?;
        debug!(frames = frames.len(), width, height, "replay platform opened");
        Ok(Self {
            frames: Arc::from(frames),
            period: period.max(Duration::from_millis(1)),
            metrics: DisplayMetrics::new(width, height),
            origin: Instant::now(),
        })
    }

    pub fn frames(&self) -> &[PathBuf] {
        &self.frames
    }
}

impl CapturePlatform for ReplayPlatform {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn display_metrics(&self) -> DisplayMetrics {
        self.metrics
    }

    fn acquire_token(&self, _grant: &CaptureGrant) -> CaptureResult<Arc<dyn CaptureToken>> {
        Ok(Arc::new(ReplayToken::default()))
    }

    fn open_surface(&self, descriptor: SurfaceDescriptor) -> CaptureResult<Arc<dyn OutputSurface>> {
        Ok(Arc::new(ReplaySurface {
            frames: Arc::clone(&self.frames),
            period: self.period,
            origin: self.origin,
            descriptor,
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Default)]
struct ReplayToken {
    // Replayed files are never withdrawn; the callback is only retained.
    callback: Mutex<Option<RevocationCallback>>,
}

impl CaptureToken for ReplayToken {
    fn create_mirror(
        &self,
        _metrics: DisplayMetrics,
        _surface: &Arc<dyn OutputSurface>,
    ) -> CaptureResult<Box<dyn DisplayMirror>> {
        Ok(Box::new(ReplayMirror))
    }

    fn watch_revocation(&self, callback: RevocationCallback) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn release(&self) {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

struct ReplayMirror;

impl DisplayMirror for ReplayMirror {
    fn is_valid(&self) -> bool {
        true
    }

    fn resize(&self, _metrics: DisplayMetrics) -> CaptureResult<()> {
        Ok(())
    }

    fn set_surface(&self, _surface: Option<&Arc<dyn OutputSurface>>) -> CaptureResult<()> {
        Ok(())
    }

    fn release(&self) {}
}

struct ReplaySurface {
    frames: Arc<[PathBuf]>,
    period: Duration,
    origin: Instant,
    descriptor: SurfaceDescriptor,
    closed: AtomicBool,
}

impl ReplaySurface {
    fn current_index(&self) -> usize {
        let elapsed = self.origin.elapsed().as_millis();
        let step = elapsed / self.period.as_millis().max(1);
        (step % self.frames.len() as u128) as usize
    }
}

impl OutputSurface for ReplaySurface {
    fn descriptor(&self) -> SurfaceDescriptor {
        self.descriptor
    }

    fn acquire_latest(&self) -> CaptureResult<Option<RawImage>> {
        if self.closed.load(Ordering::SeqCst) || self.frames.is_empty() {
            return Ok(None);
        }
        let index = self.current_index();
        let path = &self.frames[index];
        let mut rgba = image::open(path)
            .map_err(|err| CaptureError::backend(format!("{}: {err}", path.display())))?
            .to_rgba8();
        let SurfaceDescriptor { width, height, .. } = self.descriptor;
        if rgba.dimensions() != (width, height) {
            rgba = image::imageops::resize(&rgba, width, height, FilterType::Triangle);
        }
        Ok(Some(RawImage {
            width,
            height,
            row_stride: width as usize * BYTES_PER_PIXEL,
            pixel_stride: BYTES_PER_PIXEL,
            frame_index: Some(index as u64),
            timestamp: Some(self.origin.elapsed()),
            data: rgba.into_raw(),
        }))
    }

    fn drain(&self) {}

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_frame(dir: &Path, name: &str, value: u8) {
        let image = RgbaImage::from_pixel(6, 4, Rgba([value, value, value, 255]));
        image.save(dir.join(name)).unwrap();
    }

    #[test]
    fn listing_skips_non_images() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "b.png", 1);
        write_frame(dir.path(), "a.png", 2);
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let frames = list_frames(dir.path()).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
    }

    #[test]
    fn empty_directory_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReplayPlatform::open(dir.path(), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::Configuration { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn frames_advance_with_time() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "000.png", 10);
        write_frame(dir.path(), "001.png", 200);
        let platform = ReplayPlatform::open(dir.path(), Duration::from_secs(1)).unwrap();
        assert_eq!(platform.display_metrics(), DisplayMetrics::new(6, 4));

        let surface = platform
            .open_surface(SurfaceDescriptor::for_display(platform.display_metrics()))
            .unwrap();
        let first = surface.acquire_latest().unwrap().unwrap();
        assert_eq!(first.frame_index, Some(0));
        assert_eq!(first.data[0], 10);

        tokio::time::advance(Duration::from_millis(1500)).await;
        let second = surface.acquire_latest().unwrap().unwrap();
        assert_eq!(second.frame_index, Some(1));
        assert_eq!(second.data[0], 200);
    }
}
