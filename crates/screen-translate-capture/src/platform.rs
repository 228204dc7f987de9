use std::sync::Arc;
use std::time::Duration;

use screen_translate_types::{Frame, FrameResult};

use crate::error::CaptureResult;

/// Logical size of the mirrored display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMetrics {
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
}

impl DisplayMetrics {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            density_dpi: 160,
        }
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl SurfaceDescriptor {
    pub fn rgba(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
        }
    }

    pub fn for_display(metrics: DisplayMetrics) -> Self {
        Self::rgba(metrics.width, metrics.height)
    }
}

/// Image as handed out by a platform surface. Rows may be padded.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub row_stride: usize,
    pub pixel_stride: usize,
    pub frame_index: Option<u64>,
    pub timestamp: Option<Duration>,
    pub data: Vec<u8>,
}

impl RawImage {
    pub fn into_frame(self) -> FrameResult<Frame> {
        Ok(Frame::from_padded(
            self.width,
            self.height,
            self.row_stride,
            self.pixel_stride,
            &self.data,
        )?
        .with_frame_index(self.frame_index)
        .with_timestamp(self.timestamp))
    }
}

/// Consent obtained out of band that a platform exchanges for a capture token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureGrant {
    label: String,
}

impl CaptureGrant {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

pub type RevocationCallback = Box<dyn Fn() + Send + Sync>;

/// Capabilities of the host capture system, resolved once at startup.
pub trait CapturePlatform: Send + Sync {
    fn name(&self) -> &'static str;

    fn display_metrics(&self) -> DisplayMetrics;

    fn acquire_token(&self, grant: &CaptureGrant) -> CaptureResult<Arc<dyn CaptureToken>>;

    fn open_surface(&self, descriptor: SurfaceDescriptor) -> CaptureResult<Arc<dyn OutputSurface>>;
}

/// A revocable permission to mirror the display.
///
/// Implementations must not invoke the revocation callback synchronously from
/// `release` or `create_mirror`; the resource holds its lock across both.
pub trait CaptureToken: Send + Sync {
    fn create_mirror(
        &self,
        metrics: DisplayMetrics,
        surface: &Arc<dyn OutputSurface>,
    ) -> CaptureResult<Box<dyn DisplayMirror>>;

    fn watch_revocation(&self, callback: RevocationCallback);

    fn release(&self);
}

/// Pipes display content into an output surface.
pub trait DisplayMirror: Send + Sync {
    fn is_valid(&self) -> bool;

    fn resize(&self, metrics: DisplayMetrics) -> CaptureResult<()>;

    fn set_surface(&self, surface: Option<&Arc<dyn OutputSurface>>) -> CaptureResult<()>;

    fn release(&self);
}

/// Buffered image queue the mirror writes into.
pub trait OutputSurface: Send + Sync {
    fn descriptor(&self) -> SurfaceDescriptor;

    /// Returns the newest buffered image, dropping any older ones.
    fn acquire_latest(&self) -> CaptureResult<Option<RawImage>>;

    fn drain(&self);

    fn close(&self);
}
