//! Shared domain models for the screen-translate workspace.
//!
//! This crate centralizes lightweight data structures used across the capture,
//! comparator, OCR, translation, and session crates. Keep it backend-agnostic
//! and free of platform-specific dependencies so every crate can depend on it
//! without pulling native SDKs or heavy features.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frames are always RGBA8, four bytes per pixel.
pub const BYTES_PER_PIXEL: usize = 4;

pub type FrameResult<T> = Result<T, FrameError>;

/// A dense, contiguous RGBA8 frame. Rows carry no alignment padding.
#[derive(Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    frame_index: Option<u64>,
    timestamp: Option<Duration>,
    data: Arc<[u8]>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl Frame {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> FrameResult<Self> {
        let required = dense_len(width, height)?;
        if data.len() < required {
            return Err(FrameError::InsufficientData {
                provided: data.len(),
                required,
            });
        }
        let mut data = data;
        data.truncate(required);
        Ok(Self {
            width,
            height,
            frame_index: None,
            timestamp: None,
            data: Arc::from(data.into_boxed_slice()),
        })
    }

    /// Copies a platform image whose rows may be padded to an alignment
    /// boundary, trimming the padding so the result is dense.
    pub fn from_padded(
        width: u32,
        height: u32,
        row_stride: usize,
        pixel_stride: usize,
        data: &[u8],
    ) -> FrameResult<Self> {
        if pixel_stride != BYTES_PER_PIXEL {
            return Err(FrameError::UnsupportedPixelStride { pixel_stride });
        }
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        if row_stride < row_bytes {
            return Err(FrameError::InvalidStride {
                row_stride,
                row_bytes,
            });
        }
        let required = dense_len(width, height)?;
        if height == 0 || width == 0 {
            return Self::from_rgba(width, height, Vec::new());
        }
        let needed = row_stride
            .checked_mul(height as usize - 1)
            .and_then(|v| v.checked_add(row_bytes))
            .ok_or(FrameError::Overflow)?;
        if data.len() < needed {
            return Err(FrameError::InsufficientData {
                provided: data.len(),
                required: needed,
            });
        }

        if row_stride == row_bytes {
            return Self::from_rgba(width, height, data[..required].to_vec());
        }

        let mut dense = Vec::with_capacity(required);
        for row in data.chunks(row_stride).take(height as usize) {
            dense.extend_from_slice(&row[..row_bytes]);
        }
        Self::from_rgba(width, height, dense)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn frame_index(&self) -> Option<u64> {
        self.frame_index
    }

    pub fn with_frame_index(mut self, index: Option<u64>) -> Self {
        self.frame_index = index;
        self
    }

    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }

    pub fn with_timestamp(mut self, timestamp: Option<Duration>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// Copies the given pixel rectangle into a new dense frame.
    pub fn crop(&self, rect: PixelRect) -> FrameResult<Frame> {
        let fits_x = rect.x.checked_add(rect.width).is_some_and(|r| r <= self.width);
        let fits_y = rect.y.checked_add(rect.height).is_some_and(|b| b <= self.height);
        if !fits_x || !fits_y {
            return Err(FrameError::CropOutOfBounds {
                rect,
                width: self.width,
                height: self.height,
            });
        }
        let row_bytes = rect.width as usize * BYTES_PER_PIXEL;
        let mut out = Vec::with_capacity(row_bytes * rect.height as usize);
        let stride = self.stride();
        for y in rect.y..rect.y + rect.height {
            let start = y as usize * stride + rect.x as usize * BYTES_PER_PIXEL;
            out.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        Ok(Frame::from_rgba(rect.width, rect.height, out)?
            .with_frame_index(self.frame_index)
            .with_timestamp(self.timestamp))
    }

    /// Perceptually weighted grayscale, one sample per pixel in row order.
    pub fn luma(&self) -> Vec<f32> {
        self.data
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|px| px[0] as f32 * 0.299 + px[1] as f32 * 0.587 + px[2] as f32 * 0.114)
            .collect()
    }
}

fn dense_len(width: u32, height: u32) -> FrameResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(BYTES_PER_PIXEL))
        .ok_or(FrameError::Overflow)
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame data length {provided} is smaller than required ({required})")]
    InsufficientData { provided: usize, required: usize },

    #[error("row stride {row_stride} is smaller than the row payload ({row_bytes} bytes)")]
    InvalidStride { row_stride: usize, row_bytes: usize },

    #[error("pixel stride {pixel_stride} is not supported; expected 4-byte RGBA")]
    UnsupportedPixelStride { pixel_stride: usize },

    #[error("crop {rect:?} exceeds frame bounds {width}x{height}")]
    CropOutOfBounds {
        rect: PixelRect,
        width: u32,
        height: u32,
    },

    #[error("frame dimensions overflowed")]
    Overflow,
}

/// Integer rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Rectangle in screen (or frame) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center_x(&self) -> f32 {
        (self.left + self.right) * 0.5
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// True when the two rectangles share a non-empty area.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let rect = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        (!rect.is_empty()).then_some(rect)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    pub fn scale(&self, sx: f32, sy: f32) -> Rect {
        Rect::new(self.left * sx, self.top * sy, self.right * sx, self.bottom * sy)
    }

    /// Maps the rectangle onto a `width`x`height` frame, clamping so the result
    /// always covers at least one pixel inside the frame.
    pub fn to_pixel_rect(&self, width: u32, height: u32) -> Option<PixelRect> {
        if width == 0 || height == 0 {
            return None;
        }
        let clamp = |v: f32, lo: u32, hi: u32| (v.max(0.0) as u32).clamp(lo, hi);
        let left = clamp(self.left, 0, width - 1);
        let top = clamp(self.top, 0, height - 1);
        let right = clamp(self.right, left + 1, width);
        let bottom = clamp(self.bottom, top + 1, height);
        Some(PixelRect {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }
}

/// A recognized run of text and where it sits in the frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBlock {
    pub text: String,
    pub bounds: Rect,
}

impl TextBlock {
    pub fn new(text: impl Into<String>, bounds: Rect) -> Self {
        Self {
            text: text.into(),
            bounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_rows_are_trimmed() {
        // 2x2 frame, rows padded to 12 bytes.
        let mut data = Vec::new();
        data.extend_from_slice(&[1, 1, 1, 1, 2, 2, 2, 2, 0xEE, 0xEE, 0xEE, 0xEE]);
        data.extend_from_slice(&[3, 3, 3, 3, 4, 4, 4, 4]);
        let frame = Frame::from_padded(2, 2, 12, 4, &data).unwrap();
        assert_eq!(frame.stride(), 8);
        assert_eq!(
            frame.data(),
            &[1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4]
        );
    }

    #[test]
    fn unpadded_rows_copy_directly() {
        let frame = Frame::from_padded(1, 2, 4, 4, &[9; 8]).unwrap();
        assert_eq!(frame.data(), &[9; 8]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let err = Frame::from_rgba(4, 4, vec![0; 10]).unwrap_err();
        assert!(matches!(err, FrameError::InsufficientData { .. }));
    }

    #[test]
    fn crop_copies_sub_rectangle() {
        let mut data = Vec::new();
        for i in 0..9u8 {
            data.extend_from_slice(&[i, i, i, 255]);
        }
        let frame = Frame::from_rgba(3, 3, data).unwrap();
        let cropped = frame
            .crop(PixelRect {
                x: 1,
                y: 1,
                width: 2,
                height: 2,
            })
            .unwrap();
        let firsts: Vec<u8> = cropped.data().chunks(4).map(|px| px[0]).collect();
        assert_eq!(firsts, vec![4, 5, 7, 8]);
    }

    #[test]
    fn pixel_rect_is_clamped_into_frame() {
        let rect = Rect::new(-10.0, 5.0, 500.0, 5.0);
        let px = rect.to_pixel_rect(100, 50).unwrap();
        assert_eq!(px.x, 0);
        assert_eq!(px.width, 100);
        assert_eq!(px.y, 5);
        assert_eq!(px.height, 1);
    }

    #[test]
    fn touching_rects_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 20.0, 10.0);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&Rect::new(9.0, 9.0, 12.0, 12.0)));
    }
}
