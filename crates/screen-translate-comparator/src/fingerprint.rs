use screen_translate_types::Frame;

use crate::ops::luma_grid;

pub const FINGERPRINT_SIDE: usize = 32;
pub const AVERAGE_HASH_SIDE: usize = 8;

/// Fixed-size grayscale summary of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    samples: Vec<u8>,
}

impl Fingerprint {
    pub fn of(frame: &Frame) -> Self {
        Self::with_side(frame, FINGERPRINT_SIDE)
    }

    pub fn with_side(frame: &Frame, side: usize) -> Self {
        Self {
            samples: luma_grid(frame, side),
        }
    }

    pub fn from_samples(samples: Vec<u8>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean absolute sample difference in `[0, 1]`. Fingerprints of different
    /// lengths are maximally different; two empty ones are identical.
    pub fn difference(&self, other: &Fingerprint) -> f32 {
        if self.samples.len() != other.samples.len() {
            return 1.0;
        }
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: u64 = self
            .samples
            .iter()
            .zip(&other.samples)
            .map(|(a, b)| a.abs_diff(*b) as u64)
            .sum();
        total as f32 / (self.samples.len() as f32 * 255.0)
    }
}

/// 64-bit above/below-average hash over an 8x8 grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AverageHash(pub u64);

impl AverageHash {
    pub fn of(frame: &Frame) -> Self {
        let grid = luma_grid(frame, AVERAGE_HASH_SIDE);
        let mean = grid.iter().map(|&v| v as u32).sum::<u32>() / grid.len().max(1) as u32;
        let bits = grid
            .iter()
            .enumerate()
            .filter(|&(_, &value)| value as u32 >= mean)
            .fold(0u64, |acc, (index, _)| acc | (1u64 << index));
        Self(bits)
    }

    pub fn distance(&self, other: &AverageHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}
