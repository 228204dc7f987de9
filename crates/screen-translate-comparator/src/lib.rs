mod detector;
mod fingerprint;
pub mod ops;

pub use detector::ChangeDetector;
pub use fingerprint::{
    AVERAGE_HASH_SIDE, AverageHash, FINGERPRINT_SIDE, Fingerprint,
};

use screen_translate_types::Frame;

pub fn fingerprint(frame: &Frame) -> Fingerprint {
    Fingerprint::of(frame)
}

pub fn difference(a: &Fingerprint, b: &Fingerprint) -> f32 {
    a.difference(b)
}
