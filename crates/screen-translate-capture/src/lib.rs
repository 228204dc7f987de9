//! Lifecycle management for the revocable screen-capture token.
//!
//! [`CaptureResource`] drives the token through idle, active, paused and
//! waiting-token states, reclaiming the surface and then the token on timers
//! after the consumer stops. Platforms plug in through the traits in
//! [`platform`]; a mock and a directory-replay backend ship with the crate.

pub mod backends;
pub mod config;
pub mod error;
pub mod platform;
mod resource;

pub use config::{Backend, Configuration};
pub use error::{CaptureError, CaptureResult};
pub use platform::{
    CaptureGrant, CapturePlatform, CaptureToken, DisplayMetrics, DisplayMirror, OutputSurface,
    PixelFormat, RawImage, RevocationCallback, SurfaceDescriptor,
};
pub use resource::{CaptureResource, CaptureState, ReleasePolicy, StopMode};
