mod backends;
mod engine;
mod error;
pub mod layout;
mod pool;
mod request;
mod response;

pub use backends::sidecar::SidecarOcrEngine;
pub use engine::{NoopOcrEngine, OcrEngine, OcrEngineKind};
pub use error::OcrError;
pub use pool::{EngineFactory, OcrEnginePool};
pub use request::OcrRequest;
pub use response::OcrResponse;
