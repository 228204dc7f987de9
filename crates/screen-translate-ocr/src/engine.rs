use std::fmt;
use std::str::FromStr;

use crate::error::OcrError;
use crate::request::OcrRequest;
use crate::response::OcrResponse;

/// Common interface for all OCR engines.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn warm_up(&self) -> Result<(), OcrError> {
        Ok(())
    }

    fn recognize(&self, request: &OcrRequest<'_>) -> Result<OcrResponse, OcrError>;

    /// Frees native resources; the engine is not used again afterwards.
    fn shutdown(&self) {}
}

/// Placeholder OCR engine used while a real backend is not wired.
#[derive(Debug, Default)]
pub struct NoopOcrEngine;

impl OcrEngine for NoopOcrEngine {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn recognize(&self, _: &OcrRequest<'_>) -> Result<OcrResponse, OcrError> {
        Ok(OcrResponse::empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrEngineKind {
    Noop,
    Sidecar,
}

impl OcrEngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrEngineKind::Noop => "noop",
            OcrEngineKind::Sidecar => "sidecar",
        }
    }
}

impl FromStr for OcrEngineKind {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "noop" => Ok(OcrEngineKind::Noop),
            "sidecar" => Ok(OcrEngineKind::Sidecar),
            other => Err(OcrError::unsupported(other)),
        }
    }
}

impl fmt::Display for OcrEngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
