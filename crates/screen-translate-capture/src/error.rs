use screen_translate_types::FrameError;
use thiserror::Error;

pub type CaptureResult<T> = Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture token is not available: {reason}")]
    Unavailable { reason: String },

    #[error("capture token was revoked by the system")]
    Revoked,

    #[error("capture request was denied: {reason}")]
    Denied { reason: String },

    #[error("capture backend '{backend}' is not supported in this build")]
    Unsupported { backend: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("backend error: {message}")]
    Backend { message: String },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    pub fn unsupported(backend: impl Into<String>) -> Self {
        Self::Unsupported {
            backend: backend.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Errors that invalidate the capture token and end the session.
    pub fn is_resource_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Revoked | Self::Denied { .. }
        )
    }
}
