use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("ocr engine '{engine}' is not available in this build")]
    Unsupported { engine: String },
    #[error("backend error: {message}")]
    Backend { message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OcrError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn unsupported(engine: impl Into<String>) -> Self {
        Self::Unsupported {
            engine: engine.into(),
        }
    }
}
