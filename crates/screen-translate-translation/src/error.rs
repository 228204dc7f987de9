use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("engine error: {message}")]
    Engine { message: String },

    #[error("no glossary entry matches the text")]
    NoMatch,

    #[error("target language '{language}' is not supported by this engine")]
    UnsupportedLanguage { language: String },

    #[error("failed to read glossary {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse glossary: {0}")]
    Parse(#[from] toml::de::Error),
}

impl TranslateError {
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }
}
