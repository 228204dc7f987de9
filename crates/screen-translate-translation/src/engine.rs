use async_trait::async_trait;

use crate::error::TranslateError;

/// A single translation call.
#[derive(Debug, Clone, Copy)]
pub struct TranslationRequest<'a> {
    pub text: &'a str,
    /// `None` asks the engine to detect the language.
    pub source_language: Option<&'a str>,
    pub target_language: &'a str,
}

#[async_trait]
pub trait TranslationEngine: Send + Sync {
    fn id(&self) -> &str;

    async fn translate(&self, request: &TranslationRequest<'_>) -> Result<String, TranslateError>;
}
