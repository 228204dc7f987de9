//! Translation gateway: cache, result validation and the engine contract.

mod cache;
mod engine;
mod error;
mod gateway;
mod glossary;
mod validate;

pub use cache::{CacheKey, LruTranslationCache, TranslationCache};
pub use engine::{TranslationEngine, TranslationRequest};
pub use error::TranslateError;
pub use gateway::{FailureSink, TranslationConfig, TranslationGateway};
pub use glossary::GlossaryEngine;
pub use validate::{FailureReason, ResultValidator};
