use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{CacheKey, TranslationCache};
use crate::engine::{TranslationEngine, TranslationRequest};
use crate::validate::{FailureReason, ResultValidator};

pub type FailureSink = Arc<dyn Fn(&FailureReason) + Send + Sync>;

/// Per-call engine selection and cache policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationConfig {
    pub engine: String,
    pub cache_enabled: bool,
}

/// Front door for every translation: normalizes input, consults the cache,
/// calls the selected engine and only lets validated answers through.
pub struct TranslationGateway {
    engines: HashMap<String, Arc<dyn TranslationEngine>>,
    cache: Arc<dyn TranslationCache>,
    validator: ResultValidator,
    sink: Option<FailureSink>,
}

impl fmt::Debug for TranslationGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut engines: Vec<_> = self.engines.keys().collect();
        engines.sort();
        f.debug_struct("TranslationGateway")
            .field("engines", &engines)
            .field("cached", &self.cache.len())
            .field("validator", &self.validator)
            .finish()
    }
}

impl TranslationGateway {
    pub fn new(cache: Arc<dyn TranslationCache>) -> Self {
        Self {
            engines: HashMap::new(),
            cache,
            validator: ResultValidator::default(),
            sink: None,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn TranslationEngine>) -> Self {
        self.engines.insert(engine.id().to_string(), engine);
        self
    }

    pub fn with_validator(mut self, validator: ResultValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_failure_sink(mut self, sink: FailureSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn cache(&self) -> &Arc<dyn TranslationCache> {
        &self.cache
    }

    pub fn has_engine(&self, id: &str) -> bool {
        self.engines.contains_key(id)
    }

    /// Translates `text`, or returns `None` when there is nothing to show:
    /// blank input, an engine failure or a rejected result. Failures go to the
    /// sink and never reach the caller as errors.
    pub async fn translate(
        &self,
        text: &str,
        source_language: Option<&str>,
        target_language: &str,
        config: &TranslationConfig,
    ) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let key = CacheKey::new(&config.engine, source_language, target_language, text);
        if config.cache_enabled {
            if let Some(hit) = self.cache.get(&key) {
                debug!(key = %key, "translation cache hit");
                return Some(hit);
            }
        }

        let Some(engine) = self.engines.get(&config.engine) else {
            self.report(FailureReason::UnknownEngine(config.engine.clone()));
            return None;
        };

        let request = TranslationRequest {
            text,
            source_language,
            target_language,
        };
        let raw = match engine.translate(&request).await {
            Ok(raw) => raw,
            Err(err) => {
                self.report(FailureReason::EngineFailed(err.to_string()));
                return None;
            }
        };

        match self.validator.validate(text, &raw) {
            Ok(accepted) => {
                if config.cache_enabled {
                    self.cache.put(key, accepted.clone());
                }
                Some(accepted)
            }
            Err(reason) => {
                self.report(reason);
                None
            }
        }
    }

    /// Like [`translate`](Self::translate) but falls back to the trimmed
    /// source text.
    pub async fn translate_or_original(
        &self,
        text: &str,
        source_language: Option<&str>,
        target_language: &str,
        config: &TranslationConfig,
    ) -> String {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return String::new();
        }
        self.translate(trimmed, source_language, target_language, config)
            .await
            .unwrap_or_else(|| trimmed.to_string())
    }

    fn report(&self, reason: FailureReason) {
        warn!(engine_failure = %reason, "translation rejected");
        if let Some(sink) = self.sink.as_ref() {
            sink(&reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LruTranslationCache;
    use crate::error::TranslateError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedEngine {
        reply: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl ScriptedEngine {
        fn ok(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(message: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranslationEngine for ScriptedEngine {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn translate(
            &self,
            _request: &TranslationRequest<'_>,
        ) -> Result<String, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .map_err(TranslateError::engine)
        }
    }

    fn config(cache_enabled: bool) -> TranslationConfig {
        TranslationConfig {
            engine: "scripted".into(),
            cache_enabled,
        }
    }

    fn gateway(engine: Arc<ScriptedEngine>) -> (TranslationGateway, Arc<Mutex<Vec<FailureReason>>>) {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink_failures = Arc::clone(&failures);
        let gateway = TranslationGateway::new(Arc::new(LruTranslationCache::new(16)))
            .with_engine(engine)
            .with_failure_sink(Arc::new(move |reason: &FailureReason| {
                sink_failures.lock().unwrap().push(reason.clone());
            }));
        (gateway, failures)
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let engine = ScriptedEngine::ok("hello");
        let (gateway, _) = gateway(Arc::clone(&engine));
        let first = gateway.translate(" hola ", None, "en", &config(true)).await;
        let second = gateway.translate("hola", None, "en", &config(true)).await;
        assert_eq!(first.as_deref(), Some("hello"));
        assert_eq!(second.as_deref(), Some("hello"));
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn disabled_cache_always_calls_engine() {
        let engine = ScriptedEngine::ok("hello");
        let (gateway, _) = gateway(Arc::clone(&engine));
        gateway.translate("hola", None, "en", &config(false)).await;
        gateway.translate("hola", None, "en", &config(false)).await;
        assert_eq!(engine.calls(), 2);
        assert!(gateway.cache().is_empty());
    }

    #[tokio::test]
    async fn language_pair_is_part_of_the_key() {
        let engine = ScriptedEngine::ok("hello");
        let (gateway, _) = gateway(Arc::clone(&engine));
        gateway.translate("hola", Some("es"), "en", &config(true)).await;
        gateway.translate("hola", None, "en", &config(true)).await;
        gateway.translate("hola", None, "de", &config(true)).await;
        assert_eq!(engine.calls(), 3);
    }

    #[tokio::test]
    async fn blank_input_never_reaches_the_engine() {
        let engine = ScriptedEngine::ok("hello");
        let (gateway, failures) = gateway(Arc::clone(&engine));
        assert!(gateway.translate("  \n", None, "en", &config(true)).await.is_none());
        assert_eq!(engine.calls(), 0);
        assert!(failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn engine_errors_are_reported_not_raised() {
        let engine = ScriptedEngine::failing("timeout");
        let (gateway, failures) = gateway(engine);
        assert!(gateway.translate("hola", None, "en", &config(true)).await.is_none());
        let original = gateway
            .translate_or_original(" hola ", None, "en", &config(true))
            .await;
        assert_eq!(original, "hola");
        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 2);
        assert!(matches!(&failures[0], FailureReason::EngineFailed(msg) if msg.contains("timeout")));
    }

    #[tokio::test]
    async fn rejected_results_are_not_cached() {
        for (reply, expected) in [
            ("   ", FailureReason::EmptyResult),
            ("hola", FailureReason::SameAsSource),
            ("[error 429]", FailureReason::MarkerPrefix("[".into())),
        ] {
            let engine = ScriptedEngine::ok(reply);
            let (gateway, failures) = gateway(Arc::clone(&engine));
            assert!(gateway.translate("hola", None, "en", &config(true)).await.is_none());
            assert!(gateway.translate("hola", None, "en", &config(true)).await.is_none());
            assert_eq!(engine.calls(), 2);
            assert!(gateway.cache().is_empty());
            assert_eq!(failures.lock().unwrap()[0], expected);
        }
    }

    #[tokio::test]
    async fn unknown_engine_yields_nothing() {
        let engine = ScriptedEngine::ok("hello");
        let (gateway, failures) = gateway(engine);
        let config = TranslationConfig {
            engine: "missing".into(),
            cache_enabled: true,
        };
        assert!(gateway.translate("hola", None, "en", &config).await.is_none());
        assert_eq!(
            failures.lock().unwrap()[0],
            FailureReason::UnknownEngine("missing".into())
        );
    }
}
