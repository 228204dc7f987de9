use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;

/// Identity of a translation: engine, language pair and normalized text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub engine: String,
    pub source_language: String,
    pub target_language: String,
    pub text: String,
}

impl CacheKey {
    pub const AUTO_LANGUAGE: &'static str = "auto";

    pub fn new(engine: &str, source_language: Option<&str>, target_language: &str, text: &str) -> Self {
        Self {
            engine: engine.to_string(),
            source_language: source_language
                .unwrap_or(Self::AUTO_LANGUAGE)
                .to_string(),
            target_language: target_language.to_string(),
            text: text.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}->{}:{}",
            self.engine, self.source_language, self.target_language, self.text
        )
    }
}

/// Thread-safe store of accepted translations.
pub trait TranslationCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<String>;

    fn put(&self, key: CacheKey, value: String);

    /// Changes the bound, evicting least-recently-used entries at once.
    fn set_capacity(&self, capacity: usize);

    fn capacity(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);
}

pub struct LruTranslationCache {
    entries: Mutex<LruCache<CacheKey, String>>,
}

impl LruTranslationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(clamp_capacity(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn clamp_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

impl TranslationCache for LruTranslationCache {
    fn get(&self, key: &CacheKey) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn put(&self, key: CacheKey, value: String) {
        self.lock().put(key, value);
    }

    fn set_capacity(&self, capacity: usize) {
        self.lock().resize(clamp_capacity(capacity));
    }

    fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> CacheKey {
        CacheKey::new("glossary", None, "en", text)
    }

    #[test]
    fn key_renders_with_auto_source() {
        assert_eq!(key("猫").to_string(), "glossary:auto->en:猫");
        let explicit = CacheKey::new("glossary", Some("ja"), "en", "猫");
        assert_eq!(explicit.to_string(), "glossary:ja->en:猫");
        assert_ne!(explicit, key("猫"));
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let cache = LruTranslationCache::new(3);
        for i in 0..10 {
            cache.put(key(&i.to_string()), format!("v{i}"));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn eviction_follows_recent_access() {
        let cache = LruTranslationCache::new(2);
        cache.put(key("a"), "A".into());
        cache.put(key("b"), "B".into());
        assert_eq!(cache.get(&key("a")).as_deref(), Some("A"));
        cache.put(key("c"), "C".into());
        assert!(cache.get(&key("b")).is_none());
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn shrinking_evicts_oldest_immediately() {
        let cache = LruTranslationCache::new(4);
        for name in ["a", "b", "c", "d"] {
            cache.put(key(name), name.to_uppercase());
        }
        cache.get(&key("a"));
        cache.set_capacity(2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.capacity(), 2);
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("d")).is_some());
        assert!(cache.get(&key("b")).is_none());
    }

    #[test]
    fn concurrent_access_stays_bounded() {
        let cache = LruTranslationCache::new(64);
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let cache = &cache;
                scope.spawn(move || {
                    for i in 0..200 {
                        let k = key(&format!("{worker}-{i}"));
                        cache.put(k.clone(), format!("v{i}"));
                        if let Some(value) = cache.get(&k) {
                            assert_eq!(value, format!("v{i}"));
                        }
                        assert!(cache.len() <= 64);
                    }
                });
            }
        });
        assert_eq!(cache.len(), 64);
        assert_eq!(cache.capacity(), 64);
    }

    #[test]
    fn zero_capacity_is_coerced_to_one() {
        let cache = LruTranslationCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(key("a"), "A".into());
        cache.put(key("b"), "B".into());
        assert_eq!(cache.len(), 1);
        cache.set_capacity(0);
        assert_eq!(cache.capacity(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
