use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::engine::{OcrEngine, OcrEngineKind};
use crate::error::OcrError;

pub type EngineFactory =
    Box<dyn Fn(OcrEngineKind) -> Result<Arc<dyn OcrEngine>, OcrError> + Send + Sync>;

/// Owns at most one live engine. Asking for a different kind shuts the
/// current one down before the next is built.
pub struct OcrEnginePool {
    factory: EngineFactory,
    current: Mutex<Option<(OcrEngineKind, Arc<dyn OcrEngine>)>>,
}

impl OcrEnginePool {
    pub fn new(factory: EngineFactory) -> Self {
        Self {
            factory,
            current: Mutex::new(None),
        }
    }

    pub fn get(&self, kind: OcrEngineKind) -> Result<Arc<dyn OcrEngine>, OcrError> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((live_kind, engine)) = current.as_ref() {
            if *live_kind == kind {
                return Ok(Arc::clone(engine));
            }
        }
        if let Some((old_kind, old)) = current.take() {
            old.shutdown();
            info!(from = %old_kind, to = %kind, "switching ocr engine");
        }
        let engine = (self.factory)(kind)?;
        engine.warm_up()?;
        *current = Some((kind, Arc::clone(&engine)));
        Ok(engine)
    }

    pub fn current_kind(&self) -> Option<OcrEngineKind> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(kind, _)| *kind)
    }

    pub fn shutdown(&self) {
        let taken = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((_, engine)) = taken {
            engine.shutdown();
        }
    }
}
