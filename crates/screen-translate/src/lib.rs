//! Screen translation sessions: change-triggered capture, recognition,
//! translation and rendering on top of the capture, comparator, OCR and
//! translation crates.

pub mod cli;
pub mod orchestrator;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod settings;

pub use orchestrator::{
    CaptureOrchestrator, Collaborators, CycleKind, CycleOutcome, SampleOutcome, SessionPhase,
    Tuning,
};
pub use render::{LogSurface, Notice, RenderItem, RenderSurface, ScreenLayerSurface};
pub use scheduler::{CycleGuard, CycleTask, DebounceScheduler, DebounceTiming};
pub use session::{SessionError, TranslationSession};
pub use settings::{ConfigError, EffectiveSettings, SessionSettings};
