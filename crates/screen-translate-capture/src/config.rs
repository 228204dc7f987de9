use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::backends::mock::{MockPlatform, MockScreen};
use crate::error::{CaptureError, CaptureResult};
use crate::platform::{CapturePlatform, DisplayMetrics};
use crate::resource::ReleasePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Mock,
    Replay,
}

impl FromStr for Backend {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(Backend::Mock),
            "replay" => Ok(Backend::Replay),
            other => Err(CaptureError::configuration(format!(
                "unknown capture backend '{other}'"
            ))),
        }
    }
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Mock => "mock",
            Backend::Replay => "replay",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn compiled_backends() -> Vec<Backend> {
    let mut backends = Vec::new();
    #[cfg(feature = "backend-replay")]
    {
        backends.push(Backend::Replay);
    }
    backends.push(Backend::Mock);
    backends
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub backend: Backend,
    /// Image directory mirrored by the replay backend.
    pub frames_dir: Option<PathBuf>,
    pub frame_period: Duration,
    /// Display size reported by the mock backend.
    pub mock_display: DisplayMetrics,
    pub release: ReleasePolicy,
}

impl Default for Configuration {
    fn default() -> Self {
        let backend = compiled_backends()
            .into_iter()
            .next()
            .unwrap_or(Backend::Mock);
        Self {
            backend,
            frames_dir: None,
            frame_period: Duration::from_secs(2),
            mock_display: DisplayMetrics::new(1280, 720),
            release: ReleasePolicy::default(),
        }
    }
}

impl Configuration {
    pub const BACKEND_ENV: &'static str = "SCREEN_TRANSLATE_BACKEND";
    pub const FRAMES_ENV: &'static str = "SCREEN_TRANSLATE_FRAMES";

    pub fn from_env() -> CaptureResult<Self> {
        let mut config = Configuration::default();
        if let Ok(backend) = env::var(Self::BACKEND_ENV) {
            config.backend = Backend::from_str(&backend)?;
        }
        if let Ok(path) = env::var(Self::FRAMES_ENV) {
            config.frames_dir = Some(PathBuf::from(path));
        }
        Ok(config)
    }

    pub fn available_backends() -> Vec<Backend> {
        compiled_backends()
    }

    /// Resolves the configured backend into a platform handle. Called once at
    /// startup; the result is shared by every capture session.
    pub fn create_platform(&self) -> CaptureResult<Arc<dyn CapturePlatform>> {
        match self.backend {
            Backend::Mock => {
                let DisplayMetrics { width, height, .. } = self.mock_display;
                Ok(Arc::new(MockPlatform::new(MockScreen::new(width, height))))
            }
            Backend::Replay => {
                #[cfg(feature = "backend-replay")]
                {
                    let Some(dir) = self.frames_dir.as_deref() else {
                        return Err(CaptureError::configuration(
                            "replay backend requires a frames directory",
                        ));
                    };
                    let platform =
                        crate::backends::replay::ReplayPlatform::open(dir, self.frame_period)?;
                    Ok(Arc::new(platform))
                }
                #[cfg(not(feature = "backend-replay"))]
                {
                    Err(CaptureError::unsupported(Backend::Replay.as_str()))
                }
            }
        }
    }
}
