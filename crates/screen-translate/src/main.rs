use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use screen_translate::cli::{TranslationMode, parse_cli};
use screen_translate::settings::{EffectiveSettings, parse_region, resolve_settings};
use screen_translate::{
    Collaborators, ConfigError, LogSurface, Notice, RenderSurface, SessionError,
    TranslationSession,
};
use screen_translate_capture::{
    Backend, CaptureError, CaptureGrant, CapturePlatform, CaptureResource, Configuration,
    StopMode,
};
use screen_translate_ocr::{
    NoopOcrEngine, OcrEngine, OcrEngineKind, OcrEnginePool, SidecarOcrEngine,
};
use screen_translate_translation::{
    FailureReason, GlossaryEngine, LruTranslationCache, ResultValidator, TranslateError,
    TranslationGateway,
};
use screen_translate_types::Rect;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (cli, sources) = parse_cli();
    if cli.list_backends {
        print_available_backends();
        return Ok(());
    }
    let settings = resolve_settings(&cli, &sources)?;

    let (config, platform) = open_platform(&settings)?;
    let capture = CaptureResource::new(platform, config.release);
    let ocr = Arc::new(OcrEnginePool::new(engine_factory(replay_frames(&config)?)));
    let surface: Arc<dyn RenderSurface> = Arc::new(LogSurface::new(settings.json));
    let gateway = Arc::new(build_gateway(&settings, Arc::clone(&surface))?);
    if !settings.session.same_language() && !gateway.has_engine(&settings.session.engine) {
        warn!(
            engine = %settings.session.engine,
            "translation engine is not configured; recognized text is shown as is"
        );
    }

    let (_settings_tx, settings_rx) = watch::channel(settings.session.clone());
    let session = TranslationSession::start(
        Collaborators {
            capture,
            ocr: Arc::clone(&ocr),
            gateway,
            surface,
        },
        settings_rx,
        settings.region,
        Some(&CaptureGrant::new("command-line")),
    )
    .await?;

    if settings.session.mode == TranslationMode::Manual {
        info!("press enter to translate the screen; type 'help' for commands");
    }
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = session.terminated() => warn!("translation session ended"),
        _ = drive_console(&session) => {}
    }

    session.stop(StopMode::Force);
    ocr.shutdown();
    Ok(())
}

/// Resolves the capture backend once, falling back to the next compiled
/// backend unless one was pinned by flag, config or environment.
fn open_platform(
    settings: &EffectiveSettings,
) -> Result<(Configuration, Arc<dyn CapturePlatform>), AppError> {
    let env_backend_present = env::var(Configuration::BACKEND_ENV).is_ok();
    let mut config = Configuration::from_env().unwrap_or_default();
    let backend_override = settings
        .backend
        .as_deref()
        .map(Backend::from_str)
        .transpose()?;
    if let Some(backend) = backend_override {
        config.backend = backend;
    }
    if let Some(dir) = settings.frames_dir.clone() {
        config.frames_dir = Some(dir);
    }
    if let Some(period) = settings.frame_period {
        config.frame_period = period;
    }
    config.release = settings.release;
    let backend_locked = backend_override.is_some() || env_backend_present;

    let available = Configuration::available_backends();
    if available.is_empty() {
        return Err(CaptureError::configuration("no capture backend compiled in").into());
    }
    if !available.contains(&config.backend) {
        return Err(CaptureError::unsupported(config.backend.as_str()).into());
    }

    let mut tried = Vec::new();
    loop {
        if !tried.contains(&config.backend) {
            tried.push(config.backend);
        }
        match config.create_platform() {
            Ok(platform) => {
                info!(backend = config.backend.as_str(), "capture backend ready");
                return Ok((config, platform));
            }
            Err(err) => {
                if !backend_locked {
                    if let Some(next_backend) = next_backend(&available, &tried) {
                        warn!(
                            failed = config.backend.as_str(),
                            reason = %err,
                            next = next_backend.as_str(),
                            "capture backend failed to initialize"
                        );
                        config.backend = next_backend;
                        continue;
                    }
                }
                return Err(err.into());
            }
        }
    }
}

fn next_backend(available: &[Backend], tried: &[Backend]) -> Option<Backend> {
    available
        .iter()
        .copied()
        .find(|backend| !tried.contains(backend))
}

fn print_available_backends() {
    let names: Vec<&'static str> = Configuration::available_backends()
        .iter()
        .map(Backend::as_str)
        .collect();
    if names.is_empty() {
        println!("available backends: (none compiled)");
    } else {
        println!("available backends: {}", names.join(", "));
    }
}

#[cfg(feature = "backend-replay")]
fn replay_frames(config: &Configuration) -> Result<Vec<PathBuf>, CaptureError> {
    match (config.backend, config.frames_dir.as_deref()) {
        (Backend::Replay, Some(dir)) => {
            screen_translate_capture::backends::replay::list_frames(dir)
        }
        _ => Ok(Vec::new()),
    }
}

#[cfg(not(feature = "backend-replay"))]
fn replay_frames(_config: &Configuration) -> Result<Vec<PathBuf>, CaptureError> {
    Ok(Vec::new())
}

fn engine_factory(frames: Vec<PathBuf>) -> screen_translate_ocr::EngineFactory {
    Box::new(move |kind| {
        let engine: Arc<dyn OcrEngine> = match kind {
            OcrEngineKind::Noop => Arc::new(NoopOcrEngine),
            OcrEngineKind::Sidecar => Arc::new(SidecarOcrEngine::new(frames.clone())),
        };
        Ok(engine)
    })
}

fn build_gateway(
    settings: &EffectiveSettings,
    surface: Arc<dyn RenderSurface>,
) -> Result<TranslationGateway, TranslateError> {
    let cache = Arc::new(LruTranslationCache::new(settings.session.cache_capacity));
    let sink = Arc::new(move |reason: &FailureReason| {
        surface.notify(Notice::TranslationFailed(reason.to_string()));
    });
    let mut gateway = TranslationGateway::new(cache).with_failure_sink(sink);
    if let Some(path) = settings.glossary.as_deref() {
        let glossary = GlossaryEngine::from_path(path)?;
        info!(path = %path.display(), entries = glossary.len(), "glossary loaded");
        gateway = gateway.with_engine(Arc::new(glossary));
    }
    if let Some(prefixes) = settings.reject_prefixes.clone() {
        gateway = gateway.with_validator(ResultValidator::new(prefixes));
    }
    Ok(gateway)
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Translate,
    Pause,
    Resume,
    Region(Option<Rect>),
    Layout,
    Help,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match word {
        "" | "t" | "translate" => Ok(Command::Translate),
        "pause" => Ok(Command::Pause),
        "resume" => Ok(Command::Resume),
        "layout" => Ok(Command::Layout),
        "help" => Ok(Command::Help),
        "region" if rest.trim().is_empty() => Ok(Command::Region(None)),
        "region" => parse_region(rest)
            .map(|rect| Command::Region(Some(rect)))
            .map_err(|err| err.to_string()),
        other => Err(format!("unknown command '{other}'")),
    }
}

/// Reads commands from stdin until it closes.
async fn drive_console(session: &TranslationSession) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            // Keep running on a closed stdin; ctrl-c or revocation ends us.
            Ok(None) => return std::future::pending().await,
            Err(err) => {
                warn!(error = %err, "failed to read console input");
                return std::future::pending().await;
            }
        };
        match parse_command(&line) {
            Ok(Command::Translate) => {
                let outcome = session.request_manual().await;
                info!(?outcome, "manual request finished");
            }
            Ok(Command::Pause) => session.set_armed(false),
            Ok(Command::Resume) => session.set_armed(true),
            Ok(Command::Region(region)) => session.set_region(region),
            Ok(Command::Layout) => session.on_layout_changed(),
            Ok(Command::Help) => {
                println!("commands: <enter>|translate, pause, resume, region [l,t,r,b], layout");
            }
            Err(message) => warn!("{message}"),
        }
    }
}
