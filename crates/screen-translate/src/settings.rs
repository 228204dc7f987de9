use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use directories::{BaseDirs, ProjectDirs};
use screen_translate_capture::ReleasePolicy;
use screen_translate_ocr::OcrEngineKind;
use screen_translate_types::Rect;
use serde::Deserialize;

use crate::cli::{CliArgs, CliSources, OcrBackend, Responsiveness, ResultSurface, TranslationMode};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    backend: Option<String>,
    mode: Option<String>,
    responsiveness: Option<String>,
    result_surface: Option<String>,
    ocr_backend: Option<String>,
    source_language: Option<String>,
    target_language: Option<String>,
    engine: Option<String>,
    fixed_interval_ms: Option<u64>,
    vertical_columns: Option<bool>,
    region: Option<Vec<f32>>,
    frames_dir: Option<String>,
    frame_period_secs: Option<f64>,
    glossary: Option<String>,
    reject_prefixes: Option<Vec<String>>,
    cache: Option<CacheFileConfig>,
    release: Option<ReleaseFileConfig>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct CacheFileConfig {
    enable: Option<bool>,
    capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct ReleaseFileConfig {
    surface_grace_secs: Option<u64>,
    token_grace_secs: Option<u64>,
}

pub const MIN_CACHE_CAPACITY: usize = 64;
pub const MAX_CACHE_CAPACITY: usize = 4096;
pub const DEFAULT_CACHE_CAPACITY: usize = 256;
pub const MIN_FIXED_INTERVAL: Duration = Duration::from_millis(300);
pub const MAX_FIXED_INTERVAL: Duration = Duration::from_millis(60_000);
pub const DEFAULT_FIXED_INTERVAL: Duration = Duration::from_millis(3_000);
const DEFAULT_SOURCE_LANGUAGE: &str = "ja";
const DEFAULT_TARGET_LANGUAGE: &str = "zh";
const DEFAULT_ENGINE: &str = "glossary";
const AUTO_LANGUAGE: &str = "auto";

/// The part of the configuration a running session follows live.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub mode: TranslationMode,
    pub responsiveness: Responsiveness,
    pub result_surface: ResultSurface,
    pub ocr_engine: OcrEngineKind,
    /// `None` lets the engine detect the language.
    pub source_language: Option<String>,
    pub target_language: String,
    pub engine: String,
    pub cache_enabled: bool,
    pub cache_capacity: usize,
    pub fixed_interval: Duration,
    pub vertical_columns: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mode: TranslationMode::default(),
            responsiveness: Responsiveness::default(),
            result_surface: ResultSurface::default(),
            ocr_engine: OcrEngineKind::Noop,
            source_language: Some(DEFAULT_SOURCE_LANGUAGE.to_string()),
            target_language: DEFAULT_TARGET_LANGUAGE.to_string(),
            engine: DEFAULT_ENGINE.to_string(),
            cache_enabled: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            fixed_interval: DEFAULT_FIXED_INTERVAL,
            vertical_columns: false,
        }
    }
}

impl SessionSettings {
    /// True when recognition output can be shown without translating.
    pub fn same_language(&self) -> bool {
        self.source_language
            .as_deref()
            .is_some_and(|source| !source.is_empty() && source == self.target_language)
    }
}

pub fn clamp_cache_capacity(capacity: usize) -> usize {
    capacity.clamp(MIN_CACHE_CAPACITY, MAX_CACHE_CAPACITY)
}

pub fn clamp_fixed_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_FIXED_INTERVAL, MAX_FIXED_INTERVAL)
}

#[derive(Debug)]
pub struct EffectiveSettings {
    pub backend: Option<String>,
    pub session: SessionSettings,
    pub region: Option<Rect>,
    pub frames_dir: Option<PathBuf>,
    pub frame_period: Option<Duration>,
    pub glossary: Option<PathBuf>,
    pub reject_prefixes: Option<Vec<String>>,
    pub release: ReleasePolicy,
    pub json: bool,
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::InvalidValue { path, field, value } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "invalid value '{}' for '{}' in {}",
                        value,
                        field,
                        path.display()
                    )
                } else {
                    write!(f, "invalid value '{}' for '{}'", value, field)
                }
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::NotFound { .. } => None,
        }
    }
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let config = read_config(&path)?;
        return Ok((config, Some(path)));
    }

    if let Some(project_path) = project_config_path() {
        if project_path.exists() {
            let config = read_config(&project_path)?;
            return Ok((config, Some(project_path)));
        }
    }

    let Some(default_path) = default_config_path() else {
        return Ok((FileConfig::default(), None));
    };
    if !default_path.exists() {
        return Ok((FileConfig::default(), None));
    }
    let config = read_config(&default_path)?;
    Ok((config, Some(default_path)))
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

    let FileConfig {
        backend: file_backend,
        mode: file_mode,
        responsiveness: file_responsiveness,
        result_surface: file_result_surface,
        ocr_backend: file_ocr_backend,
        source_language: file_source_language,
        target_language: file_target_language,
        engine: file_engine,
        fixed_interval_ms: file_fixed_interval_ms,
        vertical_columns: file_vertical_columns,
        region: file_region,
        frames_dir: file_frames_dir,
        frame_period_secs: file_frame_period_secs,
        glossary: file_glossary,
        reject_prefixes: file_reject_prefixes,
        cache: file_cache,
        release: file_release,
    } = file;

    let mut backend = normalize_string(cli.backend.clone());
    if backend.is_none() {
        backend = normalize_string(file_backend);
    }

    let mut mode = cli.mode;
    if !sources.mode_from_cli {
        if let Some(value) = normalize_string(file_mode) {
            mode = parse_value_enum(&value, "mode", config_path.as_ref())?;
        }
    }

    let mut responsiveness = cli.responsiveness;
    if !sources.responsiveness_from_cli {
        if let Some(value) = normalize_string(file_responsiveness) {
            responsiveness = parse_value_enum(&value, "responsiveness", config_path.as_ref())?;
        }
    }

    let mut result_surface = cli.result_surface;
    if !sources.result_surface_from_cli {
        if let Some(value) = normalize_string(file_result_surface) {
            result_surface = parse_value_enum(&value, "result_surface", config_path.as_ref())?;
        }
    }

    let mut ocr_backend = cli.ocr_backend;
    if !sources.ocr_backend_from_cli {
        if let Some(value) = normalize_string(file_ocr_backend) {
            ocr_backend = parse_value_enum(&value, "ocr_backend", config_path.as_ref())?;
        }
    }

    let source_language = match normalize_string(cli.source_language.clone())
        .or_else(|| normalize_string(file_source_language))
    {
        Some(value) if value.eq_ignore_ascii_case(AUTO_LANGUAGE) => None,
        Some(value) => Some(value),
        None => Some(DEFAULT_SOURCE_LANGUAGE.to_string()),
    };
    let target_language = normalize_string(cli.target_language.clone())
        .or_else(|| normalize_string(file_target_language))
        .unwrap_or_else(|| DEFAULT_TARGET_LANGUAGE.to_string());
    if target_language.eq_ignore_ascii_case(AUTO_LANGUAGE) {
        return Err(ConfigError::InvalidValue {
            path: None,
            field: "target_language",
            value: target_language,
        });
    }
    let engine = normalize_string(cli.engine.clone())
        .or_else(|| normalize_string(file_engine))
        .unwrap_or_else(|| DEFAULT_ENGINE.to_string());

    let mut cache_enabled = cli.cache_enabled;
    if !sources.cache_enabled_from_cli {
        if let Some(value) = file_cache.as_ref().and_then(|cfg| cfg.enable) {
            cache_enabled = value;
        }
    }
    let cache_capacity = cli
        .cache_capacity
        .or_else(|| file_cache.as_ref().and_then(|cfg| cfg.capacity))
        .map(clamp_cache_capacity)
        .unwrap_or(DEFAULT_CACHE_CAPACITY);

    let fixed_interval = cli
        .fixed_interval_ms
        .or(file_fixed_interval_ms)
        .map(|ms| clamp_fixed_interval(Duration::from_millis(ms)))
        .unwrap_or(DEFAULT_FIXED_INTERVAL);

    let mut vertical_columns = cli.vertical_columns;
    if !sources.vertical_columns_from_cli {
        if let Some(value) = file_vertical_columns {
            vertical_columns = value;
        }
    }

    let region = match cli.region.as_deref() {
        Some(value) => Some(parse_region(value)?),
        None => match file_region {
            Some(values) => Some(region_from_values(&values).ok_or_else(|| {
                ConfigError::InvalidValue {
                    path: config_path.clone(),
                    field: "region",
                    value: format!("{values:?}"),
                }
            })?),
            None => None,
        },
    };

    let frames_dir = match cli.frames_dir.clone() {
        Some(dir) => Some(expand_pathbuf(dir)),
        None => normalize_string(file_frames_dir)
            .and_then(|dir| resolve_path_from_config(dir, config_dir.as_deref())),
    };

    let frame_period = match cli.frame_period_secs.or(file_frame_period_secs) {
        Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(secs) => {
            return Err(ConfigError::InvalidValue {
                path: config_path,
                field: "frame_period_secs",
                value: secs.to_string(),
            });
        }
        None => None,
    };

    let glossary = match cli.glossary.clone() {
        Some(path) => Some(expand_pathbuf(path)),
        None => normalize_string(file_glossary)
            .and_then(|path| resolve_path_from_config(path, config_dir.as_deref())),
    };

    let ocr_engine = match ocr_backend {
        OcrBackend::Sidecar => OcrEngineKind::Sidecar,
        OcrBackend::Noop => OcrEngineKind::Noop,
        OcrBackend::Auto if frames_dir.is_some() => OcrEngineKind::Sidecar,
        OcrBackend::Auto => OcrEngineKind::Noop,
    };

    let mut release = ReleasePolicy::default();
    if let Some(section) = file_release {
        if let Some(secs) = section.surface_grace_secs {
            release.surface_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = section.token_grace_secs {
            release.token_grace = Duration::from_secs(secs);
        }
        if release.token_grace < release.surface_grace {
            return Err(ConfigError::InvalidValue {
                path: config_path,
                field: "release.token_grace_secs",
                value: release.token_grace.as_secs().to_string(),
            });
        }
    }

    Ok(EffectiveSettings {
        backend,
        session: SessionSettings {
            mode,
            responsiveness,
            result_surface,
            ocr_engine,
            source_language,
            target_language,
            engine,
            cache_enabled,
            cache_capacity,
            fixed_interval,
            vertical_columns,
        },
        region,
        frames_dir,
        frame_period,
        glossary,
        reject_prefixes: file_reject_prefixes,
        release,
        json: cli.json,
        config_dir,
    })
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "screen-translate", "screen-translate")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join("config.toml"))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    match base {
        Some(base) if !expanded.is_absolute() => Some(base.join(expanded)),
        _ => Some(expanded),
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}

fn parse_value_enum<T: ValueEnum>(
    value: &str,
    field: &'static str,
    path: Option<&PathBuf>,
) -> Result<T, ConfigError> {
    T::from_str(value, true).map_err(|_| ConfigError::InvalidValue {
        path: path.cloned(),
        field,
        value: value.to_string(),
    })
}

/// Parses `left,top,right,bottom` in screen coordinates.
pub fn parse_region(value: &str) -> Result<Rect, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        path: None,
        field: "region",
        value: value.to_string(),
    };
    let values = value
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    region_from_values(&values).ok_or_else(invalid)
}

fn region_from_values(values: &[f32]) -> Option<Rect> {
    let [left, top, right, bottom] = values else {
        return None;
    };
    let rect = Rect::new(*left, *top, *right, *bottom);
    if rect.is_empty() || values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return None;
    }
    Some(rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};
    use std::io::Write;

    fn cli(args: &[&str]) -> (CliArgs, CliSources) {
        let mut argv = vec!["screen-translate"];
        argv.extend_from_slice(args);
        let matches = CliArgs::command().try_get_matches_from(argv).unwrap();
        let parsed = CliArgs::from_arg_matches(&matches).unwrap();
        let sources = CliSources {
            mode_from_cli: args.contains(&"--mode"),
            responsiveness_from_cli: args.contains(&"--responsiveness"),
            result_surface_from_cli: args.contains(&"--result-surface"),
            ocr_backend_from_cli: args.contains(&"--ocr-backend"),
            cache_enabled_from_cli: args.contains(&"--cache"),
            vertical_columns_from_cli: args.contains(&"--vertical-columns"),
        };
        (parsed, sources)
    }

    fn parse_file(contents: &str) -> FileConfig {
        toml::from_str(contents).unwrap()
    }

    #[test]
    fn defaults_without_any_file() {
        let (args, sources) = cli(&[]);
        let settings = merge(&args, &sources, FileConfig::default(), None).unwrap();
        assert_eq!(settings.session, SessionSettings::default());
        assert_eq!(settings.region, None);
        assert_eq!(settings.release, ReleasePolicy::default());
    }

    #[test]
    fn file_values_apply_when_cli_is_silent() {
        let file = parse_file(
            r#"
            mode = "fixed"
            responsiveness = "normal"
            result_surface = "window"
            source_language = "auto"
            target_language = "en"
            fixed_interval_ms = 10
            region = [10.0, 20.0, 110.0, 220.0]

            [cache]
            enable = false
            capacity = 100000
            "#,
        );
        let (args, sources) = cli(&[]);
        let settings = merge(&args, &sources, file, None).unwrap();
        let session = settings.session;
        assert_eq!(session.mode, TranslationMode::Fixed);
        assert_eq!(session.responsiveness, Responsiveness::Normal);
        assert_eq!(session.result_surface, ResultSurface::Window);
        assert_eq!(session.source_language, None);
        assert_eq!(session.target_language, "en");
        assert!(!session.cache_enabled);
        assert_eq!(session.cache_capacity, MAX_CACHE_CAPACITY);
        assert_eq!(session.fixed_interval, MIN_FIXED_INTERVAL);
        assert_eq!(settings.region, Some(Rect::new(10.0, 20.0, 110.0, 220.0)));
    }

    #[test]
    fn explicit_cli_values_win_over_file() {
        let file = parse_file("mode = \"fixed\"\n[cache]\nenable = true\n");
        let (args, sources) = cli(&["--mode", "manual", "--cache", "false"]);
        let settings = merge(&args, &sources, file, None).unwrap();
        assert_eq!(settings.session.mode, TranslationMode::Manual);
        assert!(!settings.session.cache_enabled);
    }

    #[test]
    fn small_cache_capacity_is_raised_to_minimum() {
        let (args, sources) = cli(&["--cache-capacity", "3"]);
        let settings = merge(&args, &sources, FileConfig::default(), None).unwrap();
        assert_eq!(settings.session.cache_capacity, MIN_CACHE_CAPACITY);
    }

    #[test]
    fn invalid_enum_in_file_reports_field_and_path() {
        let file = parse_file("result_surface = \"hologram\"\n");
        let (args, sources) = cli(&[]);
        let err = merge(&args, &sources, file, Some(PathBuf::from("/tmp/c.toml"))).unwrap_err();
        match err {
            ConfigError::InvalidValue { field, value, path } => {
                assert_eq!(field, "result_surface");
                assert_eq!(value, "hologram");
                assert_eq!(path, Some(PathBuf::from("/tmp/c.toml")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn region_from_cli_is_parsed_and_validated() {
        let (args, sources) = cli(&["--region", "0, 0, 50, 40"]);
        let settings = merge(&args, &sources, FileConfig::default(), None).unwrap();
        assert_eq!(settings.region, Some(Rect::new(0.0, 0.0, 50.0, 40.0)));

        let (args, sources) = cli(&["--region", "50,0,10,40"]);
        assert!(merge(&args, &sources, FileConfig::default(), None).is_err());
    }

    #[test]
    fn auto_ocr_backend_follows_frames_dir() {
        let (args, sources) = cli(&["--frames-dir", "/tmp/frames"]);
        let settings = merge(&args, &sources, FileConfig::default(), None).unwrap();
        assert_eq!(settings.session.ocr_engine, OcrEngineKind::Sidecar);

        let (args, sources) = cli(&["--frames-dir", "/tmp/frames", "--ocr-backend", "noop"]);
        let settings = merge(&args, &sources, FileConfig::default(), None).unwrap();
        assert_eq!(settings.session.ocr_engine, OcrEngineKind::Noop);
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "frames_dir = \"frames\"\nglossary = \"words.toml\"").unwrap();

        let (args, sources) = cli(&["--config", path.to_str().unwrap()]);
        let settings = resolve_settings(&args, &sources).unwrap();
        assert_eq!(settings.frames_dir, Some(dir.path().join("frames")));
        assert_eq!(settings.glossary, Some(dir.path().join("words.toml")));
        assert_eq!(settings.config_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let (args, sources) = cli(&["--config", "/definitely/not/here.toml"]);
        assert!(matches!(
            resolve_settings(&args, &sources),
            Err(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn release_grace_periods_are_read_from_file() {
        let file = parse_file("[release]\nsurface_grace_secs = 5\ntoken_grace_secs = 30\n");
        let (args, sources) = cli(&[]);
        let settings = merge(&args, &sources, file, None).unwrap();
        assert_eq!(settings.release.surface_grace, Duration::from_secs(5));
        assert_eq!(settings.release.token_grace, Duration::from_secs(30));
    }

    #[test]
    fn same_language_requires_explicit_source() {
        let mut settings = SessionSettings::default();
        settings.target_language = "ja".into();
        assert!(settings.same_language());
        settings.source_language = None;
        assert!(!settings.same_language());
    }
}
