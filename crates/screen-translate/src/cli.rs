use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum TranslationMode {
    /// Process only when explicitly requested
    Manual,
    /// Process when the screen changes
    #[default]
    Auto,
    /// Process on a fixed interval
    Fixed,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Responsiveness {
    /// Fast sampling tuned for subtitles
    #[default]
    Subtitle,
    Normal,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum ResultSurface {
    /// Draw translations on top of the recognized blocks
    #[default]
    Overlay,
    /// Show the joined translation in a separate window
    Window,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum OcrBackend {
    /// Sidecar text files when replaying frames, otherwise noop
    #[default]
    Auto,
    Sidecar,
    Noop,
}

#[derive(Debug, Default)]
pub struct CliSources {
    pub mode_from_cli: bool,
    pub responsiveness_from_cli: bool,
    pub result_surface_from_cli: bool,
    pub ocr_backend_from_cli: bool,
    pub cache_enabled_from_cli: bool,
    pub vertical_columns_from_cli: bool,
}

impl CliSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            mode_from_cli: value_from_cli(matches, "mode"),
            responsiveness_from_cli: value_from_cli(matches, "responsiveness"),
            result_surface_from_cli: value_from_cli(matches, "result_surface"),
            ocr_backend_from_cli: value_from_cli(matches, "ocr_backend"),
            cache_enabled_from_cli: value_from_cli(matches, "cache_enabled"),
            vertical_columns_from_cli: value_from_cli(matches, "vertical_columns"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let command = CliArgs::command();
    let matches = command.get_matches();
    let args = match CliArgs::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(&matches);
    (args, sources)
}

#[derive(Debug, Parser)]
#[command(
    name = "screen-translate",
    about = "Watch the screen, recognize text and show translations",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Lock capture to a specific backend implementation
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,

    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Print the list of available capture backends
    #[arg(long = "list-backends")]
    pub list_backends: bool,

    /// When to run recognition
    #[arg(long = "mode", value_enum, default_value_t = TranslationMode::Auto)]
    pub mode: TranslationMode,

    /// Sampling and debounce profile for automatic mode
    #[arg(long = "responsiveness", value_enum, default_value_t = Responsiveness::Subtitle)]
    pub responsiveness: Responsiveness,

    /// Where translations are displayed
    #[arg(long = "result-surface", value_enum, default_value_t = ResultSurface::Overlay)]
    pub result_surface: ResultSurface,

    /// Preferred OCR backend
    #[arg(long = "ocr-backend", value_enum, default_value_t = OcrBackend::Auto)]
    pub ocr_backend: OcrBackend,

    /// Source language tag, or "auto"
    #[arg(long = "source-language", value_name = "LANG")]
    pub source_language: Option<String>,

    /// Target language tag
    #[arg(long = "target-language", value_name = "LANG")]
    pub target_language: Option<String>,

    /// Translation engine id
    #[arg(long = "engine")]
    pub engine: Option<String>,

    /// Enable or disable the translation cache
    #[arg(
        long = "cache",
        id = "cache_enabled",
        action = clap::ArgAction::Set,
        default_value_t = true,
        value_parser = clap::value_parser!(bool)
    )]
    pub cache_enabled: bool,

    /// Translation cache capacity (64-4096)
    #[arg(long = "cache-capacity", value_parser = clap::value_parser!(usize))]
    pub cache_capacity: Option<usize>,

    /// Interval between cycles in fixed mode, in milliseconds (300-60000)
    #[arg(long = "fixed-interval-ms", value_parser = clap::value_parser!(u64))]
    pub fixed_interval_ms: Option<u64>,

    /// Order recognized blocks as right-to-left vertical columns
    #[arg(long = "vertical-columns", id = "vertical_columns")]
    pub vertical_columns: bool,

    /// Restrict processing to a screen region: left,top,right,bottom
    #[arg(long = "region", value_name = "L,T,R,B")]
    pub region: Option<String>,

    /// Directory of images mirrored by the replay backend
    #[arg(long = "frames-dir")]
    pub frames_dir: Option<PathBuf>,

    /// Seconds each replayed image stays on screen
    #[arg(long = "frame-period-secs", value_parser = clap::value_parser!(f64))]
    pub frame_period_secs: Option<f64>,

    /// TOML glossary used by the offline glossary engine
    #[arg(long = "glossary")]
    pub glossary: Option<PathBuf>,

    /// Print rendered results as JSON lines instead of log records
    #[arg(long = "json")]
    pub json: bool,
}
