//! Configuration loading, root folder resolution and logging setup
//!
//! Bootstrap configuration lives in a TOML file (`deckflow.toml`). Every
//! section is optional; missing values fall back to built-in defaults.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (`DECKFLOW_ROOT_FOLDER`, `DECKFLOW_CONFIG`, ...)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "DECKFLOW_ROOT_FOLDER";
/// Environment variable naming the TOML config file
pub const CONFIG_FILE_ENV: &str = "DECKFLOW_CONFIG";
/// Environment variable carrying the extraction service API key
pub const EXTRACTION_API_KEY_ENV: &str = "DECKFLOW_EXTRACTION_API_KEY";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the database and stored decks
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level or full filter directive (`info`, `deckflow_ai=debug`)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// External extraction (LLM) service
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_extraction_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_extraction_model")]
    pub model: String,
    /// Overridden by `DECKFLOW_EXTRACTION_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,
    /// Hard deadline for one extraction call
    #[serde(default = "default_extraction_timeout_secs")]
    pub timeout_secs: u64,
    /// Largest accepted deck, in bytes
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_extraction_endpoint(),
            model: default_extraction_model(),
            api_key: None,
            timeout_secs: default_extraction_timeout_secs(),
            max_document_bytes: default_max_document_bytes(),
        }
    }
}

/// Pipeline behavior: consistency delay, rerun pacing, quality gate, routing
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Wait before the status updater re-reads a submission it is about to
    /// transition
    #[serde(default = "default_consistency_delay_ms")]
    pub consistency_delay_ms: u64,

    /// Delay between dispatches during a bulk rerun
    #[serde(default = "default_rerun_delay_ms")]
    pub rerun_delay_ms: u64,

    /// Identifier chunk size for bulk statements
    #[serde(default = "default_rerun_batch_size")]
    pub rerun_batch_size: usize,

    /// Completed submissions scoring below this (0-5 scale) are rerun-eligible
    #[serde(default = "default_quality_threshold")]
    pub default_quality_threshold: f64,

    /// Per routine family overrides (`pitch_deck`, `eureka_form`, ...)
    #[serde(default)]
    pub quality_thresholds: HashMap<String, f64>,

    /// Extra form slug -> routine mappings layered over the built-in table
    #[serde(default)]
    pub slug_routes: HashMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            consistency_delay_ms: default_consistency_delay_ms(),
            rerun_delay_ms: default_rerun_delay_ms(),
            rerun_batch_size: default_rerun_batch_size(),
            default_quality_threshold: default_quality_threshold(),
            quality_thresholds: HashMap::new(),
            slug_routes: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Quality threshold for a routine family
    pub fn quality_threshold(&self, family: &str) -> f64 {
        self.quality_thresholds
            .get(family)
            .copied()
            .unwrap_or(self.default_quality_threshold)
    }
}

/// Best-effort notifications
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Optional webhook receiving notification payloads (email relay, chat)
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// How long clients keep the success toast up before navigating
    #[serde(default = "default_redirect_delay_ms")]
    pub redirect_delay_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            redirect_delay_ms: default_redirect_delay_ms(),
        }
    }
}

/// API tokens
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// token -> caller name
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    /// Callers allowed to run admin operations
    #[serde(default)]
    pub admins: Vec<String>,
}

/// Status watcher pacing
#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5780
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_extraction_endpoint() -> String {
    "http://localhost:8787".to_string()
}
fn default_extraction_model() -> String {
    "deck-scorer-v1".to_string()
}
fn default_extraction_timeout_secs() -> u64 {
    60
}
fn default_max_document_bytes() -> usize {
    20 * 1024 * 1024
}
fn default_consistency_delay_ms() -> u64 {
    250
}
fn default_rerun_delay_ms() -> u64 {
    1000
}
fn default_rerun_batch_size() -> usize {
    100
}
fn default_quality_threshold() -> f64 {
    2.0
}
fn default_redirect_delay_ms() -> u64 {
    1500
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_max_poll_attempts() -> u32 {
    300
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Load the config from the first location that exists
    ///
    /// Order: explicit path, `DECKFLOW_CONFIG`, user config dir. Missing
    /// files yield the defaults; an explicit path that does not exist is an
    /// error.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            return Self::load(Path::new(&path));
        }

        match default_config_file() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Extraction API key: environment first, then TOML
    pub fn extraction_api_key(&self) -> Option<String> {
        std::env::var(EXTRACTION_API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.extraction.api_key.clone())
    }
}

/// Root folder resolution:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// `~/.config/deckflow/deckflow.toml` (platform equivalent elsewhere)
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("deckflow").join("deckflow.toml"))
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("deckflow"))
        .unwrap_or_else(|| PathBuf::from("./deckflow_data"))
}

/// Database file inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join("deckflow.db")
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", logging.level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .try_init()
        }
        None => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
    .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}
