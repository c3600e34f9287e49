//! Adapter configuration (`fmtk-dap.toml`) and tracing setup.
//!
//! Everything here has a default; an absent or unreadable config file never
//! stops the adapter from starting.

use std::{
    path::{Path, PathBuf},
    sync::{Mutex, Once},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    layer::SubscriberExt,
    EnvFilter, Layer,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    /// Write logs to stderr. Stdout is reserved for protocol frames.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file as well.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(Self::normalize_level_directives(&self.level)).unwrap_or_else(|_| {
            EnvFilter::default().add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The configured filter with any `RUST_LOG` directives appended.
    pub fn env_filter(&self) -> EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        match env_directives {
            Some(env_directives) => {
                let config_directives = Self::normalize_level_directives(&self.level);
                EnvFilter::try_new(format!("{config_directives},{env_directives}"))
                    .or_else(|_| EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// How long variables/evaluate/source requests wait for the game.
    #[serde(default = "SessionConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Reference ids handed out per execution context.
    #[serde(default = "SessionConfig::default_ref_block_stride")]
    pub ref_block_stride: i64,

    /// Raw bytes of the debug metadata blob per stdin line, before base64.
    #[serde(default = "SessionConfig::default_object_info_chunk_bytes")]
    pub object_info_chunk_bytes: usize,

    /// Name of the helper mod enabled in `mod-list.json` while debugging.
    #[serde(default = "SessionConfig::default_helper_mod")]
    pub helper_mod: String,
}

impl SessionConfig {
    fn default_request_timeout_ms() -> u64 {
        2_000
    }

    fn default_ref_block_stride() -> i64 {
        65_536
    }

    fn default_object_info_chunk_bytes() -> usize {
        4_000
    }

    fn default_helper_mod() -> String {
        "debugadapter".to_owned()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: Self::default_request_timeout_ms(),
            ref_block_stride: Self::default_ref_block_stride(),
            object_info_chunk_bytes: Self::default_object_info_chunk_bytes(),
            helper_mod: Self::default_helper_mod(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Toml(err.message().to_owned())
    }
}

impl AdapterConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AdapterConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.ref_block_stride <= 0 {
            return Err(ConfigError::Invalid("session.ref_block_stride must be positive"));
        }
        if self.session.object_info_chunk_bytes == 0 {
            return Err(ConfigError::Invalid(
                "session.object_info_chunk_bytes must be positive",
            ));
        }
        Ok(())
    }
}

static TRACING_INIT: Once = Once::new();

/// Install the global `tracing` subscriber.
///
/// Safe to call more than once; only the first call has any effect. Logs go to
/// stderr and/or the configured file, never to stdout.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let file = config.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        let file_failed = config.file.is_some() && file.is_none();

        let make_writer = match (config.stderr, file) {
            (true, Some(file)) => BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file))),
            (false, Some(file)) => BoxMakeWriter::new(Mutex::new(file)),
            (true, None) => BoxMakeWriter::new(std::io::stderr),
            (false, None) => BoxMakeWriter::new(std::io::sink),
        };

        let layer: Box<dyn Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry()
            .with(config.env_filter())
            .with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() && file_failed {
            if let Some(path) = config.file.as_ref() {
                tracing::warn!(
                    target: "fmtk.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
}
