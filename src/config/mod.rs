//! Configuration layer: typed settings resolved from TOML sources.
//!
//! Precedence is `httpcache.toml` in the working directory, then an explicit
//! file. The library never consults the process environment for settings.

use std::{path::Path, path::PathBuf, str::FromStr};

use config::{Config, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::http::CacheOptions;

const LOCAL_CONFIG_BASENAME: &str = "httpcache";
const DEFAULT_CACHE_DIRECTORY: &str = ".httpcache";

/// Fully-resolved settings after validation.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default)]
pub struct CacheSettings {
    pub persistence: PersistenceKind,
    /// Options applied by [`crate::http::HttpClient::with_default_cache`].
    pub defaults: CacheOptions,
}

/// Where the cache snapshot is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PersistenceKind {
    /// Memory only; nothing is written anywhere.
    #[default]
    None,
    /// Process-lifetime key-value storage.
    Session,
    /// Files under `directory`, kept across restarts.
    Local { directory: PathBuf },
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings from `httpcache.toml` (optional) and then `config_file`.
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

/// Load settings from an in-memory TOML document.
pub fn load_from_str(toml: &str) -> Result<Settings, LoadError> {
    let raw: RawSettings = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?
        .try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    cache: RawCacheSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    persistence: Option<String>,
    directory: Option<PathBuf>,
    expire_after_minutes: Option<i64>,
    force_update: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            cache: build_cache_settings(raw.cache)?,
            logging: build_logging_settings(raw.logging)?,
        })
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let persistence = match cache
        .persistence
        .as_deref()
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        None | Some("") | Some("none") | Some("memory") => PersistenceKind::None,
        Some("session") => PersistenceKind::Session,
        Some("local") => PersistenceKind::Local {
            directory: cache
                .directory
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIRECTORY)),
        },
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.persistence",
                format!("expected one of none, session, local; got `{other}`"),
            ));
        }
    };

    let expire_after_minutes = match cache.expire_after_minutes {
        Some(minutes) => u32::try_from(minutes).map_err(|_| {
            LoadError::invalid(
                "cache.expire_after_minutes",
                format!("must be between 0 and {}", u32::MAX),
            )
        })?,
        None => 0,
    };

    let defaults = CacheOptions::new()
        .with_force_update(cache.force_update.unwrap_or(false))
        .with_expire_after_minutes(expire_after_minutes);

    Ok(CacheSettings {
        persistence,
        defaults,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}
