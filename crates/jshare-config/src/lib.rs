//! `jshare.toml` configuration and tracing setup.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [dump]
//! max_metaspace = "12M"
//! compression = "zstd"
//!
//! [classlist]
//! exclude = ["com.example.debug."]
//!
//! [[loader]]
//! identifier = "myloader"
//! type = "java/net/URLClassLoader"
//! classpath = ["build/test.jar"]
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use jshare_archive::{MetaspaceBudget, RegionShares};
use jshare_classlist::SelectionPolicy;
use jshare_registry::{ClassLoader, ClasspathEntry};
use jshare_storage::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// File name looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "jshare.toml";
pub const DEFAULT_MAX_METASPACE: &str = "64M";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JshareConfig {
    pub logging: LoggingConfig,
    pub dump: DumpConfig,
    pub classlist: SelectionPolicy,
    #[serde(rename = "loader")]
    pub loaders: Vec<LoaderConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file as well. An unopenable file is ignored.
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

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter: the configured level, with `RUST_LOG` merged in
    /// when it is set.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    #[default]
    None,
    Zstd,
}

impl From<ArchiveCompression> for Compression {
    fn from(value: ArchiveCompression) -> Self {
        match value {
            ArchiveCompression::None => Compression::None,
            ArchiveCompression::Zstd => Compression::Zstd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DumpConfig {
    /// Metaspace budget, e.g. `12M`.
    pub max_metaspace: String,
    pub regions: RegionShares,
    pub compression: ArchiveCompression,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            max_metaspace: DEFAULT_MAX_METASPACE.to_owned(),
            regions: RegionShares::default(),
            compression: ArchiveCompression::default(),
        }
    }
}

impl DumpConfig {
    pub fn budget(&self) -> Result<MetaspaceBudget, ConfigError> {
        parse_budget(&self.max_metaspace)
    }
}

/// A custom loader to register at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    pub identifier: String,
    #[serde(rename = "type", default = "LoaderConfig::default_type")]
    pub type_name: String,
    #[serde(default)]
    pub classpath: Vec<PathBuf>,
}

impl LoaderConfig {
    fn default_type() -> String {
        "java/net/URLClassLoader".to_owned()
    }

    /// Builds the loader this entry describes. Relative classpath entries are
    /// resolved against `base`.
    pub fn to_loader(&self, base: &Path) -> ClassLoader {
        let classpath = self
            .classpath
            .iter()
            .map(|entry| ClasspathEntry::from_path(base.join(entry)))
            .collect();
        ClassLoader::custom(self.type_name.as_str(), classpath)
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
    #[error("invalid size {0:?}; expected bytes or a K/M/G suffix")]
    InvalidSize(String),
    #[error("dump.regions must sum to 100, got {0}")]
    InvalidRegionShares(u32),
    #[error("loader entry has an empty identifier")]
    EmptyLoaderIdentifier,
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Toml(err.message().to_owned())
    }
}

/// Parses a budget such as `12M`; zero is rejected.
pub fn parse_budget(input: &str) -> Result<MetaspaceBudget, ConfigError> {
    MetaspaceBudget::parse(input)
        .filter(|budget| budget.bytes() > 0)
        .ok_or_else(|| ConfigError::InvalidSize(input.to_owned()))
}

impl JshareConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: JshareConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, or `jshare.toml` in `dir` if it exists, or the defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let candidate = dir.join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    Self::load_from_path(candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.dump.budget()?;
        let shares = self.dump.regions;
        if let Err(jshare_archive::BuildError::InvalidRegionShares { total }) = shares.validate() {
            return Err(ConfigError::InvalidRegionShares(total));
        }
        if self.loaders.iter().any(|l| l.identifier.trim().is_empty()) {
            return Err(ConfigError::EmptyLoaderIdentifier);
        }
        Ok(())
    }
}

static TRACING_INIT: Once = Once::new();

/// Installs the global subscriber. Only the first call has any effect.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();

        let file = config.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });

        let mut make_writer = BoxMakeWriter::new(std::io::sink);
        if config.stderr {
            make_writer = BoxMakeWriter::new(make_writer.and(std::io::stderr));
        }
        if let Some(file) = file {
            make_writer = BoxMakeWriter::new(make_writer.and(Arc::new(file)));
        }

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
                .with_target(false)
                .boxed()
        };

        let _ = tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .try_init();
    });
}
