//! Configuration management.
//!
//! Configuration is read from a TOML file and then overridden by `KBASE_*`
//! environment variables. Every field has a default, so an empty or missing
//! file yields a working configuration.

mod file;

pub use file::{
    ConfigFile, ConfigFileContext, ConfigFileEntries, ConfigFileExtraction, ConfigFileLogging,
    ConfigFileQuery, ConfigFileServer,
};

use crate::models::DEFAULT_MAX_CHUNKS;
use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "KBASE_CONFIG_PATH";

/// Default token budget for assembled context.
pub const DEFAULT_MAX_TOKENS: usize = 4000;

/// Default number of rename attempts after a name conflict.
pub const DEFAULT_NAME_RETRY_ATTEMPTS: u32 = 3;

/// Default chunk size for extracted text, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default chunk overlap, in words.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Default upload size limit (50 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Main configuration for kbase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KbConfig {
    /// Directory holding the database and other state.
    pub data_dir: PathBuf,
    /// Explicit database file; defaults to `{data_dir}/kbase.db`.
    pub database: Option<PathBuf>,
    /// Context assembly settings.
    pub context: ContextSettings,
    /// Entry creation settings.
    pub entries: EntrySettings,
    /// Document extraction settings.
    pub extraction: ExtractionSettings,
    /// Free-text query settings.
    pub query: QuerySettings,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
}

/// Context assembly settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContextSettings {
    /// Token budget used when a caller does not pass one.
    pub default_max_tokens: usize,
}

/// Entry creation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntrySettings {
    /// How many timestamp-suffixed names are tried after a name conflict.
    pub name_retry_attempts: u32,
}

/// Document extraction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractionSettings {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Words carried over between consecutive chunks.
    pub chunk_overlap: usize,
    /// Largest accepted upload.
    pub max_upload_bytes: u64,
}

/// Free-text query settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuerySettings {
    /// Default number of chunks returned.
    pub max_chunks: usize,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggingSettings {
    /// Default filter directive (`RUST_LOG` takes precedence).
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
    /// Optional log file; logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            default_max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl Default for EntrySettings {
    fn default() -> Self {
        Self {
            name_retry_attempts: DEFAULT_NAME_RETRY_ATTEMPTS,
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_chunks: DEFAULT_MAX_CHUNKS,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: None,
            context: ContextSettings::default(),
            entries: EntrySettings::default(),
            extraction: ExtractionSettings::default(),
            query: QuerySettings::default(),
            logging: LoggingSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl KbConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for [`ConfigFile`].
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::failed("parse_config_file", e))?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::failed("read_config_file", format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/kbase/` on macOS)
    /// 2. XDG config dir (`~/.config/kbase/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        Self::default_config_paths()
            .into_iter()
            .filter(|path| path.exists())
            .find_map(|path| match Self::load_from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                    None
                },
            })
            .unwrap_or_default()
    }

    /// Candidate config file locations, in lookup order.
    #[must_use]
    pub fn default_config_paths() -> Vec<PathBuf> {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Vec::new();
        };

        let platform_config = base_dirs.config_dir().join("kbase").join("config.toml");
        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("kbase")
            .join("config.toml");

        if platform_config == xdg_config {
            vec![platform_config]
        } else {
            vec![platform_config, xdg_config]
        }
    }

    /// Applies `KBASE_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies `KBASE_*` overrides from an arbitrary lookup.
    ///
    /// Unparseable numeric values are ignored with a warning.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("KBASE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(db) = get("KBASE_DB_PATH") {
            self.database = Some(PathBuf::from(db));
        }
        if let Some(level) = get("KBASE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = get("KBASE_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(file) = get("KBASE_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }
        if let Some(host) = get("KBASE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("KBASE_PORT") {
            match port.trim().parse() {
                Ok(port) => self.server.port = port,
                Err(e) => tracing::warn!(value = %port, error = %e, "Ignoring invalid KBASE_PORT"),
            }
        }

        self
    }

    /// Converts a `ConfigFile` to `KbConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        config.database = file.database.map(PathBuf::from);

        if let Some(context) = file.context
            && let Some(v) = context.default_max_tokens
        {
            config.context.default_max_tokens = v;
        }
        if let Some(entries) = file.entries
            && let Some(v) = entries.name_retry_attempts
        {
            config.entries.name_retry_attempts = v;
        }
        if let Some(extraction) = file.extraction {
            if let Some(v) = extraction.chunk_size {
                config.extraction.chunk_size = v.max(1);
            }
            if let Some(v) = extraction.chunk_overlap {
                config.extraction.chunk_overlap = v;
            }
            if let Some(v) = extraction.max_upload_bytes {
                config.extraction.max_upload_bytes = v;
            }
        }
        if let Some(query) = file.query
            && let Some(v) = query.max_chunks
        {
            config.query.max_chunks = v;
        }
        if let Some(logging) = file.logging {
            if let Some(v) = logging.level {
                config.logging.level = v;
            }
            if let Some(v) = logging.format {
                config.logging.format = v;
            }
            config.logging.file = logging.file.map(PathBuf::from);
        }
        if let Some(server) = file.server {
            if let Some(v) = server.host {
                config.server.host = v;
            }
            if let Some(v) = server.port {
                config.server.port = v;
            }
        }

        config
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Returns the database file to open.
    #[must_use]
    pub fn database_path(&self) -> Option<PathBuf> {
        if let Some(db) = &self.database {
            return Some(db.clone());
        }
        if self.data_dir.as_os_str().is_empty() {
            return None;
        }
        Some(self.data_dir.join("kbase.db"))
    }

    /// Returns the `host:port` the HTTP server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Renders the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::failed("serialize_config", e))
    }
}

/// Default data directory: the platform data dir, or `.kbase` if unavailable.
fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "kbase")
        .map_or_else(|| PathBuf::from(".kbase"), |dirs| dirs.data_dir().to_path_buf())
}
