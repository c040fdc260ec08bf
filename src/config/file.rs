//! On-disk configuration file structure.
//!
//! Every field is optional; missing values fall back to the defaults in
//! [`super::KbConfig`].

use serde::Deserialize;

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Database file.
    pub database: Option<String>,
    /// `[context]` section.
    pub context: Option<ConfigFileContext>,
    /// `[entries]` section.
    pub entries: Option<ConfigFileEntries>,
    /// `[extraction]` section.
    pub extraction: Option<ConfigFileExtraction>,
    /// `[query]` section.
    pub query: Option<ConfigFileQuery>,
    /// `[logging]` section.
    pub logging: Option<ConfigFileLogging>,
    /// `[server]` section.
    pub server: Option<ConfigFileServer>,
}

/// Context section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileContext {
    /// Default token budget.
    pub default_max_tokens: Option<usize>,
}

/// Entries section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileEntries {
    /// Rename attempts after a name conflict.
    pub name_retry_attempts: Option<u32>,
}

/// Extraction section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileExtraction {
    /// Chunk size in characters.
    pub chunk_size: Option<usize>,
    /// Chunk overlap in words.
    pub chunk_overlap: Option<usize>,
    /// Upload size limit in bytes.
    pub max_upload_bytes: Option<u64>,
}

/// Query section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileQuery {
    /// Default number of chunks returned.
    pub max_chunks: Option<usize>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Filter directive.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

/// Server section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileServer {
    /// Bind address.
    pub host: Option<String>,
    /// Bind port.
    pub port: Option<u16>,
}
