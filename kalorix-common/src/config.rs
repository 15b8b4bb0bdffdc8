//! Bootstrap configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (applied by the binary)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Built-in default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "KALORIX_CONFIG";
/// Environment variables holding the admin credentials
pub const ADMIN_USER_ENV_VAR: &str = "BASIC_AUTH_USER";
pub const ADMIN_PASS_ENV_VAR: &str = "BASIC_AUTH_PASS";

/// Bootstrap configuration loaded from TOML file
///
/// Cannot change while running; restart to pick up changes.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Path to SQLite database file
    ///
    /// If not specified, the OS-dependent data directory is used.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub source: SourceConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Admin gate credentials
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// External catalog source (Open Food Facts) settings
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,

    /// Page size for interactive searches
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,

    /// Page size for the bulk Czech import
    #[serde(default = "default_import_page_size")]
    pub import_page_size: u32,

    /// Term searched when the user supplies none
    #[serde(default = "default_term")]
    pub default_term: String,

    #[serde(default = "default_country")]
    pub country: String,

    #[serde(default = "default_language")]
    pub language: String,
}

fn default_port() -> u16 {
    5780
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_source_base_url() -> String {
    "https://world.openfoodfacts.org".to_string()
}

fn default_source_timeout_secs() -> u64 {
    15
}

fn default_search_page_size() -> u32 {
    50
}

fn default_import_page_size() -> u32 {
    200
}

fn default_term() -> String {
    "banán".to_string()
}

fn default_country() -> String {
    "czech-republic".to_string()
}

fn default_language() -> String {
    "cs".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            database_path: None,
            logging: LoggingConfig::default(),
            admin: AdminConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_base_url(),
            timeout_secs: default_source_timeout_secs(),
            search_page_size: default_search_page_size(),
            import_page_size: default_import_page_size(),
            default_term: default_term(),
            country: default_country(),
            language: default_language(),
        }
    }
}

impl AdminConfig {
    /// Both credentials, if configured and non-empty
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.clone(), pass.clone()))
            }
            _ => None,
        }
    }
}

impl TomlConfig {
    /// Load configuration
    ///
    /// Reads the TOML file found by [`resolve_config_path`] (defaults if none
    /// exists), then applies environment overrides.
    pub fn load(cli_config: Option<&Path>) -> Result<Self> {
        Self::load_from(resolve_config_path(cli_config).as_deref())
    }

    /// Load from an already resolved config file path
    ///
    /// Does not log; the binary reports the outcome once tracing is up.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => load_toml_config(path)?,
            None => TomlConfig::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (admin credentials)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(user) = std::env::var(ADMIN_USER_ENV_VAR) {
            self.admin.username = Some(user);
        }
        if let Ok(pass) = std::env::var(ADMIN_PASS_ENV_VAR) {
            self.admin.password = Some(pass);
        }
    }

    /// Problems worth a startup warning
    pub fn startup_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.admin.credentials().is_none() {
            warnings.push(format!(
                "Admin credentials not configured ({} / {}); admin routes will reject all requests",
                ADMIN_USER_ENV_VAR, ADMIN_PASS_ENV_VAR
            ));
        }
        warnings
    }

    /// Database path, falling back to the OS-dependent default
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Locate the config file
///
/// Priority: explicit path → `KALORIX_CONFIG` → `~/.config/kalorix/config.toml`.
/// An explicit path is returned even if missing so loading reports the error.
pub fn resolve_config_path(cli_config: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_config {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("kalorix").join("config.toml"))
        .filter(|p| p.exists())
}

/// OS-dependent default database path
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("kalorix"))
        .unwrap_or_else(|| PathBuf::from("./kalorix_data"))
        .join("kalorix.db")
}
