//! Configuration loading and resolution
//!
//! Every setting resolves in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::api::DEFAULT_CITY;
use crate::events::DEFAULT_MAX_FRAME_BYTES;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Backend base URL used when nothing else is configured
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000/api";

/// Environment variable overriding the backend base URL
pub const BACKEND_URL_ENV: &str = "SCAI_BACKEND_URL";

/// Environment variable pointing at a TOML config file
pub const CONFIG_PATH_ENV: &str = "SCAI_CONFIG";

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for the scai crates (e.g. "debug"), or a full filter directive
    pub level: String,
    /// Optional log file, written in addition to stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Where the console writes the rendered map
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frame_bytes: Option<usize>,
    pub logging: LoggingConfig,
}

/// Values supplied on the command line (None when the flag was not given)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend_url: Option<String>,
    pub city: Option<String>,
    pub output_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub backend_url: String,
    pub city: String,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub max_frame_bytes: usize,
}

impl ResolvedConfig {
    /// Merge CLI overrides, environment and TOML into final settings
    pub fn resolve(overrides: &ConfigOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let backend_url = resolve_backend_url(overrides.backend_url.as_deref(), toml_config)?;

        let city = overrides
            .city
            .clone()
            .or_else(|| toml_config.city.clone())
            .unwrap_or_else(|| DEFAULT_CITY.to_string());

        let max_frame_bytes = toml_config.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES);
        if max_frame_bytes == 0 {
            return Err(Error::Config("max_frame_bytes must be greater than zero".to_string()));
        }

        Ok(Self {
            backend_url,
            city,
            log_level: overrides
                .log_level
                .clone()
                .unwrap_or_else(|| toml_config.logging.level.clone()),
            log_file: toml_config.logging.file.clone(),
            output_path: overrides
                .output_path
                .clone()
                .or_else(|| toml_config.output_path.clone()),
            max_frame_bytes,
        })
    }
}

/// Resolve the backend base URL (CLI → SCAI_BACKEND_URL → TOML → default)
///
/// The result never ends with a slash so endpoint paths can be appended directly.
pub fn resolve_backend_url(cli_arg: Option<&str>, toml_config: &TomlConfig) -> Result<String> {
    // Priority 1: Command-line argument
    let (url, source) = if let Some(url) = cli_arg {
        (url.to_string(), "command line")
    // Priority 2: Environment variable
    } else if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
        (url, "environment")
    // Priority 3: TOML config file
    } else if let Some(url) = &toml_config.backend_url {
        (url.clone(), "TOML config")
    // Priority 4: Compiled default
    } else {
        (DEFAULT_BACKEND_URL.to_string(), "default")
    };

    let trimmed = url.trim().trim_end_matches('/').to_string();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(Error::Config(format!(
            "backend URL from {source} must start with http:// or https://: {url:?}"
        )));
    }

    debug!(backend_url = %trimmed, source, "Backend URL resolved");
    Ok(trimmed)
}

/// Locate the TOML config file (CLI → SCAI_CONFIG → platform default)
///
/// Returns None when no explicit path was given and the platform default does not exist.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    default_config_path().filter(|path| path.exists())
}

/// `<config dir>/scai/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("scai").join("config.toml"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(format!("config file {}", path.display())),
        _ => Error::Io(e),
    })?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Load configuration, falling back to defaults when the file is missing
///
/// A file that exists but fails to parse is an error.
pub fn load_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        debug!("No config file, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    match load_toml_config(path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        Err(Error::NotFound(_)) => {
            warn!("Config file {} not found, using defaults", path.display());
            Ok(TomlConfig::default())
        }
        Err(e) => Err(e),
    }
}

/// Write a config file atomically (temp file + rename), creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
