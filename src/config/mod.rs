//! Credentials and runtime settings, loaded once at process start.
//!
//! The file lives at `~/.flupload` (TOML) unless `FLUPLOAD_CONFIG` points
//! elsewhere. Only `api_key` and `auth_token` are required; unknown keys
//! (such as a legacy `shared_secret`) are ignored.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ledger::LEDGER_FILE, lock, Error, Result};

pub const CONFIG_ENV: &str = "FLUPLOAD_CONFIG";
pub const CONFIG_FILE: &str = ".flupload";
pub const AUTO_KEYWORD: &str = "auto";

const DEFAULT_ENDPOINT: &str = "https://up.flickr.com/services/upload/";
const DEFAULT_AUTO_PATH: &str = "/Volumes/Untitled";
const DEFAULT_EXTENSION: &str = "jpg";
const DEFAULT_LOCK_NAME: &str = "flupload";
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub api_key: String,
    pub auth_token: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Total per-upload HTTP timeout; unset means no limit.
    #[serde(default)]
    pub upload_timeout_secs: Option<u64>,
    /// Ledger location; defaults to `processed.db` next to the executable.
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
    /// Directory holding lock files; defaults to the system temp dir.
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,
    #[serde(default = "default_lock_name")]
    pub lock_name: String,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Directory used when the target argument is `auto`.
    #[serde(default = "default_auto_path")]
    pub auto_path: PathBuf,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_lock_name() -> String {
    DEFAULT_LOCK_NAME.to_string()
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_auto_path() -> PathBuf {
    PathBuf::from(DEFAULT_AUTO_PATH)
}

pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILE)
}

pub fn load() -> Result<Config> {
    load_from(&config_path())
}

pub fn load_from(path: &Path) -> Result<Config> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::MissingCredentials(path.display().to_string()).into());
        }
        Err(err) => {
            return Err(Error::InvalidConfig(format!(
                "failed to read {}: {err}",
                path.display()
            ))
            .into());
        }
    };
    let config = parse(&contents)
        .map_err(|e| Error::InvalidConfig(format!("failed to parse {}: {e}", path.display())))?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

pub fn parse(contents: &str) -> std::result::Result<Config, String> {
    let config: Config = toml::from_str(contents).map_err(|e| e.to_string())?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.auth_token.trim().is_empty() {
            return Err("auth_token must not be empty".into());
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err("extension must not be empty".into());
        }
        lock::validate_name(&self.lock_name)
            .map_err(|name| format!("invalid lock_name: {name}"))?;
        Ok(())
    }

    pub fn ledger_path(&self) -> Result<PathBuf> {
        match &self.ledger_path {
            Some(path) => Ok(path.clone()),
            None => default_ledger_path(),
        }
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn upload_timeout(&self) -> Option<Duration> {
        self.upload_timeout_secs.map(Duration::from_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Extension without a leading dot, as configured.
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    /// Map the positional CLI argument to the directory to scan.
    pub fn resolve_target(&self, target: &str) -> PathBuf {
        if target == AUTO_KEYWORD {
            self.auto_path.clone()
        } else {
            PathBuf::from(target)
        }
    }
}

/// `processed.db` in the directory holding the running executable.
pub fn default_ledger_path() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|e| Error::InvalidConfig(format!("cannot locate executable: {e}")))?;
    let dir = exe
        .parent()
        .ok_or_else(|| Error::InvalidConfig("executable path has no parent".into()))?;
    Ok(dir.join(LEDGER_FILE))
}
