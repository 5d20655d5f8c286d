use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the API base at run time.
const API_BASE_ENV: &str = "STUDENT_LIFE_API_BASE";
/// Environment variable overriding the origin root-relative URLs resolve against.
const API_ORIGIN_ENV: &str = "STUDENT_LIFE_API_ORIGIN";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base joined in front of every request path (e.g. "/api" behind a proxy,
  /// "http://localhost:8080/api" direct to the backend)
  #[serde(default = "default_api_base")]
  pub base: String,
  /// Origin that root-relative URLs are resolved against
  #[serde(default = "default_api_origin")]
  pub origin: String,
  /// Per-request timeout; unset means no timeout
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base: default_api_base(),
      origin: default_api_origin(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite file (defaults to $XDG_DATA_HOME/studentlife/storage.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
  /// How often `dashboard --watch` polls storage for other writers
  #[serde(default = "default_watch_interval_ms")]
  pub watch_interval_ms: u64,
}

impl Default for DashboardConfig {
  fn default() -> Self {
    Self {
      watch_interval_ms: default_watch_interval_ms(),
    }
  }
}

/// API base captured when the binary was built, falling back to "/api".
fn default_api_base() -> String {
  option_env!("STUDENT_LIFE_API_BASE")
    .unwrap_or("/api")
    .to_string()
}

fn default_api_origin() -> String {
  "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> Option<u64> {
  Some(30)
}

fn default_watch_interval_ms() -> u64 {
  500
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./studentlife.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/studentlife/config.yaml
  ///
  /// Without any file the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    Ok(config.with_overrides(
      std::env::var(API_BASE_ENV).ok(),
      std::env::var(API_ORIGIN_ENV).ok(),
    ))
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("studentlife.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("studentlife").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty document parses as null
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Apply run-time overrides; empty values are ignored.
  pub fn with_overrides(mut self, api_base: Option<String>, api_origin: Option<String>) -> Self {
    if let Some(base) = api_base.filter(|v| !v.trim().is_empty()) {
      self.api.base = base;
    }
    if let Some(origin) = api_origin.filter(|v| !v.trim().is_empty()) {
      self.api.origin = origin;
    }
    self
  }

  /// Get the sign-in password from environment variables.
  ///
  /// Checks STUDENT_LIFE_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("STUDENT_LIFE_PASSWORD").map_err(|_| {
      eyre!("Password not found. Set the STUDENT_LIFE_PASSWORD environment variable.")
    })
  }
}
