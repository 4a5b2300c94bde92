//! Runtime configuration: built-in defaults, an optional `cardscan.toml`, then
//! environment overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

pub const CONFIG_FILE_NAME: &str = "cardscan.toml";
pub const DATABASE_FILE_DEFAULT: &str = "cardscan.db";
pub const CATALOG_BASE_URL_DEFAULT: &str = "https://tcgcsv.com/tcgplayer/2/";
pub const REQUEST_TIMEOUT_SECONDS_DEFAULT: u64 = 60;
pub const FETCH_ATTEMPTS_DEFAULT: u32 = 3;
pub const RETRY_BACKOFF_MS_DEFAULT: u64 = 500;
pub const RETRY_BACKOFF_MS_MAX: u64 = 60_000;

const HOME_ENV: &str = "CARDSCAN_HOME";
const CATALOG_URL_ENV: &str = "CARDSCAN_CATALOG_URL";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct AppConfig {
  pub data_dir: PathBuf,
  pub database_file: String,
  pub catalog_base_url: String,
  pub request_timeout_secs: u64,
  pub fetch_attempts: u32,
  pub retry_backoff_ms: u64,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      database_file: DATABASE_FILE_DEFAULT.to_string(),
      catalog_base_url: CATALOG_BASE_URL_DEFAULT.to_string(),
      request_timeout_secs: REQUEST_TIMEOUT_SECONDS_DEFAULT,
      fetch_attempts: FETCH_ATTEMPTS_DEFAULT,
      retry_backoff_ms: RETRY_BACKOFF_MS_DEFAULT,
    }
  }
}

fn default_data_dir() -> PathBuf {
  dirs::data_dir()
    .or_else(dirs::home_dir)
    .unwrap_or_else(|| PathBuf::from("."))
    .join("cardscan")
}

impl AppConfig {
  /// Loads `path` if given, otherwise `cardscan.toml` inside the data dir when
  /// it exists. Environment overrides are applied last.
  pub fn load(path: Option<&Path>) -> AppResult<Self> {
    let mut config = match path {
      Some(explicit) => Self::from_file(explicit)?,
      None => {
        let base = std::env::var_os(HOME_ENV)
          .map(PathBuf::from)
          .unwrap_or_else(default_data_dir);
        let candidate = base.join(CONFIG_FILE_NAME);
        if candidate.exists() {
          Self::from_file(&candidate)?
        } else {
          Self::default()
        }
      }
    };

    if let Some(home) = std::env::var_os(HOME_ENV) {
      config.data_dir = PathBuf::from(home);
    }
    if let Ok(url) = std::env::var(CATALOG_URL_ENV) {
      config.catalog_base_url = url;
    }

    config.normalize()
  }

  pub fn from_file(path: &Path) -> AppResult<Self> {
    let text = fs::read_to_string(path)?;
    Self::from_toml_str(&text)
      .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))
  }

  pub fn from_toml_str(text: &str) -> AppResult<Self> {
    let parsed: AppConfig = toml::from_str(text).map_err(|e| AppError::Config(e.to_string()))?;
    parsed.normalize()
  }

  fn normalize(mut self) -> AppResult<Self> {
    let url = self.catalog_base_url.trim().to_string();
    if url.is_empty() {
      return Err(AppError::Config("catalog_base_url must not be empty".to_string()));
    }
    self.catalog_base_url = if url.ends_with('/') { url } else { format!("{}/", url) };

    if self.database_file.trim().is_empty() {
      self.database_file = DATABASE_FILE_DEFAULT.to_string();
    }
    if self.fetch_attempts == 0 {
      self.fetch_attempts = 1;
    }
    if self.request_timeout_secs == 0 {
      self.request_timeout_secs = 1;
    }
    self.retry_backoff_ms = self.retry_backoff_ms.min(RETRY_BACKOFF_MS_MAX);
    Ok(self)
  }

  pub fn db_path(&self) -> PathBuf {
    self.data_dir.join(&self.database_file)
  }
}
