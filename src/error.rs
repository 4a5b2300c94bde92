use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
  #[error("Database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("CSV error: {0}")]
  Csv(#[from] csv::Error),

  #[error("IO error: {0}")]
  Io(#[from] io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("Config error: {0}")]
  Config(String),

  #[error("{0}")]
  Validation(String),

  #[error("Not found: {0}")]
  NotFound(String),

  #[error("Request to {url} failed with status {status}")]
  Status { url: String, status: u16 },
}

pub type AppResult<T> = std::result::Result<T, AppError>;
