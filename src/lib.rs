pub mod cache;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod scanner;
pub mod setcode;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cache::{CatalogRefreshResultDto, CatalogSyncStateDto};
use crate::catalog::{CatalogSource, TcgCsvDataSource};
pub use crate::config::AppConfig;
use crate::db::{init_database, open_database};
pub use crate::error::{AppError, AppResult};
pub use crate::models::{CardData, CollectionCard, CollectionSummaryDto, SortType};
use crate::scanner::{ScanSession, ScanningState};
use crate::setcode::TextRecognizer;

#[derive(Clone, Debug)]
pub struct AppState {
  pub db_path: PathBuf,
  pub config: AppConfig,
}

impl AppState {
  /// Creates the data dir and applies migrations.
  pub fn initialize(config: AppConfig) -> AppResult<Self> {
    let db_path = config.db_path();
    init_database(&db_path)?;
    Ok(Self { db_path, config })
  }

  pub fn catalog_source(&self) -> AppResult<TcgCsvDataSource> {
    TcgCsvDataSource::new(&self.config)
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrameScanDto {
  pub frame: String,
  pub set_code: Option<String>,
  pub product_id: Option<String>,
  pub state: ScanningState,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanReportDto {
  pub frames: Vec<FrameScanDto>,
  pub scanned_cards: Vec<CardData>,
  pub committed: usize,
}

pub fn sync_catalog(
  state: &AppState,
  source: &dyn CatalogSource,
  force: bool,
) -> AppResult<CatalogRefreshResultDto> {
  let mut connection = open_database(&state.db_path)?;
  if force {
    let result = cache::refresh_catalog(&mut connection, source)?;
    if result.applied {
      collection::sync_collection_prices(&connection)?;
    }
    return Ok(result);
  }

  let inserted = cache::ensure_cards_are_cached(&mut connection, source)?;
  if inserted > 0 {
    collection::sync_collection_prices(&connection)?;
  }
  let sync_state = cache::load_catalog_sync_state(&connection)?;
  Ok(CatalogRefreshResultDto {
    dataset: sync_state.dataset,
    strategy: "lazy".to_string(),
    previous_records: sync_state.total_records - inserted as i64,
    total_records: sync_state.total_records,
    state_hash: sync_state.state_hash,
    applied: inserted > 0,
  })
}

pub fn get_catalog_sync_state(state: &AppState) -> AppResult<CatalogSyncStateDto> {
  let connection = open_database(&state.db_path)?;
  cache::load_catalog_sync_state(&connection)
}

/// Runs every frame through one scan session. The cache is populated first
/// if it is still empty.
pub fn scan_frames(
  state: &AppState,
  source: &dyn CatalogSource,
  recognizer: &dyn TextRecognizer,
  frames: &[PathBuf],
  commit: bool,
) -> AppResult<ScanReportDto> {
  let mut connection = open_database(&state.db_path)?;
  cache::ensure_cards_are_cached(&mut connection, source)?;

  let mut session = ScanSession::new();
  let mut reports = Vec::new();
  for frame in frames {
    session.capture_image();
    let report = match recognizer.recognize(frame) {
      Ok(text) => {
        let card = session.on_image_captured(&connection, &text);
        FrameScanDto {
          frame: frame.display().to_string(),
          set_code: session.last_set_code().map(str::to_string),
          product_id: card.map(|card| card.product_id),
          state: session.state().clone(),
        }
      }
      Err(error) => {
        log::error!("Text recognition failed for {}: {}", frame.display(), error);
        session.set_error(format!("Error processing image: {}", error));
        FrameScanDto {
          frame: frame.display().to_string(),
          set_code: None,
          product_id: None,
          state: session.state().clone(),
        }
      }
    };
    reports.push(report);
  }

  session.move_to_review();
  let scanned_cards = session.scanned_cards().to_vec();
  let committed = if commit {
    session.commit_to_collection(&mut connection)?
  } else {
    0
  };

  Ok(ScanReportDto {
    frames: reports,
    scanned_cards,
    committed,
  })
}

pub fn lookup_set_code(state: &AppState, set_code: &str) -> AppResult<CardData> {
  let connection = open_database(&state.db_path)?;
  let code = setcode::match_set_code(set_code)
    .map(|found| found.canonical)
    .unwrap_or_else(|| set_code.trim().to_string());
  cache::find_card_by_set_code(&connection, &code)?
    .ok_or_else(|| AppError::NotFound(format!("no cached card with set code {}", code)))
}

pub fn search_catalog(state: &AppState, query: &str, sort: SortType) -> AppResult<Vec<CardData>> {
  let connection = open_database(&state.db_path)?;
  let cards = cache::search_cards(&connection, query)?;
  Ok(models::apply_sort_and_filter(&cards, "", sort))
}

pub fn get_collection(state: &AppState, query: &str, sort: SortType) -> AppResult<Vec<CollectionCard>> {
  let connection = open_database(&state.db_path)?;
  let rows = collection::get_all_cards_from_collection(&connection)?;
  Ok(models::apply_sort_and_filter_by(rows, query, sort, |row| &row.card))
}

pub fn add_card_to_collection(state: &AppState, product_id: &str) -> AppResult<i64> {
  let connection = open_database(&state.db_path)?;
  let card = cache::get_card_by_id(&connection, product_id)?
    .ok_or_else(|| AppError::NotFound(format!("no cached card with product id {}", product_id)))?;
  collection::add_card_to_collection(&connection, &card)
}

pub fn remove_card_from_collection(state: &AppState, product_id: &str) -> AppResult<Option<i64>> {
  let mut connection = open_database(&state.db_path)?;
  collection::remove_card_from_collection(&mut connection, product_id)
}

pub fn clear_collection(state: &AppState) -> AppResult<usize> {
  let connection = open_database(&state.db_path)?;
  collection::clear_user_collection(&connection)
}

pub fn get_collection_summary(state: &AppState) -> AppResult<CollectionSummaryDto> {
  let connection = open_database(&state.db_path)?;
  collection::load_collection_summary(&connection)
}

pub fn reprice_collection(state: &AppState) -> AppResult<usize> {
  let connection = open_database(&state.db_path)?;
  collection::sync_collection_prices(&connection)
}

pub fn clear_catalog_cache(state: &AppState) -> AppResult<()> {
  let mut connection = open_database(&state.db_path)?;
  cache::clear_cached_cards(&mut connection)
}
