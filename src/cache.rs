//! Local mirror of the remote catalog.
//!
//! The `catalog_cards` table holds either the whole catalog or nothing. Every
//! write path replaces it inside one transaction, so an interrupted or failed
//! refresh never leaves a partial mirror behind.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::catalog::{preload_all_cards, CatalogSource};
use crate::db::now_iso;
use crate::error::AppResult;
use crate::models::CardData;

pub const CATALOG_DATASET: &str = "tcgcsv_yugioh";

const CARD_COLUMNS: &str = "product_id, name, clean_name, set_name, image_url, ext_number, ext_rarity,
  group_id, category_id, market_price";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSyncStateDto {
  pub dataset: String,
  pub state_hash: Option<String>,
  pub synced_at: Option<String>,
  pub total_records: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRefreshResultDto {
  pub dataset: String,
  pub strategy: String,
  pub previous_records: i64,
  pub total_records: i64,
  pub state_hash: Option<String>,
  pub applied: bool,
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<CardData> {
  Ok(CardData {
    product_id: row.get(0)?,
    name: row.get(1)?,
    clean_name: row.get(2)?,
    set_name: row.get(3)?,
    image_url: row.get(4)?,
    ext_number: row.get(5)?,
    ext_rarity: row.get(6)?,
    group_id: row.get(7)?,
    category_id: row.get(8)?,
    market_price: row.get(9)?,
  })
}

fn upsert_catalog_card(connection: &Connection, card: &CardData) -> AppResult<()> {
  connection.execute(
    "INSERT INTO catalog_cards (
        product_id, name, clean_name, set_name, image_url, ext_number, ext_rarity,
        group_id, category_id, market_price
      )
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
      ON CONFLICT(product_id) DO UPDATE SET
        name = excluded.name,
        clean_name = excluded.clean_name,
        set_name = excluded.set_name,
        image_url = excluded.image_url,
        ext_number = excluded.ext_number,
        ext_rarity = excluded.ext_rarity,
        group_id = excluded.group_id,
        category_id = excluded.category_id,
        market_price = excluded.market_price",
    params![
      card.product_id.trim(),
      card.name.trim(),
      card.clean_name.trim(),
      card.set_name.trim(),
      card.image_url.trim(),
      card.ext_number.trim(),
      card.ext_rarity.trim(),
      card.group_id,
      card.category_id,
      card.market_price
    ],
  )?;
  Ok(())
}

pub fn count_cached_cards(connection: &Connection) -> AppResult<i64> {
  Ok(connection.query_row("SELECT COUNT(*) FROM catalog_cards", [], |row| row.get(0))?)
}

/// Bulk upsert. Duplicate product ids within `cards` resolve to the last one.
pub fn cache_cards(connection: &mut Connection, cards: &[CardData]) -> AppResult<usize> {
  let tx = connection.transaction()?;
  for card in cards {
    upsert_catalog_card(&tx, card)?;
  }
  tx.commit()?;
  Ok(cards.len())
}

pub fn get_cached_cards(connection: &Connection) -> AppResult<Vec<CardData>> {
  let mut statement = connection.prepare(&format!(
    "SELECT {} FROM catalog_cards ORDER BY name COLLATE NOCASE, product_id",
    CARD_COLUMNS
  ))?;
  let rows = statement.query_map([], card_from_row)?;
  Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn clear_cached_cards(connection: &mut Connection) -> AppResult<()> {
  let tx = connection.transaction()?;
  tx.execute("DELETE FROM catalog_cards", [])?;
  tx.execute(
    "DELETE FROM catalog_sync_state WHERE dataset = ?1",
    params![CATALOG_DATASET],
  )?;
  tx.commit()?;
  log::info!("Cleared cached catalog");
  Ok(())
}

/// Exact, case-insensitive match on the printed set code. A miss never falls
/// back to the remote catalog.
pub fn find_card_by_set_code(connection: &Connection, set_code: &str) -> AppResult<Option<CardData>> {
  let code = set_code.trim();
  if code.is_empty() {
    return Ok(None);
  }

  let found = connection
    .query_row(
      &format!(
        "SELECT {} FROM catalog_cards
         WHERE ext_number = ?1 COLLATE NOCASE
         ORDER BY product_id
         LIMIT 1",
        CARD_COLUMNS
      ),
      params![code],
      card_from_row,
    )
    .optional()?;

  if found.is_none() {
    log::debug!("Card with set code {} not found in cache", code);
  }
  Ok(found)
}

pub fn get_card_by_id(connection: &Connection, product_id: &str) -> AppResult<Option<CardData>> {
  Ok(
    connection
      .query_row(
        &format!("SELECT {} FROM catalog_cards WHERE product_id = ?1", CARD_COLUMNS),
        params![product_id.trim()],
        card_from_row,
      )
      .optional()?,
  )
}

pub fn search_cards(connection: &Connection, query: &str) -> AppResult<Vec<CardData>> {
  let mut statement = connection.prepare(&format!(
    "SELECT {} FROM catalog_cards
     WHERE name LIKE '%' || ?1 || '%' OR set_name LIKE '%' || ?1 || '%'
     ORDER BY name COLLATE NOCASE, product_id",
    CARD_COLUMNS
  ))?;
  let rows = statement.query_map(params![query.trim()], card_from_row)?;
  Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn compute_catalog_state_hash(connection: &Connection) -> AppResult<String> {
  let mut statement = connection.prepare(&format!(
    "SELECT {} FROM catalog_cards ORDER BY product_id",
    CARD_COLUMNS
  ))?;
  let mut rows = statement.query([])?;
  let mut hasher = Sha256::new();
  hasher.update(CATALOG_DATASET.as_bytes());
  hasher.update(b"\n");

  while let Some(row) = rows.next()? {
    let card = card_from_row(row)?;
    let line = format!(
      "{}|{}|{}|{}|{}|{}|{}|{}|{}|{:.6}\n",
      card.product_id,
      card.name,
      card.clean_name,
      card.set_name,
      card.image_url,
      card.ext_number,
      card.ext_rarity,
      card.group_id,
      card.category_id,
      card.market_price
    );
    hasher.update(line.as_bytes());
  }

  Ok(format!("{:x}", hasher.finalize()))
}

fn write_catalog_sync_state(connection: &Connection, state_hash: &str, total_records: i64) -> AppResult<()> {
  let now = now_iso();
  connection.execute(
    "INSERT INTO catalog_sync_state (dataset, state_hash, total_records, synced_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?4)
     ON CONFLICT(dataset) DO UPDATE SET
       state_hash = excluded.state_hash,
       total_records = excluded.total_records,
       synced_at = excluded.synced_at,
       updated_at = excluded.updated_at",
    params![CATALOG_DATASET, state_hash, total_records, now],
  )?;
  Ok(())
}

fn append_refresh_history(
  connection: &Connection,
  strategy: &str,
  previous_records: i64,
  total_records: i64,
  state_hash: &str,
) -> AppResult<()> {
  connection.execute(
    "INSERT INTO catalog_refresh_history (
       id, dataset, strategy, previous_records, total_records, state_hash, refreshed_at
     )
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    params![
      Uuid::new_v4().to_string(),
      CATALOG_DATASET,
      strategy,
      previous_records,
      total_records,
      state_hash,
      now_iso()
    ],
  )?;
  Ok(())
}

pub fn load_catalog_sync_state(connection: &Connection) -> AppResult<CatalogSyncStateDto> {
  let (state_hash, synced_at): (Option<String>, Option<String>) = connection
    .query_row(
      "SELECT state_hash, synced_at FROM catalog_sync_state WHERE dataset = ?1 LIMIT 1",
      params![CATALOG_DATASET],
      |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?
    .unwrap_or((None, None));

  Ok(CatalogSyncStateDto {
    dataset: CATALOG_DATASET.to_string(),
    state_hash,
    synced_at,
    total_records: count_cached_cards(connection)?,
  })
}

pub fn count_refresh_history(connection: &Connection) -> AppResult<i64> {
  Ok(connection.query_row(
    "SELECT COUNT(*) FROM catalog_refresh_history WHERE dataset = ?1",
    params![CATALOG_DATASET],
    |row| row.get(0),
  )?)
}

fn replace_catalog(
  connection: &mut Connection,
  cards: &[CardData],
  strategy: &str,
) -> AppResult<CatalogRefreshResultDto> {
  let tx = connection.transaction()?;
  let previous_records = count_cached_cards(&tx)?;

  tx.execute("DELETE FROM catalog_cards", [])?;
  for card in cards {
    upsert_catalog_card(&tx, card)?;
  }

  let total_records = count_cached_cards(&tx)?;
  let state_hash = compute_catalog_state_hash(&tx)?;
  write_catalog_sync_state(&tx, &state_hash, total_records)?;
  append_refresh_history(&tx, strategy, previous_records, total_records, &state_hash)?;
  tx.commit()?;

  log::info!(
    "Catalog {} applied: {} -> {} records",
    strategy,
    previous_records,
    total_records
  );

  Ok(CatalogRefreshResultDto {
    dataset: CATALOG_DATASET.to_string(),
    strategy: strategy.to_string(),
    previous_records,
    total_records,
    state_hash: Some(state_hash),
    applied: true,
  })
}

fn skipped_result(connection: &Connection, strategy: &str) -> AppResult<CatalogRefreshResultDto> {
  let state = load_catalog_sync_state(connection)?;
  Ok(CatalogRefreshResultDto {
    dataset: state.dataset,
    strategy: strategy.to_string(),
    previous_records: state.total_records,
    total_records: state.total_records,
    state_hash: state.state_hash,
    applied: false,
  })
}

/// Downloads the full catalog only when the cache is empty. Returns how many
/// cards were inserted; 0 when the cache was already populated or the remote
/// fetch produced nothing.
pub fn ensure_cards_are_cached(connection: &mut Connection, source: &dyn CatalogSource) -> AppResult<usize> {
  if count_cached_cards(connection)? > 0 {
    return Ok(0);
  }

  log::info!("Catalog cache is empty, downloading full catalog");
  let cards = preload_all_cards(source);
  if cards.is_empty() {
    log::warn!("Catalog download produced no cards; cache left empty");
    return Ok(0);
  }

  let result = replace_catalog(connection, &cards, "lazy")?;
  Ok(result.total_records as usize)
}

/// Forced full refresh. The fetched catalog replaces the cache atomically; an
/// empty or failed fetch keeps the current mirror.
pub fn refresh_catalog(
  connection: &mut Connection,
  source: &dyn CatalogSource,
) -> AppResult<CatalogRefreshResultDto> {
  let cards = preload_all_cards(source);
  if cards.is_empty() {
    log::warn!("Catalog refresh produced no cards; keeping existing cache");
    return skipped_result(connection, "refresh");
  }
  replace_catalog(connection, &cards, "refresh")
}
