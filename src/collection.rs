use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::now_iso;
use crate::error::AppResult;
use crate::models::{CardData, CollectionCard, CollectionSummaryDto};

fn collection_card_from_row(row: &Row<'_>) -> rusqlite::Result<CollectionCard> {
  Ok(CollectionCard {
    card: CardData {
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
    },
    count: row.get(10)?,
    added_at: row.get(11)?,
    updated_at: row.get(12)?,
  })
}

fn read_count(connection: &Connection, product_id: &str) -> AppResult<Option<i64>> {
  Ok(
    connection
      .query_row(
        "SELECT count FROM collection_cards WHERE product_id = ?1",
        params![product_id],
        |row| row.get(0),
      )
      .optional()?,
  )
}

/// Adds one copy. The stored snapshot (name, price, ...) is refreshed from
/// `card`. Returns the new count.
pub fn add_card_to_collection(connection: &Connection, card: &CardData) -> AppResult<i64> {
  let now = now_iso();
  connection.execute(
    "INSERT INTO collection_cards (
       product_id, name, clean_name, set_name, ext_number, ext_rarity, image_url,
       group_id, category_id, market_price, count, added_at, updated_at
     )
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11, ?11)
     ON CONFLICT(product_id) DO UPDATE SET
       name = excluded.name,
       clean_name = excluded.clean_name,
       set_name = excluded.set_name,
       ext_number = excluded.ext_number,
       ext_rarity = excluded.ext_rarity,
       image_url = excluded.image_url,
       group_id = excluded.group_id,
       category_id = excluded.category_id,
       market_price = excluded.market_price,
       count = collection_cards.count + 1,
       updated_at = excluded.updated_at",
    params![
      card.product_id,
      card.name,
      card.clean_name,
      card.set_name,
      card.ext_number,
      card.ext_rarity,
      card.image_url,
      card.group_id,
      card.category_id,
      card.market_price,
      now
    ],
  )?;

  let count = read_count(connection, &card.product_id)?.unwrap_or(1);
  log::debug!("Collection: {} x{}", card.name, count);
  Ok(count)
}

/// Removes one copy. The last copy deletes the row instead of leaving a zero
/// count. Returns the remaining count, `None` once the card is gone.
pub fn remove_card_from_collection(connection: &mut Connection, product_id: &str) -> AppResult<Option<i64>> {
  let tx = connection.transaction()?;
  let remaining = match read_count(&tx, product_id)? {
    Some(count) if count > 1 => {
      tx.execute(
        "UPDATE collection_cards SET count = count - 1, updated_at = ?1 WHERE product_id = ?2",
        params![now_iso(), product_id],
      )?;
      Some(count - 1)
    }
    Some(_) => {
      tx.execute(
        "DELETE FROM collection_cards WHERE product_id = ?1",
        params![product_id],
      )?;
      None
    }
    None => None,
  };
  tx.commit()?;
  Ok(remaining)
}

pub fn get_all_cards_from_collection(connection: &Connection) -> AppResult<Vec<CollectionCard>> {
  let mut statement = connection.prepare(
    "SELECT product_id, name, clean_name, set_name, image_url, ext_number, ext_rarity,
            group_id, category_id, market_price, count, added_at, updated_at
     FROM collection_cards
     ORDER BY name COLLATE NOCASE, product_id",
  )?;
  let rows = statement.query_map([], collection_card_from_row)?;
  Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_total_collection_value(connection: &Connection) -> AppResult<f64> {
  Ok(connection.query_row(
    "SELECT COALESCE(SUM(market_price * count), 0.0) FROM collection_cards",
    [],
    |row| row.get(0),
  )?)
}

pub fn get_number_of_cards(connection: &Connection) -> AppResult<i64> {
  Ok(connection.query_row(
    "SELECT COALESCE(SUM(count), 0) FROM collection_cards",
    [],
    |row| row.get(0),
  )?)
}

pub fn load_collection_summary(connection: &Connection) -> AppResult<CollectionSummaryDto> {
  let distinct_cards: i64 =
    connection.query_row("SELECT COUNT(*) FROM collection_cards", [], |row| row.get(0))?;
  let total_value = get_total_collection_value(connection)?;
  Ok(CollectionSummaryDto {
    distinct_cards,
    total_cards: get_number_of_cards(connection)?,
    total_value: (total_value * 100.0).round() / 100.0,
  })
}

pub fn clear_user_collection(connection: &Connection) -> AppResult<usize> {
  let removed = connection.execute("DELETE FROM collection_cards", [])?;
  log::info!("Cleared {} collection rows", removed);
  Ok(removed)
}

/// Copies current catalog prices onto owned cards. Cards no longer in the
/// catalog keep their last known price.
pub fn sync_collection_prices(connection: &Connection) -> AppResult<usize> {
  let updated = connection.execute(
    "UPDATE collection_cards
     SET market_price = (
           SELECT c.market_price FROM catalog_cards c
           WHERE c.product_id = collection_cards.product_id
         ),
         updated_at = ?1
     WHERE EXISTS (
       SELECT 1 FROM catalog_cards c
       WHERE c.product_id = collection_cards.product_id
         AND c.market_price <> collection_cards.market_price
     )",
    params![now_iso()],
  )?;
  Ok(updated)
}
