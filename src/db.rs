use chrono::Utc;
use rusqlite::Connection;
use std::fs;
use std::path::Path;

use crate::error::AppResult;

const MIGRATION_SQL_0001: &str = include_str!("../migrations/0001_initial.sql");
const MIGRATION_SQL_0002: &str = include_str!("../migrations/0002_catalog_sync.sql");

pub fn now_iso() -> String {
  Utc::now().to_rfc3339()
}

fn apply_migrations(connection: &Connection) -> AppResult<()> {
  connection.execute_batch("PRAGMA foreign_keys = ON;")?;
  connection.execute_batch(MIGRATION_SQL_0001)?;
  connection.execute_batch(MIGRATION_SQL_0002)?;
  Ok(())
}

pub fn init_database(db_path: &Path) -> AppResult<()> {
  if let Some(parent) = db_path.parent() {
    fs::create_dir_all(parent)?;
  }

  let connection = Connection::open(db_path)?;
  apply_migrations(&connection)?;
  log::debug!("Database ready at {}", db_path.display());
  Ok(())
}

pub fn open_database(db_path: &Path) -> AppResult<Connection> {
  let connection = Connection::open(db_path)?;
  connection.execute_batch("PRAGMA foreign_keys = ON;")?;
  Ok(connection)
}

/// A migrated in-memory database, for tests and throwaway sessions.
pub fn open_in_memory() -> AppResult<Connection> {
  let connection = Connection::open_in_memory()?;
  apply_migrations(&connection)?;
  Ok(connection)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn init_creates_parent_dirs_and_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("cardscan.db");

    init_database(&db_path).unwrap();
    init_database(&db_path).unwrap();

    let connection = open_database(&db_path).unwrap();
    let tables: i64 = connection
      .query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type = 'table'
           AND name IN ('catalog_cards', 'collection_cards', 'catalog_sync_state', 'catalog_refresh_history')",
        [],
        |row| row.get(0),
      )
      .unwrap();
    assert_eq!(tables, 4);
  }
}
