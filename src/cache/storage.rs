//! Cache storage trait and SQLite implementation.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use super::traits::{merge_object, ListingRef};
use crate::error::{Result, TaskError};

/// Trait for cache storage backends.
///
/// Backends hold one canonical record per `(entity_type, key)` and listings
/// that only reference those records. Every write merges into the canonical
/// record instead of replacing it. Records are raw JSON; typing happens in
/// [`super::CacheLayer`].
pub trait CacheStorage: Send + Sync {
  /// Get the records of a listing in order, or `None` if it was never stored.
  fn get_listing(&self, entity_type: &str, listing: &str) -> Result<Option<Vec<Value>>>;

  /// Merge `entities` into the entity store and point the listing at them.
  /// Returns the merged canonical records in the same order.
  fn store_listing(
    &self,
    entity_type: &str,
    listing: &ListingRef,
    entities: &[(String, Value)],
  ) -> Result<Vec<Value>>;

  /// Get a single record by key.
  fn get_entity(&self, entity_type: &str, key: &str) -> Result<Option<Value>>;

  /// Merge a full record into the store, inserting it if absent.
  fn store_entity(&self, entity_type: &str, key: &str, data: &Value) -> Result<Value>;

  /// Merge a patch into an existing record. `None` if the record is absent.
  fn merge_entity(&self, entity_type: &str, key: &str, patch: &Value) -> Result<Option<Value>>;

  /// Remove a record and every listing reference to it.
  fn remove_entity(&self, entity_type: &str, key: &str) -> Result<bool>;

  /// Largest key referenced by any cached page of a listing family.
  fn max_listed_key(&self, entity_type: &str, family: &str) -> Result<Option<String>>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache database at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| TaskError::storage(format!("failed to create cache directory: {e}")))?;
    }

    let conn = Connection::open(&path).map_err(|e| {
      TaskError::storage(format!(
        "failed to open cache database at {}: {e}",
        path.display()
      ))
    })?;
    info!(path = %path.display(), "opened sqlite cache");

    Self::with_connection(conn)
  }

  /// Open a private, non-persistent database.
  pub fn in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| TaskError::storage("could not determine data directory"))?;

    Ok(data_dir.join("taskdeck").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .conn()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| TaskError::storage(format!("failed to run cache migrations: {e}")))
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| TaskError::storage(format!("lock poisoned: {e}")))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Canonical entity records (serialized JSON)
CREATE TABLE IF NOT EXISTS entity_cache (
    entity_type TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (entity_type, entity_key)
);

-- Listing tracking
CREATE TABLE IF NOT EXISTS listing_cache (
    listing_hash TEXT PRIMARY KEY,
    family TEXT NOT NULL,
    description TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_listing_cache_family
    ON listing_cache(entity_type, family);

-- Listing to entity mapping (preserves order)
CREATE TABLE IF NOT EXISTS listing_entries (
    listing_hash TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (listing_hash, entity_key),
    FOREIGN KEY (listing_hash) REFERENCES listing_cache(listing_hash) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_listing_entries_key ON listing_entries(entity_key);
"#;

fn read_entity(conn: &Connection, entity_type: &str, key: &str) -> Result<Option<Value>> {
  let data: Option<Vec<u8>> = conn
    .query_row(
      "SELECT data FROM entity_cache WHERE entity_type = ?1 AND entity_key = ?2",
      params![entity_type, key],
      |row| row.get(0),
    )
    .optional()?;

  data
    .map(|d| serde_json::from_slice(&d).map_err(|e| TaskError::decode("cached entity", e)))
    .transpose()
}

fn write_entity(conn: &Connection, entity_type: &str, key: &str, data: &Value) -> Result<()> {
  let bytes = serde_json::to_vec(data).map_err(|e| TaskError::decode(entity_type, e))?;
  conn.execute(
    "INSERT OR REPLACE INTO entity_cache (entity_type, entity_key, data, cached_at)
     VALUES (?1, ?2, ?3, datetime('now'))",
    params![entity_type, key, bytes],
  )?;
  Ok(())
}

/// Merge `incoming` over the stored record (if any) and write it back.
fn upsert_entity(conn: &Connection, entity_type: &str, key: &str, incoming: &Value) -> Result<Value> {
  // An unreadable stored record is replaced outright.
  let merged = match read_entity(conn, entity_type, key).ok().flatten() {
    Some(mut current) => {
      merge_object(&mut current, incoming)?;
      current
    }
    None => incoming.clone(),
  };
  write_entity(conn, entity_type, key, &merged)?;
  Ok(merged)
}

impl CacheStorage for SqliteStorage {
  fn get_listing(&self, entity_type: &str, listing: &str) -> Result<Option<Vec<Value>>> {
    let conn = self.conn()?;

    let known: Option<i64> = conn
      .query_row(
        "SELECT 1 FROM listing_cache WHERE listing_hash = ?1 AND entity_type = ?2",
        params![listing, entity_type],
        |row| row.get(0),
      )
      .optional()?;
    if known.is_none() {
      return Ok(None);
    }

    // Get entities in order
    let mut stmt = conn.prepare(
      "SELECT ec.data FROM listing_entries le
       INNER JOIN entity_cache ec ON ec.entity_type = ?1 AND ec.entity_key = le.entity_key
       WHERE le.listing_hash = ?2
       ORDER BY le.position",
    )?;

    let rows: Vec<Vec<u8>> = stmt
      .query_map(params![entity_type, listing], |row| row.get(0))?
      .collect::<rusqlite::Result<_>>()?;

    let entities = rows
      .iter()
      .map(|data| serde_json::from_slice(data).map_err(|e| TaskError::decode("cached listing", e)))
      .collect::<Result<Vec<Value>>>()?;

    Ok(Some(entities))
  }

  fn store_listing(
    &self,
    entity_type: &str,
    listing: &ListingRef,
    entities: &[(String, Value)],
  ) -> Result<Vec<Value>> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    let mut merged = Vec::with_capacity(entities.len());
    for (key, data) in entities {
      merged.push(upsert_entity(&tx, entity_type, key, data)?);
    }

    tx.execute(
      "DELETE FROM listing_entries WHERE listing_hash = ?1",
      params![listing.hash],
    )?;
    tx.execute(
      "INSERT OR REPLACE INTO listing_cache (listing_hash, family, description, entity_type, cached_at)
       VALUES (?1, ?2, ?3, ?4, datetime('now'))",
      params![listing.hash, listing.family, listing.description, entity_type],
    )?;
    for (position, (key, _)) in entities.iter().enumerate() {
      tx.execute(
        "INSERT OR REPLACE INTO listing_entries (listing_hash, entity_key, position)
         VALUES (?1, ?2, ?3)",
        params![listing.hash, key, position as i64],
      )?;
    }

    tx.commit()?;
    Ok(merged)
  }

  fn get_entity(&self, entity_type: &str, key: &str) -> Result<Option<Value>> {
    let conn = self.conn()?;
    read_entity(&conn, entity_type, key)
  }

  fn store_entity(&self, entity_type: &str, key: &str, data: &Value) -> Result<Value> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    let merged = upsert_entity(&tx, entity_type, key, data)?;
    tx.commit()?;
    Ok(merged)
  }

  fn merge_entity(&self, entity_type: &str, key: &str, patch: &Value) -> Result<Option<Value>> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    let Some(mut current) = read_entity(&tx, entity_type, key)? else {
      return Ok(None);
    };
    merge_object(&mut current, patch)?;
    write_entity(&tx, entity_type, key, &current)?;

    tx.commit()?;
    Ok(Some(current))
  }

  fn remove_entity(&self, entity_type: &str, key: &str) -> Result<bool> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    let removed = tx.execute(
      "DELETE FROM entity_cache WHERE entity_type = ?1 AND entity_key = ?2",
      params![entity_type, key],
    )?;
    tx.execute(
      "DELETE FROM listing_entries
       WHERE entity_key = ?2
         AND listing_hash IN (SELECT listing_hash FROM listing_cache WHERE entity_type = ?1)",
      params![entity_type, key],
    )?;

    tx.commit()?;
    Ok(removed > 0)
  }

  fn max_listed_key(&self, entity_type: &str, family: &str) -> Result<Option<String>> {
    let conn = self.conn()?;
    let max = conn.query_row(
      "SELECT MAX(le.entity_key) FROM listing_entries le
       INNER JOIN listing_cache lc ON lc.listing_hash = le.listing_hash
       WHERE lc.entity_type = ?1 AND lc.family = ?2",
      params![entity_type, family],
      |row| row.get::<_, Option<String>>(0),
    )?;
    Ok(max)
  }
}
