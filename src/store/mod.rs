//! Durable offline cache for calendars, events, task lists and tasks.
//!
//! The store is the only component with atomicity requirements: the two
//! bulk replace operations per hierarchy run inside a single transaction so
//! readers never observe a partially written parent or child set. Storage
//! errors propagate to the caller; there is no partial-success return.

mod events;
pub mod schema;
mod tasks;

use chrono::{DateTime, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Freshness cursor key for the event hierarchy.
pub const EVENTS_LAST_SYNC: &str = "events.last_sync";
/// Freshness cursor key for the task hierarchy.
pub const TASKS_LAST_SYNC: &str = "tasks.last_sync";

/// Connection wrapper for the offline cache database.
pub struct Store {
  conn: Mutex<Connection>,
}

impl Store {
  /// Open or create the database at the default location.
  pub fn open_default() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open an in-memory database. Used by tests and throwaway runs.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("datebook").join("cache.db"))
  }

  /// Run database migrations.
  fn run_migrations(&self) -> Result<()> {
    self
      .conn()?
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Read a hierarchy's "last full sync" instant. `None` means never synced.
  pub fn last_sync(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
    let conn = self.conn()?;

    let mut stmt = conn
      .prepare("SELECT value FROM sync_state WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let millis: Option<i64> = stmt.query_row(params![key], |row| row.get(0)).ok();

    millis.map(from_millis).transpose()
  }

  /// Record a hierarchy's "last full sync" instant.
  pub fn set_last_sync(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
    self
      .conn()?
      .execute(
        "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
        params![key, to_millis(at)],
      )
      .map_err(|e| eyre!("Failed to record sync cursor: {}", e))?;

    Ok(())
  }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
  at.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
  Utc
    .timestamp_millis_opt(millis)
    .single()
    .ok_or_else(|| eyre!("Timestamp out of range: {}", millis))
}
