//! Database module - SQLite file used as a set of key-value object stores
//!
//! Every store is a table of `(id, data, updated_at)` rows where `data` is the
//! JSON form of the record. Listing returns records in insertion order.

pub mod catalog;
pub mod session;

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::exercises::Exercise;
use crate::settings::Settings;
use crate::workouts::Workout;

/// Key of the single record in the `settings` store
pub const SETTINGS_KEY: &str = "app";
/// Key of the single record in the `active_session` store
pub const ACTIVE_SESSION_KEY: &str = "current";

/// Object stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    Exercises,
    Workouts,
    Settings,
    ActiveSession,
    History,
}

impl Store {
    pub fn table(&self) -> &'static str {
        match self {
            Store::Exercises => "exercises",
            Store::Workouts => "workouts",
            Store::Settings => "settings",
            Store::ActiveSession => "active_session",
            Store::History => "history",
        }
    }

    pub fn all() -> &'static [Store] {
        &[
            Store::Exercises,
            Store::Workouts,
            Store::Settings,
            Store::ActiveSession,
            Store::History,
        ]
    }
}

/// Database wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("Failed to open database {}", path))?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Fresh database that lives only as long as the value
    pub fn open_in_memory() -> Result<Self> {
        let db = Self { conn: Connection::open_in_memory()? };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        for store in Store::all() {
            self.conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        id TEXT PRIMARY KEY NOT NULL,
                        data TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    )",
                    store.table()
                ),
                [],
            )?;
        }
        Ok(())
    }

    /// Insert or replace a record, keeping its original position
    pub fn put<T: Serialize>(&self, store: Store, id: &str, value: &T) -> Result<()> {
        let data = serde_json::to_string(value)?;
        self.conn.execute(
            &format!(
                "INSERT INTO {} (id, data, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                store.table()
            ),
            params![id, data, Utc::now().to_rfc3339()],
        )?;
        debug!("put {}/{}", store.table(), id);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, store: Store, id: &str) -> Result<Option<T>> {
        let data: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT data FROM {} WHERE id = ?1", store.table()),
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(data) => {
                let value = serde_json::from_str(&data)
                    .with_context(|| format!("Corrupt record {}/{}", store.table(), id))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// All records of a store. Rows that no longer deserialize are skipped.
    pub fn list<T: DeserializeOwned>(&self, store: Store) -> Result<Vec<T>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id, data FROM {} ORDER BY rowid", store.table()))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut values = Vec::with_capacity(rows.len());
        for (id, data) in rows {
            match serde_json::from_str(&data) {
                Ok(value) => values.push(value),
                Err(e) => warn!("Skipping corrupt record {}/{}: {}", store.table(), id, e),
            }
        }
        Ok(values)
    }

    /// Returns true if a record was removed
    pub fn delete(&self, store: Store, id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute(&format!("DELETE FROM {} WHERE id = ?1", store.table()), params![id])?;
        debug!("delete {}/{} ({} rows)", store.table(), id, n);
        Ok(n > 0)
    }

    pub fn clear(&self, store: Store) -> Result<usize> {
        let n = self.conn.execute(&format!("DELETE FROM {}", store.table()), [])?;
        Ok(n)
    }

    pub fn count(&self, store: Store) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", store.table()), [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Run `f` atomically: everything it writes is committed together or not at all
    pub fn transaction<R>(&self, f: impl FnOnce(&Database) -> Result<R>) -> Result<R> {
        let tx = self.conn.unchecked_transaction()?;
        let result = f(self)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn exercises(&self) -> Result<Vec<Exercise>> {
        self.list(Store::Exercises)
    }

    pub fn workouts(&self) -> Result<Vec<Workout>> {
        self.list(Store::Workouts)
    }

    /// Stored settings, or defaults if none were saved yet
    pub fn settings(&self) -> Result<Settings> {
        Ok(self.get(Store::Settings, SETTINGS_KEY)?.unwrap_or_default())
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.put(Store::Settings, SETTINGS_KEY, settings)
    }
}

/// Generated record identifier: base-36 millisecond timestamp plus a random suffix
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..5).map(|_| base36_digit(rng.gen_range(0..36))).collect();
    format!("{}{}", to_base36(millis), suffix)
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(base36_digit((n % 36) as u32));
        n /= 36;
    }
    digits.iter().rev().collect()
}

fn base36_digit(d: u32) -> char {
    char::from_digit(d, 36).unwrap_or('0')
}
