//! SQLite-backed result store.
//!
//! One row per symbol; the whole analysis (aggregate report plus per-window
//! parameter vectors) is serialized as a single JSON document, so a replace
//! is atomic and readers never see the aggregate and details disagree.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::ResultStore;
use crate::engine::types::CachedAnalysis;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS lppl_analysis (
    symbol        TEXT PRIMARY KEY,
    analysis_date TEXT NOT NULL,
    payload       TEXT NOT NULL,
    created_at    TEXT NOT NULL
)";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store dir: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store: {}", path.display()))?;
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Build from environment: `DATA_ROOT` (default `~/.lppl/cache`) holds
    /// `analysis.sqlite3`.
    pub fn from_env() -> Result<Self> {
        let root = match std::env::var("DATA_ROOT") {
            Ok(val) => PathBuf::from(val),
            Err(_) => default_cache_dir(),
        };
        Self::open(&root.join("analysis.sqlite3"))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // Every statement is a whole-row read or replace, so the connection
        // stays consistent even after a poisoning panic.
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ResultStore for SqliteStore {
    fn get_latest(&self, symbol: &str) -> Result<Option<CachedAnalysis>> {
        let conn = self.lock();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM lppl_analysis WHERE symbol = ?1",
                params![symbol],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read cached analysis for {symbol}"))?;
        payload
            .map(|text| {
                serde_json::from_str(&text)
                    .with_context(|| format!("Corrupt cached analysis for {symbol}"))
            })
            .transpose()
    }

    fn put(&self, analysis: &CachedAnalysis) -> Result<()> {
        let payload = serde_json::to_string(analysis)
            .with_context(|| format!("Failed to serialize analysis for {}", analysis.symbol))?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO lppl_analysis (symbol, analysis_date, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(symbol) DO UPDATE SET
                 analysis_date = excluded.analysis_date,
                 payload = excluded.payload,
                 created_at = excluded.created_at
             WHERE excluded.analysis_date >= lppl_analysis.analysis_date",
            params![
                analysis.symbol,
                analysis.analysis_date.to_string(),
                payload,
                analysis.created_at.to_string(),
            ],
        )
        .with_context(|| format!("Failed to write analysis for {}", analysis.symbol))?;
        Ok(())
    }
}

/// Default store directory: `~/.lppl/cache`
fn default_cache_dir() -> PathBuf {
    let home = std::env::var("HOME").map_or_else(|_| PathBuf::from("/tmp"), PathBuf::from);
    home.join(".lppl").join("cache")
}
