//! Shared SQLite connection, schema, and the startup migration check.
//!
//! Grounded on `vault/vault_db.rs`'s `VaultDb`: a single `rusqlite::Connection`
//! behind an async mutex, WAL journal mode, `CREATE TABLE IF NOT EXISTS`
//! at open time.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::warn;

pub type SharedConnection = Arc<Mutex<Connection>>;

const TRANSACTIONS_COLUMNS: &[&str] = &["id", "owner", "kind", "amount", "created_at"];
const BALANCE_COLUMNS: &[&str] = &["owner", "balance", "updated_at"];
const MARKET_ITEMS_COLUMNS: &[&str] = &["item_type", "listing_price"];
const BACKPACK_COLUMNS: &[&str] = &["owner", "item_type", "quantity"];
const AUCTIONS_COLUMNS: &[&str] = &[
    "id",
    "seller",
    "item_type",
    "quantity",
    "initial_price",
    "min_price",
    "current_price",
    "price_decrement",
    "decrement_interval_ms",
    "status",
    "created_at",
    "started_at",
    "paused_at",
    "ended_at",
    "winner",
    "settlement_price",
];

/// Opens (creating if necessary) the SQLite database at `path`, verifying
/// its schema matches what this version of the crate expects. A mismatch
/// renames the existing file aside with a timestamped backup suffix and
/// recreates it from scratch, rather than attempting an in-place
/// migration.
pub fn open(path: &Path) -> Result<SharedConnection> {
    if path.exists() && !schema_matches(path)? {
        let backup = backup_path(path);
        warn!(
            from = %path.display(),
            to = %backup.display(),
            "database schema mismatch; renaming aside and recreating"
        );
        std::fs::rename(path, &backup)
            .with_context(|| format!("backing up stale database at {}", path.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("opening database at {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.pragma_update(None, "synchronous", "NORMAL").ok();
    create_schema(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

fn backup_path(path: &Path) -> std::path::PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "db".to_string());
    name.push_str(&format!("_backup_{}", stamp));
    path.with_file_name(name)
}

/// Compares each expected table's columns against what's actually on disk.
/// A table that's simply missing is not a mismatch (it will be created by
/// `create_schema`); a table whose column set differs is.
fn schema_matches(path: &Path) -> Result<bool> {
    let conn = Connection::open(path)
        .with_context(|| format!("opening database at {} for schema check", path.display()))?;

    let checks: &[(&str, &[&str])] = &[
        ("transactions", TRANSACTIONS_COLUMNS),
        ("balance", BALANCE_COLUMNS),
        ("market_items", MARKET_ITEMS_COLUMNS),
        ("backpack", BACKPACK_COLUMNS),
        ("auctions", AUCTIONS_COLUMNS),
    ];

    for (table, expected) in checks {
        if let Some(actual) = table_columns(&conn, table)? {
            let expected_set: BTreeSet<&str> = expected.iter().copied().collect();
            let actual_set: BTreeSet<&str> = actual.iter().map(|s| s.as_str()).collect();
            if expected_set != actual_set {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Option<Vec<String>>> {
    let exists: bool = conn
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count > 0)
        .context("checking table existence")?;
    if !exists {
        return Ok(None);
    }

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(columns))
}

pub(crate) fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            kind TEXT NOT NULL,
            amount INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS balance (
            owner TEXT PRIMARY KEY,
            balance INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS market_items (
            item_type TEXT PRIMARY KEY,
            listing_price INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS backpack (
            owner TEXT NOT NULL,
            item_type TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            PRIMARY KEY (owner, item_type)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS auctions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            seller TEXT NOT NULL,
            item_type TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            initial_price INTEGER NOT NULL,
            min_price INTEGER NOT NULL,
            current_price INTEGER NOT NULL,
            price_decrement INTEGER NOT NULL,
            decrement_interval_ms INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            started_at INTEGER,
            paused_at INTEGER,
            ended_at INTEGER,
            winner TEXT,
            settlement_price INTEGER
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_auctions_seller ON auctions(seller)",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let conn = open(&path).unwrap();
        let conn = conn.blocking_lock();
        for table in ["transactions", "balance", "market_items", "backpack", "auctions"] {
            let columns = table_columns(&conn, table).unwrap();
            assert!(columns.is_some(), "table {table} should exist");
        }
    }

    #[test]
    fn mismatched_schema_triggers_backup_and_recreate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("CREATE TABLE auctions (id INTEGER PRIMARY KEY)", [])
                .unwrap();
        }
        let _ = open(&path).unwrap();
        let backups = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("_backup_"))
            .count();
        assert!(backups > 0, "expected a backup file to be created");
    }
}
