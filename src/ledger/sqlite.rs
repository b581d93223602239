//! SQLite-backed cash ledger and backpack inventory.
//!
//! Grounded on `vault/vault_db.rs`'s `VaultDb`: a single connection behind
//! a `tokio::Mutex`, explicit transactions around read-check-write
//! sequences, `INSERT ... ON CONFLICT DO UPDATE` for upsert-style writes.

use async_trait::async_trait;
use rusqlite::params;

use crate::db::SharedConnection;
use crate::error::LedgerError;
use crate::time_service::clock::wall_now_ns;

use super::CashLedger;

#[derive(Clone)]
pub struct SqliteLedger {
    conn: SharedConnection,
}

impl SqliteLedger {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CashLedger for SqliteLedger {
    async fn balance(&self, owner: &str) -> Result<i64, LedgerError> {
        let conn = self.conn.lock().await;
        let balance = conn
            .query_row(
                "SELECT balance FROM balance WHERE owner = ?1",
                params![owner],
                |row| row.get::<_, i64>(0),
            )
            .unwrap_or(0);
        Ok(balance)
    }

    async fn conditional_debit(&self, owner: &str, amount: i64) -> Result<i64, LedgerError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let current: i64 = tx
            .query_row(
                "SELECT balance FROM balance WHERE owner = ?1",
                params![owner],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current < amount {
            return Err(LedgerError::InsufficientBalance(owner.to_string()));
        }

        let new_balance = current - amount;
        let now = wall_now_ns();
        tx.execute(
            "INSERT INTO balance (owner, balance, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(owner) DO UPDATE SET balance = ?2, updated_at = ?3",
            params![owner, new_balance, now],
        )?;
        tx.execute(
            "INSERT INTO transactions (owner, kind, amount, created_at) VALUES (?1, 'debit', ?2, ?3)",
            params![owner, amount, now],
        )?;
        tx.commit()?;
        Ok(new_balance)
    }

    async fn credit(&self, owner: &str, amount: i64) -> Result<i64, LedgerError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let current: i64 = tx
            .query_row(
                "SELECT balance FROM balance WHERE owner = ?1",
                params![owner],
                |row| row.get(0),
            )
            .unwrap_or(0);
        let new_balance = current + amount;
        let now = wall_now_ns();
        tx.execute(
            "INSERT INTO balance (owner, balance, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(owner) DO UPDATE SET balance = ?2, updated_at = ?3",
            params![owner, new_balance, now],
        )?;
        tx.execute(
            "INSERT INTO transactions (owner, kind, amount, created_at) VALUES (?1, 'credit', ?2, ?3)",
            params![owner, amount, now],
        )?;
        tx.commit()?;
        Ok(new_balance)
    }

    async fn credit_item(&self, owner: &str, item_type: &str, quantity: i64) -> Result<(), LedgerError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO backpack (owner, item_type, quantity) VALUES (?1, ?2, ?3)
             ON CONFLICT(owner, item_type) DO UPDATE SET quantity = quantity + ?3",
            params![owner, item_type, quantity],
        )?;
        Ok(())
    }

    async fn backpack(&self, owner: &str) -> Result<Vec<(String, i64)>, LedgerError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT item_type, quantity FROM backpack WHERE owner = ?1",
        )?;
        let rows = stmt
            .query_map(params![owner], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_ledger() -> SqliteLedger {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        crate::db::create_schema(&conn).unwrap();
        SqliteLedger::new(std::sync::Arc::new(tokio::sync::Mutex::new(conn)))
    }

    #[tokio::test]
    async fn credit_then_debit_roundtrips() {
        let ledger = new_ledger();
        ledger.credit("alice", 1_000).await.unwrap();
        assert_eq!(ledger.balance("alice").await.unwrap(), 1_000);
        let remaining = ledger.conditional_debit("alice", 400).await.unwrap();
        assert_eq!(remaining, 600);
    }

    #[tokio::test]
    async fn debit_fails_on_insufficient_balance() {
        let ledger = new_ledger();
        ledger.credit("bob", 100).await.unwrap();
        let result = ledger.conditional_debit("bob", 200).await;
        assert!(matches!(result, Err(LedgerError::InsufficientBalance(_))));
        assert_eq!(ledger.balance("bob").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn credit_item_accumulates_quantity() {
        let ledger = new_ledger();
        ledger.credit_item("carol", "widget", 2).await.unwrap();
        ledger.credit_item("carol", "widget", 3).await.unwrap();
        let backpack = ledger.backpack("carol").await.unwrap();
        assert_eq!(backpack, vec![("widget".to_string(), 5)]);
    }
}
