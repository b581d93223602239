//! Cash ledger and backpack inventory: supporting collaborators backing
//! auction settlement, not part of the Core's engineering substance.

mod sqlite;

pub use sqlite::SqliteLedger;

use async_trait::async_trait;

use crate::error::LedgerError;

/// Cash balances are integer minor units (e.g. cents) to avoid float
/// drift across repeated debit/credit operations.
#[async_trait]
pub trait CashLedger: Send + Sync {
    async fn balance(&self, owner: &str) -> Result<i64, LedgerError>;

    /// Debits `amount` from `owner` only if their balance is sufficient,
    /// returning the new balance. Atomic with respect to concurrent
    /// settlements touching the same owner.
    async fn conditional_debit(&self, owner: &str, amount: i64) -> Result<i64, LedgerError>;

    /// Credits `amount` to `owner`, creating the account at zero first if
    /// it doesn't yet exist. Used both for deposits and for settlement
    /// compensation.
    async fn credit(&self, owner: &str, amount: i64) -> Result<i64, LedgerError>;

    /// Credits `quantity` of `item_type` to `owner`'s backpack.
    async fn credit_item(&self, owner: &str, item_type: &str, quantity: i64) -> Result<(), LedgerError>;

    async fn backpack(&self, owner: &str) -> Result<Vec<(String, i64)>, LedgerError>;
}
