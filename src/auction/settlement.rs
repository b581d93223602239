//! Bid settlement: the cross-resource atomic operation joining an auction
//! row, the cash ledger, and the backpack inventory.
//!
//! Grounded on `vault/paper_ledger.rs`'s `apply_buy`/`apply_sell` pair
//! (validate, then mutate balance and position together) generalized to
//! span two collaborators (ledger + auction store) instead of one, with
//! an explicit compensation step since the two can't share a transaction.

use crate::error::{AuctionError, BidRejected, LedgerError};
use crate::ledger::CashLedger;

use super::model::{Auction, AuctionStatus};

/// The result of a settlement that updated the ledger and is ready for
/// the caller to write the auction's terminal row state.
pub struct BidOutcome {
    pub winner: String,
    pub price: i64,
    pub total: i64,
    pub quantity: i64,
}

/// Validates a bid against the auction's current state and, if valid,
/// performs the conditional cash debit. Does not touch the auction row or
/// credit inventory — those happen in the store, which owns the per-id
/// latch for the remainder of the operation.
pub async fn debit_for_bid(
    auction: &Auction,
    bidder: &str,
    bid_amount: i64,
    ledger: &dyn CashLedger,
) -> Result<BidOutcome, AuctionError> {
    if auction.status != AuctionStatus::Active {
        return Err(AuctionError::BidRejected(BidRejected::WrongStatus));
    }
    if bid_amount < auction.current_price {
        return Err(AuctionError::BidRejected(BidRejected::BelowCurrentPrice));
    }

    let total = auction
        .current_price
        .checked_mul(auction.quantity)
        .ok_or_else(|| AuctionError::InvalidAuctionParams("price * quantity overflow".into()))?;

    match ledger.conditional_debit(bidder, total).await {
        Ok(_) => Ok(BidOutcome {
            winner: bidder.to_string(),
            price: auction.current_price,
            total,
            quantity: auction.quantity,
        }),
        Err(LedgerError::InsufficientBalance(_)) => {
            Err(AuctionError::BidRejected(BidRejected::InsufficientFunds))
        }
        Err(other) => Err(AuctionError::Ledger(other)),
    }
}

/// Reverses a debit when the auction row couldn't be transitioned to
/// terminal state afterward (a concurrent cancel slipped past the latch).
/// Logs rather than propagates a secondary failure here; the original
/// `Conflict` rejection is what reaches the caller.
pub async fn compensate(ledger: &dyn CashLedger, bidder: &str, total: i64) {
    if let Err(err) = ledger.credit(bidder, total).await {
        tracing::error!(bidder, total, error = %err, "failed to compensate bidder after settlement conflict");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::model::AuctionStatus;
    use crate::ledger::SqliteLedger;

    fn sample_auction(status: AuctionStatus, current_price: i64) -> Auction {
        Auction {
            id: 1,
            seller: "seller".into(),
            item_type: "widget".into(),
            quantity: 2,
            initial_price: 1000,
            min_price: 100,
            current_price,
            price_decrement: 50,
            decrement_interval_ms: 1000,
            status,
            created_at: 0,
            started_at: Some(0),
            paused_at: None,
            ended_at: None,
            winner: None,
            settlement_price: None,
        }
    }

    fn ledger_with(balance: i64) -> (SqliteLedger, tokio::runtime::Runtime) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        crate::db::create_schema(&conn).unwrap();
        let ledger = SqliteLedger::new(std::sync::Arc::new(tokio::sync::Mutex::new(conn)));
        rt.block_on(ledger.credit("buyer", balance)).unwrap();
        (ledger, rt)
    }

    #[test]
    fn rejects_bid_below_current_price() {
        let (ledger, rt) = ledger_with(10_000);
        let auction = sample_auction(AuctionStatus::Active, 500);
        let result = rt.block_on(debit_for_bid(&auction, "buyer", 100, &ledger));
        assert!(matches!(
            result,
            Err(AuctionError::BidRejected(BidRejected::BelowCurrentPrice))
        ));
    }

    #[test]
    fn rejects_bid_on_inactive_auction() {
        let (ledger, rt) = ledger_with(10_000);
        let auction = sample_auction(AuctionStatus::Paused, 500);
        let result = rt.block_on(debit_for_bid(&auction, "buyer", 500, &ledger));
        assert!(matches!(
            result,
            Err(AuctionError::BidRejected(BidRejected::WrongStatus))
        ));
    }

    #[test]
    fn successful_bid_debits_exact_total() {
        let (ledger, rt) = ledger_with(10_000);
        let auction = sample_auction(AuctionStatus::Active, 500);
        let outcome = rt.block_on(debit_for_bid(&auction, "buyer", 500, &ledger)).unwrap();
        assert_eq!(outcome.total, 1_000);
        let balance = rt.block_on(ledger.balance("buyer")).unwrap();
        assert_eq!(balance, 9_000);
    }
}
