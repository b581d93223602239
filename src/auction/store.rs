//! The auction state store: transactional transitions over SQLite rows,
//! serialized per auction id.
//!
//! Grounded on `vault/vault_db.rs`'s transactional update style
//! (`UPDATE ... WHERE` guards plus `rows_affected` checks) combined with
//! a per-id `tokio::sync::Mutex` map, in the same "lock keyed by
//! resource id, not a single global lock" shape the reference backend
//! uses for per-market state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use rusqlite::{params, OptionalExtension, Row};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::db::SharedConnection;
use crate::error::AuctionError;
use crate::ledger::CashLedger;
use crate::subscription::SubscriptionHub;
use crate::time_service::TimeService;

use super::model::{Auction, AuctionStatus, CreateAuctionParams, Event};
use super::settlement;
use super::tick::TickCommand;

pub enum TickOutcome {
    /// The auction is still active; carries a price-change event if the
    /// price actually moved this tick.
    Active(Option<Event>),
    /// The auction is no longer active; the caller should stop ticking.
    Inactive,
}

pub struct AuctionStore {
    conn: SharedConnection,
    locks: SyncMutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
    ledger: Arc<dyn CashLedger>,
    hub: Arc<SubscriptionHub>,
    tick_tx: mpsc::UnboundedSender<TickCommand>,
    time: Arc<TimeService>,
}

impl AuctionStore {
    pub fn new(
        conn: SharedConnection,
        ledger: Arc<dyn CashLedger>,
        hub: Arc<SubscriptionHub>,
        tick_tx: mpsc::UnboundedSender<TickCommand>,
        time: Arc<TimeService>,
    ) -> Self {
        Self {
            conn,
            locks: SyncMutex::new(HashMap::new()),
            ledger,
            hub,
            tick_tx,
            time,
        }
    }

    fn lock_for(&self, id: i64) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn publish(&self, event: Event) {
        self.hub.broadcast(event).await;
    }

    pub async fn create(&self, params: CreateAuctionParams) -> Result<(Auction, Event), AuctionError> {
        if params.min_price < 0 {
            return Err(AuctionError::InvalidAuctionParams("minPrice must be >= 0".into()));
        }
        if params.initial_price < params.min_price {
            return Err(AuctionError::InvalidAuctionParams(
                "initialPrice must be >= minPrice".into(),
            ));
        }
        if params.quantity < 1 {
            return Err(AuctionError::InvalidAuctionParams("quantity must be >= 1".into()));
        }
        if params.price_decrement <= 0 {
            return Err(AuctionError::InvalidAuctionParams("priceDecrement must be > 0".into()));
        }
        if params.decrement_interval_ms <= 0 {
            return Err(AuctionError::InvalidAuctionParams(
                "decrementInterval must be > 0".into(),
            ));
        }

        let now = self.time.trusted_now_ns();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO auctions (
                seller, item_type, quantity, initial_price, min_price, current_price,
                price_decrement, decrement_interval_ms, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?4, ?6, ?7, 'pending', ?8)",
            params![
                params.seller,
                params.item_type,
                params.quantity,
                params.initial_price,
                params.min_price,
                params.price_decrement,
                params.decrement_interval_ms,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        let auction = fetch_row(&conn, id)?.ok_or(AuctionError::NotFound(id))?;
        drop(conn);

        let event = Event::AuctionCreated { auction_id: id, send_time: now };
        Ok((auction, event))
    }

    pub async fn start(&self, id: i64) -> Result<(Auction, Event), AuctionError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let now = self.time.trusted_now_ns();
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            "UPDATE auctions SET status = 'active', started_at = ?2
             WHERE id = ?1 AND status IN ('pending', 'paused')",
            params![id, now],
        )?;
        if rows == 0 {
            return Err(AuctionError::InvalidTransition(id));
        }
        let auction = fetch_row(&conn, id)?.ok_or(AuctionError::NotFound(id))?;
        drop(conn);

        let _ = self.tick_tx.send(TickCommand::Start {
            id,
            decrement_interval_ms: auction.decrement_interval_ms,
        });
        let event = Event::AuctionStarted { auction_id: id, send_time: now };
        Ok((auction, event))
    }

    /// Alias the HTTP surface exposes for restarting a paused auction; the
    /// same transition as `start`.
    pub async fn reactivate(&self, id: i64) -> Result<(Auction, Event), AuctionError> {
        self.start(id).await
    }

    pub async fn pause(&self, id: i64) -> Result<(Auction, Event), AuctionError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let now = self.time.trusted_now_ns();
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            "UPDATE auctions SET status = 'paused', paused_at = ?2
             WHERE id = ?1 AND status = 'active'",
            params![id, now],
        )?;
        if rows == 0 {
            return Err(AuctionError::InvalidTransition(id));
        }
        let auction = fetch_row(&conn, id)?.ok_or(AuctionError::NotFound(id))?;
        drop(conn);

        let _ = self.tick_tx.send(TickCommand::Pause { id });
        let event = Event::AuctionPaused { auction_id: id, send_time: now };
        Ok((auction, event))
    }

    pub async fn cancel(&self, id: i64) -> Result<(Auction, Event), AuctionError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let now = self.time.trusted_now_ns();
        let conn = self.conn.lock().await;
        let rows = conn.execute(
            "UPDATE auctions SET status = 'cancelled', ended_at = ?2
             WHERE id = ?1 AND status IN ('pending', 'active', 'paused')",
            params![id, now],
        )?;
        if rows == 0 {
            return Err(AuctionError::InvalidTransition(id));
        }
        let auction = fetch_row(&conn, id)?.ok_or(AuctionError::NotFound(id))?;
        drop(conn);

        let _ = self.tick_tx.send(TickCommand::Cancel { id });
        let event = Event::AuctionCancelled { auction_id: id, send_time: now };
        Ok((auction, event))
    }

    pub async fn place_bid(
        &self,
        id: i64,
        bidder: &str,
        bid_amount: i64,
    ) -> Result<(Auction, Event), AuctionError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let auction = {
            let conn = self.conn.lock().await;
            fetch_row(&conn, id)?.ok_or(AuctionError::NotFound(id))?
        };

        let outcome = settlement::debit_for_bid(&auction, bidder, bid_amount, self.ledger.as_ref()).await?;

        let now = self.time.trusted_now_ns();
        let rows = {
            let conn = self.conn.lock().await;
            conn.execute(
                "UPDATE auctions SET status = 'completed', winner = ?2, settlement_price = ?3, ended_at = ?4
                 WHERE id = ?1 AND status = 'active'",
                params![id, outcome.winner, outcome.price, now],
            )?
        };

        if rows == 0 {
            settlement::compensate(self.ledger.as_ref(), bidder, outcome.total).await;
            return Err(AuctionError::BidRejected(crate::error::BidRejected::Conflict));
        }

        if let Err(err) = self
            .ledger
            .credit_item(bidder, &auction.item_type, outcome.quantity)
            .await
        {
            tracing::error!(auction_id = id, error = %err, "failed to credit inventory after settlement");
        }

        let updated = {
            let conn = self.conn.lock().await;
            fetch_row(&conn, id)?.ok_or(AuctionError::NotFound(id))?
        };

        let _ = self.tick_tx.send(TickCommand::Complete { id });
        let event = Event::AuctionCompleted {
            auction_id: id,
            winner: outcome.winner,
            price: outcome.price,
            send_time: now,
        };
        Ok((updated, event))
    }

    pub async fn tick_price(&self, id: i64) -> Result<TickOutcome, AuctionError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let conn = self.conn.lock().await;
        let auction = fetch_row(&conn, id)?.ok_or(AuctionError::NotFound(id))?;
        if auction.status != AuctionStatus::Active {
            return Ok(TickOutcome::Inactive);
        }

        let old_price = auction.current_price;
        let new_price = (old_price - auction.price_decrement).max(auction.min_price);
        if new_price == old_price {
            return Ok(TickOutcome::Active(None));
        }

        conn.execute(
            "UPDATE auctions SET current_price = ?2 WHERE id = ?1 AND status = 'active'",
            params![id, new_price],
        )?;
        drop(conn);

        let time_remaining_ms = if auction.price_decrement > 0 {
            let steps = (new_price - auction.min_price + auction.price_decrement - 1)
                / auction.price_decrement;
            steps.max(0) * auction.decrement_interval_ms
        } else {
            0
        };

        let event = Event::PriceUpdated {
            auction_id: id,
            old_price,
            new_price,
            time_remaining_ms,
            send_time: self.time.trusted_now_ns(),
        };
        Ok(TickOutcome::Active(Some(event)))
    }

    pub async fn get(&self, id: i64) -> Result<Auction, AuctionError> {
        let conn = self.conn.lock().await;
        fetch_row(&conn, id)?.ok_or(AuctionError::NotFound(id))
    }

    pub async fn list(&self) -> Vec<Auction> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM auctions ORDER BY id")
            .expect("valid query");
        stmt.query_map([], |row| row_to_auction(row))
            .expect("valid mapping")
            .filter_map(|r| r.ok())
            .collect()
    }

    pub async fn list_by_seller(&self, seller: &str) -> Vec<Auction> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM auctions WHERE seller = ?1 ORDER BY id")
            .expect("valid query");
        stmt.query_map(params![seller], |row| row_to_auction(row))
            .expect("valid mapping")
            .filter_map(|r| r.ok())
            .collect()
    }
}

fn fetch_row(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Auction>> {
    conn.query_row("SELECT * FROM auctions WHERE id = ?1", params![id], row_to_auction)
        .optional()
}

fn row_to_auction(row: &Row<'_>) -> rusqlite::Result<Auction> {
    let status: String = row.get("status")?;
    Ok(Auction {
        id: row.get("id")?,
        seller: row.get("seller")?,
        item_type: row.get("item_type")?,
        quantity: row.get("quantity")?,
        initial_price: row.get("initial_price")?,
        min_price: row.get("min_price")?,
        current_price: row.get("current_price")?,
        price_decrement: row.get("price_decrement")?,
        decrement_interval_ms: row.get("decrement_interval_ms")?,
        status: parse_status(&status),
        created_at: row.get("created_at")?,
        started_at: row.get("started_at")?,
        paused_at: row.get("paused_at")?,
        ended_at: row.get("ended_at")?,
        winner: row.get("winner")?,
        settlement_price: row.get("settlement_price")?,
    })
}

fn parse_status(value: &str) -> AuctionStatus {
    match value {
        "pending" => AuctionStatus::Pending,
        "active" => AuctionStatus::Active,
        "paused" => AuctionStatus::Paused,
        "completed" => AuctionStatus::Completed,
        "cancelled" => AuctionStatus::Cancelled,
        other => panic!("unrecognized auction status in storage: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SqliteLedger;
    use crate::time_service::TimeService;

    fn new_store() -> (AuctionStore, mpsc::UnboundedReceiver<TickCommand>) {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        crate::db::create_schema(&conn).unwrap();
        let conn = Arc::new(AsyncMutex::new(conn));
        let ledger: Arc<dyn CashLedger> = Arc::new(SqliteLedger::new(conn.clone()));
        let time = TimeService::for_test();
        let hub = Arc::new(SubscriptionHub::new(time.clone()));
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        (AuctionStore::new(conn, ledger, hub, tick_tx, time), tick_rx)
    }

    fn sample_params() -> CreateAuctionParams {
        CreateAuctionParams {
            seller: "seller".into(),
            item_type: "widget".into(),
            quantity: 1,
            initial_price: 1000,
            min_price: 100,
            price_decrement: 300,
            decrement_interval_ms: 1000,
        }
    }

    #[tokio::test]
    async fn create_rejects_initial_below_min() {
        let (store, _rx) = new_store();
        let mut params = sample_params();
        params.initial_price = 50;
        let result = store.create(params).await;
        assert!(matches!(result, Err(AuctionError::InvalidAuctionParams(_))));
    }

    #[tokio::test]
    async fn create_start_tick_price_is_monotonically_nonincreasing() {
        let (store, _rx) = new_store();
        let (auction, _) = store.create(sample_params()).await.unwrap();
        store.start(auction.id).await.unwrap();

        let mut last_price = auction.initial_price;
        for _ in 0..5 {
            if let TickOutcome::Active(Some(Event::PriceUpdated { new_price, .. })) =
                store.tick_price(auction.id).await.unwrap()
            {
                assert!(new_price <= last_price);
                last_price = new_price;
            }
        }
        assert!(last_price >= auction.min_price);
    }

    #[tokio::test]
    async fn floor_reached_stays_active() {
        let (store, _rx) = new_store();
        let mut params = sample_params();
        params.initial_price = 400;
        params.min_price = 100;
        params.price_decrement = 300;
        let (auction, _) = store.create(params).await.unwrap();
        store.start(auction.id).await.unwrap();

        // First tick lands exactly on the floor.
        let outcome = store.tick_price(auction.id).await.unwrap();
        match outcome {
            TickOutcome::Active(Some(Event::PriceUpdated { new_price, .. })) => {
                assert_eq!(new_price, 100);
            }
            _ => panic!("expected a price update reaching the floor"),
        }

        // The auction stays active at the floor rather than completing.
        let fetched = store.get(auction.id).await.unwrap();
        assert_eq!(fetched.status, AuctionStatus::Active);
        assert_eq!(fetched.current_price, 100);

        // Further ticks are no-ops, not terminations.
        let outcome = store.tick_price(auction.id).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Active(None)));
        let fetched = store.get(auction.id).await.unwrap();
        assert_eq!(fetched.status, AuctionStatus::Active);
    }

    #[tokio::test]
    async fn successful_bid_debits_and_credits_exactly() {
        let (store, _rx) = new_store();
        let (auction, _) = store.create(sample_params()).await.unwrap();
        store.start(auction.id).await.unwrap();
        store.ledger.credit("buyer", 10_000).await.unwrap();

        let (updated, event) = store.place_bid(auction.id, "buyer", 1000).await.unwrap();
        assert_eq!(updated.status, AuctionStatus::Completed);
        assert_eq!(updated.winner.as_deref(), Some("buyer"));
        assert!(matches!(event, Event::AuctionCompleted { .. }));

        let balance = store.ledger.balance("buyer").await.unwrap();
        assert_eq!(balance, 9_000);
        let backpack = store.ledger.backpack("buyer").await.unwrap();
        assert_eq!(backpack, vec![("widget".to_string(), 1)]);
    }

    #[tokio::test]
    async fn bid_on_paused_auction_is_rejected_without_mutation() {
        let (store, _rx) = new_store();
        let (auction, _) = store.create(sample_params()).await.unwrap();
        store.ledger.credit("buyer", 10_000).await.unwrap();

        let result = store.place_bid(auction.id, "buyer", 1000).await;
        assert!(matches!(
            result,
            Err(AuctionError::BidRejected(crate::error::BidRejected::WrongStatus))
        ));
        assert_eq!(store.ledger.balance("buyer").await.unwrap(), 10_000);
    }

    #[tokio::test]
    async fn insufficient_funds_bid_does_not_mutate_auction() {
        let (store, _rx) = new_store();
        let (auction, _) = store.create(sample_params()).await.unwrap();
        store.start(auction.id).await.unwrap();
        store.ledger.credit("pauper", 10).await.unwrap();

        let result = store.place_bid(auction.id, "pauper", 1000).await;
        assert!(matches!(
            result,
            Err(AuctionError::BidRejected(crate::error::BidRejected::InsufficientFunds))
        ));
        let fetched = store.get(auction.id).await.unwrap();
        assert_eq!(fetched.status, AuctionStatus::Active);
    }

    #[tokio::test]
    async fn cancel_is_a_sink_state() {
        let (store, _rx) = new_store();
        let (auction, _) = store.create(sample_params()).await.unwrap();
        store.cancel(auction.id).await.unwrap();
        let result = store.start(auction.id).await;
        assert!(matches!(result, Err(AuctionError::InvalidTransition(_))));
    }
}
