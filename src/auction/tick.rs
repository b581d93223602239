//! Per-auction price decrement coordinator.
//!
//! Grounded on `route_quality/prober.rs`'s per-endpoint task shape,
//! generalized from "one task per configured endpoint" to "one task per
//! currently active auction", spawned and aborted dynamically as
//! auctions start, pause, cancel, and complete.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::model::AuctionStatus;
use super::store::{AuctionStore, TickOutcome};

/// Transitions the store notifies the coordinator about, so it can
/// spawn or abort per-auction tickers.
#[derive(Debug, Clone)]
pub enum TickCommand {
    Start { id: i64, decrement_interval_ms: i64 },
    Pause { id: i64 },
    Cancel { id: i64 },
    Complete { id: i64 },
}

pub struct TickEngine {
    store: Arc<AuctionStore>,
    rx: mpsc::UnboundedReceiver<TickCommand>,
    tickers: HashMap<i64, JoinHandle<()>>,
}

impl TickEngine {
    pub fn new(store: Arc<AuctionStore>, rx: mpsc::UnboundedReceiver<TickCommand>) -> Self {
        Self {
            store,
            rx,
            tickers: HashMap::new(),
        }
    }

    /// Restores timers for every auction that's already `active` at
    /// process start, resuming from each one's last-known price. No
    /// backfill of missed ticks is performed.
    pub async fn restore_active(&mut self) {
        let auctions = self.store.list().await;
        for auction in auctions {
            if auction.status == AuctionStatus::Active {
                self.spawn_ticker(auction.id, auction.decrement_interval_ms);
            }
        }
    }

    pub async fn run(mut self) {
        self.restore_active().await;
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                TickCommand::Start { id, decrement_interval_ms } => {
                    self.spawn_ticker(id, decrement_interval_ms);
                }
                TickCommand::Pause { id }
                | TickCommand::Cancel { id }
                | TickCommand::Complete { id } => {
                    self.abort_ticker(id);
                }
            }
        }
    }

    fn spawn_ticker(&mut self, id: i64, decrement_interval_ms: i64) {
        self.abort_ticker(id);
        let store = self.store.clone();
        let interval_ms = decrement_interval_ms.max(1) as u64;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.tick_price(id).await {
                    Ok(TickOutcome::Active(Some(event))) => store.publish(event).await,
                    Ok(TickOutcome::Active(None)) => {}
                    Ok(TickOutcome::Inactive) => break,
                    Err(err) => {
                        debug!(auction_id = id, error = %err, "ticker stopping");
                        break;
                    }
                }
            }
        });
        self.tickers.insert(id, handle);
    }

    fn abort_ticker(&mut self, id: i64) {
        if let Some(handle) = self.tickers.remove(&id) {
            handle.abort();
        } else {
            debug!(auction_id = id, "no active ticker to abort");
        }
    }
}
