use std::sync::Arc;

use crate::auction::AuctionStore;
use crate::ledger::CashLedger;
use crate::subscription::SubscriptionHub;
use crate::time_service::TimeService;

/// Shared process state, handed to every handler via axum's `State`
/// extractor. Grounded on `main.rs`'s `AppState`: a flat bundle of `Arc`
/// handles to the process's long-lived collaborators.
#[derive(Clone)]
pub struct AppState {
    pub time: Arc<TimeService>,
    pub auctions: Arc<AuctionStore>,
    pub ledger: Arc<dyn CashLedger>,
    pub hub: Arc<SubscriptionHub>,
}
