use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Pending,
    Active,
    Paused,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: i64,
    pub seller: String,
    pub item_type: String,
    pub quantity: i64,
    pub initial_price: i64,
    pub min_price: i64,
    pub current_price: i64,
    pub price_decrement: i64,
    pub decrement_interval_ms: i64,
    pub status: AuctionStatus,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub paused_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub winner: Option<String>,
    pub settlement_price: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuctionParams {
    pub seller: String,
    pub item_type: String,
    pub quantity: i64,
    pub initial_price: i64,
    pub min_price: i64,
    pub price_decrement: i64,
    #[serde(rename = "decrementInterval")]
    pub decrement_interval_ms: i64,
}

/// Tagged events the store and tick engine hand to the subscription hub.
/// Carries a server-emission timestamp drawn from the trusted clock.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    AuctionCreated { auction_id: i64, send_time: i64 },
    AuctionStarted { auction_id: i64, send_time: i64 },
    AuctionPaused { auction_id: i64, send_time: i64 },
    AuctionCancelled { auction_id: i64, send_time: i64 },
    PriceUpdated {
        auction_id: i64,
        old_price: i64,
        new_price: i64,
        time_remaining_ms: i64,
        send_time: i64,
    },
    AuctionCompleted {
        auction_id: i64,
        winner: String,
        price: i64,
        send_time: i64,
    },
}

impl Event {
    pub fn auction_id(&self) -> i64 {
        match self {
            Event::AuctionCreated { auction_id, .. }
            | Event::AuctionStarted { auction_id, .. }
            | Event::AuctionPaused { auction_id, .. }
            | Event::AuctionCancelled { auction_id, .. }
            | Event::PriceUpdated { auction_id, .. }
            | Event::AuctionCompleted { auction_id, .. } => *auction_id,
        }
    }
}
