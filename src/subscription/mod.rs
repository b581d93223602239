//! Subscription hub: multiplexes auction events to bidirectional client
//! connections, heartbeats them, and disconnects slow subscribers instead
//! of letting them lag the broadcast.
//!
//! Grounded on `main.rs`'s `handle_socket` (one task per socket,
//! `tokio::select!` between outbound events and inbound frames) but
//! generalized from a single shared `broadcast::Receiver` to a bounded
//! per-subscriber `mpsc` queue, so a slow subscriber is detected and
//! dropped rather than silently lagging everyone else.

mod hub;
mod ws;

pub use hub::{Envelope, SubscriptionHub, QUEUE_CAPACITY};
pub use ws::websocket_handler;
