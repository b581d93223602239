pub mod model;
pub mod settlement;
pub mod store;
pub mod tick;

pub use model::{Auction, AuctionStatus, CreateAuctionParams, Event};
pub use store::{AuctionStore, TickOutcome};
pub use tick::{TickCommand, TickEngine};
