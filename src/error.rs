//! Domain error types for the time service, auction engine, and ledger.
//!
//! Process-wiring failures (startup, background tasks) propagate as
//! `anyhow::Error`; these enums are for the seams the spec calls out
//! explicitly, where callers need to match on a reason rather than
//! parse a message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors raised while synchronizing the trusted clock.
#[derive(Error, Debug, Clone, Copy)]
pub enum TimeServiceError {
    /// A full sync pass yielded zero survivors after filtering.
    #[error("no valid time source survived filtering")]
    NoValidSource,
}

/// Reasons a bid can be rejected, returned synchronously to the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidRejected {
    #[error("buyer has insufficient funds")]
    InsufficientFunds,
    #[error("auction is not active")]
    WrongStatus,
    #[error("bid amount is below the current price")]
    BelowCurrentPrice,
    #[error("a concurrent state change invalidated this bid")]
    Conflict,
}

/// Errors raised by the auction store's transactional API.
#[derive(Error, Debug)]
pub enum AuctionError {
    #[error("invalid auction parameters: {0}")]
    InvalidAuctionParams(String),
    #[error("auction {0} not found")]
    NotFound(i64),
    #[error("auction {0} is not in a state that allows this transition")]
    InvalidTransition(i64),
    #[error("bid rejected: {0}")]
    BidRejected(#[from] BidRejected),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Errors raised by the cash ledger / backpack inventory collaborator.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("account {0} has insufficient balance")]
    InsufficientBalance(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl IntoResponse for AuctionError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuctionError::InvalidAuctionParams(_) => StatusCode::BAD_REQUEST,
            AuctionError::NotFound(_) => StatusCode::NOT_FOUND,
            AuctionError::InvalidTransition(_) => StatusCode::CONFLICT,
            AuctionError::BidRejected(reason) => match reason {
                BidRejected::InsufficientFunds | BidRejected::BelowCurrentPrice => {
                    StatusCode::BAD_REQUEST
                }
                BidRejected::WrongStatus => StatusCode::CONFLICT,
                BidRejected::Conflict => StatusCode::CONFLICT,
            },
            AuctionError::Ledger(_) | AuctionError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
