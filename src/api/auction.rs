use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::auction::{Auction, CreateAuctionParams, Event};
use crate::error::AuctionError;

use super::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    Json(params): Json<CreateAuctionParams>,
) -> Result<Json<Auction>, AuctionError> {
    let (auction, event) = state.auctions.create(params).await?;
    state.auctions.publish(event).await;
    Ok(Json(auction))
}

#[derive(Deserialize)]
pub struct AuctionIdBody {
    pub auction_id: i64,
}

pub async fn start(
    State(state): State<AppState>,
    Json(body): Json<AuctionIdBody>,
) -> Result<Json<Auction>, AuctionError> {
    transition(state, body.auction_id, |s, id| async move { s.start(id).await }).await
}

pub async fn pause(
    State(state): State<AppState>,
    Json(body): Json<AuctionIdBody>,
) -> Result<Json<Auction>, AuctionError> {
    transition(state, body.auction_id, |s, id| async move { s.pause(id).await }).await
}

pub async fn cancel(
    State(state): State<AppState>,
    Json(body): Json<AuctionIdBody>,
) -> Result<Json<Auction>, AuctionError> {
    transition(state, body.auction_id, |s, id| async move { s.cancel(id).await }).await
}

pub async fn reactivate(
    State(state): State<AppState>,
    Json(body): Json<AuctionIdBody>,
) -> Result<Json<Auction>, AuctionError> {
    transition(state, body.auction_id, |s, id| async move { s.reactivate(id).await }).await
}

#[derive(Deserialize)]
pub struct BidBody {
    pub auction_id: i64,
    pub bidder_id: String,
    pub bid_amount: i64,
}

pub async fn bid(
    State(state): State<AppState>,
    Json(body): Json<BidBody>,
) -> Result<Json<Auction>, AuctionError> {
    let (auction, event) = state
        .auctions
        .place_bid(body.auction_id, &body.bidder_id, body.bid_amount)
        .await?;
    state.auctions.publish(event).await;
    Ok(Json(auction))
}

pub async fn get(
    State(state): State<AppState>,
    Json(body): Json<AuctionIdBody>,
) -> Result<Json<Auction>, AuctionError> {
    let auction = state.auctions.get(body.auction_id).await?;
    Ok(Json(auction))
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<Auction>> {
    Json(state.auctions.list().await)
}

#[derive(Deserialize)]
pub struct SellerQuery {
    pub seller: String,
}

pub async fn seller_list(
    State(state): State<AppState>,
    Query(query): Query<SellerQuery>,
) -> Json<Vec<Auction>> {
    Json(state.auctions.list_by_seller(&query.seller).await)
}

async fn transition<F, Fut>(state: AppState, id: i64, f: F) -> Result<Json<Auction>, AuctionError>
where
    F: FnOnce(std::sync::Arc<crate::auction::AuctionStore>, i64) -> Fut,
    Fut: std::future::Future<Output = Result<(Auction, Event), AuctionError>>,
{
    let (auction, event) = f(state.auctions.clone(), id).await?;
    state.auctions.publish(event).await;
    Ok(Json(auction))
}
