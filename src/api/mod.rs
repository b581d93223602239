pub mod auction;
pub mod state;
pub mod timeservice;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::subscription::websocket_handler;
use state::AppState;

pub fn router(state: AppState) -> Router {
    let timeservice_routes = Router::new()
        .route("/api/timeservice/sync-time", get(timeservice::sync_time))
        .route("/api/timeservice/status", get(timeservice::status))
        .route("/api/timeservice/stats", get(timeservice::stats))
        .route("/api/timeservice/circuit-breaker", get(timeservice::circuit_breaker))
        .route("/api/timeservice/ntp-pool", get(timeservice::ntp_pool));

    let auction_routes = Router::new()
        .route("/api/auction/create", axum::routing::post(auction::create))
        .route("/api/auction/start", axum::routing::post(auction::start))
        .route("/api/auction/pause", axum::routing::post(auction::pause))
        .route("/api/auction/cancel", axum::routing::post(auction::cancel))
        .route("/api/auction/reactivate", axum::routing::post(auction::reactivate))
        .route("/api/auction/bid", axum::routing::post(auction::bid))
        .route("/api/auction/get", axum::routing::post(auction::get))
        .route("/api/auction/list", get(auction::list))
        .route("/api/auction/seller-list", get(auction::seller_list));

    Router::new()
        .route("/health", get(health_check))
        .route("/ws/auction", get(websocket_handler))
        .merge(timeservice_routes)
        .merge(auction_routes)
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(crate::middleware::logging::request_logging))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}
