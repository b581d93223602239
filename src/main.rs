//! Trusted-time auction service entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trustclock_auction::api::state::AppState;
use trustclock_auction::auction::{AuctionStore, TickEngine};
use trustclock_auction::config::Config;
use trustclock_auction::ledger::SqliteLedger;
use trustclock_auction::subscription::SubscriptionHub;
use trustclock_auction::time_service::TimeService;
use trustclock_auction::{api, db};

#[derive(Parser, Debug)]
#[command(name = "trustclock-auction")]
struct Cli {
    /// Path to the process configuration file. Relative paths resolve
    /// against the crate's manifest directory.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trustclock_auction=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path).unwrap_or_else(|err| {
        info!(error = %err, "no config file found, using defaults");
        Config::default()
    });

    let db_path = config.resolved_db_path();
    let conn = db::open(&db_path).context("opening database")?;

    let time = TimeService::init(config.time_service.clone(), config.ntp_server.clone())
        .await
        .map_err(|err| anyhow::anyhow!("initial time sync failed: {err}"))?;

    let ledger: Arc<dyn trustclock_auction::ledger::CashLedger> =
        Arc::new(SqliteLedger::new(conn.clone()));
    let hub = Arc::new(SubscriptionHub::new(time.clone()));
    let (tick_tx, tick_rx) = tokio::sync::mpsc::unbounded_channel();
    let auctions = Arc::new(AuctionStore::new(
        conn,
        ledger.clone(),
        hub.clone(),
        tick_tx,
        time.clone(),
    ));

    let tick_engine = TickEngine::new(auctions.clone(), tick_rx);
    tokio::spawn(tick_engine.run());

    tokio::spawn(time.clone().run_scheduler());

    let state = AppState {
        time,
        auctions,
        ledger,
        hub,
    };

    let app = api::router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    info!(%addr, "trustclock-auction listening");

    axum::serve(listener, app)
        .await
        .context("server error")?;

    Ok(())
}
