//! Charity Nexus gateway: entry point.
//!
//! Submits FHE-encrypted donations and new campaigns through the user's
//! wallet, and serves campaign reads over a small Axum REST API.  A background reconciler
//! settles submissions whose confirmation timed out.

mod api;
mod campaign_writer;
mod campaigns;
mod config;
mod contract;
mod db;
mod donation;
mod encryption;
mod errors;
mod price;
mod reconciler;
mod retry;
mod rpc;
mod sdk;
mod submission;
mod wallet;

#[cfg(test)]
mod test_submission;
#[cfg(test)]
mod test_support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use campaign_writer::CampaignWriter;
use campaigns::CampaignReader;
use config::Config;
use price::PriceOracle;
use reconciler::ReconcilerState;
use rpc::RpcClient;
use sdk::bootstrap::SdkBootstrap;
use submission::{DonationSubmitter, SubmitterSettings};
use wallet::RpcWallet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(
        "Gateway starting: contract {} on chain {}",
        config.contract_address, config.chain.chain_id
    );

    let pool = db::init_pool(&config.database_url).await?;

    // One HTTP client for the node, the wallet, the SDK bridge and the ticker.
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

    // ─── Process-wide singletons ──────────────────────────
    let price = Arc::new(PriceOracle::from_config(client.clone(), &config.price));
    let sdk = Arc::new(SdkBootstrap::new(
        sdk::loader::from_sources(&client, &config.sdk_sources, config.sdk_settle_delay),
        config.sdk_timeout,
    ));
    let node = Arc::new(RpcClient::new(client.clone(), config.rpc_url.clone()));
    let wallet = Arc::new(RpcWallet::new(RpcClient::new(
        client.clone(),
        config.wallet_rpc_url.clone(),
    )));

    // ─── Background reconciler ────────────────────────────
    let shutdown = CancellationToken::new();
    let reconciler_state = Arc::new(ReconcilerState {
        pool: pool.clone(),
        receipts: node.clone(),
        interval: Duration::from_secs(config.reconcile_interval_secs.max(1)),
    });
    let reconciler = tokio::spawn(reconciler::run(reconciler_state, shutdown.clone()));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        pool,
        submitter: DonationSubmitter::new(
            SubmitterSettings::from_config(&config),
            price.clone(),
            sdk.clone(),
            wallet.clone(),
        ),
        writer: CampaignWriter::from_config(&config, wallet),
        campaigns: CampaignReader::new(
            node,
            config.contract_address,
            price.clone(),
            config.log_lookback_blocks,
            config.log_batch_blocks,
        ),
        price,
        sdk,
        in_flight: Arc::new(tokio::sync::Mutex::new(())),
        current_step: Mutex::new(None),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/price", get(api::get_price))
        .route("/campaigns", get(api::get_campaigns).post(api::post_campaign))
        .route("/campaigns/:id", get(api::get_campaign))
        .route("/campaigns/:id/donations", get(api::get_campaign_donations))
        .route("/donations", post(api::post_donation).get(api::list_donations))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
            token.cancel();
        })
        .await?;

    shutdown.cancel();
    reconciler.await?;
    Ok(())
}
