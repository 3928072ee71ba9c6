//! Axum REST API handlers.

use std::sync::{Arc, Mutex};

use alloy_primitives::Address;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::campaign_writer::{CampaignWriter, NewCampaign};
use crate::campaigns::CampaignReader;
use crate::db;
use crate::donation::{Currency, DonationRequest};
use crate::errors::GatewayError;
use crate::price::PriceOracle;
use crate::sdk::bootstrap::SdkBootstrap;
use crate::submission::{DonationSubmitter, SubmissionOutcome, SubmissionStep};

const DEFAULT_LIST_LIMIT: i64 = 100;

pub struct ApiState {
    pub pool: SqlitePool,
    pub submitter: DonationSubmitter,
    pub campaigns: CampaignReader,
    pub writer: CampaignWriter,
    pub price: Arc<PriceOracle>,
    pub sdk: Arc<SdkBootstrap>,
    /// Held for the whole of a wallet flow; one at a time per gateway
    pub in_flight: Arc<tokio::sync::Mutex<()>>,
    /// Step the running submission is in, if any
    pub current_step: Mutex<Option<SubmissionStep>>,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationBody {
    pub campaign_id: u64,
    pub amount: f64,
    pub currency: Currency,
    #[serde(default)]
    pub wallet_address: Option<Address>,
    #[serde(default)]
    pub organizer_address: Option<Address>,
}

impl From<DonationBody> for DonationRequest {
    fn from(body: DonationBody) -> Self {
        DonationRequest {
            campaign_id: body.campaign_id,
            raw_amount: body.amount,
            currency: body.currency,
            organizer_address: body.organizer_address,
            wallet_address: body.wallet_address,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationResponse {
    /// `confirmed`, `pending` (may still complete) or `failed`
    pub outcome: &'static str,
    pub error_kind: Option<&'static str>,
    pub steps: Vec<SubmissionStep>,
    pub message: String,
    pub tx_hash: Option<String>,
    pub usd_value: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sdk_ready: bool,
    pub sdk_source: Option<String>,
    pub sdk_version: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCreatedResponse {
    /// `confirmed`, `pending` (may still complete) or `failed`
    pub outcome: &'static str,
    pub error_kind: Option<&'static str>,
    pub message: String,
    pub tx_hash: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceResponse {
    pub eth_usd: f64,
    /// `None` while the bootstrap default is in use
    pub fetched_at_age_secs: Option<u64>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyResponse {
    pub error: &'static str,
    pub step: Option<SubmissionStep>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let handle = state.sdk.handle();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sdk_ready: state.sdk.is_ready(),
        sdk_source: handle.as_ref().map(|h| h.source().to_string()),
        sdk_version: handle.as_ref().and_then(|h| h.version().map(str::to_string)),
    })
}

/// `GET /price`
pub async fn get_price(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let eth_usd = state.price.eth_usd().await;
    let age = state
        .price
        .quote()
        .await
        .map(|q| q.fetched_at.elapsed().as_secs());
    Json(PriceResponse {
        eth_usd,
        fetched_at_age_secs: age,
    })
}

/// `GET /campaigns`
pub async fn get_campaigns(State(state): State<Arc<ApiState>>) -> Response {
    match state.campaigns.list().await {
        Ok(campaigns) => Json(serde_json::json!({
            "count": campaigns.len(),
            "campaigns": campaigns,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /campaigns/:id`
pub async fn get_campaign(State(state): State<Arc<ApiState>>, Path(id): Path<u64>) -> Response {
    match state.campaigns.campaign(id).await {
        Ok(campaign) => Json(campaign).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /campaigns/:id/donations`
///
/// Donation count, unique donors and value totals from `DonationMade` logs.
pub async fn get_campaign_donations(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<u64>,
) -> Response {
    if let Err(e) = state.campaigns.campaign(id).await {
        return error_response(e);
    }
    match state.campaigns.donation_stats(id).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /campaigns`
///
/// Sends `createCampaign` from the organizer's wallet and waits for the
/// receipt.  Shares the one-at-a-time wallet slot with donations.
pub async fn post_campaign(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<NewCampaign>,
) -> Response {
    let Ok(guard) = Arc::clone(&state.in_flight).try_lock_owned() else {
        return busy(&state);
    };

    let task_state = Arc::clone(&state);
    let task = tokio::spawn(async move {
        let _guard = guard;
        task_state.writer.create(&body).await
    });
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(e) => return task_failed(e),
    };

    let message = match &outcome {
        SubmissionOutcome::Confirmed { tx_hash } => {
            format!("Campaign created in transaction {tx_hash}.")
        }
        other => other.message(),
    };
    let response = CampaignCreatedResponse {
        outcome: outcome.status(),
        error_kind: error_kind(&outcome),
        message,
        tx_hash: outcome.tx_hash(),
    };
    (status_for(&outcome), Json(response)).into_response()
}

/// `POST /donations`
///
/// Runs one submission to completion.  A second request while one is
/// running gets `409` with the running submission's step.  The flow and its
/// journal write run on their own task: a client that disconnects does not
/// abandon a transaction that was already sent.
pub async fn post_donation(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<DonationBody>,
) -> Response {
    let Ok(guard) = Arc::clone(&state.in_flight).try_lock_owned() else {
        return busy(&state);
    };

    let request: DonationRequest = body.into();
    let task_state = Arc::clone(&state);
    let task = tokio::spawn(async move {
        let _guard = guard;
        run_donation(&task_state, request).await
    });
    match task.await {
        Ok(response) => response,
        Err(e) => task_failed(e),
    }
}

async fn run_donation(state: &ApiState, request: DonationRequest) -> Response {
    let report = state
        .submitter
        .submit(&request, |step| {
            info!("Submission step: {}", step.label());
            if let Ok(mut current) = state.current_step.lock() {
                *current = Some(step);
            }
        })
        .await;
    if let Ok(mut current) = state.current_step.lock() {
        *current = None;
    }

    if let Err(e) = db::insert_submission(&state.pool, &request, &report).await {
        warn!("Could not journal submission: {e}");
    }

    let response = DonationResponse {
        outcome: report.outcome.status(),
        error_kind: error_kind(&report.outcome),
        message: report.outcome.message(),
        tx_hash: report.outcome.tx_hash(),
        usd_value: report.priced.as_ref().map(|p| p.usd_value),
        steps: report.steps,
    };
    (status_for(&report.outcome), Json(response)).into_response()
}

/// `GET /donations`
pub async fn list_donations(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 1_000);
    match db::list_submissions(&state.pool, limit).await {
        Ok(rows) => Json(serde_json::json!({
            "count": rows.len(),
            "donations": rows,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

fn busy(state: &ApiState) -> Response {
    let step = state.current_step.lock().ok().and_then(|s| *s);
    (
        StatusCode::CONFLICT,
        Json(BusyResponse {
            error: "a wallet request is already in progress",
            step,
        }),
    )
        .into_response()
}

fn task_failed(e: tokio::task::JoinError) -> Response {
    error!("Wallet flow task failed: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal error".to_string(),
        }),
    )
        .into_response()
}

fn error_kind(outcome: &SubmissionOutcome) -> Option<&'static str> {
    match outcome {
        SubmissionOutcome::Failed(e) => Some(e.kind()),
        _ => None,
    }
}

fn status_for(outcome: &SubmissionOutcome) -> StatusCode {
    match outcome {
        SubmissionOutcome::Confirmed { .. } => StatusCode::OK,
        SubmissionOutcome::Pending(_) => StatusCode::ACCEPTED,
        SubmissionOutcome::Failed(e) if e.is_ambiguous() => StatusCode::ACCEPTED,
        SubmissionOutcome::Failed(e) if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
        SubmissionOutcome::Failed(_) => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(e: GatewayError) -> Response {
    let status = match &e {
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        GatewayError::Rpc { .. }
        | GatewayError::Http(_)
        | GatewayError::Abi(_)
        | GatewayError::Price(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}
