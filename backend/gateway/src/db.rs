//! Database layer: migrations and the submission journal.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::donation::DonationRequest;
use crate::errors::{GatewayError, Result};
use crate::submission::{SubmissionOutcome, SubmissionReport};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied successfully");
    Ok(())
}

/// One journal row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub id: i64,
    pub campaign_id: i64,
    pub wallet: String,
    /// Campaign organizer named by the donor, if any
    pub organizer: Option<String>,
    pub currency: String,
    pub raw_amount: f64,
    pub usd_value: Option<f64>,
    pub scaled_amount: Option<i64>,
    /// `pending`, `confirmed` or `failed`
    pub status: String,
    pub error_kind: Option<String>,
    pub reason: Option<String>,
    pub tx_hash: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

/// Journal a finished submission.  Returns the new row id.
pub async fn insert_submission(
    pool: &SqlitePool,
    request: &DonationRequest,
    report: &SubmissionReport,
) -> Result<i64> {
    let wallet = request
        .wallet_address
        .map(|a| a.to_string())
        .unwrap_or_default();
    let error = match &report.outcome {
        SubmissionOutcome::Failed(e) => Some(e),
        _ => None,
    };
    let campaign_id = i64::try_from(request.campaign_id).map_err(|_| {
        GatewayError::InvalidInput(format!("campaign id {} is out of range", request.campaign_id))
    })?;
    let organizer = request.organizer_address.map(|a| a.to_string());

    let id = sqlx::query(
        r#"
        INSERT INTO submissions
            (campaign_id, wallet, organizer, currency, raw_amount, usd_value,
             scaled_amount, status, error_kind, reason, tx_hash)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(campaign_id)
    .bind(wallet)
    .bind(organizer)
    .bind(request.currency.as_str())
    .bind(request.raw_amount)
    .bind(report.priced.as_ref().map(|p| p.usd_value))
    .bind(report.priced.as_ref().map(|p| p.scaled_amount as i64))
    .bind(report.outcome.status())
    .bind(error.map(|e| e.kind()))
    .bind(error.map(|e| e.to_string()))
    .bind(report.outcome.tx_hash())
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Move a `pending` row to its final status.  Rows already resolved are
/// left alone; returns whether anything changed.
pub async fn resolve_submission(
    pool: &SqlitePool,
    id: i64,
    status: &str,
    reason: Option<&str>,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        UPDATE submissions
        SET    status = ?2, reason = COALESCE(?3, reason), updated_at = datetime('now')
        WHERE  id = ?1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(reason)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows > 0)
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

const SELECT_COLUMNS: &str = r#"
    SELECT id, campaign_id, wallet, organizer, currency, raw_amount, usd_value, scaled_amount,
           status, error_kind, reason, tx_hash, created_at, updated_at
    FROM   submissions
"#;

/// Most recent submissions first.
pub async fn list_submissions(pool: &SqlitePool, limit: i64) -> Result<Vec<SubmissionRecord>> {
    let rows = sqlx::query_as::<_, SubmissionRecord>(&format!(
        "{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Pending rows that have a transaction to look up, oldest first.
pub async fn pending_submissions(pool: &SqlitePool) -> Result<Vec<SubmissionRecord>> {
    let rows = sqlx::query_as::<_, SubmissionRecord>(&format!(
        "{SELECT_COLUMNS} WHERE status = 'pending' AND tx_hash IS NOT NULL ORDER BY id ASC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
