//! Background task that settles submissions whose confirmation timed out.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::db;
use crate::errors::Result;
use crate::rpc::{RpcClient, TransactionReceipt};

/// Where receipts for journaled transactions are looked up.
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    async fn receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>>;
}

#[async_trait]
impl ReceiptSource for RpcClient {
    async fn receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>> {
        RpcClient::receipt(self, hash).await
    }
}

pub struct ReconcilerState {
    pub pool: SqlitePool,
    pub receipts: Arc<dyn ReceiptSource>,
    pub interval: Duration,
}

/// Loop until `shutdown` fires.
pub async fn run(state: Arc<ReconcilerState>, shutdown: CancellationToken) {
    info!(
        "Reconciler starting (every {}s)",
        state.interval.as_secs()
    );

    loop {
        match reconcile_once(&state.pool, state.receipts.as_ref()).await {
            Ok(0) => {}
            Ok(n) => info!("Reconciled {n} pending submission(s)"),
            Err(e) => error!("Reconciler pass failed: {e}"),
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Reconciler stopped");
                return;
            }
            _ = tokio::time::sleep(state.interval) => {}
        }
    }
}

/// One pass over the pending rows.  Returns how many were settled.
pub async fn reconcile_once(pool: &SqlitePool, receipts: &dyn ReceiptSource) -> Result<usize> {
    let pending = db::pending_submissions(pool).await?;
    let mut settled = 0;

    for row in pending {
        let Some(raw_hash) = row.tx_hash.as_deref() else {
            continue;
        };
        let hash: B256 = match raw_hash.parse() {
            Ok(h) => h,
            Err(_) => {
                warn!("Submission {} has malformed tx hash {raw_hash}", row.id);
                if db::resolve_submission(pool, row.id, "failed", Some("malformed transaction hash"))
                    .await?
                {
                    settled += 1;
                }
                continue;
            }
        };

        let (status, reason) = match receipts.receipt(hash).await {
            Ok(Some(r)) if r.succeeded() => ("confirmed", None),
            Ok(Some(_)) => ("failed", Some("transaction reverted")),
            Ok(None) => continue,
            Err(e) => {
                warn!("Receipt lookup for {hash} failed: {e}");
                continue;
            }
        };

        if db::resolve_submission(pool, row.id, status, reason).await? {
            info!("Submission {} ({hash}) is now {status}", row.id);
            settled += 1;
        }
    }
    Ok(settled)
}
