//! Ethereum JSON-RPC client.
//!
//! ## Resilience
//!
//! * [`RpcClient::call`] makes exactly one attempt; the wallet path uses it so
//!   that nothing the donor signs is ever re-sent automatically.
//! * [`RpcClient::read`] retries transient failures (transport errors,
//!   rate limits, soft RPC errors) with exponential back-off up to
//!   [`MAX_BACKOFF_SECS`] seconds and [`READ_ATTEMPTS`] attempts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{GatewayError, Result};
use crate::retry::RetryPolicy;

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;
const READ_ATTEMPTS: u32 = 5;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Subset of a transaction receipt the gateway cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<U256>,
    /// `0x1` on success, `0x0` on revert.
    pub status: Option<U256>,
    pub gas_used: Option<U256>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.map(|s| s == U256::from(1)).unwrap_or(true)
    }
}

/// A raw log entry from `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub transaction_hash: Option<B256>,
}

/// The part of `eth_getTransactionByHash` used for donation totals.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionInfo {
    pub value: U256,
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
    read_policy: RetryPolicy,
}

impl RpcClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
            read_policy: RetryPolicy::exponential(
                READ_ATTEMPTS,
                Duration::from_secs(INITIAL_BACKOFF_SECS),
                Duration::from_secs(MAX_BACKOFF_SECS),
            ),
        }
    }

    /// Single JSON-RPC round trip.  RPC-level errors come back as
    /// [`GatewayError::Rpc`] with the node's code and message intact.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::Rpc {
                code: 429,
                message: "rate limited".to_string(),
            });
        }

        let body: RpcResponse = resp.json().await?;
        if let Some(err) = body.error {
            return Err(GatewayError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        debug!("{method} ok");
        Ok(serde_json::from_value(body.result.unwrap_or(Value::Null))?)
    }

    /// Read-only call with back-off.  Hard errors (invalid request, unknown
    /// method, execution reverted) are returned immediately.
    pub async fn read<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        // The inner `Result` carries hard errors out of the retry loop untouched.
        self.read_policy
            .retry(method, move || {
                let params = params.clone();
                async move {
                    match self.call::<T>(method, params).await {
                        Err(e) if is_hard_error(&e) => Ok(Err(e)),
                        other => other.map(Ok),
                    }
                }
            })
            .await?
    }

    // ─────────────────────────────────────────────────────
    // Typed helpers
    // ─────────────────────────────────────────────────────

    pub async fn block_number(&self) -> Result<u64> {
        let n: U256 = self.read("eth_blockNumber", json!([])).await?;
        Ok(n.saturating_to())
    }

    /// `eth_call` against the latest block.
    pub async fn eth_call(&self, to: Address, data: &[u8]) -> Result<Bytes> {
        self.read(
            "eth_call",
            json!([{ "to": to, "data": Bytes::copy_from_slice(data) }, "latest"]),
        )
        .await
    }

    pub async fn logs(
        &self,
        address: Address,
        topic0: B256,
        topic2: Option<B256>,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>> {
        let topics = match topic2 {
            Some(t) => json!([topic0, Value::Null, t]),
            None => json!([topic0]),
        };
        self.read(
            "eth_getLogs",
            json!([{
                "address": address,
                "topics": topics,
                "fromBlock": format!("{from_block:#x}"),
                "toBlock": format!("{to_block:#x}"),
            }]),
        )
        .await
    }

    pub async fn transaction(&self, hash: B256) -> Result<Option<TransactionInfo>> {
        self.read("eth_getTransactionByHash", json!([hash])).await
    }

    pub async fn receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>> {
        self.call("eth_getTransactionReceipt", json!([hash])).await
    }
}

/// Errors that another attempt cannot fix.
fn is_hard_error(e: &GatewayError) -> bool {
    match e {
        GatewayError::Rpc { code, message } => {
            *code == -32600 || *code == -32601 || *code == -32602 || message.contains("revert")
        }
        GatewayError::Json(_) => true,
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
