//! Donor wallet access.
//!
//! [`Wallet`] is the seam between the submission flow and whatever holds
//! the donor's keys.  [`RpcWallet`] drives an EIP-1193 provider exposed over
//! JSON-RPC.  Nothing here retries: every request may prompt the donor.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::ChainConfig;
use crate::errors::GatewayError;
use crate::rpc::{RpcClient, TransactionReceipt};

/// EIP-1193 "user rejected request".
const CODE_USER_REJECTED: i64 = 4001;
/// EIP-3085 "unrecognized chain id".
const CODE_UNKNOWN_CHAIN: i64 = 4902;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("user rejected the request: {0}")]
    Rejected(String),

    #[error("chain not known to the wallet: {0}")]
    UnknownChain(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("wallet error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("wallet unreachable: {0}")]
    Transport(String),
}

impl WalletError {
    /// Sort a provider error into the cases the flow treats differently.
    pub fn classify(code: i64, message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if code == CODE_USER_REJECTED
            || lower.contains("user rejected")
            || lower.contains("user denied")
        {
            Self::Rejected(message.to_string())
        } else if code == CODE_UNKNOWN_CHAIN || lower.contains("unrecognized chain") {
            Self::UnknownChain(message.to_string())
        } else if lower.contains("insufficient funds") {
            Self::InsufficientFunds(message.to_string())
        } else {
            Self::Rpc {
                code,
                message: message.to_string(),
            }
        }
    }
}

impl From<GatewayError> for WalletError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Rpc { code, message } => Self::classify(code, &message),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Native-currency transaction the wallet is asked to sign and send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

#[async_trait]
pub trait Wallet: Send + Sync {
    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError>;

    async fn add_chain(&self, chain: &ChainConfig) -> Result<(), WalletError>;

    /// `eth_signTypedData_v4` over the given EIP-712 payload.
    async fn sign_typed_data(&self, signer: Address, typed_data: &Value) -> Result<Bytes, WalletError>;

    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<B256, WalletError>;

    async fn transaction_receipt(&self, hash: B256)
        -> Result<Option<TransactionReceipt>, WalletError>;
}

pub struct RpcWallet {
    rpc: RpcClient,
}

impl RpcWallet {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl Wallet for RpcWallet {
    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        let _: Value = self
            .rpc
            .call(
                "wallet_switchEthereumChain",
                json!([{ "chainId": format!("{chain_id:#x}") }]),
            )
            .await?;
        Ok(())
    }

    async fn add_chain(&self, chain: &ChainConfig) -> Result<(), WalletError> {
        let _: Value = self
            .rpc
            .call("wallet_addEthereumChain", json!([add_chain_params(chain)]))
            .await?;
        Ok(())
    }

    async fn sign_typed_data(&self, signer: Address, typed_data: &Value) -> Result<Bytes, WalletError> {
        // v4 takes the typed data as a JSON string, not an object.
        let payload = serde_json::to_string(typed_data)
            .map_err(|e| WalletError::Transport(format!("typed data: {e}")))?;
        let sig: Bytes = self
            .rpc
            .call("eth_signTypedData_v4", json!([signer, payload]))
            .await?;
        debug!("Typed data signed by {signer}");
        Ok(sig)
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<B256, WalletError> {
        Ok(self.rpc.call("eth_sendTransaction", json!([tx])).await?)
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, WalletError> {
        Ok(self.rpc.receipt(hash).await?)
    }
}

fn add_chain_params(chain: &ChainConfig) -> Value {
    json!({
        "chainId": format!("{:#x}", chain.chain_id),
        "chainName": chain.chain_name,
        "nativeCurrency": { "name": "Ether", "symbol": "ETH", "decimals": 18 },
        "rpcUrls": [chain.public_rpc_url],
        "blockExplorerUrls": [chain.block_explorer_url],
    })
}
