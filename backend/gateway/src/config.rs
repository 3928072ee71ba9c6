//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;

use crate::donation::{AmountScale, CiphertextWidth};
use crate::errors::{GatewayError, Result};
use crate::retry::RetryPolicy;
use crate::sdk::NetworkConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// Read-only JSON-RPC node used for campaign reads and log scans
    pub rpc_url: String,
    /// EIP-1193 wallet endpoint that signs and sends on the donor's behalf
    pub wallet_rpc_url: String,
    /// The CharityNexus contract address
    pub contract_address: Address,
    pub chain: ChainConfig,
    /// FHE registry and relayer settings handed to the SDK
    pub fhe: NetworkConfig,
    /// Ordered SDK bridge base URLs; the first is treated as the bundle source
    pub sdk_sources: Vec<String>,
    pub sdk_settle_delay: Duration,
    pub sdk_timeout: Duration,
    pub price: PriceConfig,
    pub min_donation_usd: f64,
    pub amount_scale: AmountScale,
    pub eip712_duration_days: u32,
    pub confirmation: RetryPolicy,
    /// How far back (in blocks) donation logs are aggregated
    pub log_lookback_blocks: u64,
    /// Maximum block span per `eth_getLogs` request
    pub log_batch_blocks: u64,
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) pending submissions are re-checked
    pub reconcile_interval_secs: u64,
}

/// Chain the donor's wallet must be switched to.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub public_rpc_url: String,
    pub block_explorer_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceConfig {
    pub url: String,
    pub timeout: Duration,
    pub ttl: Duration,
    pub default_price: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let chain_id: u64 = parse_or("CHAIN_ID", 11_155_111)?;
        let relayer_url = env_var("RELAYER_URL")
            .unwrap_or_else(|_| "https://relayer.testnet.zama.cloud".to_string());
        let public_rpc_url = env_var("CHAIN_PUBLIC_RPC")
            .unwrap_or_else(|_| "https://eth-sepolia.public.blastapi.io".to_string());

        let fhe = NetworkConfig {
            acl_contract_address: address_or(
                "ACL_CONTRACT",
                "0x687820221192C5B662b25367F70076A37bc79b6c",
            )?,
            kms_contract_address: address_or(
                "KMS_CONTRACT",
                "0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC",
            )?,
            input_verifier_contract_address: address_or(
                "INPUT_VERIFIER_CONTRACT",
                "0xbc91f3daD1A5F19F8390c400196e58073B6a0BC4",
            )?,
            verifying_contract_address_decryption: address_or(
                "DECRYPTION_VERIFIER_CONTRACT",
                "0xb6E160B1ff80D67Bfe90A85eE06Ce0A2613607D1",
            )?,
            verifying_contract_address_input_verification: address_or(
                "INPUT_VERIFICATION_CONTRACT",
                "0x7048C39f048125eDa9d678AEbaDfB22F7900a29F",
            )?,
            chain_id,
            gateway_chain_id: parse_or("GATEWAY_CHAIN_ID", 55_815)?,
            network: public_rpc_url.clone(),
            relayer_url,
        };

        let sdk_sources: Vec<String> = env_var("SDK_SOURCES")
            .unwrap_or_else(|_| {
                "https://unpkg.com/@zama-fhe/relayer-sdk@0.1.2/bridge,http://127.0.0.1:8787"
                    .to_string()
            })
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if sdk_sources.is_empty() {
            return Err(GatewayError::Config(
                "SDK_SOURCES must name at least one source".to_string(),
            ));
        }

        let bits: u32 = parse_or("CIPHERTEXT_BITS", 32)?;
        let width = CiphertextWidth::from_bits(bits)
            .ok_or_else(|| GatewayError::Config("Invalid CIPHERTEXT_BITS".to_string()))?;
        let divisor = positive("SCALE_DIVISOR", parse_or("SCALE_DIVISOR", 1.0)?)?;

        let confirm_attempts: u32 = parse_or("CONFIRM_ATTEMPTS", 30)?;
        if confirm_attempts == 0 {
            return Err(GatewayError::Config("Invalid CONFIRM_ATTEMPTS".to_string()));
        }

        Ok(Config {
            rpc_url: env_var("RPC_URL").unwrap_or_else(|_| "https://1rpc.io/sepolia".to_string()),
            wallet_rpc_url: env_var("WALLET_RPC_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:1248".to_string()),
            contract_address: env_var("CONTRACT_ADDRESS")
                .map_err(|_| {
                    GatewayError::Config(
                        "CONTRACT_ADDRESS environment variable is required".to_string(),
                    )
                })?
                .parse()
                .map_err(|_| GatewayError::Config("Invalid CONTRACT_ADDRESS".to_string()))?,
            chain: ChainConfig {
                chain_id,
                chain_name: env_var("CHAIN_NAME").unwrap_or_else(|_| "Sepolia".to_string()),
                public_rpc_url,
                block_explorer_url: env_var("BLOCK_EXPLORER_URL")
                    .unwrap_or_else(|_| "https://sepolia.etherscan.io".to_string()),
            },
            fhe,
            sdk_sources,
            sdk_settle_delay: Duration::from_millis(parse_or("SDK_SETTLE_MS", 1_000)?),
            sdk_timeout: Duration::from_secs(parse_or("SDK_TIMEOUT_SECS", 15)?),
            price: PriceConfig {
                url: env_var("PRICE_URL").unwrap_or_else(|_| {
                    "https://api.binance.com/api/v3/ticker/price?symbol=ETHUSDT".to_string()
                }),
                timeout: Duration::from_millis(parse_or("PRICE_TIMEOUT_MS", 2_000)?),
                ttl: Duration::from_secs(parse_or("PRICE_TTL_SECS", 300)?),
                default_price: positive(
                    "DEFAULT_ETH_PRICE",
                    parse_or("DEFAULT_ETH_PRICE", 3_500.0)?,
                )?,
            },
            min_donation_usd: parse_or("MIN_DONATION_USD", 10.0)?,
            amount_scale: AmountScale { width, divisor },
            eip712_duration_days: parse_or("EIP712_DURATION_DAYS", 10)?,
            confirmation: RetryPolicy::fixed(
                confirm_attempts,
                Duration::from_millis(parse_or("CONFIRM_INTERVAL_MS", 1_000)?),
            ),
            log_lookback_blocks: parse_or("LOG_LOOKBACK_BLOCKS", 50_000)?,
            log_batch_blocks: parse_or::<u64>("LOG_BATCH_BLOCKS", 10_000)?.max(1),
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./gateway.db".to_string()),
            api_port: parse_or("API_PORT", 3001)?,
            reconcile_interval_secs: parse_or("RECONCILE_INTERVAL_SECS", 60)?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| GatewayError::Config(format!("Missing env var: {key}")))
}

/// Parse `key` if set, otherwise return `default`.
fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| GatewayError::Config(format!("Invalid {key}"))),
        Err(_) => Ok(default),
    }
}

/// Reject anything that is not a finite number above zero.
fn positive(key: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(GatewayError::Config(format!("Invalid {key}")))
    }
}

fn address_or(key: &str, default: &str) -> Result<Address> {
    env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| GatewayError::Config(format!("Invalid {key}")))
}
