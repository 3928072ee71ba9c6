//! FHE relayer SDK seams.
//!
//! The SDK itself is an external collaborator.  [`FheSdk`] and
//! [`FheInstance`] mirror its client API (`initSDK`, `createInstance`,
//! `generateKeypair`, `createEIP712`, `createEncryptedInput(..).addN(..).encrypt()`);
//! [`bridge`] talks to it over HTTP, [`loader`] finds it and
//! [`bootstrap`] loads it once per process.

pub mod bootstrap;
pub mod bridge;
pub mod loader;

use std::fmt;
use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Entry points a loaded SDK must expose before it is usable.
pub const REQUIRED_EXPORTS: [&str; 3] = ["initSDK", "createInstance", "SepoliaConfig"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    #[error("SDK source unreachable: {0}")]
    Unreachable(String),

    #[error("SDK is missing entry points: {}", .0.join(", "))]
    MissingExports(Vec<String>),

    #[error("SDK call failed: {0}")]
    Call(String),

    #[error("value {value} does not fit in a {bits}-bit ciphertext")]
    OutOfRange { value: u64, bits: u32 },
}

/// Chain configuration handed to `createInstance`: contract registry,
/// relayer endpoint and chain ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub acl_contract_address: Address,
    pub kms_contract_address: Address,
    pub input_verifier_contract_address: Address,
    pub verifying_contract_address_decryption: Address,
    pub verifying_contract_address_input_verification: Address,
    pub chain_id: u64,
    pub gateway_chain_id: u64,
    /// RPC URL the SDK uses for its own chain reads
    pub network: String,
    pub relayer_url: String,
}

impl NetworkConfig {
    /// Configuration for an instance: the SDK's own template when it targets
    /// the same chain (with our RPC endpoint), our manual registry otherwise.
    pub fn resolve(template: &NetworkConfig, configured: &NetworkConfig) -> NetworkConfig {
        if template.chain_id == configured.chain_id {
            NetworkConfig {
                network: configured.network.clone(),
                ..template.clone()
            }
        } else {
            configured.clone()
        }
    }
}

/// User keypair generated by an instance.  Held in memory only.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keypair {
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// A plaintext appended to an encrypted input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlainValue {
    pub bits: u32,
    pub value: u64,
}

/// Output of `encrypt()`: one handle per appended value plus one proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertexts {
    pub handles: Vec<Vec<u8>>,
    pub input_proof: Vec<u8>,
}

/// The loaded library: its initializer and instance constructor.
#[async_trait]
pub trait FheSdk: Send + Sync {
    async fn initialize(&self) -> Result<(), SdkError>;

    async fn create_instance(&self, config: &NetworkConfig)
        -> Result<Box<dyn FheInstance>, SdkError>;
}

/// One configured SDK instance.
#[async_trait]
pub trait FheInstance: Send + Sync {
    async fn generate_keypair(&self) -> Result<Keypair, SdkError>;

    /// EIP-712 typed data authorizing `public_key` for `contracts` during
    /// `[start_timestamp, start_timestamp + duration_days)`.
    async fn create_eip712(
        &self,
        public_key: &str,
        contracts: &[Address],
        start_timestamp: i64,
        duration_days: u32,
    ) -> Result<Value, SdkError>;

    async fn encrypt(
        &self,
        contract: Address,
        user: Address,
        values: &[PlainValue],
    ) -> Result<Ciphertexts, SdkError>;
}

impl dyn FheInstance {
    /// Start an encrypted input scoped to `(contract, user)`.
    pub fn create_encrypted_input(&self, contract: Address, user: Address) -> EncryptedInput<'_> {
        EncryptedInput {
            instance: self,
            contract,
            user,
            values: Vec::new(),
        }
    }
}

pub struct EncryptedInput<'a> {
    instance: &'a dyn FheInstance,
    contract: Address,
    user: Address,
    values: Vec<PlainValue>,
}

impl EncryptedInput<'_> {
    pub fn add8(mut self, value: u8) -> Self {
        self.values.push(PlainValue {
            bits: 8,
            value: value.into(),
        });
        self
    }

    pub fn add32(mut self, value: u32) -> Self {
        self.values.push(PlainValue {
            bits: 32,
            value: value.into(),
        });
        self
    }

    pub async fn encrypt(self) -> Result<Ciphertexts, SdkError> {
        self.instance
            .encrypt(self.contract, self.user, &self.values)
            .await
    }
}

/// What a loader strategy produced.  Entry points are listed by name; the
/// bootstrap only publishes a handle when all of them are present.
#[derive(Clone)]
pub struct SdkModule {
    pub source: String,
    pub version: Option<String>,
    pub exports: Vec<String>,
    pub network_template: Option<NetworkConfig>,
    pub sdk: Arc<dyn FheSdk>,
}

impl SdkModule {
    pub fn missing_exports(&self) -> Vec<String> {
        let mut missing: Vec<String> = REQUIRED_EXPORTS
            .iter()
            .filter(|name| !self.exports.iter().any(|e| e.as_str() == **name))
            .map(|s| s.to_string())
            .collect();
        if self.network_template.is_none() && !missing.iter().any(|m| m == "SepoliaConfig") {
            missing.push("SepoliaConfig".to_string());
        }
        missing
    }
}

/// A fully loaded SDK.  Only constructed with every entry point present.
#[derive(Clone)]
pub struct SdkHandle {
    sdk: Arc<dyn FheSdk>,
    network_template: NetworkConfig,
    source: String,
    version: Option<String>,
}

impl SdkHandle {
    pub(crate) fn from_module(module: SdkModule) -> Result<Self, SdkError> {
        let missing = module.missing_exports();
        match module.network_template {
            Some(template) if missing.is_empty() => Ok(Self {
                sdk: module.sdk,
                network_template: template,
                source: module.source,
                version: module.version,
            }),
            _ => Err(SdkError::MissingExports(missing)),
        }
    }

    pub fn sdk(&self) -> &dyn FheSdk {
        self.sdk.as_ref()
    }

    pub fn network_template(&self) -> &NetworkConfig {
        &self.network_template
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Version reported by the source's manifest, if it sent one.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl fmt::Debug for SdkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkHandle")
            .field("source", &self.source)
            .field("version", &self.version)
            .field("chain_id", &self.network_template.chain_id)
            .finish()
    }
}
