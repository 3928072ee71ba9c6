//! Hand-written doubles for the SDK, loaders, wallet and price source.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ChainConfig;
use crate::errors::{GatewayError, Result};
use crate::price::PriceSource;
use crate::rpc::TransactionReceipt;
use crate::sdk::loader::SdkLoader;
use crate::sdk::{
    Ciphertexts, FheInstance, FheSdk, Keypair, NetworkConfig, PlainValue, SdkError, SdkHandle,
    SdkModule, REQUIRED_EXPORTS,
};
use crate::wallet::{TransactionRequest, Wallet, WalletError};

pub fn network_config() -> NetworkConfig {
    NetworkConfig {
        acl_contract_address: Address::repeat_byte(0x01),
        kms_contract_address: Address::repeat_byte(0x02),
        input_verifier_contract_address: Address::repeat_byte(0x03),
        verifying_contract_address_decryption: Address::repeat_byte(0x04),
        verifying_contract_address_input_verification: Address::repeat_byte(0x05),
        chain_id: 11_155_111,
        gateway_chain_id: 55_815,
        network: "https://rpc.test".to_string(),
        relayer_url: "https://relayer.test".to_string(),
    }
}

pub fn chain_config() -> ChainConfig {
    ChainConfig {
        chain_id: 11_155_111,
        chain_name: "Sepolia".to_string(),
        public_rpc_url: "https://rpc.test".to_string(),
        block_explorer_url: "https://explorer.test".to_string(),
    }
}

pub fn loaded_handle(sdk: Arc<MockSdk>) -> SdkHandle {
    SdkHandle::from_module(module("test", sdk)).expect("complete module")
}

fn module(source: &str, sdk: Arc<MockSdk>) -> SdkModule {
    SdkModule {
        source: source.to_string(),
        version: Some("test".to_string()),
        exports: REQUIRED_EXPORTS.iter().map(|s| s.to_string()).collect(),
        network_template: Some(network_config()),
        sdk,
    }
}

// ─────────────────────────────────────────────────────────
// SDK
// ─────────────────────────────────────────────────────────

/// Shared counters and switches for a [`MockSdk`] and its instances.
#[derive(Default)]
pub struct SdkProbe {
    initializations: AtomicUsize,
    instances: AtomicUsize,
    keypairs: AtomicUsize,
    encrypts: AtomicUsize,
    fail_create: AtomicBool,
    handle_len: Mutex<Option<usize>>,
    last_values: Mutex<Vec<(u32, u64)>>,
}

impl SdkProbe {
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    pub fn instances(&self) -> usize {
        self.instances.load(Ordering::SeqCst)
    }

    pub fn keypairs(&self) -> usize {
        self.keypairs.load(Ordering::SeqCst)
    }

    pub fn encrypts(&self) -> usize {
        self.encrypts.load(Ordering::SeqCst)
    }

    pub fn fail_create_instance(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn set_handle_len(&self, len: usize) {
        *self.handle_len.lock().unwrap() = Some(len);
    }

    pub fn last_values(&self) -> Vec<(u32, u64)> {
        self.last_values.lock().unwrap().clone()
    }
}

pub struct MockSdk {
    pub probe: Arc<SdkProbe>,
}

impl MockSdk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            probe: Arc::new(SdkProbe::default()),
        })
    }
}

#[async_trait]
impl FheSdk for MockSdk {
    async fn initialize(&self) -> std::result::Result<(), SdkError> {
        self.probe.initializations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_instance(
        &self,
        _config: &NetworkConfig,
    ) -> std::result::Result<Box<dyn FheInstance>, SdkError> {
        if self.probe.fail_create.load(Ordering::SeqCst) {
            return Err(SdkError::Call("relayer unreachable".to_string()));
        }
        self.probe.instances.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockInstance {
            probe: Arc::clone(&self.probe),
        }))
    }
}

struct MockInstance {
    probe: Arc<SdkProbe>,
}

#[async_trait]
impl FheInstance for MockInstance {
    async fn generate_keypair(&self) -> std::result::Result<Keypair, SdkError> {
        let n = self.probe.keypairs.fetch_add(1, Ordering::SeqCst);
        Ok(Keypair {
            public_key: format!("0xpub{n}"),
            private_key: format!("0xpriv{n}"),
        })
    }

    async fn create_eip712(
        &self,
        public_key: &str,
        contracts: &[Address],
        start_timestamp: i64,
        duration_days: u32,
    ) -> std::result::Result<Value, SdkError> {
        Ok(json!({
            "primaryType": "UserDecryptRequestVerification",
            "message": {
                "publicKey": public_key,
                "contractAddresses": contracts,
                "startTimestamp": start_timestamp.to_string(),
                "durationDays": duration_days.to_string(),
            }
        }))
    }

    async fn encrypt(
        &self,
        _contract: Address,
        _user: Address,
        values: &[PlainValue],
    ) -> std::result::Result<Ciphertexts, SdkError> {
        self.probe.encrypts.fetch_add(1, Ordering::SeqCst);
        *self.probe.last_values.lock().unwrap() = values.iter().map(|v| (v.bits, v.value)).collect();
        let len = self.probe.handle_len.lock().unwrap().unwrap_or(32);
        Ok(Ciphertexts {
            handles: values.iter().map(|_| vec![0xee; len]).collect(),
            input_proof: vec![0xde, 0xad, 0xbe, 0xef],
        })
    }
}

// ─────────────────────────────────────────────────────────
// Loaders
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum LoaderBehavior {
    Succeed,
    SucceedAfter(Duration),
    Fail,
    FailOnce,
    MissingExports,
    Hang,
}

pub struct MockLoader {
    name: String,
    behavior: LoaderBehavior,
    calls: AtomicUsize,
    pub sdk: Arc<MockSdk>,
}

impl MockLoader {
    pub fn new(name: &str, behavior: LoaderBehavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
            sdk: MockSdk::new(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SdkLoader for MockLoader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> std::result::Result<SdkModule, SdkError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            LoaderBehavior::Succeed => Ok(module(&self.name, self.sdk.clone())),
            LoaderBehavior::SucceedAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(module(&self.name, self.sdk.clone()))
            }
            LoaderBehavior::Fail => Err(SdkError::Unreachable(format!("{} offline", self.name))),
            LoaderBehavior::FailOnce if n == 0 => {
                Err(SdkError::Unreachable(format!("{} offline", self.name)))
            }
            LoaderBehavior::FailOnce => Ok(module(&self.name, self.sdk.clone())),
            LoaderBehavior::MissingExports => {
                let mut m = module(&self.name, self.sdk.clone());
                m.exports.retain(|e| e != "createInstance");
                Ok(m)
            }
            LoaderBehavior::Hang => std::future::pending().await,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Wallet
// ─────────────────────────────────────────────────────────

/// Scriptable wallet.  By default every request succeeds and the receipt
/// shows up on the first poll.
pub struct MockWallet {
    switch_error: Mutex<Option<WalletError>>,
    add_error: Mutex<Option<WalletError>>,
    sign_error: Mutex<Option<WalletError>>,
    send_error: Mutex<Option<WalletError>>,
    /// Polls to answer `None` before the receipt appears; `None` = never.
    receipt_after: Mutex<Option<usize>>,
    reverted: AtomicBool,
    switches: AtomicUsize,
    adds: AtomicUsize,
    signatures: AtomicUsize,
    receipt_polls: AtomicUsize,
    sent: Mutex<Vec<TransactionRequest>>,
}

pub const TX_HASH: B256 = B256::repeat_byte(0x7f);

impl MockWallet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            switch_error: Mutex::new(None),
            add_error: Mutex::new(None),
            sign_error: Mutex::new(None),
            send_error: Mutex::new(None),
            receipt_after: Mutex::new(Some(0)),
            reverted: AtomicBool::new(false),
            switches: AtomicUsize::new(0),
            adds: AtomicUsize::new(0),
            signatures: AtomicUsize::new(0),
            receipt_polls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_switch(&self, e: WalletError) {
        *self.switch_error.lock().unwrap() = Some(e);
    }

    pub fn fail_add(&self, e: WalletError) {
        *self.add_error.lock().unwrap() = Some(e);
    }

    pub fn reject_signature(&self) {
        *self.sign_error.lock().unwrap() =
            Some(WalletError::Rejected("User denied message signature".to_string()));
    }

    pub fn fail_send(&self, e: WalletError) {
        *self.send_error.lock().unwrap() = Some(e);
    }

    pub fn receipt_after(&self, polls: Option<usize>) {
        *self.receipt_after.lock().unwrap() = polls;
    }

    pub fn revert(&self) {
        self.reverted.store(true, Ordering::SeqCst);
    }

    pub fn switches(&self) -> usize {
        self.switches.load(Ordering::SeqCst)
    }

    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn signatures(&self) -> usize {
        self.signatures.load(Ordering::SeqCst)
    }

    pub fn receipt_polls(&self) -> usize {
        self.receipt_polls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Wallet for MockWallet {
    async fn switch_chain(&self, _chain_id: u64) -> std::result::Result<(), WalletError> {
        self.switches.fetch_add(1, Ordering::SeqCst);
        match self.switch_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn add_chain(&self, _chain: &ChainConfig) -> std::result::Result<(), WalletError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        match self.add_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn sign_typed_data(
        &self,
        _signer: Address,
        _typed_data: &Value,
    ) -> std::result::Result<Bytes, WalletError> {
        self.signatures.fetch_add(1, Ordering::SeqCst);
        match self.sign_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(Bytes::from(vec![0x5e; 65])),
        }
    }

    async fn send_transaction(
        &self,
        tx: &TransactionRequest,
    ) -> std::result::Result<B256, WalletError> {
        self.sent.lock().unwrap().push(tx.clone());
        match self.send_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(TX_HASH),
        }
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> std::result::Result<Option<TransactionReceipt>, WalletError> {
        let polls = self.receipt_polls.fetch_add(1, Ordering::SeqCst);
        let ready = match *self.receipt_after.lock().unwrap() {
            Some(after) => polls >= after,
            None => false,
        };
        if !ready {
            return Ok(None);
        }
        let status = if self.reverted.load(Ordering::SeqCst) { 0 } else { 1 };
        Ok(Some(TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(U256::from(100)),
            status: Some(U256::from(status)),
            gas_used: Some(U256::from(21_000)),
        }))
    }
}

// ─────────────────────────────────────────────────────────
// Price
// ─────────────────────────────────────────────────────────

pub struct FixedPrice {
    price: Option<f64>,
    calls: AtomicUsize,
}

impl FixedPrice {
    pub fn new(price: f64) -> Arc<Self> {
        Arc::new(Self {
            price: Some(price),
            calls: AtomicUsize::new(0),
        })
    }

    /// A source whose every fetch fails.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            price: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for FixedPrice {
    async fn fetch_eth_usd(&self) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.price
            .ok_or_else(|| GatewayError::Price("ticker offline".to_string()))
    }
}
