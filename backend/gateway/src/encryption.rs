//! Encrypted donation construction on top of a loaded SDK.
//!
//! Order is fixed: instance, keypair, EIP-712 authorization, wallet
//! signature, encrypted input, hex/ABI conversion.  The amount must already
//! be clamped; anything outside the ciphertext range fails loudly.

use alloy_primitives::{Address, Bytes, B256};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::donation::CiphertextWidth;
use crate::errors::DonationError;
use crate::sdk::{FheInstance, Keypair, NetworkConfig, SdkError, SdkHandle};
use crate::wallet::{Wallet, WalletError};

/// Ciphertext and proof in the shapes `makeDonation` takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedDonation {
    pub ciphertext: B256,
    pub proof: Bytes,
    /// Donor's EIP-712 signature authorizing the session key
    pub authorization: Bytes,
}

/// One SDK instance and the keypair it generated.
pub struct EncryptionSession {
    instance: Box<dyn FheInstance>,
    keypair: OnceCell<Keypair>,
}

impl EncryptionSession {
    /// Instantiate the encryption client for `chain`.
    pub async fn open(handle: &SdkHandle, chain: &NetworkConfig) -> Result<Self, DonationError> {
        let config = NetworkConfig::resolve(handle.network_template(), chain);
        let instance = handle
            .sdk()
            .create_instance(&config)
            .await
            .map_err(encryption_failed)?;
        debug!("Encryption instance created for chain {}", config.chain_id);
        Ok(Self {
            instance,
            keypair: OnceCell::new(),
        })
    }

    /// The session keypair, generated on first use only.
    pub async fn keypair(&self) -> Result<&Keypair, DonationError> {
        self.keypair
            .get_or_try_init(|| async {
                self.instance
                    .generate_keypair()
                    .await
                    .map_err(encryption_failed)
            })
            .await
    }

    /// EIP-712 payload binding the session public key to `contracts`.
    pub async fn authorization_payload(
        &self,
        contracts: &[Address],
        start_timestamp: i64,
        duration_days: u32,
    ) -> Result<Value, DonationError> {
        let keypair = self.keypair().await?;
        self.instance
            .create_eip712(&keypair.public_key, contracts, start_timestamp, duration_days)
            .await
            .map_err(encryption_failed)
    }

    /// Encrypt `value` for `(contract, user)` and convert the first handle
    /// and the proof into ABI shapes.
    pub async fn encrypt_amount(
        &self,
        contract: Address,
        user: Address,
        value: u64,
        width: CiphertextWidth,
    ) -> Result<(B256, Bytes), DonationError> {
        if value > width.max() {
            return Err(encryption_failed(SdkError::OutOfRange {
                value,
                bits: width.bits(),
            }));
        }

        let input = self.instance.create_encrypted_input(contract, user);
        let input = match width {
            CiphertextWidth::U8 => input.add8(value as u8),
            CiphertextWidth::U32 => input.add32(value as u32),
        };
        let ciphertexts = input.encrypt().await.map_err(encryption_failed)?;

        let first = ciphertexts.handles.first().ok_or_else(|| {
            DonationError::EncryptionFailed("SDK returned no ciphertext handles".to_string())
        })?;
        if first.len() != 32 {
            return Err(DonationError::EncryptionFailed(format!(
                "ciphertext handle is {} bytes, expected 32",
                first.len()
            )));
        }
        Ok((
            B256::from_slice(first),
            Bytes::from(ciphertexts.input_proof),
        ))
    }
}

/// Run the whole encryption sequence for one donation.
#[allow(clippy::too_many_arguments)]
pub async fn create_encrypted_donation(
    handle: &SdkHandle,
    chain: &NetworkConfig,
    contract: Address,
    user: Address,
    wallet: &dyn Wallet,
    value: u64,
    width: CiphertextWidth,
    duration_days: u32,
) -> Result<EncryptedDonation, DonationError> {
    let session = EncryptionSession::open(handle, chain).await?;

    let start = chrono::Utc::now().timestamp();
    let payload = session
        .authorization_payload(&[contract], start, duration_days)
        .await?;

    let authorization = wallet
        .sign_typed_data(user, &payload)
        .await
        .map_err(|e| match e {
            WalletError::Rejected(msg) => DonationError::UserRejected(msg),
            other => DonationError::EncryptionFailed(format!("authorization signature: {other}")),
        })?;
    info!("Session key authorized by {user}");

    let (ciphertext, proof) = session.encrypt_amount(contract, user, value, width).await?;
    debug!("Encrypted amount → handle {ciphertext}, proof {} bytes", proof.len());

    Ok(EncryptedDonation {
        ciphertext,
        proof,
        authorization,
    })
}

fn encryption_failed(e: SdkError) -> DonationError {
    DonationError::EncryptionFailed(e.to_string())
}
