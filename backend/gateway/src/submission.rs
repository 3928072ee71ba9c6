//! Donation submission state machine.
//!
//! ```text
//! Validating ─► SwitchingNetwork ─► BootstrappingSdk ─► Encrypting ─► Submitting ─► Confirming ─► Confirmed
//!      │                                   │                 │             │             │
//!      └──────────────────────────────────►┴─────────────────┴─────────────┴─────────────┴──► Failed
//! ```
//!
//! Steps run strictly in order and are never retried here; a failed
//! submission is retried by submitting again.  `on_step` is called with each
//! step before its work starts.  Validation reports no step: it finishes
//! before anything touches the network.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ChainConfig, Config};
use crate::contract::encode_make_donation;
use crate::donation::{AmountScale, Currency, DonationRequest, PricedDonation};
use crate::encryption::create_encrypted_donation;
use crate::errors::DonationError;
use crate::price::PriceOracle;
use crate::retry::RetryPolicy;
use crate::sdk::bootstrap::SdkBootstrap;
use crate::sdk::NetworkConfig;
use crate::wallet::{TransactionRequest, Wallet, WalletError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionStep {
    SwitchingNetwork,
    BootstrappingSdk,
    Encrypting,
    Submitting,
    Confirming,
}

impl SubmissionStep {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SwitchingNetwork => "Switching to the donation network...",
            Self::BootstrappingSdk => "Loading encryption...",
            Self::Encrypting => "Encrypting donation amount...",
            Self::Submitting => "Submitting transaction...",
            Self::Confirming => "Waiting for confirmation...",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Pending(SubmissionStep),
    Confirmed { tx_hash: B256 },
    Failed(DonationError),
}

impl SubmissionOutcome {
    /// Journal status.  A confirmation timeout stays `pending`: the
    /// transaction may still land.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Confirmed { .. } => "confirmed",
            Self::Failed(e) if e.is_ambiguous() => "pending",
            Self::Failed(_) => "failed",
            Self::Pending(_) => "pending",
        }
    }

    pub fn tx_hash(&self) -> Option<String> {
        match self {
            Self::Confirmed { tx_hash } => Some(tx_hash.to_string()),
            Self::Failed(DonationError::Reverted { tx_hash })
            | Self::Failed(DonationError::ConfirmationTimeout { tx_hash, .. }) => {
                Some(tx_hash.clone())
            }
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Pending(step) => step.label().to_string(),
            Self::Confirmed { tx_hash } => format!("Donation confirmed in transaction {tx_hash}."),
            Self::Failed(e) => e.user_message(),
        }
    }
}

/// Everything one `submit` call produced.
#[derive(Debug, Clone)]
pub struct SubmissionReport {
    pub outcome: SubmissionOutcome,
    /// Steps entered, in order
    pub steps: Vec<SubmissionStep>,
    /// Present once validation passed
    pub priced: Option<PricedDonation>,
}

/// The slice of [`Config`] the submitter needs.
#[derive(Debug, Clone)]
pub struct SubmitterSettings {
    pub contract_address: Address,
    pub chain: ChainConfig,
    pub fhe: NetworkConfig,
    pub min_donation_usd: f64,
    pub amount_scale: AmountScale,
    pub eip712_duration_days: u32,
    pub confirmation: RetryPolicy,
}

impl SubmitterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            contract_address: config.contract_address,
            chain: config.chain.clone(),
            fhe: config.fhe.clone(),
            min_donation_usd: config.min_donation_usd,
            amount_scale: config.amount_scale,
            eip712_duration_days: config.eip712_duration_days,
            confirmation: config.confirmation,
        }
    }
}

pub struct DonationSubmitter {
    settings: SubmitterSettings,
    price: Arc<PriceOracle>,
    sdk: Arc<SdkBootstrap>,
    wallet: Arc<dyn Wallet>,
}

impl DonationSubmitter {
    pub fn new(
        settings: SubmitterSettings,
        price: Arc<PriceOracle>,
        sdk: Arc<SdkBootstrap>,
        wallet: Arc<dyn Wallet>,
    ) -> Self {
        Self {
            settings,
            price,
            sdk,
            wallet,
        }
    }

    /// Run one donation attempt to a terminal outcome.
    pub async fn submit<F>(&self, request: &DonationRequest, mut on_step: F) -> SubmissionReport
    where
        F: FnMut(SubmissionStep) + Send,
    {
        let mut report = SubmissionReport {
            outcome: SubmissionOutcome::Pending(SubmissionStep::SwitchingNetwork),
            steps: Vec::new(),
            priced: None,
        };

        let result = self
            .run(request, &mut |step| {
                report.steps.push(step);
                on_step(step);
            }, &mut report.priced)
            .await;

        report.outcome = match result {
            Ok(tx_hash) => {
                info!("Donation to campaign {} confirmed: {tx_hash}", request.campaign_id);
                SubmissionOutcome::Confirmed { tx_hash }
            }
            Err(e) => {
                if e.is_validation() {
                    debug!("Donation rejected: {e}");
                } else {
                    warn!("Donation to campaign {} failed: {e}", request.campaign_id);
                }
                SubmissionOutcome::Failed(e)
            }
        };
        report
    }

    async fn run(
        &self,
        request: &DonationRequest,
        enter: &mut (dyn FnMut(SubmissionStep) + Send),
        priced_out: &mut Option<PricedDonation>,
    ) -> Result<B256, DonationError> {
        let priced = self.validate(request).await?;
        info!(
            "Donating {} {} (${:.2}, scaled {}) to campaign {}",
            priced.raw_amount,
            priced.currency.as_str(),
            priced.usd_value,
            priced.scaled_amount,
            priced.campaign_id
        );
        *priced_out = Some(priced.clone());

        enter(SubmissionStep::SwitchingNetwork);
        switch_network(self.wallet.as_ref(), &self.settings.chain).await;

        enter(SubmissionStep::BootstrappingSdk);
        let handle = self.sdk.ensure_loaded().await?;

        enter(SubmissionStep::Encrypting);
        let encrypted = create_encrypted_donation(
            &handle,
            &self.settings.fhe,
            self.settings.contract_address,
            priced.wallet,
            self.wallet.as_ref(),
            priced.scaled_amount,
            self.settings.amount_scale.width,
            self.settings.eip712_duration_days,
        )
        .await?;

        enter(SubmissionStep::Submitting);
        let tx = TransactionRequest {
            from: priced.wallet,
            to: self.settings.contract_address,
            value: priced.wei_value,
            data: encode_make_donation(priced.campaign_id, encrypted.ciphertext, encrypted.proof),
        };
        let tx_hash = self
            .wallet
            .send_transaction(&tx)
            .await
            .map_err(submission_error)?;
        info!("Donation transaction sent: {tx_hash}");

        enter(SubmissionStep::Confirming);
        await_receipt(self.wallet.as_ref(), self.settings.confirmation, tx_hash).await
    }

    /// Local checks, then pricing.  A USD amount under the minimum is
    /// rejected without looking up the price.
    async fn validate(&self, request: &DonationRequest) -> Result<PricedDonation, DonationError> {
        request.precheck()?;
        let minimum = self.settings.min_donation_usd;
        if request.currency == Currency::Usd && request.raw_amount < minimum {
            return Err(DonationError::BelowMinimum {
                usd_value: request.raw_amount,
                minimum,
            });
        }
        let eth_usd = self.price.eth_usd().await;
        request.price(eth_usd, &self.settings.amount_scale, minimum)
    }
}

/// Ask the wallet to move to `chain`, adding it when unknown.  Best effort:
/// a wrong network surfaces later as a wallet error.
pub(crate) async fn switch_network(wallet: &dyn Wallet, chain: &ChainConfig) {
    let chain_id = chain.chain_id;
    match wallet.switch_chain(chain_id).await {
        Ok(()) => debug!("Wallet on chain {chain_id}"),
        Err(WalletError::UnknownChain(_)) => {
            info!("Wallet does not know chain {chain_id}, requesting it be added");
            if let Err(e) = wallet.add_chain(chain).await {
                warn!("Could not add chain {chain_id}: {e}");
            }
        }
        Err(e) => warn!("Could not switch wallet to chain {chain_id}: {e}"),
    }
}

/// Poll for the receipt of `tx_hash` under `policy`.
pub(crate) async fn await_receipt(
    wallet: &dyn Wallet,
    policy: RetryPolicy,
    tx_hash: B256,
) -> Result<B256, DonationError> {
    let receipt = policy
        .poll("receipt", move || wallet.transaction_receipt(tx_hash))
        .await;

    match receipt {
        Some(r) if r.succeeded() => Ok(tx_hash),
        Some(_) => Err(DonationError::Reverted {
            tx_hash: tx_hash.to_string(),
        }),
        None => Err(DonationError::ConfirmationTimeout {
            tx_hash: tx_hash.to_string(),
            attempts: policy.max_attempts,
        }),
    }
}

pub(crate) fn submission_error(e: WalletError) -> DonationError {
    match e {
        WalletError::Rejected(msg) => DonationError::UserRejected(msg),
        WalletError::InsufficientFunds(msg) => DonationError::InsufficientFunds(msg),
        WalletError::Transport(msg) => DonationError::Network(msg),
        other => DonationError::SubmissionFailed(other.to_string()),
    }
}
