//! Campaign creation through the organizer's wallet.
//!
//! Same wallet path as a donation, minus pricing and encryption: validate,
//! switch network, send `createCampaign`, wait for the receipt.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{ChainConfig, Config};
use crate::contract::encode_create_campaign;
use crate::errors::DonationError;
use crate::retry::RetryPolicy;
use crate::submission::{await_receipt, submission_error, switch_network, SubmissionOutcome};
use crate::wallet::{TransactionRequest, Wallet};

const SECS_PER_DAY: u64 = 86_400;
const MAX_DURATION_DAYS: u32 = 365;
const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 2_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    pub name: String,
    pub description: String,
    /// Fundraising goal in whole USD
    pub target_amount: u64,
    pub duration_days: u32,
    #[serde(default)]
    pub wallet_address: Option<Address>,
}

/// A campaign that passed validation, ready to encode.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidCampaign {
    pub organizer: Address,
    pub name: String,
    pub description: String,
    pub target_amount: u32,
    pub duration_secs: u64,
}

impl NewCampaign {
    pub fn validate(&self) -> Result<ValidCampaign, DonationError> {
        let organizer = self.wallet_address.ok_or(DonationError::WalletRequired)?;
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(DonationError::InvalidCampaign(format!(
                "name must be 1 to {MAX_NAME_LEN} characters"
            )));
        }
        let description = self.description.trim();
        if description.is_empty() || description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(DonationError::InvalidCampaign(format!(
                "description must be 1 to {MAX_DESCRIPTION_LEN} characters"
            )));
        }
        // The contract reports the target back as a uint32.
        let target_amount = match u32::try_from(self.target_amount) {
            Ok(t) if t >= 1 => t,
            _ => {
                return Err(DonationError::InvalidCampaign(format!(
                    "target must be between 1 and {} USD",
                    u32::MAX
                )))
            }
        };
        if !(1..=MAX_DURATION_DAYS).contains(&self.duration_days) {
            return Err(DonationError::InvalidCampaign(format!(
                "duration must be 1 to {MAX_DURATION_DAYS} days"
            )));
        }
        Ok(ValidCampaign {
            organizer,
            name: name.to_string(),
            description: description.to_string(),
            target_amount,
            duration_secs: u64::from(self.duration_days) * SECS_PER_DAY,
        })
    }
}

pub struct CampaignWriter {
    contract: Address,
    chain: ChainConfig,
    confirmation: RetryPolicy,
    wallet: Arc<dyn Wallet>,
}

impl CampaignWriter {
    pub fn new(
        contract: Address,
        chain: ChainConfig,
        confirmation: RetryPolicy,
        wallet: Arc<dyn Wallet>,
    ) -> Self {
        Self {
            contract,
            chain,
            confirmation,
            wallet,
        }
    }

    pub fn from_config(config: &Config, wallet: Arc<dyn Wallet>) -> Self {
        Self::new(
            config.contract_address,
            config.chain.clone(),
            config.confirmation,
            wallet,
        )
    }

    /// Create one campaign.  Ends `Confirmed` or `Failed`; a confirmation
    /// timeout is reported as ambiguous, like a donation's.
    pub async fn create(&self, campaign: &NewCampaign) -> SubmissionOutcome {
        match self.run(campaign).await {
            Ok(tx_hash) => {
                info!("Campaign \"{}\" created: {tx_hash}", campaign.name.trim());
                SubmissionOutcome::Confirmed { tx_hash }
            }
            Err(e) => {
                if !e.is_validation() {
                    warn!("Campaign creation failed: {e}");
                }
                SubmissionOutcome::Failed(e)
            }
        }
    }

    async fn run(&self, campaign: &NewCampaign) -> Result<B256, DonationError> {
        let valid = campaign.validate()?;
        switch_network(self.wallet.as_ref(), &self.chain).await;

        let tx = TransactionRequest {
            from: valid.organizer,
            to: self.contract,
            value: U256::ZERO,
            data: encode_create_campaign(
                &valid.name,
                &valid.description,
                valid.target_amount,
                valid.duration_secs,
            ),
        };
        let tx_hash = self
            .wallet
            .send_transaction(&tx)
            .await
            .map_err(submission_error)?;
        info!("Campaign transaction sent: {tx_hash}");

        await_receipt(self.wallet.as_ref(), self.confirmation, tx_hash).await
    }
}
