//! Donation requests and the amounts derived from them.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::errors::DonationError;

const WEI_PER_ETH: f64 = 1e18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Eth,
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eth => "ETH",
            Self::Usd => "USD",
        }
    }
}

/// Bit width of the encrypted amount the contract expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiphertextWidth {
    U8,
    U32,
}

impl CiphertextWidth {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::U8),
            32 => Some(Self::U32),
            _ => None,
        }
    }

    pub fn bits(&self) -> u32 {
        match self {
            Self::U8 => 8,
            Self::U32 => 32,
        }
    }

    pub fn max(&self) -> u64 {
        match self {
            Self::U8 => u8::MAX.into(),
            Self::U32 => u32::MAX.into(),
        }
    }
}

/// Maps a USD value onto the ciphertext's integer range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountScale {
    pub width: CiphertextWidth,
    /// USD represented by one ciphertext unit
    pub divisor: f64,
}

impl AmountScale {
    /// `clamp(floor(usd / divisor), 1, width max)`.  Always in range.
    pub fn scale(&self, usd_value: f64) -> u64 {
        let units = (usd_value / self.divisor).floor();
        if units.is_nan() || units < 1.0 {
            return 1;
        }
        let max = self.width.max();
        if units >= max as f64 {
            max
        } else {
            units as u64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRequest {
    pub campaign_id: u64,
    pub raw_amount: f64,
    pub currency: Currency,
    #[serde(default)]
    pub organizer_address: Option<Address>,
    #[serde(default)]
    pub wallet_address: Option<Address>,
}

/// A validated request with every derived amount fixed at one ETH price.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedDonation {
    pub campaign_id: u64,
    pub wallet: Address,
    pub currency: Currency,
    pub raw_amount: f64,
    pub eth_usd: f64,
    pub usd_value: f64,
    pub scaled_amount: u64,
    pub wei_value: U256,
}

impl DonationRequest {
    /// Checks that need no price: connected wallet, positive amount, and a
    /// campaign id the journal can store.
    pub fn precheck(&self) -> Result<Address, DonationError> {
        let wallet = self.wallet_address.ok_or(DonationError::WalletRequired)?;
        if !(self.raw_amount.is_finite() && self.raw_amount > 0.0) {
            return Err(DonationError::InvalidAmount);
        }
        if i64::try_from(self.campaign_id).is_err() {
            return Err(DonationError::InvalidCampaign(format!(
                "campaign id {} is out of range",
                self.campaign_id
            )));
        }
        Ok(wallet)
    }

    pub fn usd_value(&self, eth_usd: f64) -> f64 {
        match self.currency {
            Currency::Usd => self.raw_amount,
            Currency::Eth => self.raw_amount * eth_usd,
        }
    }

    /// Native value attached to the donation transaction.  Never zero: a
    /// conversion that is not a finite positive number is an invalid amount.
    pub fn wei_value(&self, eth_usd: f64) -> Result<U256, DonationError> {
        let eth = match self.currency {
            Currency::Eth => self.raw_amount,
            Currency::Usd => self.raw_amount / eth_usd,
        };
        let wei = (eth * WEI_PER_ETH).floor();
        if wei.is_finite() && wei >= 1.0 {
            Ok(U256::from(wei as u128))
        } else {
            Err(DonationError::InvalidAmount)
        }
    }

    /// Validate against `minimum_usd` and derive every amount.
    pub fn price(
        &self,
        eth_usd: f64,
        scale: &AmountScale,
        minimum_usd: f64,
    ) -> Result<PricedDonation, DonationError> {
        let wallet = self.precheck()?;
        if !(eth_usd.is_finite() && eth_usd > 0.0) {
            return Err(DonationError::Network(format!("unusable ETH price {eth_usd}")));
        }
        let usd_value = self.usd_value(eth_usd);
        if usd_value < minimum_usd {
            return Err(DonationError::BelowMinimum {
                usd_value,
                minimum: minimum_usd,
            });
        }
        Ok(PricedDonation {
            campaign_id: self.campaign_id,
            wallet,
            currency: self.currency,
            raw_amount: self.raw_amount,
            eth_usd,
            usd_value,
            scaled_amount: scale.scale(usd_value),
            wei_value: self.wei_value(eth_usd)?,
        })
    }
}
