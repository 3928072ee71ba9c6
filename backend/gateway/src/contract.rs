//! CharityNexus contract ABI: calldata encoding and return/log decoding.
//!
//! Encrypted amount fields are opaque `bytes32` ciphertext handles; this
//! module never interprets them.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use serde::Serialize;

use crate::errors::{GatewayError, Result};
use crate::rpc::RawLog;

sol! {
    #[allow(missing_docs)]
    interface ICharityNexus {
        function makeDonation(uint256 campaignId, bytes32 encryptedAmount, bytes inputProof) external payable;

        function createCampaign(string name, string description, uint256 targetAmount, uint256 duration) external;

        function campaignCounter() external view returns (uint256);

        function getCampaignInfo(uint256 campaignId) external view returns (
            string name,
            string description,
            uint32 targetAmount,
            uint32 currentAmount,
            uint32 donorCount,
            bool isActive,
            bool isVerified,
            address organizer,
            uint256 startTime,
            uint256 endTime
        );

        event DonationMade(uint256 indexed donationId, uint256 indexed campaignId, address indexed donor, uint32 amount);
    }
}

use ICharityNexus::{
    campaignCounterCall, createCampaignCall, getCampaignInfoCall, makeDonationCall, DonationMade,
};

/// Public fields of a campaign as returned by `getCampaignInfo`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignInfo {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub target_amount: u32,
    pub current_amount: u32,
    pub donor_count: u32,
    pub is_active: bool,
    pub is_verified: bool,
    pub organizer: Address,
    /// Unix seconds
    pub start_time: u64,
    /// Unix seconds
    pub end_time: u64,
}

impl CampaignInfo {
    /// True while the campaign accepts donations at `now` (Unix seconds).
    pub fn accepts_donations(&self, now: u64) -> bool {
        self.is_active && now >= self.start_time && now <= self.end_time
    }
}

/// A decoded `DonationMade` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationLog {
    pub donation_id: U256,
    pub campaign_id: U256,
    pub donor: Address,
    pub amount: u32,
    pub tx_hash: Option<B256>,
}

pub fn encode_make_donation(campaign_id: u64, encrypted_amount: B256, input_proof: Bytes) -> Bytes {
    makeDonationCall {
        campaignId: U256::from(campaign_id),
        encryptedAmount: encrypted_amount,
        inputProof: input_proof,
    }
    .abi_encode()
    .into()
}

/// `targetAmount` is in whole USD; `duration` in seconds.
pub fn encode_create_campaign(
    name: &str,
    description: &str,
    target_amount: u32,
    duration_secs: u64,
) -> Bytes {
    createCampaignCall {
        name: name.to_string(),
        description: description.to_string(),
        targetAmount: U256::from(target_amount),
        duration: U256::from(duration_secs),
    }
    .abi_encode()
    .into()
}

pub fn encode_campaign_counter() -> Vec<u8> {
    campaignCounterCall {}.abi_encode()
}

pub fn decode_campaign_counter(data: &[u8]) -> Result<u64> {
    let ret = campaignCounterCall::abi_decode_returns(data, true)
        .map_err(|e| GatewayError::Abi(format!("campaignCounter: {e}")))?;
    Ok(ret._0.saturating_to())
}

pub fn encode_get_campaign_info(campaign_id: u64) -> Vec<u8> {
    getCampaignInfoCall {
        campaignId: U256::from(campaign_id),
    }
    .abi_encode()
}

pub fn decode_campaign_info(campaign_id: u64, data: &[u8]) -> Result<CampaignInfo> {
    let r = getCampaignInfoCall::abi_decode_returns(data, true)
        .map_err(|e| GatewayError::Abi(format!("getCampaignInfo({campaign_id}): {e}")))?;
    Ok(CampaignInfo {
        id: campaign_id,
        name: r.name,
        description: r.description,
        target_amount: r.targetAmount,
        current_amount: r.currentAmount,
        donor_count: r.donorCount,
        is_active: r.isActive,
        is_verified: r.isVerified,
        organizer: r.organizer,
        start_time: r.startTime.saturating_to(),
        end_time: r.endTime.saturating_to(),
    })
}

pub fn donation_made_topic() -> B256 {
    DonationMade::SIGNATURE_HASH
}

/// Topic filter value for an indexed `uint256 campaignId`.
pub fn campaign_topic(campaign_id: u64) -> B256 {
    B256::from(U256::from(campaign_id))
}

pub fn decode_donation_log(log: &RawLog) -> Result<DonationLog> {
    let ev = DonationMade::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(|e| GatewayError::Abi(format!("DonationMade: {e}")))?;
    Ok(DonationLog {
        donation_id: ev.donationId,
        campaign_id: ev.campaignId,
        donor: ev.donor,
        amount: ev.amount,
        tx_hash: log.transaction_hash,
    })
}
