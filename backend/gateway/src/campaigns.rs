//! On-chain campaign reads and donation aggregation.
//!
//! Per-campaign totals come from `DonationMade` logs over a bounded block
//! window.  The encrypted amount in each log is opaque, so value totals are
//! taken from the native value of the originating transactions.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::contract::{
    campaign_topic, decode_campaign_counter, decode_campaign_info, decode_donation_log,
    donation_made_topic, encode_campaign_counter, encode_get_campaign_info, CampaignInfo,
    DonationLog,
};
use crate::errors::{GatewayError, Result};
use crate::price::PriceOracle;
use crate::rpc::{RawLog, RpcClient};

const WEI_PER_ETH: f64 = 1e18;
/// Upper bound on the up-front allocation for `list`; the count is on-chain data.
const LIST_PREALLOC: u64 = 1_024;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationStats {
    pub campaign_id: u64,
    pub donation_count: usize,
    pub unique_donors: usize,
    /// Sum of native value sent with the donations, in wei (decimal string)
    #[serde(serialize_with = "u256_decimal")]
    pub total_wei: U256,
    pub total_eth: f64,
    pub total_usd: f64,
    pub from_block: u64,
    pub to_block: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSummary {
    #[serde(flatten)]
    pub info: CampaignInfo,
    pub accepting_donations: bool,
    pub stats: Option<DonationStats>,
}

pub struct CampaignReader {
    rpc: Arc<RpcClient>,
    contract: Address,
    price: Arc<PriceOracle>,
    lookback_blocks: u64,
    batch_blocks: u64,
}

impl CampaignReader {
    pub fn new(
        rpc: Arc<RpcClient>,
        contract: Address,
        price: Arc<PriceOracle>,
        lookback_blocks: u64,
        batch_blocks: u64,
    ) -> Self {
        Self {
            rpc,
            contract,
            price,
            lookback_blocks,
            batch_blocks: batch_blocks.max(1),
        }
    }

    pub async fn campaign_count(&self) -> Result<u64> {
        let data = self
            .rpc
            .eth_call(self.contract, &encode_campaign_counter())
            .await?;
        decode_campaign_counter(&data)
    }

    /// Campaign ids run from 0 to `campaign_count() - 1`.
    pub async fn campaign(&self, id: u64) -> Result<CampaignInfo> {
        let count = self.campaign_count().await?;
        if id >= count {
            return Err(GatewayError::NotFound(format!("campaign {id}")));
        }
        let data = self
            .rpc
            .eth_call(self.contract, &encode_get_campaign_info(id))
            .await?;
        decode_campaign_info(id, &data)
    }

    pub async fn donation_stats(&self, campaign_id: u64) -> Result<DonationStats> {
        let latest = self.rpc.block_number().await?;
        let windows = block_windows(latest, self.lookback_blocks, self.batch_blocks);
        let (from_block, to_block) = match (windows.first(), windows.last()) {
            (Some(first), Some(last)) => (first.0, last.1),
            _ => (latest, latest),
        };

        let mut logs = Vec::new();
        for (from, to) in windows {
            match self
                .rpc
                .logs(
                    self.contract,
                    donation_made_topic(),
                    Some(campaign_topic(campaign_id)),
                    from,
                    to,
                )
                .await
            {
                Ok(raw) => logs.extend(decode_contract_logs(self.contract, &raw)),
                Err(e) => warn!("Log scan {from}..={to} for campaign {campaign_id} failed: {e}"),
            }
        }
        debug!("Campaign {campaign_id}: {} donation logs", logs.len());

        let mut values = BTreeMap::new();
        for hash in logs.iter().filter_map(|l| l.tx_hash).collect::<HashSet<_>>() {
            match self.rpc.transaction(hash).await {
                Ok(Some(tx)) => {
                    values.insert(hash, tx.value);
                }
                Ok(None) => warn!("Donation transaction {hash} not found"),
                Err(e) => warn!("Could not fetch donation transaction {hash}: {e}"),
            }
        }

        let eth_usd = self.price.eth_usd().await;
        Ok(aggregate(campaign_id, &logs, &values, eth_usd, from_block, to_block))
    }

    /// Every campaign with its donation stats.  A campaign whose stats
    /// cannot be read is still listed, without stats.
    pub async fn list(&self) -> Result<Vec<CampaignSummary>> {
        let count = self.campaign_count().await?;
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        info!("Loading {count} campaigns");

        let mut out = Vec::with_capacity(prealloc(count));
        for id in 0..count {
            let data = self
                .rpc
                .eth_call(self.contract, &encode_get_campaign_info(id))
                .await?;
            let info = decode_campaign_info(id, &data)?;
            let stats = match self.donation_stats(id).await {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Stats for campaign {id} unavailable: {e}");
                    None
                }
            };
            out.push(CampaignSummary {
                accepting_donations: info.accepts_donations(now),
                info,
                stats,
            });
        }
        Ok(out)
    }
}

/// Decode `DonationMade` logs emitted by `contract`.  Logs from any other
/// address (a node ignoring the filter) and undecodable logs are skipped.
pub fn decode_contract_logs(contract: Address, raw: &[RawLog]) -> Vec<DonationLog> {
    raw.iter()
        .filter(|log| {
            if log.address != contract {
                warn!("Ignoring log from unexpected address {}", log.address);
                return false;
            }
            true
        })
        .filter_map(|log| match decode_donation_log(log) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Skipping undecodable DonationMade log: {e}");
                None
            }
        })
        .collect()
}

fn prealloc(count: u64) -> usize {
    count.min(LIST_PREALLOC) as usize
}

/// Inclusive `[from, to]` windows covering the last `lookback` blocks up to
/// `latest`, each at most `batch` blocks wide.
pub fn block_windows(latest: u64, lookback: u64, batch: u64) -> Vec<(u64, u64)> {
    let batch = batch.max(1);
    let start = latest.saturating_sub(lookback);
    let mut windows = Vec::new();
    let mut from = start;
    while from <= latest {
        let to = from.saturating_add(batch - 1).min(latest);
        windows.push((from, to));
        if to == u64::MAX {
            break;
        }
        from = to + 1;
    }
    windows
}

/// Fold decoded logs into stats.  `values` maps transaction hash to native
/// value; each transaction counts once even if it emitted several logs.
pub fn aggregate(
    campaign_id: u64,
    logs: &[DonationLog],
    values: &BTreeMap<B256, U256>,
    eth_usd: f64,
    from_block: u64,
    to_block: u64,
) -> DonationStats {
    let donors: HashSet<Address> = logs.iter().map(|l| l.donor).collect();
    let hashes: HashSet<B256> = logs.iter().filter_map(|l| l.tx_hash).collect();
    let total_wei = hashes
        .iter()
        .filter_map(|h| values.get(h))
        .fold(U256::ZERO, |acc, v| acc.saturating_add(*v));
    let total_eth = wei_to_eth(total_wei);

    DonationStats {
        campaign_id,
        donation_count: logs.len(),
        unique_donors: donors.len(),
        total_wei,
        total_eth,
        total_usd: total_eth * eth_usd,
        from_block,
        to_block,
    }
}

fn wei_to_eth(wei: U256) -> f64 {
    // Display only; large totals lose precision.
    let wei: u128 = wei.saturating_to();
    wei as f64 / WEI_PER_ETH
}

fn u256_decimal<S: serde::Serializer>(v: &U256, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&v.to_string())
}
