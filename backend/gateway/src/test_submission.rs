//! End-to-end runs of the submission flow against mocked SDK, wallet and
//! price feed.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;

use crate::contract::ICharityNexus;
use crate::donation::{AmountScale, CiphertextWidth, Currency, DonationRequest};
use crate::errors::DonationError;
use crate::price::PriceOracle;
use crate::retry::RetryPolicy;
use crate::sdk::bootstrap::SdkBootstrap;
use crate::sdk::loader::SdkLoader;
use crate::submission::{
    DonationSubmitter, SubmissionOutcome, SubmissionStep, SubmitterSettings,
};
use crate::test_support::{
    chain_config, network_config, FixedPrice, LoaderBehavior, MockLoader, MockWallet, TX_HASH,
};
use crate::wallet::WalletError;

const ALL_STEPS: [SubmissionStep; 5] = [
    SubmissionStep::SwitchingNetwork,
    SubmissionStep::BootstrappingSdk,
    SubmissionStep::Encrypting,
    SubmissionStep::Submitting,
    SubmissionStep::Confirming,
];

struct Harness {
    submitter: DonationSubmitter,
    wallet: Arc<MockWallet>,
    price: Arc<FixedPrice>,
}

fn contract() -> Address {
    Address::repeat_byte(0xc3)
}

fn harness(loaders: Vec<Arc<MockLoader>>) -> Harness {
    harness_priced(loaders, FixedPrice::new(2000.0), 3500.0)
}

fn harness_priced(
    loaders: Vec<Arc<MockLoader>>,
    price: Arc<FixedPrice>,
    default_price: f64,
) -> Harness {
    let wallet = MockWallet::new();
    let oracle = PriceOracle::new(price.clone(), Duration::from_secs(300), default_price);
    let bootstrap = SdkBootstrap::new(
        loaders
            .into_iter()
            .map(|l| l as Arc<dyn SdkLoader>)
            .collect(),
        Duration::from_secs(15),
    );
    let settings = SubmitterSettings {
        contract_address: contract(),
        chain: chain_config(),
        fhe: network_config(),
        min_donation_usd: 10.0,
        amount_scale: AmountScale {
            width: CiphertextWidth::U32,
            divisor: 1.0,
        },
        eip712_duration_days: 10,
        confirmation: RetryPolicy::fixed(30, Duration::from_secs(1)),
    };
    Harness {
        submitter: DonationSubmitter::new(
            settings,
            Arc::new(oracle),
            Arc::new(bootstrap),
            wallet.clone(),
        ),
        wallet,
        price,
    }
}

fn request(amount: f64, currency: Currency) -> DonationRequest {
    DonationRequest {
        campaign_id: 3,
        raw_amount: amount,
        currency,
        organizer_address: None,
        wallet_address: Some(Address::repeat_byte(0x42)),
    }
}

#[tokio::test(start_paused = true)]
async fn usd_donation_confirms_with_every_step_in_order() {
    let loader = MockLoader::new("bundle", LoaderBehavior::Succeed);
    let h = harness(vec![loader.clone()]);

    let mut seen = Vec::new();
    let report = h
        .submitter
        .submit(&request(100.0, Currency::Usd), |step| seen.push(step))
        .await;

    assert_eq!(report.outcome, SubmissionOutcome::Confirmed { tx_hash: TX_HASH });
    assert_eq!(seen, ALL_STEPS.to_vec());
    assert_eq!(report.steps, seen);

    let sent = h.wallet.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, contract());
    assert_eq!(sent[0].value, U256::from(50_000_000_000_000_000u128));

    let call = ICharityNexus::makeDonationCall::abi_decode(&sent[0].data, true).unwrap();
    assert_eq!(call.campaignId, U256::from(3));
    assert_eq!(call.inputProof.to_vec(), vec![0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(loader.sdk.probe.last_values(), vec![(32, 100)]);
}

#[tokio::test(start_paused = true)]
async fn below_minimum_never_reaches_sdk_or_wallet() {
    let loader = MockLoader::new("bundle", LoaderBehavior::Succeed);
    let h = harness(vec![loader.clone()]);

    let mut seen = Vec::new();
    let report = h
        .submitter
        .submit(&request(0.001, Currency::Eth), |step| seen.push(step))
        .await;

    match report.outcome {
        SubmissionOutcome::Failed(DonationError::BelowMinimum { usd_value, minimum }) => {
            assert!((usd_value - 2.0).abs() < 1e-9);
            assert_eq!(minimum, 10.0);
        }
        other => panic!("expected BelowMinimum, got {other:?}"),
    }
    assert!(seen.is_empty());
    assert!(report.priced.is_none());
    assert_eq!(loader.calls(), 0);
    assert_eq!(h.wallet.switches(), 0);
    assert_eq!(h.wallet.signatures(), 0);
    assert!(h.wallet.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn small_usd_amount_is_rejected_without_a_price_lookup() {
    let h = harness(vec![MockLoader::new("bundle", LoaderBehavior::Succeed)]);

    let report = h.submitter.submit(&request(5.0, Currency::Usd), |_| {}).await;

    assert!(matches!(
        report.outcome,
        SubmissionOutcome::Failed(DonationError::BelowMinimum { .. })
    ));
    assert_eq!(h.price.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_wallet_is_rejected_first() {
    let h = harness(vec![MockLoader::new("bundle", LoaderBehavior::Succeed)]);
    let mut req = request(-3.0, Currency::Usd);
    req.wallet_address = None;

    let report = h.submitter.submit(&req, |_| {}).await;

    assert_eq!(
        report.outcome,
        SubmissionOutcome::Failed(DonationError::WalletRequired)
    );
    assert_eq!(h.price.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_signature_stops_before_submission() {
    let loader = MockLoader::new("bundle", LoaderBehavior::Succeed);
    let h = harness(vec![loader.clone()]);
    h.wallet.reject_signature();

    let report = h.submitter.submit(&request(100.0, Currency::Usd), |_| {}).await;

    assert!(matches!(
        report.outcome,
        SubmissionOutcome::Failed(DonationError::UserRejected(_))
    ));
    assert_eq!(
        report.steps,
        vec![
            SubmissionStep::SwitchingNetwork,
            SubmissionStep::BootstrappingSdk,
            SubmissionStep::Encrypting,
        ]
    );
    assert!(h.wallet.sent().is_empty());
    assert_eq!(loader.sdk.probe.encrypts(), 0);
}

#[tokio::test(start_paused = true)]
async fn bundle_failure_falls_back_to_module_once() {
    let bundle = MockLoader::new("bundle", LoaderBehavior::Fail);
    let module = MockLoader::new("module", LoaderBehavior::Succeed);
    let h = harness(vec![bundle.clone(), module.clone()]);

    let first = h.submitter.submit(&request(50.0, Currency::Usd), |_| {}).await;
    let second = h.submitter.submit(&request(60.0, Currency::Usd), |_| {}).await;

    assert!(matches!(first.outcome, SubmissionOutcome::Confirmed { .. }));
    assert!(matches!(second.outcome, SubmissionOutcome::Confirmed { .. }));
    assert_eq!(bundle.calls(), 1);
    assert_eq!(module.calls(), 1);
    assert_eq!(module.sdk.probe.initializations(), 1);
}

#[tokio::test(start_paused = true)]
async fn sdk_unavailable_is_terminal() {
    let h = harness(vec![
        MockLoader::new("bundle", LoaderBehavior::Fail),
        MockLoader::new("module", LoaderBehavior::Fail),
    ]);

    let report = h.submitter.submit(&request(50.0, Currency::Usd), |_| {}).await;

    assert!(matches!(
        report.outcome,
        SubmissionOutcome::Failed(DonationError::SdkUnavailable(_))
    ));
    assert_eq!(h.wallet.signatures(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_receipt_times_out_after_exact_bound() {
    let h = harness(vec![MockLoader::new("bundle", LoaderBehavior::Succeed)]);
    h.wallet.receipt_after(None);

    let started = tokio::time::Instant::now();
    let report = h.submitter.submit(&request(100.0, Currency::Usd), |_| {}).await;

    match &report.outcome {
        SubmissionOutcome::Failed(e @ DonationError::ConfirmationTimeout { attempts, .. }) => {
            assert_eq!(*attempts, 30);
            assert!(e.is_ambiguous());
        }
        other => panic!("expected ConfirmationTimeout, got {other:?}"),
    }
    assert_eq!(h.wallet.receipt_polls(), 30);
    assert_eq!(started.elapsed(), Duration::from_secs(29));
    assert_eq!(report.outcome.status(), "pending");
    assert_eq!(report.outcome.tx_hash(), Some(TX_HASH.to_string()));
}

#[tokio::test(start_paused = true)]
async fn late_receipt_still_confirms() {
    let h = harness(vec![MockLoader::new("bundle", LoaderBehavior::Succeed)]);
    h.wallet.receipt_after(Some(5));

    let report = h.submitter.submit(&request(100.0, Currency::Usd), |_| {}).await;

    assert!(matches!(report.outcome, SubmissionOutcome::Confirmed { .. }));
    assert_eq!(h.wallet.receipt_polls(), 6);
}

#[tokio::test(start_paused = true)]
async fn reverted_receipt_is_a_definite_failure() {
    let h = harness(vec![MockLoader::new("bundle", LoaderBehavior::Succeed)]);
    h.wallet.revert();

    let report = h.submitter.submit(&request(100.0, Currency::Usd), |_| {}).await;

    assert!(matches!(
        report.outcome,
        SubmissionOutcome::Failed(DonationError::Reverted { .. })
    ));
    assert_eq!(report.outcome.status(), "failed");
}

#[tokio::test(start_paused = true)]
async fn unknown_chain_is_added_and_flow_continues() {
    let h = harness(vec![MockLoader::new("bundle", LoaderBehavior::Succeed)]);
    h.wallet.fail_switch(WalletError::UnknownChain("Unrecognized chain ID".into()));

    let report = h.submitter.submit(&request(100.0, Currency::Usd), |_| {}).await;

    assert!(matches!(report.outcome, SubmissionOutcome::Confirmed { .. }));
    assert_eq!(h.wallet.switches(), 1);
    assert_eq!(h.wallet.adds(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_switch_is_only_a_warning() {
    let h = harness(vec![MockLoader::new("bundle", LoaderBehavior::Succeed)]);
    h.wallet.fail_switch(WalletError::Rejected("User rejected the request.".into()));

    let report = h.submitter.submit(&request(100.0, Currency::Usd), |_| {}).await;

    assert!(matches!(report.outcome, SubmissionOutcome::Confirmed { .. }));
    assert_eq!(h.wallet.adds(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_add_chain_is_only_a_warning() {
    let h = harness(vec![MockLoader::new("bundle", LoaderBehavior::Succeed)]);
    h.wallet.fail_switch(WalletError::UnknownChain("Unrecognized chain ID".into()));
    h.wallet.fail_add(WalletError::Rejected("User rejected the request.".into()));

    let report = h.submitter.submit(&request(100.0, Currency::Usd), |_| {}).await;

    assert!(matches!(report.outcome, SubmissionOutcome::Confirmed { .. }));
    assert_eq!(h.wallet.adds(), 1);
    assert_eq!(report.steps, ALL_STEPS.to_vec());
}

#[tokio::test(start_paused = true)]
async fn zero_fallback_price_never_sends_a_zero_value_donation() {
    let loader = MockLoader::new("bundle", LoaderBehavior::Succeed);
    let h = harness_priced(vec![loader.clone()], FixedPrice::failing(), 0.0);

    let mut seen = Vec::new();
    let report = h
        .submitter
        .submit(&request(100.0, Currency::Usd), |step| seen.push(step))
        .await;

    assert!(matches!(
        report.outcome,
        SubmissionOutcome::Failed(DonationError::Network(_))
    ));
    assert_eq!(h.price.calls(), 1);
    assert!(seen.is_empty());
    assert_eq!(loader.calls(), 0);
    assert_eq!(loader.sdk.probe.encrypts(), 0);
    assert!(h.wallet.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn insufficient_funds_gets_its_own_failure() {
    let h = harness(vec![MockLoader::new("bundle", LoaderBehavior::Succeed)]);
    h.wallet.fail_send(WalletError::InsufficientFunds(
        "insufficient funds for gas * price + value".into(),
    ));

    let report = h.submitter.submit(&request(100.0, Currency::Usd), |_| {}).await;

    match &report.outcome {
        SubmissionOutcome::Failed(e @ DonationError::InsufficientFunds(_)) => {
            assert!(e.user_message().contains("top up"));
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }
    assert_eq!(h.wallet.receipt_polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn eth_donation_sends_the_entered_value() {
    let loader = MockLoader::new("bundle", LoaderBehavior::Succeed);
    let h = harness(vec![loader.clone()]);

    let report = h.submitter.submit(&request(0.05, Currency::Eth), |_| {}).await;

    assert!(matches!(report.outcome, SubmissionOutcome::Confirmed { .. }));
    let priced = report.priced.unwrap();
    assert!((priced.usd_value - 100.0).abs() < 1e-9);
    assert_eq!(h.wallet.sent()[0].value, U256::from(50_000_000_000_000_000u128));
    assert_eq!(loader.sdk.probe.last_values(), vec![(32, 100)]);
}
