//! Application-wide error types.
//!
//! [`GatewayError`] covers infrastructure failures (HTTP, JSON, database,
//! configuration).  [`DonationError`] is the user-facing taxonomy of a
//! donation attempt; every variant maps to its own message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Price feed error: {0}")]
    Price(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Why a donation attempt did not end in `Confirmed`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DonationError {
    #[error("wallet not connected")]
    WalletRequired,

    #[error("donation amount must be a positive number")]
    InvalidAmount,

    #[error("invalid campaign: {0}")]
    InvalidCampaign(String),

    #[error("donation of ${usd_value:.2} is below the ${minimum:.2} minimum")]
    BelowMinimum { usd_value: f64, minimum: f64 },

    #[error("encryption SDK unavailable: {0}")]
    SdkUnavailable(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("rejected in wallet: {0}")]
    UserRejected(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("transaction submission failed: {0}")]
    SubmissionFailed(String),

    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("no receipt for {tx_hash} after {attempts} attempts")]
    ConfirmationTimeout { tx_hash: String, attempts: u32 },

    #[error("network error: {0}")]
    Network(String),
}

impl DonationError {
    /// Message shown to the donor.  Each failure gets its own wording so the
    /// caller can tell "top up funds" apart from "click again".
    pub fn user_message(&self) -> String {
        match self {
            Self::WalletRequired => "Please connect your wallet first.".to_string(),
            Self::InvalidAmount => "Please enter a valid donation amount.".to_string(),
            Self::InvalidCampaign(reason) => format!("Please check the campaign details: {reason}."),
            Self::BelowMinimum { minimum, .. } => {
                format!("Minimum donation amount is ${minimum:.0} USD equivalent.")
            }
            Self::SdkUnavailable(_) => {
                "Encryption is unavailable right now. Please reload and try again later."
                    .to_string()
            }
            Self::EncryptionFailed(_) => {
                "Your donation amount could not be encrypted. Please try a different amount."
                    .to_string()
            }
            Self::UserRejected(_) => {
                "The request was declined in your wallet. Click donate again to retry.".to_string()
            }
            Self::InsufficientFunds(_) => {
                "Your wallet does not hold enough ETH for this donation plus gas. Please top up and retry."
                    .to_string()
            }
            Self::SubmissionFailed(reason) => format!("The transaction was not sent: {reason}"),
            Self::Reverted { tx_hash } => {
                format!("The transaction {tx_hash} was mined but reverted; no funds were donated.")
            }
            Self::ConfirmationTimeout { tx_hash, .. } => {
                format!(
                    "Transaction {tx_hash} was sent but is not confirmed yet. It may still complete; check the explorer before donating again."
                )
            }
            Self::Network(_) => "A network error occurred. Please try again.".to_string(),
        }
    }

    /// True when the outcome is unknown rather than a definite failure.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::ConfirmationTimeout { .. })
    }

    /// True for failures detected before any network interaction.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::WalletRequired
                | Self::InvalidAmount
                | Self::InvalidCampaign(_)
                | Self::BelowMinimum { .. }
        )
    }

    /// Short machine-readable tag, stored in the journal and returned by the API.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WalletRequired => "wallet_required",
            Self::InvalidAmount => "invalid_amount",
            Self::InvalidCampaign(_) => "invalid_campaign",
            Self::BelowMinimum { .. } => "below_minimum",
            Self::SdkUnavailable(_) => "sdk_unavailable",
            Self::EncryptionFailed(_) => "encryption_failed",
            Self::UserRejected(_) => "user_rejected",
            Self::InsufficientFunds(_) => "insufficient_funds",
            Self::SubmissionFailed(_) => "submission_failed",
            Self::Reverted { .. } => "reverted",
            Self::ConfirmationTimeout { .. } => "confirmation_timeout",
            Self::Network(_) => "network_error",
        }
    }
}
