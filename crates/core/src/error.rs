//! Workflow-level error taxonomy.
//!
//! Every failure is diagnosed with a specific kind and reported once;
//! nothing is retried automatically.

use alloy::primitives::{B256, U256};
use repair_api::FeedError;
use repair_chain::{ChainError, RevertReason};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepairError {
    /// Bad or missing configuration, caught before any network call.
    #[error("configuration error: {0}")]
    Config(String),

    /// RPC endpoint or feed service unreachable, or a bounded call timed out.
    #[error("network error: {0}")]
    Network(String),

    /// A contract call reverted; carries the decoded reason when the
    /// selector is known.
    #[error("contract reverted: {0}")]
    ContractRevert(RevertReason),

    /// Sender balance below gas cost plus attached value.
    #[error("insufficient funds: required {required} wei, available {available} wei")]
    InsufficientFunds { required: U256, available: U256 },

    /// `eth_estimateGas` failed for a path that does not allow the fixed
    /// ceiling fallback.
    #[error("gas estimation failed: {0}")]
    GasEstimation(String),

    /// Transaction broadcast but not mined within the receipt window.
    #[error("transaction {hash} not mined within {timeout_secs}s")]
    SubmissionTimeout { hash: B256, timeout_secs: u64 },

    /// Transaction rejected before broadcast, or mined with reverted status.
    #[error("submission failed: {0}")]
    Submission(String),

    /// The Hermes feed returned no usable update.
    #[error("price feed unavailable: {0}")]
    FeedUnavailable(String),

    /// The post-submission read did not confirm the expected state.
    #[error("verification failed: {0}")]
    Verification(String),
}

impl From<ChainError> for RepairError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::RpcUnreachable(msg) => Self::Network(msg),
            ChainError::InvalidUrl { url, reason } => {
                Self::Config(format!("invalid rpc url {url}: {reason}"))
            }
            ChainError::Revert(reason) => Self::ContractRevert(reason),
            ChainError::GasEstimation(msg) => Self::GasEstimation(msg),
            ChainError::InsufficientFunds {
                required,
                available,
            } => Self::InsufficientFunds {
                required,
                available,
            },
            ChainError::SubmissionTimeout { hash, timeout_secs } => {
                Self::SubmissionTimeout { hash, timeout_secs }
            }
            ChainError::Rejected(msg) => Self::Submission(msg),
        }
    }
}

impl From<FeedError> for RepairError {
    fn from(e: FeedError) -> Self {
        Self::FeedUnavailable(e.to_string())
    }
}
