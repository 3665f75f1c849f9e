//! Typed errors for the chain interaction layer.

use crate::contracts::RevertReason;
use alloy::primitives::{B256, U256};
use thiserror::Error;

/// Errors surfaced by [`crate::ChainConnection`] and [`crate::ContractInvoker`].
#[derive(Debug, Error)]
pub enum ChainError {
    /// The RPC endpoint did not respond within the bounded timeout, or the
    /// transport failed outright.
    #[error("rpc endpoint unreachable: {0}")]
    RpcUnreachable(String),

    /// The configured RPC URL could not be parsed.
    #[error("invalid rpc url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A view call or submission reverted on-chain.
    #[error("contract reverted: {0}")]
    Revert(RevertReason),

    /// `eth_estimateGas` failed; the underlying call would revert.
    #[error("gas estimation failed: {0}")]
    GasEstimation(String),

    /// Client-side precheck: balance does not cover gas + value.
    #[error("insufficient funds: required {required} wei, available {available} wei")]
    InsufficientFunds { required: U256, available: U256 },

    /// The transaction was broadcast but not mined within the receipt window.
    #[error("transaction {hash} not mined within {timeout_secs}s")]
    SubmissionTimeout { hash: B256, timeout_secs: u64 },

    /// The transaction was rejected before broadcast (bad nonce, underpriced,
    /// malformed payload).
    #[error("transaction rejected by node: {0}")]
    Rejected(String),
}
