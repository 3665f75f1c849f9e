//! Oracle repair workflow.
//!
//! Drives the diagnose/fetch/submit/verify sequence for a feed that the
//! on-chain Pyth oracle reverts on with `PriceFeedNotFound`. The machine
//! runs against two seams, [`OracleGateway`] and [`PriceFeed`], so the
//! terminal states can be exercised without a network.

use crate::error::RepairError;
use alloy::primitives::{Bytes, B256, U256};
use async_trait::async_trait;
use repair_api::{scaled_decimal, PriceUpdate};
use repair_chain::{RevertReason, TxOutcome};
use std::fmt;
use tracing::{info, warn};

/// Price currently stored by the oracle for a feed.
#[derive(Debug, Clone, Copy)]
pub struct OraclePrice {
    pub raw_price: i64,
    pub confidence: u64,
    pub exponent: i32,
    pub publish_time: u64,
}

impl OraclePrice {
    /// Human-readable value, raw_price scaled by 10^exponent.
    pub fn display_value(&self) -> String {
        match scaled_decimal(self.raw_price as i128, self.exponent) {
            Ok(value) => value.normalize().to_string(),
            Err(_) => format!("{}e{}", self.raw_price, self.exponent),
        }
    }
}

/// Result of a `getPriceUnsafe` read.
///
/// A revert is evidence of missing feed data, not a fatal error; it advances
/// the workflow instead of aborting it.
#[derive(Debug)]
pub enum ReadOutcome {
    Price(OraclePrice),
    Missing(RevertReason),
}

/// On-chain side of the repair: reads, fee quotes, and update submission.
#[async_trait]
pub trait OracleGateway: Send + Sync {
    async fn read_price(&self, feed_id: B256) -> Result<ReadOutcome, RepairError>;
    async fn quote_update_fee(&self, blob: &Bytes) -> Result<U256, RepairError>;
    async fn submit_update(&self, blob: &Bytes, fee: U256) -> Result<TxOutcome, RepairError>;
}

/// Off-chain side: fetch the latest signed update for a feed.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn latest_update(&self, feed_id: B256) -> Result<PriceUpdate, RepairError>;
}

/// Workflow phases, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Diagnosing,
    Reading,
    Fetching,
    FeeChecking,
    Submitting,
    Verifying,
    Succeeded,
    Failed,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Diagnosing => "Diagnosing",
            Self::Reading => "Reading",
            Self::Fetching => "Fetching",
            Self::FeeChecking => "FeeChecking",
            Self::Submitting => "Submitting",
            Self::Verifying => "Verifying",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// How the run ended when it succeeded.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The oracle already served a price; nothing was fetched or submitted.
    AlreadyFresh(OraclePrice),
    /// An update was submitted and the follow-up read confirmed it.
    Updated {
        outcome: TxOutcome,
        verified: OraclePrice,
    },
}

/// One-shot repair run for a single feed id.
pub struct OracleUpdateWorkflow<G, F> {
    gateway: G,
    feed: F,
    feed_id: B256,
    state: WorkflowState,
}

impl<G: OracleGateway, F: PriceFeed> OracleUpdateWorkflow<G, F> {
    pub fn new(gateway: G, feed: F, feed_id: B256) -> Self {
        Self {
            gateway,
            feed,
            feed_id,
            state: WorkflowState::Idle,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Run the full sequence once. No retries; the operator reruns on
    /// failure.
    pub async fn run(&mut self) -> Result<UpdateOutcome, RepairError> {
        match self.execute().await {
            Ok(outcome) => {
                self.enter(WorkflowState::Succeeded);
                Ok(outcome)
            }
            Err(e) => {
                self.enter(WorkflowState::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<UpdateOutcome, RepairError> {
        self.enter(WorkflowState::Diagnosing);
        info!(
            feed_id = %self.feed_id,
            "A PriceFeedNotFound revert means the feed was never pushed to this \
             oracle deployment; pushing one signed update initializes it"
        );

        self.enter(WorkflowState::Reading);
        match self.gateway.read_price(self.feed_id).await? {
            ReadOutcome::Price(price) => {
                info!(
                    value = %price.display_value(),
                    publish_time = price.publish_time,
                    "Oracle already serves this feed, nothing to repair"
                );
                return Ok(UpdateOutcome::AlreadyFresh(price));
            }
            ReadOutcome::Missing(reason) => {
                warn!(reason = %reason, "Oracle has no usable price for this feed");
            }
        }

        self.enter(WorkflowState::Fetching);
        let update = self.feed.latest_update(self.feed_id).await?;
        info!(
            value = %update.derived_price().map(|d| d.normalize().to_string()).unwrap_or_default(),
            publish_time = update.publish_time,
            blob_bytes = update.update_blob.len(),
            "Fetched signed update from Hermes"
        );

        self.enter(WorkflowState::FeeChecking);
        let fee = self.gateway.quote_update_fee(&update.update_blob).await?;
        info!(fee_wei = %fee, "Oracle quoted the update fee");

        self.enter(WorkflowState::Submitting);
        let outcome = self.gateway.submit_update(&update.update_blob, fee).await?;

        self.enter(WorkflowState::Verifying);
        match self.gateway.read_price(self.feed_id).await? {
            ReadOutcome::Price(verified) => {
                info!(
                    value = %verified.display_value(),
                    publish_time = verified.publish_time,
                    tx_hash = %outcome.hash,
                    "Oracle now serves the feed"
                );
                Ok(UpdateOutcome::Updated { outcome, verified })
            }
            ReadOutcome::Missing(reason) => Err(RepairError::Verification(format!(
                "oracle still reverts after update {}: {reason}",
                outcome.hash
            ))),
        }
    }

    fn enter(&mut self, next: WorkflowState) {
        info!(from = %self.state, to = %next, "Workflow transition");
        self.state = next;
    }
}
