//! Gas-price policy for transaction submission.
//!
//! Two policies exist: a fixed price, and the current market price with a
//! 1.2x buffer. The buffer is a deliberate upward adjustment to reduce the
//! chance of being under-priced during congestion, at the cost of
//! overpaying.

use crate::connection::ChainConnection;
use crate::error::ChainError;
use async_trait::async_trait;
use std::fmt::Debug;
use tracing::debug;

/// Default buffer applied to the market gas price.
pub const DEFAULT_GAS_PRICE_BUFFER: f64 = 1.2;

/// Trait for gas pricing policies.
#[async_trait]
pub trait GasPolicy: Send + Sync + Debug {
    /// Resolve the gas price in wei to attach to the next submission.
    async fn gas_price(&self, connection: &ChainConnection) -> Result<u128, ChainError>;

    /// Policy name for logging.
    fn policy_name(&self) -> &'static str;
}

/// Always use a fixed gas price.
#[derive(Debug, Clone, Copy)]
pub struct FixedGasPrice(pub u128);

#[async_trait]
impl GasPolicy for FixedGasPrice {
    async fn gas_price(&self, _connection: &ChainConnection) -> Result<u128, ChainError> {
        Ok(self.0)
    }

    fn policy_name(&self) -> &'static str {
        "Fixed"
    }
}

/// Fetch the market gas price and apply a multiplicative buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferedGasPrice {
    multiplier: f64,
}

impl BufferedGasPrice {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl Default for BufferedGasPrice {
    fn default() -> Self {
        Self::new(DEFAULT_GAS_PRICE_BUFFER)
    }
}

/// Apply a multiplicative buffer to a gas price.
pub fn buffered_price(market_price: u128, multiplier: f64) -> u128 {
    (market_price as f64 * multiplier) as u128
}

#[async_trait]
impl GasPolicy for BufferedGasPrice {
    async fn gas_price(&self, connection: &ChainConnection) -> Result<u128, ChainError> {
        let market = connection.gas_price().await?;
        let buffered = buffered_price(market, self.multiplier);
        debug!(
            market_wei = market,
            buffered_wei = buffered,
            multiplier = self.multiplier,
            "Resolved buffered gas price"
        );
        Ok(buffered)
    }

    fn policy_name(&self) -> &'static str {
        "Buffered"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_price_math() {
        // 1 gwei market * 1.2 = 1.2 gwei
        assert_eq!(buffered_price(1_000_000_000, 1.2), 1_200_000_000);
        assert_eq!(buffered_price(0, 1.2), 0);
        // Identity multiplier leaves the price untouched
        assert_eq!(buffered_price(7_777, 1.0), 7_777);
    }

    #[tokio::test]
    async fn test_fixed_policy_ignores_connection() {
        let conn = ChainConnection::new("http://127.0.0.1:1");
        let policy = FixedGasPrice(42);
        assert_eq!(policy.gas_price(&conn).await.unwrap(), 42);
        assert_eq!(policy.policy_name(), "Fixed");
    }

    #[test]
    fn test_policy_names() {
        assert_eq!(BufferedGasPrice::default().policy_name(), "Buffered");
    }
}
