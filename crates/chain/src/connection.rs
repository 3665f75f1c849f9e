//! Read-only JSON-RPC access with bounded timeouts.

use crate::error::ChainError;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Timeout applied to every read call.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Wrapper around a JSON-RPC endpoint for read-only queries.
///
/// Providers are built per call from the stored URL; no connection state is
/// kept between calls.
#[derive(Debug, Clone)]
pub struct ChainConnection {
    rpc_url: String,
}

impl ChainConnection {
    /// Create a connection for the given RPC URL.
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
        }
    }

    /// Get the RPC URL.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Build a fresh provider for this endpoint.
    pub fn provider(&self) -> Result<impl Provider + Clone, ChainError> {
        let url = self.rpc_url.parse().map_err(|e| ChainError::InvalidUrl {
            url: self.rpc_url.clone(),
            reason: format!("{e}"),
        })?;
        Ok(ProviderBuilder::new().on_http(url))
    }

    /// Chain id of the connected network.
    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let provider = self.provider()?;
        self.bounded("eth_chainId", async { provider.get_chain_id().await })
            .await
    }

    /// Current market gas price in wei.
    pub async fn gas_price(&self) -> Result<u128, ChainError> {
        let provider = self.provider()?;
        self.bounded("eth_gasPrice", async { provider.get_gas_price().await })
            .await
    }

    /// Current transaction count (next nonce) for an address.
    pub async fn nonce_of(&self, address: Address) -> Result<u64, ChainError> {
        let provider = self.provider()?;
        self.bounded("eth_getTransactionCount", async {
            provider.get_transaction_count(address).await
        })
        .await
    }

    /// Native-currency balance of an address in wei.
    pub async fn balance_of(&self, address: Address) -> Result<U256, ChainError> {
        let provider = self.provider()?;
        self.bounded("eth_getBalance", async { provider.get_balance(address).await })
            .await
    }

    /// Deployed bytecode at an address (empty for EOAs and missing contracts).
    pub async fn code_at(&self, address: Address) -> Result<Bytes, ChainError> {
        let provider = self.provider()?;
        self.bounded("eth_getCode", async { provider.get_code_at(address).await })
            .await
    }

    /// Whether any contract code is deployed at the address.
    pub async fn has_code(&self, address: Address) -> Result<bool, ChainError> {
        Ok(!self.code_at(address).await?.is_empty())
    }

    /// Latest block number.
    pub async fn block_number(&self) -> Result<u64, ChainError> {
        let provider = self.provider()?;
        self.bounded("eth_blockNumber", async { provider.get_block_number().await })
            .await
    }

    /// Verify the endpoint answers; returns (chain_id, block_number).
    pub async fn health_check(&self) -> Result<(u64, u64), ChainError> {
        let chain_id = self.chain_id().await?;
        let block = self.block_number().await?;
        debug!(chain_id, block, "RPC endpoint verified");
        Ok((chain_id, block))
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, alloy::transports::TransportError>>,
    {
        match tokio::time::timeout(READ_TIMEOUT, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ChainError::RpcUnreachable(format!("{what}: {e}"))),
            Err(_) => Err(ChainError::RpcUnreachable(format!(
                "{what}: no response within {}s",
                READ_TIMEOUT.as_secs()
            ))),
        }
    }
}
