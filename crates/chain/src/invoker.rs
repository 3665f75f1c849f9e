//! Contract call submission: build, price, sign locally, broadcast, poll.

use crate::connection::ChainConnection;
use crate::error::ChainError;
use crate::gas::GasPolicy;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default receipt-polling window. Oracle updates use this; router and swap
/// call sites extend it to 300s.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Terminal result of a mined transaction.
#[derive(Debug, Clone, Copy)]
pub struct TxOutcome {
    pub hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    /// False when the transaction was mined but reverted on-chain.
    pub success: bool,
}

/// Signs and submits contract calls for a single account.
///
/// Transactions are built fresh per submission: the nonce is read from the
/// chain at build time, so a competing transaction consuming it is a
/// failure, never a silent retry.
pub struct ContractInvoker {
    connection: ChainConnection,
    wallet: EthereumWallet,
    address: Address,
    chain_id: u64,
    gas_policy: Box<dyn GasPolicy>,
    receipt_timeout: Duration,
}

impl ContractInvoker {
    /// Create an invoker from a local signer.
    pub fn new(
        connection: ChainConnection,
        signer: PrivateKeySigner,
        chain_id: u64,
        gas_policy: Box<dyn GasPolicy>,
    ) -> Self {
        let address = signer.address();
        Self {
            connection,
            wallet: EthereumWallet::from(signer),
            address,
            chain_id,
            gas_policy,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    /// Extend or shorten the receipt-polling window.
    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// Sender address derived from the signing key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Read-only connection used for prechecks and view calls.
    pub fn connection(&self) -> &ChainConnection {
        &self.connection
    }

    /// Name of the configured gas policy.
    pub fn gas_policy_name(&self) -> &'static str {
        self.gas_policy.policy_name()
    }

    /// Estimate gas for a call from the configured sender.
    ///
    /// Fails when the underlying call would revert; call sites decide
    /// whether to abort or fall back to a fixed ceiling.
    pub async fn estimate_gas(
        &self,
        to: Address,
        calldata: Bytes,
        value: U256,
    ) -> Result<u64, ChainError> {
        let provider = self.connection.provider()?;
        let tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(calldata)
            .with_value(value);

        provider
            .estimate_gas(tx)
            .await
            .map_err(|e| ChainError::GasEstimation(e.to_string()))
    }

    /// Sign and submit a call, then poll for the receipt.
    ///
    /// The balance precheck runs before any broadcast: if the account cannot
    /// cover `gas_limit * gas_price + value` the submission fails with
    /// `InsufficientFunds` client-side. The key never leaves the process;
    /// signing happens locally via the wallet-backed provider.
    pub async fn submit(
        &self,
        to: Address,
        calldata: Bytes,
        value: U256,
        gas_limit: u64,
    ) -> Result<TxOutcome, ChainError> {
        // Nonce must equal the on-chain transaction count at build time.
        let nonce = self.connection.nonce_of(self.address).await?;
        let gas_price = self.gas_policy.gas_price(&self.connection).await?;

        let required = required_balance(gas_limit, gas_price, value);
        let available = self.connection.balance_of(self.address).await?;
        if available < required {
            return Err(ChainError::InsufficientFunds {
                required,
                available,
            });
        }

        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata)
            .with_value(value)
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id);

        info!(
            to = %to,
            nonce,
            gas_limit,
            gas_price_wei = gas_price,
            value_wei = %value,
            gas_policy = self.gas_policy.policy_name(),
            "Submitting transaction"
        );

        let url = self
            .connection
            .rpc_url()
            .parse()
            .map_err(|e| ChainError::InvalidUrl {
                url: self.connection.rpc_url().to_string(),
                reason: format!("{e}"),
            })?;
        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(url);

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| ChainError::Rejected(e.to_string()))?;
        let hash = *pending.tx_hash();

        info!(tx_hash = %hash, "Transaction broadcast, waiting for inclusion");

        let receipt = pending
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .map_err(|_| ChainError::SubmissionTimeout {
                hash,
                timeout_secs: self.receipt_timeout.as_secs(),
            })?;

        let outcome = TxOutcome {
            hash,
            block_number: receipt.block_number.unwrap_or(0),
            gas_used: receipt.gas_used as u64,
            success: receipt.status(),
        };

        if outcome.success {
            info!(
                tx_hash = %hash,
                block = outcome.block_number,
                gas_used = outcome.gas_used,
                "Transaction confirmed"
            );
        } else {
            warn!(
                tx_hash = %hash,
                block = outcome.block_number,
                gas_used = outcome.gas_used,
                "Transaction reverted on-chain"
            );
        }

        Ok(outcome)
    }
}

impl std::fmt::Debug for ContractInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractInvoker")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.connection.rpc_url())
            .field("gas_policy", &self.gas_policy.policy_name())
            .finish_non_exhaustive()
    }
}

/// Wei needed to cover worst-case gas plus the attached value.
pub fn required_balance(gas_limit: u64, gas_price: u128, value: U256) -> U256 {
    U256::from(gas_limit) * U256::from(gas_price) + value
}

/// Add a 20% buffer to a gas estimate.
pub fn buffered_gas_limit(estimate: u64) -> u64 {
    estimate + estimate / 5
}

/// Resolve the gas limit from an estimation result.
///
/// On success the estimate gets the standard buffer; on failure the fixed
/// ceiling is used so the submission can still proceed for diagnostics.
/// Returns the limit and whether the ceiling fallback was taken.
pub fn gas_limit_or_ceiling(estimate: Result<u64, ChainError>, ceiling: u64) -> (u64, bool) {
    match estimate {
        Ok(units) => {
            debug!(estimated = units, "Gas estimation succeeded");
            (buffered_gas_limit(units), false)
        }
        Err(e) => {
            warn!(
                error = %e,
                ceiling,
                "Gas estimation failed, falling back to fixed ceiling"
            );
            (ceiling, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::FixedGasPrice;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Well-known test key (anvil account 0); never funded on a live network.
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    type SeenCalls = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    /// Minimal local JSON-RPC endpoint recording every method call.
    async fn spawn_rpc_stub(balance: &'static str) -> (String, SeenCalls) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let seen: SeenCalls = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { return };
                tokio::spawn(serve_connection(stream, Arc::clone(&recorder), balance));
            }
        });
        (url, seen)
    }

    async fn serve_connection(
        mut stream: tokio::net::TcpStream,
        seen: SeenCalls,
        balance: &'static str,
    ) {
        let mut buf = Vec::new();
        loop {
            let header_end = loop {
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                let mut chunk = [0u8; 1024];
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            };

            let mut content_length = 0usize;
            for line in String::from_utf8_lossy(&buf[..header_end]).lines() {
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }
            while buf.len() < header_end + content_length {
                let mut chunk = [0u8; 1024];
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }

            let request: serde_json::Value =
                serde_json::from_slice(&buf[header_end..header_end + content_length]).unwrap();
            buf.drain(..header_end + content_length);

            let method = request["method"].as_str().unwrap_or_default().to_string();
            let id = request["id"].clone();
            seen.lock().unwrap().push((method.clone(), request["params"].clone()));

            let result = match method.as_str() {
                "eth_chainId" => "\"0x66eee\"".to_string(),
                "eth_blockNumber" => "\"0x1\"".to_string(),
                "eth_getTransactionCount" => "\"0x0\"".to_string(),
                "eth_gasPrice" => "\"0x3b9aca00\"".to_string(),
                "eth_getBalance" => format!("\"{balance}\""),
                "eth_estimateGas" => "\"0xea60\"".to_string(),
                "eth_sendRawTransaction" => format!("\"0x{}\"", "11".repeat(32)),
                _ => "null".to_string(),
            };
            let body = format!("{{\"jsonrpc\":\"2.0\",\"id\":{id},\"result\":{result}}}");
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );
            if stream.write_all(response.as_bytes()).await.is_err() {
                return;
            }
        }
    }

    #[test]
    fn test_required_balance() {
        // 100_000 gas * 2 gwei + 1 wei value
        let required = required_balance(100_000, 2_000_000_000, U256::from(1));
        assert_eq!(required, U256::from(200_000_000_000_000u128) + U256::from(1));

        // Exactly equal balance passes the `<` precheck, one wei less fails.
        let balance = required - U256::from(1);
        assert!(balance < required);
    }

    #[test]
    fn test_buffered_gas_limit() {
        assert_eq!(buffered_gas_limit(100_000), 120_000);
        assert_eq!(buffered_gas_limit(0), 0);
    }

    #[test]
    fn test_gas_limit_or_ceiling() {
        let (limit, fallback) = gas_limit_or_ceiling(Ok(61_531), 150_000);
        assert_eq!(limit, 73_837);
        assert!(!fallback);

        let (limit, fallback) = gas_limit_or_ceiling(
            Err(ChainError::GasEstimation("execution reverted".into())),
            150_000,
        );
        assert_eq!(limit, 150_000);
        assert!(fallback);
    }

    #[tokio::test]
    async fn test_submit_underfunded_fails_before_broadcast() {
        // 1 wei on hand, 100_000 gas at 1 gwei required.
        let (url, seen) = spawn_rpc_stub("0x1").await;
        let signer: PrivateKeySigner = TEST_KEY.parse().unwrap();
        let invoker = ContractInvoker::new(
            ChainConnection::new(url),
            signer,
            421614,
            Box::new(FixedGasPrice(1_000_000_000)),
        );

        let err = invoker
            .submit(Address::with_last_byte(9), Bytes::new(), U256::ZERO, 100_000)
            .await
            .unwrap_err();

        assert!(matches!(err, ChainError::InsufficientFunds { .. }));
        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(|(method, _)| method == "eth_getBalance"));
        assert!(seen.iter().all(|(method, _)| method != "eth_sendRawTransaction"));
    }

    #[test]
    fn test_invoker_address_from_key() {
        let signer: PrivateKeySigner = TEST_KEY.parse().unwrap();
        let invoker = ContractInvoker::new(
            ChainConnection::new("http://127.0.0.1:8545"),
            signer,
            421614,
            Box::new(FixedGasPrice(1_000_000_000)),
        );

        assert_eq!(
            format!("{:?}", invoker.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(invoker.gas_policy_name(), "Fixed");
    }
}
