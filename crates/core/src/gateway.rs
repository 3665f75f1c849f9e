//! Production implementations of the workflow seams.
//!
//! [`PythGateway`] issues the typed oracle calls through a
//! [`ContractInvoker`]; [`HermesClient`] doubles as the [`PriceFeed`].

use crate::error::RepairError;
use crate::oracle_update::{OracleGateway, OraclePrice, PriceFeed, ReadOutcome};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use repair_api::{HermesClient, PriceUpdate};
use repair_chain::{gas_limit_or_ceiling, revert_reason, ContractInvoker, IPyth, TxOutcome};
use tracing::warn;

/// Fixed gas ceiling for `updatePriceFeeds` when estimation fails.
///
/// Estimation reverts while the feed is uninitialized on some deployments;
/// the submission is still worth attempting for diagnostic value.
pub const ORACLE_UPDATE_GAS_CEILING: u64 = 150_000;

/// Oracle access backed by a signing invoker.
#[derive(Debug)]
pub struct PythGateway {
    invoker: ContractInvoker,
    oracle: Address,
}

impl PythGateway {
    pub fn new(invoker: ContractInvoker, oracle: Address) -> Self {
        Self { invoker, oracle }
    }

    pub fn oracle_address(&self) -> Address {
        self.oracle
    }
}

#[async_trait]
impl OracleGateway for PythGateway {
    async fn read_price(&self, feed_id: B256) -> Result<ReadOutcome, RepairError> {
        let provider = self.invoker.connection().provider()?;
        let oracle = IPyth::new(self.oracle, provider);

        match oracle.getPriceUnsafe(feed_id).call().await {
            Ok(ret) => Ok(ReadOutcome::Price(OraclePrice {
                raw_price: ret.price.price,
                confidence: ret.price.conf,
                exponent: ret.price.expo,
                publish_time: ret.price.publishTime.saturating_to(),
            })),
            Err(e) => match revert_reason(&e) {
                Some(reason) => Ok(ReadOutcome::Missing(reason)),
                None => Err(RepairError::Network(format!("getPriceUnsafe: {e}"))),
            },
        }
    }

    async fn quote_update_fee(&self, blob: &Bytes) -> Result<U256, RepairError> {
        let provider = self.invoker.connection().provider()?;
        let oracle = IPyth::new(self.oracle, provider);

        match oracle.getUpdateFee(vec![blob.clone()]).call().await {
            Ok(ret) => Ok(ret.feeAmount),
            Err(e) => match revert_reason(&e) {
                Some(reason) => Err(RepairError::ContractRevert(reason)),
                None => Err(RepairError::Network(format!("getUpdateFee: {e}"))),
            },
        }
    }

    async fn submit_update(&self, blob: &Bytes, fee: U256) -> Result<TxOutcome, RepairError> {
        let calldata: Bytes = IPyth::updatePriceFeedsCall {
            updateData: vec![blob.clone()],
        }
        .abi_encode()
        .into();

        let estimate = self
            .invoker
            .estimate_gas(self.oracle, calldata.clone(), fee)
            .await;
        let (gas_limit, used_ceiling) = gas_limit_or_ceiling(estimate, ORACLE_UPDATE_GAS_CEILING);
        if used_ceiling {
            warn!(
                gas_limit,
                "Proceeding with the fixed gas ceiling; the submission may still revert"
            );
        }

        let outcome = self
            .invoker
            .submit(self.oracle, calldata, fee, gas_limit)
            .await?;

        if !outcome.success {
            return Err(RepairError::Submission(format!(
                "update transaction {} was mined but reverted",
                outcome.hash
            )));
        }
        Ok(outcome)
    }
}

#[async_trait]
impl PriceFeed for HermesClient {
    async fn latest_update(&self, feed_id: B256) -> Result<PriceUpdate, RepairError> {
        Ok(self.fetch_latest(feed_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::consensus::{Transaction, TxEnvelope};
    use alloy::eips::eip2718::Decodable2718;
    use alloy::signers::local::PrivateKeySigner;
    use repair_chain::{ChainConnection, FixedGasPrice};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Well-known test key (anvil account 0); never funded on a live network.
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    type SeenCalls = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    /// Local JSON-RPC endpoint where `eth_estimateGas` always reverts, the
    /// account is well funded, and receipts never arrive.
    async fn spawn_rpc_stub() -> (String, SeenCalls) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let seen: SeenCalls = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { return };
                tokio::spawn(serve_connection(stream, Arc::clone(&recorder)));
            }
        });
        (url, seen)
    }

    async fn serve_connection(mut stream: tokio::net::TcpStream, seen: SeenCalls) {
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

            let body = if method == "eth_estimateGas" {
                format!(
                    "{{\"jsonrpc\":\"2.0\",\"id\":{id},\"error\":{{\"code\":-32000,\"message\":\"execution reverted\"}}}}"
                )
            } else {
                let result = match method.as_str() {
                    "eth_chainId" => "\"0x66eee\"".to_string(),
                    "eth_blockNumber" => "\"0x1\"".to_string(),
                    "eth_getTransactionCount" => "\"0x0\"".to_string(),
                    "eth_gasPrice" => "\"0x3b9aca00\"".to_string(),
                    // 1000 ETH
                    "eth_getBalance" => "\"0x3635c9adc5dea00000\"".to_string(),
                    "eth_sendRawTransaction" => format!("\"0x{}\"", "11".repeat(32)),
                    _ => "null".to_string(),
                };
                format!("{{\"jsonrpc\":\"2.0\",\"id\":{id},\"result\":{result}}}")
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );
            if stream.write_all(response.as_bytes()).await.is_err() {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_estimation_failure_still_submits_with_ceiling() {
        let (url, seen) = spawn_rpc_stub().await;
        let signer: PrivateKeySigner = TEST_KEY.parse().unwrap();
        let invoker = ContractInvoker::new(
            ChainConnection::new(url),
            signer,
            421614,
            Box::new(FixedGasPrice(1_000_000_000)),
        )
        .with_receipt_timeout(Duration::from_millis(200));
        let gateway = PythGateway::new(invoker, Address::with_last_byte(8));

        let blob = Bytes::from(vec![0x50, 0x4e, 0x41, 0x55]);
        let err = gateway
            .submit_update(&blob, U256::from(1))
            .await
            .unwrap_err();

        // The broadcast happened; only the receipt wait expired.
        assert!(matches!(err, RepairError::SubmissionTimeout { .. }));

        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(|(method, _)| method == "eth_estimateGas"));
        let (_, params) = seen
            .iter()
            .find(|(method, _)| method == "eth_sendRawTransaction")
            .expect("update was never broadcast");

        let raw = params[0].as_str().unwrap();
        let raw_bytes = hex::decode(raw.trim_start_matches("0x")).unwrap();
        let envelope = TxEnvelope::decode_2718(&mut raw_bytes.as_slice()).unwrap();
        assert_eq!(envelope.gas_limit(), ORACLE_UPDATE_GAS_CEILING);
    }
}
