//! Pyth Hermes API client for signed price updates.

use alloy::primitives::{Bytes, B256};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Public Hermes endpoint operated by the Pyth network.
pub const DEFAULT_HERMES_URL: &str = "https://hermes.pyth.network";

/// Per-request timeout for feed reads.
const FEED_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors surfaced by the feed client.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The service could not be reached, timed out, or the response lacked
    /// the binary/parsed sections.
    #[error("price feed service unavailable: {0}")]
    Unavailable(String),

    /// The response arrived but a numeric field did not parse.
    #[error("malformed feed response: {0}")]
    Parse(String),
}

/// A signed price update fetched from Hermes.
///
/// Immutable once fetched; lifetime is one workflow invocation.
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    /// 32-byte feed identifier this update belongs to.
    pub feed_id: B256,
    /// Price mantissa as published by the feed.
    pub raw_price: i64,
    /// Decimal exponent; derived value = raw_price * 10^exponent.
    pub exponent: i32,
    /// Confidence interval mantissa, scaled identically to the price.
    pub confidence: u64,
    /// Unix timestamp of publication.
    pub publish_time: i64,
    /// Opaque signed payload accepted by the on-chain oracle.
    pub update_blob: Bytes,
}

impl PriceUpdate {
    /// Exact derived price: raw_price * 10^exponent with decimal arithmetic,
    /// never floating rounding of the mantissa.
    pub fn derived_price(&self) -> Result<Decimal, FeedError> {
        scaled_decimal(i128::from(self.raw_price), self.exponent)
    }

    /// Confidence interval scaled the same way as the price.
    pub fn derived_confidence(&self) -> Result<Decimal, FeedError> {
        scaled_decimal(i128::from(self.confidence), self.exponent)
    }
}

/// Scale a feed mantissa by a power of ten without losing precision.
pub fn scaled_decimal(raw: i128, expo: i32) -> Result<Decimal, FeedError> {
    if expo <= 0 {
        Decimal::try_from_i128_with_scale(raw, expo.unsigned_abs())
            .map_err(|e| FeedError::Parse(format!("exponent {expo} out of range: {e}")))
    } else {
        let mut value = Decimal::try_from_i128_with_scale(raw, 0)
            .map_err(|e| FeedError::Parse(format!("mantissa {raw} out of range: {e}")))?;
        for _ in 0..expo {
            value = value
                .checked_mul(Decimal::TEN)
                .ok_or_else(|| FeedError::Parse(format!("{raw}e{expo} overflows")))?;
        }
        Ok(value)
    }
}

/// Hermes price-feed client.
#[derive(Debug, Clone)]
pub struct HermesClient {
    client: reqwest::Client,
    base_url: String,
}

impl HermesClient {
    /// Create a client against the public Hermes endpoint.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_HERMES_URL)
    }

    /// Create a client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch the latest signed update and parsed price for one feed.
    #[instrument(skip(self), fields(feed_id = %feed_id))]
    pub async fn fetch_latest(&self, feed_id: B256) -> Result<PriceUpdate, FeedError> {
        let url = format!("{}/v2/updates/price/latest", self.base_url);

        debug!(url = %url, "Fetching latest price update from Hermes");

        let response = self
            .client
            .get(&url)
            .query(&[("ids[]", format!("{feed_id}")), ("encoding", "hex".into())])
            .timeout(FEED_TIMEOUT)
            .send()
            .await
            .map_err(|e| FeedError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        let body: LatestPriceResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Unavailable(format!("invalid JSON body: {e}")))?;

        let update = parse_update(feed_id, body)?;

        info!(
            feed_id = %feed_id,
            raw_price = update.raw_price,
            expo = update.exponent,
            publish_time = update.publish_time,
            blob_len = update.update_blob.len(),
            "Fetched price update"
        );

        Ok(update)
    }
}

impl Default for HermesClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire format of `GET /v2/updates/price/latest`.
#[derive(Debug, Deserialize)]
struct LatestPriceResponse {
    binary: Option<BinarySection>,
    parsed: Option<Vec<ParsedUpdate>>,
}

#[derive(Debug, Deserialize)]
struct BinarySection {
    #[serde(default)]
    data: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ParsedUpdate {
    price: RawPrice,
}

/// Price and confidence arrive as decimal strings; expo and publish_time as
/// numbers.
#[derive(Debug, Deserialize)]
struct RawPrice {
    price: String,
    conf: String,
    expo: i32,
    publish_time: i64,
}

fn parse_update(feed_id: B256, body: LatestPriceResponse) -> Result<PriceUpdate, FeedError> {
    let blob_hex = body
        .binary
        .and_then(|b| b.data.into_iter().next())
        .ok_or_else(|| FeedError::Unavailable("no binary data in response".into()))?;

    let parsed = body
        .parsed
        .and_then(|p| p.into_iter().next())
        .ok_or_else(|| FeedError::Unavailable("no parsed section in response".into()))?;

    let raw_price = parsed
        .price
        .price
        .parse::<i64>()
        .map_err(|e| FeedError::Parse(format!("price {:?}: {e}", parsed.price.price)))?;
    let confidence = parsed
        .price
        .conf
        .parse::<u64>()
        .map_err(|e| FeedError::Parse(format!("conf {:?}: {e}", parsed.price.conf)))?;

    let blob = hex::decode(blob_hex.trim_start_matches("0x"))
        .map_err(|e| FeedError::Parse(format!("update blob is not hex: {e}")))?;

    Ok(PriceUpdate {
        feed_id,
        raw_price,
        exponent: parsed.price.expo,
        confidence,
        publish_time: parsed.price.publish_time,
        update_blob: Bytes::from(blob),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;

    const ETH_USD: B256 =
        b256!("ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace");

    fn sample_body(price: &str, conf: &str, expo: i32) -> LatestPriceResponse {
        serde_json::from_str(&format!(
            r#"{{
                "binary": {{ "encoding": "hex", "data": ["0x504e4155"] }},
                "parsed": [{{
                    "id": "ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace",
                    "price": {{
                        "price": "{price}",
                        "conf": "{conf}",
                        "expo": {expo},
                        "publish_time": 1718000000
                    }}
                }}]
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_derived_price_is_exact() {
        let update = parse_update(ETH_USD, sample_body("300000000000", "150000000", -8)).unwrap();

        // 300000000000 * 10^-8 == 3000.00 exactly
        assert_eq!(update.derived_price().unwrap(), Decimal::new(3000, 0));
        assert_eq!(update.derived_confidence().unwrap(), Decimal::new(15, 1));
        assert_eq!(update.publish_time, 1718000000);
        assert_eq!(update.update_blob.as_ref(), &[0x50, 0x4e, 0x41, 0x55]);
    }

    #[test]
    fn test_positive_exponent() {
        assert_eq!(scaled_decimal(42, 3).unwrap(), Decimal::new(42_000, 0));
        assert_eq!(scaled_decimal(-7, 2).unwrap(), Decimal::new(-700, 0));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let body: LatestPriceResponse = serde_json::from_str(
            r#"{ "parsed": [{ "price": { "price": "1", "conf": "1", "expo": 0, "publish_time": 0 } }] }"#,
        )
        .unwrap();

        match parse_update(ETH_USD, body) {
            Err(FeedError::Unavailable(_)) => {}
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_parsed_is_unavailable() {
        let body: LatestPriceResponse =
            serde_json::from_str(r#"{ "binary": { "data": ["0x00"] } }"#).unwrap();

        assert!(matches!(
            parse_update(ETH_USD, body),
            Err(FeedError::Unavailable(_))
        ));
    }

    #[test]
    fn test_non_numeric_price_is_parse_error() {
        let body = sample_body("not-a-number", "0", -8);
        assert!(matches!(parse_update(ETH_USD, body), Err(FeedError::Parse(_))));
    }

    #[test]
    fn test_blob_hex_without_prefix() {
        let body: LatestPriceResponse = serde_json::from_str(
            r#"{
                "binary": { "data": ["504e41"] },
                "parsed": [{ "price": { "price": "5", "conf": "1", "expo": -2, "publish_time": 10 } }]
            }"#,
        )
        .unwrap();

        let update = parse_update(ETH_USD, body).unwrap();
        assert_eq!(update.update_blob.len(), 3);
        assert_eq!(update.derived_price().unwrap(), Decimal::new(5, 2));
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_live_fetch() {
        let client = HermesClient::new();
        let update = client.fetch_latest(ETH_USD).await.unwrap();
        assert!(!update.update_blob.is_empty());
        assert!(update.derived_price().unwrap() > Decimal::ZERO);
    }
}
