//! Runtime configuration from environment variables.
//!
//! Addresses default to the project's Arbitrum Sepolia deployment so a bare
//! `.env` with just the signing key is enough to run diagnostics. The
//! private key is validated locally before any network call.

use crate::error::RepairError;
use alloy::primitives::{address, b256, Address, B256};
use alloy::signers::local::PrivateKeySigner;
use std::env;

/// Environment variable names.
pub mod env_vars {
    pub const RPC_URL: &str = "RPC_URL";
    pub const DEPLOYMENT_KEY: &str = "DEPLOYMENT_KEY";
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const DEPLOYMENT_WALLET: &str = "DEPLOYMENT_WALLET";
    pub const PYTH_ORACLE_ADDRESS: &str = "PYTH_ORACLE_ADDRESS";
    pub const SWAP_ROUTER_ADDRESS: &str = "SWAP_ROUTER_ADDRESS";
    pub const PRICE_REGISTER_ADDRESS: &str = "PRICE_REGISTER_ADDRESS";
    pub const UNIVERSAL_ROUTER_ADDRESS: &str = "UNIVERSAL_ROUTER_ADDRESS";
    pub const WETH_ADDRESS: &str = "WETH_ADDRESS";
    pub const USDC_ADDRESS: &str = "USDC_ADDRESS";
}

/// Arbitrum Sepolia public RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "https://sepolia-rollup.arbitrum.io/rpc";

/// Pyth oracle deployment on Arbitrum Sepolia.
pub const DEFAULT_PYTH_ORACLE: Address = address!("8D254a21b3C86D32F7179855531CE99164721933");

/// Canonical WETH on Arbitrum Sepolia.
pub const DEFAULT_WETH: Address = address!("980B62Da83eFf3D4576C647993b0c1D7faf17c73");

/// Circle USDC on Arbitrum Sepolia.
pub const DEFAULT_USDC: Address = address!("75faf114eafb1BDbe2F0316DF893fd58CE46AA4d");

/// ETH/USD feed id on Pyth.
pub const ETH_USD_FEED_ID: B256 =
    b256!("ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace");

/// Resolved runtime settings.
#[derive(Clone)]
pub struct Settings {
    pub rpc_url: String,
    pub pyth_oracle: Address,
    pub swap_router: Option<Address>,
    pub price_register: Option<Address>,
    pub universal_router: Option<Address>,
    pub weth: Address,
    pub usdc: Address,
    pub feed_id: B256,
    /// Raw key material; validated into a signer on demand.
    private_key: Option<String>,
    /// Expected sender address, cross-checked against the key.
    pub wallet: Option<Address>,
}

impl Settings {
    /// Load settings from the environment, applying deployment defaults.
    pub fn from_env() -> Result<Self, RepairError> {
        Ok(Self {
            rpc_url: env::var(env_vars::RPC_URL).unwrap_or_else(|_| DEFAULT_RPC_URL.to_string()),
            pyth_oracle: optional_address(env_vars::PYTH_ORACLE_ADDRESS)?
                .unwrap_or(DEFAULT_PYTH_ORACLE),
            swap_router: optional_address(env_vars::SWAP_ROUTER_ADDRESS)?,
            price_register: optional_address(env_vars::PRICE_REGISTER_ADDRESS)?,
            universal_router: optional_address(env_vars::UNIVERSAL_ROUTER_ADDRESS)?,
            weth: optional_address(env_vars::WETH_ADDRESS)?.unwrap_or(DEFAULT_WETH),
            usdc: optional_address(env_vars::USDC_ADDRESS)?.unwrap_or(DEFAULT_USDC),
            feed_id: ETH_USD_FEED_ID,
            private_key: env::var(env_vars::DEPLOYMENT_KEY)
                .or_else(|_| env::var(env_vars::PRIVATE_KEY))
                .ok(),
            wallet: optional_address(env_vars::DEPLOYMENT_WALLET)?,
        })
    }

    /// Override the RPC URL (CLI flag).
    pub fn with_rpc_url(mut self, rpc_url: Option<String>) -> Self {
        if let Some(url) = rpc_url {
            self.rpc_url = url;
        }
        self
    }

    /// Override the signing key (CLI flag).
    pub fn with_private_key(mut self, key: Option<String>) -> Self {
        if let Some(key) = key {
            self.private_key = Some(key);
        }
        self
    }

    /// Validate the configured key and build a signer.
    pub fn signer(&self) -> Result<PrivateKeySigner, RepairError> {
        let raw = self.private_key.as_deref().ok_or_else(|| {
            RepairError::Config(format!(
                "no signing key: set {} or {}",
                env_vars::DEPLOYMENT_KEY,
                env_vars::PRIVATE_KEY
            ))
        })?;
        validate_private_key(raw, self.wallet)
    }

    /// Required address accessors for workflows that cannot run without one.
    pub fn require_swap_router(&self) -> Result<Address, RepairError> {
        self.swap_router
            .ok_or_else(|| missing_address(env_vars::SWAP_ROUTER_ADDRESS))
    }

    pub fn require_price_register(&self) -> Result<Address, RepairError> {
        self.price_register
            .ok_or_else(|| missing_address(env_vars::PRICE_REGISTER_ADDRESS))
    }

    pub fn require_universal_router(&self) -> Result<Address, RepairError> {
        self.universal_router
            .ok_or_else(|| missing_address(env_vars::UNIVERSAL_ROUTER_ADDRESS))
    }
}

// Key material must never appear in logs or debug output.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("rpc_url", &self.rpc_url)
            .field("pyth_oracle", &self.pyth_oracle)
            .field("swap_router", &self.swap_router)
            .field("price_register", &self.price_register)
            .field("universal_router", &self.universal_router)
            .field("weth", &self.weth)
            .field("usdc", &self.usdc)
            .field("feed_id", &self.feed_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("wallet", &self.wallet)
            .finish()
    }
}

fn missing_address(name: &str) -> RepairError {
    RepairError::Config(format!("{name} is not set"))
}

fn optional_address(name: &str) -> Result<Option<Address>, RepairError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RepairError::Config(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Validate raw key material and derive a signer.
///
/// Accepts an optional `0x` prefix, requires exactly 64 hex characters, and
/// cross-checks the derived address against the expected wallet when one is
/// configured. Runs entirely locally.
pub fn validate_private_key(
    raw: &str,
    expected: Option<Address>,
) -> Result<PrivateKeySigner, RepairError> {
    let trimmed = raw.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    if hex_part.len() != 64 {
        return Err(RepairError::Config(format!(
            "private key must be 64 hex characters, got {}",
            hex_part.len()
        )));
    }
    if !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(RepairError::Config(
            "private key contains non-hex characters".into(),
        ));
    }

    let signer: PrivateKeySigner = hex_part
        .parse()
        .map_err(|e| RepairError::Config(format!("invalid private key: {e}")))?;

    if let Some(expected) = expected {
        if signer.address() != expected {
            return Err(RepairError::Config(format!(
                "key derives address {}, expected {}",
                signer.address(),
                expected
            )));
        }
    }

    Ok(signer)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test key (anvil account 0).
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_valid_key_with_and_without_prefix() {
        assert!(validate_private_key(TEST_KEY, None).is_ok());
        assert!(validate_private_key(&format!("0x{TEST_KEY}"), None).is_ok());
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = validate_private_key(&TEST_KEY[..63], None).unwrap_err();
        assert!(matches!(err, RepairError::Config(_)));
    }

    #[test]
    fn test_non_hex_rejected() {
        let bad = format!("{}g", &TEST_KEY[..63]);
        let err = validate_private_key(&bad, None).unwrap_err();
        assert!(matches!(err, RepairError::Config(_)));
    }

    #[test]
    fn test_address_cross_check() {
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
            .parse()
            .unwrap();
        assert!(validate_private_key(TEST_KEY, Some(expected)).is_ok());

        let other: Address = "0x0000000000000000000000000000000000000001"
            .parse()
            .unwrap();
        let err = validate_private_key(TEST_KEY, Some(other)).unwrap_err();
        assert!(matches!(err, RepairError::Config(_)));
    }

    #[test]
    fn test_default_addresses_parse() {
        assert_eq!(
            DEFAULT_PYTH_ORACLE,
            "0x8D254a21b3C86D32F7179855531CE99164721933"
                .parse::<Address>()
                .unwrap()
        );
        assert_eq!(
            DEFAULT_WETH,
            "0x980B62Da83eFf3D4576C647993b0c1D7faf17c73"
                .parse::<Address>()
                .unwrap()
        );
        assert_eq!(
            DEFAULT_USDC,
            "0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d"
                .parse::<Address>()
                .unwrap()
        );
    }
}
