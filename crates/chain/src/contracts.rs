//! Contract bindings and typed revert decoding.
//!
//! `sol!` interfaces for the Pyth oracle, the project SwapRouter and
//! PriceRegister, and the Uniswap Universal Router. Known Pyth error
//! selectors are decoded into [`OracleRevert`] instead of matching on
//! error-message substrings.

use alloy::sol;
use alloy::sol_types::SolError;
use std::fmt;

sol! {
    /// Price tuple stored by the Pyth oracle.
    #[derive(Debug)]
    struct PythPrice {
        int64 price;
        uint64 conf;
        int32 expo;
        uint256 publishTime;
    }

    /// Pyth oracle interface (subset used by the repair workflows).
    #[sol(rpc)]
    interface IPyth {
        function getPriceUnsafe(bytes32 id) external view returns (PythPrice memory price);
        function getUpdateFee(bytes[] memory updateData) external view returns (uint256 feeAmount);
        function updatePriceFeeds(bytes[] memory updateData) external payable;

        error PriceFeedNotFound();
        error StalePrice();
        error InsufficientFee();
        error InvalidUpdateData();
    }

    /// Project SwapRouter with integrated Pyth update path.
    #[sol(rpc)]
    interface ISwapRouter {
        function updateBytes(bytes[] memory updateData) external payable;
        function swap(int256 amountToSwap, bool zeroForOne, bytes memory updateData) external payable returns (int256 delta);
        function getPriceRegister() external view returns (address);
        function pythOracle() external view returns (address);
    }

    /// Plain price registry updated with already-parsed values.
    #[sol(rpc)]
    interface IPriceRegister {
        function update(uint256 newPrice, string memory newSource) external;
        function getPrice() external view returns (uint256);
        function getSource() external view returns (string memory);
        function getData() external view returns (uint256 price, string memory sourceValue);
    }

    /// Uniswap Universal Router entry point.
    #[sol(rpc)]
    interface IUniversalRouter {
        function execute(bytes memory commands, bytes[] memory inputs, uint256 deadline) external payable;
    }
}

/// Known Pyth revert causes, decoded from ABI error selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleRevert {
    /// The feed id was never initialized on this oracle deployment.
    PriceFeedNotFound,
    /// The stored price is older than the oracle's staleness bound.
    StalePrice,
    /// `msg.value` below the quoted update fee.
    InsufficientFee,
    /// The update blob failed signature or format checks.
    InvalidUpdateData,
}

impl fmt::Display for OracleRevert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PriceFeedNotFound => write!(f, "PriceFeedNotFound: feed not initialized on this oracle"),
            Self::StalePrice => write!(f, "StalePrice: stored price is too old"),
            Self::InsufficientFee => write!(f, "InsufficientFee: msg.value below the quoted update fee"),
            Self::InvalidUpdateData => write!(f, "InvalidUpdateData: oracle rejected the update blob"),
        }
    }
}

/// Why a call reverted: a decoded oracle error or the raw revert data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    Oracle(OracleRevert),
    Raw(String),
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oracle(known) => known.fmt(f),
            Self::Raw(data) => write!(f, "unrecognized revert data {data}"),
        }
    }
}

/// Decode revert data against the known Pyth error selectors.
pub fn decode_oracle_revert(data: &[u8]) -> Option<OracleRevert> {
    let selector: [u8; 4] = data.get(..4)?.try_into().ok()?;
    match selector {
        IPyth::PriceFeedNotFound::SELECTOR => Some(OracleRevert::PriceFeedNotFound),
        IPyth::StalePrice::SELECTOR => Some(OracleRevert::StalePrice),
        IPyth::InsufficientFee::SELECTOR => Some(OracleRevert::InsufficientFee),
        IPyth::InvalidUpdateData::SELECTOR => Some(OracleRevert::InvalidUpdateData),
        _ => None,
    }
}

/// Extract a [`RevertReason`] from a contract call error.
///
/// Returns `None` when the error carries no revert data (transport failure,
/// timeout), in which case the call site should treat it as a network error.
pub fn revert_reason(err: &alloy::contract::Error) -> Option<RevertReason> {
    let data = err.as_revert_data()?;
    Some(match decode_oracle_revert(&data) {
        Some(known) => RevertReason::Oracle(known),
        None => RevertReason::Raw(format!("0x{}", hex::encode(&data))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_feed_not_found_selector() {
        // Error signature observed on-chain when the feed was never pushed.
        assert_eq!(IPyth::PriceFeedNotFound::SELECTOR, [0x14, 0xae, 0xbe, 0x68]);
    }

    #[test]
    fn test_decode_known_selectors() {
        for (selector, expected) in [
            (IPyth::PriceFeedNotFound::SELECTOR, OracleRevert::PriceFeedNotFound),
            (IPyth::StalePrice::SELECTOR, OracleRevert::StalePrice),
            (IPyth::InsufficientFee::SELECTOR, OracleRevert::InsufficientFee),
            (IPyth::InvalidUpdateData::SELECTOR, OracleRevert::InvalidUpdateData),
        ] {
            assert_eq!(decode_oracle_revert(&selector), Some(expected));
        }
    }

    #[test]
    fn test_decode_unknown_data() {
        assert_eq!(decode_oracle_revert(&[0xde, 0xad, 0xbe, 0xef]), None);
        assert_eq!(decode_oracle_revert(&[0x14, 0xae]), None);
        assert_eq!(decode_oracle_revert(&[]), None);
    }
}
