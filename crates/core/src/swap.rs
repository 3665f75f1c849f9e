//! Swap execution through the project SwapRouter.
//!
//! The router takes a signed amount (negative means exact input), a
//! direction flag, and an optional Pyth update blob bundled into the same
//! transaction. Gas estimation failure aborts the swap; unlike the oracle
//! update paths there is no fixed-ceiling fallback here, a swap that cannot
//! be estimated is a swap that will fail.

use crate::error::RepairError;
use alloy::primitives::{Address, Bytes, Sign, I256, U256};
use alloy::sol_types::SolCall;
use repair_chain::{buffered_gas_limit, revert_reason, ContractInvoker, IPyth, ISwapRouter, TxOutcome};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Receipt window for swap transactions.
pub const SWAP_RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Native-asset decimals (wei).
pub const NATIVE_DECIMALS: u32 = 18;

/// USDC decimals.
pub const USDC_DECIMALS: u32 = 6;

/// Which side of the pool the input amount is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// Spend the native asset, receive the token.
    NativeIn,
    /// Spend the token, receive the native asset.
    NativeOut,
}

impl fmt::Display for SwapDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NativeIn => f.write_str("native-in"),
            Self::NativeOut => f.write_str("native-out"),
        }
    }
}

/// Input decimals and the router's `zeroForOne` flag for a direction.
pub fn direction_params(direction: SwapDirection) -> (u32, bool) {
    match direction {
        SwapDirection::NativeIn => (NATIVE_DECIMALS, true),
        SwapDirection::NativeOut => (USDC_DECIMALS, false),
    }
}

/// Convert a human-readable amount to integer base units.
///
/// Rejects negative amounts and amounts with more fractional digits than
/// the asset supports; never rounds silently.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<U256, RepairError> {
    if amount.is_sign_negative() {
        return Err(RepairError::Config(format!(
            "swap amount must be positive, got {amount}"
        )));
    }

    let factor = Decimal::from(10u64.pow(decimals));
    let scaled = amount
        .checked_mul(factor)
        .ok_or_else(|| RepairError::Config(format!("amount {amount} out of range")))?;

    if scaled.fract() != Decimal::ZERO {
        return Err(RepairError::Config(format!(
            "amount {amount} has more than {decimals} fractional digits"
        )));
    }

    let units = scaled
        .trunc()
        .to_u128()
        .ok_or_else(|| RepairError::Config(format!("amount {amount} out of range")))?;
    Ok(U256::from(units))
}

/// Encode an exact-input amount: negative per the router convention.
pub fn exact_input_amount(units: U256) -> Result<I256, RepairError> {
    I256::checked_from_sign_and_abs(Sign::Negative, units)
        .ok_or_else(|| RepairError::Config(format!("swap amount {units} exceeds int256 range")))
}

/// What to swap and whether to bundle an oracle update.
#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub amount: Decimal,
    pub direction: SwapDirection,
    pub update_blob: Option<Bytes>,
}

/// Single-transition workflow against the project SwapRouter.
#[derive(Debug)]
pub struct SwapWorkflow {
    invoker: ContractInvoker,
    router: Address,
}

impl SwapWorkflow {
    pub fn new(invoker: ContractInvoker, router: Address) -> Self {
        Self { invoker, router }
    }

    pub async fn run(&self, request: &SwapRequest) -> Result<TxOutcome, RepairError> {
        let (decimals, zero_for_one) = direction_params(request.direction);
        let units = to_base_units(request.amount, decimals)?;
        let amount_signed = exact_input_amount(units)?;

        let update_fee = match &request.update_blob {
            Some(blob) => self.quote_bundle_fee(blob).await?,
            None => U256::ZERO,
        };
        // The native amount rides along as msg.value only when it is the
        // input side; the update fee always does.
        let value = match request.direction {
            SwapDirection::NativeIn => units + update_fee,
            SwapDirection::NativeOut => update_fee,
        };

        info!(
            router = %self.router,
            direction = %request.direction,
            amount = %request.amount,
            amount_units = %units,
            update_fee_wei = %update_fee,
            bundled_update = request.update_blob.is_some(),
            "Executing swap"
        );

        let calldata: Bytes = ISwapRouter::swapCall {
            amountToSwap: amount_signed,
            zeroForOne: zero_for_one,
            updateData: request.update_blob.clone().unwrap_or_default(),
        }
        .abi_encode()
        .into();

        let estimate = self
            .invoker
            .estimate_gas(self.router, calldata.clone(), value)
            .await?;
        let gas_limit = buffered_gas_limit(estimate);

        let outcome = self
            .invoker
            .submit(self.router, calldata, value, gas_limit)
            .await?;

        if !outcome.success {
            return Err(RepairError::Submission(format!(
                "swap transaction {} was mined but reverted",
                outcome.hash
            )));
        }
        Ok(outcome)
    }

    /// Fee quote for a bundled update, via the oracle the router is wired to.
    async fn quote_bundle_fee(&self, blob: &Bytes) -> Result<U256, RepairError> {
        let provider = self.invoker.connection().provider()?;
        let router = ISwapRouter::new(self.router, provider.clone());

        let oracle_addr = router
            .pythOracle()
            .call()
            .await
            .map_err(|e| RepairError::Network(format!("pythOracle: {e}")))?
            ._0;
        if oracle_addr == Address::ZERO {
            return Err(RepairError::Config(
                "router has no pyth oracle wired".into(),
            ));
        }

        let oracle = IPyth::new(oracle_addr, provider);
        match oracle.getUpdateFee(vec![blob.clone()]).call().await {
            Ok(ret) => Ok(ret.feeAmount),
            Err(e) => match revert_reason(&e) {
                Some(reason) => Err(RepairError::ContractRevert(reason)),
                None => Err(RepairError::Network(format!("getUpdateFee: {e}"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_amount_to_wei() {
        let units = to_base_units("1.5".parse().unwrap(), NATIVE_DECIMALS).unwrap();
        assert_eq!(units, U256::from(1_500_000_000_000_000_000u128));

        let units = to_base_units("0.001".parse().unwrap(), NATIVE_DECIMALS).unwrap();
        assert_eq!(units, U256::from(1_000_000_000_000_000u128));
    }

    #[test]
    fn test_token_amount_to_units() {
        let units = to_base_units("100.25".parse().unwrap(), USDC_DECIMALS).unwrap();
        assert_eq!(units, U256::from(100_250_000u64));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let err = to_base_units("-1".parse().unwrap(), NATIVE_DECIMALS).unwrap_err();
        assert!(matches!(err, RepairError::Config(_)));
    }

    #[test]
    fn test_excess_precision_rejected() {
        // USDC has 6 decimals; a 7th fractional digit must not round away.
        let err = to_base_units("0.0000001".parse().unwrap(), USDC_DECIMALS).unwrap_err();
        assert!(matches!(err, RepairError::Config(_)));
    }

    #[test]
    fn test_exact_input_is_negative() {
        let signed = exact_input_amount(U256::from(1_000_000u64)).unwrap();
        assert!(signed.is_negative());
        assert_eq!(signed.unsigned_abs(), U256::from(1_000_000u64));
    }

    #[test]
    fn test_direction_params() {
        assert_eq!(direction_params(SwapDirection::NativeIn), (18, true));
        assert_eq!(direction_params(SwapDirection::NativeOut), (6, false));
    }
}
