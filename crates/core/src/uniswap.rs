//! Uniswap Universal Router command building.
//!
//! The router executes a byte string of commands with one ABI-encoded input
//! per command. Only three commands are needed here: WRAP_ETH and
//! V3_SWAP_EXACT_IN for spending the native asset, and V3_SWAP_EXACT_IN
//! plus UNWRAP_WETH for receiving it.

use crate::error::RepairError;
use crate::swap::{to_base_units, SwapDirection, NATIVE_DECIMALS, USDC_DECIMALS};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};
use repair_chain::{buffered_gas_limit, ContractInvoker, IUniversalRouter, TxOutcome};
use rust_decimal::Decimal;
use tracing::info;

pub const CMD_V3_SWAP_EXACT_IN: u8 = 0x00;
pub const CMD_WRAP_ETH: u8 = 0x0b;
pub const CMD_UNWRAP_WETH: u8 = 0x0c;

/// 0.3% fee tier of the target WETH/USDC pool.
pub const DEFAULT_POOL_FEE: u32 = 3000;

/// Deadline window for `execute`.
pub const DEADLINE_WINDOW_SECS: i64 = 600;

/// Router sentinel for "send to the caller".
pub const MSG_SENDER: Address = Address::with_last_byte(1);

/// Router sentinel for "keep inside the router".
pub const ADDRESS_THIS: Address = Address::with_last_byte(2);

/// Encode a single-hop V3 path: token ‖ fee (3 bytes, big-endian) ‖ token.
pub fn encode_v3_path(token_in: Address, fee: u32, token_out: Address) -> Bytes {
    let mut path = Vec::with_capacity(43);
    path.extend_from_slice(token_in.as_slice());
    path.extend_from_slice(&fee.to_be_bytes()[1..]);
    path.extend_from_slice(token_out.as_slice());
    Bytes::from(path)
}

/// A ready-to-submit command sequence.
#[derive(Debug, Clone)]
pub struct RouterPlan {
    pub commands: Bytes,
    pub inputs: Vec<Bytes>,
    pub value: U256,
}

/// Wrap the attached native amount, then swap it for the token.
pub fn plan_native_in(
    weth: Address,
    usdc: Address,
    fee: u32,
    amount_wei: U256,
    min_out: U256,
) -> RouterPlan {
    let wrap = (ADDRESS_THIS, amount_wei).abi_encode_params();
    // Funds come from the wrap, not the caller's token balance.
    let swap = (
        MSG_SENDER,
        amount_wei,
        min_out,
        encode_v3_path(weth, fee, usdc),
        false,
    )
        .abi_encode_params();

    RouterPlan {
        commands: Bytes::from(vec![CMD_WRAP_ETH, CMD_V3_SWAP_EXACT_IN]),
        inputs: vec![Bytes::from(wrap), Bytes::from(swap)],
        value: amount_wei,
    }
}

/// Swap the token for WETH held by the router, then unwrap to the caller.
pub fn plan_native_out(
    weth: Address,
    usdc: Address,
    fee: u32,
    amount_units: U256,
    min_out_wei: U256,
) -> RouterPlan {
    let swap = (
        ADDRESS_THIS,
        amount_units,
        min_out_wei,
        encode_v3_path(usdc, fee, weth),
        true,
    )
        .abi_encode_params();
    let unwrap = (MSG_SENDER, min_out_wei).abi_encode_params();

    RouterPlan {
        commands: Bytes::from(vec![CMD_V3_SWAP_EXACT_IN, CMD_UNWRAP_WETH]),
        inputs: vec![Bytes::from(swap), Bytes::from(unwrap)],
        value: U256::ZERO,
    }
}

/// Deadline timestamp for a plan built now.
pub fn execution_deadline() -> U256 {
    U256::from((chrono::Utc::now().timestamp() + DEADLINE_WINDOW_SECS) as u64)
}

/// Swap through the Universal Router instead of the project SwapRouter.
#[derive(Debug)]
pub struct UniversalSwapWorkflow {
    invoker: ContractInvoker,
    router: Address,
    weth: Address,
    usdc: Address,
    pool_fee: u32,
}

impl UniversalSwapWorkflow {
    pub fn new(invoker: ContractInvoker, router: Address, weth: Address, usdc: Address) -> Self {
        Self {
            invoker,
            router,
            weth,
            usdc,
            pool_fee: DEFAULT_POOL_FEE,
        }
    }

    pub fn with_pool_fee(mut self, fee: u32) -> Self {
        self.pool_fee = fee;
        self
    }

    pub async fn run(
        &self,
        direction: SwapDirection,
        amount: Decimal,
        min_out: U256,
    ) -> Result<TxOutcome, RepairError> {
        let plan = match direction {
            SwapDirection::NativeIn => {
                let wei = to_base_units(amount, NATIVE_DECIMALS)?;
                plan_native_in(self.weth, self.usdc, self.pool_fee, wei, min_out)
            }
            SwapDirection::NativeOut => {
                let units = to_base_units(amount, USDC_DECIMALS)?;
                plan_native_out(self.weth, self.usdc, self.pool_fee, units, min_out)
            }
        };
        let deadline = execution_deadline();

        info!(
            router = %self.router,
            direction = %direction,
            amount = %amount,
            commands = %hex::encode(&plan.commands),
            value_wei = %plan.value,
            deadline = %deadline,
            "Executing through the Universal Router"
        );

        let calldata: Bytes = IUniversalRouter::executeCall {
            commands: plan.commands,
            inputs: plan.inputs,
            deadline,
        }
        .abi_encode()
        .into();

        let estimate = self
            .invoker
            .estimate_gas(self.router, calldata.clone(), plan.value)
            .await?;
        let gas_limit = buffered_gas_limit(estimate);

        let outcome = self
            .invoker
            .submit(self.router, calldata, plan.value, gas_limit)
            .await?;

        if !outcome.success {
            return Err(RepairError::Submission(format!(
                "universal router transaction {} was mined but reverted",
                outcome.hash
            )));
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weth() -> Address {
        "0x980B62Da83eFf3D4576C647993b0c1D7faf17c73".parse().unwrap()
    }

    fn usdc() -> Address {
        "0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d".parse().unwrap()
    }

    #[test]
    fn test_v3_path_layout() {
        let path = encode_v3_path(weth(), DEFAULT_POOL_FEE, usdc());

        assert_eq!(path.len(), 43);
        assert_eq!(&path[..20], weth().as_slice());
        // 0.3% tier: 3000 = 0x000bb8 big-endian in 3 bytes
        assert_eq!(&path[20..23], &[0x00, 0x0b, 0xb8]);
        assert_eq!(&path[23..], usdc().as_slice());
    }

    #[test]
    fn test_v3_path_other_tier() {
        let path = encode_v3_path(weth(), 500, usdc());
        assert_eq!(&path[20..23], &[0x00, 0x01, 0xf4]);
    }

    #[test]
    fn test_native_in_plan() {
        let amount = U256::from(1_000_000_000_000_000u128);
        let plan = plan_native_in(weth(), usdc(), DEFAULT_POOL_FEE, amount, U256::ZERO);

        assert_eq!(plan.commands.as_ref(), &[CMD_WRAP_ETH, CMD_V3_SWAP_EXACT_IN]);
        assert_eq!(plan.inputs.len(), 2);
        assert_eq!(plan.value, amount);
    }

    #[test]
    fn test_native_out_plan() {
        let amount = U256::from(100_000_000u64);
        let plan = plan_native_out(weth(), usdc(), DEFAULT_POOL_FEE, amount, U256::from(1));

        assert_eq!(plan.commands.as_ref(), &[CMD_V3_SWAP_EXACT_IN, CMD_UNWRAP_WETH]);
        assert_eq!(plan.inputs.len(), 2);
        assert_eq!(plan.value, U256::ZERO);
    }

    #[test]
    fn test_deadline_is_in_the_future() {
        let now = chrono::Utc::now().timestamp() as u64;
        let deadline = execution_deadline();
        assert!(deadline >= U256::from(now + 500));
    }
}
