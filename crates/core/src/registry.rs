//! Price-register diagnostics and updates.
//!
//! Two write paths exist: the SwapRouter's `updateBytes` path, which pushes
//! a signed blob through the router into the oracle it is wired to, and the
//! plain PriceRegister `update`, which stores an already-parsed price in
//! cents together with a source label.

use crate::error::RepairError;
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use repair_api::PriceUpdate;
use repair_chain::{
    buffered_gas_limit, gas_limit_or_ceiling, revert_reason, ChainConnection, ContractInvoker,
    IPriceRegister, IPyth, ISwapRouter, TxOutcome,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use tracing::{info, warn};

/// Fixed gas ceiling for the router `updateBytes` path.
pub const ROUTER_UPDATE_GAS_CEILING: u64 = 100_000;

/// Source label written alongside registry prices.
pub const REGISTRY_SOURCE: &str = "pyth-repair";

/// Convert a derived feed price to whole cents for the registry.
pub fn price_to_cents(update: &PriceUpdate) -> Result<U256, RepairError> {
    let price = update
        .derived_price()
        .map_err(|e| RepairError::FeedUnavailable(e.to_string()))?;
    let cents = price
        .checked_mul(Decimal::from(100u32))
        .ok_or_else(|| RepairError::Config(format!("price {price} out of registry range")))?
        .trunc()
        .to_u128()
        .ok_or_else(|| RepairError::Config(format!("price {price} out of registry range")))?;
    Ok(U256::from(cents))
}

/// Current registry contents.
#[derive(Debug, Clone)]
pub struct RegisterState {
    pub price_cents: U256,
    pub source: String,
}

impl fmt::Display for RegisterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hundred = U256::from(100u64);
        let dollars = self.price_cents / hundred;
        let cents: u64 = (self.price_cents % hundred).to::<u64>();
        write!(f, "${dollars}.{cents:02} (source: {source})", source = self.source)
    }
}

/// Read-only view of a PriceRegister, resolved through the router.
#[derive(Debug)]
pub struct RegistryReadout {
    connection: ChainConnection,
    router: Address,
}

impl RegistryReadout {
    pub fn new(connection: ChainConnection, router: Address) -> Self {
        Self { connection, router }
    }

    /// Resolve the register behind the router and read its state.
    pub async fn read(&self) -> Result<RegisterState, RepairError> {
        let provider = self.connection.provider()?;
        let router = ISwapRouter::new(self.router, provider.clone());

        let register_addr = router
            .getPriceRegister()
            .call()
            .await
            .map_err(|e| RepairError::Network(format!("getPriceRegister: {e}")))?
            ._0;
        if register_addr == Address::ZERO {
            return Err(RepairError::Config(
                "router has no price register wired".into(),
            ));
        }

        read_register(&self.connection, register_addr).await
    }
}

/// Read a PriceRegister directly by address.
pub async fn read_register(
    connection: &ChainConnection,
    register: Address,
) -> Result<RegisterState, RepairError> {
    let provider = connection.provider()?;
    let register = IPriceRegister::new(register, provider);

    let ret = register
        .getData()
        .call()
        .await
        .map_err(|e| RepairError::Network(format!("getData: {e}")))?;

    Ok(RegisterState {
        price_cents: ret.price,
        source: ret.sourceValue,
    })
}

/// Push a signed update through the SwapRouter `updateBytes` path.
#[derive(Debug)]
pub struct RouterUpdateWorkflow {
    invoker: ContractInvoker,
    router: Address,
}

impl RouterUpdateWorkflow {
    pub fn new(invoker: ContractInvoker, router: Address) -> Self {
        Self { invoker, router }
    }

    pub async fn run(&self, blob: Bytes) -> Result<TxOutcome, RepairError> {
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
        info!(oracle = %oracle_addr, "Router is wired to the oracle");

        let oracle = IPyth::new(oracle_addr, provider);
        let fee = match oracle.getUpdateFee(vec![blob.clone()]).call().await {
            Ok(ret) => ret.feeAmount,
            Err(e) => match revert_reason(&e) {
                Some(reason) => return Err(RepairError::ContractRevert(reason)),
                None => return Err(RepairError::Network(format!("getUpdateFee: {e}"))),
            },
        };
        info!(fee_wei = %fee, "Oracle quoted the update fee");

        let calldata: Bytes = ISwapRouter::updateBytesCall {
            updateData: vec![blob],
        }
        .abi_encode()
        .into();

        let estimate = self
            .invoker
            .estimate_gas(self.router, calldata.clone(), fee)
            .await;
        let (gas_limit, used_ceiling) = gas_limit_or_ceiling(estimate, ROUTER_UPDATE_GAS_CEILING);
        if used_ceiling {
            warn!(gas_limit, "Proceeding with the fixed gas ceiling");
        }

        let outcome = self
            .invoker
            .submit(self.router, calldata, fee, gas_limit)
            .await?;

        if !outcome.success {
            return Err(RepairError::Submission(format!(
                "updateBytes transaction {} was mined but reverted",
                outcome.hash
            )));
        }

        // Confirm the register actually moved.
        let readout = RegistryReadout::new(self.invoker.connection().clone(), self.router);
        match readout.read().await {
            Ok(state) => info!(register_state = %state, "Register after update"),
            Err(e) => warn!(error = %e, "Could not re-read the register after update"),
        }

        Ok(outcome)
    }
}

/// Write an already-parsed price into a plain PriceRegister.
#[derive(Debug)]
pub struct RegistryUpdateWorkflow {
    invoker: ContractInvoker,
    register: Address,
}

impl RegistryUpdateWorkflow {
    pub fn new(invoker: ContractInvoker, register: Address) -> Self {
        Self { invoker, register }
    }

    pub async fn run(&self, price_cents: U256) -> Result<TxOutcome, RepairError> {
        info!(
            register = %self.register,
            price_cents = %price_cents,
            source = REGISTRY_SOURCE,
            "Updating price register"
        );

        let calldata: Bytes = IPriceRegister::updateCall {
            newPrice: price_cents,
            newSource: REGISTRY_SOURCE.to_string(),
        }
        .abi_encode()
        .into();

        // Non-payable and cheap; a failed estimate means a bad address or a
        // reverting register, so abort instead of guessing a limit.
        let estimate = self
            .invoker
            .estimate_gas(self.register, calldata.clone(), U256::ZERO)
            .await?;
        let gas_limit = buffered_gas_limit(estimate);

        let outcome = self
            .invoker
            .submit(self.register, calldata, U256::ZERO, gas_limit)
            .await?;

        if !outcome.success {
            return Err(RepairError::Submission(format!(
                "register update transaction {} was mined but reverted",
                outcome.hash
            )));
        }

        let state = read_register(self.invoker.connection(), self.register).await?;
        if state.price_cents != price_cents {
            return Err(RepairError::Verification(format!(
                "register reads {} cents after writing {price_cents}",
                state.price_cents
            )));
        }
        info!(register_state = %state, "Register verified");

        Ok(outcome)
    }
}
