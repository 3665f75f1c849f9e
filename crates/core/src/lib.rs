//! Repair workflows for a Pyth oracle integration: diagnose a broken feed,
//! push signed updates, and drive the router/registry contracts around it.

pub mod config;
pub mod error;
pub mod gateway;
pub mod oracle_update;
pub mod registry;
pub mod swap;
pub mod uniswap;

pub use config::{Settings, ETH_USD_FEED_ID};
pub use error::RepairError;
pub use gateway::{PythGateway, ORACLE_UPDATE_GAS_CEILING};
pub use oracle_update::{
    OracleGateway, OraclePrice, OracleUpdateWorkflow, PriceFeed, ReadOutcome, UpdateOutcome,
    WorkflowState,
};
pub use registry::{
    price_to_cents, RegisterState, RegistryReadout, RegistryUpdateWorkflow, RouterUpdateWorkflow,
    REGISTRY_SOURCE, ROUTER_UPDATE_GAS_CEILING,
};
pub use swap::{
    SwapDirection, SwapRequest, SwapWorkflow, NATIVE_DECIMALS, SWAP_RECEIPT_TIMEOUT, USDC_DECIMALS,
};
pub use uniswap::{RouterPlan, UniversalSwapWorkflow, DEFAULT_POOL_FEE};
