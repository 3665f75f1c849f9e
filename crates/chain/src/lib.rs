//! EVM chain access: read-only queries, gas policy, contract bindings and
//! signed submissions.

pub mod connection;
pub mod contracts;
pub mod error;
pub mod gas;
pub mod invoker;

pub use connection::ChainConnection;
pub use contracts::{
    decode_oracle_revert, revert_reason, IPriceRegister, IPyth, ISwapRouter, IUniversalRouter,
    OracleRevert, PythPrice, RevertReason,
};
pub use error::ChainError;
pub use gas::{buffered_price, BufferedGasPrice, FixedGasPrice, GasPolicy, DEFAULT_GAS_PRICE_BUFFER};
pub use invoker::{
    buffered_gas_limit, gas_limit_or_ceiling, required_balance, ContractInvoker, TxOutcome,
    DEFAULT_RECEIPT_TIMEOUT,
};
