//! Operator CLI for diagnosing and repairing a Pyth oracle integration.

use alloy::primitives::U256;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use repair_api::HermesClient;
use repair_chain::{revert_reason, BufferedGasPrice, ChainConnection, ContractInvoker, IPyth};
use repair_core::{
    price_to_cents, OraclePrice, OracleUpdateWorkflow, PythGateway, RegistryReadout,
    RegistryUpdateWorkflow, RepairError, RouterUpdateWorkflow, Settings, SwapDirection,
    SwapRequest, SwapWorkflow, UniversalSwapWorkflow, UpdateOutcome, SWAP_RECEIPT_TIMEOUT,
};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pyth-repair",
    version,
    about = "Diagnose and repair a Pyth price-oracle integration on an EVM testnet"
)]
struct Cli {
    /// RPC endpoint, overrides RPC_URL
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Signing key in hex, overrides DEPLOYMENT_KEY
    #[arg(long, global = true)]
    private_key: Option<String>,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Diagnose the feed and push a signed update if the oracle lacks one
    Fix,
    /// Read the oracle price and register state without writing anything
    Read,
    /// Push a signed update through the SwapRouter updateBytes path
    UpdateRouter,
    /// Write the latest feed price, in cents, into the PriceRegister
    UpdateRegistry,
    /// Swap through the project SwapRouter
    Swap {
        /// Amount in human units (ETH for native-in, USDC for native-out)
        #[arg(long)]
        amount: String,

        #[arg(long, value_enum, default_value_t = Direction::NativeIn)]
        direction: Direction,

        /// Bundle a fresh signed update into the swap transaction
        #[arg(long)]
        with_update: bool,
    },
    /// Swap through the Uniswap Universal Router
    UniSwap {
        /// Amount in human units (ETH for native-in, USDC for native-out)
        #[arg(long)]
        amount: String,

        #[arg(long, value_enum, default_value_t = Direction::NativeIn)]
        direction: Direction,

        /// Minimum acceptable output in base units
        #[arg(long, default_value = "0")]
        min_out: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Direction {
    NativeIn,
    NativeOut,
}

impl From<Direction> for SwapDirection {
    fn from(d: Direction) -> Self {
        match d {
            Direction::NativeIn => Self::NativeIn,
            Direction::NativeOut => Self::NativeOut,
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run(cli).await {
        error!(error = %e, "Repair run failed");
        std::process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env()?
        .with_rpc_url(cli.rpc_url)
        .with_private_key(cli.private_key);

    let connection = ChainConnection::new(settings.rpc_url.clone());
    let (chain_id, block) = connection.health_check().await.map_err(RepairError::from)?;
    print_banner(&settings, chain_id, block);

    match cli.command {
        Command::Fix => {
            let invoker = build_invoker(&settings, &connection, chain_id)?;
            let gateway = PythGateway::new(invoker, settings.pyth_oracle);
            let mut workflow =
                OracleUpdateWorkflow::new(gateway, HermesClient::new(), settings.feed_id);

            match workflow.run().await? {
                UpdateOutcome::AlreadyFresh(price) => {
                    info!(value = %price.display_value(), "Feed already healthy, no update needed");
                }
                UpdateOutcome::Updated { outcome, verified } => {
                    info!(
                        tx_hash = %outcome.hash,
                        block = outcome.block_number,
                        value = %verified.display_value(),
                        "Feed repaired"
                    );
                }
            }
        }

        Command::Read => {
            let provider = connection.provider().map_err(RepairError::from)?;
            let oracle = IPyth::new(settings.pyth_oracle, provider);

            match oracle.getPriceUnsafe(settings.feed_id).call().await {
                Ok(ret) => {
                    let price = OraclePrice {
                        raw_price: ret.price.price,
                        confidence: ret.price.conf,
                        exponent: ret.price.expo,
                        publish_time: ret.price.publishTime.saturating_to(),
                    };
                    info!(
                        value = %price.display_value(),
                        publish_time = price.publish_time,
                        "Oracle serves a price for this feed"
                    );
                }
                Err(e) => match revert_reason(&e) {
                    Some(reason) => warn!(reason = %reason, "Oracle read reverted"),
                    None => return Err(RepairError::Network(format!("getPriceUnsafe: {e}")).into()),
                },
            }

            if let Some(router) = settings.swap_router {
                let readout = RegistryReadout::new(connection.clone(), router);
                match readout.read().await {
                    Ok(state) => info!(register = %state, "Register state"),
                    Err(e) => warn!(error = %e, "Could not read the register"),
                }
            }
        }

        Command::UpdateRouter => {
            let router = settings.require_swap_router()?;
            let invoker = build_invoker(&settings, &connection, chain_id)?
                .with_receipt_timeout(SWAP_RECEIPT_TIMEOUT);

            let update = HermesClient::new()
                .fetch_latest(settings.feed_id)
                .await
                .map_err(RepairError::from)?;
            let outcome = RouterUpdateWorkflow::new(invoker, router)
                .run(update.update_blob)
                .await?;
            info!(tx_hash = %outcome.hash, block = outcome.block_number, "Router update confirmed");
        }

        Command::UpdateRegistry => {
            let register = settings.require_price_register()?;
            let invoker = build_invoker(&settings, &connection, chain_id)?;

            let update = HermesClient::new()
                .fetch_latest(settings.feed_id)
                .await
                .map_err(RepairError::from)?;
            let cents = price_to_cents(&update)?;
            let outcome = RegistryUpdateWorkflow::new(invoker, register)
                .run(cents)
                .await?;
            info!(tx_hash = %outcome.hash, block = outcome.block_number, "Register update confirmed");
        }

        Command::Swap {
            amount,
            direction,
            with_update,
        } => {
            let router = settings.require_swap_router()?;
            let invoker = build_invoker(&settings, &connection, chain_id)?
                .with_receipt_timeout(SWAP_RECEIPT_TIMEOUT);

            let update_blob = if with_update {
                let update = HermesClient::new()
                    .fetch_latest(settings.feed_id)
                    .await
                    .map_err(RepairError::from)?;
                Some(update.update_blob)
            } else {
                None
            };

            let request = SwapRequest {
                amount: parse_amount(&amount)?,
                direction: direction.into(),
                update_blob,
            };
            let outcome = SwapWorkflow::new(invoker, router).run(&request).await?;
            info!(tx_hash = %outcome.hash, block = outcome.block_number, "Swap confirmed");
        }

        Command::UniSwap {
            amount,
            direction,
            min_out,
        } => {
            let router = settings.require_universal_router()?;
            let invoker = build_invoker(&settings, &connection, chain_id)?
                .with_receipt_timeout(SWAP_RECEIPT_TIMEOUT);

            let min_out: U256 = min_out
                .parse()
                .map_err(|e| RepairError::Config(format!("min-out: {e}")))?;
            let workflow =
                UniversalSwapWorkflow::new(invoker, router, settings.weth, settings.usdc);
            let outcome = workflow
                .run(direction.into(), parse_amount(&amount)?, min_out)
                .await?;
            info!(tx_hash = %outcome.hash, block = outcome.block_number, "Swap confirmed");
        }
    }

    Ok(())
}

fn build_invoker(
    settings: &Settings,
    connection: &ChainConnection,
    chain_id: u64,
) -> Result<ContractInvoker, RepairError> {
    let signer = settings.signer()?;
    Ok(ContractInvoker::new(
        connection.clone(),
        signer,
        chain_id,
        Box::new(BufferedGasPrice::default()),
    ))
}

fn parse_amount(raw: &str) -> Result<Decimal, RepairError> {
    raw.parse()
        .map_err(|e| RepairError::Config(format!("amount {raw:?}: {e}")))
}

fn print_banner(settings: &Settings, chain_id: u64, block: u64) {
    info!("========================================");
    info!("  pyth-repair");
    info!("========================================");
    info!(rpc_url = %settings.rpc_url, chain_id, block, "Connected");
    info!(oracle = %settings.pyth_oracle, feed_id = %settings.feed_id, "Oracle target");
    if let Some(router) = settings.swap_router {
        info!(swap_router = %router, "Router target");
    }
    if let Some(register) = settings.price_register {
        info!(price_register = %register, "Register target");
    }
}
