//! Polymarket On-Chain CLI
//!
//! Operator commands for approvals, sell sizing and market transactions.

use alloy::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polymarket_onchain::contracts::{ConditionalTokensHandle, FungibleToken, SemiFungibleToken};
use polymarket_onchain::services::{estimate_max_redeemable, index_set_for, position_id_for, with_retry};
use polymarket_onchain::units::{format_units, parse_units_str};
use polymarket_onchain::{
    ChainAccess, Config, ContractFactory, MarketTrader, TracingLog, TradeOutcome, TransactionLock,
    TxLog,
};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Polygon USDC.e, the collateral of Polymarket markets
const DEFAULT_COLLATERAL: &str = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174";
/// Gnosis conditional tokens deployment on Polygon
const DEFAULT_CONDITIONAL_TOKENS: &str = "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045";

#[derive(Parser)]
#[command(name = "polymarket-onchain")]
#[command(about = "On-chain approvals and trades for Polymarket market makers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a wallet's collateral balance and allowance for a spender
    Allowance {
        /// Spender whose allowance to read (usually a market)
        #[arg(short, long)]
        spender: Address,

        /// Wallet to inspect (defaults to the configured signer)
        #[arg(short, long)]
        owner: Option<Address>,

        /// Collateral token
        #[arg(long, default_value = DEFAULT_COLLATERAL)]
        token: Address,

        /// Collateral decimals
        #[arg(long, default_value = "6")]
        decimals: u8,
    },

    /// Approve an operator for all outcome tokens
    ApproveOperator {
        /// Operator to approve (usually a market)
        #[arg(short, long)]
        operator: Address,

        /// Conditional tokens registry
        #[arg(long, default_value = DEFAULT_CONDITIONAL_TOKENS)]
        registry: Address,
    },

    /// Estimate the collateral a full position sale would return
    EstimateSell {
        /// Market maker address
        #[arg(short, long)]
        market: Address,

        /// Condition id (bytes32) of the market
        #[arg(short, long)]
        condition_id: B256,

        /// Outcome index in the market
        #[arg(long)]
        outcome: u64,

        /// Index set of the position (defaults to the outcome's own slot)
        #[arg(long)]
        index_set: Option<U256>,

        /// Wallet holding the position (defaults to the configured signer)
        #[arg(long)]
        owner: Option<Address>,

        #[arg(long, default_value = DEFAULT_COLLATERAL)]
        collateral: Address,

        #[arg(long, default_value = DEFAULT_CONDITIONAL_TOKENS)]
        registry: Address,

        #[arg(long, default_value = "6")]
        decimals: u8,
    },

    /// Buy outcome tokens with collateral
    Buy {
        #[arg(short, long)]
        market: Address,

        /// Outcome index in the market
        #[arg(long)]
        outcome: u64,

        /// Collateral to spend, e.g. 12.5
        #[arg(short, long)]
        amount: String,

        /// Slippage tolerance in basis points (defaults to SLIPPAGE_BPS)
        #[arg(long)]
        slippage_bps: Option<u32>,

        #[arg(long, default_value = DEFAULT_COLLATERAL)]
        collateral: Address,

        #[arg(long, default_value = "6")]
        decimals: u8,
    },

    /// Sell an entire position back to the market
    SellAll {
        #[arg(short, long)]
        market: Address,

        /// Condition id (bytes32) of the market
        #[arg(short, long)]
        condition_id: B256,

        #[arg(long)]
        outcome: u64,

        /// Index set of the position (defaults to the outcome's own slot)
        #[arg(long)]
        index_set: Option<U256>,

        #[arg(long, default_value = DEFAULT_COLLATERAL)]
        collateral: Address,

        #[arg(long, default_value = DEFAULT_CONDITIONAL_TOKENS)]
        registry: Address,

        #[arg(long, default_value = "6")]
        decimals: u8,
    },

    /// Redeem positions of a resolved condition
    Redeem {
        /// Condition id (bytes32)
        #[arg(short, long)]
        condition_id: B256,

        /// Index sets to redeem, e.g. 1,2 for both outcomes of a binary market
        #[arg(long, value_delimiter = ',', default_value = "1,2")]
        index_sets: Vec<U256>,

        #[arg(long, default_value = DEFAULT_COLLATERAL)]
        collateral: Address,

        #[arg(long, default_value = DEFAULT_CONDITIONAL_TOKENS)]
        registry: Address,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    match cli.command {
        Commands::Allowance {
            spender,
            owner,
            token,
            decimals,
        } => show_allowance(&config, spender, owner, token, decimals).await?,
        Commands::ApproveOperator { operator, registry } => {
            approve_operator(&config, operator, registry).await?
        }
        Commands::EstimateSell {
            market,
            condition_id,
            outcome,
            index_set,
            owner,
            collateral,
            registry,
            decimals,
        } => {
            let position = Position {
                collateral,
                condition_id,
                index_set: index_set.unwrap_or_else(|| index_set_for(outcome)),
            };
            estimate_sell(&config, market, position, outcome, owner, registry, decimals).await?
        }
        Commands::Buy {
            market,
            outcome,
            amount,
            slippage_bps,
            collateral,
            decimals,
        } => {
            let investment = parse_units_str(&amount, decimals)
                .with_context(|| format!("Invalid amount: {}", amount))?;
            let slippage_bps = slippage_bps.unwrap_or(config.slippage_bps);
            let (trader, factory, wallet) = signing_trader(&config)?;
            let outcome = trader
                .buy(
                    wallet,
                    &factory.market(market),
                    &factory.fungible_token(collateral),
                    investment,
                    outcome,
                    slippage_bps,
                )
                .await?;
            print_outcome("BUY", &outcome)?;
        }
        Commands::SellAll {
            market,
            condition_id,
            outcome,
            index_set,
            collateral,
            registry,
            decimals,
        } => {
            let (trader, factory, wallet) = signing_trader(&config)?;
            let registry = factory.conditional_tokens(registry);
            let position = Position {
                collateral,
                condition_id,
                index_set: index_set.unwrap_or_else(|| index_set_for(outcome)),
            };
            let position_id = position.resolve(&config, &registry).await?;
            let outcome = trader
                .sell_all(
                    wallet,
                    &factory.market(market),
                    &registry,
                    position_id,
                    outcome,
                    decimals,
                )
                .await?;
            print_outcome("SELL ALL", &outcome)?;
        }
        Commands::Redeem {
            condition_id,
            index_sets,
            collateral,
            registry,
        } => {
            let (trader, factory, wallet) = signing_trader(&config)?;
            let outcome = trader
                .redeem(
                    wallet,
                    &factory.conditional_tokens(registry),
                    collateral,
                    condition_id,
                    index_sets,
                )
                .await?;
            print_outcome("REDEEM", &outcome)?;
        }
    }

    Ok(())
}

/// Factory bound to the configured signer, or read-only without a key
fn factory(config: &Config) -> Result<ContractFactory> {
    let access = if config.private_key.is_some() {
        ChainAccess::with_signer(&config.polygon_rpc_url, config.signer()?)?
    } else {
        ChainAccess::read_only(&config.polygon_rpc_url)?
    };
    Ok(ContractFactory::new(access))
}

fn signing_trader(config: &Config) -> Result<(MarketTrader, ContractFactory, Address)> {
    let signer = config.signer()?;
    let wallet = signer.address();
    let factory = ContractFactory::new(ChainAccess::with_signer(&config.polygon_rpc_url, signer)?);
    let log: Arc<dyn TxLog> = Arc::new(TracingLog);
    let trader = MarketTrader::new(Arc::new(TransactionLock::new()), config.tx.clone(), log);
    info!("Signing as {}", wallet);
    Ok((trader, factory, wallet))
}

/// Outcome position named by its condition rather than its token id
struct Position {
    collateral: Address,
    condition_id: B256,
    index_set: U256,
}

impl Position {
    async fn resolve(&self, config: &Config, registry: &ConditionalTokensHandle) -> Result<U256> {
        let position_id = position_id_for(
            registry,
            self.collateral,
            self.condition_id,
            self.index_set,
            &config.tx.retry,
            &TracingLog,
        )
        .await?;
        info!(
            "Position for condition {} index set {}: {}",
            self.condition_id, self.index_set, position_id
        );
        Ok(position_id)
    }
}

fn resolve_owner(factory: &ContractFactory, owner: Option<Address>) -> Result<Address> {
    owner
        .or_else(|| factory.access().wallet())
        .context("--owner required when POLYMARKET_PRIVATE_KEY is not set")
}

async fn show_allowance(
    config: &Config,
    spender: Address,
    owner: Option<Address>,
    token: Address,
    decimals: u8,
) -> Result<()> {
    let factory = factory(config)?;
    let owner = resolve_owner(&factory, owner)?;
    let token = factory.fungible_token(token);

    let retry = &config.tx.retry;
    let balance = with_retry(retry, &TracingLog, Some(owner), "balanceOf", || token.balance_of(owner)).await?;
    let allowance = with_retry(retry, &TracingLog, Some(owner), "allowance", || {
        token.allowance(owner, spender)
    })
    .await?;

    println!("\n{}", "=".repeat(70));
    println!("  COLLATERAL");
    println!("{}\n", "=".repeat(70));
    println!("  Owner:     {}", owner);
    println!("  Spender:   {}", spender);
    println!("  Balance:   {}", format_units(balance, decimals, 6)?);
    println!("  Allowance: {}", format_allowance(allowance, decimals));
    println!();

    Ok(())
}

fn format_allowance(allowance: U256, decimals: u8) -> String {
    if allowance == U256::MAX {
        return "unlimited".to_string();
    }
    match format_units(allowance, decimals, 6) {
        Ok(value) => value.to_string(),
        Err(_) => format!("{} (raw)", allowance),
    }
}

async fn approve_operator(config: &Config, operator: Address, registry: Address) -> Result<()> {
    let (trader, factory, wallet) = signing_trader(config)?;
    let registry = factory.conditional_tokens(registry);

    let outcome = trader
        .approvals()
        .ensure_operator_approval(wallet, &registry, operator)
        .await?;

    if outcome.is_success() {
        println!(
            "Operator {} approved ({} transaction(s) sent)",
            operator,
            outcome.transaction_count()
        );
    } else {
        anyhow::bail!("Operator approval failed: {:?}", outcome);
    }
    Ok(())
}

async fn estimate_sell(
    config: &Config,
    market: Address,
    position: Position,
    outcome: u64,
    owner: Option<Address>,
    registry: Address,
    decimals: u8,
) -> Result<()> {
    let factory = factory(config)?;
    let owner = resolve_owner(&factory, owner)?;
    let registry = factory.conditional_tokens(registry);
    let market = factory.market(market);

    let position_id = position.resolve(config, &registry).await?;
    let balance = with_retry(&config.tx.retry, &TracingLog, Some(owner), "balanceOf", || {
        registry.balance_of(owner, position_id)
    })
    .await?;
    let redeemable = estimate_max_redeemable(&market, outcome, balance, decimals).await;

    let balance_units = format_units(balance, decimals, 6)?;
    let redeemable_units = format_units(redeemable, decimals, 6)?;
    println!("  Position balance: {}", balance_units);
    println!("  Max redeemable:   {}", redeemable_units);
    if !balance_units.is_zero() && !redeemable.is_zero() {
        println!("  Avg price:        {:.4}", redeemable_units / balance_units);
    }

    Ok(())
}

fn print_outcome(action: &str, outcome: &TradeOutcome) -> Result<()> {
    println!("\n{}", "=".repeat(70));
    println!("  {}", action);
    println!("{}\n", "=".repeat(70));
    println!("{}", serde_json::to_string_pretty(outcome)?);
    if let TradeOutcome::Aborted { reason } = outcome {
        anyhow::bail!("{} aborted: {}", action, reason);
    }
    Ok(())
}
