//! anchorctl: read-only AnchorUSD client
//!
//! Queries positions, history and protocol metrics, and projects the
//! health-factor effect of an operation before it is signed. Never signs.
//!
//! # Usage
//!
//! ```bash
//! anchorctl status
//! anchorctl user 0xAbC...
//! anchorctl --account 0xAbC... history
//! anchorctl project deposit 1.5 WETH
//! anchorctl project redeem-and-burn 0.5 WETH 400
//!
//! # More logging
//! RUST_LOG=anchor_client=debug anchorctl metrics
//! ```
//!
//! # Environment Variables
//!
//! - `ANCHOR_ENGINE_ADDRESS`: Collateral engine (required)
//! - `ANCHOR_STABLECOIN_ADDRESS`: Stablecoin token (required)
//! - `ANCHOR_ACCOUNT_ADDRESS`: Account used when no address is given
//! - `ANCHOR_COLLATERAL_SYMBOLS` / `_ADDRESSES` / `_NAMES` / `_DECIMALS`: Collateral table
//! - `ANCHOR_QUERY_API_URL`: Query API (default: http://localhost:8080)
//! - `ANCHOR_LIQUIDATION_THRESHOLD`: Percent used for combined projections (default: 50)

use alloy_primitives::Address;
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use anchor_client::{project_once, Config, OperationInput, ProjectionInput};
use anchor_connectors::{QueryApiClient, Transaction};
use anchor_domain::{
    AssetRegistry, HealthFactor, OperationKind, ScaledAmount, DEFAULT_DISPLAY_DECIMALS,
    STABLECOIN_DECIMALS,
};

#[derive(Parser, Debug)]
#[command(name = "anchorctl")]
#[command(about = "AnchorUSD positions, history and health-factor projections")]
struct Args {
    /// Account for `project`, and for `user`/`history` without an address
    /// (overrides ANCHOR_ACCOUNT_ADDRESS)
    #[arg(short, long, global = true)]
    account: Option<Address>,

    /// Print raw JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query API status
    Status,

    /// Position of an account
    User {
        /// Account address (default: --account)
        address: Option<Address>,
    },

    /// Indexed transactions of an account
    History {
        /// Account address (default: --account)
        address: Option<Address>,
    },

    /// Protocol-wide risk metrics
    Metrics,

    /// Health factor after an operation
    Project {
        /// deposit | mint | burn | redeem | redeem-and-burn | liquidate
        kind: OperationKind,
        /// Amount in the asset's units
        amount: String,
        /// Collateral symbol
        symbol: Option<String>,
        /// Burn amount for redeem-and-burn
        burn_amount: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("anchor_client=info".parse()?))
        .init();

    let args = Args::parse();

    // Load configuration
    let config = Config::from_env()?;
    let registry = config.asset_registry()?;
    let client = QueryApiClient::new(config.query_api.url.clone(), config.query_api.timeout);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        query_api = %client.base_url(),
        "anchorctl"
    );

    match args.command {
        Command::Status => {
            let status = client.status().await?;
            if args.json {
                println!("{}", serde_json::json!({ "status": status }));
                return Ok(());
            }
            println!("Query API: {}", status);
        }
        Command::User { address } => {
            let address = resolve_account(address.or(args.account), &config)?;
            let data = client.user_data(address).await?;
            if args.json {
                return print_json(&data);
            }
            let health_factor = data.health_factor()?;

            println!("Account:          {}", address);
            println!("Debt:             {} {}", stable(data.total_debt()?), registry.stablecoin().symbol);
            println!("Collateral value: ${}", stable(data.collateral_value()?));
            println!("Max mintable:     {} {}", stable(data.max_mintable()?), registry.stablecoin().symbol);
            println!("Health factor:    {} ({})", health_factor, health_factor.status());

            for deposit in &data.collateral_deposited {
                println!(
                    "  {:<6} {:>18}  ${}",
                    deposit.asset,
                    units(&registry, &deposit.asset, &deposit.amount),
                    base_units(&deposit.value_usd, STABLECOIN_DECIMALS)
                );
            }
        }
        Command::History { address } => {
            let address = resolve_account(address.or(args.account), &config)?;
            let history = client.history(address).await?;
            if args.json {
                return print_json(&history);
            }
            print_transactions("Deposits", &history.deposits, &registry);
            print_transactions("Mint / burn", &history.mint_burn, &registry);
            print_transactions("Liquidations", &history.liquidations, &registry);
        }
        Command::Metrics => {
            let metrics = client.dashboard_metrics().await?;
            if args.json {
                return print_json(&metrics);
            }
            let health = &metrics.protocol_health;

            println!("Total collateral:  ${}", base_units(&metrics.total_collateral.value, STABLECOIN_DECIMALS));
            for share in &metrics.total_collateral.breakdown {
                println!("  {:<6} {:>6}%", share.asset, share.percentage.round_dp(2));
            }
            println!(
                "Stablecoin supply: {} (backing {})",
                base_units(&metrics.stable_supply.total, STABLECOIN_DECIMALS),
                metrics.stable_supply.backing.round_dp(2)
            );
            println!(
                "Users at risk:     {} of {} (avg health {})",
                health.users_at_risk,
                health.total_users,
                health.average_health_factor.round_dp(2)
            );
            println!("Liquidatable:      {}", metrics.liquidatable_users.len());
            for user in &metrics.liquidatable_users {
                println!(
                    "  {}  health {}  cover {}",
                    user.address,
                    health_factor(&user.health_factor),
                    base_units(&user.liquidation_amount, STABLECOIN_DECIMALS)
                );
            }
        }
        Command::Project { kind, amount, symbol, burn_amount } => {
            let account = resolve_account(args.account, &config)?;

            let mut input = OperationInput::new(kind, amount);
            if let Some(symbol) = symbol {
                input = input.with_asset(symbol);
            }
            if let Some(burn_amount) = burn_amount {
                input = input.with_secondary_amount(burn_amount);
            }
            if kind == OperationKind::Liquidate {
                // Only the input is validated; liquidations have no projection
                input = input.with_liquidation_target(account.to_string());
            }

            let request = input.to_request(&registry)?;
            let projection = project_once(
                &client,
                account,
                &ProjectionInput::from_request(&request),
                config.projector.liquidation_threshold,
            )
            .await
            .context("projection failed")?;

            if args.json {
                return print_json(&projection);
            }

            match projection {
                Some(projection) => {
                    let asset = request.asset();
                    println!(
                        "After {} of {} {}:",
                        kind,
                        asset.format_amount(request.amount(), DEFAULT_DISPLAY_DECIMALS),
                        asset.symbol
                    );
                    println!("  Health factor:    {} ({})", projection.health_factor, projection.health_factor.status());
                    println!("  Debt:             {}", stable(projection.projected_debt));
                    println!("  Collateral value: ${}", stable(projection.projected_collateral_value));
                    if projection.breaks_minimum() {
                        println!("  Warning: the position would be liquidatable");
                    }
                }
                None => println!("No projection available for {}", kind),
            }
        }
    }

    Ok(())
}

fn resolve_account(explicit: Option<Address>, config: &Config) -> anyhow::Result<Address> {
    match explicit {
        Some(account) => Ok(account),
        None => Ok(config.require_account()?),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn stable(amount: ScaledAmount) -> String {
    amount.to_decimal_string(STABLECOIN_DECIMALS, DEFAULT_DISPLAY_DECIMALS)
}

/// Format a base-unit integer string; unparseable values are shown as is.
fn base_units(raw: &str, decimals: u8) -> String {
    ScaledAmount::from_decimal_str(raw, 0)
        .map(|amount| amount.to_decimal_string(decimals, DEFAULT_DISPLAY_DECIMALS))
        .unwrap_or_else(|_| raw.to_string())
}

fn units(registry: &AssetRegistry, symbol: &str, raw: &str) -> String {
    let decimals = registry.by_symbol(symbol).map(|asset| asset.decimals).unwrap_or(STABLECOIN_DECIMALS);
    base_units(raw, decimals)
}

fn health_factor(raw: &str) -> String {
    ScaledAmount::from_decimal_str(raw, 0)
        .map(|amount| HealthFactor::from_raw(amount.as_u256()).to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn print_transactions(title: &str, transactions: &[Transaction], registry: &AssetRegistry) {
    println!("{} ({})", title, transactions.len());
    for tx in transactions {
        let symbol = tx.asset.as_deref().unwrap_or(&registry.stablecoin().symbol);
        println!(
            "  {}  {:?}  {:>18} {:<6} {:?}  {}",
            tx.timestamp,
            tx.kind,
            units(registry, symbol, &tx.amount),
            symbol,
            tx.status,
            tx.tx_hash
        );
    }
}
