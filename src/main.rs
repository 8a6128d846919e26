//! Delta Exchange Auto-Trader
//!
//! Evaluates user-defined trading configurations (price, volume, RSI and
//! moving-average crossover conditions) on independent schedules and manages
//! the resulting trades through entry, stop-loss and take-profit.

mod api;
mod bot;
mod db;
mod error;
mod indicators;
mod models;
mod trading;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::api::{DeltaClient, DELTA_API_BASE};
use crate::bot::{activate, add_configuration, deactivate, Bot, BotConfig};
use crate::db::{ConfigurationStore, Database};
use crate::models::{EntryCondition, Trade, TradeSide, TradingConfiguration};
use crate::trading::{ExecutionAdapter, TradingConfig, TradingEngine};

/// Rule-based auto-trader CLI.
#[derive(Parser)]
#[command(name = "autotrader")]
#[command(about = "Run rule-based trading configurations against Delta Exchange", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./autotrader.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Delta Exchange API key
    #[arg(long, env = "DELTA_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Delta Exchange API secret
    #[arg(long, env = "DELTA_API_SECRET", default_value = "", hide_env_values = true)]
    api_secret: String,

    /// Delta Exchange REST base URL
    #[arg(long, env = "DELTA_BASE_URL", default_value = DELTA_API_BASE)]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a configuration from a JSON file
    Add {
        /// Path to the configuration JSON
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List all configurations
    List,

    /// Show a configuration with its conditions and trades
    Show {
        /// Configuration id
        id: String,
    },

    /// Mark a configuration active
    Start {
        /// Configuration id
        id: String,
    },

    /// Mark a configuration inactive
    Stop {
        /// Configuration id
        id: String,
    },

    /// Delete a configuration, keeping its trade history
    Delete {
        /// Configuration id
        id: String,
    },

    /// Add a manual trade to a configuration
    Trade {
        /// Configuration id
        config_id: String,

        /// buy or sell
        #[arg(short, long, value_parser = parse_side)]
        side: TradeSide,

        /// Quantity in contracts
        #[arg(short, long)]
        quantity: Decimal,

        /// Entry condition (above, below, equals, market)
        #[arg(short, long, default_value = "market", value_parser = parse_entry)]
        entry: EntryCondition,

        /// Entry trigger price, required unless entry is market
        #[arg(short, long)]
        price: Option<Decimal>,

        /// Absolute stop-loss price
        #[arg(long)]
        stop_loss: Option<Decimal>,

        /// Absolute take-profit price
        #[arg(long)]
        take_profit: Option<Decimal>,
    },

    /// Evaluate a configuration's conditions once without trading
    Check {
        /// Configuration id
        id: String,
    },

    /// Show the current ticker for a symbol
    Price {
        /// Product symbol, e.g. BTCUSD
        symbol: String,
    },

    /// Run every active configuration until Ctrl+C
    Run {
        /// Simulate orders instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Balance used for risk sizing in dry-run mode
        #[arg(long, default_value = "10000")]
        paper_balance: Decimal,

        /// Seconds between store re-syncs
        #[arg(long, default_value = "5")]
        sync_interval: u64,

        /// Lot step order sizes are rounded down to
        #[arg(long)]
        size_step: Option<Decimal>,
    },
}

fn parse_side(s: &str) -> Result<TradeSide, String> {
    TradeSide::parse(s).ok_or_else(|| format!("invalid side '{}', expected buy or sell", s))
}

fn parse_entry(s: &str) -> Result<EntryCondition, String> {
    EntryCondition::parse(s)
        .ok_or_else(|| format!("invalid entry '{}', expected above, below, equals or market", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    init_logging(&cli.log_level)?;

    // Initialize database
    let db = Arc::new(Database::new(&cli.database).await?);

    match cli.command {
        Commands::Add { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let config: TradingConfiguration =
                serde_json::from_str(&raw).context("Invalid configuration JSON")?;

            let config = add_configuration(db.as_ref(), config).await?;
            info!(config_id = %config.id, symbol = %config.symbol, "Configuration added");
            println!("Added configuration {} ({})", config.id, config.symbol);
        }

        Commands::List => {
            let configs = db.load_configurations().await?;

            if configs.is_empty() {
                println!("No configurations. Use 'autotrader add --file <config.json>' to add one.");
                return Ok(());
            }

            println!(
                "\n{:<36} {:<16} {:<10} {:>10} {:>6} {:>8}",
                "ID", "NAME", "SYMBOL", "INTERVAL", "CONDS", "STATUS"
            );
            println!("{}", "-".repeat(91));

            for config in configs {
                println!(
                    "{:<36} {:<16} {:<10} {:>9}s {:>6} {:>8}",
                    config.id,
                    truncate(config.name.as_deref().unwrap_or("-"), 16),
                    config.symbol,
                    config.interval_ms / 1000,
                    config.conditions.len(),
                    if config.active { "active" } else { "stopped" }
                );
            }
        }

        Commands::Show { id } => {
            let config = db
                .load_configuration(&id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Configuration not found: {}", id))?;

            println!("\n=== Configuration: {} ===", config.display_name());
            println!("ID:        {}", config.id);
            println!("Symbol:    {}", config.symbol);
            println!("Interval:  {} ms", config.interval_ms);
            println!("Timeframe: {}", config.timeframe);
            println!("Status:    {}", if config.active { "active" } else { "stopped" });
            println!("Created:   {}", config.created_at.to_rfc3339());

            println!("\n--- Conditions ({}) ---", config.conditions.len());
            for condition in &config.conditions {
                println!(
                    "  [{}] {} -> {} {} (SL: {} TP: {} risk: {}%)",
                    truncate(&condition.id, 8),
                    serde_json::to_string(&condition.signal)?,
                    condition.action.as_str(),
                    condition.quantity,
                    fmt_opt(condition.stop_loss.map(|p| format!("{}%", p))),
                    fmt_opt(condition.take_profit.map(|p| format!("{}%", p))),
                    condition.risk_percent
                );
            }

            let trades = db.load_trades(&config.id).await?;
            println!("\n--- Trades ({}) ---", trades.len());
            for trade in &trades {
                println!(
                    "  {} {:<4} {:>8} {:<9} entry: {} SL: {} TP: {} exit: {} P&L: {}",
                    truncate(&trade.id, 8),
                    trade.side.as_str(),
                    trade.open_size(),
                    trade.status.as_str(),
                    fmt_opt(trade.entry_price),
                    fmt_opt(trade.stop_loss_price),
                    fmt_opt(trade.take_profit_price),
                    fmt_opt(trade.exit_price),
                    fmt_opt(trade.realized_pnl()),
                );
            }
        }

        Commands::Start { id } => {
            let config = activate(db.as_ref(), &id).await?;
            println!("Started {} ({}). A running bot picks it up on its next sync.", config.display_name(), config.symbol);
        }

        Commands::Stop { id } => {
            let config = deactivate(db.as_ref(), &id).await?;
            println!("Stopped {} ({}).", config.display_name(), config.symbol);
        }

        Commands::Delete { id } => {
            // a running bot stops the schedule on its next sync, then removes the row
            if db.delete_configuration(&id).await? {
                println!("Deleted configuration {}. Its trades are kept.", id);
            } else {
                println!("Configuration not found: {}", id);
            }
        }

        Commands::Trade {
            config_id,
            side,
            quantity,
            entry,
            price,
            stop_loss,
            take_profit,
        } => {
            let config = db
                .load_configuration(&config_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Configuration not found: {}", config_id))?;

            if quantity <= Decimal::ZERO {
                bail!("Quantity must be positive");
            }
            if entry != EntryCondition::Market && price.is_none() {
                bail!("--price is required for '{}' entries", entry.as_str());
            }

            let trade = Trade::new(&config.id, &config.symbol, side, quantity, entry, price)
                .with_protection(stop_loss, take_profit);

            // market entries are checked against the current price
            let reference = match price {
                Some(price) => Some(price),
                None if stop_loss.is_some() || take_profit.is_some() => {
                    let client = DeltaClient::new(&cli.api_key, &cli.api_secret, &cli.base_url)?;
                    match client.get_current_price(&config.symbol).await {
                        Ok(current) => Some(current),
                        Err(e) => {
                            warn!(symbol = %config.symbol, error = %e, "Current price unavailable, checking stop-loss against take-profit only");
                            None
                        }
                    }
                }
                None => None,
            };
            if let Err(reason) = trade.validate_protection(reference) {
                bail!("Invalid trade: {}", reason);
            }

            db.save_trades(std::slice::from_ref(&trade)).await?;

            info!(trade_id = %trade.id, config_id = %config.id, "Manual trade added");
            println!("Added pending trade {} on {}", trade.id, config.symbol);
        }

        Commands::Check { id } => {
            let config = db
                .load_configuration(&id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Configuration not found: {}", id))?;

            let exchange = Arc::new(DeltaClient::new(&cli.api_key, &cli.api_secret, &cli.base_url)?);
            let engine = TradingEngine::new(exchange, db.clone(), TradingConfig::default());
            let (ticker, checks) = engine.evaluate_conditions(&config).await?;

            println!(
                "\n{} last: {} volume: {}",
                ticker.symbol, ticker.last_price, ticker.volume_24h
            );
            println!("\n{:<10} {:<10} {:<6} {}", "CONDITION", "TYPE", "ACTION", "RESULT");
            println!("{}", "-".repeat(60));

            for check in checks {
                let result = match &check.result {
                    Ok(true) => "FIRES".to_string(),
                    Ok(false) => "-".to_string(),
                    Err(e) => format!("error: {}", e),
                };
                println!(
                    "{:<10} {:<10} {:<6} {}",
                    truncate(&check.condition_id, 10),
                    check.kind,
                    check.action.as_str(),
                    result
                );
            }
        }

        Commands::Price { symbol } => {
            let client = DeltaClient::new(&cli.api_key, &cli.api_secret, &cli.base_url)?;
            let ticker = client.get_ticker(&symbol).await?;
            println!("{} last: {} 24h volume: {}", ticker.symbol, ticker.last_price, ticker.volume_24h);
        }

        Commands::Run {
            mut dry_run,
            paper_balance,
            sync_interval,
            size_step,
        } => {
            if !dry_run && (cli.api_key.is_empty() || cli.api_secret.is_empty()) {
                warn!("DELTA_API_KEY / DELTA_API_SECRET not set. Running in dry-run mode.");
                dry_run = true;
            }

            let bot_config = BotConfig {
                dry_run,
                paper_balance,
                sync_interval_secs: sync_interval,
                trading_config: TradingConfig {
                    size_step,
                    ..Default::default()
                },
            };

            let exchange = Arc::new(DeltaClient::new(&cli.api_key, &cli.api_secret, &cli.base_url)?);
            let mut bot = Bot::new(bot_config, db.clone(), exchange);

            let active = db.load_configurations().await?.iter().filter(|c| c.active).count();

            println!("\n=== Delta Auto-Trader ===");
            println!("Mode: {}", if dry_run { "DRY RUN (no real orders)" } else { "LIVE TRADING" });
            println!("Active configurations: {}", active);
            println!("\nPress Ctrl+C to stop.\n");

            // Run the bot
            if let Err(e) = bot.run().await {
                tracing::error!(error = %e, "Bot error");
            }

            // Show final stats
            match bot.get_stats().await {
                Ok(stats) => println!("\n{}", stats),
                Err(e) => warn!(error = %e, "Failed to collect stats"),
            }
        }
    }

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over `--log-level` when set.
fn init_logging(level: &str) -> Result<()> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(());
    }

    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Truncate a string for display.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
