//! Bot runner: keeps the scheduler in step with stored configurations.
//!
//! Handles:
//! - Activating and deactivating stored configurations
//! - Scheduling every active configuration at startup
//! - Periodic reconciliation with the store while running, including
//!   stopping deleted configurations before their rows are purged
//! - Graceful shutdown that waits for in-flight ticks

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::api::PaperExchange;
use crate::db::ConfigurationStore;
use crate::error::EngineError;
use crate::models::{TradeStatus, TradingConfiguration};
use crate::trading::{ExecutionAdapter, Scheduler, TradingConfig, TradingEngine};

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Simulate orders instead of sending them
    pub dry_run: bool,

    /// Balance reported to risk sizing in dry-run mode
    pub paper_balance: Decimal,

    /// How often the store is re-read for started/stopped configurations (seconds)
    pub sync_interval_secs: u64,

    /// Engine-wide trading defaults
    pub trading_config: TradingConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            paper_balance: dec!(10000),
            sync_interval_secs: 5,
            trading_config: TradingConfig::default(),
        }
    }
}

/// Load a configuration or report it missing.
async fn load_existing(store: &dyn ConfigurationStore, id: &str) -> Result<TradingConfiguration> {
    store
        .load_configuration(id)
        .await?
        .ok_or_else(|| EngineError::ConfigurationNotFound(id.to_string()).into())
}

/// Store a new configuration, inactive, refusing an id already in use.
pub async fn add_configuration(
    store: &dyn ConfigurationStore,
    mut config: TradingConfiguration,
) -> Result<TradingConfiguration> {
    if config.id.is_empty() {
        config.id = uuid::Uuid::new_v4().to_string();
    } else if store.load_configuration(&config.id).await?.is_some() {
        bail!("Configuration {} already exists", config.id);
    }

    config.active = false;
    config.created_at = Utc::now();
    config.validate().map_err(EngineError::InvalidConfiguration)?;

    store.save_configuration(&config).await?;
    Ok(config)
}

/// Validate and mark a configuration active in the store.
pub async fn activate(store: &dyn ConfigurationStore, id: &str) -> Result<TradingConfiguration> {
    let mut config = load_existing(store, id).await?;
    config
        .validate_for_activation()
        .map_err(EngineError::InvalidConfiguration)?;

    if !config.active {
        config.active = true;
        store.save_configuration(&config).await?;
    }
    Ok(config)
}

/// Mark a configuration inactive in the store.
pub async fn deactivate(store: &dyn ConfigurationStore, id: &str) -> Result<TradingConfiguration> {
    let mut config = load_existing(store, id).await?;
    if config.active {
        config.active = false;
        store.save_configuration(&config).await?;
    }
    Ok(config)
}

/// Main bot runner.
pub struct Bot {
    config: BotConfig,
    store: Arc<dyn ConfigurationStore>,
    scheduler: Scheduler,

    // Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl Bot {
    /// Create a bot trading through `exchange`, or a paper wrapper around it in dry-run mode.
    pub fn new(
        config: BotConfig,
        store: Arc<dyn ConfigurationStore>,
        exchange: Arc<dyn ExecutionAdapter>,
    ) -> Self {
        let exchange: Arc<dyn ExecutionAdapter> = if config.dry_run {
            info!(balance = %config.paper_balance, "Dry run: orders are simulated");
            Arc::new(PaperExchange::new(exchange, config.paper_balance))
        } else {
            exchange
        };

        let engine = Arc::new(TradingEngine::new(
            exchange,
            store.clone(),
            config.trading_config.clone(),
        ));

        Self {
            config,
            store,
            scheduler: Scheduler::new(engine),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bring the scheduler in line with the store.
    ///
    /// Force-stops and purges deleted configurations, starts newly active
    /// ones, stops deactivated ones and restarts any whose interval changed.
    pub async fn sync(&mut self) -> Result<()> {
        for id in self.store.deleted_configuration_ids().await? {
            // waits for an in-flight tick before the row goes
            if self.scheduler.stop(&id).await {
                info!(config_id = %id, "Stopped deleted configuration");
            }
            if self.store.purge_configuration(&id).await? {
                info!(config_id = %id, "Configuration removed");
            }
        }

        let configs = self.store.load_configurations().await?;
        let mut seen = HashSet::new();

        for config in configs {
            seen.insert(config.id.clone());

            if !config.active {
                if self.scheduler.stop(&config.id).await {
                    info!(config_id = %config.id, "Configuration deactivated");
                }
                continue;
            }

            if let Err(reason) = config.validate_for_activation() {
                warn!(config_id = %config.id, reason = %reason, "Active configuration is invalid, not scheduling");
                self.scheduler.stop(&config.id).await;
                continue;
            }

            match self.scheduler.interval_of(&config.id) {
                Some(current) if current == config.interval() => {}
                Some(_) => {
                    info!(config_id = %config.id, interval_ms = config.interval_ms, "Interval changed, restarting");
                    self.scheduler.stop(&config.id).await;
                    self.scheduler.start(&config.id, config.interval());
                }
                None => {
                    info!(
                        config_id = %config.id,
                        name = %config.display_name(),
                        symbol = %config.symbol,
                        "Scheduling configuration"
                    );
                    self.scheduler.start(&config.id, config.interval());
                }
            }
        }

        for id in self.scheduler.scheduled_ids() {
            if !seen.contains(&id) {
                info!(config_id = %id, "Configuration removed, stopping");
                self.scheduler.stop(&id).await;
            }
        }

        Ok(())
    }

    /// Main run loop.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            dry_run = self.config.dry_run,
            sync_interval = self.config.sync_interval_secs,
            "Starting bot run loop"
        );

        self.sync().await?;

        let mut sync_interval = interval(Duration::from_secs(self.config.sync_interval_secs.max(1)));
        // first tick completes immediately and the initial sync already ran
        sync_interval.tick().await;

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            sync_interval.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            debug!("Syncing configurations");
            if let Err(e) = self.sync().await {
                error!(error = %e, "Error syncing configurations");
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Graceful shutdown.
    async fn shutdown(&mut self) {
        info!("Shutting down bot...");
        self.scheduler.stop_all().await;
        info!("Bot shutdown complete");
    }

    /// Get current stats.
    pub async fn get_stats(&self) -> Result<BotStats> {
        let configs = self.store.load_configurations().await?;

        let mut stats = BotStats {
            configurations: configs.len(),
            active_configurations: configs.iter().filter(|c| c.active).count(),
            scheduled: self.scheduler.scheduled_ids().len(),
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        for config in &configs {
            for trade in self.store.load_trades(&config.id).await? {
                match trade.status {
                    TradeStatus::Pending => stats.pending_trades += 1,
                    TradeStatus::Active => stats.active_trades += 1,
                    TradeStatus::Stopped | TradeStatus::Completed => {
                        stats.closed_trades += 1;
                        stats.realized_pnl += trade.realized_pnl().unwrap_or_default();
                    }
                }
            }
        }

        Ok(stats)
    }
}

/// Bot statistics.
#[derive(Debug, Clone, Default)]
pub struct BotStats {
    pub configurations: usize,
    pub active_configurations: usize,
    pub scheduled: usize,
    pub pending_trades: usize,
    pub active_trades: usize,
    pub closed_trades: usize,
    pub realized_pnl: Decimal,
    pub dry_run: bool,
}

impl std::fmt::Display for BotStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Bot Statistics ===")?;
        writeln!(f, "Configurations:  {} ({} active, {} scheduled)",
            self.configurations, self.active_configurations, self.scheduled)?;
        writeln!(f, "Trades:          {} pending, {} active, {} closed",
            self.pending_trades, self.active_trades, self.closed_trades)?;
        writeln!(f, "Realized P&L:    {:.2}", self.realized_pnl)?;
        writeln!(f, "Mode:            {}", if self.dry_run { "Dry Run" } else { "Live" })?;
        Ok(())
    }
}
