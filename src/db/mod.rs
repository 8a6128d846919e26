//! Database persistence for configurations and their trades.
//!
//! Stores everything needed to resume after restart:
//! - Trading configurations with their conditions and active flag
//! - Every trade ever created, retained as history even after its
//!   configuration is deleted

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::error;

use crate::models::{EntryCondition, Trade, TradeSide, TradeStatus, TradingConfiguration};

/// Load/save contract the engine and bot depend on.
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    async fn load_configurations(&self) -> Result<Vec<TradingConfiguration>>;

    async fn load_configuration(&self, id: &str) -> Result<Option<TradingConfiguration>>;

    async fn save_configuration(&self, config: &TradingConfiguration) -> Result<()>;

    /// Mark a configuration deleted and inactive. It disappears from loads
    /// at once; the row stays until [`purge_configuration`] so a running bot
    /// can stop its schedule first. Returns false if it did not exist.
    ///
    /// [`purge_configuration`]: ConfigurationStore::purge_configuration
    async fn delete_configuration(&self, id: &str) -> Result<bool>;

    /// Ids marked deleted but not yet purged.
    async fn deleted_configuration_ids(&self) -> Result<Vec<String>>;

    /// Remove a configuration marked deleted. Its trades are kept.
    async fn purge_configuration(&self, id: &str) -> Result<bool>;

    async fn load_trades(&self, config_id: &str) -> Result<Vec<Trade>>;

    /// Insert or update trades in one transaction.
    async fn save_trades(&self, trades: &[Trade]) -> Result<()>;
}

/// Database connection pool.
pub struct Database {
    pool: SqlitePool,
}

/// Stored configuration row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredConfiguration {
    pub id: String,
    pub name: Option<String>,
    pub symbol: String,
    pub interval_ms: i64,
    pub timeframe: String,
    pub is_active: bool,
    pub conditions: String,
    pub created_at: String,
}

/// Stored trade row. Decimals are kept as text to stay exact.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredTrade {
    pub id: String,
    pub config_id: String,
    pub symbol: String,
    pub side: String,
    pub quantity: String,
    pub size: Option<String>,
    pub risk_percent: Option<String>,
    pub entry_condition: String,
    pub source_condition: Option<String>,
    pub status: String,
    pub entry_price: Option<String>,
    pub stop_loss_price: Option<String>,
    pub take_profit_price: Option<String>,
    pub exit_price: Option<String>,
    pub entry_order_id: Option<String>,
    pub exit_order_id: Option<String>,
    pub created_at: String,
    pub entry_time: Option<String>,
    pub exit_time: Option<String>,
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        // every in-memory connection is its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS configurations (
                id TEXT PRIMARY KEY,
                name TEXT,
                symbol TEXT NOT NULL,
                interval_ms INTEGER NOT NULL,
                timeframe TEXT NOT NULL DEFAULT '1h',
                is_active INTEGER NOT NULL DEFAULT 0,
                conditions TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                config_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity TEXT NOT NULL,
                size TEXT,
                risk_percent TEXT,
                entry_condition TEXT NOT NULL,
                source_condition TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                entry_price TEXT,
                stop_loss_price TEXT,
                take_profit_price TEXT,
                exit_price TEXT,
                entry_order_id TEXT,
                exit_order_id TEXT,
                created_at TEXT NOT NULL,
                entry_time TEXT,
                exit_time TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_config ON trades(config_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ConfigurationStore for Database {
    async fn load_configurations(&self) -> Result<Vec<TradingConfiguration>> {
        let rows = sqlx::query_as::<_, StoredConfiguration>(
            r#"
            SELECT id, name, symbol, interval_ms, timeframe, is_active, conditions, created_at
            FROM configurations
            WHERE deleted_at IS NULL
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load configurations")?;

        let configs = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                match TradingConfiguration::try_from(row) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        error!(config_id = %id, error = %e, "Skipping unreadable configuration");
                        None
                    }
                }
            })
            .collect();

        Ok(configs)
    }

    async fn load_configuration(&self, id: &str) -> Result<Option<TradingConfiguration>> {
        let row = sqlx::query_as::<_, StoredConfiguration>(
            r#"
            SELECT id, name, symbol, interval_ms, timeframe, is_active, conditions, created_at
            FROM configurations
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load configuration {}", id))?;

        row.map(TradingConfiguration::try_from).transpose()
    }

    async fn save_configuration(&self, config: &TradingConfiguration) -> Result<()> {
        let conditions =
            serde_json::to_string(&config.conditions).context("Failed to encode conditions")?;
        let interval_ms = i64::try_from(config.interval_ms).context("Interval out of range")?;

        sqlx::query(
            r#"
            INSERT INTO configurations
                (id, name, symbol, interval_ms, timeframe, is_active, conditions, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                symbol = excluded.symbol,
                interval_ms = excluded.interval_ms,
                timeframe = excluded.timeframe,
                is_active = excluded.is_active,
                conditions = excluded.conditions,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            "#,
        )
        .bind(&config.id)
        .bind(&config.name)
        .bind(&config.symbol)
        .bind(interval_ms)
        .bind(&config.timeframe)
        .bind(config.active)
        .bind(conditions)
        .bind(config.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save configuration {}", config.id))?;

        Ok(())
    }

    async fn delete_configuration(&self, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE configurations
            SET is_active = 0, deleted_at = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to delete configuration {}", id))?;

        Ok(result.rows_affected() > 0)
    }

    async fn deleted_configuration_ids(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT id FROM configurations WHERE deleted_at IS NOT NULL ORDER BY deleted_at",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load deleted configurations")
    }

    async fn purge_configuration(&self, id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM configurations WHERE id = ? AND deleted_at IS NOT NULL")
                .bind(id)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to purge configuration {}", id))?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_trades(&self, config_id: &str) -> Result<Vec<Trade>> {
        let rows = sqlx::query_as::<_, StoredTrade>(
            "SELECT * FROM trades WHERE config_id = ? ORDER BY created_at",
        )
        .bind(config_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load trades for {}", config_id))?;

        rows.into_iter().map(Trade::try_from).collect()
    }

    async fn save_trades(&self, trades: &[Trade]) -> Result<()> {
        if trades.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for trade in trades {
            sqlx::query(
                r#"
                INSERT INTO trades (
                    id, config_id, symbol, side, quantity, size, risk_percent, entry_condition,
                    source_condition, status, entry_price, stop_loss_price, take_profit_price,
                    exit_price, entry_order_id, exit_order_id, created_at, entry_time, exit_time
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    size = excluded.size,
                    status = excluded.status,
                    entry_price = excluded.entry_price,
                    stop_loss_price = excluded.stop_loss_price,
                    take_profit_price = excluded.take_profit_price,
                    exit_price = excluded.exit_price,
                    entry_order_id = excluded.entry_order_id,
                    exit_order_id = excluded.exit_order_id,
                    entry_time = excluded.entry_time,
                    exit_time = excluded.exit_time
                "#,
            )
            .bind(&trade.id)
            .bind(&trade.config_id)
            .bind(&trade.symbol)
            .bind(trade.side.as_str())
            .bind(trade.quantity.to_string())
            .bind(trade.size.map(|d| d.to_string()))
            .bind(trade.risk_percent.map(|d| d.to_string()))
            .bind(trade.entry_condition.as_str())
            .bind(&trade.source_condition)
            .bind(trade.status.as_str())
            .bind(trade.entry_price.map(|d| d.to_string()))
            .bind(trade.stop_loss_price.map(|d| d.to_string()))
            .bind(trade.take_profit_price.map(|d| d.to_string()))
            .bind(trade.exit_price.map(|d| d.to_string()))
            .bind(&trade.entry_order_id)
            .bind(&trade.exit_order_id)
            .bind(trade.created_at.to_rfc3339())
            .bind(trade.entry_time.map(|t| t.to_rfc3339()))
            .bind(trade.exit_time.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to save trade {}", trade.id))?;
        }

        tx.commit().await.context("Failed to commit trades")?;
        Ok(())
    }
}

impl TryFrom<StoredConfiguration> for TradingConfiguration {
    type Error = anyhow::Error;

    fn try_from(row: StoredConfiguration) -> Result<Self> {
        let conditions = serde_json::from_str(&row.conditions)
            .with_context(|| format!("Corrupt conditions for configuration {}", row.id))?;

        Ok(Self {
            interval_ms: u64::try_from(row.interval_ms)
                .with_context(|| format!("Negative interval for configuration {}", row.id))?,
            created_at: parse_time(&row.created_at)?,
            id: row.id,
            name: row.name,
            symbol: row.symbol,
            timeframe: row.timeframe,
            active: row.is_active,
            conditions,
        })
    }
}

impl TryFrom<StoredTrade> for Trade {
    type Error = anyhow::Error;

    fn try_from(row: StoredTrade) -> Result<Self> {
        Ok(Self {
            side: TradeSide::parse(&row.side)
                .ok_or_else(|| anyhow!("Unknown side '{}' for trade {}", row.side, row.id))?,
            status: TradeStatus::parse(&row.status)
                .ok_or_else(|| anyhow!("Unknown status '{}' for trade {}", row.status, row.id))?,
            entry_condition: EntryCondition::parse(&row.entry_condition).ok_or_else(|| {
                anyhow!("Unknown entry condition '{}' for trade {}", row.entry_condition, row.id)
            })?,
            quantity: parse_decimal(&row.quantity)?,
            size: parse_opt_decimal(row.size.as_deref())?,
            risk_percent: parse_opt_decimal(row.risk_percent.as_deref())?,
            entry_price: parse_opt_decimal(row.entry_price.as_deref())?,
            stop_loss_price: parse_opt_decimal(row.stop_loss_price.as_deref())?,
            take_profit_price: parse_opt_decimal(row.take_profit_price.as_deref())?,
            exit_price: parse_opt_decimal(row.exit_price.as_deref())?,
            created_at: parse_time(&row.created_at)?,
            entry_time: row.entry_time.as_deref().map(parse_time).transpose()?,
            exit_time: row.exit_time.as_deref().map(parse_time).transpose()?,
            id: row.id,
            config_id: row.config_id,
            symbol: row.symbol,
            source_condition: row.source_condition,
            entry_order_id: row.entry_order_id,
            exit_order_id: row.exit_order_id,
        })
    }
}

fn parse_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("Invalid decimal '{}'", value))
}

fn parse_opt_decimal(value: Option<&str>) -> Result<Option<Decimal>> {
    value.map(parse_decimal).transpose()
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp '{}'", value))
}
