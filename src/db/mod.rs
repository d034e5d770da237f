//! SQLite persistence for the desk.
//!
//! Stores everything that must survive a restart:
//! - The single account row (balance, risk settings, drawdown, trading day)
//! - Currency pairs and chart patterns (seeded on first run)
//! - Pattern detections
//! - The trade journal
//! - Candles, imported or recorded from rate snapshots
//! - Free-form settings
//!
//! Money and prices are stored as TEXT decimals so values round-trip exactly.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, Executor, Sqlite, SqlitePool};
use tracing::debug;

use crate::models::{
    pair_catalog, pattern_catalog, Candle, ChartPattern, CurrencyPair, Direction, PairCategory,
    PatternDetection, PatternKind, TradeRecord, TradeStatus,
};
use crate::risk::{AccountState, RiskConfig, DEFAULT_BALANCE};

/// Database connection pool.
pub struct Database {
    pool: SqlitePool,
}

/// Account row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
struct AccountRow {
    balance: String,
    previous_balance: String,
    risk_percentage: String,
    drawdown_percentage: String,
    current_drawdown: String,
    trades_today: i64,
    trading_day: String,
}

/// Persisted account: validated config, mutable state and trading day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAccount {
    pub config: RiskConfig,
    pub state: AccountState,
    pub trading_day: NaiveDate,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PairRow {
    id: i64,
    symbol: String,
    name: String,
    category: String,
    pip_size: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PatternRow {
    id: i64,
    name: String,
    kind: String,
    description: String,
    reliability: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct DetectionRow {
    id: i64,
    pair_symbol: String,
    pattern_name: String,
    timeframe: String,
    entry_price: String,
    stop_loss: String,
    take_profit: Option<String>,
    confidence: f64,
    detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CandleRow {
    timestamp: DateTime<Utc>,
    open_price: String,
    high_price: String,
    low_price: String,
    close_price: String,
    volume: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TradeRow {
    id: i64,
    pair_symbol: String,
    direction: String,
    entry_price: String,
    stop_loss: String,
    take_profit: Option<String>,
    position_size: String,
    risk_amount: String,
    status: String,
    profit_loss: Option<String>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

/// Fields needed to open a journal trade.
#[derive(Debug, Clone)]
pub struct NewTrade<'a> {
    pub pair_symbol: &'a str,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Option<Decimal>,
    pub position_size: Decimal,
    pub risk_amount: Decimal,
}

/// Fields needed to store a detection.
#[derive(Debug, Clone)]
pub struct NewDetection<'a> {
    pub pair_symbol: &'a str,
    pub pattern_name: &'a str,
    pub timeframe: &'a str,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Option<Decimal>,
    pub confidence: f64,
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;
        db.seed_catalogs().await?;

        Ok(db)
    }

    /// Create all tables.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS account (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                balance TEXT NOT NULL,
                previous_balance TEXT NOT NULL,
                risk_percentage TEXT NOT NULL,
                drawdown_percentage TEXT NOT NULL,
                current_drawdown TEXT NOT NULL DEFAULT '0',
                trades_today INTEGER NOT NULL DEFAULT 0,
                trading_day TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS currency_pairs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                pip_size TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chart_patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                reliability REAL NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pattern_detections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair_id INTEGER NOT NULL,
                pattern_id INTEGER NOT NULL,
                timeframe TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                take_profit TEXT,
                confidence REAL NOT NULL,
                detected_at TEXT NOT NULL,
                FOREIGN KEY (pair_id) REFERENCES currency_pairs(id),
                FOREIGN KEY (pattern_id) REFERENCES chart_patterns(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair_id INTEGER NOT NULL,
                direction TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                take_profit TEXT,
                position_size TEXT NOT NULL,
                risk_amount TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                profit_loss TEXT,
                created_at TEXT NOT NULL,
                closed_at TEXT,
                FOREIGN KEY (pair_id) REFERENCES currency_pairs(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS historical_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair_id INTEGER NOT NULL,
                timeframe TEXT NOT NULL,
                open_price TEXT NOT NULL,
                high_price TEXT NOT NULL,
                low_price TEXT NOT NULL,
                close_price TEXT NOT NULL,
                volume REAL NOT NULL DEFAULT 0,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (pair_id) REFERENCES currency_pairs(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_detections_time ON pattern_detections(detected_at)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_historical_pair ON historical_data(pair_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert the built-in pairs and patterns if missing.
    async fn seed_catalogs(&self) -> Result<()> {
        for pair in pair_catalog() {
            sqlx::query(
                "INSERT OR IGNORE INTO currency_pairs (symbol, name, category, pip_size) VALUES (?, ?, ?, ?)",
            )
            .bind(&pair.symbol)
            .bind(&pair.name)
            .bind(pair.category.as_str())
            .bind(pair.pip_size.to_string())
            .execute(&self.pool)
            .await?;
        }

        for pattern in pattern_catalog() {
            sqlx::query(
                "INSERT OR IGNORE INTO chart_patterns (name, kind, description, reliability) VALUES (?, ?, ?, ?)",
            )
            .bind(&pattern.name)
            .bind(pattern.kind.as_str())
            .bind(&pattern.description)
            .bind(pattern.reliability)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    // ==================== Account ====================

    /// Load the account, creating the default one on first use.
    pub async fn load_or_init_account(&self, today: NaiveDate) -> Result<StoredAccount> {
        if let Some(account) = self.load_account().await? {
            return Ok(account);
        }

        debug!("No account found, creating default account");
        let account = StoredAccount {
            config: RiskConfig::default(),
            state: AccountState::new(DEFAULT_BALANCE),
            trading_day: today,
        };
        self.save_account(&account).await?;
        Ok(account)
    }

    /// Load the account row, if any.
    pub async fn load_account(&self) -> Result<Option<StoredAccount>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT balance, previous_balance, risk_percentage, drawdown_percentage,
                   current_drawdown, trades_today, trading_day
            FROM account WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load account")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let config = RiskConfig::new(
            parse_decimal(&row.risk_percentage, "risk_percentage")?,
            parse_decimal(&row.drawdown_percentage, "drawdown_percentage")?,
        )
        .context("Stored risk settings are invalid")?;

        let state = AccountState {
            balance: parse_decimal(&row.balance, "balance")?,
            previous_day_balance: parse_decimal(&row.previous_balance, "previous_balance")?,
            current_drawdown: parse_decimal(&row.current_drawdown, "current_drawdown")?,
            trades_today: u32::try_from(row.trades_today)
                .with_context(|| format!("Invalid stored trades_today: {}", row.trades_today))?,
        };

        let trading_day = NaiveDate::parse_from_str(&row.trading_day, "%Y-%m-%d")
            .with_context(|| format!("Invalid stored trading day: {}", row.trading_day))?;

        Ok(Some(StoredAccount {
            config,
            state,
            trading_day,
        }))
    }

    /// Insert or replace the account row.
    pub async fn save_account(&self, account: &StoredAccount) -> Result<()> {
        upsert_account(&self.pool, account).await
    }

    // ==================== Pairs & Patterns ====================

    /// All currency pairs, majors first.
    pub async fn list_pairs(&self) -> Result<Vec<CurrencyPair>> {
        let rows = sqlx::query_as::<_, PairRow>(
            "SELECT id, symbol, name, category, pip_size FROM currency_pairs ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch currency pairs")?;

        rows.into_iter().map(pair_from_row).collect()
    }

    /// Find a pair by symbol, accepting `EURUSD`, `eur/usd`, etc.
    pub async fn find_pair(&self, symbol: &str) -> Result<Option<CurrencyPair>> {
        let pairs = self.list_pairs().await?;
        Ok(pairs.into_iter().find(|p| p.matches(symbol)))
    }

    /// All chart patterns.
    pub async fn list_patterns(&self) -> Result<Vec<ChartPattern>> {
        let rows = sqlx::query_as::<_, PatternRow>(
            "SELECT id, name, kind, description, reliability FROM chart_patterns ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch chart patterns")?;

        rows.into_iter()
            .map(|row| {
                let kind = PatternKind::parse(&row.kind)
                    .with_context(|| format!("Unknown pattern kind: {}", row.kind))?;
                Ok(ChartPattern {
                    id: row.id,
                    name: row.name,
                    kind,
                    description: row.description,
                    reliability: row.reliability,
                })
            })
            .collect()
    }

    // ==================== Detections ====================

    /// Store a pattern detection. Pair and pattern must exist.
    pub async fn record_detection(&self, detection: &NewDetection<'_>) -> Result<i64> {
        let pair = self
            .find_pair(detection.pair_symbol)
            .await?
            .with_context(|| format!("Unknown currency pair: {}", detection.pair_symbol))?;

        let pattern_id: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM chart_patterns WHERE name = ? COLLATE NOCASE")
                .bind(detection.pattern_name)
                .fetch_optional(&self.pool)
                .await?;
        let (pattern_id,) = pattern_id
            .with_context(|| format!("Unknown chart pattern: {}", detection.pattern_name))?;

        let result = sqlx::query(
            r#"
            INSERT INTO pattern_detections (
                pair_id, pattern_id, timeframe, entry_price, stop_loss, take_profit, confidence, detected_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(pair.id)
        .bind(pattern_id)
        .bind(detection.timeframe)
        .bind(detection.entry_price.to_string())
        .bind(detection.stop_loss.to_string())
        .bind(detection.take_profit.map(|tp| tp.to_string()))
        .bind(detection.confidence)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to record detection")?;

        Ok(sqlx::Row::get(&result, "id"))
    }

    /// Most recent detections with at least `min_confidence`, newest first.
    pub async fn get_detections(&self, min_confidence: f64, limit: i64) -> Result<Vec<PatternDetection>> {
        let rows = sqlx::query_as::<_, DetectionRow>(
            r#"
            SELECT pd.id, cp.symbol AS pair_symbol, chp.name AS pattern_name, pd.timeframe,
                   pd.entry_price, pd.stop_loss, pd.take_profit, pd.confidence, pd.detected_at
            FROM pattern_detections pd
            JOIN currency_pairs cp ON pd.pair_id = cp.id
            JOIN chart_patterns chp ON pd.pattern_id = chp.id
            WHERE pd.confidence >= ?
            ORDER BY pd.detected_at DESC, pd.id DESC
            LIMIT ?
            "#,
        )
        .bind(min_confidence)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch detections")?;

        rows.into_iter()
            .map(|row| {
                Ok(PatternDetection {
                    id: row.id,
                    pair_symbol: row.pair_symbol,
                    pattern_name: row.pattern_name,
                    timeframe: row.timeframe,
                    entry_price: parse_decimal(&row.entry_price, "entry_price")?,
                    stop_loss: parse_decimal(&row.stop_loss, "stop_loss")?,
                    take_profit: parse_optional(row.take_profit.as_deref(), "take_profit")?,
                    confidence: row.confidence,
                    detected_at: row.detected_at,
                })
            })
            .collect()
    }

    /// Whether a detection with this pattern, timeframe and stop is already stored for the pair.
    pub async fn has_detection(
        &self,
        pair_symbol: &str,
        pattern_name: &str,
        timeframe: &str,
        stop_loss: Decimal,
    ) -> Result<bool> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT pd.stop_loss
            FROM pattern_detections pd
            JOIN currency_pairs cp ON pd.pair_id = cp.id
            JOIN chart_patterns chp ON pd.pattern_id = chp.id
            WHERE cp.symbol = ? AND chp.name = ? COLLATE NOCASE AND pd.timeframe = ?
            "#,
        )
        .bind(pair_symbol)
        .bind(pattern_name)
        .bind(timeframe)
        .fetch_all(&self.pool)
        .await
        .context("Failed to look up detections")?;

        for (stored,) in &rows {
            if parse_decimal(stored, "stop_loss")? == stop_loss {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ==================== Trades ====================

    /// Open a journal trade.
    pub async fn open_trade(&self, trade: &NewTrade<'_>) -> Result<i64> {
        let pair = self
            .find_pair(trade.pair_symbol)
            .await?
            .with_context(|| format!("Unknown currency pair: {}", trade.pair_symbol))?;

        let result = sqlx::query(
            r#"
            INSERT INTO trades (
                pair_id, direction, entry_price, stop_loss, take_profit,
                position_size, risk_amount, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 'open', ?)
            RETURNING id
            "#,
        )
        .bind(pair.id)
        .bind(trade.direction.as_str())
        .bind(trade.entry_price.to_string())
        .bind(trade.stop_loss.to_string())
        .bind(trade.take_profit.map(|tp| tp.to_string()))
        .bind(trade.position_size.to_string())
        .bind(trade.risk_amount.to_string())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to open trade")?;

        Ok(sqlx::Row::get(&result, "id"))
    }

    /// Get one journal trade.
    pub async fn get_trade(&self, id: i64) -> Result<Option<TradeRecord>> {
        let row = sqlx::query_as::<_, TradeRow>(&format!("{TRADE_SELECT} WHERE t.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch trade")?;

        row.map(trade_from_row).transpose()
    }

    /// Close a trade and store the account it produced, atomically.
    ///
    /// Either both rows change or neither does.
    pub async fn settle_trade(&self, id: i64, profit_loss: Decimal, account: &StoredAccount) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        mark_trade_closed(&mut *tx, id, profit_loss).await?;
        upsert_account(&mut *tx, account).await?;

        tx.commit().await.context("Failed to commit trade settlement")?;
        debug!(id = id, pnl = %profit_loss, "Trade settled");
        Ok(())
    }

    /// Journal trades, newest first.
    pub async fn list_trades(&self, limit: i64) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query_as::<_, TradeRow>(&format!(
            "{TRADE_SELECT} ORDER BY t.created_at DESC, t.id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch trades")?;

        rows.into_iter().map(trade_from_row).collect()
    }

    /// Realized P&L of closed trades, oldest first.
    pub async fn closed_trade_pnls(&self) -> Result<Vec<Decimal>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT profit_loss FROM trades WHERE status = 'closed' AND profit_loss IS NOT NULL ORDER BY closed_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|(pnl,)| parse_decimal(pnl, "profit_loss"))
            .collect()
    }

    // ==================== Rates ====================

    /// Store a rate snapshot as a flat candle.
    pub async fn record_rate(
        &self,
        pair_id: i64,
        timeframe: &str,
        rate: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.record_candle(pair_id, timeframe, &Candle::flat(rate, timestamp))
            .await
            .context("Failed to record rate")
    }

    /// Store one candle.
    pub async fn record_candle(&self, pair_id: i64, timeframe: &str, candle: &Candle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO historical_data (
                pair_id, timeframe, open_price, high_price, low_price, close_price, volume, timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(pair_id)
        .bind(timeframe)
        .bind(candle.open.to_string())
        .bind(candle.high.to_string())
        .bind(candle.low.to_string())
        .bind(candle.close.to_string())
        .bind(candle.volume)
        .bind(candle.timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to record candle")?;

        Ok(())
    }

    /// The latest `limit` candles for a pair and timeframe, oldest first.
    pub async fn get_candles(&self, pair_id: i64, timeframe: &str, limit: i64) -> Result<Vec<Candle>> {
        let rows = sqlx::query_as::<_, CandleRow>(
            r#"
            SELECT timestamp, open_price, high_price, low_price, close_price, volume
            FROM historical_data
            WHERE pair_id = ? AND timeframe = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(pair_id)
        .bind(timeframe)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch candles")?;

        let mut candles = rows
            .into_iter()
            .map(|row| {
                Ok(Candle {
                    timestamp: row.timestamp,
                    open: parse_decimal(&row.open_price, "open_price")?,
                    high: parse_decimal(&row.high_price, "high_price")?,
                    low: parse_decimal(&row.low_price, "low_price")?,
                    close: parse_decimal(&row.close_price, "close_price")?,
                    volume: row.volume,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        candles.reverse();
        Ok(candles)
    }

    /// Latest stored close for a pair.
    pub async fn latest_rate(&self, pair_id: i64) -> Result<Option<Decimal>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT close_price FROM historical_data WHERE pair_id = ? ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .bind(pair_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(close,)| parse_decimal(&close, "close_price")).transpose()
    }

    // ==================== Settings ====================

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(v,)| v))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

async fn upsert_account<'e, E>(executor: E, account: &StoredAccount) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO account (
            id, balance, previous_balance, risk_percentage, drawdown_percentage,
            current_drawdown, trades_today, trading_day, updated_at
        ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
        ON CONFLICT(id) DO UPDATE SET
            balance = excluded.balance,
            previous_balance = excluded.previous_balance,
            risk_percentage = excluded.risk_percentage,
            drawdown_percentage = excluded.drawdown_percentage,
            current_drawdown = excluded.current_drawdown,
            trades_today = excluded.trades_today,
            trading_day = excluded.trading_day,
            updated_at = datetime('now')
        "#,
    )
    .bind(account.state.balance.to_string())
    .bind(account.state.previous_day_balance.to_string())
    .bind(account.config.risk_percentage().to_string())
    .bind(account.config.drawdown_percentage().to_string())
    .bind(account.state.current_drawdown.to_string())
    .bind(i64::from(account.state.trades_today))
    .bind(account.trading_day.format("%Y-%m-%d").to_string())
    .execute(executor)
    .await
    .context("Failed to save account")?;

    Ok(())
}

async fn mark_trade_closed<'e, E>(executor: E, id: i64, profit_loss: Decimal) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE trades SET status = 'closed', profit_loss = ?, closed_at = ?
        WHERE id = ? AND status = 'open'
        "#,
    )
    .bind(profit_loss.to_string())
    .bind(Utc::now())
    .bind(id)
    .execute(executor)
    .await
    .context("Failed to close trade")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("Trade {} is not open", id);
    }
    Ok(())
}

const TRADE_SELECT: &str = r#"
    SELECT t.id, cp.symbol AS pair_symbol, t.direction, t.entry_price, t.stop_loss,
           t.take_profit, t.position_size, t.risk_amount, t.status, t.profit_loss,
           t.created_at, t.closed_at
    FROM trades t
    JOIN currency_pairs cp ON t.pair_id = cp.id
"#;

fn parse_decimal(value: &str, field: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("Invalid stored {}: {}", field, value))
}

fn parse_optional(value: Option<&str>, field: &str) -> Result<Option<Decimal>> {
    value.map(|v| parse_decimal(v, field)).transpose()
}

fn pair_from_row(row: PairRow) -> Result<CurrencyPair> {
    let category = PairCategory::parse(&row.category)
        .with_context(|| format!("Unknown pair category: {}", row.category))?;

    Ok(CurrencyPair {
        id: row.id,
        symbol: row.symbol,
        name: row.name,
        category,
        pip_size: parse_decimal(&row.pip_size, "pip_size")?,
    })
}

fn trade_from_row(row: TradeRow) -> Result<TradeRecord> {
    let direction = Direction::parse(&row.direction)
        .with_context(|| format!("Unknown trade direction: {}", row.direction))?;
    let status = TradeStatus::parse(&row.status)
        .with_context(|| format!("Unknown trade status: {}", row.status))?;

    Ok(TradeRecord {
        id: row.id,
        pair_symbol: row.pair_symbol,
        direction,
        entry_price: parse_decimal(&row.entry_price, "entry_price")?,
        stop_loss: parse_decimal(&row.stop_loss, "stop_loss")?,
        take_profit: parse_optional(row.take_profit.as_deref(), "take_profit")?,
        position_size: parse_decimal(&row.position_size, "position_size")?,
        risk_amount: parse_decimal(&row.risk_amount, "risk_amount")?,
        status,
        profit_loss: parse_optional(row.profit_loss.as_deref(), "profit_loss")?,
        created_at: row.created_at,
        closed_at: row.closed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio_test::assert_ok;

    async fn memory_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 16).unwrap()
    }

    #[tokio::test]
    async fn test_seeds_catalogs_once() {
        let db = memory_db().await;
        assert_ok!(db.seed_catalogs().await);

        assert_eq!(db.list_pairs().await.unwrap().len(), 16);
        assert_eq!(db.list_patterns().await.unwrap().len(), 17);

        let jpy = db.find_pair("usdjpy").await.unwrap().unwrap();
        assert_eq!(jpy.symbol, "USD/JPY");
        assert_eq!(jpy.pip_size, dec!(0.01));
    }

    #[tokio::test]
    async fn test_default_account_created_and_round_trips() {
        let db = memory_db().await;
        assert!(db.load_account().await.unwrap().is_none());

        let mut account = db.load_or_init_account(today()).await.unwrap();
        assert_eq!(account.state.balance, dec!(5000));
        assert_eq!(account.config, RiskConfig::default());

        account.state.balance = dec!(4987.35);
        account.state.current_drawdown = dec!(12.65);
        account.state.trades_today = 2;
        assert_ok!(db.save_account(&account).await);

        let loaded = db.load_account().await.unwrap().unwrap();
        assert_eq!(loaded, account);
    }

    #[tokio::test]
    async fn test_trade_lifecycle() {
        let db = memory_db().await;

        let id = db
            .open_trade(&NewTrade {
                pair_symbol: "EUR/USD",
                direction: Direction::Buy,
                entry_price: dec!(1.2000),
                stop_loss: dec!(1.1950),
                take_profit: Some(dec!(1.2100)),
                position_size: dec!(2000),
                risk_amount: dec!(10),
            })
            .await
            .unwrap();

        let trade = db.get_trade(id).await.unwrap().unwrap();
        assert!(trade.is_open());
        assert_eq!(trade.pair_symbol, "EUR/USD");

        let mut account = db.load_or_init_account(today()).await.unwrap();
        account.state.balance = dec!(5020);
        account.state.trades_today = 1;
        assert_ok!(db.settle_trade(id, dec!(20), &account).await);

        let trade = db.get_trade(id).await.unwrap().unwrap();
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.profit_loss, Some(dec!(20)));
        assert_eq!(db.closed_trade_pnls().await.unwrap(), vec![dec!(20)]);
        assert_eq!(db.load_account().await.unwrap(), Some(account));
    }

    #[tokio::test]
    async fn test_failed_settlement_keeps_account() {
        let db = memory_db().await;
        let id = db
            .open_trade(&NewTrade {
                pair_symbol: "USD/JPY",
                direction: Direction::Sell,
                entry_price: dec!(150.00),
                stop_loss: dec!(150.50),
                take_profit: None,
                position_size: dec!(20),
                risk_amount: dec!(10),
            })
            .await
            .unwrap();

        let mut account = db.load_or_init_account(today()).await.unwrap();
        account.state.balance = dec!(4990);
        account.state.current_drawdown = dec!(10);
        account.state.trades_today = 1;
        assert_ok!(db.settle_trade(id, dec!(-10), &account).await);

        // Already closed: the account update must roll back with it.
        let mut second = account.clone();
        second.state.balance = dec!(4980);
        second.state.trades_today = 2;
        assert!(db.settle_trade(id, dec!(-10), &second).await.is_err());
        assert_eq!(db.load_account().await.unwrap(), Some(account));

        assert!(db.settle_trade(9999, dec!(5), &second).await.is_err());
        assert_eq!(db.closed_trade_pnls().await.unwrap(), vec![dec!(-10)]);
    }

    #[tokio::test]
    async fn test_corrupt_trade_count_is_an_error() {
        let db = memory_db().await;
        db.load_or_init_account(today()).await.unwrap();

        sqlx::query("UPDATE account SET trades_today = -1 WHERE id = 1")
            .execute(&db.pool)
            .await
            .unwrap();

        let err = db.load_account().await.unwrap_err();
        assert!(err.to_string().contains("trades_today"), "{err}");
    }

    #[tokio::test]
    async fn test_unknown_pair_rejected() {
        let db = memory_db().await;
        let result = db
            .open_trade(&NewTrade {
                pair_symbol: "XXX/YYY",
                direction: Direction::Buy,
                entry_price: dec!(1),
                stop_loss: dec!(0.9),
                take_profit: None,
                position_size: dec!(1),
                risk_amount: dec!(1),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_detections_filtered_by_confidence() {
        let db = memory_db().await;

        for (pattern, confidence) in [("Double Bottom", 92.0), ("Flag", 60.0)] {
            db.record_detection(&NewDetection {
                pair_symbol: "GBP/JPY",
                pattern_name: pattern,
                timeframe: "1h",
                entry_price: dec!(185.20),
                stop_loss: dec!(184.50),
                take_profit: Some(dec!(187.40)),
                confidence,
            })
            .await
            .unwrap();
        }

        let strong = db.get_detections(75.0, 20).await.unwrap();
        assert_eq!(strong.len(), 1);
        assert_eq!(strong[0].pattern_name, "Double Bottom");
        assert_eq!(strong[0].take_profit, Some(dec!(187.40)));

        assert_eq!(db.get_detections(0.0, 20).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rates_and_settings() {
        let db = memory_db().await;
        let pair = db.find_pair("EUR/USD").await.unwrap().unwrap();

        assert_eq!(db.latest_rate(pair.id).await.unwrap(), None);
        db.record_rate(pair.id, "1h", dec!(1.0850), Utc::now()).await.unwrap();
        assert_eq!(db.latest_rate(pair.id).await.unwrap(), Some(dec!(1.0850)));

        assert_eq!(db.get_setting("webapp_url").await.unwrap(), None);
        db.set_setting("webapp_url", "https://example.test").await.unwrap();
        db.set_setting("webapp_url", "https://desk.example.test").await.unwrap();
        assert_eq!(
            db.get_setting("webapp_url").await.unwrap().as_deref(),
            Some("https://desk.example.test")
        );
    }

    #[tokio::test]
    async fn test_candles_latest_window_oldest_first() {
        let db = memory_db().await;
        let pair = db.find_pair("EUR/USD").await.unwrap().unwrap();
        let start = Utc::now() - chrono::Duration::hours(10);

        for h in 0..5 {
            let close = dec!(1.0800) + Decimal::new(h, 4);
            let candle = Candle {
                timestamp: start + chrono::Duration::hours(h),
                open: close,
                high: close + dec!(0.0010),
                low: close - dec!(0.0010),
                close,
                volume: 100.0 * h as f64,
            };
            db.record_candle(pair.id, "1h", &candle).await.unwrap();
        }
        db.record_rate(pair.id, "4h", dec!(1.0900), start).await.unwrap();

        let candles = db.get_candles(pair.id, "1h", 3).await.unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].close, dec!(1.0802));
        assert_eq!(candles[2].close, dec!(1.0804));
        assert_eq!(candles[2].high, dec!(1.0814));
        assert_eq!(candles[2].volume, 400.0);
        assert!(candles[0].timestamp < candles[2].timestamp);

        let four_hour = db.get_candles(pair.id, "4h", 10).await.unwrap();
        assert_eq!(four_hour, vec![Candle::flat(dec!(1.0900), four_hour[0].timestamp)]);
        assert!(db.get_candles(pair.id, "1d", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_has_detection_matches_stop() {
        let db = memory_db().await;
        db.record_detection(&NewDetection {
            pair_symbol: "EUR/USD",
            pattern_name: "Resistance Breakout",
            timeframe: "1h",
            entry_price: dec!(1.1040),
            stop_loss: dec!(1.10000),
            take_profit: Some(dec!(1.1120)),
            confidence: 70.0,
        })
        .await
        .unwrap();

        assert!(db.has_detection("EUR/USD", "Resistance Breakout", "1h", dec!(1.1)).await.unwrap());
        assert!(!db.has_detection("EUR/USD", "Resistance Breakout", "4h", dec!(1.1)).await.unwrap());
        assert!(!db.has_detection("EUR/USD", "Resistance Breakout", "1h", dec!(1.1005)).await.unwrap());
        assert!(!db.has_detection("GBP/USD", "Resistance Breakout", "1h", dec!(1.1)).await.unwrap());
    }
}
