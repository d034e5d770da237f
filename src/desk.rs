//! Desk: owns the account calculator and the database, and keeps them in step.
//!
//! Every state change goes through here:
//! - Day rollover before the account is read or changed
//! - Sizing against the stored pair's pip scale
//! - Applying trade results and persisting the account
//! - Scanning stored candles for breakouts and storing them as detections
//! - Confirming detections against recent candles and sizing them for the
//!   current balance

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{analyze, confirm, Breakout, BreakoutConfig, MAX_CONFIRMATION_BOOST};
use crate::api::RatesClient;
use crate::db::{Database, NewDetection, NewTrade, StoredAccount};
use crate::models::{
    Candle, Confirmation, CurrencyPair, JournalMetrics, PatternDetection, PatternKind, Signal,
    TradeRecord,
};
use crate::risk::{
    PipScale, PositionRequest, PositionResult, RiskCalculator, RiskConfig, RiskMetrics,
    TradeRecorded, TradeSimulation, TradingDay, DEFAULT_PIP_VALUE_PER_LOT,
};

const SIGNAL_CONFIDENCE_KEY: &str = "signal_min_confidence";

/// Desk configuration.
#[derive(Debug, Clone)]
pub struct DeskConfig {
    /// Database URL
    pub database_url: String,

    /// Account-currency value of one pip on one standard lot
    pub pip_value_per_lot: Decimal,

    /// Detections below this confidence (0-100) are not signalled
    pub signal_min_confidence: f64,

    /// Maximum number of detections listed
    pub signal_limit: i64,

    /// Timeframe label for stored rate snapshots
    pub rate_timeframe: String,

    /// Candles read for breakout scans and confirmation
    pub analysis_candles: i64,

    pub breakout: BreakoutConfig,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./fxdesk.db?mode=rwc".to_string(),
            pip_value_per_lot: DEFAULT_PIP_VALUE_PER_LOT,
            signal_min_confidence: 75.0,
            signal_limit: 20,
            rate_timeframe: "1h".to_string(),
            analysis_candles: 200,
            breakout: BreakoutConfig::default(),
        }
    }
}

/// A sized position with the pair context it was sized for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionQuote {
    pub pair: Option<String>,
    pub pip_scale: PipScale,
    #[serde(flatten)]
    pub result: PositionResult,
    /// Standard lots, rounded down to 0.01
    pub lots: Decimal,
}

/// Outcome of refreshing one pair's quote.
#[derive(Debug, Clone, Serialize)]
pub struct RateUpdate {
    pub symbol: String,
    pub rate: Option<Decimal>,
    pub error: Option<String>,
}

/// Breakouts found for one pair and the detections stored for them.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub symbol: String,
    pub timeframe: String,
    pub candles: usize,
    /// Newest first
    pub breakouts: Vec<Breakout>,
    /// Detection ids stored by this scan
    pub stored: Vec<i64>,
}

/// Closed journal trade and the account after its result.
#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub trade: TradeRecord,
    pub recorded: TradeRecorded,
}

/// The risk desk for one account.
pub struct Desk {
    config: DeskConfig,
    db: Database,
    calculator: RiskCalculator,
    trading_day: TradingDay,
}

impl Desk {
    /// Connect to the configured database and load the account.
    pub async fn open(config: DeskConfig) -> Result<Self> {
        let db = Database::new(&config.database_url).await?;
        Self::with_database(config, db, Utc::now().date_naive()).await
    }

    /// Build on an existing database, rolling the account forward to `today`.
    pub async fn with_database(config: DeskConfig, db: Database, today: NaiveDate) -> Result<Self> {
        let stored = db.load_or_init_account(today).await?;
        let calculator = RiskCalculator::restore(stored.config, stored.state)
            .context("Stored account is invalid")?;

        let mut desk = Self {
            config,
            db,
            calculator,
            trading_day: TradingDay::new(stored.trading_day),
        };
        desk.roll_day(today).await?;

        info!(
            balance = %desk.calculator.account().balance,
            trading_day = %desk.trading_day.date(),
            "Desk ready"
        );

        Ok(desk)
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn calculator(&self) -> &RiskCalculator {
        &self.calculator
    }

    pub fn trading_day(&self) -> NaiveDate {
        self.trading_day.date()
    }

    fn stored(&self, calculator: &RiskCalculator) -> StoredAccount {
        StoredAccount {
            config: *calculator.config(),
            state: calculator.account().clone(),
            trading_day: self.trading_day.date(),
        }
    }

    async fn persist(&self) -> Result<()> {
        self.db.save_account(&self.stored(&self.calculator)).await
    }

    /// Start a new trading day if `today` is later than the current one.
    ///
    /// Returns the new drawdown limit when a rollover happened.
    pub async fn roll_day(&mut self, today: NaiveDate) -> Result<Option<Decimal>> {
        if !self.trading_day.observe(today) {
            return Ok(None);
        }

        let limit = self.calculator.new_trading_day();
        self.persist().await?;
        Ok(Some(limit))
    }

    /// Replace the account with a fresh one.
    pub async fn initialize_account(
        &mut self,
        balance: Decimal,
        risk_percentage: Decimal,
        drawdown_percentage: Decimal,
    ) -> Result<RiskMetrics> {
        self.calculator = RiskCalculator::initialize(balance, risk_percentage, drawdown_percentage)?;
        self.persist().await?;

        info!(
            balance = %balance,
            risk = %risk_percentage,
            drawdown = %drawdown_percentage,
            "Account initialized"
        );

        Ok(self.calculator.get_risk_metrics())
    }

    /// Change risk settings, keeping balance and drawdown history.
    pub async fn update_risk_settings(&mut self, config: RiskConfig) -> Result<RiskMetrics> {
        self.calculator = RiskCalculator::restore(config, self.calculator.account().clone())?;
        self.persist().await?;
        Ok(self.calculator.get_risk_metrics())
    }

    pub fn metrics(&self) -> RiskMetrics {
        self.calculator.get_risk_metrics()
    }

    /// Pip scale for a symbol: the stored pair's pip size, else the yen convention.
    pub async fn pip_scale_for(&self, symbol: Option<&str>) -> Result<PipScale> {
        let Some(symbol) = symbol else {
            return Ok(PipScale::default());
        };

        match self.db.find_pair(symbol).await? {
            Some(pair) => Ok(pair.pip_scale()),
            None => {
                warn!(symbol = %symbol, "Unknown pair, using symbol pip convention");
                Ok(PipScale::for_symbol(symbol))
            }
        }
    }

    /// Size a position for the current balance.
    pub async fn calculate(&self, request: &PositionRequest, pair: Option<&str>) -> Result<PositionQuote> {
        let pip_scale = self.pip_scale_for(pair).await?;
        let result = self.calculator.calculate_position_size(request, pip_scale)?;
        let lots = result.lots(self.config.pip_value_per_lot);

        Ok(PositionQuote {
            pair: pair.map(str::to_string),
            pip_scale,
            result,
            lots,
        })
    }

    pub fn simulate(
        &self,
        entry_price: Decimal,
        position_size: Decimal,
        stop_loss_price: Decimal,
        take_profit_price: Option<Decimal>,
    ) -> Result<TradeSimulation> {
        Ok(RiskCalculator::simulate_trade_outcome(
            entry_price,
            position_size,
            stop_loss_price,
            take_profit_price,
        )?)
    }

    /// Apply a profit or loss to the account.
    pub async fn record_result(&mut self, profit_or_loss: Decimal) -> Result<TradeRecorded> {
        let recorded = self.calculator.record_trade_result(profit_or_loss)?;
        self.persist().await?;
        Ok(recorded)
    }

    /// Force a new trading day now, regardless of the calendar.
    pub async fn new_trading_day(&mut self) -> Result<Decimal> {
        let limit = self.calculator.new_trading_day();
        self.persist().await?;
        Ok(limit)
    }

    /// Size and journal a trade. Refused once today's drawdown limit is hit.
    pub async fn open_trade(&mut self, pair: &str, request: &PositionRequest) -> Result<(i64, PositionQuote)> {
        self.calculator.can_place_trade()?;

        let stored_pair = self
            .db
            .find_pair(pair)
            .await?
            .with_context(|| format!("Unknown currency pair: {}", pair))?;

        let quote = self.calculate(request, Some(&stored_pair.symbol)).await?;
        let id = self
            .db
            .open_trade(&NewTrade {
                pair_symbol: &stored_pair.symbol,
                direction: quote.result.direction,
                entry_price: request.entry_price,
                stop_loss: request.stop_loss_price,
                take_profit: request.take_profit_price,
                position_size: quote.result.position_size,
                risk_amount: quote.result.risk_amount,
            })
            .await?;

        info!(
            id = id,
            pair = %stored_pair.symbol,
            direction = quote.result.direction.as_str(),
            size = %quote.result.position_size,
            "Trade opened"
        );

        Ok((id, quote))
    }

    /// Close a journal trade at `exit_price` and apply its P&L.
    pub async fn close_trade(&mut self, id: i64, exit_price: Decimal) -> Result<ClosedTrade> {
        if exit_price <= Decimal::ZERO {
            anyhow::bail!("Exit price must be positive, got {}", exit_price);
        }

        let trade = self
            .db
            .get_trade(id)
            .await?
            .with_context(|| format!("Trade {} not found", id))?;
        if !trade.is_open() {
            anyhow::bail!("Trade {} is already closed", id);
        }

        let pnl = trade.pnl_at(exit_price)?;

        // Apply to a copy so a failed write leaves the in-memory account alone.
        let mut calculator = self.calculator.clone();
        let recorded = calculator.record_trade_result(pnl)?;
        self.db.settle_trade(id, pnl, &self.stored(&calculator)).await?;
        self.calculator = calculator;

        info!(id = id, pnl = %pnl, balance = %recorded.balance, "Trade closed");

        let trade = self
            .db
            .get_trade(id)
            .await?
            .with_context(|| format!("Trade {} not found", id))?;

        Ok(ClosedTrade { trade, recorded })
    }

    /// Store a pattern detection.
    pub async fn record_detection(&self, detection: &NewDetection<'_>) -> Result<i64> {
        // Reject levels the calculator cannot size before storing them.
        let request = PositionRequest {
            entry_price: detection.entry_price,
            stop_loss_price: detection.stop_loss,
            take_profit_price: detection.take_profit,
            direction: None,
        };
        request.validate()?;

        if !(0.0..=100.0).contains(&detection.confidence) {
            anyhow::bail!("Confidence must be between 0 and 100, got {}", detection.confidence);
        }

        self.db.record_detection(detection).await
    }

    /// Signal threshold: the stored setting if present, else the configured default.
    pub async fn signal_min_confidence(&self) -> Result<f64> {
        match self.db.get_setting(SIGNAL_CONFIDENCE_KEY).await? {
            Some(value) => value
                .parse()
                .with_context(|| format!("Invalid stored {}: {}", SIGNAL_CONFIDENCE_KEY, value)),
            None => Ok(self.config.signal_min_confidence),
        }
    }

    pub async fn set_signal_min_confidence(&self, min_confidence: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&min_confidence) {
            anyhow::bail!("Confidence must be between 0 and 100, got {}", min_confidence);
        }
        self.db
            .set_setting(SIGNAL_CONFIDENCE_KEY, &min_confidence.to_string())
            .await
    }

    /// Detections whose confirmed confidence reaches `min_confidence`, newest
    /// first, each sized for the current balance.
    ///
    /// Confirmation can lift a stored confidence by at most
    /// `MAX_CONFIRMATION_BOOST`, so detections below that margin are not read.
    pub async fn signals(&self, min_confidence: Option<f64>) -> Result<Vec<Signal>> {
        let min_confidence = match min_confidence {
            Some(value) => value,
            None => self.signal_min_confidence().await?,
        };
        let limit = self.config.signal_limit;

        let kinds: HashMap<String, PatternKind> = self
            .db
            .list_patterns()
            .await?
            .into_iter()
            .map(|p| (p.name.to_lowercase(), p.kind))
            .collect();

        let floor = (min_confidence - MAX_CONFIRMATION_BOOST).max(0.0);
        let detections = self.db.get_detections(floor, limit.saturating_mul(4)).await?;

        let mut history: HashMap<(String, String), Vec<Candle>> = HashMap::new();
        let mut signals = Vec::new();
        for detection in detections {
            if signals.len() as i64 >= limit {
                break;
            }

            let key = (detection.pair_symbol.clone(), detection.timeframe.clone());
            if !history.contains_key(&key) {
                let candles = self.candles_for(&key.0, &key.1).await?;
                history.insert(key.clone(), candles);
            }
            let candles = history.get(&key).map(Vec::as_slice).unwrap_or_default();

            let kind = kinds.get(&detection.pattern_name.to_lowercase()).copied();
            let confirmation = confirm(&detection, kind, candles);
            if confirmation.confidence < min_confidence {
                debug!(
                    id = detection.id,
                    base = confirmation.base_confidence,
                    confirmed = confirmation.confidence,
                    "Detection below threshold after confirmation"
                );
                continue;
            }

            signals.push(self.size_detection(detection, confirmation).await?);
        }

        debug!(count = signals.len(), min_confidence = min_confidence, "Signals listed");
        Ok(signals)
    }

    async fn size_detection(&self, detection: PatternDetection, confirmation: Confirmation) -> Result<Signal> {
        let request = detection.position_request();

        let signal = match self.calculate(&request, Some(&detection.pair_symbol)).await {
            Ok(quote) => Signal {
                detection,
                confirmation,
                risk_amount: Some(quote.result.risk_amount),
                position_size: Some(quote.result.position_size),
                lots: Some(quote.lots),
                risk_reward_ratio: quote.result.risk_reward_ratio,
                sizing_error: None,
            },
            Err(e) => Signal {
                detection,
                confirmation,
                risk_amount: None,
                position_size: None,
                lots: None,
                risk_reward_ratio: None,
                sizing_error: Some(e.to_string()),
            },
        };

        Ok(signal)
    }

    /// Recent candles for a pair, oldest first. Empty for an unknown pair.
    async fn candles_for(&self, symbol: &str, timeframe: &str) -> Result<Vec<Candle>> {
        match self.db.find_pair(symbol).await? {
            Some(pair) => {
                self.db
                    .get_candles(pair.id, timeframe, self.config.analysis_candles)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Store candles for a pair after checking every bar.
    ///
    /// Nothing is stored if any bar is inconsistent.
    pub async fn import_candles(&self, symbol: &str, timeframe: &str, candles: &[Candle]) -> Result<usize> {
        let pair = self
            .db
            .find_pair(symbol)
            .await?
            .with_context(|| format!("Unknown currency pair: {}", symbol))?;

        for (i, candle) in candles.iter().enumerate() {
            if let Some(problem) = candle.inconsistency() {
                anyhow::bail!("Candle {} at {}: {}", i + 1, candle.timestamp, problem);
            }
        }

        for candle in candles {
            self.db.record_candle(pair.id, timeframe, candle).await?;
        }

        info!(pair = %pair.symbol, timeframe = %timeframe, count = candles.len(), "Candles imported");
        Ok(candles.len())
    }

    /// Look for breakouts on one pair, or every pair, and store each new one
    /// as a detection.
    ///
    /// A breakout whose pattern, timeframe and stop are already stored for
    /// the pair is reported but not stored again.
    pub async fn scan(&self, symbol: Option<&str>, timeframe: &str) -> Result<Vec<ScanReport>> {
        let pairs = match symbol {
            Some(symbol) => vec![self
                .db
                .find_pair(symbol)
                .await?
                .with_context(|| format!("Unknown currency pair: {}", symbol))?],
            None => self.db.list_pairs().await?,
        };

        let mut reports = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let candles = self
                .db
                .get_candles(pair.id, timeframe, self.config.analysis_candles)
                .await?;
            let analysis = analyze(&candles, &self.config.breakout);

            let mut stored = Vec::new();
            if let Some(latest) = analysis.latest_close {
                for breakout in &analysis.breakouts {
                    let Some(proposal) = breakout.propose(latest, self.config.breakout.reward_multiple) else {
                        continue;
                    };
                    if self
                        .db
                        .has_detection(&pair.symbol, proposal.pattern_name, timeframe, proposal.stop_loss)
                        .await?
                    {
                        continue;
                    }

                    let id = self
                        .record_detection(&NewDetection {
                            pair_symbol: &pair.symbol,
                            pattern_name: proposal.pattern_name,
                            timeframe,
                            entry_price: proposal.entry_price,
                            stop_loss: proposal.stop_loss,
                            take_profit: proposal.take_profit,
                            confidence: proposal.confidence,
                        })
                        .await?;
                    stored.push(id);
                }
            }

            if !analysis.breakouts.is_empty() {
                info!(
                    pair = %pair.symbol,
                    timeframe = %timeframe,
                    breakouts = analysis.breakouts.len(),
                    stored = stored.len(),
                    "Breakouts found"
                );
            }

            reports.push(ScanReport {
                symbol: pair.symbol,
                timeframe: timeframe.to_string(),
                candles: analysis.candles,
                breakouts: analysis.breakouts,
                stored,
            });
        }

        Ok(reports)
    }

    /// Stored pairs with their last recorded rate.
    pub async fn pairs(&self) -> Result<Vec<(CurrencyPair, Option<Decimal>)>> {
        let pairs = self.db.list_pairs().await?;

        let mut quoted = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let rate = self.db.latest_rate(pair.id).await?;
            quoted.push((pair, rate));
        }

        Ok(quoted)
    }

    /// Recent journal trades and statistics over all closed ones.
    pub async fn journal(&self, limit: i64) -> Result<(Vec<TradeRecord>, JournalMetrics)> {
        let trades = self.db.list_trades(limit).await?;
        let pnls = self.db.closed_trade_pnls().await?;
        Ok((trades, JournalMetrics::from_pnls(&pnls)))
    }

    /// Fetch the latest quote for every stored pair and record it.
    pub async fn refresh_rates(&self, client: &RatesClient) -> Result<Vec<RateUpdate>> {
        let pairs = self.db.list_pairs().await?;
        let quotes = join_all(pairs.iter().map(|pair| client.get_pair_rate(pair))).await;

        let now = Utc::now();
        let mut updates = Vec::with_capacity(pairs.len());

        for (pair, quote) in pairs.iter().zip(quotes) {
            match quote {
                Ok(rate) => {
                    self.db
                        .record_rate(pair.id, &self.config.rate_timeframe, rate, now)
                        .await?;
                    updates.push(RateUpdate {
                        symbol: pair.symbol.clone(),
                        rate: Some(rate),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(pair = %pair.symbol, error = %e, "Failed to refresh rate");
                    updates.push(RateUpdate {
                        symbol: pair.symbol.clone(),
                        rate: None,
                        error: Some(format!("{:#}", e)),
                    });
                }
            }
        }

        Ok(updates)
    }
}
