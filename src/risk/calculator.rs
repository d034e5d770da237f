//! Fixed-percentage position sizing with daily drawdown tracking.
//!
//! The calculator owns one account's state and is threaded explicitly
//! through every call; there is no process-wide account. It performs no
//! I/O and no locking, so callers sharing one account must serialize
//! access themselves.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::Direction;
use super::{PipScale, RiskConfig, RiskError};

/// Balance a fresh account starts with.
pub const DEFAULT_BALANCE: Decimal = dec!(5000);

/// Pip value of one standard lot in account currency.
pub const DEFAULT_PIP_VALUE_PER_LOT: Decimal = dec!(10);

/// Mutable part of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: Decimal,
    pub previous_day_balance: Decimal,
    pub current_drawdown: Decimal,
    pub trades_today: u32,
}

impl AccountState {
    /// Fresh account: yesterday's balance equals today's, no drawdown.
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            previous_day_balance: balance,
            current_drawdown: Decimal::ZERO,
            trades_today: 0,
        }
    }
}

/// Snapshot returned by [`RiskCalculator::get_risk_metrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub balance: Decimal,
    pub previous_day_balance: Decimal,
    pub risk_percentage: Decimal,
    pub drawdown_percentage: Decimal,
    /// Risk for the next trade at the current balance
    pub risk_amount: Decimal,
    pub max_drawdown_amount: Decimal,
    pub current_drawdown: Decimal,
    /// Balance at which today's limit is hit
    pub drawdown_threshold: Decimal,
    /// Share of today's limit already used, in percent
    pub drawdown_used_percentage: Decimal,
    pub trades_today: u32,
}

/// A proposed trade to size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRequest {
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    #[serde(default)]
    pub take_profit_price: Option<Decimal>,
    /// Inferred from the stop side when absent
    #[serde(default)]
    pub direction: Option<Direction>,
}

impl PositionRequest {
    pub fn new(entry_price: Decimal, stop_loss_price: Decimal) -> Self {
        Self {
            entry_price,
            stop_loss_price,
            take_profit_price: None,
            direction: None,
        }
    }

    pub fn with_take_profit(mut self, take_profit_price: Decimal) -> Self {
        self.take_profit_price = Some(take_profit_price);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Check prices and resolve the trade direction.
    ///
    /// Stop below entry is a buy, stop above entry is a sell. A stated
    /// direction must agree, and a take-profit must sit on the profit side.
    pub fn validate(&self) -> Result<Direction, RiskError> {
        ensure_positive("entry_price", self.entry_price)?;
        ensure_positive("stop_loss_price", self.stop_loss_price)?;
        if let Some(tp) = self.take_profit_price {
            ensure_positive("take_profit_price", tp)?;
        }

        if self.entry_price == self.stop_loss_price {
            return Err(RiskError::price(format!(
                "entry price equals stop loss ({})",
                self.entry_price
            )));
        }

        let implied = if self.stop_loss_price < self.entry_price {
            Direction::Buy
        } else {
            Direction::Sell
        };

        if let Some(stated) = self.direction {
            if stated != implied {
                return Err(RiskError::price(format!(
                    "stop loss {} is on the wrong side of entry {} for a {} trade",
                    self.stop_loss_price,
                    self.entry_price,
                    stated.as_str()
                )));
            }
        }

        if let Some(tp) = self.take_profit_price {
            let on_profit_side = match implied {
                Direction::Buy => tp > self.entry_price,
                Direction::Sell => tp < self.entry_price,
            };
            if !on_profit_side {
                return Err(RiskError::price(format!(
                    "take profit {} is on the wrong side of entry {} for a {} trade",
                    tp,
                    self.entry_price,
                    implied.as_str()
                )));
            }
        }

        Ok(implied)
    }
}

/// Sizing for one proposed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionResult {
    pub direction: Direction,
    pub risk_amount: Decimal,
    pub stop_loss_distance: Decimal,
    pub stop_loss_pips: Decimal,
    /// Price-weighted units; convert with [`PositionResult::lots`]
    pub position_size: Decimal,
    pub take_profit_pips: Option<Decimal>,
    pub risk_reward_ratio: Option<Decimal>,
    pub potential_profit: Option<Decimal>,
}

impl PositionResult {
    /// Standard lots for a broker quoting `pip_value_per_lot` per pip,
    /// rounded down to 0.01 lot. Zero when the lot count is not representable.
    pub fn lots(&self, pip_value_per_lot: Decimal) -> Decimal {
        if pip_value_per_lot <= Decimal::ZERO || self.stop_loss_pips.is_zero() {
            return Decimal::ZERO;
        }
        self.stop_loss_pips
            .checked_mul(pip_value_per_lot)
            .and_then(|per_lot| self.risk_amount.checked_div(per_lot))
            .map(|raw| raw.round_dp_with_strategy(2, RoundingStrategy::ToZero))
            .unwrap_or(Decimal::ZERO)
    }
}

/// What a trade stands to win or lose, without touching the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSimulation {
    pub entry_price: Decimal,
    pub position_size: Decimal,
    pub potential_loss: Decimal,
    pub potential_profit: Option<Decimal>,
    pub risk_reward_ratio: Option<Decimal>,
}

/// Whether today's drawdown limit has been hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawdownStatus {
    WithinLimit,
    LimitReached,
}

/// Account after a trade result was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecorded {
    pub balance: Decimal,
    pub current_drawdown: Decimal,
    pub max_drawdown_amount: Decimal,
    pub status: DrawdownStatus,
}

impl TradeRecorded {
    pub fn limit_reached(&self) -> bool {
        self.status == DrawdownStatus::LimitReached
    }
}

/// Risk and drawdown calculator for a single account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskCalculator {
    config: RiskConfig,
    account: AccountState,
    max_drawdown_amount: Decimal,
}

impl RiskCalculator {
    /// Start a fresh account.
    pub fn initialize(
        balance: Decimal,
        risk_percentage: Decimal,
        drawdown_percentage: Decimal,
    ) -> Result<Self, RiskError> {
        let config = RiskConfig::new(risk_percentage, drawdown_percentage)?;
        Self::with_config(balance, config)
    }

    /// Start a fresh account from an already validated config.
    pub fn with_config(balance: Decimal, config: RiskConfig) -> Result<Self, RiskError> {
        if balance <= Decimal::ZERO {
            return Err(RiskError::config(format!("balance must be positive, got {balance}")));
        }
        Self::restore(config, AccountState::new(balance))
    }

    /// Resume an account loaded from storage.
    pub fn restore(config: RiskConfig, account: AccountState) -> Result<Self, RiskError> {
        if account.balance <= Decimal::ZERO {
            return Err(RiskError::config(format!(
                "balance must be positive, got {}",
                account.balance
            )));
        }
        if account.previous_day_balance < Decimal::ZERO {
            return Err(RiskError::config(format!(
                "previous day balance must not be negative, got {}",
                account.previous_day_balance
            )));
        }
        if account.current_drawdown < Decimal::ZERO {
            return Err(RiskError::config(format!(
                "current drawdown must not be negative, got {}",
                account.current_drawdown
            )));
        }

        let mut calc = Self {
            config,
            account,
            max_drawdown_amount: Decimal::ZERO,
        };
        calc.refresh_limit();
        Ok(calc)
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn max_drawdown_amount(&self) -> Decimal {
        self.max_drawdown_amount
    }

    /// Dollar risk for the next trade at the current balance.
    pub fn risk_amount(&self) -> Decimal {
        percent_of(self.account.balance, self.config.risk_percentage())
    }

    pub fn get_risk_metrics(&self) -> RiskMetrics {
        // Saturates when a tiny limit is dwarfed by the drawdown.
        let used = if self.max_drawdown_amount > Decimal::ZERO {
            self.account
                .current_drawdown
                .checked_div(self.max_drawdown_amount)
                .and_then(|share| share.checked_mul(Decimal::ONE_HUNDRED))
                .unwrap_or(Decimal::MAX)
        } else {
            Decimal::ZERO
        };

        RiskMetrics {
            balance: self.account.balance,
            previous_day_balance: self.account.previous_day_balance,
            risk_percentage: self.config.risk_percentage(),
            drawdown_percentage: self.config.drawdown_percentage(),
            risk_amount: self.risk_amount(),
            max_drawdown_amount: self.max_drawdown_amount,
            current_drawdown: self.account.current_drawdown,
            drawdown_threshold: self.account.previous_day_balance - self.max_drawdown_amount,
            drawdown_used_percentage: used,
            trades_today: self.account.trades_today,
        }
    }

    /// Size a trade so that hitting the stop loses exactly the risk amount.
    pub fn calculate_position_size(
        &self,
        request: &PositionRequest,
        pip_scale: PipScale,
    ) -> Result<PositionResult, RiskError> {
        let direction = request.validate()?;
        if self.account.balance <= Decimal::ZERO {
            return Err(RiskError::config(format!(
                "balance must be positive, got {}",
                self.account.balance
            )));
        }

        let risk_amount = self.risk_amount();
        let stop_loss_distance = (request.entry_price - request.stop_loss_price).abs();
        let stop_loss_pips = stop_loss_distance
            .checked_mul(pip_scale.value())
            .ok_or_else(|| out_of_range("stop loss distance in pips"))?;
        let position_size = risk_amount
            .checked_div(stop_loss_distance)
            .ok_or_else(|| out_of_range("position size"))?;

        let (take_profit_pips, risk_reward_ratio, potential_profit) = match request.take_profit_price {
            Some(tp) => {
                let reward_distance = (tp - request.entry_price).abs();
                (
                    Some(
                        reward_distance
                            .checked_mul(pip_scale.value())
                            .ok_or_else(|| out_of_range("take profit distance in pips"))?,
                    ),
                    Some(
                        reward_distance
                            .checked_div(stop_loss_distance)
                            .ok_or_else(|| out_of_range("risk/reward ratio"))?,
                    ),
                    Some(
                        reward_distance
                            .checked_mul(position_size)
                            .ok_or_else(|| out_of_range("potential profit"))?,
                    ),
                )
            }
            None => (None, None, None),
        };

        debug!(
            entry = %request.entry_price,
            stop_loss = %request.stop_loss_price,
            risk_amount = %risk_amount,
            stop_loss_pips = %stop_loss_pips,
            position_size = %position_size,
            "Position sized"
        );

        Ok(PositionResult {
            direction,
            risk_amount,
            stop_loss_distance,
            stop_loss_pips,
            position_size,
            take_profit_pips,
            risk_reward_ratio,
            potential_profit,
        })
    }

    /// Potential loss and profit of a trade. Does not touch any account.
    pub fn simulate_trade_outcome(
        entry_price: Decimal,
        position_size: Decimal,
        stop_loss_price: Decimal,
        take_profit_price: Option<Decimal>,
    ) -> Result<TradeSimulation, RiskError> {
        if position_size <= Decimal::ZERO {
            return Err(RiskError::price(format!(
                "position size must be positive, got {position_size}"
            )));
        }

        let mut request = PositionRequest::new(entry_price, stop_loss_price);
        request.take_profit_price = take_profit_price;
        request.validate()?;

        let risk_distance = (entry_price - stop_loss_price).abs();
        let potential_loss = risk_distance
            .checked_mul(position_size)
            .ok_or_else(|| out_of_range("potential loss"))?;

        let (potential_profit, risk_reward_ratio) = match take_profit_price {
            Some(tp) => {
                let reward_distance = (tp - entry_price).abs();
                (
                    Some(
                        reward_distance
                            .checked_mul(position_size)
                            .ok_or_else(|| out_of_range("potential profit"))?,
                    ),
                    Some(
                        reward_distance
                            .checked_div(risk_distance)
                            .ok_or_else(|| out_of_range("risk/reward ratio"))?,
                    ),
                )
            }
            None => (None, None),
        };

        Ok(TradeSimulation {
            entry_price,
            position_size,
            potential_loss,
            potential_profit,
            risk_reward_ratio,
        })
    }

    /// Apply a closed trade's profit (positive) or loss (negative).
    ///
    /// A result that would overflow the balance or leave it at or below
    /// zero is rejected and the account is left untouched.
    pub fn record_trade_result(&mut self, profit_or_loss: Decimal) -> Result<TradeRecorded, RiskError> {
        let balance = self
            .account
            .balance
            .checked_add(profit_or_loss)
            .ok_or_else(|| RiskError::trade(format!("{profit_or_loss} overflows the balance")))?;
        if balance <= Decimal::ZERO {
            return Err(RiskError::trade(format!(
                "{profit_or_loss} would leave a balance of {balance}; reinitialize the account instead"
            )));
        }
        let trades_today = self
            .account
            .trades_today
            .checked_add(1)
            .ok_or_else(|| RiskError::trade("too many trades recorded today"))?;

        self.account.balance = balance;
        // Both sides are non-negative, so the difference cannot overflow.
        self.account.current_drawdown =
            (self.account.previous_day_balance - balance).max(Decimal::ZERO);
        self.account.trades_today = trades_today;

        let status = self.drawdown_status();
        if status == DrawdownStatus::LimitReached {
            warn!(
                current_drawdown = %self.account.current_drawdown,
                max_drawdown = %self.max_drawdown_amount,
                "Daily drawdown limit reached"
            );
        } else {
            debug!(
                pnl = %profit_or_loss,
                balance = %self.account.balance,
                current_drawdown = %self.account.current_drawdown,
                "Trade result recorded"
            );
        }

        Ok(TradeRecorded {
            balance: self.account.balance,
            current_drawdown: self.account.current_drawdown,
            max_drawdown_amount: self.max_drawdown_amount,
            status,
        })
    }

    pub fn drawdown_status(&self) -> DrawdownStatus {
        if self.account.current_drawdown >= self.max_drawdown_amount {
            DrawdownStatus::LimitReached
        } else {
            DrawdownStatus::WithinLimit
        }
    }

    /// Gate for callers that halt trading once the daily limit is hit.
    pub fn can_place_trade(&self) -> Result<(), RiskError> {
        match self.drawdown_status() {
            DrawdownStatus::WithinLimit => Ok(()),
            DrawdownStatus::LimitReached => Err(RiskError::DrawdownLimitReached {
                current: self.account.current_drawdown,
                limit: self.max_drawdown_amount,
            }),
        }
    }

    /// Roll over to a new trading day. Returns the new drawdown limit.
    pub fn new_trading_day(&mut self) -> Decimal {
        self.account.previous_day_balance = self.account.balance;
        self.account.current_drawdown = Decimal::ZERO;
        self.account.trades_today = 0;
        self.refresh_limit();

        info!(
            previous_day_balance = %self.account.previous_day_balance,
            max_drawdown = %self.max_drawdown_amount,
            "New trading day"
        );

        self.max_drawdown_amount
    }

    fn refresh_limit(&mut self) {
        self.max_drawdown_amount = percent_of(
            self.account.previous_day_balance,
            self.config.drawdown_percentage(),
        );
    }
}

/// Signed profit of a closed trade in price-weighted units.
pub fn realized_pnl(
    direction: Direction,
    entry_price: Decimal,
    exit_price: Decimal,
    position_size: Decimal,
) -> Result<Decimal, RiskError> {
    let move_in_favour = match direction {
        Direction::Buy => exit_price.checked_sub(entry_price),
        Direction::Sell => entry_price.checked_sub(exit_price),
    };
    move_in_favour
        .and_then(|delta| delta.checked_mul(position_size))
        .ok_or_else(|| out_of_range("realized profit or loss"))
}

/// `pct` percent of `value`. Dividing first keeps the result within
/// `value` for any percentage in (0, 100].
fn percent_of(value: Decimal, pct: Decimal) -> Decimal {
    value / Decimal::ONE_HUNDRED * pct
}

fn out_of_range(what: &str) -> RiskError {
    RiskError::price(format!("{what} is out of range for these prices"))
}

fn ensure_positive(name: &str, price: Decimal) -> Result<(), RiskError> {
    if price <= Decimal::ZERO {
        return Err(RiskError::price(format!("{name} must be positive, got {price}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn default_calc() -> RiskCalculator {
        RiskCalculator::initialize(dec!(5000), dec!(0.2), dec!(8)).unwrap()
    }

    #[test]
    fn test_default_account_metrics() {
        let calc = default_calc();
        let metrics = calc.get_risk_metrics();

        assert_eq!(calc.risk_amount(), dec!(10));
        assert_eq!(metrics.max_drawdown_amount, dec!(400));
        assert_eq!(metrics.drawdown_threshold, dec!(4600));
        assert_eq!(metrics.current_drawdown, Decimal::ZERO);
        assert_eq!(metrics.drawdown_used_percentage, Decimal::ZERO);
    }

    #[test]
    fn test_initialize_rejects_bad_input() {
        assert!(matches!(
            RiskCalculator::initialize(dec!(0), dec!(0.2), dec!(8)),
            Err(RiskError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            RiskCalculator::initialize(dec!(5000), dec!(0), dec!(8)),
            Err(RiskError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            RiskCalculator::initialize(dec!(5000), dec!(0.2), dec!(-3)),
            Err(RiskError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_position_size_long() {
        let calc = default_calc();
        let request = PositionRequest::new(dec!(1.2000), dec!(1.1950));
        let result = calc.calculate_position_size(&request, PipScale::default()).unwrap();

        assert_eq!(result.direction, Direction::Buy);
        assert_eq!(result.risk_amount, dec!(10));
        assert_eq!(result.stop_loss_pips, dec!(50));
        assert_eq!(result.position_size, dec!(2000));
        assert_eq!(result.risk_reward_ratio, None);
    }

    #[test]
    fn test_position_size_with_take_profit() {
        let calc = default_calc();
        let request = PositionRequest::new(dec!(1.2000), dec!(1.1950)).with_take_profit(dec!(1.2100));
        let result = calc.calculate_position_size(&request, PipScale::default()).unwrap();

        assert_eq!(result.risk_reward_ratio, Some(dec!(2)));
        assert_eq!(result.take_profit_pips, Some(dec!(100)));
        assert_eq!(result.potential_profit, Some(dec!(20)));
    }

    #[test]
    fn test_position_size_short_jpy() {
        let calc = default_calc();
        let request = PositionRequest::new(dec!(150.00), dec!(150.50));
        let result = calc
            .calculate_position_size(&request, PipScale::for_symbol("USD/JPY"))
            .unwrap();

        assert_eq!(result.direction, Direction::Sell);
        assert_eq!(result.stop_loss_pips, dec!(50));
        assert_eq!(result.position_size, dec!(20));
    }

    #[test]
    fn test_equal_prices_rejected() {
        let calc = default_calc();
        let request = PositionRequest::new(dec!(1.2000), dec!(1.2000));
        assert!(matches!(
            calc.calculate_position_size(&request, PipScale::default()),
            Err(RiskError::InvalidPriceInput(_))
        ));
    }

    #[test]
    fn test_inconsistent_sides_rejected() {
        let calc = default_calc();

        let wrong_direction = PositionRequest::new(dec!(1.2000), dec!(1.1950)).with_direction(Direction::Sell);
        assert!(calc.calculate_position_size(&wrong_direction, PipScale::default()).is_err());

        let wrong_tp = PositionRequest::new(dec!(1.2000), dec!(1.1950)).with_take_profit(dec!(1.1900));
        assert!(calc.calculate_position_size(&wrong_tp, PipScale::default()).is_err());

        let negative = PositionRequest::new(dec!(-1), dec!(1.1950));
        assert!(calc.calculate_position_size(&negative, PipScale::default()).is_err());
    }

    #[test]
    fn test_lots_rounds_down() {
        let calc = default_calc();
        let request = PositionRequest::new(dec!(1.2000), dec!(1.1950));
        let result = calc.calculate_position_size(&request, PipScale::default()).unwrap();

        // 10 / (50 pips * $10) = 0.02 lots
        assert_eq!(result.lots(DEFAULT_PIP_VALUE_PER_LOT), dec!(0.02));

        let request = PositionRequest::new(dec!(1.2000), dec!(1.1970));
        let result = calc.calculate_position_size(&request, PipScale::default()).unwrap();
        // 10 / (30 * 10) = 0.0333.. -> 0.03
        assert_eq!(result.lots(DEFAULT_PIP_VALUE_PER_LOT), dec!(0.03));
    }

    #[test]
    fn test_simulate_trade_outcome() {
        let sim = RiskCalculator::simulate_trade_outcome(
            dec!(1.2000),
            dec!(2000),
            dec!(1.1950),
            Some(dec!(1.2100)),
        )
        .unwrap();

        assert_eq!(sim.potential_loss, dec!(10));
        assert_eq!(sim.potential_profit, Some(dec!(20)));
        assert_eq!(sim.risk_reward_ratio, Some(dec!(2)));

        assert!(RiskCalculator::simulate_trade_outcome(dec!(1.2), dec!(0), dec!(1.1), None).is_err());
    }

    #[test]
    fn test_simulation_does_not_mutate() {
        let calc = default_calc();
        let before = calc.clone();
        let _ = RiskCalculator::simulate_trade_outcome(dec!(1.2), dec!(1000), dec!(1.1), None);
        assert_eq!(calc, before);
    }

    #[test]
    fn test_drawdown_fires_at_limit_not_before() {
        let mut calc = default_calc();

        let r = calc.record_trade_result(dec!(-399.99)).unwrap();
        assert_eq!(r.status, DrawdownStatus::WithinLimit);
        assert!(calc.can_place_trade().is_ok());

        let r = calc.record_trade_result(dec!(-0.01)).unwrap();
        assert_eq!(r.current_drawdown, dec!(400));
        assert_eq!(r.status, DrawdownStatus::LimitReached);
        assert!(matches!(
            calc.can_place_trade(),
            Err(RiskError::DrawdownLimitReached { .. })
        ));
    }

    #[test]
    fn test_profit_above_previous_close_has_no_drawdown() {
        let mut calc = default_calc();
        calc.record_trade_result(dec!(-100)).unwrap();
        let r = calc.record_trade_result(dec!(250)).unwrap();

        assert_eq!(r.balance, dec!(5150));
        assert_eq!(r.current_drawdown, Decimal::ZERO);
        assert_eq!(calc.account().trades_today, 2);
    }

    #[test]
    fn test_new_trading_day_resets() {
        let mut calc = default_calc();
        calc.record_trade_result(dec!(-500)).unwrap();
        assert_eq!(calc.drawdown_status(), DrawdownStatus::LimitReached);

        let limit = calc.new_trading_day();
        assert_eq!(limit, dec!(360)); // 4500 * 8%
        assert_eq!(calc.account().previous_day_balance, dec!(4500));
        assert_eq!(calc.account().current_drawdown, Decimal::ZERO);
        assert_eq!(calc.account().trades_today, 0);
        assert!(calc.can_place_trade().is_ok());

        // Repeating with no trades in between changes nothing
        assert_eq!(calc.new_trading_day(), limit);
    }

    #[test]
    fn test_realized_pnl() {
        assert_eq!(realized_pnl(Direction::Buy, dec!(1.2), dec!(1.21), dec!(2000)), Ok(dec!(20)));
        assert_eq!(realized_pnl(Direction::Sell, dec!(1.2), dec!(1.21), dec!(2000)), Ok(dec!(-20)));
    }

    #[test]
    fn test_realized_pnl_out_of_range() {
        let huge = realized_pnl(Direction::Buy, dec!(1), Decimal::MAX, Decimal::MAX);
        assert!(matches!(huge, Err(RiskError::InvalidPriceInput(_))));

        let huge_short = realized_pnl(Direction::Sell, Decimal::MAX, dec!(1), dec!(2));
        assert!(matches!(huge_short, Err(RiskError::InvalidPriceInput(_))));
    }

    #[test]
    fn test_stop_too_close_to_entry_is_rejected() {
        let calc = default_calc();
        // 10 / 1e-28 does not fit in a Decimal
        let request = PositionRequest::new(dec!(1.2), dec!(1.1999999999999999999999999999));
        assert!(matches!(
            calc.calculate_position_size(&request, PipScale::default()),
            Err(RiskError::InvalidPriceInput(_))
        ));
    }

    #[test]
    fn test_huge_prices_are_rejected_not_panicking() {
        let calc = default_calc();

        let request = PositionRequest::new(Decimal::MAX, dec!(1));
        assert!(matches!(
            calc.calculate_position_size(&request, PipScale::default()),
            Err(RiskError::InvalidPriceInput(_))
        ));

        let request = PositionRequest::new(dec!(1.2), dec!(1.1)).with_take_profit(Decimal::MAX);
        assert!(matches!(
            calc.calculate_position_size(&request, PipScale::default()),
            Err(RiskError::InvalidPriceInput(_))
        ));

        let sim = RiskCalculator::simulate_trade_outcome(dec!(1.2), Decimal::MAX, dec!(0.1), None);
        assert!(matches!(sim, Err(RiskError::InvalidPriceInput(_))));
    }

    #[test]
    fn test_wide_stop_sizes_a_small_position() {
        let calc = default_calc();
        let request = PositionRequest::new(dec!(1000000), dec!(0.0001));
        let result = calc.calculate_position_size(&request, PipScale::default()).unwrap();

        assert!(result.position_size > Decimal::ZERO);
        assert!(result.position_size < dec!(0.0001));
        assert_eq!(result.lots(DEFAULT_PIP_VALUE_PER_LOT), Decimal::ZERO);
    }

    #[test]
    fn test_overflowing_result_leaves_account_untouched() {
        let mut calc = default_calc();
        calc.record_trade_result(dec!(-100)).unwrap();
        let before = calc.clone();

        assert!(matches!(
            calc.record_trade_result(Decimal::MAX),
            Err(RiskError::InvalidTradeResult(_))
        ));
        assert_eq!(calc, before);
    }

    #[test]
    fn test_result_wiping_out_balance_is_rejected() {
        let mut calc = default_calc();
        let before = calc.clone();

        assert!(matches!(
            calc.record_trade_result(dec!(-5000)),
            Err(RiskError::InvalidTradeResult(_))
        ));
        assert!(calc.record_trade_result(dec!(-6000)).is_err());
        assert_eq!(calc, before);

        let r = calc.record_trade_result(dec!(-4999.99)).unwrap();
        assert_eq!(r.balance, dec!(0.01));
        assert!(r.limit_reached());
    }

    #[test]
    fn test_restore_rejects_non_positive_balance() {
        for balance in [dec!(0), dec!(-1)] {
            let account = AccountState {
                balance,
                previous_day_balance: dec!(5000),
                current_drawdown: dec!(5000),
                trades_today: 1,
            };
            assert!(matches!(
                RiskCalculator::restore(RiskConfig::default(), account),
                Err(RiskError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_zero_limit_reports_no_usage() {
        let account = AccountState {
            balance: dec!(100),
            previous_day_balance: Decimal::ZERO,
            current_drawdown: Decimal::ZERO,
            trades_today: 0,
        };
        let calc = RiskCalculator::restore(RiskConfig::default(), account).unwrap();
        let metrics = calc.get_risk_metrics();

        assert_eq!(metrics.max_drawdown_amount, Decimal::ZERO);
        assert_eq!(metrics.drawdown_used_percentage, Decimal::ZERO);
        assert_eq!(metrics.drawdown_threshold, Decimal::ZERO);
    }

    #[test]
    fn test_tiny_limit_saturates_usage() {
        let config = RiskConfig::new(dec!(0.2), dec!(0.0000000000000000000000000001)).unwrap();
        let account = AccountState {
            balance: dec!(1),
            previous_day_balance: dec!(1000000),
            current_drawdown: dec!(999999),
            trades_today: 4,
        };
        let calc = RiskCalculator::restore(config, account).unwrap();
        assert_eq!(calc.get_risk_metrics().drawdown_used_percentage, Decimal::MAX);
    }

    #[test]
    fn test_restore_recomputes_limit() {
        let account = AccountState {
            balance: dec!(4800),
            previous_day_balance: dec!(5000),
            current_drawdown: dec!(200),
            trades_today: 3,
        };
        let calc = RiskCalculator::restore(RiskConfig::default(), account).unwrap();
        assert_eq!(calc.max_drawdown_amount(), dec!(400));
        assert_eq!(calc.get_risk_metrics().drawdown_used_percentage, dec!(50));
    }

    fn cents(range: std::ops::Range<i64>) -> impl Strategy<Value = Decimal> {
        range.prop_map(|c| Decimal::new(c, 2))
    }

    /// Any representable decimal, from the full 96-bit mantissa and every scale.
    fn any_decimal() -> impl Strategy<Value = Decimal> {
        (any::<u32>(), any::<u32>(), any::<u32>(), any::<bool>(), 0u32..=28)
            .prop_map(|(lo, mid, hi, negative, scale)| Decimal::from_parts(lo, mid, hi, negative, scale))
    }

    proptest! {
        #[test]
        fn risk_amount_is_exact_share_of_balance(
            balance in cents(1..100_000_000),
            risk_bp in 1i64..=10_000,
        ) {
            let risk = Decimal::new(risk_bp, 2);
            let calc = RiskCalculator::initialize(balance, risk, dec!(8)).unwrap();
            prop_assert_eq!(calc.risk_amount(), balance * risk / dec!(100));
        }

        #[test]
        fn position_size_times_distance_is_risk(
            entry in 5_000i64..20_000,
            offset in 1i64..2_000,
            below in any::<bool>(),
        ) {
            let calc = RiskCalculator::initialize(dec!(5000), dec!(0.2), dec!(8)).unwrap();
            let entry = Decimal::new(entry, 4);
            let offset = Decimal::new(offset, 4);
            let stop = if below { entry - offset } else { entry + offset };

            let result = calc
                .calculate_position_size(&PositionRequest::new(entry, stop), PipScale::default())
                .unwrap();
            let diff = (result.position_size * result.stop_loss_distance - result.risk_amount).abs();
            prop_assert!(diff < dec!(0.000001), "diff = {}", diff);
        }

        #[test]
        fn drawdown_signal_matches_threshold(pnls in prop::collection::vec(cents(-20_000..20_000), 1..20)) {
            let mut calc = RiskCalculator::initialize(dec!(5000), dec!(0.2), dec!(8)).unwrap();
            for pnl in pnls {
                let r = calc.record_trade_result(pnl).unwrap();
                let expected = (dec!(5000) - r.balance).max(Decimal::ZERO);
                prop_assert_eq!(r.current_drawdown, expected);
                prop_assert_eq!(r.limit_reached(), r.current_drawdown >= dec!(400));
            }
        }

        #[test]
        fn any_result_keeps_balance_positive(pnls in prop::collection::vec(any_decimal(), 1..20)) {
            let mut calc = RiskCalculator::initialize(dec!(5000), dec!(0.2), dec!(8)).unwrap();
            for pnl in pnls {
                let before = calc.clone();
                match calc.record_trade_result(pnl) {
                    Ok(r) => prop_assert!(r.balance > Decimal::ZERO),
                    Err(_) => prop_assert_eq!(&calc, &before),
                }
            }
        }

        #[test]
        fn sizing_any_prices_never_panics(
            entry in any_decimal(),
            stop in any_decimal(),
            take_profit in proptest::option::of(any_decimal()),
        ) {
            let calc = RiskCalculator::initialize(dec!(5000), dec!(0.2), dec!(8)).unwrap();
            let mut request = PositionRequest::new(entry, stop);
            request.take_profit_price = take_profit;

            if let Ok(result) = calc.calculate_position_size(&request, PipScale::default()) {
                prop_assert!(result.position_size > Decimal::ZERO);
                let _ = result.lots(DEFAULT_PIP_VALUE_PER_LOT);
            }
        }
    }
}
