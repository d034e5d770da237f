//! Summary statistics over closed journal trades.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Performance of the closed trades in the journal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalMetrics {
    pub closed_trades: u32,

    pub winning_trades: u32,

    pub losing_trades: u32,

    /// Closed at exactly zero; neither a win nor a loss
    pub break_even_trades: u32,

    /// Win rate (0.0 to 1.0)
    pub win_rate: f64,

    pub total_pnl: Decimal,

    /// Average profit on winning trades
    pub avg_win: Decimal,

    /// Average loss on losing trades (absolute value)
    pub avg_loss: Decimal,

    /// Gross profit / gross loss
    pub profit_factor: f64,

    pub mean_pnl: f64,

    /// Sample standard deviation of per-trade P&L
    pub pnl_std_dev: f64,

    /// Largest peak-to-trough fall of cumulative P&L
    pub max_drawdown: Decimal,
}

impl JournalMetrics {
    /// Build from per-trade P&L in chronological order.
    pub fn from_pnls(pnls: &[Decimal]) -> Self {
        let mut metrics = Self::default();
        if pnls.is_empty() {
            return metrics;
        }

        let wins: Vec<Decimal> = pnls.iter().copied().filter(|p| *p > Decimal::ZERO).collect();
        let losses: Vec<Decimal> = pnls.iter().copied().filter(|p| *p < Decimal::ZERO).collect();

        metrics.closed_trades = pnls.len() as u32;
        metrics.winning_trades = wins.len() as u32;
        metrics.losing_trades = losses.len() as u32;
        metrics.break_even_trades = (pnls.len() - wins.len() - losses.len()) as u32;
        metrics.win_rate = wins.len() as f64 / pnls.len() as f64;
        metrics.total_pnl = pnls.iter().copied().sum();

        let gross_profit: Decimal = wins.iter().copied().sum();
        let gross_loss: Decimal = losses.iter().map(|l| l.abs()).sum();

        if !wins.is_empty() {
            metrics.avg_win = gross_profit / Decimal::from(wins.len() as u32);
        }
        if !losses.is_empty() {
            metrics.avg_loss = gross_loss / Decimal::from(losses.len() as u32);
        }
        if gross_loss > Decimal::ZERO {
            metrics.profit_factor =
                gross_profit.to_f64().unwrap_or(0.0) / gross_loss.to_f64().unwrap_or(1.0);
        }

        let values: Vec<f64> = pnls.iter().filter_map(|p| p.to_f64()).collect();
        metrics.mean_pnl = values.iter().mean();
        if values.len() >= 2 {
            metrics.pnl_std_dev = values.iter().std_dev();
        }

        let mut equity = Decimal::ZERO;
        let mut peak = Decimal::ZERO;
        for pnl in pnls {
            equity += pnl;
            peak = peak.max(equity);
            metrics.max_drawdown = metrics.max_drawdown.max(peak - equity);
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_win_loss_breakdown() {
        let pnls = vec![dec!(20), dec!(-10), dec!(30), dec!(-10), dec!(20)];
        let m = JournalMetrics::from_pnls(&pnls);

        assert_eq!(m.closed_trades, 5);
        assert_eq!(m.winning_trades, 3);
        assert_eq!(m.losing_trades, 2);
        assert_eq!(m.total_pnl, dec!(50));
        assert_eq!(m.avg_loss, dec!(10));
        assert!((m.win_rate - 0.6).abs() < 1e-9);
        assert!((m.profit_factor - 3.5).abs() < 1e-9);
        assert!((m.mean_pnl - 10.0).abs() < 1e-9);
        assert!(m.pnl_std_dev > 0.0);
    }

    #[test]
    fn test_break_even_is_neither_win_nor_loss() {
        let pnls = vec![dec!(20), dec!(0), dec!(-10), dec!(0.00)];
        let m = JournalMetrics::from_pnls(&pnls);

        assert_eq!(m.closed_trades, 4);
        assert_eq!(m.winning_trades, 1);
        assert_eq!(m.losing_trades, 1);
        assert_eq!(m.break_even_trades, 2);
        assert_eq!(m.avg_loss, dec!(10));
        assert!((m.win_rate - 0.25).abs() < 1e-9);
        assert!((m.profit_factor - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_drawdown_of_cumulative_pnl() {
        // Equity: 10, 30, 0, -5, 25 -> worst fall from 30 to -5
        let pnls = vec![dec!(10), dec!(20), dec!(-30), dec!(-5), dec!(30)];
        let m = JournalMetrics::from_pnls(&pnls);
        assert_eq!(m.max_drawdown, dec!(35));
    }

    #[test]
    fn test_empty_journal() {
        assert_eq!(JournalMetrics::from_pnls(&[]), JournalMetrics::default());
    }
}
