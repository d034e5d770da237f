//! Plain-text replies.

use rust_decimal::Decimal;

use crate::desk::PositionQuote;
use crate::models::{ChartPattern, CurrencyPair, Signal};
use crate::risk::{RiskMetrics, TradeRecorded};

/// Two decimal places, trailing zeros dropped.
pub fn money(value: Decimal) -> Decimal {
    value.round_dp(2).normalize()
}

fn price(value: Decimal) -> Decimal {
    value.round_dp(5).normalize()
}

/// Truncate a string with ellipsis if too long.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

pub fn help_text() -> String {
    [
        "Commands:",
        "  /risk                          account and drawdown status",
        "  /calculate <entry> <stop> [tp] [PAIR]",
        "                                 size a position at the current risk",
        "  /result <pnl>                  record a closed trade's profit or loss",
        "  /newday                        start a new trading day",
        "  /pairs                         supported currency pairs",
        "  /patterns                      chart pattern catalog",
        "  /signals                       high-confidence pattern signals",
        "  /help                          this message",
    ]
    .join("\n")
}

pub fn welcome_text(metrics: &RiskMetrics) -> String {
    format!(
        "Forex risk desk.\nRisking {}% per trade with a {}% daily drawdown limit on a balance of {}.\n\n{}",
        metrics.risk_percentage.normalize(),
        metrics.drawdown_percentage.normalize(),
        money(metrics.balance),
        help_text()
    )
}

pub fn risk_summary(metrics: &RiskMetrics) -> String {
    let mut lines = vec![
        "Account".to_string(),
        format!("Balance:         {}", money(metrics.balance)),
        format!("Yesterday close: {}", money(metrics.previous_day_balance)),
        format!("Risk per trade:  {}% ({})", metrics.risk_percentage.normalize(), money(metrics.risk_amount)),
        format!("Drawdown limit:  {}% ({})", metrics.drawdown_percentage.normalize(), money(metrics.max_drawdown_amount)),
        format!(
            "Drawdown today:  {} ({}% used)",
            money(metrics.current_drawdown),
            money(metrics.drawdown_used_percentage)
        ),
        format!("Stop-out level:  {}", money(metrics.drawdown_threshold)),
        format!("Trades today:    {}", metrics.trades_today),
    ];

    if metrics.current_drawdown >= metrics.max_drawdown_amount {
        lines.push("Daily drawdown limit reached. No new trades today.".to_string());
    }

    lines.join("\n")
}

pub fn position_reply(quote: &PositionQuote) -> String {
    let result = &quote.result;
    let mut lines = vec![
        format!(
            "{} {}",
            result.direction.as_str().to_uppercase(),
            quote.pair.as_deref().unwrap_or("position")
        ),
        format!("Risk amount:     {}", money(result.risk_amount)),
        format!("Stop distance:   {} ({} pips)", price(result.stop_loss_distance), money(result.stop_loss_pips)),
        format!("Position size:   {}", money(result.position_size)),
        format!("Lots:            {}", quote.lots.normalize()),
    ];

    if let Some(pips) = result.take_profit_pips {
        lines.push(format!("Take profit:     {} pips", money(pips)));
    }
    if let Some(rr) = result.risk_reward_ratio {
        lines.push(format!("Risk/reward:     1:{}", money(rr)));
    }
    if let Some(profit) = result.potential_profit {
        lines.push(format!("Potential gain:  {}", money(profit)));
    }

    lines.join("\n")
}

pub fn trade_recorded_reply(profit_or_loss: Decimal, recorded: &TradeRecorded) -> String {
    let sign = if profit_or_loss >= Decimal::ZERO { "+" } else { "" };
    let mut reply = format!(
        "Recorded {}{}\nBalance:         {}\nDrawdown today:  {} of {}",
        sign,
        money(profit_or_loss),
        money(recorded.balance),
        money(recorded.current_drawdown),
        money(recorded.max_drawdown_amount)
    );

    if recorded.limit_reached() {
        reply.push_str("\nDaily drawdown limit reached. Stop trading for today.");
    }

    reply
}

pub fn new_day_reply(metrics: &RiskMetrics, limit: Decimal) -> String {
    format!(
        "New trading day.\nStarting balance: {}\nDrawdown limit:   {}",
        money(metrics.previous_day_balance),
        money(limit)
    )
}

/// Pairs with their last recorded rate, if any.
pub fn pairs_table(pairs: &[(CurrencyPair, Option<Decimal>)]) -> String {
    let mut out = format!("{:<9} {:<8} {:>8} {:>11}  {}\n", "PAIR", "TYPE", "PIP", "LAST", "NAME");
    out.push_str(&"-".repeat(72));

    for (pair, rate) in pairs {
        let last = rate
            .map(|r| price(r).to_string())
            .unwrap_or_else(|| "-".to_string());

        out.push_str(&format!(
            "\n{:<9} {:<8} {:>8} {:>11}  {}",
            pair.symbol,
            pair.category.as_str(),
            pair.pip_size.normalize(),
            last,
            truncate(&pair.name, 32)
        ));
    }

    out
}

pub fn patterns_table(patterns: &[ChartPattern]) -> String {
    let mut out = format!("{:<28} {:<13} {:>5}\n", "PATTERN", "KIND", "REL%");
    out.push_str(&"-".repeat(48));

    for pattern in patterns {
        out.push_str(&format!(
            "\n{:<28} {:<13} {:>5.0}",
            truncate(&pattern.name, 28),
            pattern.kind.as_str(),
            pattern.reliability * 100.0
        ));
    }

    out
}

pub fn signals_table(signals: &[Signal]) -> String {
    if signals.is_empty() {
        return "No signals above the confidence threshold.".to_string();
    }

    let mut out = format!(
        "{:<8} {:<20} {:<4} {:>9} {:>9} {:>5} {:>8} {:>10}\n",
        "PAIR", "PATTERN", "TF", "ENTRY", "STOP", "CONF", "RISK", "SIZE"
    );
    out.push_str(&"-".repeat(80));

    for signal in signals {
        let d = &signal.detection;
        let (risk, size) = match (signal.risk_amount, signal.position_size) {
            (Some(risk), Some(size)) => (money(risk).to_string(), money(size).to_string()),
            _ => ("-".to_string(), "n/a".to_string()),
        };

        out.push_str(&format!(
            "\n{:<8} {:<20} {:<4} {:>9} {:>9} {:>5.0} {:>8} {:>10}",
            truncate(&d.pair_symbol, 8),
            truncate(&d.pattern_name, 20),
            d.timeframe,
            price(d.entry_price),
            price(d.stop_loss),
            signal.confirmation.confidence,
            risk,
            size
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_rounds_and_trims() {
        assert_eq!(money(dec!(2000.0000)).to_string(), "2000");
        assert_eq!(money(dec!(12.3456)).to_string(), "12.35");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("EUR/USD", 10), "EUR/USD");
        assert_eq!(truncate("Inverse Head and Shoulders", 10), "Inverse...");
    }

    #[test]
    fn test_signals_table_shows_confirmed_confidence() {
        use crate::models::{Confirmation, PatternDetection};

        let signal = Signal {
            detection: PatternDetection {
                id: 1,
                pair_symbol: "EUR/USD".to_string(),
                pattern_name: "Flag".to_string(),
                timeframe: "1h".to_string(),
                entry_price: dec!(1.0600),
                stop_loss: dec!(1.0550),
                take_profit: None,
                confidence: 72.0,
                detected_at: chrono::Utc::now(),
            },
            confirmation: Confirmation {
                base_confidence: 72.0,
                confidence: 82.0,
                reasons: vec!["Uptrend confirmed by moving averages".to_string()],
            },
            risk_amount: Some(dec!(10)),
            position_size: Some(dec!(2000)),
            lots: Some(dec!(0.02)),
            risk_reward_ratio: None,
            sizing_error: None,
        };

        let table = signals_table(&[signal]);
        assert!(table.contains(" 82 "));
        assert!(!table.contains(" 72 "));
    }

    #[test]
    fn test_signals_table_empty() {
        assert_eq!(signals_table(&[]), "No signals above the confidence threshold.");
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = help_text();
        for command in ["/risk", "/calculate", "/result", "/newday", "/pairs", "/patterns", "/signals", "/help"] {
            assert!(help.contains(command), "help is missing {}", command);
        }
    }
}
