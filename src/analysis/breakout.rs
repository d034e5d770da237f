//! Breakouts from trend lines and horizontal levels.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use super::levels::{
    horizontal_levels, resistance_touches, support_touches, swing_highs, swing_lows, trend_lines,
    Level, TrendLine,
};
use super::Bars;
use crate::models::{Candle, Direction, RESISTANCE_BREAKOUT, SUPPORT_BREAKDOWN};

/// Breakout detection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakoutConfig {
    /// Bars either side a swing point must dominate
    pub swing_window: usize,

    /// Swing points needed to form a trend line
    pub min_line_points: usize,

    /// Max distance from a trend line, relative to price
    pub max_line_distance: f64,

    /// Bars in a cluster slice
    pub cluster_window: usize,

    /// Relative distance that counts as the same level
    pub cluster_threshold: f64,

    /// Most recent bars searched for a breakout
    pub lookback: usize,

    /// Closes beyond the line needed to confirm
    pub confirmation_bars: usize,

    /// Minimum first close beyond the line, relative to the line
    pub min_breakout_fraction: f64,

    /// Target distance as a multiple of the stop distance
    pub reward_multiple: Decimal,
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        Self {
            swing_window: 5,
            min_line_points: 3,
            max_line_distance: 0.0015, // 0.15%
            cluster_window: 20,
            cluster_threshold: 0.0005, // 0.05%
            lookback: 5,
            confirmation_bars: 2,
            min_breakout_fraction: 0.001, // 0.1%
            reward_multiple: Decimal::TWO,
        }
    }
}

/// What was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakoutSource {
    TrendLine,
    Horizontal,
}

impl BreakoutSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakoutSource::TrendLine => "trend line",
            BreakoutSource::Horizontal => "horizontal",
        }
    }
}

/// A confirmed close beyond resistance (buy) or support (sell).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakout {
    pub direction: Direction,
    pub source: BreakoutSource,
    /// Open time of the first bar that closed beyond the line
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    /// The line's value at that bar
    pub level: f64,
    /// Distance beyond the line, relative to the line
    pub fraction: f64,
    pub strength: f64,
    /// Swing points on the trend line, or touches of the level
    pub touches: usize,
}

/// Levels for a detection derived from a breakout.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedDetection {
    pub pattern_name: &'static str,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Option<Decimal>,
    pub confidence: f64,
}

impl Breakout {
    pub fn pattern_name(&self) -> &'static str {
        match self.direction {
            Direction::Buy => RESISTANCE_BREAKOUT,
            Direction::Sell => SUPPORT_BREAKDOWN,
        }
    }

    /// Base confidence before indicator confirmation: 55, plus 5 per
    /// touch or line point up to six.
    pub fn confidence(&self) -> f64 {
        55.0 + 5.0 * self.touches.min(6) as f64
    }

    /// Enter at `latest_close` with the stop on the broken line and the
    /// target `reward_multiple` stop distances away.
    ///
    /// `None` when the close has fallen back onto the stop side.
    pub fn propose(&self, latest_close: Decimal, reward_multiple: Decimal) -> Option<ProposedDetection> {
        let stop_loss = Decimal::from_f64(self.level)?.round_dp(5);
        if stop_loss <= Decimal::ZERO {
            return None;
        }

        let risk = match self.direction {
            Direction::Buy => latest_close.checked_sub(stop_loss)?,
            Direction::Sell => stop_loss.checked_sub(latest_close)?,
        };
        if risk <= Decimal::ZERO {
            return None;
        }

        let reward = risk.checked_mul(reward_multiple)?;
        let take_profit = match self.direction {
            Direction::Buy => latest_close.checked_add(reward),
            Direction::Sell => latest_close.checked_sub(reward),
        }
        .filter(|tp| *tp > Decimal::ZERO);

        Some(ProposedDetection {
            pattern_name: self.pattern_name(),
            entry_price: latest_close,
            stop_loss,
            take_profit,
            confidence: self.confidence(),
        })
    }
}

/// Lines, levels and breakouts found in a candle history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analysis {
    pub candles: usize,
    pub resistance_lines: Vec<TrendLine>,
    pub support_lines: Vec<TrendLine>,
    pub resistance_levels: Vec<Level>,
    pub support_levels: Vec<Level>,
    /// Newest first
    pub breakouts: Vec<Breakout>,
    pub latest_close: Option<Decimal>,
}

/// Analyse `candles` (oldest first) for breakouts.
pub fn analyze(candles: &[Candle], config: &BreakoutConfig) -> Analysis {
    let bars = Bars::from_candles(candles);
    let mut analysis = Analysis {
        candles: candles.len(),
        latest_close: candles.last().map(|c| c.close),
        ..Analysis::default()
    };
    if bars.len() == 0 {
        return analysis;
    }

    let highs = swing_highs(&bars.highs, config.swing_window);
    let lows = swing_lows(&bars.lows, config.swing_window);
    // A line needs both sides to be meaningful.
    if !highs.is_empty() && !lows.is_empty() {
        analysis.resistance_lines = trend_lines(
            &highs,
            &bars.times,
            &bars.highs,
            config.min_line_points,
            config.max_line_distance,
        );
        analysis.support_lines = trend_lines(
            &lows,
            &bars.times,
            &bars.lows,
            config.min_line_points,
            config.max_line_distance,
        );
    }

    let threshold = config.cluster_threshold;
    analysis.resistance_levels = horizontal_levels(&bars.highs, config.cluster_window, threshold)
        .into_iter()
        .map(|(price, strength)| Level {
            price,
            strength,
            touches: resistance_touches(&bars.highs, &bars.closes, price, threshold),
        })
        .collect();
    analysis.support_levels = horizontal_levels(&bars.lows, config.cluster_window, threshold)
        .into_iter()
        .map(|(price, strength)| Level {
            price,
            strength,
            touches: support_touches(&bars.lows, &bars.closes, price, threshold),
        })
        .collect();

    let start = bars.len().saturating_sub(config.lookback);
    let recent_closes = &bars.closes[start..];
    let recent_times = &bars.times[start..];

    let mut breakouts = Vec::new();
    for (lines, direction) in [
        (&analysis.resistance_lines, Direction::Buy),
        (&analysis.support_lines, Direction::Sell),
    ] {
        for line in lines {
            let values: Vec<f64> = recent_times.iter().map(|&t| line.value_at(t)).collect();
            if let Some((offset, fraction)) = crossing(recent_closes, &values, direction, config) {
                breakouts.push(Breakout {
                    direction,
                    source: BreakoutSource::TrendLine,
                    timestamp: candles[start + offset].timestamp,
                    price: recent_closes[offset],
                    level: values[offset],
                    fraction,
                    strength: line.strength,
                    touches: line.points,
                });
            }
        }
    }

    for (levels, direction) in [
        (&analysis.resistance_levels, Direction::Buy),
        (&analysis.support_levels, Direction::Sell),
    ] {
        for level in levels {
            let values = vec![level.price; recent_closes.len()];
            if let Some((offset, fraction)) = crossing(recent_closes, &values, direction, config) {
                breakouts.push(Breakout {
                    direction,
                    source: BreakoutSource::Horizontal,
                    timestamp: candles[start + offset].timestamp,
                    price: recent_closes[offset],
                    level: level.price,
                    fraction,
                    strength: level.strength as f64,
                    touches: level.touches,
                });
            }
        }
    }

    breakouts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    analysis.breakouts = breakouts;
    analysis
}

/// Where the closes last sat on the near side of `line` before the final
/// `confirmation_bars` and then stayed beyond it.
///
/// Returns the offset of the first bar beyond the line and how far beyond
/// it closed, relative to the line.
fn crossing(
    closes: &[f64],
    line: &[f64],
    direction: Direction,
    config: &BreakoutConfig,
) -> Option<(usize, f64)> {
    let n = closes.len();
    if config.confirmation_bars == 0 || n <= config.confirmation_bars {
        return None;
    }

    let near_side = |i: usize| match direction {
        Direction::Buy => closes[i] < line[i],
        Direction::Sell => closes[i] > line[i],
    };
    let beyond = |i: usize| match direction {
        Direction::Buy => closes[i] > line[i],
        Direction::Sell => closes[i] < line[i],
    };

    let last_near = (0..n - config.confirmation_bars).rev().find(|&i| near_side(i))?;
    let first_beyond = last_near + 1;
    if n - first_beyond < config.confirmation_bars || !(first_beyond..n).all(beyond) {
        return None;
    }

    let level = line[first_beyond];
    if level <= 0.0 {
        return None;
    }
    let fraction = match direction {
        Direction::Buy => (closes[first_beyond] - level) / level,
        Direction::Sell => (level - closes[first_beyond]) / level,
    };

    (fraction >= config.min_breakout_fraction).then_some((first_beyond, fraction))
}
