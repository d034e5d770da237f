//! Technical indicators used to confirm detections.

use serde::Serialize;
use statrs::statistics::Statistics;

const RSI_PERIOD: usize = 14;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_WIDTH: f64 = 2.0;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

/// Indicator values at the latest bar. `None` until enough bars exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,
}

impl IndicatorSnapshot {
    pub fn latest(closes: &[f64]) -> Option<Self> {
        let close = *closes.last()?;

        let (bollinger_upper, bollinger_lower) = match bollinger(closes, BOLLINGER_PERIOD, BOLLINGER_WIDTH) {
            Some((upper, lower)) => (Some(upper), Some(lower)),
            None => (None, None),
        };
        let (macd, macd_histogram) = match macd(closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL) {
            Some((line, histogram)) => (Some(line), Some(histogram)),
            None => (None, None),
        };

        Some(Self {
            close,
            sma_20: sma(closes, 20),
            sma_50: sma(closes, 50),
            rsi: rsi(closes, RSI_PERIOD),
            macd,
            macd_histogram,
            bollinger_upper,
            bollinger_lower,
        })
    }
}

/// Mean of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(values[values.len() - period..].iter().mean())
}

/// Exponential moving average seeded with the first value,
/// `alpha = 2 / (span + 1)`.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    for &value in values {
        let next = match out.last() {
            Some(&prev) => alpha * value + (1.0 - alpha) * prev,
            None => value,
        };
        out.push(next);
    }
    out
}

/// RSI over the last `period` price changes, using simple averages.
///
/// 100 when there were only gains; `None` with no movement at all.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }

    let recent = &closes[closes.len() - period - 1..];
    let (gain, loss) = recent.windows(2).fold((0.0, 0.0), |(gain, loss), pair| {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            (gain + delta, loss)
        } else {
            (gain, loss - delta)
        }
    });

    let (avg_gain, avg_loss) = (gain / period as f64, loss / period as f64);
    if avg_loss == 0.0 {
        return if avg_gain > 0.0 { Some(100.0) } else { None };
    }
    Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
}

/// Latest MACD line and histogram (line minus signal).
///
/// Needs at least `slow` bars so the slow average has warmed up.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<(f64, f64)> {
    if fast == 0 || fast >= slow || signal == 0 || closes.len() < slow {
        return None;
    }

    let line: Vec<f64> = ema(closes, fast)
        .iter()
        .zip(ema(closes, slow))
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&line, signal);

    let macd = *line.last()?;
    Some((macd, macd - signal_line.last()?))
}

/// Upper and lower Bollinger bands: mean ± `width` sample standard deviations.
pub fn bollinger(closes: &[f64], period: usize, width: f64) -> Option<(f64, f64)> {
    if period < 2 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let mean = window.iter().mean();
    let deviation = window.iter().std_dev();
    Some((mean + width * deviation, mean - width * deviation))
}

/// Mean volume of the last five bars against the five before them.
///
/// `None` with fewer than ten bars or when the earlier bars traded nothing.
pub fn volume_ratio(volumes: &[f64]) -> Option<f64> {
    if volumes.len() < 10 {
        return None;
    }
    let n = volumes.len();
    let recent = volumes[n - 5..].iter().mean();
    let previous = volumes[n - 10..n - 5].iter().mean();
    if previous <= 0.0 {
        return None;
    }
    Some(recent / previous)
}
