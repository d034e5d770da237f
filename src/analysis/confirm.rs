//! Indicator confirmation of pattern detections.

use rust_decimal::prelude::ToPrimitive;

use super::indicators::{volume_ratio, IndicatorSnapshot};
use super::Bars;
use crate::models::{Candle, Confirmation, Direction, PatternDetection, PatternKind};

/// The most confirmation can add to a detection's confidence.
pub const MAX_CONFIRMATION_BOOST: f64 = 40.0;

const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;
const VOLUME_SURGE: f64 = 1.2;
const FALSE_BREAKOUT_BARS: usize = 5;

/// Adjust `detection`'s confidence against recent candles (oldest first).
///
/// - Continuation patterns gain 10 when the moving averages trend the
///   trade's way and lose 10 otherwise.
/// - Reversal patterns gain 10 for each sign of exhaustion against the
///   trade: RSI extreme, close outside the Bollinger band, MACD turned.
/// - Rising volume adds 10; flat or falling volume costs 5.
/// - Price that poked through the entry and closed back costs 20.
///
/// The result is clamped to 0..=100.
pub fn confirm(detection: &PatternDetection, kind: Option<PatternKind>, candles: &[Candle]) -> Confirmation {
    let base = detection.confidence;
    if candles.len() < 2 {
        return Confirmation::unchanged(base, "Not enough price history to confirm");
    }
    let Ok(direction) = detection.position_request().validate() else {
        return Confirmation::unchanged(base, "Levels do not define a direction");
    };

    let bars = Bars::from_candles(candles);
    let Some(latest) = IndicatorSnapshot::latest(&bars.closes) else {
        return Confirmation::unchanged(base, "Not enough price history to confirm");
    };

    let mut confidence = base;
    let mut reasons = Vec::new();
    let mut adjust = |delta: f64, reason: &str| {
        confidence += delta;
        reasons.push(reason.to_string());
    };

    match kind {
        Some(PatternKind::Continuation) => {
            if let (Some(sma_20), Some(sma_50)) = (latest.sma_20, latest.sma_50) {
                let up = sma_20 > sma_50 && latest.close > sma_20;
                let down = sma_20 < sma_50 && latest.close < sma_20;
                match direction {
                    Direction::Buy if up => adjust(10.0, "Uptrend confirmed by moving averages"),
                    Direction::Sell if down => adjust(10.0, "Downtrend confirmed by moving averages"),
                    _ => adjust(-10.0, "Moving averages do not support the trend"),
                }
            }
        }
        Some(PatternKind::Reversal) => {
            let (rsi_extreme, outside_band, macd_turned) = match direction {
                Direction::Sell => (
                    latest.rsi.is_some_and(|rsi| rsi > RSI_OVERBOUGHT),
                    latest.bollinger_upper.is_some_and(|upper| latest.close > upper),
                    matches!((latest.macd, latest.macd_histogram), (Some(m), Some(h)) if m < 0.0 && h < 0.0),
                ),
                Direction::Buy => (
                    latest.rsi.is_some_and(|rsi| rsi < RSI_OVERSOLD),
                    latest.bollinger_lower.is_some_and(|lower| latest.close < lower),
                    matches!((latest.macd, latest.macd_histogram), (Some(m), Some(h)) if m > 0.0 && h > 0.0),
                ),
            };
            let side = match direction {
                Direction::Sell => "overbought",
                Direction::Buy => "oversold",
            };
            if rsi_extreme {
                adjust(10.0, &format!("RSI {}", side));
            }
            if outside_band {
                adjust(10.0, &format!("Close outside Bollinger band, {}", side));
            }
            if macd_turned {
                adjust(10.0, "MACD confirms the turn");
            }
        }
        Some(PatternKind::Bilateral) | None => {}
    }

    if let Some(ratio) = volume_ratio(&bars.volumes) {
        if ratio > VOLUME_SURGE {
            adjust(10.0, "Increasing volume confirms pattern");
        } else {
            adjust(-5.0, "Volume not increasing");
        }
    }

    if detection.take_profit.is_some() {
        if let Some(entry) = detection.entry_price.to_f64() {
            let recent = &candles[candles.len().saturating_sub(FALSE_BREAKOUT_BARS)..];
            let recent_bars = Bars::from_candles(recent);
            let failed = match direction {
                Direction::Buy => {
                    recent_bars.highs.iter().any(|&h| h > entry) && latest.close < entry
                }
                Direction::Sell => {
                    recent_bars.lows.iter().any(|&l| l < entry) && latest.close > entry
                }
            };
            if failed {
                adjust(-20.0, "Possible false breakout detected");
            }
        }
    }

    Confirmation {
        base_confidence: base,
        confidence: confidence.clamp(0.0, 100.0),
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 16, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn candles(closes: &[f64], volumes: impl Fn(usize) -> f64) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let close = Decimal::from_f64(close).unwrap().round_dp(5);
                Candle {
                    timestamp: hour(i as i64),
                    open: close,
                    high: close + dec!(0.0005),
                    low: close - dec!(0.0005),
                    close,
                    volume: volumes(i),
                }
            })
            .collect()
    }

    fn detection(entry: Decimal, stop: Decimal, take_profit: Option<Decimal>) -> PatternDetection {
        PatternDetection {
            id: 1,
            pair_symbol: "EUR/USD".to_string(),
            pattern_name: "Flag".to_string(),
            timeframe: "1h".to_string(),
            entry_price: entry,
            stop_loss: stop,
            take_profit,
            confidence: 70.0,
            detected_at: hour(0),
        }
    }

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 1.0 + i as f64 * 0.001).collect()
    }

    #[test]
    fn test_no_history_leaves_confidence() {
        let d = detection(dec!(1.0850), dec!(1.0820), None);
        let confirmation = confirm(&d, Some(PatternKind::Continuation), &[]);
        assert_eq!(confirmation.confidence, 70.0);
        assert_eq!(confirmation.base_confidence, 70.0);
        assert_eq!(confirmation.reasons.len(), 1);
    }

    #[test]
    fn test_continuation_with_trend() {
        let history = candles(&rising(60), |_| 0.0);
        let buy = detection(dec!(1.0600), dec!(1.0550), None);
        let confirmation = confirm(&buy, Some(PatternKind::Continuation), &history);
        assert_eq!(confirmation.confidence, 80.0);

        let sell = detection(dec!(1.0600), dec!(1.0650), None);
        let confirmation = confirm(&sell, Some(PatternKind::Continuation), &history);
        assert_eq!(confirmation.confidence, 60.0);
    }

    #[test]
    fn test_reversal_after_exhausted_rally() {
        // A steady climb: RSI pinned at 100 and MACD positive, but the
        // close never leaves the band.
        let history = candles(&rising(60), |_| 0.0);
        let top = detection(dec!(1.0590), dec!(1.0640), None);
        let confirmation = confirm(&top, Some(PatternKind::Reversal), &history);
        assert_eq!(confirmation.confidence, 80.0);
        assert!(confirmation.reasons.iter().any(|r| r.contains("RSI")));

        let bottom = detection(dec!(1.0590), dec!(1.0540), None);
        let confirmation = confirm(&bottom, Some(PatternKind::Reversal), &history);
        assert_eq!(confirmation.confidence, 80.0);
        assert!(confirmation.reasons.iter().any(|r| r.contains("MACD")));
    }

    #[test]
    fn test_volume_adjustment() {
        let flat = vec![1.05; 30];
        let surge = candles(&flat, |i| if i >= 25 { 200.0 } else { 100.0 });
        let d = detection(dec!(1.0500), dec!(1.0450), None);
        assert_eq!(confirm(&d, Some(PatternKind::Bilateral), &surge).confidence, 80.0);

        let steady = candles(&flat, |_| 100.0);
        assert_eq!(confirm(&d, Some(PatternKind::Bilateral), &steady).confidence, 65.0);

        let none = candles(&flat, |_| 0.0);
        assert_eq!(confirm(&d, Some(PatternKind::Bilateral), &none).confidence, 70.0);
    }

    #[test]
    fn test_false_breakout_penalty() {
        // Last bar's high pierces the entry but the close falls back.
        let mut closes = vec![1.0500; 20];
        closes.push(1.0498);
        let history = candles(&closes, |_| 0.0);

        let with_target = detection(dec!(1.0502), dec!(1.0450), Some(dec!(1.0600)));
        let confirmation = confirm(&with_target, None, &history);
        assert_eq!(confirmation.confidence, 50.0);

        let without_target = detection(dec!(1.0502), dec!(1.0450), None);
        assert_eq!(confirm(&without_target, None, &history).confidence, 70.0);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let mut closes = vec![1.0500; 20];
        closes.push(1.0498);
        let history = candles(&closes, |_| 0.0);

        let mut d = detection(dec!(1.0502), dec!(1.0450), Some(dec!(1.0600)));
        d.confidence = 10.0;
        assert_eq!(confirm(&d, None, &history).confidence, 0.0);
    }
}
