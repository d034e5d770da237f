//! Swing points, trend lines and horizontal levels.

use serde::Serialize;

/// A least-squares line through swing points, price against seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    /// Swing points on the line
    pub points: usize,
    /// Points times the hours the line spans
    pub strength: f64,
}

impl TrendLine {
    pub fn value_at(&self, seconds: f64) -> f64 {
        self.slope * seconds + self.intercept
    }
}

/// A horizontal price level where highs or lows cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Level {
    pub price: f64,
    /// Prices in the cluster
    pub strength: usize,
    /// Bars that came within the threshold and closed on the level's side
    pub touches: usize,
}

/// Indices whose high is at least every high within `window` bars either side.
pub fn swing_highs(highs: &[f64], window: usize) -> Vec<usize> {
    extrema(highs, window, |candidate, other| candidate >= other)
}

/// Indices whose low is at most every low within `window` bars either side.
pub fn swing_lows(lows: &[f64], window: usize) -> Vec<usize> {
    extrema(lows, window, |candidate, other| candidate <= other)
}

fn extrema(values: &[f64], window: usize, keeps: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    let Some(last) = values.len().checked_sub(1) else {
        return Vec::new();
    };

    (0..values.len())
        .filter(|&i| {
            let from = i.saturating_sub(window);
            let to = (i + window).min(last);
            (from..=to).all(|j| keeps(values[i], values[j]))
        })
        .collect()
}

/// Trend lines through swing points, strongest first.
///
/// Each line starts from `min_points` consecutive unused swing points and
/// absorbs later points lying within `max_distance` (relative to price),
/// refitting as it grows. Points on a line are not reused.
pub fn trend_lines(
    swings: &[usize],
    times: &[f64],
    prices: &[f64],
    min_points: usize,
    max_distance: f64,
) -> Vec<TrendLine> {
    if min_points == 0 || swings.len() < min_points {
        return Vec::new();
    }

    let point = |k: usize| (times[swings[k]], prices[swings[k]]);
    let mut used = vec![false; swings.len()];
    let mut lines = Vec::new();

    for start in 0..=swings.len() - min_points {
        if used[start] {
            continue;
        }

        let mut members: Vec<usize> = (start..start + min_points).collect();
        let mut fit = fit_line(members.iter().map(|&k| point(k)));

        for candidate in start + min_points..swings.len() {
            if used[candidate] {
                continue;
            }
            let (x, y) = point(candidate);
            if y <= 0.0 {
                continue;
            }
            if ((y - (fit.0 * x + fit.1)) / y).abs() <= max_distance {
                members.push(candidate);
                fit = fit_line(members.iter().map(|&k| point(k)));
            }
        }

        for &k in &members {
            used[k] = true;
        }

        let (first, last) = members.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &k| {
            let x = point(k).0;
            (lo.min(x), hi.max(x))
        });
        lines.push(TrendLine {
            slope: fit.0,
            intercept: fit.1,
            points: members.len(),
            strength: members.len() as f64 * (last - first) / 3600.0,
        });
    }

    lines.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    lines
}

/// Ordinary least squares `(slope, intercept)`. Flat when every x is equal.
fn fit_line(points: impl Iterator<Item = (f64, f64)> + Clone) -> (f64, f64) {
    let n = points.clone().count() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let (sum_x, sum_y) = points.clone().fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    let (mean_x, mean_y) = (sum_x / n, sum_y / n);

    let (cov, var) = points.fold((0.0, 0.0), |(cov, var), (x, y)| {
        (cov + (x - mean_x) * (y - mean_y), var + (x - mean_x).powi(2))
    });

    if var == 0.0 {
        (0.0, mean_y)
    } else {
        let slope = cov / var;
        (slope, mean_y - slope * mean_x)
    }
}

/// Horizontal levels from price clusters, strongest first.
///
/// A price anchors a cluster when at least three prices in a `window`-bar
/// slice lie within `threshold` of it. Nearby clusters are merged into a
/// count-weighted mean.
pub fn horizontal_levels(prices: &[f64], window: usize, threshold: f64) -> Vec<(f64, usize)> {
    if window == 0 || prices.len() < window {
        return Vec::new();
    }

    let mut clusters: Vec<(f64, usize)> = Vec::new();
    for slice in prices.windows(window) {
        for &price in slice {
            if price <= 0.0 {
                continue;
            }
            let count = slice.iter().filter(|&&p| ((p - price) / price).abs() < threshold).count();
            if count >= 3 {
                merge_cluster(&mut clusters, price, count, threshold);
            }
        }
    }

    let mut levels: Vec<(f64, usize)> = Vec::new();
    for (price, count) in clusters {
        if !levels.iter().any(|&(level, _)| ((price - level) / level).abs() < threshold) {
            levels.push((price, count));
        }
    }
    levels.sort_by(|a, b| b.1.cmp(&a.1));
    levels
}

fn merge_cluster(clusters: &mut Vec<(f64, usize)>, price: f64, count: usize, threshold: f64) {
    let near = clusters
        .iter()
        .position(|&(existing, _)| ((price - existing) / existing).abs() < threshold);

    match near {
        Some(pos) => {
            let (existing, existing_count) = clusters.remove(pos);
            let total = existing_count + count;
            let merged = (existing * existing_count as f64 + price * count as f64) / total as f64;
            clusters.push((merged, total));
        }
        None => clusters.push((price, count)),
    }
}

/// Bars (after the first) whose low came within `threshold` of `level`
/// and closed above it.
pub fn support_touches(lows: &[f64], closes: &[f64], level: f64, threshold: f64) -> usize {
    (1..lows.len())
        .filter(|&i| lows[i] < level * (1.0 + threshold) && lows[i] > level * (1.0 - threshold) && closes[i] > level)
        .count()
}

/// Bars (after the first) whose high came within `threshold` of `level`
/// and closed below it.
pub fn resistance_touches(highs: &[f64], closes: &[f64], level: f64, threshold: f64) -> usize {
    (1..highs.len())
        .filter(|&i| highs[i] > level * (1.0 - threshold) && highs[i] < level * (1.0 + threshold) && closes[i] < level)
        .count()
}
