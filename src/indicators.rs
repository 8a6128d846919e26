//! Moving averages and RSI over closing-price series.
//!
//! All functions are pure: the same series always produces the same values.

use serde::{Deserialize, Serialize};

/// Moving average flavour used by crossover conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaKind {
    #[default]
    Sma,
    Ema,
}

/// Simple moving average. One value per index `i >= period - 1`.
pub fn sma(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }

    prices
        .windows(period)
        .map(|window| window.iter().sum::<f64>() / period as f64)
        .collect()
}

/// Exponential moving average seeded with the SMA of the first `period` prices.
pub fn ema(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = prices[..period].iter().sum::<f64>() / period as f64;

    let mut result = Vec::with_capacity(prices.len() - period + 1);
    result.push(seed);

    let mut prev = seed;
    for price in &prices[period..] {
        prev = price * k + prev * (1.0 - k);
        result.push(prev);
    }

    result
}

pub fn moving_average(prices: &[f64], period: usize, kind: MaKind) -> Vec<f64> {
    match kind {
        MaKind::Sma => sma(prices, period),
        MaKind::Ema => ema(prices, period),
    }
}

/// Relative Strength Index with Wilder smoothing.
///
/// Returns `default` when fewer than `period + 1` prices are available.
pub fn rsi(prices: &[f64], period: usize, default: f64) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return default;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let n = period as f64;

    let (gains, losses) = changes[..period]
        .iter()
        .fold((0.0, 0.0), |(g, l), &change| {
            if change >= 0.0 {
                (g + change, l)
            } else {
                (g, l - change)
            }
        });

    let mut avg_gain = gains / n;
    let mut avg_loss = losses / n;

    for &change in &changes[period..] {
        if change >= 0.0 {
            avg_gain = (avg_gain * (n - 1.0) + change) / n;
            avg_loss = (avg_loss * (n - 1.0)) / n;
        } else {
            avg_gain = (avg_gain * (n - 1.0)) / n;
            avg_loss = (avg_loss * (n - 1.0) - change) / n;
        }
    }

    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_sma_values_and_length() {
        let prices = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&prices, 3), vec![2.0, 3.0, 4.0]);
        assert_eq!(sma(&prices, 5), vec![3.0]);
        assert!(sma(&prices, 6).is_empty());
        assert!(sma(&prices, 0).is_empty());
    }

    #[test]
    fn test_ema_seed_and_smoothing() {
        let prices = [2.0, 4.0, 6.0, 8.0];
        // seed = mean(2, 4, 6) = 4, k = 0.5, next = 8 * 0.5 + 4 * 0.5 = 6
        let values = ema(&prices, 3);
        assert_eq!(values.len(), 2);
        assert!((values[0] - 4.0).abs() < EPS);
        assert!((values[1] - 6.0).abs() < EPS);
    }

    #[test]
    fn test_constant_series_averages_equal_price() {
        let prices = vec![42.5; 50];
        for period in [1, 2, 5, 14, 50] {
            for value in sma(&prices, period) {
                assert!((value - 42.5).abs() < EPS);
            }
            for value in ema(&prices, period) {
                assert!((value - 42.5).abs() < EPS);
            }
        }
    }

    #[test]
    fn test_rsi_default_when_short() {
        assert_eq!(rsi(&[1.0, 2.0, 3.0], 14, 50.0), 50.0);
    }

    #[test]
    fn test_rsi_increasing_series_is_100() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&prices, 14, 50.0), 100.0);
    }

    #[test]
    fn test_rsi_decreasing_series_tends_to_zero() {
        let short: Vec<f64> = (0..15).map(|i| 1000.0 - i as f64).collect();
        let long: Vec<f64> = (0..200).map(|i| 1000.0 - i as f64).collect();

        let short_rsi = rsi(&short, 14, 50.0);
        let long_rsi = rsi(&long, 14, 50.0);

        assert!(short_rsi < 1.0);
        assert!(long_rsi <= short_rsi);
        assert!(long_rsi < 1e-6);
    }

    #[test]
    fn test_rsi_mixed_series_is_deterministic() {
        let prices = [
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ];
        let first = rsi(&prices, 14, 50.0);
        let second = rsi(&prices, 14, 50.0);
        assert_eq!(first.to_bits(), second.to_bits());
        assert!(first > 0.0 && first < 100.0);
    }

    #[test]
    fn test_moving_average_dispatch() {
        let prices = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(moving_average(&prices, 2, MaKind::Sma), sma(&prices, 2));
        assert_eq!(moving_average(&prices, 2, MaKind::Ema), ema(&prices, 2));
    }
}
