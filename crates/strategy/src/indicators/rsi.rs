use common::Kline;

/// Relative Strength Index over candle closes, smoothed the Wilder way.
///
/// The first `period` price changes seed plain averages of gains and losses;
/// every later change folds in as `avg = (avg * (period - 1) + x) / period`.
/// A reading needs `period + 1` closes.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    period: usize,
}

impl Default for RsiIndicator {
    fn default() -> Self {
        Self::new(14)
    }
}

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "RSI needs a period of at least 2, got {period}");
        Self { period }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn min_samples(&self) -> usize {
        self.period + 1
    }

    /// RSI as of the most recent candle.
    pub fn compute_klines(&self, klines: &[Kline]) -> Option<f64> {
        let closes: Vec<f64> = klines.iter().map(|k| k.close).collect();
        self.compute(&closes)
    }

    /// RSI of `closes` (oldest first). `None` on a short series, a non-finite
    /// close, or a window with no movement at all.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.min_samples() || !closes.iter().all(|c| c.is_finite()) {
            return None;
        }

        let mut moves = closes.windows(2).map(|pair| split_move(pair[1] - pair[0]));
        let n = self.period as f64;

        let (mut up, mut down) = moves
            .by_ref()
            .take(self.period)
            .fold((0.0, 0.0), |(g, l), (gain, loss)| (g + gain, l + loss));
        up /= n;
        down /= n;

        for (gain, loss) in moves {
            up = (up * (n - 1.0) + gain) / n;
            down = (down * (n - 1.0) + loss) / n;
        }

        match (up == 0.0, down == 0.0) {
            (true, true) => None,
            (_, true) => Some(100.0),
            _ => Some(100.0 - 100.0 / (1.0 + up / down)),
        }
    }
}

/// A price change as a (gain, loss) pair, both non-negative.
fn split_move(delta: f64) -> (f64, f64) {
    if delta > 0.0 {
        (delta, 0.0)
    } else {
        (0.0, -delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_series_has_no_reading() {
        let rsi = RsiIndicator::new(14);
        let closes: Vec<f64> = (0..14).map(|i| 200.0 - i as f64).collect();
        assert_eq!(rsi.compute(&closes), None);
        assert_eq!(rsi.compute(&[]), None);
    }

    #[test]
    fn exactly_period_plus_one_closes_is_enough() {
        let rsi = RsiIndicator::default();
        let closes: Vec<f64> = (0..15).map(|i| 50.0 + (i % 3) as f64).collect();
        assert!(rsi.compute(&closes).is_some());
    }

    #[test]
    fn monotonic_series_hit_the_bounds() {
        let rsi = RsiIndicator::new(3);
        assert_eq!(rsi.compute(&[1.0, 2.0, 3.0, 4.0, 5.0]), Some(100.0));
        let down = rsi.compute(&[5.0, 4.0, 3.0, 2.0, 1.0]).unwrap();
        assert!(down.abs() < 1e-9, "got {down}");
    }

    #[test]
    fn flat_window_is_undefined() {
        assert_eq!(RsiIndicator::default().compute(&[30_000.0; 20]), None);
    }

    #[test]
    fn non_finite_close_is_undefined() {
        let rsi = RsiIndicator::new(3);
        assert_eq!(rsi.compute(&[1.0, 2.0, f64::INFINITY, 3.0, 4.0]), None);
        assert_eq!(rsi.compute(&[1.0, 2.0, f64::NAN, 3.0, 4.0]), None);
    }

    #[test]
    fn smoothing_matches_hand_computation() {
        // Seed over +1 -1 +2: up 1.0, down 1/3.
        // Fold +1: up (2 + 1)/3 = 1.0, down (2/3)/3 = 2/9. RS 4.5.
        let rsi = RsiIndicator::new(3);
        let value = rsi.compute(&[10.0, 11.0, 10.0, 12.0, 13.0]).unwrap();
        let expected = 100.0 - 100.0 / 5.5;
        assert!((value - expected).abs() < 1e-9, "expected {expected}, got {value}");
    }

    #[test]
    fn reads_closes_from_klines() {
        let klines: Vec<Kline> = [10.0, 11.0, 10.0, 12.0, 13.0]
            .iter()
            .enumerate()
            .map(|(i, &close)| Kline {
                open_time: chrono::DateTime::from_timestamp(i as i64 * 60, 0).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect();
        let rsi = RsiIndicator::new(3);
        assert_eq!(rsi.compute_klines(&klines), rsi.compute(&[10.0, 11.0, 10.0, 12.0, 13.0]));
    }
}
