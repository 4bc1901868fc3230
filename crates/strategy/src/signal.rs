use thiserror::Error;

use common::{Account, Signal};

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("threshold {0} outside [0, 100]")]
    OutOfRange(f64),
    #[error("entry threshold {entry} must be below exit threshold {exit}")]
    Inverted { entry: f64, exit: f64 },
}

/// The last two RSI readings. `None` marks an undefined reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RsiReadings {
    pub previous: Option<f64>,
    pub current: Option<f64>,
}

impl RsiReadings {
    /// Start with a single reading already taken.
    pub fn primed(initial: Option<f64>) -> Self {
        Self {
            previous: None,
            current: initial,
        }
    }

    /// Shift `current` into `previous` and store the new reading.
    pub fn advance(&mut self, reading: Option<f64>) {
        self.previous = self.current;
        self.current = reading;
    }
}

/// Threshold-crossing rules for the buy/sell flip-flop.
///
/// While the account is buying, a BUY fires when RSI drops through `entry`.
/// While it is selling, a SELL fires when RSI climbs through `exit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalEvaluator {
    entry: f64,
    exit: f64,
}

impl Default for SignalEvaluator {
    fn default() -> Self {
        Self {
            entry: 38.0,
            exit: 78.0,
        }
    }
}

impl SignalEvaluator {
    pub fn new(entry: f64, exit: f64) -> Result<Self, ThresholdError> {
        for t in [entry, exit] {
            if !(0.0..=100.0).contains(&t) {
                return Err(ThresholdError::OutOfRange(t));
            }
        }
        if entry >= exit {
            return Err(ThresholdError::Inverted { entry, exit });
        }
        Ok(Self { entry, exit })
    }

    pub fn entry(&self) -> f64 {
        self.entry
    }

    pub fn exit(&self) -> f64 {
        self.exit
    }

    /// Evaluate one `(previous, current)` pair against the given mode.
    pub fn evaluate(&self, is_buying: bool, readings: &RsiReadings) -> Option<Signal> {
        let (previous, current) = match (readings.previous, readings.current) {
            (Some(p), Some(c)) if p.is_finite() && c.is_finite() => (p, c),
            _ => return None,
        };

        if is_buying {
            (current < self.entry && previous >= self.entry).then_some(Signal::Buy)
        } else {
            (current > self.exit && previous <= self.exit).then_some(Signal::Sell)
        }
    }

    pub fn evaluate_for(&self, account: &Account, readings: &RsiReadings) -> Option<Signal> {
        self.evaluate(account.is_buying, readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(previous: f64, current: f64) -> RsiReadings {
        RsiReadings {
            previous: Some(previous),
            current: Some(current),
        }
    }

    #[test]
    fn buy_on_downward_entry_crossing() {
        let ev = SignalEvaluator::default();
        assert_eq!(ev.evaluate(true, &pair(40.0, 37.0)), Some(Signal::Buy));
        // previous exactly on the line still counts
        assert_eq!(ev.evaluate(true, &pair(38.0, 37.9)), Some(Signal::Buy));
    }

    #[test]
    fn no_buy_without_crossing() {
        let ev = SignalEvaluator::default();
        assert_eq!(ev.evaluate(true, &pair(37.0, 30.0)), None);
        assert_eq!(ev.evaluate(true, &pair(50.0, 38.0)), None);
        assert_eq!(ev.evaluate(true, &pair(30.0, 40.0)), None);
    }

    #[test]
    fn sell_on_upward_exit_crossing() {
        let ev = SignalEvaluator::default();
        assert_eq!(ev.evaluate(false, &pair(70.0, 79.0)), Some(Signal::Sell));
        assert_eq!(ev.evaluate(false, &pair(78.0, 78.1)), Some(Signal::Sell));
        assert_eq!(ev.evaluate(false, &pair(79.0, 85.0)), None);
    }

    #[test]
    fn mode_gates_the_signal() {
        let ev = SignalEvaluator::default();
        assert_eq!(ev.evaluate(false, &pair(40.0, 37.0)), None);
        assert_eq!(ev.evaluate(true, &pair(70.0, 79.0)), None);
    }

    #[test]
    fn undefined_readings_never_signal() {
        let ev = SignalEvaluator::default();
        let r = RsiReadings { previous: None, current: Some(10.0) };
        assert_eq!(ev.evaluate(true, &r), None);
        let r = RsiReadings { previous: Some(50.0), current: None };
        assert_eq!(ev.evaluate(true, &r), None);
        assert_eq!(ev.evaluate(true, &pair(f64::NAN, 10.0)), None);
    }

    #[test]
    fn readings_advance_carries_current_forward() {
        let mut r = RsiReadings::primed(Some(50.0));
        r.advance(Some(30.0));
        assert_eq!(r, pair(50.0, 30.0));
        r.advance(None);
        assert_eq!(r.previous, Some(30.0));
        assert_eq!(r.current, None);
    }

    #[test]
    fn rejects_bad_thresholds() {
        assert_eq!(
            SignalEvaluator::new(80.0, 20.0),
            Err(ThresholdError::Inverted { entry: 80.0, exit: 20.0 })
        );
        assert_eq!(SignalEvaluator::new(-1.0, 50.0), Err(ThresholdError::OutOfRange(-1.0)));
        assert!(SignalEvaluator::new(30.0, 70.0).is_ok());
    }
}
