pub mod indicators;
pub mod signal;

pub use indicators::RsiIndicator;
pub use signal::{RsiReadings, SignalEvaluator, ThresholdError};
