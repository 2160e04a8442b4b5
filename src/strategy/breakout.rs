//! Range breakout evaluator
//!
//! Fires when the latest closed candle carries enough volume and closes
//! outside the previous candle's high/low range.

use crate::types::Candle;

use super::Signal;

#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutParams {
    pub min_volume: f64,
}

impl BreakoutParams {
    pub fn evaluate(&self, closed: &[Candle]) -> Signal {
        let [.., prior, last] = closed else {
            return Signal::Neutral;
        };
        if last.volume <= self.min_volume {
            return Signal::Neutral;
        }
        if last.close > prior.high {
            Signal::Long
        } else if last.close < prior.low {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}
