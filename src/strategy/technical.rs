//! MACD crossover evaluator
//!
//! Classic fast/slow EMA spread with a signal-line EMA over the spread.
//! Long when the MACD line sits above its signal line on the latest closed
//! candle, short when below.

use crate::types::Candle;

use super::Signal;

#[derive(Debug, Clone, PartialEq)]
pub struct TechnicalParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_signal: usize,
}

impl TechnicalParams {
    pub fn evaluate(&self, closed: &[Candle]) -> Signal {
        // Need at least the slow period before the spread means anything
        if closed.len() < self.ema_slow.max(2) {
            return Signal::Neutral;
        }
        let closes: Vec<f64> = closed.iter().map(|c| c.close).collect();
        let fast = ema(&closes, self.ema_fast);
        let slow = ema(&closes, self.ema_slow);
        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal_line = ema(&macd, self.ema_signal);

        let (Some(last_macd), Some(last_signal)) = (macd.last(), signal_line.last()) else {
            return Signal::Neutral;
        };
        if last_macd > last_signal {
            Signal::Long
        } else if last_macd < last_signal {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}

/// Exponential moving average seeded from the first value,
/// `alpha = 2 / (period + 1)`
fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = None;
    for &value in values {
        let next = match prev {
            None => value,
            Some(prev) => alpha * value + (1.0 - alpha) * prev,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}
