use super::{exit_signal, Strategy, StrategyParameters};
use crate::execution::History;
use crate::indicators::calculate_rsi;
use crate::models::{Position, Signal};

/// RSI oversold entry
///
/// The RSI period is `lookback - 1`. `threshold` is the distance below the
/// midline (50) that counts as oversold: 20 buys under RSI 30.
#[derive(Debug, Clone)]
pub struct OscillatorStrategy {
    params: StrategyParameters,
}

impl OscillatorStrategy {
    pub fn new(params: StrategyParameters) -> Self {
        Self { params }
    }

    pub fn default_params() -> StrategyParameters {
        StrategyParameters {
            lookback: 15,
            threshold: 20.0,
            ..Default::default()
        }
    }

    pub fn oversold_level(&self) -> f64 {
        50.0 - self.params.threshold
    }
}

impl Default for OscillatorStrategy {
    fn default() -> Self {
        Self::new(Self::default_params())
    }
}

impl Strategy for OscillatorStrategy {
    fn evaluate(&self, history: &History, position: Option<&Position>) -> Signal {
        if history.len() < self.params.lookback {
            return Signal::NEUTRAL;
        }

        if let Some(position) = position {
            return exit_signal(history, position, &self.params);
        }

        let period = self.params.lookback.saturating_sub(1);
        match calculate_rsi(&history.closes(), period) {
            Some(rsi) => {
                tracing::debug!(rsi = %rsi, oversold = %self.oversold_level(), "Oscillator");
                if rsi < self.oversold_level() {
                    Signal::buy()
                } else {
                    Signal::NEUTRAL
                }
            }
            None => Signal::NEUTRAL,
        }
    }

    fn name(&self) -> &str {
        "OscillatorStrategy"
    }

    fn params(&self) -> &StrategyParameters {
        &self.params
    }

    fn params_mut(&mut self) -> &mut StrategyParameters {
        &mut self.params
    }
}
