use super::{exit_signal, Strategy, StrategyParameters};
use crate::execution::History;
use crate::indicators::calculate_roc;
use crate::models::{Position, Signal};

/// Momentum threshold strategy
///
/// Buys when the rate of change across the lookback window (oldest close in
/// the window against the newest) exceeds `threshold` percent. Exits on the
/// shared profit target / stop loss rules.
#[derive(Debug, Clone)]
pub struct MomentumStrategy {
    params: StrategyParameters,
}

impl MomentumStrategy {
    pub fn new(params: StrategyParameters) -> Self {
        Self { params }
    }

    pub fn default_params() -> StrategyParameters {
        StrategyParameters::default()
    }

    /// ROC in percent across the most recent `lookback` samples
    fn window_roc(&self, history: &History) -> Option<f64> {
        let lookback = self.params.lookback;
        let window: Vec<f64> = history.recent(lookback).iter().map(|s| s.close).collect();
        calculate_roc(&window, lookback.saturating_sub(1))
    }
}

impl Default for MomentumStrategy {
    fn default() -> Self {
        Self::new(Self::default_params())
    }
}

impl Strategy for MomentumStrategy {
    fn evaluate(&self, history: &History, position: Option<&Position>) -> Signal {
        if history.len() < self.params.lookback {
            return Signal::NEUTRAL;
        }

        if let Some(position) = position {
            return exit_signal(history, position, &self.params);
        }

        match self.window_roc(history) {
            Some(roc) => {
                tracing::debug!(roc = %roc, threshold = %self.params.threshold, "Momentum");
                if roc > self.params.threshold {
                    Signal::buy()
                } else {
                    Signal::NEUTRAL
                }
            }
            None => Signal::NEUTRAL,
        }
    }

    fn name(&self) -> &str {
        "MomentumStrategy"
    }

    fn params(&self) -> &StrategyParameters {
        &self.params
    }

    fn params_mut(&mut self) -> &mut StrategyParameters {
        &mut self.params
    }
}
