use serde::{Deserialize, Serialize};

/// Smallest lookback any strategy accepts; a one-sample window has no change
pub const MIN_LOOKBACK: usize = 2;

/// Tunable parameters shared by every strategy variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyParameters {
    /// Samples the strategy needs before it will emit anything
    pub lookback: usize,
    /// Entry threshold; larger is always stricter
    pub threshold: f64,
    /// Take profit once the position is up this fraction (0.10 = +10%)
    pub profit_target: f64,
    /// Cut the position once it is down this fraction (0.08 = -8%)
    pub stop_loss: f64,
}

impl Default for StrategyParameters {
    fn default() -> Self {
        Self {
            lookback: 5,
            threshold: 5.0,
            profit_target: 0.10,
            stop_loss: 0.08,
        }
    }
}

/// One step of the performance feedback loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterAdjustment {
    /// Multiply the threshold by (1 + factor)
    RaiseThreshold { factor: f64 },
    /// Multiply the threshold by (1 - factor)
    LowerThreshold { factor: f64 },
    /// Shrink the lookback, never below `floor`
    ShortenLookback { by: usize, floor: usize },
    /// Multiply the stop loss by (1 - factor), never below `floor`
    TightenStopLoss { factor: f64, floor: f64 },
}

impl std::fmt::Display for ParameterAdjustment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterAdjustment::RaiseThreshold { factor } => {
                write!(f, "raise threshold by {:.0}%", factor * 100.0)
            }
            ParameterAdjustment::LowerThreshold { factor } => {
                write!(f, "lower threshold by {:.0}%", factor * 100.0)
            }
            ParameterAdjustment::ShortenLookback { by, floor } => {
                write!(f, "shorten lookback by {} (floor {})", by, floor)
            }
            ParameterAdjustment::TightenStopLoss { factor, floor } => {
                write!(
                    f,
                    "tighten stop loss by {:.0}% (floor {:.1}%)",
                    factor * 100.0,
                    floor * 100.0
                )
            }
        }
    }
}

impl StrategyParameters {
    /// Apply an adjustment in place. Returns true if anything changed.
    pub fn apply(&mut self, adjustment: &ParameterAdjustment) -> bool {
        let before = self.clone();

        match *adjustment {
            ParameterAdjustment::RaiseThreshold { factor } => {
                self.threshold *= 1.0 + factor.max(0.0);
            }
            ParameterAdjustment::LowerThreshold { factor } => {
                self.threshold *= 1.0 - factor.clamp(0.0, 1.0);
            }
            ParameterAdjustment::ShortenLookback { by, floor } => {
                let floor = floor.max(MIN_LOOKBACK);
                if self.lookback > floor {
                    self.lookback = self.lookback.saturating_sub(by).max(floor);
                }
            }
            ParameterAdjustment::TightenStopLoss { factor, floor } => {
                let tightened = self.stop_loss * (1.0 - factor.clamp(0.0, 1.0));
                if self.stop_loss > floor {
                    self.stop_loss = tightened.max(floor);
                }
            }
        }

        *self != before
    }
}
