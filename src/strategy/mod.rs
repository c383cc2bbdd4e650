// Trading strategy module
pub mod crossover;
pub mod momentum;
pub mod oscillator;
pub mod params;
pub mod vote;

pub use crossover::CrossoverStrategy;
pub use momentum::MomentumStrategy;
pub use oscillator::OscillatorStrategy;
pub use params::{ParameterAdjustment, StrategyParameters};
pub use vote::VoteStrategy;

use crate::execution::History;
use crate::models::{Position, Signal};
use serde::{Deserialize, Serialize};

/// Base trait for all trading strategies
///
/// `evaluate` is a pure function of the history, the optional open position
/// and the strategy's own parameters. Parameters only change through
/// `apply_adjustment`, which the owning tracker calls between cycles.
pub trait Strategy: Send + Sync {
    /// Decide on the next action. Never fails: a history shorter than the
    /// lookback yields a neutral signal.
    fn evaluate(&self, history: &History, position: Option<&Position>) -> Signal;

    /// Get strategy name
    fn name(&self) -> &str;

    fn params(&self) -> &StrategyParameters;

    fn params_mut(&mut self) -> &mut StrategyParameters;

    /// Samples needed before the strategy will signal
    fn lookback(&self) -> usize {
        self.params().lookback
    }

    /// Apply one feedback adjustment. Returns true if parameters changed.
    fn apply_adjustment(&mut self, adjustment: &ParameterAdjustment) -> bool {
        self.params_mut().apply(adjustment)
    }
}

/// True once an open position has hit its profit target, its stop loss or
/// its protective exit at `price`
pub fn exit_triggered(position: &Position, price: f64, params: &StrategyParameters) -> bool {
    let realized = position.return_at(price);

    realized >= params.profit_target
        || realized <= -params.stop_loss
        || price <= position.protective_exit
}

/// Sell-side evaluation shared by every variant
pub(crate) fn exit_signal(history: &History, position: &Position, params: &StrategyParameters) -> Signal {
    match history.last_close() {
        Some(price) if exit_triggered(position, price, params) => {
            tracing::debug!(
                asset = %position.asset,
                price = %price,
                entry = %position.entry_price,
                "Exit condition met"
            );
            Signal::sell()
        }
        _ => Signal::NEUTRAL,
    }
}

/// Weighted member of a vote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteMember {
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub strategy: StrategyConfig,
}

fn default_weight() -> f64 {
    1.0
}

/// Serializable description of a strategy, one variant per implementation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    Momentum {
        #[serde(default = "MomentumStrategy::default_params")]
        params: StrategyParameters,
    },
    Crossover {
        #[serde(default = "CrossoverStrategy::default_params")]
        params: StrategyParameters,
        #[serde(default = "CrossoverStrategy::default_short_period")]
        short_period: usize,
    },
    Oscillator {
        #[serde(default = "OscillatorStrategy::default_params")]
        params: StrategyParameters,
    },
    Vote {
        #[serde(default = "VoteStrategy::default_params")]
        params: StrategyParameters,
        members: Vec<VoteMember>,
    },
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::Momentum {
            params: MomentumStrategy::default_params(),
        }
    }
}

impl StrategyConfig {
    /// Default configuration for a strategy name as accepted on the CLI
    pub fn named(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "momentum" => Some(StrategyConfig::default()),
            "crossover" | "ma_crossover" => Some(StrategyConfig::Crossover {
                params: CrossoverStrategy::default_params(),
                short_period: CrossoverStrategy::default_short_period(),
            }),
            "oscillator" | "rsi" => Some(StrategyConfig::Oscillator {
                params: OscillatorStrategy::default_params(),
            }),
            "vote" | "voting" => Some(StrategyConfig::Vote {
                params: VoteStrategy::default_params(),
                members: ["crossover", "oscillator", "momentum"]
                    .iter()
                    .filter_map(|name| StrategyConfig::named(name))
                    .map(|strategy| VoteMember {
                        weight: 1.0,
                        strategy,
                    })
                    .collect(),
            }),
            _ => None,
        }
    }

    /// Fresh strategy instance; every tracker gets its own
    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyConfig::Momentum { params } => Box::new(MomentumStrategy::new(params.clone())),
            StrategyConfig::Crossover {
                params,
                short_period,
            } => Box::new(CrossoverStrategy::new(params.clone(), *short_period)),
            StrategyConfig::Oscillator { params } => {
                Box::new(OscillatorStrategy::new(params.clone()))
            }
            StrategyConfig::Vote { params, members } => Box::new(VoteStrategy::new(
                params.clone(),
                members
                    .iter()
                    .map(|m| (m.strategy.build(), m.weight))
                    .collect(),
            )),
        }
    }
}
