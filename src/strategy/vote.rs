use super::{exit_signal, ParameterAdjustment, Strategy, StrategyParameters};
use crate::execution::History;
use crate::models::{Position, Signal};

/// Weighted vote over several strategies
///
/// Buys when members holding strictly more than half of the total weight
/// vote buy. An even split is no signal. Exits are decided by the vote's own
/// profit target and stop loss, not by the members.
pub struct VoteStrategy {
    params: StrategyParameters,
    members: Vec<(Box<dyn Strategy>, f64)>,
}

impl VoteStrategy {
    pub fn new(params: StrategyParameters, members: Vec<(Box<dyn Strategy>, f64)>) -> Self {
        let members: Vec<_> = members
            .into_iter()
            .filter(|(_, weight)| weight.is_finite() && *weight > 0.0)
            .collect();

        let mut vote = Self { params, members };
        vote.sync_lookback();
        vote
    }

    pub fn default_params() -> StrategyParameters {
        StrategyParameters::default()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    fn sync_lookback(&mut self) {
        if let Some(longest) = self.members.iter().map(|(s, _)| s.lookback()).max() {
            self.params.lookback = longest;
        }
    }

    fn total_weight(&self) -> f64 {
        self.members.iter().map(|(_, w)| w).sum()
    }
}

impl Strategy for VoteStrategy {
    fn evaluate(&self, history: &History, position: Option<&Position>) -> Signal {
        if self.members.is_empty() || history.len() < self.lookback() {
            return Signal::NEUTRAL;
        }

        if let Some(position) = position {
            return exit_signal(history, position, &self.params);
        }

        let buy_weight: f64 = self
            .members
            .iter()
            .filter(|(strategy, _)| strategy.evaluate(history, None).buy)
            .map(|(_, weight)| weight)
            .sum();

        let total = self.total_weight();
        tracing::debug!(buy_weight = %buy_weight, total_weight = %total, "Vote");

        if buy_weight > total / 2.0 {
            Signal::buy()
        } else {
            Signal::NEUTRAL
        }
    }

    fn name(&self) -> &str {
        "VoteStrategy"
    }

    fn params(&self) -> &StrategyParameters {
        &self.params
    }

    fn params_mut(&mut self) -> &mut StrategyParameters {
        &mut self.params
    }

    fn apply_adjustment(&mut self, adjustment: &ParameterAdjustment) -> bool {
        let mut changed = self.params.apply(adjustment);
        for (member, _) in self.members.iter_mut() {
            changed |= member.apply_adjustment(adjustment);
        }
        self.sync_lookback();
        changed
    }
}
