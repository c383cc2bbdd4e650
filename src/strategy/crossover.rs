use super::{exit_signal, Strategy, StrategyParameters};
use crate::execution::History;
use crate::indicators::calculate_sma;
use crate::models::{Position, Signal};

/// Moving average crossover
///
/// `lookback` is the long period. Buys when the short average sits more than
/// `threshold` percent above the long one.
#[derive(Debug, Clone)]
pub struct CrossoverStrategy {
    params: StrategyParameters,
    short_period: usize,
}

impl CrossoverStrategy {
    pub fn new(params: StrategyParameters, short_period: usize) -> Self {
        Self {
            params,
            short_period: short_period.max(1),
        }
    }

    pub fn default_params() -> StrategyParameters {
        StrategyParameters {
            lookback: 20,
            threshold: 0.5,
            ..Default::default()
        }
    }

    pub fn default_short_period() -> usize {
        5
    }

    /// Short period actually used; always below the long period
    pub fn short_period(&self) -> usize {
        self.short_period
            .min(self.params.lookback.saturating_sub(1))
            .max(1)
    }
}

impl Default for CrossoverStrategy {
    fn default() -> Self {
        Self::new(Self::default_params(), Self::default_short_period())
    }
}

impl Strategy for CrossoverStrategy {
    fn evaluate(&self, history: &History, position: Option<&Position>) -> Signal {
        if history.len() < self.params.lookback {
            return Signal::NEUTRAL;
        }

        if let Some(position) = position {
            return exit_signal(history, position, &self.params);
        }

        let closes = history.closes();
        let (short, long) = match (
            calculate_sma(&closes, self.short_period()),
            calculate_sma(&closes, self.params.lookback),
        ) {
            (Some(short), Some(long)) => (short, long),
            _ => return Signal::NEUTRAL,
        };

        tracing::debug!(short_ma = %short, long_ma = %long, "Crossover");

        if short > long * (1.0 + self.params.threshold / 100.0) {
            Signal::buy()
        } else {
            Signal::NEUTRAL
        }
    }

    fn name(&self) -> &str {
        "CrossoverStrategy"
    }

    fn params(&self) -> &StrategyParameters {
        &self.params
    }

    fn params_mut(&mut self) -> &mut StrategyParameters {
        &mut self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceSample;
    use crate::strategy::ParameterAdjustment;
    use chrono::{Duration, Utc};

    fn history_from(prices: &[f64]) -> History {
        let start = Utc::now() - Duration::minutes(prices.len() as i64);
        History::from_samples(
            prices
                .iter()
                .enumerate()
                .map(|(i, &p)| PriceSample::flat(start + Duration::minutes(i as i64), p, 1000.0)),
            100,
        )
    }

    #[test]
    fn test_uptrend_buys() {
        let strategy = CrossoverStrategy::default();
        let prices: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        assert_eq!(strategy.evaluate(&history_from(&prices), None), Signal::buy());
    }

    #[test]
    fn test_flat_market_holds() {
        let strategy = CrossoverStrategy::default();
        let history = history_from(&[100.0; 25]);
        assert!(strategy.evaluate(&history, None).is_neutral());
    }

    #[test]
    fn test_insufficient_history() {
        let strategy = CrossoverStrategy::default();
        let history = history_from(&[100.0; 19]);
        assert!(strategy.evaluate(&history, None).is_neutral());
    }

    #[test]
    fn test_short_period_stays_below_long() {
        let mut strategy = CrossoverStrategy::new(
            StrategyParameters {
                lookback: 6,
                ..CrossoverStrategy::default_params()
            },
            5,
        );
        assert_eq!(strategy.short_period(), 5);

        let shorten = ParameterAdjustment::ShortenLookback { by: 1, floor: 3 };
        assert!(strategy.apply_adjustment(&shorten));
        assert!(strategy.apply_adjustment(&shorten));
        assert_eq!(strategy.lookback(), 4);
        assert_eq!(strategy.short_period(), 3);
    }

    #[test]
    fn test_higher_threshold_is_stricter() {
        // Short SMA ~2.9% above the long one
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 * 0.4).collect();
        let history = history_from(&prices);

        let loose = CrossoverStrategy::default();
        assert_eq!(loose.evaluate(&history, None), Signal::buy());

        let strict = CrossoverStrategy::new(
            StrategyParameters {
                threshold: 5.0,
                ..CrossoverStrategy::default_params()
            },
            5,
        );
        assert!(strict.evaluate(&history, None).is_neutral());
    }
}
