// Realized performance and the parameter feedback loop
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{Trade, TradeSide};
use crate::strategy::ParameterAdjustment;

/// A buy and the sell that closed it
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrip {
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
}

impl RoundTrip {
    pub fn profit(&self) -> f64 {
        (self.exit_price - self.entry_price) * self.quantity
    }

    pub fn is_win(&self) -> bool {
        self.exit_price > self.entry_price
    }

    /// Fractional loss of the round trip, 0 for winners
    pub fn adverse_excursion(&self) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        ((self.entry_price - self.exit_price) / self.entry_price).max(0.0)
    }
}

/// Pair each sell with the buy opened before it. Unmatched trades are ignored.
pub fn round_trips(trades: &[Trade]) -> Vec<RoundTrip> {
    let mut trips = Vec::new();
    let mut open: Option<&Trade> = None;

    for trade in trades {
        match trade.side {
            TradeSide::Buy => open = Some(trade),
            TradeSide::Sell => {
                if let Some(entry) = open.take() {
                    trips.push(RoundTrip {
                        entry_price: entry.price,
                        exit_price: trade.price,
                        quantity: trade.quantity.min(entry.quantity),
                    });
                }
            }
        }
    }

    trips
}

/// Derived from the trade log; never the source of truth
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub round_trips: usize,
    /// Fraction of round trips closed above entry
    pub win_rate: f64,
    /// Sum of (sell - buy) * quantity
    pub realized_profit: f64,
    /// Round trips per hour of tracked time
    pub trade_frequency: f64,
    /// Largest fractional loss of any round trip
    pub max_adverse_excursion: f64,
}

pub fn compute_metrics(trades: &[Trade], tracked: Duration) -> PerformanceMetrics {
    let trips = round_trips(trades);
    if trips.is_empty() {
        return PerformanceMetrics::default();
    }

    let count = trips.len();
    let wins = trips.iter().filter(|t| t.is_win()).count();
    let hours = tracked.as_secs_f64() / 3600.0;

    PerformanceMetrics {
        round_trips: count,
        win_rate: wins as f64 / count as f64,
        realized_profit: trips.iter().map(RoundTrip::profit).sum(),
        trade_frequency: if hours > 0.0 { count as f64 / hours } else { 0.0 },
        max_adverse_excursion: trips
            .iter()
            .map(RoundTrip::adverse_excursion)
            .fold(0.0, f64::max),
    }
}

/// Rule table for [`suggest_adjustments`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdjustmentRules {
    /// Fractional threshold change applied by either threshold rule
    pub threshold_step: f64,
    pub min_win_rate: f64,
    /// Realized profit below this shortens the lookback
    pub profit_target: f64,
    pub min_lookback: usize,
    pub min_trades_per_hour: f64,
    pub max_adverse_excursion: f64,
    pub stop_loss_step: f64,
    pub min_stop_loss: f64,
}

impl Default for AdjustmentRules {
    fn default() -> Self {
        Self {
            threshold_step: 0.10,
            min_win_rate: 0.5,
            profit_target: 0.0,
            min_lookback: 3,
            min_trades_per_hour: 1.0 / 24.0, // one round trip a day
            max_adverse_excursion: 0.2,
            stop_loss_step: 0.2,
            min_stop_loss: 0.01,
        }
    }
}

/// Deterministic adjustments for the given metrics, in rule order
pub fn suggest_adjustments(
    metrics: &PerformanceMetrics,
    rules: &AdjustmentRules,
) -> Vec<ParameterAdjustment> {
    let mut adjustments = Vec::new();
    if metrics.round_trips == 0 {
        return adjustments;
    }

    if metrics.win_rate < rules.min_win_rate {
        adjustments.push(ParameterAdjustment::RaiseThreshold {
            factor: rules.threshold_step,
        });
    }

    if metrics.realized_profit < rules.profit_target {
        adjustments.push(ParameterAdjustment::ShortenLookback {
            by: 1,
            floor: rules.min_lookback,
        });
    }

    if metrics.win_rate >= rules.min_win_rate && metrics.trade_frequency < rules.min_trades_per_hour
    {
        adjustments.push(ParameterAdjustment::LowerThreshold {
            factor: rules.threshold_step,
        });
    }

    if metrics.max_adverse_excursion > rules.max_adverse_excursion {
        adjustments.push(ParameterAdjustment::TightenStopLoss {
            factor: rules.stop_loss_step,
            floor: rules.min_stop_loss,
        });
    }

    adjustments
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trade(side: TradeSide, price: f64, quantity: f64) -> Trade {
        Trade::new("TEST", side, price, quantity, Utc::now())
    }

    fn hours(h: u64) -> Duration {
        Duration::from_secs(h * 3600)
    }

    #[test]
    fn test_single_winning_round_trip() {
        let trades = vec![
            trade(TradeSide::Buy, 100.0, 3.0),
            trade(TradeSide::Sell, 110.0, 3.0),
        ];
        let metrics = compute_metrics(&trades, hours(2));

        assert_eq!(metrics.round_trips, 1);
        assert_eq!(metrics.win_rate, 1.0);
        assert!((metrics.realized_profit - 30.0).abs() < 1e-9);
        assert!((metrics.trade_frequency - 0.5).abs() < 1e-9);
        assert_eq!(metrics.max_adverse_excursion, 0.0);
    }

    #[test]
    fn test_mixed_round_trips() {
        let trades = vec![
            trade(TradeSide::Buy, 100.0, 1.0),
            trade(TradeSide::Sell, 70.0, 1.0),
            trade(TradeSide::Buy, 50.0, 2.0),
            trade(TradeSide::Sell, 55.0, 2.0),
        ];
        let metrics = compute_metrics(&trades, hours(1));

        assert_eq!(metrics.round_trips, 2);
        assert_eq!(metrics.win_rate, 0.5);
        assert!((metrics.realized_profit + 20.0).abs() < 1e-9);
        assert!((metrics.max_adverse_excursion - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_open_buy_is_not_a_round_trip() {
        let trades = vec![trade(TradeSide::Buy, 100.0, 1.0)];
        assert_eq!(compute_metrics(&trades, hours(1)), PerformanceMetrics::default());
    }

    #[test]
    fn test_no_round_trips_no_adjustments() {
        let rules = AdjustmentRules::default();
        assert!(suggest_adjustments(&PerformanceMetrics::default(), &rules).is_empty());
    }

    #[test]
    fn test_losing_record_tightens_everything() {
        let metrics = PerformanceMetrics {
            round_trips: 4,
            win_rate: 0.25,
            realized_profit: -50.0,
            trade_frequency: 2.0,
            max_adverse_excursion: 0.3,
        };
        let adjustments = suggest_adjustments(&metrics, &AdjustmentRules::default());

        assert_eq!(
            adjustments,
            vec![
                ParameterAdjustment::RaiseThreshold { factor: 0.10 },
                ParameterAdjustment::ShortenLookback { by: 1, floor: 3 },
                ParameterAdjustment::TightenStopLoss {
                    factor: 0.2,
                    floor: 0.01
                },
            ]
        );
    }

    #[test]
    fn test_profitable_but_rare_lowers_threshold() {
        let metrics = PerformanceMetrics {
            round_trips: 1,
            win_rate: 1.0,
            realized_profit: 10.0,
            trade_frequency: 0.01,
            max_adverse_excursion: 0.0,
        };
        let adjustments = suggest_adjustments(&metrics, &AdjustmentRules::default());
        assert_eq!(
            adjustments,
            vec![ParameterAdjustment::LowerThreshold { factor: 0.10 }]
        );
    }

    #[test]
    fn test_healthy_record_needs_nothing() {
        let metrics = PerformanceMetrics {
            round_trips: 5,
            win_rate: 0.8,
            realized_profit: 100.0,
            trade_frequency: 1.0,
            max_adverse_excursion: 0.05,
        };
        assert!(suggest_adjustments(&metrics, &AdjustmentRules::default()).is_empty());
    }
}
