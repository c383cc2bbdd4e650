use super::RiskParameters;

/// Stateless sizing and protective-exit calculator
///
/// Each call works on one snapshot of [`RiskParameters`]; a tracker builds a
/// fresh manager per cycle from the latest hot-reloaded parameters.
#[derive(Debug, Clone)]
pub struct RiskManager {
    params: RiskParameters,
}

impl RiskManager {
    pub fn new(params: RiskParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    /// Quantity to buy given capital and a volatility measure.
    ///
    /// Unknown (non-positive or non-finite) volatility, or a sizing result
    /// that is not a positive number, yields the floor quantity.
    pub fn size_position(&self, capital: f64, volatility: f64) -> f64 {
        let floor = self.params.min_quantity;

        if !volatility.is_finite() || volatility <= 0.0 {
            return floor;
        }

        let quantity = capital * self.params.risk_fraction / volatility;
        if quantity.is_finite() && quantity > 0.0 {
            quantity
        } else {
            floor
        }
    }

    /// Price at which an open position is abandoned
    pub fn protective_exit(&self, entry_price: f64, volatility: f64) -> f64 {
        let volatility = if volatility.is_finite() { volatility.max(0.0) } else { 0.0 };
        entry_price - volatility * self.params.exit_multiplier
    }

    /// Largest quantity whose cost stays within the per-entry cash cap
    pub fn affordable_quantity(&self, cash: f64, price: f64) -> f64 {
        if !(price.is_finite() && price > 0.0) || cash <= 0.0 {
            return 0.0;
        }
        cash * self.params.max_position_fraction / price
    }
}
