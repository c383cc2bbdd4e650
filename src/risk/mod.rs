// Risk management module
pub mod manager;

pub use manager::RiskManager;

use serde::{Deserialize, Serialize};

/// Process-wide sizing and protection policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskParameters {
    pub risk_fraction: f64,
    pub exit_multiplier: f64,
    pub min_quantity: f64,
    pub max_position_fraction: f64,
    pub volatility_period: usize,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            risk_fraction: 0.01,        // 1% of capital at risk per entry
            exit_multiplier: 2.0,       // protective exit at 2x volatility
            min_quantity: 0.01,         // floor when volatility is unknown
            max_position_fraction: 0.25, // at most 25% of cash per entry
            volatility_period: 14,
        }
    }
}

/// Per-asset override; unset fields fall back to the process-wide value
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RiskOverride {
    pub risk_fraction: Option<f64>,
    pub exit_multiplier: Option<f64>,
    pub min_quantity: Option<f64>,
    pub max_position_fraction: Option<f64>,
    pub volatility_period: Option<usize>,
}

impl RiskOverride {
    pub fn apply(&self, base: &RiskParameters) -> RiskParameters {
        RiskParameters {
            risk_fraction: self.risk_fraction.unwrap_or(base.risk_fraction),
            exit_multiplier: self.exit_multiplier.unwrap_or(base.exit_multiplier),
            min_quantity: self.min_quantity.unwrap_or(base.min_quantity),
            max_position_fraction: self
                .max_position_fraction
                .unwrap_or(base.max_position_fraction),
            volatility_period: self.volatility_period.unwrap_or(base.volatility_period),
        }
    }
}

impl RiskParameters {
    /// Human-readable reasons the parameters are unusable; empty when valid
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !(self.risk_fraction > 0.0 && self.risk_fraction <= 1.0) {
            problems.push(format!("risk_fraction {} not in (0, 1]", self.risk_fraction));
        }
        if !(self.exit_multiplier.is_finite() && self.exit_multiplier >= 0.0) {
            problems.push(format!("exit_multiplier {} is negative", self.exit_multiplier));
        }
        if !(self.min_quantity.is_finite() && self.min_quantity > 0.0) {
            problems.push(format!("min_quantity {} must be positive", self.min_quantity));
        }
        if !(self.max_position_fraction > 0.0 && self.max_position_fraction <= 1.0) {
            problems.push(format!(
                "max_position_fraction {} not in (0, 1]",
                self.max_position_fraction
            ));
        }
        if self.volatility_period == 0 {
            problems.push("volatility_period must be at least 1".to_string());
        }
        problems
    }
}
