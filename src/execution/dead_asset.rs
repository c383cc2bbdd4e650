use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::History;

/// Thresholds for deciding that an asset is no longer worth watching
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeadAssetConfig {
    /// Dead when no new sample arrives for longer than this
    pub inactivity_window_secs: u64,
    /// Trailing samples examined by the volume/stability rule
    pub window: usize,
    /// Mean volume over the window below this counts as illiquid
    pub volume_floor: f64,
    /// Absolute fractional price change over the window below this counts as flat
    pub price_stability: f64,
}

impl Default for DeadAssetConfig {
    fn default() -> Self {
        Self {
            inactivity_window_secs: 3600,
            window: 24,
            volume_floor: 10.0,
            price_stability: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    /// No new sample for longer than the inactivity window
    Inactive,
    /// Too little volume and too little price movement
    Stagnant,
}

impl std::fmt::Display for DeathCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeathCause::Inactive => write!(f, "inactive"),
            DeathCause::Stagnant => write!(f, "stagnant"),
        }
    }
}

impl DeadAssetConfig {
    pub fn inactivity_window(&self) -> Duration {
        Duration::from_secs(self.inactivity_window_secs)
    }

    /// Check both rules. `idle` is the time since the last new sample (or
    /// since the tracker started, if none has arrived yet).
    pub fn check(&self, idle: Duration, history: &History) -> Option<DeathCause> {
        if idle > self.inactivity_window() {
            return Some(DeathCause::Inactive);
        }
        if self.is_stagnant(history) {
            return Some(DeathCause::Stagnant);
        }
        None
    }

    /// Low volume AND stable price over the trailing window. Needs a full window.
    pub fn is_stagnant(&self, history: &History) -> bool {
        if self.window == 0 || history.len() < self.window {
            return false;
        }

        let window = history.recent(self.window);
        let mean_volume = window.iter().map(|s| s.volume).sum::<f64>() / window.len() as f64;

        let first = window[0].close;
        let last = window[window.len() - 1].close;
        let change = if first == 0.0 {
            if last == 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            ((last - first) / first).abs()
        };

        tracing::debug!(
            mean_volume = %mean_volume,
            price_change = %change,
            "Dead-asset window"
        );

        mean_volume < self.volume_floor && change < self.price_stability
    }
}
