//! Engine configuration.
//!
//! Layered as: built-in defaults, then an optional TOML file, then
//! `TOKENTRACKER_*` environment variables (`__` separates nested keys, e.g.
//! `TOKENTRACKER_TRACKER__POLL_INTERVAL_SECS=30`).

use std::path::Path;

use ::config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::api::FeedConfig;
use crate::error::EngineError;
use crate::execution::{DeadAssetConfig, RetryConfig, TrackerConfig};
use crate::models::AssetId;
use crate::orchestrator::{AssetSpec, OrchestratorConfig};
use crate::performance::AdjustmentRules;
use crate::risk::{RiskOverride, RiskParameters};
use crate::strategy::StrategyConfig;

pub const ENV_PREFIX: &str = "TOKENTRACKER";
pub const DEFAULT_CONFIG_PATH: &str = "tokentracker.toml";

/// Per-asset watch list entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetConfig {
    pub id: AssetId,
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub risk: Option<RiskOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Redis URL; records are only logged when unset
    pub redis_url: Option<String>,
    /// Queue length between trackers and the sink writers
    pub queue_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl NotificationConfig {
    pub fn telegram(&self) -> Option<(&str, &str)> {
        match (&self.telegram_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token.as_str(), chat.as_str()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub tracker: TrackerConfig,
    pub dead_asset: DeadAssetConfig,
    pub retry: RetryConfig,
    pub risk: RiskParameters,
    /// Strategy for assets that do not name their own
    pub strategy: StrategyConfig,
    pub adjustments: AdjustmentRules,
    pub orchestrator: OrchestratorConfig,
    pub assets: Vec<AssetConfig>,
    pub feed: FeedConfig,
    pub persistence: PersistenceConfig,
    pub notifications: NotificationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            tracker: TrackerConfig::default(),
            dead_asset: DeadAssetConfig::default(),
            retry: RetryConfig::default(),
            risk: RiskParameters::default(),
            strategy: StrategyConfig::default(),
            adjustments: AdjustmentRules::default(),
            orchestrator: OrchestratorConfig::default(),
            assets: Vec::new(),
            feed: FeedConfig::default(),
            persistence: PersistenceConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `path` (if present) and the environment, then validate.
    ///
    /// A missing file is only an error when `required` is set.
    pub fn load(path: impl AsRef<Path>, required: bool) -> Result<Self, EngineError> {
        let path = path.as_ref();

        let settings = Config::builder()
            .add_source(File::from(path).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;

        tracing::debug!(path = %path.display(), assets = config.assets.len(), "Configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let mut problems = self.risk.problems();

        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            problems.push(format!("initial_capital {} must be positive", self.initial_capital));
        }
        if self.tracker.poll_interval_secs == 0 {
            problems.push("tracker.poll_interval_secs must be at least 1".to_string());
        }
        if self.retry.max_attempts == 0 {
            problems.push("retry.max_attempts must be at least 1".to_string());
        }
        if self.orchestrator.max_concurrent_trackers == 0 {
            problems.push("orchestrator.max_concurrent_trackers must be at least 1".to_string());
        }
        for asset in &self.assets {
            if asset.id.trim().is_empty() {
                problems.push("assets entry with an empty id".to_string());
            }
            if let Some(over) = &asset.risk {
                for problem in over.apply(&self.risk).problems() {
                    problems.push(format!("assets.{}: {}", asset.id, problem));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Message(problems.join("; ")).into())
        }
    }

    /// Watch list from the file plus extra ids (e.g. from the CLI); duplicates
    /// keep the first entry
    pub fn asset_specs(&self, extra: &[AssetId]) -> Vec<AssetSpec> {
        let mut specs: Vec<AssetSpec> = Vec::new();

        let configured = self.assets.iter().map(|a| {
            let spec = AssetSpec::new(
                a.id.clone(),
                a.strategy.clone().unwrap_or_else(|| self.strategy.clone()),
            );
            match &a.risk {
                Some(risk) => spec.with_risk(risk.clone()),
                None => spec,
            }
        });
        let from_cli = extra
            .iter()
            .map(|id| AssetSpec::new(id.clone(), self.strategy.clone()));

        for spec in configured.chain(from_cli) {
            if !specs.iter().any(|s| s.asset == spec.asset) {
                specs.push(spec);
            }
        }

        specs
    }
}
