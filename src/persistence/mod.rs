// Write-only record sinks
pub mod redis_store;

pub use redis_store::RedisSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Trade;
use crate::Result;

/// Periodic portfolio valuation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValuationTick {
    pub timestamp: DateTime<Utc>,
    pub cash: f64,
    pub equity: f64,
    pub open_positions: usize,
}

/// Everything the engine hands to persistence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineRecord {
    Trade(Trade),
    Valuation(ValuationTick),
}

impl EngineRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EngineRecord::Trade(trade) => trade.timestamp,
            EngineRecord::Valuation(tick) => tick.timestamp,
        }
    }
}

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn write(&self, record: &EngineRecord) -> Result<()>;
}

/// Default sink: records go to the log only
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

#[async_trait]
impl PersistenceSink for TracingSink {
    async fn write(&self, record: &EngineRecord) -> Result<()> {
        match record {
            EngineRecord::Trade(trade) => tracing::info!(
                asset = %trade.asset,
                side = %trade.side,
                price = %trade.price,
                quantity = %trade.quantity,
                "Trade recorded"
            ),
            EngineRecord::Valuation(tick) => tracing::info!(
                cash = %format!("{:.2}", tick.cash),
                equity = %format!("{:.2}", tick.equity),
                open_positions = tick.open_positions,
                "Portfolio valuation"
            ),
        }
        Ok(())
    }
}
