use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

use super::{EngineRecord, PersistenceSink};
use crate::Result;

/// Redis persistence for trades and valuation ticks
///
/// Uses sorted sets with millisecond timestamps as scores:
/// `trades:{asset}` for trades and `valuations` for portfolio ticks.
#[derive(Clone)]
pub struct RedisSink {
    conn: ConnectionManager,
}

impl RedisSink {
    /// Connect to Redis, giving up after 5 seconds
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    pub fn key_for(record: &EngineRecord) -> String {
        match record {
            EngineRecord::Trade(trade) => format!("trades:{}", trade.asset),
            EngineRecord::Valuation(_) => "valuations".to_string(),
        }
    }
}

#[async_trait]
impl PersistenceSink for RedisSink {
    async fn write(&self, record: &EngineRecord) -> Result<()> {
        let key = Self::key_for(record);
        let value = serde_json::to_string(record)?;
        let score = record.timestamp().timestamp_millis() as f64;

        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(&key, value, score).await?;

        tracing::debug!(key = %key, "Saved record to Redis");
        Ok(())
    }
}
