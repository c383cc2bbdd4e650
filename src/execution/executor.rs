use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::retry::{with_retry, RetryConfig};
use crate::error::EngineError;
use crate::models::TradeSide;
use crate::Result;

/// Places orders with a venue; returns an opaque order id
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn place(
        &self,
        asset: &str,
        side: TradeSide,
        quantity: f64,
        protective_exit: Option<f64>,
    ) -> Result<String>;
}

/// Paper trading executor: every order fills immediately
#[derive(Debug, Default)]
pub struct PaperExecutor {
    placed: AtomicU64,
}

impl PaperExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders_placed(&self) -> u64 {
        self.placed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn place(
        &self,
        asset: &str,
        side: TradeSide,
        quantity: f64,
        protective_exit: Option<f64>,
    ) -> Result<String> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(format!("invalid order quantity {}", quantity).into());
        }

        self.placed.fetch_add(1, Ordering::Relaxed);
        let order_id = format!("paper-{}", Uuid::new_v4());

        tracing::info!(
            asset = %asset,
            side = %side,
            quantity = %quantity,
            protective_exit = ?protective_exit,
            order_id = %order_id,
            "📝 Paper order filled"
        );

        Ok(order_id)
    }
}

/// Wraps an executor with per-attempt timeouts and bounded retries
pub struct RetryingExecutor {
    inner: Arc<dyn OrderExecutor>,
    policy: RetryConfig,
    timeout: Duration,
}

impl RetryingExecutor {
    pub fn new(inner: Arc<dyn OrderExecutor>, policy: RetryConfig, timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            timeout,
        }
    }

    /// Place an order; exhaustion is reported, never panics or aborts
    pub async fn place(
        &self,
        asset: &str,
        side: TradeSide,
        quantity: f64,
        protective_exit: Option<f64>,
    ) -> std::result::Result<String, EngineError> {
        let inner = &self.inner;
        with_retry(&self.policy, "place_order", self.timeout, move || {
            inner.place(asset, side, quantity, protective_exit)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct Flaky {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl OrderExecutor for Flaky {
        async fn place(
            &self,
            _asset: &str,
            _side: TradeSide,
            _quantity: f64,
            _protective_exit: Option<f64>,
        ) -> Result<String> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err("venue busy".into());
            }
            Ok("order-1".to_string())
        }
    }

    fn policy() -> RetryConfig {
        RetryConfig {
            jitter_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_paper_executor_fills() {
        let executor = PaperExecutor::new();
        let id = executor
            .place("SOL", TradeSide::Buy, 1.5, Some(95.0))
            .await
            .unwrap();

        assert!(id.starts_with("paper-"));
        assert_eq!(executor.orders_placed(), 1);
    }

    #[tokio::test]
    async fn test_paper_executor_rejects_bad_quantity() {
        let executor = PaperExecutor::new();
        assert!(executor.place("SOL", TradeSide::Buy, 0.0, None).await.is_err());
        assert_eq!(executor.orders_placed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_executor_recovers() {
        let flaky = Arc::new(Flaky {
            failures_left: AtomicU32::new(2),
        });
        let executor = RetryingExecutor::new(flaky, policy(), Duration::from_secs(5));

        let id = executor.place("SOL", TradeSide::Sell, 1.0, None).await;
        assert_eq!(id.unwrap(), "order-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_executor_exhausts() {
        let flaky = Arc::new(Flaky {
            failures_left: AtomicU32::new(10),
        });
        let executor = RetryingExecutor::new(flaky, policy(), Duration::from_secs(5));

        let err = executor
            .place("SOL", TradeSide::Buy, 1.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RetriesExhausted { attempts: 3, .. }));
    }
}
