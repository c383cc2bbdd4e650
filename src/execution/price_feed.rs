use async_trait::async_trait;

use crate::models::PriceSample;
use crate::Result;

/// Source of price observations for the trackers
///
/// `Ok(None)` means the source had nothing for the asset this time (unknown
/// pair, no quote yet). It is not an error and is not retried.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    async fn pull(&self, asset: &str) -> Result<Option<PriceSample>>;

    /// Name for logs
    fn name(&self) -> &str {
        "feed"
    }
}
