use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::execution::MarketDataFeed;
use crate::models::PriceSample;
use crate::Result;

const DEXSCREENER_API_BASE: &str = "https://api.dexscreener.com/latest/dex";

type DexScreenerRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    /// Only pairs on this chain are considered
    pub chain_id: String,
    pub requests_per_minute: u32,
    pub request_timeout_secs: u64,
    /// Treat a pair with no trades in the last five minutes as having no new
    /// sample, so inactivity reflects the market rather than the feed
    pub require_recent_trades: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: DEXSCREENER_API_BASE.to_string(),
            chain_id: "solana".to_string(),
            requests_per_minute: 60,
            request_timeout_secs: 10,
            require_recent_trades: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DexScreenerResponse {
    #[serde(default)]
    pairs: Option<Vec<PairData>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairData {
    chain_id: String,
    base_token: TokenInfo,
    price_usd: Option<String>,
    #[serde(default)]
    volume: VolumeData,
    #[serde(default)]
    liquidity: Option<Liquidity>,
    #[serde(default)]
    txns: Option<TxnWindows>,
}

#[derive(Debug, Deserialize)]
struct TxnWindows {
    m5: Option<TxnCount>,
}

#[derive(Debug, Deserialize)]
struct TxnCount {
    #[serde(default)]
    buys: u64,
    #[serde(default)]
    sells: u64,
}

impl PairData {
    /// Trades in the last five minutes, when the pair reports them
    fn recent_trades(&self) -> Option<u64> {
        self.txns
            .as_ref()
            .and_then(|t| t.m5.as_ref())
            .map(|c| c.buys + c.sells)
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    symbol: String,
}

#[derive(Debug, Deserialize, Default)]
struct VolumeData {
    #[serde(default)]
    m5: f64,
}

#[derive(Debug, Deserialize, Default)]
struct Liquidity {
    #[serde(default)]
    usd: f64,
}

/// Market data from DexScreener's token endpoint
///
/// Quotes are snapshots, so each sample has high = low = close and the
/// pair's 5-minute volume. A sample is stamped with the fetch time and only
/// produced while the pair is trading.
#[derive(Clone)]
pub struct DexScreenerFeed {
    client: Client,
    config: FeedConfig,
    rate_limiter: Arc<DexScreenerRateLimiter>,
}

impl DexScreenerFeed {
    pub fn new(config: FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;

        let rpm = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Fetch and pick the deepest pair on the configured chain
    async fn fetch_sample(&self, token_address: &str) -> Result<Option<PriceSample>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/tokens/{}", self.config.base_url, token_address);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(format!("DexScreener API error: {}", response.status()).into());
        }

        let body: DexScreenerResponse = response.json().await?;

        let pair = body
            .pairs
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.chain_id == self.config.chain_id && p.price_usd.is_some())
            .max_by(|a, b| {
                let depth = |p: &PairData| p.liquidity.as_ref().map(|l| l.usd).unwrap_or(0.0);
                depth(a).total_cmp(&depth(b))
            });

        let Some(pair) = pair else {
            tracing::debug!(token = %token_address, chain = %self.config.chain_id, "No pair found");
            return Ok(None);
        };

        if self.config.require_recent_trades && pair.recent_trades() == Some(0) {
            tracing::debug!(token = %token_address, "No trades in the last 5 minutes");
            return Ok(None);
        }

        let price: f64 = pair.price_usd.as_deref().unwrap_or_default().parse()?;

        tracing::debug!(
            symbol = %pair.base_token.symbol,
            price = %price,
            volume_m5 = %pair.volume.m5,
            "Fetched DexScreener quote"
        );

        Ok(Some(PriceSample::flat(Utc::now(), price, pair.volume.m5)))
    }
}

#[async_trait]
impl MarketDataFeed for DexScreenerFeed {
    async fn pull(&self, asset: &str) -> Result<Option<PriceSample>> {
        self.fetch_sample(asset).await
    }

    fn name(&self) -> &str {
        "dexscreener"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINT: &str = "So11111111111111111111111111111111111111112";

    fn feed_for(server: &mockito::ServerGuard) -> DexScreenerFeed {
        DexScreenerFeed::new(FeedConfig {
            base_url: server.url(),
            requests_per_minute: 600,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_picks_deepest_pair_on_chain() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "pairs": [
                {
                    "chainId": "ethereum",
                    "baseToken": {"symbol": "WSOL"},
                    "priceUsd": "999.0",
                    "volume": {"m5": 1.0},
                    "liquidity": {"usd": 1.0e9}
                },
                {
                    "chainId": "solana",
                    "baseToken": {"symbol": "SOL"},
                    "priceUsd": "140.5",
                    "volume": {"m5": 1200.0},
                    "liquidity": {"usd": 5.0e6},
                    "txns": {"m5": {"buys": 14, "sells": 9}}
                },
                {
                    "chainId": "solana",
                    "baseToken": {"symbol": "SOL"},
                    "priceUsd": "141.0",
                    "volume": {"m5": 3.0},
                    "liquidity": {"usd": 100.0}
                }
            ]
        });
        let mock = server
            .mock("GET", format!("/tokens/{}", MINT).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let sample = feed_for(&server).pull(MINT).await.unwrap().unwrap();

        mock.assert_async().await;
        assert_eq!(sample.close, 140.5);
        assert_eq!(sample.high, 140.5);
        assert_eq!(sample.volume, 1200.0);
    }

    #[tokio::test]
    async fn test_pair_without_recent_trades_is_none() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "pairs": [{
                "chainId": "solana",
                "baseToken": {"symbol": "DUST"},
                "priceUsd": "0.0001",
                "volume": {"m5": 0.0},
                "liquidity": {"usd": 50.0},
                "txns": {"m5": {"buys": 0, "sells": 0}}
            }]
        });
        let _mock = server
            .mock("GET", format!("/tokens/{}", MINT).as_str())
            .with_status(200)
            .with_body(body.to_string())
            .expect(2)
            .create_async()
            .await;

        assert!(feed_for(&server).pull(MINT).await.unwrap().is_none());

        let lenient = DexScreenerFeed::new(FeedConfig {
            base_url: server.url(),
            requests_per_minute: 600,
            require_recent_trades: false,
            ..Default::default()
        })
        .unwrap();
        let sample = lenient.pull(MINT).await.unwrap().unwrap();
        assert_eq!(sample.close, 0.0001);
    }

    #[tokio::test]
    async fn test_unknown_token_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/tokens/unknown")
            .with_status(200)
            .with_body(r#"{"schemaVersion":"1.0.0","pairs":null}"#)
            .create_async()
            .await;

        assert!(feed_for(&server).pull("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", format!("/tokens/{}", MINT).as_str())
            .with_status(503)
            .create_async()
            .await;

        let err = feed_for(&server).pull(MINT).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    #[ignore] // Requires live API
    async fn test_pull_live() {
        let feed = DexScreenerFeed::new(FeedConfig::default()).unwrap();
        let sample = feed.pull(MINT).await.unwrap();
        assert!(sample.map(|s| s.close > 0.0).unwrap_or(false));
    }
}
