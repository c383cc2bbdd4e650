// Shared mocks for integration tests
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;
use tokio::time::Instant;

use tokentracker::execution::{
    DeadAssetConfig, MarketDataFeed, OrderExecutor, Portfolio, RetryConfig, RetryingExecutor,
    TrackerConfig, TrackerContext,
};
use tokentracker::notify::NotificationSink;
use tokentracker::performance::AdjustmentRules;
use tokentracker::persistence::{EngineRecord, PersistenceSink};
use tokentracker::risk::RiskParameters;
use tokentracker::telemetry::Telemetry;
use tokentracker::{PriceSample, Result, TradeSide};

pub const CAPITAL: f64 = 10_000.0;

/// One scripted answer of the feed
#[derive(Debug, Clone)]
pub enum Step {
    Sample { close: f64, volume: f64 },
    Nothing,
    Fail,
    /// Never answers
    Hang,
    Panic,
}

pub fn prices(closes: &[f64]) -> Vec<Step> {
    quiet(closes, 1_000.0)
}

pub fn quiet(closes: &[f64], volume: f64) -> Vec<Step> {
    closes
        .iter()
        .map(|&close| Step::Sample { close, volume })
        .collect()
}

/// What the feed does once an asset's script runs out
#[derive(Debug, Clone, Copy)]
pub enum Tail {
    RepeatLast,
    Silent,
}

struct Script {
    steps: VecDeque<Step>,
    tail: Tail,
    last: Option<Step>,
    tick: i64,
}

/// Feed answering from per-asset scripts with strictly increasing timestamps
pub struct ScriptedFeed {
    scripts: Mutex<HashMap<String, Script>>,
    default_tail: Tail,
    pulls: AtomicUsize,
    first_pull: Mutex<HashMap<String, Instant>>,
}

impl ScriptedFeed {
    pub fn new(default_tail: Tail) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_tail,
            pulls: AtomicUsize::new(0),
            first_pull: Mutex::new(HashMap::new()),
        }
    }

    pub fn script(self, asset: &str, steps: Vec<Step>, tail: Tail) -> Self {
        self.scripts.lock().unwrap().insert(
            asset.to_string(),
            Script {
                steps: steps.into(),
                tail,
                last: None,
                tick: 0,
            },
        );
        self
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn first_pull(&self, asset: &str) -> Option<Instant> {
        self.first_pull.lock().unwrap().get(asset).copied()
    }

    fn next_step(&self, asset: &str) -> (Step, DateTime<Utc>) {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.entry(asset.to_string()).or_insert_with(|| Script {
            steps: VecDeque::new(),
            tail: self.default_tail,
            last: None,
            tick: 0,
        });

        let step = match script.steps.pop_front() {
            Some(step) => {
                if matches!(step, Step::Sample { .. }) {
                    script.last = Some(step.clone());
                }
                step
            }
            None => match (script.tail, &script.last) {
                (Tail::RepeatLast, Some(last)) => last.clone(),
                _ => Step::Nothing,
            },
        };

        script.tick += 1;
        let timestamp = base_time() + chrono::Duration::minutes(script.tick);
        (step, timestamp)
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

#[async_trait]
impl MarketDataFeed for ScriptedFeed {
    async fn pull(&self, asset: &str) -> Result<Option<PriceSample>> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.first_pull
            .lock()
            .unwrap()
            .entry(asset.to_string())
            .or_insert_with(Instant::now);

        let (step, timestamp) = self.next_step(asset);
        match step {
            Step::Sample { close, volume } => Ok(Some(PriceSample::flat(timestamp, close, volume))),
            Step::Nothing => Ok(None),
            Step::Fail => Err("feed unavailable".into()),
            Step::Hang => {
                std::future::pending::<()>().await;
                Ok(None)
            }
            Step::Panic => panic!("scripted feed panic for {}", asset),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Venue {
    Fill,
    /// Fills after the given delay
    Delay(Duration),
    Reject,
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub asset: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub protective_exit: Option<f64>,
}

/// Executor recording every fill; its behaviour can be switched mid-test
pub struct MockVenue {
    mode: Mutex<Venue>,
    attempts: AtomicUsize,
    orders: Mutex<Vec<PlacedOrder>>,
}

impl MockVenue {
    pub fn new(mode: Venue) -> Self {
        Self {
            mode: Mutex::new(mode),
            attempts: AtomicUsize::new(0),
            orders: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: Venue) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn orders(&self) -> Vec<PlacedOrder> {
        self.orders.lock().unwrap().clone()
    }

    pub fn count(&self, side: TradeSide) -> usize {
        self.orders().iter().filter(|o| o.side == side).count()
    }
}

#[async_trait]
impl OrderExecutor for MockVenue {
    async fn place(
        &self,
        asset: &str,
        side: TradeSide,
        quantity: f64,
        protective_exit: Option<f64>,
    ) -> Result<String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        if let Venue::Delay(delay) = mode {
            tokio::time::sleep(delay).await;
        }
        match mode {
            Venue::Fill | Venue::Delay(_) => {
                let mut orders = self.orders.lock().unwrap();
                orders.push(PlacedOrder {
                    asset: asset.to_string(),
                    side,
                    quantity,
                    protective_exit,
                });
                Ok(format!("mock-{}", orders.len()))
            }
            Venue::Reject => Err("venue rejected order".into()),
            Venue::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err("venue never answered".into())
            }
        }
    }
}

/// In-memory sink for both records and notifications
#[derive(Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<EngineRecord>>,
    pub messages: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn valuations(&self) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches!(r, EngineRecord::Valuation(_)))
            .count()
    }

    pub fn trades(&self) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches!(r, EngineRecord::Trade(_)))
            .count()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn write(&self, record: &EngineRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn notify(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

pub fn quick_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_backoff_ms: 100,
        max_backoff_ms: 1_000,
        jitter_ms: 0,
    }
}

/// Everything a test needs to drive trackers against mocks
pub struct Harness {
    pub feed: Arc<ScriptedFeed>,
    pub venue: Arc<MockVenue>,
    pub portfolio: Arc<Portfolio>,
    pub risk_tx: watch::Sender<RiskParameters>,
    pub ctx: TrackerContext,
}

impl Harness {
    pub fn new(feed: ScriptedFeed, venue: MockVenue) -> Self {
        Self::with_telemetry(feed, venue, Telemetry::disabled())
    }

    pub fn with_telemetry(feed: ScriptedFeed, venue: MockVenue, telemetry: Telemetry) -> Self {
        let feed = Arc::new(feed);
        let venue = Arc::new(venue);
        let portfolio = Arc::new(Portfolio::new(CAPITAL));
        let (risk_tx, risk_rx) = watch::channel(RiskParameters::default());

        let tracker = TrackerConfig {
            poll_interval_secs: 60,
            tracking_budget_secs: 24 * 3600,
            feed_timeout_ms: 1_000,
            order_timeout_ms: 1_000,
            shutdown_deadline_secs: 30,
        };

        let ctx = TrackerContext {
            feed: feed.clone(),
            executor: Arc::new(RetryingExecutor::new(
                venue.clone(),
                quick_retry(),
                tracker.order_timeout(),
            )),
            portfolio: portfolio.clone(),
            risk: risk_rx,
            retry: quick_retry(),
            telemetry,
            tracker,
            dead_asset: DeadAssetConfig::default(),
            adjustments: AdjustmentRules::default(),
        };

        Self {
            feed,
            venue,
            portfolio,
            risk_tx,
            ctx,
        }
    }
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}
