// Per-asset lifecycle: data, decisions, orders and the ledger
pub mod dead_asset;
pub mod executor;
pub mod history;
pub mod portfolio;
pub mod price_feed;
pub mod retry;
pub mod tracker;

pub use dead_asset::{DeadAssetConfig, DeathCause};
pub use executor::{OrderExecutor, PaperExecutor, RetryingExecutor};
pub use history::History;
pub use portfolio::{Portfolio, PortfolioSnapshot, Reservation};
pub use price_feed::MarketDataFeed;
pub use retry::{with_retry, with_timeout, RetryConfig};
pub use tracker::{
    PositionTracker, Termination, TrackerConfig, TrackerContext, TrackerReport, TrackerState,
};
