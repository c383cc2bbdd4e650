pub mod dexscreener;

pub use dexscreener::{DexScreenerFeed, FeedConfig};
