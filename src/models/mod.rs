use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a tradable asset (mint address, ticker, ...)
pub type AssetId = String;

/// One price/volume observation for an asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

impl PriceSample {
    /// Snapshot-style sample where only the last price is known
    pub fn flat(timestamp: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self {
            timestamp,
            close: price,
            high: price,
            low: price,
            volume,
        }
    }
}

/// Output of a strategy evaluation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signal {
    pub buy: bool,
    pub sell: bool,
}

/// What a tracker does with a signal once it is resolved against its state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub const NEUTRAL: Signal = Signal {
        buy: false,
        sell: false,
    };

    pub fn buy() -> Self {
        Self {
            buy: true,
            sell: false,
        }
    }

    pub fn sell() -> Self {
        Self {
            buy: false,
            sell: true,
        }
    }

    pub fn is_neutral(&self) -> bool {
        !self.buy && !self.sell
    }

    /// Resolve the signal for a tracker that does or does not hold a position.
    ///
    /// Sell wins while positioned; buy is ignored. Without a position there is
    /// nothing to sell, so only buy can act.
    pub fn resolve(&self, positioned: bool) -> SignalAction {
        match (positioned, self.buy, self.sell) {
            (true, _, true) => SignalAction::Sell,
            (false, true, _) => SignalAction::Buy,
            _ => SignalAction::Hold,
        }
    }
}

/// Open long exposure in one asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub id: Uuid,
    pub asset: AssetId,
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub protective_exit: f64,
}

impl Position {
    /// Fractional profit at `price` relative to entry (0.1 = +10%)
    pub fn return_at(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.quantity
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Executed order, appended to the asset's trade log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub id: Uuid,
    pub asset: AssetId,
    pub side: TradeSide,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
    pub order_id: Option<String>,
}

impl Trade {
    pub fn new(
        asset: impl Into<AssetId>,
        side: TradeSide,
        price: f64,
        quantity: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset: asset.into(),
            side,
            price,
            quantity,
            timestamp,
            order_id: None,
        }
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    /// Signed change in holdings this trade applies to the portfolio
    pub fn quantity_delta(&self) -> f64 {
        match self.side {
            TradeSide::Buy => self.quantity,
            TradeSide::Sell => -self.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_sell_wins_when_positioned() {
        let both = Signal {
            buy: true,
            sell: true,
        };
        assert_eq!(both.resolve(true), SignalAction::Sell);
        assert_eq!(both.resolve(false), SignalAction::Buy);
    }

    #[test]
    fn test_signal_ignores_irrelevant_side() {
        assert_eq!(Signal::buy().resolve(true), SignalAction::Hold);
        assert_eq!(Signal::sell().resolve(false), SignalAction::Hold);
        assert_eq!(Signal::NEUTRAL.resolve(false), SignalAction::Hold);
    }

    #[test]
    fn test_position_return() {
        let position = Position {
            id: Uuid::new_v4(),
            asset: "SOL".to_string(),
            entry_price: 100.0,
            quantity: 10.0,
            entry_time: Utc::now(),
            protective_exit: 92.0,
        };

        assert!((position.return_at(110.0) - 0.1).abs() < 1e-12);
        assert_eq!(position.unrealized_pnl(90.0), -100.0);
    }

    #[test]
    fn test_trade_quantity_delta() {
        let buy = Trade::new("SOL", TradeSide::Buy, 100.0, 2.0, Utc::now());
        let sell = Trade::new("SOL", TradeSide::Sell, 100.0, 2.0, Utc::now());
        assert_eq!(buy.quantity_delta(), 2.0);
        assert_eq!(sell.quantity_delta(), -2.0);
    }
}
