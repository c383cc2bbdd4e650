// Technical indicators used by the strategies and the risk manager

pub mod atr;

pub use atr::{calculate_atr, volatility_measure};

/// Simple Moving Average over the last `period` values
pub fn calculate_sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let sum: f64 = values.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Rate of change in percent between the last value and the one `period` steps back.
///
/// ROC = (V[last] - V[last - period]) / V[last - period] * 100, 0 when the
/// reference is zero.
pub fn calculate_roc(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() <= period {
        return None;
    }

    let current = values[values.len() - 1];
    let reference = values[values.len() - 1 - period];
    if reference == 0.0 {
        return Some(0.0);
    }
    Some((current - reference) / reference * 100.0)
}

/// Relative Strength Index over the last `period` changes.
///
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let changes = prices.windows(2).map(|w| w[1] - w[0]).rev().take(period);

    let (gain_sum, loss_sum) = changes.fold((0.0, 0.0), |(gain, loss), change| {
        if change > 0.0 {
            (gain + change, loss)
        } else {
            (gain, loss + change.abs())
        }
    });

    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;

    if avg_loss == 0.0 {
        // Flat window reads as neutral, all gains as fully overbought
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}
