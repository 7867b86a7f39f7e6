use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OHLC summary for one closed bar.
///
/// Times are epoch milliseconds as delivered by the feed. Price fields are
/// immutable once the candle enters the buffer; `rsi` is an optional
/// annotation attached later by the indicator engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
}

impl Candle {
    pub fn new(
        open_time: i64,
        close_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Self {
        Self {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            rsi: None,
        }
    }
}

/// Side of a resting limit order on the book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Bid,
    Ask,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Bid => write!(f, "bid"),
            OrderSide::Ask => write!(f, "ask"),
        }
    }
}

/// One order the cycle intends to place. Produced and consumed within a
/// single iteration, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
}

/// A resting order as reported back by the venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: u128,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
}

/// Receipt for a submitted placement or cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub client_id: Uuid,
    pub signature: String,
    pub timestamp: DateTime<Utc>,
}

impl OrderReceipt {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            client_id: Uuid::new_v4(),
            signature: signature.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Momentum snapshot derived from the candle buffer plus the live price.
///
/// `f64::NAN` is the explicit "insufficient history" sentinel and must
/// propagate so the cycle can skip a decision; it is never coerced to 0.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub wma: f64,
    pub ema: f64,
}

impl IndicatorSnapshot {
    pub fn empty() -> Self {
        Self {
            rsi: f64::NAN,
            wma: f64::NAN,
            ema: f64::NAN,
        }
    }

    /// True when every field carries a real value.
    pub fn is_complete(&self) -> bool {
        self.rsi.is_finite() && self.wma.is_finite() && self.ema.is_finite()
    }
}

/// Raw per-leg balances as the venue reports them, in human units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletBalances {
    pub native_gas: f64,
    pub base_wallet: f64,
    pub quote_wallet: f64,
    pub base_locked: f64,
    pub quote_locked: f64,
}

/// Balances normalized to a common quote-currency valuation at the mid price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub native_gas: f64,
    pub base_wallet: f64,
    pub quote_wallet: f64,
    pub base_locked: f64,
    pub quote_locked: f64,
    pub total_base_value: f64,
    pub total_quote_value: f64,
}

impl BalanceSnapshot {
    /// Value the base legs at `mid_price`; quote legs are already quote-term.
    pub fn from_raw(raw: &WalletBalances, mid_price: f64) -> Self {
        Self {
            native_gas: raw.native_gas,
            base_wallet: raw.base_wallet,
            quote_wallet: raw.quote_wallet,
            base_locked: raw.base_locked,
            quote_locked: raw.quote_locked,
            total_base_value: (raw.base_wallet + raw.base_locked) * mid_price,
            total_quote_value: raw.quote_wallet + raw.quote_locked,
        }
    }

    pub fn free_base(&self) -> f64 {
        self.base_wallet
    }

    pub fn free_quote(&self) -> f64 {
        self.quote_wallet
    }
}

/// One configured trader identity. Key material stays opaque to the core;
/// the venue adapter resolves `keypair_path`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trader {
    pub label: String,
    pub keypair_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_creation() {
        let candle = Candle::new(1000, 1999, 10.0, 12.0, 9.5, 11.0);

        assert_eq!(candle.open_time, 1000);
        assert_eq!(candle.close, 11.0);
        assert!(candle.rsi.is_none());
    }

    #[test]
    fn test_snapshot_sentinel() {
        let empty = IndicatorSnapshot::empty();
        assert!(!empty.is_complete());
        assert!(empty.rsi.is_nan());

        let partial = IndicatorSnapshot {
            rsi: 55.0,
            wma: f64::NAN,
            ema: 50.0,
        };
        assert!(!partial.is_complete());

        let full = IndicatorSnapshot {
            rsi: 55.0,
            wma: 48.0,
            ema: 50.0,
        };
        assert!(full.is_complete());
    }

    #[test]
    fn test_balance_normalization() {
        let raw = WalletBalances {
            native_gas: 1.5,
            base_wallet: 2.0,
            quote_wallet: 300.0,
            base_locked: 1.0,
            quote_locked: 50.0,
        };

        let snapshot = BalanceSnapshot::from_raw(&raw, 100.0);
        assert_eq!(snapshot.total_base_value, 300.0);
        assert_eq!(snapshot.total_quote_value, 350.0);
        assert_eq!(snapshot.free_base(), 2.0);
        assert_eq!(snapshot.free_quote(), 300.0);
    }
}
