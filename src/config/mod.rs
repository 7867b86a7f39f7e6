use std::str::FromStr;
use std::time::Duration;

use crate::execution::CycleConfig;
use crate::indicators::IndicatorConfig;
use crate::models::Trader;

/// Immutable runtime configuration, loaded from the environment once at
/// startup. Every knob has a default so a bare `.env` still boots a
/// dry-run instance.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Market symbol in upper-case wire form, e.g. "SOLUSDC".
    pub symbol: String,
    /// Candle interval, e.g. "1h".
    pub interval: String,
    pub rest_url: String,
    pub ws_url: String,
    pub history_limit: u32,
    pub buffer_capacity: usize,
    pub trade_volume: f64,
    pub price_offset_pct: f64,
    pub cooldown_secs: u64,
    pub retry_secs: u64,
    pub rsi_period: usize,
    pub wma_period: usize,
    pub ema_period: usize,
    pub overbought: f64,
    pub oversold: f64,
    pub wma_buy_limit: f64,
    pub wma_sell_limit: f64,
    pub range_bound_mode: bool,
    pub traders: Vec<Trader>,
}

impl BotConfig {
    pub fn from_env() -> crate::Result<Self> {
        Ok(Self {
            symbol: env_or("SYMBOL", "SOLUSDC".to_string())?,
            interval: env_or("INTERVAL", "1h".to_string())?,
            rest_url: env_or("REST_URL", "https://api.binance.com".to_string())?,
            ws_url: env_or("WS_URL", "wss://stream.binance.com:9443/ws".to_string())?,
            history_limit: env_or("HISTORY_LIMIT", 200)?,
            buffer_capacity: env_or("BUFFER_CAPACITY", 200)?,
            trade_volume: env_or("TRADE_VOLUME", 100.0)?,
            price_offset_pct: env_or("PRICE_OFFSET_PCT", 0.001)?,
            cooldown_secs: env_or("COOLDOWN_SECS", 60)?,
            retry_secs: env_or("RETRY_SECS", 5)?,
            rsi_period: env_or("RSI_PERIOD", 14)?,
            wma_period: env_or("WMA_PERIOD", 45)?,
            ema_period: env_or("EMA_PERIOD", 9)?,
            overbought: env_or("RSI_OVERBOUGHT", 75.0)?,
            oversold: env_or("RSI_OVERSOLD", 25.0)?,
            wma_buy_limit: env_or("WMA_BUY_LIMIT", 40.0)?,
            wma_sell_limit: env_or("WMA_SELL_LIMIT", 60.0)?,
            range_bound_mode: env_or("RANGE_BOUND_MODE", false)?,
            traders: parse_traders(&env_or(
                "TRADERS",
                "trader-1:keys/trader-1.json".to_string(),
            )?)?,
        })
    }

    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            trade_volume: self.trade_volume,
            price_offset_pct: self.price_offset_pct,
            cooldown: Duration::from_secs(self.cooldown_secs),
            retry_interval: Duration::from_secs(self.retry_secs),
            overbought: self.overbought,
            oversold: self.oversold,
            wma_buy_limit: self.wma_buy_limit,
            wma_sell_limit: self.wma_sell_limit,
            range_bound_mode: self.range_bound_mode,
        }
    }

    pub fn indicator_config(&self) -> IndicatorConfig {
        IndicatorConfig {
            rsi_period: self.rsi_period,
            wma_period: self.wma_period,
            ema_period: self.ema_period,
        }
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
/// A set-but-malformed value is an error rather than a silent fallback.
fn env_or<T: FromStr>(key: &str, default: T) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| format!("invalid {}={:?}: {}", key, raw, e).into()),
        Err(_) => Ok(default),
    }
}

/// Trader list format: comma-separated `label:keypair_path` entries.
fn parse_traders(raw: &str) -> crate::Result<Vec<Trader>> {
    let mut traders = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (label, keypair_path) = entry
            .split_once(':')
            .ok_or_else(|| format!("invalid trader entry {:?}, expected label:path", entry))?;
        traders.push(Trader {
            label: label.to_string(),
            keypair_path: keypair_path.to_string(),
        });
    }
    if traders.is_empty() {
        return Err("TRADERS resolved to an empty list".into());
    }
    Ok(traders)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_traders() {
        let traders = parse_traders("alice:keys/a.json, bob:keys/b.json").unwrap();
        assert_eq!(traders.len(), 2);
        assert_eq!(traders[0].label, "alice");
        assert_eq!(traders[0].keypair_path, "keys/a.json");
        assert_eq!(traders[1].label, "bob");
    }

    #[test]
    fn test_parse_traders_rejects_malformed() {
        assert!(parse_traders("alice").is_err());
        assert!(parse_traders("").is_err());
    }

    #[test]
    fn test_env_or_default_when_unset() {
        let value: u32 = env_or("DEFINITELY_NOT_SET_FOR_THIS_TEST", 42).unwrap();
        assert_eq!(value, 42);
    }
}
