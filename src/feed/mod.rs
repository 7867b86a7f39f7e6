// Market-data feed: REST history fetch, push subscriptions, shared state

pub mod candle_buffer;
pub mod price_state;
pub mod supervisor;
pub mod ws;

pub use candle_buffer::CandleBuffer;
pub use price_state::PriceState;
pub use supervisor::{StreamSupervisor, SupervisorHandle, KEEPALIVE_INTERVAL};
pub use ws::WsFeedFactory;

use crate::models::Candle;
use crate::Result;
use reqwest::Client;
use serde_json::Value;
use tokio::time::{sleep, Duration};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;

/// REST client for historical candles.
#[derive(Clone)]
pub struct FeedClient {
    client: Client,
    base_url: String,
}

impl FeedClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch up to `limit` candles for `symbol` at `interval`, oldest first.
    /// Includes retry logic with exponential backoff for transient failures.
    pub async fn fetch_history(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.fetch_once(symbol, interval, limit).await {
                Ok(candles) => {
                    if attempt > 1 {
                        tracing::info!(symbol, attempt, "history fetch succeeded after retry");
                    }
                    return Ok(candles);
                }
                Err(e) => {
                    last_error = Some(e);

                    if attempt < MAX_RETRIES {
                        let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                        tracing::warn!(
                            symbol,
                            attempt,
                            max_retries = MAX_RETRIES,
                            backoff_ms,
                            error = %last_error.as_ref().unwrap(),
                            "history fetch failed, retrying"
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| "all history fetch attempts failed".into()))
    }

    async fn fetch_once(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.base_url);

        let rows: Vec<Vec<Value>> = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("interval", interval),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            candles.push(parse_kline_row(&row)?);
        }
        Ok(candles)
    }
}

// Kline rows arrive as [openTime, open, high, low, close, volume, closeTime, ...]
// with prices encoded as strings.
fn parse_kline_row(row: &[Value]) -> Result<Candle> {
    if row.len() < 7 {
        return Err(format!("kline row too short: {} fields", row.len()).into());
    }

    let num = |v: &Value| -> Result<f64> {
        v.as_str()
            .ok_or("expected string-encoded price")?
            .parse::<f64>()
            .map_err(Into::into)
    };

    Ok(Candle::new(
        row[0].as_i64().ok_or("missing open time")?,
        row[6].as_i64().ok_or("missing close time")?,
        num(&row[1])?,
        num(&row[2])?,
        num(&row[3])?,
        num(&row[4])?,
    ))
}

/// Handler for the candle-close stream: parses kline events and appends
/// closed bars to the buffer. A rejected append (stale or duplicate bar)
/// reports delivery failure so the supervisor reconnects.
pub fn candle_handler(buffer: CandleBuffer) -> impl FnMut(&str) -> bool {
    move |raw: &str| match ws::parse_candle_close(raw) {
        Some(candle) => {
            let open_time = candle.open_time;
            let accepted = buffer.append(candle);
            if accepted {
                tracing::debug!(open_time, "candle appended");
            }
            accepted
        }
        // Open bars and subscription acks are expected traffic; anything
        // that is not even JSON gets logged before it is dropped
        None => {
            if serde_json::from_str::<Value>(raw).is_err() {
                tracing::warn!(payload = raw, "dropped unparseable candle message");
            }
            true
        }
    }
}

/// Handler for the price-tick stream: updates the shared live price.
pub fn tick_handler(price: PriceState) -> impl FnMut(&str) -> bool {
    move |raw: &str| {
        if let Some(last) = ws::parse_price_tick(raw) {
            price.set(last);
        }
        true
    }
}
