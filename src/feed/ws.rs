use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::supervisor::{StreamEvent, Subscription, SubscriptionFactory};
use crate::models::Candle;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens a websocket subscription to the feed for one stream parameter
/// (kline channel or ticker channel).
pub struct WsFeedFactory {
    ws_url: String,
    params: Vec<String>,
}

impl WsFeedFactory {
    /// Closed-candle subscription for `symbol` at `interval`.
    pub fn klines(ws_url: impl Into<String>, symbol: &str, interval: &str) -> Self {
        Self {
            ws_url: ws_url.into(),
            params: vec![format!("{}@kline_{}", symbol.to_lowercase(), interval)],
        }
    }

    /// Live price-tick subscription for `symbol`.
    pub fn ticker(ws_url: impl Into<String>, symbol: &str) -> Self {
        Self {
            ws_url: ws_url.into(),
            params: vec![format!("{}@miniTicker", symbol.to_lowercase())],
        }
    }
}

#[async_trait]
impl SubscriptionFactory for WsFeedFactory {
    async fn connect(&self) -> crate::Result<Box<dyn Subscription>> {
        let (ws_stream, _) = connect_async(&self.ws_url).await?;
        let (mut write, read) = ws_stream.split();

        let subscribe_msg = serde_json::json!({
            "method": "SUBSCRIBE",
            "params": self.params,
            "id": 1,
        });
        write.send(Message::Text(subscribe_msg.to_string())).await?;

        Ok(Box::new(WsSubscription { write, read }))
    }
}

struct WsSubscription {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

#[async_trait]
impl Subscription for WsSubscription {
    async fn next_event(&mut self) -> Option<crate::Result<StreamEvent>> {
        loop {
            let msg = match self.read.next().await? {
                Ok(msg) => msg,
                Err(err) => return Some(Err(err.into())),
            };

            match msg {
                Message::Text(txt) => return Some(Ok(StreamEvent::Message(txt))),
                Message::Binary(bin) => {
                    if let Ok(txt) = String::from_utf8(bin) {
                        return Some(Ok(StreamEvent::Message(txt)));
                    }
                }
                Message::Ping(payload) => return Some(Ok(StreamEvent::Ping(payload))),
                Message::Close(frame) => {
                    tracing::warn!(?frame, "feed websocket closed");
                    return Some(Ok(StreamEvent::Closed));
                }
                Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn send_ping(&mut self) -> crate::Result<()> {
        self.write.send(Message::Ping(Vec::new())).await?;
        Ok(())
    }

    async fn send_pong(&mut self, payload: Vec<u8>) -> crate::Result<()> {
        self.write.send(Message::Pong(payload)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.write.send(Message::Close(None)).await;
    }
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "k")]
    kline: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

#[derive(Debug, Deserialize)]
struct MiniTickerEvent {
    #[serde(rename = "c")]
    close: String,
}

/// Parse a kline push event into a closed candle.
///
/// Returns `None` both for non-kline payloads (subscription acks and the
/// like) and for bars that are still open; neither is a feed fault.
pub fn parse_candle_close(raw: &str) -> Option<Candle> {
    let event: KlineEvent = serde_json::from_str(raw).ok()?;
    let k = event.kline;
    if !k.is_closed {
        return None;
    }

    Some(Candle::new(
        k.open_time,
        k.close_time,
        k.open.parse().ok()?,
        k.high.parse().ok()?,
        k.low.parse().ok()?,
        k.close.parse().ok()?,
    ))
}

/// Parse a ticker push event into a last price.
pub fn parse_price_tick(raw: &str) -> Option<f64> {
    let event: MiniTickerEvent = serde_json::from_str(raw).ok()?;
    event.close.parse().ok()
}
