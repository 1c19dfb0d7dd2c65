//! Binance websocket feed source.
//!
//! Subscribes to `<pair>@trade` or `<pair>@forceOrder` streams on a single
//! raw websocket and decodes frames into [`FeedMessage`]s.

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};
use whalewatch_types::{EventKind, MarketEvent, Side};

use super::{FeedError, FeedMessage, FeedSource};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Quote currency suffix stripped from symbols for display.
const QUOTE_SUFFIX: &str = "USDT";

/// Which Binance stream family to subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Trades,
    Liquidations,
}

impl StreamKind {
    /// Human-readable name for headers and status lines.
    pub fn label(self) -> &'static str {
        match self {
            StreamKind::Trades => "trades",
            StreamKind::Liquidations => "liquidations",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            StreamKind::Trades => "@trade",
            StreamKind::Liquidations => "@forceOrder",
        }
    }
}

pub struct BinanceSource {
    endpoint: String,
    streams: Vec<String>,
    socket: Option<Socket>,
    request_id: u64,
}

impl BinanceSource {
    pub fn new(endpoint: impl Into<String>, pairs: &[String], kind: StreamKind) -> Self {
        let streams = pairs
            .iter()
            .map(|pair| format!("{}{}", pair.trim().to_lowercase(), kind.suffix()))
            .collect();
        Self {
            endpoint: endpoint.into(),
            streams,
            socket: None,
            request_id: 0,
        }
    }

    pub fn streams(&self) -> &[String] {
        &self.streams
    }

    fn subscribe_message(&mut self) -> String {
        self.request_id += 1;
        json!({
            "method": "SUBSCRIBE",
            "params": self.streams,
            "id": self.request_id,
        })
        .to_string()
    }
}

fn connect_error(err: &tungstenite::Error) -> FeedError {
    match err {
        tungstenite::Error::Url(_) => FeedError::fatal(err.to_string()),
        _ => FeedError::connect(err.to_string()),
    }
}

impl FeedSource for BinanceSource {
    async fn connect(&mut self) -> Result<(), FeedError> {
        self.socket = None;
        if self.streams.is_empty() {
            return Err(FeedError::fatal("no trading pairs to subscribe to"));
        }

        let (mut socket, _response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| connect_error(&e))?;
        info!(endpoint = %self.endpoint, "connected to feed");

        let subscribe = self.subscribe_message();
        socket
            .send(Message::Text(subscribe))
            .await
            .map_err(|e| FeedError::connect(format!("subscribe failed: {e}")))?;
        info!(streams = %self.streams.join(","), "subscribed");

        self.socket = Some(socket);
        Ok(())
    }

    async fn next_message(&mut self) -> Result<FeedMessage, FeedError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(FeedError::closed("not connected"));
        };

        loop {
            let frame = match socket.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(FeedError::transport(e.to_string())),
                None => return Err(FeedError::closed("stream ended")),
            };

            match frame {
                Message::Text(text) => return Ok(decode(&text)),
                Message::Binary(bytes) => {
                    return Ok(match std::str::from_utf8(&bytes) {
                        Ok(text) => decode(text),
                        Err(_) => FeedMessage::Malformed("non-utf8 binary frame".to_string()),
                    });
                }
                Message::Ping(payload) => {
                    socket
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| FeedError::transport(e.to_string()))?;
                }
                Message::Pong(_) | Message::Frame(_) => {}
                Message::Close(frame) => {
                    let reason = frame.map_or_else(
                        || "close frame".to_string(),
                        |f| format!("close frame {}: {}", f.code, f.reason),
                    );
                    return Err(FeedError::closed(reason));
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    trade_time: i64,
    #[serde(rename = "t")]
    trade_id: u64,
    /// Buyer was the maker, i.e. the aggressor sold.
    #[serde(rename = "m")]
    buyer_is_maker: bool,
}

#[derive(Debug, Deserialize)]
struct RawForceOrder {
    #[serde(rename = "o")]
    order: RawLiquidation,
}

#[derive(Debug, Deserialize)]
struct RawLiquidation {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "S")]
    side: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "ap")]
    average_price: Option<String>,
    #[serde(rename = "X")]
    status: String,
    #[serde(rename = "T")]
    trade_time: i64,
}

/// Decodes one text frame.
///
/// Never fails: anything that is not a recognised event or a control reply
/// comes back as [`FeedMessage::Malformed`].
pub fn decode(text: &str) -> FeedMessage {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return FeedMessage::Malformed(format!("invalid json: {e}")),
    };

    let event_type = value.get("e").and_then(Value::as_str).map(str::to_owned);
    match event_type.as_deref() {
        Some("trade") => serde_json::from_value::<RawTrade>(value)
            .map_err(|e| format!("invalid trade: {e}"))
            .and_then(trade_event),
        Some("forceOrder") => serde_json::from_value::<RawForceOrder>(value)
            .map_err(|e| format!("invalid forceOrder: {e}"))
            .and_then(|raw| liquidation_event(raw.order)),
        Some(other) => Err(format!("unrecognized event type '{other}'")),
        None if value.get("result").is_some() || value.get("id").is_some() => {
            debug!(reply = %value, "control reply");
            return FeedMessage::Control;
        }
        None => Err("payload has no event type".to_string()),
    }
    .map_or_else(FeedMessage::Malformed, FeedMessage::Event)
}

fn trade_event(raw: RawTrade) -> Result<MarketEvent, String> {
    let side = if raw.buyer_is_maker {
        Side::Sell
    } else {
        Side::Buy
    };
    build_event(
        &raw.symbol,
        &raw.price,
        &raw.quantity,
        raw.trade_time,
        side,
        EventKind::Trade {
            trade_id: raw.trade_id,
        },
    )
}

fn liquidation_event(raw: RawLiquidation) -> Result<MarketEvent, String> {
    let side = match raw.side.as_str() {
        "BUY" => Side::Buy,
        "SELL" => Side::Sell,
        other => return Err(format!("unknown side '{other}'")),
    };
    let average_price = raw
        .average_price
        .as_deref()
        .and_then(|ap| ap.parse::<f64>().ok())
        .filter(|ap| *ap > 0.0);
    build_event(
        &raw.symbol,
        &raw.price,
        &raw.quantity,
        raw.trade_time,
        side,
        EventKind::Liquidation {
            average_price,
            status: raw.status,
        },
    )
}

fn build_event(
    symbol: &str,
    price: &str,
    quantity: &str,
    time_ms: i64,
    side: Side,
    kind: EventKind,
) -> Result<MarketEvent, String> {
    let price: f64 = price
        .parse()
        .map_err(|_| format!("invalid price '{price}'"))?;
    let quantity: f64 = quantity
        .parse()
        .map_err(|_| format!("invalid quantity '{quantity}'"))?;
    if !(price > 0.0 && quantity > 0.0) {
        return Err(format!("non-positive price/quantity {price}/{quantity}"));
    }
    let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(time_ms)
        .ok_or_else(|| format!("invalid timestamp {time_ms}"))?;
    let symbol = symbol.strip_suffix(QUOTE_SUFFIX).unwrap_or(symbol);

    Ok(MarketEvent {
        symbol: symbol.to_string(),
        price,
        quantity,
        timestamp,
        side,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedErrorKind;

    const TRADE: &str = r#"{"e":"trade","E":1700000000123,"s":"BTCUSDT","t":12345,"p":"37000.50","q":"2.00000000","T":1700000000100,"m":true,"M":true}"#;

    const FORCE_ORDER: &str = r#"{"e":"forceOrder","E":1700000000500,"o":{"s":"ETHUSDT","S":"BUY","o":"LIMIT","f":"IOC","q":"150.000","p":"2050.10","ap":"2049.80","X":"FILLED","l":"150.000","z":"150.000","T":1700000000450}}"#;

    #[test]
    fn test_decode_trade() {
        let FeedMessage::Event(event) = decode(TRADE) else {
            panic!("expected event");
        };
        assert_eq!(event.symbol, "BTC");
        assert_eq!(event.side, Side::Sell);
        assert_eq!(event.kind, EventKind::Trade { trade_id: 12345 });
        assert!((event.notional() - 74_001.0).abs() < 1e-6);
        assert_eq!(event.timestamp.timestamp_millis(), 1_700_000_000_100);
    }

    #[test]
    fn test_decode_force_order() {
        let FeedMessage::Event(event) = decode(FORCE_ORDER) else {
            panic!("expected event");
        };
        assert_eq!(event.symbol, "ETH");
        assert_eq!(event.side, Side::Buy);
        assert_eq!(
            event.kind,
            EventKind::Liquidation {
                average_price: Some(2049.80),
                status: "FILLED".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_subscription_reply_is_control() {
        assert_eq!(decode(r#"{"result":null,"id":1}"#), FeedMessage::Control);
    }

    #[test]
    fn test_decode_garbage_is_malformed() {
        assert!(matches!(decode("not json"), FeedMessage::Malformed(_)));
        assert!(matches!(
            decode(r#"{"e":"kline","s":"BTCUSDT"}"#),
            FeedMessage::Malformed(_)
        ));
        assert!(matches!(
            decode(r#"{"e":"trade","s":"BTCUSDT"}"#),
            FeedMessage::Malformed(_)
        ));
        assert!(matches!(decode("{}"), FeedMessage::Malformed(_)));
    }

    #[test]
    fn test_decode_rejects_non_numeric_price() {
        let payload = TRADE.replace("37000.50", "abc");
        let FeedMessage::Malformed(reason) = decode(&payload) else {
            panic!("expected malformed");
        };
        assert!(reason.contains("invalid price"));
    }

    #[test]
    fn test_stream_names() {
        let pairs = vec!["BTCUSDT".to_string(), "ethusdt".to_string()];
        let trades = BinanceSource::new("wss://example", &pairs, StreamKind::Trades);
        assert_eq!(trades.streams(), ["btcusdt@trade", "ethusdt@trade"]);

        let liqs = BinanceSource::new("wss://example", &pairs, StreamKind::Liquidations);
        assert_eq!(liqs.streams()[0], "btcusdt@forceOrder");
    }

    #[test]
    fn test_subscribe_message_increments_id() {
        let pairs = vec!["btcusdt".to_string()];
        let mut source = BinanceSource::new("wss://example", &pairs, StreamKind::Trades);
        let first: Value = serde_json::from_str(&source.subscribe_message()).unwrap();
        let second: Value = serde_json::from_str(&source.subscribe_message()).unwrap();
        assert_eq!(first["method"], "SUBSCRIBE");
        assert_eq!(first["params"][0], "btcusdt@trade");
        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
    }

    #[tokio::test]
    async fn test_next_message_without_connection_is_closed() {
        let mut source = BinanceSource::new("wss://example", &[], StreamKind::Trades);
        let err = source.next_message().await.unwrap_err();
        assert_eq!(err.kind, FeedErrorKind::Closed);
    }

    #[tokio::test]
    async fn test_connect_without_pairs_is_fatal() {
        let mut source = BinanceSource::new("wss://example", &[], StreamKind::Trades);
        let err = source.connect().await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
