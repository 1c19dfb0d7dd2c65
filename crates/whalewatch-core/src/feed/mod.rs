//! Market feed ingestion.
//!
//! A [`FeedSource`] owns the wire protocol: connecting, subscribing and
//! decoding frames into [`FeedMessage`]s. The [`StreamConsumer`] drives any
//! source through the reconnect state machine and forwards accepted events.

pub mod backoff;
pub mod binance;
pub mod consumer;

use std::fmt;
use std::future::Future;

pub use backoff::Backoff;
pub use binance::{BinanceSource, StreamKind};
pub use consumer::{ConsumerExit, ConsumerState, ConsumerStats, StatusListener, StreamConsumer};
use whalewatch_types::MarketEvent;

/// One decoded unit read from a feed source.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// A trade or liquidation ready for classification.
    Event(MarketEvent),
    /// Protocol chatter with no market data (subscription acks, etc.).
    Control,
    /// A payload that could not be decoded; the string says why.
    Malformed(String),
}

/// Categories of feed errors, used by the consumer to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// Could not establish the connection or complete the subscription.
    Connect,
    /// The transport failed while streaming.
    Transport,
    /// The remote side closed the stream.
    Closed,
    /// Misconfiguration that retrying cannot fix (e.g. an invalid endpoint).
    Fatal,
}

impl fmt::Display for FeedErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedErrorKind::Connect => write!(f, "connect"),
            FeedErrorKind::Transport => write!(f, "transport"),
            FeedErrorKind::Closed => write!(f, "closed"),
            FeedErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Structured error from a feed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedError {
    pub kind: FeedErrorKind,
    pub message: String,
}

impl FeedError {
    pub fn new(kind: FeedErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(FeedErrorKind::Connect, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FeedErrorKind::Transport, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(FeedErrorKind::Closed, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FeedErrorKind::Fatal, message)
    }

    /// Whether the consumer should back off and reconnect.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, FeedErrorKind::Fatal)
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FeedError {}

/// A connection to a market data feed.
///
/// `connect` (re)establishes the transport and performs the subscription
/// handshake; a successful return means the subscription is live.
/// `next_message` waits for the next frame and decodes it. Both futures must
/// be cancel-safe at await points: the consumer drops them on shutdown.
pub trait FeedSource {
    fn connect(&mut self) -> impl Future<Output = Result<(), FeedError>> + Send;

    fn next_message(&mut self) -> impl Future<Output = Result<FeedMessage, FeedError>> + Send;
}
