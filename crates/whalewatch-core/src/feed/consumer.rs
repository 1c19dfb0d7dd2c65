//! Reconnecting stream consumer.
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed -> Streaming
//!                    ^                           |
//!                    +------- Reconnecting <-----+   (transport error)
//! any state -> Stopped                               (cancellation)
//! ```

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use whalewatch_types::MarketEvent;

use super::{Backoff, FeedError, FeedMessage, FeedSource};

/// Where the consumer currently is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
    Reconnecting,
    Stopped,
}

/// Why [`StreamConsumer::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerExit {
    Cancelled,
    Failed(FeedError),
}

/// Counters for what the consumer has seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Events forwarded downstream.
    pub accepted: u64,
    /// Events dropped by the minimum-value filter.
    pub filtered: u64,
    /// Payloads that could not be decoded.
    pub malformed: u64,
    /// Successful connects after the first one.
    pub reconnects: u64,
}

/// Observer for state changes and retryable errors.
pub type StatusListener = Box<dyn FnMut(ConsumerState, Option<&FeedError>) + Send>;

pub struct StreamConsumer<S> {
    source: S,
    backoff: Backoff,
    cancel: CancellationToken,
    min_value: f64,
    state: ConsumerState,
    stats: ConsumerStats,
    connected_once: bool,
    listener: Option<StatusListener>,
}

impl<S: FeedSource> StreamConsumer<S> {
    pub fn new(source: S, backoff: Backoff, cancel: CancellationToken) -> Self {
        Self {
            source,
            backoff,
            cancel,
            min_value: 0.0,
            state: ConsumerState::Disconnected,
            stats: ConsumerStats::default(),
            connected_once: false,
            listener: None,
        }
    }

    /// Events with a notional value below `min_value` are not forwarded.
    #[must_use]
    pub fn with_min_value(mut self, min_value: f64) -> Self {
        self.min_value = min_value;
        self
    }

    /// Calls `listener` on every state change, and with the error whenever
    /// a retryable failure sends the consumer into `Reconnecting`.
    #[must_use]
    pub fn with_status_listener<F>(mut self, listener: F) -> Self
    where
        F: FnMut(ConsumerState, Option<&FeedError>) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Runs until cancelled or until the source reports a fatal error.
    ///
    /// `on_event` is called inline for every accepted event; it must not
    /// block for long since it delays the next receive.
    pub async fn run<F>(&mut self, mut on_event: F) -> ConsumerExit
    where
        F: FnMut(MarketEvent),
    {
        loop {
            self.set_state(ConsumerState::Connecting);
            let connected = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                result = self.source.connect() => Some(result),
            };
            let Some(connected) = connected else {
                return self.stop();
            };

            match connected {
                Ok(()) => {
                    self.backoff.reset();
                    if self.connected_once {
                        self.stats.reconnects += 1;
                    }
                    self.connected_once = true;
                    self.set_state(ConsumerState::Subscribed);
                }
                Err(err) if !err.is_retryable() => return self.fail(err),
                Err(err) => {
                    warn!(error = %err, "feed connect failed");
                    self.set_state(ConsumerState::Reconnecting);
                    self.notify(Some(&err));
                    if !self.wait_backoff().await {
                        return self.stop();
                    }
                    continue;
                }
            }

            self.set_state(ConsumerState::Streaming);
            let err = loop {
                let message = tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => None,
                    message = self.source.next_message() => Some(message),
                };
                let Some(message) = message else {
                    return self.stop();
                };

                match message {
                    Ok(FeedMessage::Event(event)) => {
                        if event.notional() < self.min_value {
                            self.stats.filtered += 1;
                            continue;
                        }
                        self.stats.accepted += 1;
                        on_event(event);
                    }
                    Ok(FeedMessage::Control) => trace!("feed control message"),
                    Ok(FeedMessage::Malformed(reason)) => {
                        self.stats.malformed += 1;
                        warn!(%reason, "skipping malformed feed payload");
                    }
                    Err(err) => break err,
                }
            };

            if !err.is_retryable() {
                return self.fail(err);
            }
            warn!(error = %err, "feed stream interrupted");
            self.set_state(ConsumerState::Reconnecting);
            self.notify(Some(&err));
            if !self.wait_backoff().await {
                return self.stop();
            }
        }
    }

    /// Sleeps for the next backoff delay. Returns `false` if cancelled first.
    async fn wait_backoff(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    fn set_state(&mut self, state: ConsumerState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "feed consumer state");
            self.state = state;
            self.notify(None);
        }
    }

    fn notify(&mut self, err: Option<&FeedError>) {
        if let Some(listener) = self.listener.as_mut() {
            listener(self.state, err);
        }
    }

    fn stop(&mut self) -> ConsumerExit {
        self.set_state(ConsumerState::Stopped);
        info!("feed consumer stopped");
        ConsumerExit::Cancelled
    }

    fn fail(&mut self, err: FeedError) -> ConsumerExit {
        self.set_state(ConsumerState::Stopped);
        warn!(error = %err, "feed consumer giving up");
        ConsumerExit::Failed(err)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use chrono::DateTime;
    use tokio::time::Instant;
    use whalewatch_types::{EventKind, Side};

    use super::*;
    use crate::feed::FeedErrorKind;

    /// Source that replays scripted results, then waits forever.
    #[derive(Default)]
    struct ScriptedSource {
        connects: VecDeque<Result<(), FeedError>>,
        messages: VecDeque<Result<FeedMessage, FeedError>>,
        connect_calls: usize,
    }

    impl FeedSource for ScriptedSource {
        async fn connect(&mut self) -> Result<(), FeedError> {
            self.connect_calls += 1;
            self.connects.pop_front().unwrap_or(Ok(()))
        }

        async fn next_message(&mut self) -> Result<FeedMessage, FeedError> {
            match self.messages.pop_front() {
                Some(message) => message,
                None => std::future::pending().await,
            }
        }
    }

    fn event(price: f64, quantity: f64) -> FeedMessage {
        FeedMessage::Event(MarketEvent {
            symbol: "BTC".to_string(),
            price,
            quantity,
            timestamp: DateTime::from_timestamp_millis(0).unwrap(),
            side: Side::Sell,
            kind: EventKind::Trade { trade_id: 1 },
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_failed_connects_then_reset() {
        let source = ScriptedSource {
            connects: VecDeque::from([
                Err(FeedError::connect("refused")),
                Err(FeedError::connect("refused")),
                Err(FeedError::connect("refused")),
            ]),
            messages: VecDeque::from([
                Ok(event(100.0, 1.0)),
                Err(FeedError::closed("server restart")),
                Ok(event(200.0, 1.0)),
            ]),
            ..ScriptedSource::default()
        };
        let cancel = CancellationToken::new();
        let mut consumer = StreamConsumer::new(source, Backoff::default(), cancel.clone());

        let start = Instant::now();
        let mut seen = Vec::new();
        let exit = consumer
            .run(|event| {
                seen.push(event.price);
                if seen.len() == 2 {
                    cancel.cancel();
                }
            })
            .await;

        assert_eq!(exit, ConsumerExit::Cancelled);
        assert_eq!(seen, [100.0, 200.0]);
        // 1s + 2s + 4s for the failed connects, then 1s after the reset.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(8), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(9), "elapsed {elapsed:?}");
        assert_eq!(consumer.source.connect_calls, 5);
        assert_eq!(consumer.stats().reconnects, 1);
        assert_eq!(consumer.state(), ConsumerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_and_control_messages_are_skipped() {
        let source = ScriptedSource {
            messages: VecDeque::from([
                Ok(FeedMessage::Control),
                Ok(FeedMessage::Malformed("bad json".to_string())),
                Ok(event(10.0, 1.0)),
            ]),
            ..ScriptedSource::default()
        };
        let cancel = CancellationToken::new();
        let mut consumer = StreamConsumer::new(source, Backoff::default(), cancel.clone());

        let mut count = 0;
        let exit = consumer
            .run(|_| {
                count += 1;
                cancel.cancel();
            })
            .await;

        assert_eq!(exit, ConsumerExit::Cancelled);
        assert_eq!(count, 1);
        assert_eq!(consumer.stats().malformed, 1);
        assert_eq!(consumer.source.connect_calls, 1, "no reconnect on bad payload");
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_value_filters_small_events() {
        let source = ScriptedSource {
            messages: VecDeque::from([Ok(event(10.0, 1.0)), Ok(event(10.0, 1_000.0))]),
            ..ScriptedSource::default()
        };
        let cancel = CancellationToken::new();
        let mut consumer =
            StreamConsumer::new(source, Backoff::default(), cancel.clone()).with_min_value(5_000.0);

        let mut notionals = Vec::new();
        consumer
            .run(|event| {
                notionals.push(event.notional());
                cancel.cancel();
            })
            .await;

        assert_eq!(notionals, [10_000.0]);
        assert_eq!(consumer.stats().filtered, 1);
        assert_eq!(consumer.stats().accepted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_without_retry() {
        let source = ScriptedSource {
            connects: VecDeque::from([Err(FeedError::fatal("invalid endpoint"))]),
            ..ScriptedSource::default()
        };
        let mut consumer =
            StreamConsumer::new(source, Backoff::default(), CancellationToken::new());

        let exit = consumer.run(|_| {}).await;

        assert_eq!(exit, ConsumerExit::Failed(FeedError::fatal("invalid endpoint")));
        assert_eq!(consumer.source.connect_calls, 1);
        assert_eq!(consumer.state(), ConsumerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_listener_sees_states_and_errors() {
        use std::sync::{Arc, Mutex};

        let source = ScriptedSource {
            connects: VecDeque::from([Err(FeedError::connect("refused"))]),
            messages: VecDeque::from([Ok(event(1.0, 1.0))]),
            ..ScriptedSource::default()
        };
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cancel = CancellationToken::new();
        let mut consumer = StreamConsumer::new(source, Backoff::default(), cancel.clone())
            .with_status_listener(move |state, err| {
                sink.lock().unwrap().push((state, err.map(|e| e.kind)));
            });

        consumer.run(|_| cancel.cancel()).await;

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            [
                (ConsumerState::Connecting, None),
                (ConsumerState::Reconnecting, None),
                (ConsumerState::Reconnecting, Some(FeedErrorKind::Connect)),
                (ConsumerState::Connecting, None),
                (ConsumerState::Subscribed, None),
                (ConsumerState::Streaming, None),
                (ConsumerState::Stopped, None),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_pending_receive() {
        let cancel = CancellationToken::new();
        let mut consumer = StreamConsumer::new(
            ScriptedSource::default(),
            Backoff::default(),
            cancel.clone(),
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let exit = consumer.run(|_| {}).await;

        assert_eq!(exit, ConsumerExit::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff_sleep() {
        let source = ScriptedSource {
            connects: VecDeque::from([
                Err(FeedError::connect("refused")),
                Err(FeedError::connect("refused")),
            ]),
            ..ScriptedSource::default()
        };
        let cancel = CancellationToken::new();
        let mut consumer = StreamConsumer::new(
            source,
            Backoff::new(Duration::from_secs(30), Duration::from_secs(30)),
            cancel.clone(),
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let exit = consumer.run(|_| {}).await;

        assert_eq!(exit, ConsumerExit::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(30));
        assert_eq!(consumer.source.connect_calls, 1);
    }
}
