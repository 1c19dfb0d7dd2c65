//! Live monitoring session.
//!
//! Wires the feed consumer to the render engine and the audio notifier, and
//! tears them down in order: refresh task, audio, terminal.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use whalewatch_core::audio::{AudioNotifier, Enqueued};
use whalewatch_core::config::Config;
use whalewatch_core::core::interrupt::{self, InterruptedError};
use whalewatch_core::feed::{
    Backoff, BinanceSource, ConsumerExit, ConsumerState, FeedError, StreamConsumer, StreamKind,
};
use whalewatch_tui::{RenderEngine, TerminalGuard};
use whalewatch_types::{MarketEvent, TierTable};

/// Fans each accepted event out to the screen and the speaker.
pub struct Monitor<W: Write> {
    tiers: Arc<TierTable>,
    render: Arc<RenderEngine<W>>,
    audio: AudioNotifier,
}

impl<W: Write> Monitor<W> {
    pub fn new(tiers: Arc<TierTable>, render: Arc<RenderEngine<W>>, audio: AudioNotifier) -> Self {
        Self {
            tiers,
            render,
            audio,
        }
    }

    /// Displays `event` and queues its tier's tone, if it has one.
    ///
    /// Returns what happened to the tone, or `None` when the tier is silent
    /// for this kind of event. Never fails: render errors are logged.
    pub fn handle(&self, event: MarketEvent) -> Option<Enqueued> {
        let event = Arc::new(event);
        let notional = event.notional();
        let tier = self.tiers.classify(notional);

        self.render.submit(Arc::clone(&event));
        if let Err(err) = self.render.repaint() {
            warn!(error = %err, "repaint failed");
        }

        let sound = tier.sound_for(&event.kind)?;
        let priority = self.tiers.level(notional);
        Some(
            self.audio
                .enqueue(sound.frequency, sound.duration_ms, sound.volume, priority),
        )
    }

    pub fn repaint(&self) {
        if let Err(err) = self.render.repaint() {
            warn!(error = %err, "repaint failed");
        }
    }

    /// Stops audio playback and joins the worker.
    pub fn shutdown(&mut self) {
        self.audio.shutdown();
    }
}

/// Footer text for a consumer state.
fn status_line(state: ConsumerState, endpoint: &str) -> String {
    match state {
        ConsumerState::Disconnected => "Disconnected".to_string(),
        ConsumerState::Connecting => format!("Connecting to {endpoint}"),
        ConsumerState::Subscribed => format!("Subscribed on {endpoint}"),
        ConsumerState::Streaming => format!("Streaming from {endpoint}  (Ctrl+C to quit)"),
        ConsumerState::Reconnecting => "Connection lost, reconnecting".to_string(),
        ConsumerState::Stopped => "Stopped".to_string(),
    }
}

fn show_status<W: Write>(
    render: &RenderEngine<W>,
    endpoint: &str,
    state: ConsumerState,
    err: Option<&FeedError>,
) {
    let result = match err {
        Some(err) => render.set_error(&err.to_string()),
        None => render.set_status(&status_line(state, endpoint)).and_then(|()| {
            if state == ConsumerState::Streaming {
                render.set_error("")
            } else {
                Ok(())
            }
        }),
    };
    if let Err(err) = result {
        warn!(error = %err, "status update failed");
    }
}

/// Runs the monitor until Ctrl+C or a fatal feed error.
///
/// # Errors
/// Returns [`InterruptedError`] when cancelled, or the feed error that
/// stopped the consumer.
pub async fn run(config: &Config, kind: StreamKind) -> Result<()> {
    if config.pairs.is_empty() {
        anyhow::bail!("No trading pairs configured");
    }
    let tiers = Arc::new(config.tier_table().context("invalid tier table")?);
    let cancel = CancellationToken::new();
    interrupt::install(cancel.clone()).context("install interrupt handler")?;

    let mut guard = TerminalGuard::enter()?;
    let title = format!(
        "WHALEWATCH · {} · {}",
        kind.label(),
        config.pairs.join(" ").to_uppercase()
    );
    let render = Arc::new(RenderEngine::stdout(Arc::clone(&tiers), &config.display).with_title(title));
    let audio = AudioNotifier::start(&config.audio);
    let mut monitor = Monitor::new(tiers, Arc::clone(&render), audio);
    monitor.repaint();
    let refresh = render.spawn_refresh(cancel.child_token());

    let status_render = Arc::clone(&render);
    let endpoint = config.endpoint_for(kind).to_string();
    let source = BinanceSource::new(endpoint.clone(), &config.pairs, kind);
    let mut consumer =
        StreamConsumer::new(source, Backoff::from_config(&config.feed), cancel.clone())
            .with_min_value(config.min_value)
            .with_status_listener(move |state, err| {
                show_status(&status_render, &endpoint, state, err);
            });

    let exit = consumer
        .run(|event| {
            monitor.handle(event);
        })
        .await;

    cancel.cancel();
    if let Err(err) = refresh.await {
        warn!(error = %err, "refresh task failed");
    }
    monitor.shutdown();
    guard.restore()?;

    let stats = consumer.stats();
    info!(
        accepted = stats.accepted,
        filtered = stats.filtered,
        malformed = stats.malformed,
        reconnects = stats.reconnects,
        "monitor finished"
    );

    match exit {
        ConsumerExit::Cancelled => Err(InterruptedError.into()),
        ConsumerExit::Failed(err) => Err(anyhow::Error::new(err).context("market feed stopped")),
    }
}
