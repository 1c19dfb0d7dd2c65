//! Fixed-region table compositor.
//!
//! All buffer mutation and every terminal write go through one `Mutex`, and
//! a repaint flushes before releasing it, so cursor-addressed output from
//! concurrent callers never interleaves.

use std::io::{self, Stdout, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Local;
use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{
    Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor,
};
use crossterm::terminal::{Clear, ClearType};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use unicode_width::UnicodeWidthStr;
use whalewatch_core::config::DisplayConfig;
use whalewatch_types::{DisplayStyle, EventKind, MarketEvent, SeverityTier, TierColor, TierTable};

use crate::blink::BlinkState;
use crate::buffer::{RenderBuffer, Row};
use crate::format::{Align, fit, format_price, format_quantity, format_value, truncate_with_ellipsis};
use crate::layout::{Column, ColumnSpec, Layout};
use crate::terminal::{ClearAll, set_restore_row};

/// Source of the current terminal size.
pub trait Viewport: Send + Sync {
    /// # Errors
    /// Returns an error when the size cannot be determined, e.g. when
    /// output is not a terminal.
    fn size(&self) -> io::Result<(u16, u16)>;
}

/// The real terminal, queried through crossterm.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrosstermViewport;

impl Viewport for CrosstermViewport {
    fn size(&self) -> io::Result<(u16, u16)> {
        crossterm::terminal::size()
    }
}

/// A settable size, for headless use and tests.
#[derive(Debug, Clone, Default)]
pub struct FixedViewport {
    size: Arc<Mutex<Option<(u16, u16)>>>,
}

impl FixedViewport {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            size: Arc::new(Mutex::new(Some((width, height)))),
        }
    }

    /// A viewport whose size query always fails.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn set(&self, width: u16, height: u16) {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner) = Some((width, height));
    }
}

impl Viewport for FixedViewport {
    fn size(&self) -> io::Result<(u16, u16)> {
        self.size
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ok_or_else(|| io::Error::other("terminal size unavailable"))
    }
}

struct Inner<W> {
    out: W,
    layout: Option<Layout>,
    buffer: RenderBuffer,
    blink: BlinkState,
    message: String,
    error: Option<String>,
    size_warned: bool,
}

pub struct RenderEngine<W> {
    inner: Mutex<Inner<W>>,
    tiers: Arc<TierTable>,
    viewport: Box<dyn Viewport>,
    fallback: (u16, u16),
    blink_threshold: f64,
    blink_interval: Duration,
    title: String,
}

impl RenderEngine<Stdout> {
    /// Engine drawing to stdout at the real terminal size.
    pub fn stdout(tiers: Arc<TierTable>, config: &DisplayConfig) -> Self {
        Self::new(io::stdout(), tiers, config, CrosstermViewport)
    }
}

impl<W: Write> RenderEngine<W> {
    pub fn new(
        out: W,
        tiers: Arc<TierTable>,
        config: &DisplayConfig,
        viewport: impl Viewport + 'static,
    ) -> Self {
        let fallback = (config.fallback_width.max(1), config.fallback_height.max(1));
        let blink_interval = config.blink_interval();
        let capacity = Layout::compute(fallback.0, fallback.1).capacity();
        Self {
            inner: Mutex::new(Inner {
                out,
                layout: None,
                buffer: RenderBuffer::new(capacity),
                blink: BlinkState::new(blink_interval, Instant::now()),
                message: String::new(),
                error: None,
                size_warned: false,
            }),
            tiers,
            viewport: Box::new(viewport),
            fallback,
            blink_threshold: config.blink_threshold,
            blink_interval,
            title: "WHALEWATCH".to_string(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner<W>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an event to the buffer, repeated per its tier.
    ///
    /// Does not draw; call [`RenderEngine::repaint`] afterwards.
    pub fn submit(&self, event: Arc<MarketEvent>) {
        let position = self.tiers.position(event.notional());
        let Some(tier) = self.tiers.get(position) else {
            return;
        };
        let blinks = tier.threshold >= self.blink_threshold;

        let mut inner = self.lock();
        let (evicted, added) = inner.buffer.push(&event, position, tier.repeat);
        inner.blink.prune(&evicted);
        if blinks {
            for id in added {
                inner.blink.register(id);
            }
        }
    }

    /// Draws the current buffer.
    ///
    /// Redraws the whole screen on the first call and whenever the terminal
    /// size changed; otherwise only the data rows and the status line.
    ///
    /// # Errors
    /// Returns an error if writing to the output fails.
    pub fn repaint(&self) -> io::Result<()> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        // Queried under the lock so concurrent repaints apply sizes in order.
        let size = self.current_size();
        self.note_size_fallback(inner, size.is_none());
        let (width, height) = size.unwrap_or(self.fallback);

        let full = inner.layout.as_ref().is_none_or(|l| l.size() != (width, height));
        if full {
            let layout = Layout::compute(width, height);
            let evicted = inner.buffer.resize(layout.capacity());
            inner.blink.prune(&evicted);
            debug!(width, height, capacity = layout.capacity(), "layout recomputed");
            set_restore_row(layout.error_row().saturating_add(1));
            inner.layout = Some(layout);
        }
        let Some(layout) = inner.layout.as_ref() else {
            return Ok(());
        };
        inner.blink.tick(Instant::now());

        if full {
            queue!(inner.out, SetAttribute(Attribute::Reset), ResetColor, ClearAll)?;
            draw_chrome(&mut inner.out, layout, &self.title)?;
            draw_line(&mut inner.out, layout, layout.message_row(), &inner.message, None)?;
            if let Some(error) = &inner.error {
                draw_line(&mut inner.out, layout, layout.error_row(), error, Some(Color::Red))?;
            }
        }
        self.draw_rows(&mut inner.out, layout, &inner.buffer, &inner.blink)?;
        let status = format!(
            "Showing {} of {} events",
            visible_events(&inner.buffer),
            inner.buffer.events_seen()
        );
        draw_line(&mut inner.out, layout, layout.status_row(), &status, Some(Color::DarkGrey))?;
        inner.out.flush()
    }

    /// Replaces the connection/status message line.
    ///
    /// # Errors
    /// Returns an error if writing to the output fails.
    pub fn set_status(&self, text: &str) -> io::Result<()> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        inner.message = text.to_string();
        if let Some(layout) = &inner.layout {
            draw_line(&mut inner.out, layout, layout.message_row(), text, None)?;
            inner.out.flush()?;
        }
        Ok(())
    }

    /// Replaces the error line. An empty `text` clears it.
    ///
    /// # Errors
    /// Returns an error if writing to the output fails.
    pub fn set_error(&self, text: &str) -> io::Result<()> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        inner.error = (!text.is_empty()).then(|| format!("Error: {text}"));
        if let Some(layout) = &inner.layout {
            let line = inner.error.as_deref().unwrap_or_default();
            draw_line(&mut inner.out, layout, layout.error_row(), line, Some(Color::Red))?;
            inner.out.flush()?;
        }
        Ok(())
    }

    /// Rows currently held, and events seen in total.
    pub fn counts(&self) -> (usize, u64) {
        let inner = self.lock();
        (inner.buffer.len(), inner.buffer.events_seen())
    }

    /// How often the refresh task repaints.
    pub fn refresh_period(&self) -> Duration {
        (self.blink_interval / 2).max(Duration::from_millis(10))
    }

    fn current_size(&self) -> Option<(u16, u16)> {
        match self.viewport.size() {
            Ok((w, h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    fn note_size_fallback(&self, inner: &mut Inner<W>, failed: bool) {
        if failed && !inner.size_warned {
            warn!(
                width = self.fallback.0,
                height = self.fallback.1,
                "terminal size unavailable, using fallback"
            );
        }
        inner.size_warned = failed;
    }

    fn draw_rows(
        &self,
        out: &mut W,
        layout: &Layout,
        buffer: &RenderBuffer,
        blink: &BlinkState,
    ) -> io::Result<()> {
        let mut rows = buffer.newest_first();
        for offset in 0..layout.capacity() {
            let y = layout
                .first_data_row()
                .saturating_add(u16::try_from(offset).unwrap_or(u16::MAX));
            queue!(out, MoveTo(0, y), Clear(ClearType::CurrentLine))?;
            let Some(row) = rows.next() else {
                continue;
            };
            let Some(tier) = self.tiers.get(row.tier) else {
                continue;
            };
            apply_style(out, tier.style, blink.is_inverted(row.id))?;
            queue!(
                out,
                Print(format_row(layout, row, tier)),
                SetAttribute(Attribute::Reset),
                ResetColor
            )?;
        }
        Ok(())
    }
}

impl<W: Write + Send + 'static> RenderEngine<W> {
    /// Repaints every half blink interval until `cancel` fires, so blinking
    /// and resizes show up while the feed is quiet.
    pub fn spawn_refresh(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.refresh_period());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = engine.repaint() {
                            warn!(error = %err, "periodic repaint failed");
                        }
                    }
                }
            }
            debug!("refresh task stopped");
        })
    }
}

fn color(color: TierColor) -> Color {
    match color {
        TierColor::Black => Color::Black,
        TierColor::Red => Color::Red,
        TierColor::Green => Color::Green,
        TierColor::Yellow => Color::Yellow,
        TierColor::Blue => Color::Blue,
        TierColor::Magenta => Color::Magenta,
        TierColor::Cyan => Color::Cyan,
        TierColor::White => Color::White,
        TierColor::Grey => Color::Grey,
        TierColor::DarkGrey => Color::DarkGrey,
    }
}

fn apply_style<W: Write>(out: &mut W, style: DisplayStyle, inverted: bool) -> io::Result<()> {
    queue!(out, SetForegroundColor(color(style.fg)))?;
    if let Some(bg) = style.bg {
        queue!(out, SetBackgroundColor(color(bg)))?;
    }
    if style.bold {
        queue!(out, SetAttribute(Attribute::Bold))?;
    }
    if inverted {
        queue!(out, SetAttribute(Attribute::Reverse))?;
    }
    Ok(())
}

/// Title banner, column header and separator.
fn draw_chrome<W: Write>(out: &mut W, layout: &Layout, title: &str) -> io::Result<()> {
    let width = usize::from(layout.width());
    let title = truncate_with_ellipsis(&format!(" {title} "), width);
    let side = width.saturating_sub(title.width());
    let banner = format!("{}{title}{}", "═".repeat(side / 2), "═".repeat(side - side / 2));
    queue!(
        out,
        MoveTo(0, layout.title_row()),
        SetForegroundColor(Color::Cyan),
        SetAttribute(Attribute::Bold),
        Print(banner),
        SetAttribute(Attribute::Reset),
        ResetColor
    )?;

    let header = layout
        .columns()
        .iter()
        .map(|spec| fit(spec.title, usize::from(spec.width), spec.align))
        .collect::<Vec<_>>()
        .join(" ");
    queue!(
        out,
        MoveTo(0, layout.header_row()),
        SetAttribute(Attribute::Bold),
        Print(truncate_with_ellipsis(&header, width)),
        SetAttribute(Attribute::Reset)
    )?;

    let rule = "─".repeat(usize::from(layout.table_width().min(layout.width())));
    queue!(
        out,
        MoveTo(0, layout.separator_row()),
        SetForegroundColor(Color::DarkGrey),
        Print(rule),
        ResetColor
    )
}

/// Clears a footer row and writes `text` on it, truncated to the width.
fn draw_line<W: Write>(
    out: &mut W,
    layout: &Layout,
    row: u16,
    text: &str,
    fg: Option<Color>,
) -> io::Result<()> {
    queue!(out, MoveTo(0, row), Clear(ClearType::CurrentLine))?;
    if text.is_empty() {
        return Ok(());
    }
    if let Some(fg) = fg {
        queue!(out, SetForegroundColor(fg))?;
    }
    queue!(
        out,
        Print(truncate_with_ellipsis(text, usize::from(layout.width()))),
        ResetColor
    )
}

fn format_row(layout: &Layout, row: &Row, tier: &SeverityTier) -> String {
    layout
        .columns()
        .iter()
        .map(|spec| cell(spec, &row.event, tier))
        .collect::<Vec<_>>()
        .join(" ")
}

fn cell(spec: &ColumnSpec, event: &MarketEvent, tier: &SeverityTier) -> String {
    let text = match spec.column {
        Column::Time => event
            .timestamp
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string(),
        Column::Side => event.side.label().to_string(),
        Column::Symbol => event.symbol.clone(),
        Column::Price => format_price(event.price),
        Column::Quantity => format_quantity(event.quantity),
        Column::Value => format_value(event.notional()),
        Column::Type => event.kind.label().to_string(),
        Column::Category => format!("{} {}", tier.symbol, tier.name.to_uppercase()),
        Column::Info => match &event.kind {
            EventKind::Trade { trade_id } => format!("#{trade_id}"),
            EventKind::Liquidation {
                average_price: Some(average),
                status,
            } => format!("avg {} {status}", format_price(*average)),
            EventKind::Liquidation {
                average_price: None,
                status,
            } => status.clone(),
        },
    };
    fit(&text, usize::from(spec.width), spec.align)
}

/// Distinct events among the buffered rows. Repeats of one event are adjacent.
fn visible_events(buffer: &RenderBuffer) -> usize {
    let mut count = 0;
    let mut last: Option<&Arc<MarketEvent>> = None;
    for row in buffer.newest_first() {
        if last.is_none_or(|prev| !Arc::ptr_eq(prev, &row.event)) {
            count += 1;
        }
        last = Some(&row.event);
    }
    count
}
