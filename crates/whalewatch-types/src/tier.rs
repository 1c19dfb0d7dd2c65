//! Severity tiers and the notional-value classifier.
//!
//! A [`TierTable`] is built once at startup and never mutated afterwards, so
//! it can be shared across the render and audio paths without locking.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::EventKind;

/// Terminal colour used to style a tier's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TierColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    #[default]
    White,
    Grey,
    DarkGrey,
}

/// How rows of a tier are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DisplayStyle {
    pub fg: TierColor,
    pub bg: Option<TierColor>,
    pub bold: bool,
}

impl DisplayStyle {
    pub const fn plain(fg: TierColor) -> Self {
        Self {
            fg,
            bg: None,
            bold: false,
        }
    }

    pub const fn bold(fg: TierColor) -> Self {
        Self {
            fg,
            bg: None,
            bold: true,
        }
    }
}

/// Tone played when an event of a tier arrives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoundProfile {
    /// Tone frequency in Hz.
    pub frequency: u32,
    pub duration_ms: u32,
    /// Linear amplitude, 0.0 to 1.0.
    pub volume: f32,
}

impl SoundProfile {
    pub const fn new(frequency: u32, duration_ms: u32, volume: f32) -> Self {
        Self {
            frequency,
            duration_ms,
            volume,
        }
    }
}

fn default_repeat() -> u8 {
    1
}

/// A severity bucket selected by notional value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityTier {
    pub name: String,
    /// Minimum notional value (inclusive) for an event to land in this tier.
    pub threshold: f64,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub style: DisplayStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_sound: Option<SoundProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidation_sound: Option<SoundProfile>,
    /// Number of buffer rows an event of this tier occupies.
    #[serde(default = "default_repeat")]
    pub repeat: u8,
}

impl SeverityTier {
    /// Sound profile configured for events of the given kind.
    pub fn sound_for(&self, kind: &EventKind) -> Option<SoundProfile> {
        match kind {
            EventKind::Trade { .. } => self.trade_sound,
            EventKind::Liquidation { .. } => self.liquidation_sound,
        }
    }

    pub fn is_catch_all(&self) -> bool {
        self.threshold == 0.0
    }
}

/// Reason a tier configuration was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum TierError {
    Empty,
    InvalidThreshold { name: String, threshold: f64 },
    DuplicateThreshold { threshold: f64 },
    MissingCatchAll,
    ZeroRepeat { name: String },
}

impl fmt::Display for TierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierError::Empty => write!(f, "tier table is empty"),
            TierError::InvalidThreshold { name, threshold } => {
                write!(f, "tier '{name}' has invalid threshold {threshold}")
            }
            TierError::DuplicateThreshold { threshold } => {
                write!(f, "more than one tier has threshold {threshold}")
            }
            TierError::MissingCatchAll => write!(f, "no tier has threshold 0"),
            TierError::ZeroRepeat { name } => write!(f, "tier '{name}' has repeat = 0"),
        }
    }
}

impl std::error::Error for TierError {}

/// Validated tiers, sorted by descending threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    tiers: Vec<SeverityTier>,
}

impl TierTable {
    /// Validates and sorts the given tiers.
    ///
    /// # Errors
    /// Returns an error if the table is empty, a threshold is negative or not
    /// finite, two tiers share a threshold, no tier has threshold 0, or a tier
    /// has a zero repeat count.
    pub fn new(mut tiers: Vec<SeverityTier>) -> Result<Self, TierError> {
        if tiers.is_empty() {
            return Err(TierError::Empty);
        }
        for tier in &tiers {
            if !tier.threshold.is_finite() || tier.threshold < 0.0 {
                return Err(TierError::InvalidThreshold {
                    name: tier.name.clone(),
                    threshold: tier.threshold,
                });
            }
            if tier.repeat == 0 {
                return Err(TierError::ZeroRepeat {
                    name: tier.name.clone(),
                });
            }
        }

        tiers.sort_by(|a, b| b.threshold.total_cmp(&a.threshold));
        if let Some(pair) = tiers.windows(2).find(|w| w[0].threshold == w[1].threshold) {
            return Err(TierError::DuplicateThreshold {
                threshold: pair[0].threshold,
            });
        }
        // Sorted, non-negative and unique: the catch-all can only be last.
        if !tiers.last().is_some_and(SeverityTier::is_catch_all) {
            return Err(TierError::MissingCatchAll);
        }

        Ok(Self { tiers })
    }

    /// Returns the tier with the greatest threshold ≤ `notional`.
    ///
    /// Never fails: values below every threshold (negative, NaN) land in the
    /// catch-all tier.
    pub fn classify(&self, notional: f64) -> &SeverityTier {
        &self.tiers[self.position(notional)]
    }

    /// Index of the matching tier in descending order (0 = highest tier).
    pub fn position(&self, notional: f64) -> usize {
        self.tiers
            .iter()
            .position(|tier| tier.threshold <= notional)
            .unwrap_or(self.tiers.len() - 1)
    }

    /// Rank of the matching tier counted upward from the catch-all (level 0).
    ///
    /// Used as the audio priority of an event.
    pub fn level(&self, notional: f64) -> u8 {
        (self.tiers.len() - 1 - self.position(notional)) as u8
    }

    pub fn get(&self, position: usize) -> Option<&SeverityTier> {
        self.tiers.get(position)
    }

    pub fn tiers(&self) -> &[SeverityTier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
        }
    }
}

/// The built-in tier table, already in descending order.
pub fn default_tiers() -> Vec<SeverityTier> {
    fn tier(
        name: &str,
        threshold: f64,
        symbol: &str,
        style: DisplayStyle,
        repeat: u8,
        trade_sound: Option<SoundProfile>,
        liquidation_sound: Option<SoundProfile>,
    ) -> SeverityTier {
        SeverityTier {
            name: name.to_string(),
            threshold,
            symbol: symbol.to_string(),
            style,
            trade_sound,
            liquidation_sound,
            repeat,
        }
    }

    vec![
        tier(
            "Kraken",
            10_000_000.0,
            "✸",
            DisplayStyle {
                fg: TierColor::White,
                bg: Some(TierColor::Magenta),
                bold: true,
            },
            4,
            Some(SoundProfile::new(1400, 400, 0.9)),
            Some(SoundProfile::new(300, 600, 1.0)),
        ),
        tier(
            "Whale",
            1_000_000.0,
            "◆",
            DisplayStyle::bold(TierColor::Magenta),
            3,
            Some(SoundProfile::new(1200, 300, 0.8)),
            Some(SoundProfile::new(350, 500, 0.9)),
        ),
        tier(
            "Shark",
            500_000.0,
            "▲",
            DisplayStyle::bold(TierColor::Blue),
            2,
            Some(SoundProfile::new(1000, 200, 0.6)),
            Some(SoundProfile::new(400, 400, 0.8)),
        ),
        tier(
            "Dolphin",
            250_000.0,
            "♦",
            DisplayStyle::plain(TierColor::Cyan),
            1,
            Some(SoundProfile::new(900, 150, 0.5)),
            Some(SoundProfile::new(450, 300, 0.7)),
        ),
        tier(
            "Swordfish",
            100_000.0,
            "†",
            DisplayStyle::plain(TierColor::Green),
            1,
            Some(SoundProfile::new(800, 100, 0.4)),
            Some(SoundProfile::new(500, 200, 0.6)),
        ),
        tier(
            "Fish",
            50_000.0,
            "●",
            DisplayStyle::plain(TierColor::Yellow),
            1,
            None,
            Some(SoundProfile::new(550, 150, 0.5)),
        ),
        tier(
            "Shrimp",
            10_000.0,
            "·",
            DisplayStyle::plain(TierColor::White),
            1,
            None,
            Some(SoundProfile::new(600, 100, 0.4)),
        ),
        tier(
            "Plankton",
            0.0,
            "-",
            DisplayStyle::plain(TierColor::DarkGrey),
            1,
            None,
            None,
        ),
    ]
}
