//! Shared data types for whalewatch: market events and severity tiers.

pub mod event;
pub mod tier;

pub use event::{EventKind, MarketEvent, Side};
pub use tier::{
    DisplayStyle, SeverityTier, SoundProfile, TierColor, TierError, TierTable, default_tiers,
};
