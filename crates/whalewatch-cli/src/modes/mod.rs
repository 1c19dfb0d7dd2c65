//! Runtime execution modes.
//!
//! - `monitor`: live table of trades or liquidations with audio alerts

pub mod monitor;
