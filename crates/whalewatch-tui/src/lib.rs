//! Live terminal table for whalewatch.
//!
//! Draws on the main screen with direct cursor addressing: a fixed header,
//! a bounded window of newest-first rows, and a three-line footer.

pub mod blink;
pub mod buffer;
pub mod format;
pub mod layout;
pub mod render;
pub mod terminal;

pub use render::{CrosstermViewport, FixedViewport, RenderEngine, Viewport};
pub use terminal::TerminalGuard;
