//! Terminal lifecycle management.
//!
//! The monitor draws straight onto the main screen with cursor addressing
//! (no alternate screen, no raw mode). Terminal state is restored on:
//! - Normal exit (via [`TerminalGuard`] drop)
//! - A forced second Ctrl+C (interrupt restore hook)
//! - Panic

use std::fmt;
use std::io::{self, Write};
use std::panic;
use std::sync::Once;
use std::sync::atomic::{AtomicU16, Ordering};

use anyhow::{Context, Result};
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::style::{Attribute, ResetColor, SetAttribute};
use crossterm::{Command, execute, queue};

/// Clears the screen and the scrollback, then homes the cursor.
///
/// crossterm's `Clear(ClearType::All)` and `Clear(ClearType::Purge)` emit
/// these separately; the monitor wants all three in one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearAll;

impl Command for ClearAll {
    fn write_ansi(&self, f: &mut impl fmt::Write) -> fmt::Result {
        f.write_str("\x1b[2J\x1b[3J\x1b[H")
    }

    #[cfg(windows)]
    fn execute_winapi(&self) -> io::Result<()> {
        Err(io::Error::other("ClearAll requires ANSI support"))
    }
}

/// Row the cursor is parked on when the terminal is restored.
static RESTORE_ROW: AtomicU16 = AtomicU16::new(0);

static PANIC_HOOK: Once = Once::new();

/// Records the bottom of the drawn region so restore can move below it.
pub fn set_restore_row(row: u16) {
    RESTORE_ROW.store(row, Ordering::Relaxed);
}

/// Resets styling, parks the cursor below the drawn region and shows it.
///
/// Idempotent and safe to call from a panic hook or signal handler.
///
/// # Errors
/// Returns an error if writing to stdout fails.
pub fn restore_terminal() -> Result<()> {
    let mut stdout = io::stdout().lock();
    write_restore(&mut stdout, RESTORE_ROW.load(Ordering::Relaxed))
        .context("Failed to restore terminal")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// The cursor is left at the start of `row` with no newline, so the drawn
/// region does not scroll.
fn write_restore<W: Write>(out: &mut W, row: u16) -> io::Result<()> {
    queue!(
        out,
        SetAttribute(Attribute::Reset),
        ResetColor,
        MoveTo(0, row),
        Show
    )
}

/// Installs a panic hook that restores the terminal before printing the panic.
///
/// Only the first call installs anything.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let original_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            let _ = restore_terminal();
            original_hook(panic_info);
        }));
    });
}

/// Holds the terminal for the lifetime of the monitor.
///
/// Creating one hides the cursor and wires up the panic hook and the
/// interrupt restore hook. Dropping it restores the terminal.
#[derive(Debug)]
pub struct TerminalGuard {
    restored: bool,
}

impl TerminalGuard {
    /// # Errors
    /// Returns an error if the cursor cannot be hidden.
    pub fn enter() -> Result<Self> {
        install_panic_hook();
        whalewatch_core::core::interrupt::set_restore_hook(|| {
            let _ = restore_terminal();
        });
        execute!(io::stdout(), Hide).context("Failed to hide cursor")?;
        Ok(Self { restored: false })
    }

    /// Restores now instead of waiting for drop.
    ///
    /// # Errors
    /// Returns an error if writing to stdout fails.
    pub fn restore(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        restore_terminal()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}
