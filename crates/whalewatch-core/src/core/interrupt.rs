use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

static RESTORE_HOOK: OnceLock<Box<dyn Fn() + Send + Sync>> = OnceLock::new();

#[derive(Debug)]
pub struct InterruptedError;

impl std::fmt::Display for InterruptedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interrupted")
    }
}

impl std::error::Error for InterruptedError {}

/// Installs the Ctrl+C / SIGTERM / SIGHUP handler for a monitoring session.
///
/// The first signal cancels `token`; the ingestion loop and every task
/// holding a child token wind down and restore the terminal on their way
/// out. A second signal runs the restore hook and exits immediately.
///
/// # Errors
/// Returns an error if a handler is already installed for this process.
pub fn install(token: CancellationToken) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || on_signal(&token))
}

fn on_signal(token: &CancellationToken) {
    if token.is_cancelled() {
        // Second interrupt - force exit.
        // Restore terminal first since process::exit() bypasses Drop handlers.
        if let Some(hook) = RESTORE_HOOK.get() {
            hook();
        }
        std::process::exit(130);
    }
    token.cancel();
}

/// Registers a restore hook called on the second Ctrl+C before exit.
///
/// Typically used by the render engine to show the cursor again.
pub fn set_restore_hook<F>(hook: F)
where
    F: Fn() + Send + Sync + 'static,
{
    let _ = RESTORE_HOOK.set(Box::new(hook));
}
