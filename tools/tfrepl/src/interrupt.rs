//! ^C handling while the VM is running.
//!
//! The VM loop is synchronous, so the signal is awaited on a small
//! single-threaded runtime of its own, and each ^C raises the machine's abort
//! flag. The running word stops at its next dispatch step and the REPL goes
//! back to reading input.

use miette::{Context, IntoDiagnostic};
use tforth::AbortHandle;
use tokio::signal;

pub fn forward_ctrl_c(handle: AbortHandle) -> miette::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()
        .context("failed to build the signal runtime")?;
    std::thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            rt.block_on(async move {
                loop {
                    if let Err(error) = signal::ctrl_c().await {
                        tracing::warn!(%error, "can't listen for ^C, interrupts disabled");
                        return;
                    }
                    tracing::debug!("^C, aborting the running word");
                    handle.request();
                }
            })
        })
        .into_diagnostic()
        .context("failed to spawn the signal thread")?;
    Ok(())
}
