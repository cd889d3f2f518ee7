//! The listen run: locate the target, attach to its streams, and print
//! tagged lines until they end or the operator interrupts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use listen_core::attach::create_attacher;
use listen_core::coordinator::CoordinatorResult;
use listen_core::locate::create_locator;
use listen_core::session::{SessionOutcome, run_session};
use listen_core::sink::WriterSink;

use crate::config::ListenConfig;

/// Run a listen session with the resolved configuration.
///
/// Returns normally when nothing is running. Exits the process with 0 once
/// every stream has ended, or with 130 when interrupted.
pub async fn run_listen(config: &ListenConfig) -> Result<()> {
    let locator = create_locator(&config.locator, &config.locate_options)?;
    let attacher = create_attacher(&config.backend, &config.attach_options)?;
    let sink = Arc::new(WriterSink::stdio());

    debug!(
        process_name = %config.process_name,
        locator = locator.name(),
        backend = attacher.name(),
        "starting session"
    );

    let cancel = CancellationToken::new();
    install_signal_handler(cancel.clone());

    let outcome = run_session(
        &config.process_name,
        locator.as_ref(),
        attacher,
        sink,
        cancel,
    )
    .await
    .with_context(|| format!("failed to locate {:?}", config.process_name))?;

    match outcome {
        SessionOutcome::NotRunning => {
            info!(process_name = %config.process_name, "nothing to attach to");
        }
        // Reads on pipes and terminals may still be parked in the runtime's
        // blocking pool after their attachment ended. Exiting here does not
        // wait for them; dropping the runtime would.
        SessionOutcome::Finished(CoordinatorResult::Completed { reports }) => {
            let failed = reports.iter().filter(|r| r.error.is_some()).count();
            info!(attachments = reports.len(), failed, "all streams ended");
            std::process::exit(0);
        }
        SessionOutcome::Finished(CoordinatorResult::Interrupted { reports }) => {
            info!(attachments = reports.len(), "interrupted, attachments drained");
            std::process::exit(130);
        }
    }

    Ok(())
}

/// First Ctrl+C / SIGTERM cancels `cancel`; a second one force-exits.
fn install_signal_handler(cancel: CancellationToken) {
    let got_first_signal = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
        #[cfg(unix)]
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();

        loop {
            #[cfg(unix)]
            {
                match terminate.as_mut() {
                    Some(term) => {
                        tokio::select! {
                            _ = tokio::signal::ctrl_c() => {}
                            _ = term.recv() => {}
                        }
                    }
                    None => {
                        tokio::signal::ctrl_c().await.ok();
                    }
                }
            }
            #[cfg(not(unix))]
            tokio::signal::ctrl_c().await.ok();

            if got_first_signal.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nDetaching (Ctrl+C again to force)...");
            cancel.cancel();
        }
    });
}
