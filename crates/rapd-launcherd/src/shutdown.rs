use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel the returned token on SIGTERM or SIGINT (Ctrl-C elsewhere).
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!(target: "rapd", "received SIGTERM, shutting down"),
                _ = sigint.recv() => info!(target: "rapd", "received SIGINT, shutting down"),
            }
            token_clone.cancel();
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "rapd", "received Ctrl-C, shutting down");
        }
        token_clone.cancel();
    });

    Ok(token)
}
