//! Listener lifecycle.

use crate::registry::Registry;
use crate::routes::router;
use crate::settings::{normalize_listen, ServerSettings};
use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

/// Construct every registered backend, bind, and serve until Ctrl-C.
pub async fn serve(settings: &ServerSettings, registry: Registry) -> anyhow::Result<()> {
    let backends = registry.instances();
    let app = router(&backends, &settings.prefix);

    let listen = normalize_listen(&settings.listen);
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!(
        addr = %listener.local_addr()?,
        prefix = %settings.prefix,
        backends = backends.len(),
        "logview listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
