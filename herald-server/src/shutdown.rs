//! Process signals: SIGTERM/SIGINT stop the server, SIGHUP reloads the
//! hot-swappable parts of the configuration.

use crate::config::{ConfigLoader, LoadedConfig};
use crate::state::AppState;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

/// Resolves on the first SIGTERM or SIGINT.
pub async fn shutdown_signal() {
    let handlers = signal(SignalKind::terminate())
        .and_then(|sigterm| Ok((sigterm, signal(SignalKind::interrupt())?)));
    let (mut sigterm, mut sigint) = match handlers {
        Ok(handlers) => handlers,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install shutdown signal handlers");
            return std::future::pending().await;
        }
    };

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    tracing::info!(signal = name, "Shutting down");
}

/// Swap the channel registry and the push secret.
///
/// Engine timings and the listen address only change on restart.
async fn apply_reload(state: &AppState, loaded: LoadedConfig, http_client: &reqwest::Client) {
    let registry = loaded.channel_registry(http_client);
    let channels = registry.len();
    state
        .engine
        .directory()
        .registry_store()
        .update(registry)
        .await;
    *state.push_secret.write().await = loaded.push_secret;
    tracing::info!(channels, "Configuration reloaded");
}

/// Reload the configuration on every SIGHUP until the returned `Notify`
/// fires.
pub fn spawn_config_reload_handler(
    state: AppState,
    config_loader: Arc<ConfigLoader>,
    http_client: reqwest::Client,
) -> Arc<Notify> {
    let stop = Arc::new(Notify::new());
    let stopped = stop.clone();

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler, reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = stopped.notified() => break,
                _ = sighup.recv() => match config_loader.reload() {
                    Ok(loaded) => apply_reload(&state, loaded, &http_client).await,
                    Err(e) => tracing::error!(error = %e, "Configuration reload failed, keeping the old one"),
                },
            }
        }
        tracing::debug!("Config reload handler stopped");
    });

    stop
}
