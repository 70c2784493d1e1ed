//! `amapill-listen`: attach to the notification stream and log what the
//! client would do with each event.

use std::sync::Arc;

use tokio::sync::Notify;

use amapill_client::config::{self, ClientConfig};
use amapill_client::events::StreamError;
use amapill_client::storage::{FileStore, KeyValueStore};
use amapill_client::ui::{TracingNavigator, TracingToastSink};
use amapill_client::ClientState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    amapill_client::init_tracing();
    tracing::info!("{} listener v{}", config::APP_NAME, config::APP_VERSION);

    let config = ClientConfig::from_env()?;
    let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(config::storage_path()?)?);
    let state = ClientState::new(
        config,
        storage,
        Arc::new(TracingToastSink),
        Arc::new(TracingNavigator),
    )?;

    if !state.session().is_authenticated() {
        tracing::error!("No stored session; sign in with the app first");
        return Ok(());
    }

    match state.refresh_notifications().await {
        Ok(count) => tracing::info!(count, unread = state.notifications().unread_count(), "Notifications loaded"),
        Err(e) => tracing::warn!(error = %e, "Could not load notifications"),
    }

    // Nothing reconnects here; a lost stream ends the listener.
    let lost = Arc::new(Notify::new());
    let on_lost = lost.clone();
    state.realtime().set_error_handler(Arc::new(move |e: &StreamError| {
        tracing::error!(error = %e, "Event stream lost");
        on_lost.notify_one();
    }));
    state.realtime().connect().await?;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal?,
        _ = lost.notified() => {}
    }

    tracing::info!("Shutting down");
    state.realtime().disconnect().await;
    Ok(())
}
