//! Shutdown signalling

use tokio::sync::watch;

/// Create a shutdown channel pair
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves once shutdown has been requested.
///
/// A dropped sender counts as a request: nobody is left to keep us running.
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
