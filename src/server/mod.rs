pub mod playlist;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use tokio::sync::watch;

use crate::relay::{RefreshCoordinator, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RefreshCoordinator>,
    pub store: Arc<SessionStore>,
    /// Client for proxying upstream segment bytes (short timeout, bounded
    /// redirects; a slow upstream stalls the player).
    pub client: reqwest::Client,
    /// Referer template sent upstream, `{channel}` placeholder.
    pub referer: Option<String>,
    pub playlist_max_age: Duration,
    pub segment_max_age: Duration,
}

/// Run the HTTP server.
pub async fn run_server(
    addr: SocketAddr,
    state: AppState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = Router::new()
        .route(
            "/stream/{channel_id}/playlist.m3u8",
            get(routes::stream_playlist),
        )
        .route("/hls/{segment_file}", get(routes::hls_segment))
        .route(
            "/segment/{channel_id}/{segment_file}",
            get(routes::channel_segment),
        )
        .route("/health", get(routes::health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}
