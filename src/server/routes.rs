use std::time::Duration;

use anyhow::{Result, anyhow};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::capture;
use crate::relay::RefreshCoordinator;
use crate::relay::segments;
use crate::relay::types::ChannelId;
use crate::util;

use super::{AppState, playlist};

type HttpError = (StatusCode, &'static str);

const SEGMENT_NOT_FOUND: HttpError = (StatusCode::NOT_FOUND, "Segment not found");

/// Playlist endpoint: ensure a fresh-enough session, then serve the upstream
/// playlist rewritten to relay-relative segment URIs.
pub async fn stream_playlist(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<Response, HttpError> {
    let id = ChannelId::new(channel_id);
    println!("[server] Playlist requested for channel {}", id);

    state.store.mark_active(&id);

    let served = state
        .coordinator
        .ensure_fresh(&id, state.playlist_max_age)
        .await
        .map_err(|e| {
            eprintln!(
                "[server] Playlist capture failed for channel {}: {}",
                id, e
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        })?;

    if served.stale {
        println!("[server] Serving stale playlist for channel {}", id);
    }

    let session = served.session;
    let body = match session.capture.playlist_body {
        Some(ref raw) => playlist::rewrite_playlist(raw),
        None => playlist::synthesize_playlist(&session.capture.segments),
    };

    println!(
        "[server] Served playlist for channel {} ({} segments)",
        id,
        session.capture.segments.len()
    );

    Ok(media_response(
        "application/vnd.apple.mpegurl",
        Body::from(body),
    ))
}

/// Segment endpoint with the channel id encoded in the filename prefix.
pub async fn hls_segment(
    State(state): State<AppState>,
    Path(segment_file): Path<String>,
) -> Result<Response, HttpError> {
    let Some(id) = segments::channel_from_filename(&segment_file) else {
        eprintln!(
            "[server] Could not extract channel id from segment {}",
            segment_file
        );
        return Err(SEGMENT_NOT_FOUND);
    };
    serve_segment(&state, id, &segment_file).await
}

/// Segment endpoint with an explicit channel id in the path.
pub async fn channel_segment(
    State(state): State<AppState>,
    Path((channel_id, segment_file)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    serve_segment(&state, ChannelId::new(channel_id), &segment_file).await
}

/// Health endpoint: which channels hold sessions and which have viewers.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthStatus {
        status: &'static str,
        cached_channels: Vec<String>,
        active_channels: Vec<String>,
        timestamp: String,
    }

    let status = HealthStatus {
        status: "ok",
        cached_channels: state
            .store
            .live_channels()
            .iter()
            .map(|c| c.to_string())
            .collect(),
        active_channels: state
            .store
            .active_channels()
            .iter()
            .map(|c| c.to_string())
            .collect(),
        timestamp: util::time::now().to_rfc3339(),
    };

    (
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        serde_json::to_string(&status).unwrap_or_default(),
    )
}

async fn serve_segment(
    state: &AppState,
    id: ChannelId,
    filename: &str,
) -> Result<Response, HttpError> {
    println!("[server] Segment {} requested for channel {}", filename, id);

    state.store.mark_active(&id);

    let url = resolve_segment(&state.coordinator, &id, filename, state.segment_max_age)
        .await
        .map_err(|e| {
            eprintln!("[server] Segment {} for channel {}: {}", filename, id, e);
            SEGMENT_NOT_FOUND
        })?;

    proxy_upstream(state, &id, &url).await
}

/**
    Find the upstream URL for a requested segment.

    Match order, first hit wins: exact filename, nearby sequence numbers,
    forced re-capture plus exact match, latest available segment. Errors only
    when even the refreshed list is empty.
*/
pub(crate) async fn resolve_segment(
    coordinator: &RefreshCoordinator,
    id: &ChannelId,
    filename: &str,
    max_age: Duration,
) -> Result<String> {
    let session = coordinator.ensure_fresh(id, max_age).await?.session;
    if let Some(url) = segments::find_segment(&session.capture.segments, filename) {
        return Ok(url.to_string());
    }

    // The requested segment fell out of the live window; a fresh capture
    // usually brings the list forward far enough.
    println!(
        "[server] Segment {} not listed for channel {}, forcing re-capture",
        filename, id
    );
    let session = coordinator.force_refresh(id).await?.session;
    if let Some(url) = segments::find_exact(&session.capture.segments, filename) {
        return Ok(url.to_string());
    }

    if let Some(latest) = session.capture.segments.last() {
        println!(
            "[server] Serving latest segment for channel {} as fallback",
            id
        );
        return Ok(latest.clone());
    }

    Err(anyhow!("No segments available for channel {}", id))
}

/// Stream the upstream segment bytes through unmodified.
async fn proxy_upstream(
    state: &AppState,
    id: &ChannelId,
    url: &str,
) -> Result<Response, HttpError> {
    let mut request = state
        .client
        .get(url)
        .header(header::USER_AGENT, capture::USER_AGENT);
    if let Some(ref referer) = state.referer {
        request = request.header(header::REFERER, referer.replace("{channel}", id.as_str()));
    }

    let upstream = request.send().await.map_err(|e| {
        eprintln!("[server] Upstream fetch failed for channel {}: {}", id, e);
        SEGMENT_NOT_FOUND
    })?;

    if !upstream.status().is_success() {
        eprintln!(
            "[server] Upstream returned {} for channel {}",
            upstream.status(),
            id
        );
        return Err(SEGMENT_NOT_FOUND);
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("video/mp2t")
        .to_string();

    Ok(media_response(
        &content_type,
        Body::from_stream(upstream.bytes_stream()),
    ))
}

fn media_response(content_type: &str, body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap()
}
