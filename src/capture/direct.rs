use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header;

use crate::relay::types::{CaptureResult, ChannelId};

use super::{AuthProvider, USER_AGENT};

/**
    Direct-probe auth capture.

    Fetches the channel's tokenized playlist URL straight from the upstream:
    the configured template URL redirects to a short-lived `auth/...m3u8`
    URL, and the final URL after redirects is the credential we cache. No
    headless browser involved.
*/
pub struct DirectCapture {
    client: reqwest::Client,
    /// Playlist URL template; `{channel}` is replaced with the channel id.
    playlist_url: String,
    /// Referer template, same `{channel}` placeholder.
    referer: Option<String>,
}

impl DirectCapture {
    pub fn new(playlist_url: String, referer: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to build capture HTTP client")?;

        Ok(Self {
            client,
            playlist_url,
            referer,
        })
    }
}

#[async_trait]
impl AuthProvider for DirectCapture {
    async fn capture(&self, id: &ChannelId) -> Result<CaptureResult> {
        let url = self.playlist_url.replace("{channel}", id.as_str());

        let mut request = self.client.get(&url).header(header::USER_AGENT, USER_AGENT);
        if let Some(ref referer) = self.referer {
            request = request.header(header::REFERER, referer.replace("{channel}", id.as_str()));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Playlist request failed for channel {}", id))?
            .error_for_status()
            .with_context(|| format!("Upstream rejected playlist request for channel {}", id))?;

        // Final URL after redirects carries the auth token.
        let auth_url = response.url().to_string();
        let origin = response.url().origin().ascii_serialization();

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read playlist body for channel {}", id))?;

        if !body.contains("#EXTM3U") {
            // Upstream answered with something other than a playlist. Keep
            // the auth URL but report no usable segments.
            eprintln!(
                "[capture] Channel {}: upstream response is not a playlist",
                id
            );
            return Ok(CaptureResult {
                auth_url,
                playlist_body: None,
                segments: Vec::new(),
            });
        }

        let segments = parse_segment_urls(&body, &origin);
        println!(
            "[capture] Channel {}: captured auth URL with {} segments",
            id,
            segments.len()
        );

        Ok(CaptureResult {
            auth_url,
            playlist_body: Some(body),
            segments,
        })
    }
}

/**
    Collect segment URLs from a playlist body, in order.

    Absolute URLs are kept as-is; root-relative paths (`/hls/237_481.ts`) are
    joined against the auth URL's origin.
*/
pub fn parse_segment_urls(body: &str, origin: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            if line.starts_with("http://") || line.starts_with("https://") {
                Some(line.to_string())
            } else if line.starts_with('/') {
                Some(format!("{}{}", origin, line))
            } else {
                None
            }
        })
        .collect()
}
