use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Identifier of an upstream channel (numeric string like `"237"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a successful auth capture produced for one channel.
///
/// `auth_url` is always non-empty on a successful capture. `segments` may
/// still be empty: the upstream sometimes answers with a playlist that lists
/// no segments, or with something that is not a playlist at all.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    /// The tokenized playlist URL that was actually fetched.
    pub auth_url: String,
    /// Raw upstream playlist text, if the provider could retrieve it.
    pub playlist_body: Option<String>,
    /// Absolute upstream segment URLs, in playlist order.
    pub segments: Vec<String>,
}

/// The most recent capture for a channel plus when it happened.
///
/// Sessions are replaced wholesale by the refresh coordinator; nothing else
/// mutates them. `captured_at` never moves backward for a given channel.
#[derive(Debug, Clone)]
pub struct ChannelSession {
    pub capture: CaptureResult,
    pub captured_at: DateTime<Utc>,
}

impl ChannelSession {
    pub fn new(capture: CaptureResult, captured_at: DateTime<Utc>) -> Self {
        Self {
            capture,
            captured_at,
        }
    }

    /// Session age relative to `now`. Clamps to zero if the clock moved.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.captured_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// State of a channel's in-flight capture.
#[derive(Debug, Clone)]
pub enum RefreshState {
    Idle,
    Refreshing,
    Failed(String),
}

impl RefreshState {
    pub fn is_refreshing(&self) -> bool {
        matches!(self, RefreshState::Refreshing)
    }
}
