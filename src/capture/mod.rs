pub mod direct;
#[cfg(test)]
pub mod testing;

use anyhow::Result;
use async_trait::async_trait;

use crate::relay::types::{CaptureResult, ChannelId};

pub use direct::DirectCapture;

/// Browser-like User-Agent the upstream expects on playlist and segment
/// requests.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/**
    Capability that obtains a fresh authenticated playlist URL for a channel.

    Implementations are expected to be slow (hundreds of milliseconds to
    seconds) and to fail occasionally; the coordinator wraps every call in a
    timeout and never runs two captures for the same channel concurrently.
*/
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn capture(&self, id: &ChannelId) -> Result<CaptureResult>;
}
