use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use crate::capture::{AuthProvider, DirectCapture};
use crate::relay::ChannelId;

#[derive(Parser, Debug)]
pub struct CaptureCommand {
    /// Channel id to capture
    pub channel: String,

    /// Upstream playlist URL template ({channel} placeholder)
    #[arg(
        long,
        default_value = "https://iptv2.french-live.lol/live/70013B23F3440093B75C4C8CF5C5C84D/{channel}.m3u8"
    )]
    pub upstream_url: String,

    /// Referer template sent upstream ({channel} placeholder)
    #[arg(long, default_value = "https://fstv.fun/player/fsplayer.php?id={channel}")]
    pub referer: String,

    /// Capture timeout in seconds
    #[arg(long, default_value = "8")]
    pub timeout: u64,
}

impl CaptureCommand {
    pub async fn run(self) -> Result<()> {
        let provider = DirectCapture::new(
            self.upstream_url,
            Some(self.referer),
            Duration::from_secs(self.timeout),
        )?;
        let id = ChannelId::new(self.channel);

        println!("Capturing auth for channel {}...", id);
        let result = provider.capture(&id).await?;

        println!();
        println!("Auth URL: {}", result.auth_url);
        println!("Playlist body: {}", if result.playlist_body.is_some() {
            "yes"
        } else {
            "no"
        });
        println!("Segments: {}", result.segments.len());
        let start = result.segments.len().saturating_sub(4);
        for url in &result.segments[start..] {
            println!("  {}", url);
        }

        Ok(())
    }
}
