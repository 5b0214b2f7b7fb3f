use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::{signal, sync::watch};

use crate::capture::{AuthProvider, DirectCapture};
use crate::relay::{ChannelId, RefreshCoordinator, SessionStore, WarmerConfig, warmer};
use crate::server::{self, AppState};

#[derive(Parser, Debug)]
pub struct ServeCommand {
    /// HTTP server port
    #[arg(short, long, default_value = "3001")]
    pub port: u16,

    /// Upstream playlist URL template ({channel} placeholder)
    #[arg(
        long,
        default_value = "https://iptv2.french-live.lol/live/70013B23F3440093B75C4C8CF5C5C84D/{channel}.m3u8"
    )]
    pub upstream_url: String,

    /// Referer template sent upstream ({channel} placeholder)
    #[arg(long, default_value = "https://fstv.fun/player/fsplayer.php?id={channel}")]
    pub referer: String,

    /// Channels kept warm unconditionally (comma-separated ids)
    #[arg(long, value_delimiter = ',', default_value = "179,87,102,106,44")]
    pub warm: Vec<String>,

    /// Max session age for playlist requests, in seconds
    #[arg(long, default_value = "12")]
    pub playlist_max_age: u64,

    /// Max session age for segment requests, in seconds
    #[arg(long, default_value = "5")]
    pub segment_max_age: u64,

    /// Max session age before the warmer refreshes a channel, in seconds
    #[arg(long, default_value = "4")]
    pub warm_max_age: u64,

    /// Warmer tick interval in seconds
    #[arg(long, default_value = "8")]
    pub warm_interval: u64,

    /// Max simultaneous background captures
    #[arg(long, default_value = "3")]
    pub warm_concurrency: usize,

    /// Auth capture timeout in seconds
    #[arg(long, default_value = "8")]
    pub capture_timeout: u64,

    /// Upstream segment fetch timeout in seconds
    #[arg(long, default_value = "3")]
    pub segment_timeout: u64,

    /// Viewer inactivity window in seconds
    #[arg(long, default_value = "60")]
    pub active_window: u64,

    /// Idle time before a non-seed channel's session is evicted, in seconds
    #[arg(long, default_value = "300")]
    pub evict_after: u64,

    /// Idle sweep interval in seconds
    #[arg(long, default_value = "60")]
    pub sweep_interval: u64,
}

impl Default for ServeCommand {
    fn default() -> Self {
        Self {
            port: 3001,
            upstream_url:
                "https://iptv2.french-live.lol/live/70013B23F3440093B75C4C8CF5C5C84D/{channel}.m3u8"
                    .to_string(),
            referer: "https://fstv.fun/player/fsplayer.php?id={channel}".to_string(),
            warm: ["179", "87", "102", "106", "44"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            playlist_max_age: 12,
            segment_max_age: 5,
            warm_max_age: 4,
            warm_interval: 8,
            warm_concurrency: 3,
            capture_timeout: 8,
            segment_timeout: 3,
            active_window: 60,
            evict_after: 300,
            sweep_interval: 60,
        }
    }
}

impl ServeCommand {
    pub async fn run(self) -> Result<()> {
        // Shutdown signal
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Core state
        let store = Arc::new(SessionStore::new());
        let provider: Arc<dyn AuthProvider> = Arc::new(DirectCapture::new(
            self.upstream_url.clone(),
            Some(self.referer.clone()),
            Duration::from_secs(self.capture_timeout),
        )?);
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            provider,
            Duration::from_secs(self.capture_timeout),
        ));

        // Client for segment proxying
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.segment_timeout))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        let state = AppState {
            coordinator: Arc::clone(&coordinator),
            store: Arc::clone(&store),
            client,
            referer: Some(self.referer.clone()),
            playlist_max_age: Duration::from_secs(self.playlist_max_age),
            segment_max_age: Duration::from_secs(self.segment_max_age),
        };

        // Start HTTP server
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));

        println!(
            "HTTP relay listening on http://localhost:{}",
            self.port
        );
        println!(
            "  Playlist URL format: http://localhost:{}/stream/{{channelId}}/playlist.m3u8",
            self.port
        );
        println!();

        let server_handle = {
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                if let Err(e) = server::run_server(addr, state, shutdown_rx).await {
                    eprintln!("[server] Error: {}", e);
                }
            })
        };

        // Background warmer + idle sweep
        let warmer_config = WarmerConfig {
            interval: Duration::from_secs(self.warm_interval),
            max_age: Duration::from_secs(self.warm_max_age),
            concurrency: self.warm_concurrency,
            seed: self.warm.iter().map(|id| ChannelId::new(id.as_str())).collect(),
            sweep_interval: Duration::from_secs(self.sweep_interval),
            active_window: Duration::from_secs(self.active_window),
            evict_after: Duration::from_secs(self.evict_after),
        };

        let warmer_handle = warmer::spawn_warmer(
            Arc::clone(&coordinator),
            Arc::clone(&store),
            warmer_config.clone(),
            shutdown_rx.clone(),
        );
        let sweep_handle =
            warmer::spawn_idle_sweep(Arc::clone(&store), warmer_config, shutdown_rx.clone());

        // Wait for Ctrl+C
        signal::ctrl_c().await?;
        println!("\nShutting down...");
        let _ = shutdown_tx.send(true);

        let _ = warmer_handle.await;
        let _ = sweep_handle.await;
        let _ = server_handle.await;

        println!("Done.");
        Ok(())
    }
}
