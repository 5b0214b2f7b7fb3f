use anyhow::Result;
use clap::Parser;

mod capture;
mod cli;
mod relay;
mod server;
mod util;

#[tokio::main]
async fn main() -> Result<()> {
    cli::Args::parse().run().await
}
