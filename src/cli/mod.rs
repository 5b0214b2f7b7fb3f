use anyhow::Result;
use clap::{Parser, Subcommand};

mod capture;
mod serve;

pub use capture::CaptureCommand;
pub use serve::ServeCommand;

#[derive(Parser, Debug)]
#[command(name = "tvrelay")]
#[command(about = "Authenticated HLS relay with background channel pre-warming")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP relay server (default)
    Serve(ServeCommand),
    /// Capture a single channel's auth and print the result
    Capture(CaptureCommand),
}

impl Args {
    pub async fn run(self) -> Result<()> {
        let command = self
            .command
            .unwrap_or(Command::Serve(ServeCommand::default()));

        match command {
            Command::Serve(cmd) => cmd.run().await,
            Command::Capture(cmd) => cmd.run().await,
        }
    }
}
