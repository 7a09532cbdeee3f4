use std::time::Duration;

use clap::{Args, Subcommand};
use resock_transport::Endpoint;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send messages through a reconnecting client.
    Send(SendArgs),
    /// Listen and print received messages.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format).await,
        Command::Serve(args) => serve::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Endpoint to connect to: `host:port`, `port`, or `unix:/path`.
    pub endpoint: Endpoint,
    /// JSON message.
    #[arg(long, conflicts_with = "data", required_unless_present = "data")]
    pub json: Option<String>,
    /// Text message, sent as a JSON string.
    #[arg(long)]
    pub data: Option<String>,
    /// Number of times to send the message.
    #[arg(long, default_value_t = 1)]
    pub count: usize,
    /// Pause between repeated sends (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Give up after this long without delivering (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Delay between connection attempts.
    #[arg(long, env = "RESOCK_RECONNECT_DELAY", default_value = "100ms")]
    pub reconnect_delay: String,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint to listen on: `host:port`, `port`, or `unix:/path`.
    pub endpoint: Endpoint,
    /// Send every received message back to its sender.
    #[arg(long)]
    pub echo: bool,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
