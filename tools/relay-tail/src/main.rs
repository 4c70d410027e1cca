//! relay-tail: create channels, produce into them, and tail them live.

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay_tail::{tail, RelayClient, TailEnd};

#[derive(Parser, Debug)]
#[command(name = "relay-tail")]
#[command(about = "Command-line client for the channel relay")]
struct Args {
    /// Relay base URL
    #[arg(short, long, env = "RELAY_URL", default_value = "http://127.0.0.1:7780")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a channel and print its id and consumer token as JSON
    Create {
        /// Use this id instead of a generated one
        #[arg(long)]
        correlation_id: Option<String>,
    },
    /// Send one message to a channel
    Produce { channel_id: String, message: String },
    /// Attach to a channel and print each message on its own line
    Tail {
        #[arg(long, env = "RELAY_TOKEN")]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    match args.command {
        Command::Create { correlation_id } => {
            let client = RelayClient::new(&args.url)?;
            let created = client
                .create_channel(correlation_id.as_deref())
                .await
                .context("failed to create channel")?;
            println!("{}", serde_json::to_string_pretty(&created)?);
            if !created.live_tail {
                eprintln!("warning: token unavailable, this channel cannot be tailed");
            }
        }
        Command::Produce { channel_id, message } => {
            let client = RelayClient::new(&args.url)?;
            let result = client
                .produce(&channel_id, message)
                .await
                .context("failed to produce message")?;
            println!("{}", serde_json::to_string(&result)?);
        }
        Command::Tail { token } => {
            let stdout = std::io::stdout();
            let end = tail(&args.url, &token, |message| {
                let mut out = stdout.lock();
                let _ = writeln!(out, "{}", message);
                let _ = out.flush();
            })
            .await
            .context("failed to tail channel")?;

            return Ok(report(end));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn report(end: TailEnd) -> ExitCode {
    match end {
        TailEnd::Normal => return ExitCode::SUCCESS,
        TailEnd::Superseded => eprintln!("stream taken over by another consumer (4001)"),
        TailEnd::Unauthorized(reason) => eprintln!("token rejected (4003): {}", reason),
        TailEnd::Closed { code, reason } => eprintln!("stream closed ({}): {}", code, reason),
        TailEnd::Dropped => eprintln!("connection lost without close frame"),
    }
    ExitCode::FAILURE
}
