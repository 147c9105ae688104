mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use p2pcall::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "p2pcall", version, about = "Peer-to-peer call with copy-paste signaling")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log filter, e.g. `info` or `p2pcall=debug`
    #[arg(long)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an offer and wait for the pasted answer
    Offer,
    /// Answer a pasted offer
    Answer,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    p2pcall::logger::init(cli.log_level.as_deref());

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    let mut manager = commands::util_api::build_manager(config);
    let result = match cli.command {
        Command::Offer => commands::offer_api::run(&mut manager).await,
        Command::Answer => commands::answer_api::run(&mut manager).await,
    };

    if let Err(e) = &result {
        if e.downcast_ref::<p2pcall::Error>()
            .is_some_and(p2pcall::Error::is_capture_error)
        {
            eprintln!("capture failed: check that a camera is available and permitted");
        }
    }
    manager.disconnect().await;
    result
}
