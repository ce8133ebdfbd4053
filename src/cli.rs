//! CLI entry for scribe: defines the clap subcommands, loads configuration, and dispatches each command handler.
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{command, internal::config::Config};

// The Cli struct represents the root of the command line interface.
#[derive(Parser, Debug)]
#[command(
    about = "scribe: commit artifacts and chat transcripts to a GitHub repository",
    version
)]
struct Cli {
    /// TOML config file (defaults to $SCRIBE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands; args and `execute` live in the `command` module.
#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the HTTP server")]
    Serve(command::serve::ServeArgs),
    #[command(about = "Commit a single file")]
    Put(command::put::PutArgs),
    #[command(about = "Render a channel transcript and commit it")]
    Transcript(command::transcript::TranscriptArgs),
}

/// The main function is the entry point of the scribe application.
/// It parses the command-line arguments and executes the corresponding function.
/// - Caution: This is a `synchronous` function, it's declared as `async` to be able to use `[tokio::main]`
/// - `args`: parse from command line if it's `None`, otherwise parse from the given args
#[tokio::main]
pub async fn parse(args: Option<&[&str]>) -> anyhow::Result<()> {
    parse_async(args).await
}

/// `async` version of the [parse] function
pub async fn parse_async(args: Option<&[&str]>) -> anyhow::Result<()> {
    let args = match args {
        Some(args) => Cli::try_parse_from(args)?,
        None => Cli::parse(),
    };
    let config = Config::load(args.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    match args.command {
        Commands::Serve(args) => command::serve::execute(args, config).await,
        Commands::Put(args) => command::put::execute(args, config).await,
        Commands::Transcript(args) => command::transcript::execute(args, config).await,
    }
}

/// this test is to verify that the CLI can be built without panicking
/// according [clap dock](https://docs.rs/clap/latest/clap/_derive/_tutorial/chapter_4/index.html)
#[test]
fn verify_cli() {
    use clap::CommandFactory;

    Cli::command().debug_assert()
}
