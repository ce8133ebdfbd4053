//! One-shot write of a single artifact from the command line.

use std::path::PathBuf;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;

use crate::internal::{builder::Strategy, config::Config};

#[derive(Parser, Debug)]
pub struct PutArgs {
    /// Target path inside the repository, e.g. `notes/a.html`
    #[arg(long)]
    pub name: String,

    /// Content to store, as text
    #[arg(long, required_unless_present = "file", conflicts_with = "file")]
    pub content: Option<String>,

    /// Read the content from a local file instead
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Commit message (defaults to the strategy's message)
    #[arg(short, long)]
    pub message: Option<String>,

    /// Commit strategy (overrides the config file)
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Write into an in-memory repository instead of GitHub
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: PutArgs, config: Config) -> anyhow::Result<()> {
    let content = match (&args.content, &args.file) {
        (Some(text), _) => Bytes::copy_from_slice(text.as_bytes()),
        (None, Some(file)) => tokio::fs::read(file)
            .await
            .map(Bytes::from)
            .with_context(|| format!("failed to read {}", file.display()))?,
        (None, None) => anyhow::bail!("either --content or --file is required"),
    };

    let service = super::build_service(&config, args.strategy, args.dry_run)?;
    let receipt = service
        .store_bytes(&args.name, content, args.message)
        .await?;
    super::finish(&config, &receipt, args.dry_run).await
}
