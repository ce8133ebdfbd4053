//! Renders one channel transcript and stores it.

use clap::Parser;

use crate::internal::{builder::Strategy, config::Config};

#[derive(Parser, Debug)]
pub struct TranscriptArgs {
    /// Chat channel id
    #[arg(long, alias = "channel-id")]
    pub channel: String,

    /// Commit strategy (overrides the config file)
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Write into an in-memory repository instead of GitHub
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: TranscriptArgs, config: Config) -> anyhow::Result<()> {
    if config.chat.token.is_none() {
        anyhow::bail!("DISCORD_TOKEN is not set; transcripts are unavailable");
    }
    let service = super::build_service(&config, args.strategy, args.dry_run)?;
    let receipt = service.store_transcript(Some(&args.channel)).await?;
    super::finish(&config, &receipt, args.dry_run).await
}
