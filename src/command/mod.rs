//! Command implementations behind the CLI: `serve`, `put` and `transcript`,
//! plus the wiring that turns a [`Config`] into an [`ArtifactService`].

pub mod put;
pub mod serve;
pub mod transcript;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use url::Url;

use crate::internal::{
    builder::Strategy,
    config::Config,
    notify::DeployNotifier,
    service::{ArtifactReceipt, ArtifactService, ServicePolicy},
    store::{ObjectStore, github::GithubStore, memory::MemoryStore},
    transcript::discord::DiscordRenderer,
};

const DEPLOY_HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the service for `config`. The deploy notifier is not attached; see
/// [`deploy_notifier`].
///
/// With `dry_run` the GitHub store is replaced by an in-memory one seeded with
/// the configured branch, and GitHub settings are not validated.
pub fn build_service(
    config: &Config,
    strategy: Option<Strategy>,
    dry_run: bool,
) -> anyhow::Result<ArtifactService> {
    let store: Arc<dyn ObjectStore> = if dry_run {
        Arc::new(MemoryStore::with_branch(&config.github.branch)?)
    } else {
        config.validate()?;
        Arc::new(GithubStore::from_settings(&config.github)?)
    };

    let strategy = strategy.unwrap_or(config.commit.strategy);
    let mut service = ArtifactService::new(store, strategy, ServicePolicy::from_config(config));
    if config.chat.token.is_some() {
        let renderer = DiscordRenderer::from_settings(&config.chat)?;
        service = service.with_renderer(Arc::new(renderer));
    } else {
        tracing::debug!("no chat token configured, transcripts disabled");
    }
    Ok(service)
}

pub fn deploy_notifier(config: &Config) -> anyhow::Result<DeployNotifier> {
    let hook = config
        .deploy
        .hook_url
        .as_deref()
        .map(Url::parse)
        .transpose()
        .context("invalid deploy hook url")?;
    Ok(DeployNotifier::new(hook, DEPLOY_HOOK_TIMEOUT))
}

/// Prints a receipt for one-shot commands and triggers the deploy hook inline,
/// since the process exits right after.
async fn finish(
    config: &Config,
    receipt: &ArtifactReceipt,
    dry_run: bool,
) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(receipt)?);
    if !dry_run {
        deploy_notifier(config)?.notify().await;
    }
    Ok(())
}
