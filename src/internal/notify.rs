//! Deploy hook notifier.
//!
//! After a successful write the service pings a configured webhook (for example a
//! Vercel deploy hook) with a bare `POST`. Delivery is best effort: failures are
//! logged and never retried, and they never change the write's result.

use std::time::Duration;

use reqwest::Client as HttpClient;
use tokio::task::JoinHandle;
use url::Url;

use crate::utils::http;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// No hook configured.
    Skipped,
    Delivered(u16),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct DeployNotifier {
    http_client: HttpClient,
    hook: Option<Url>,
}

impl Default for DeployNotifier {
    fn default() -> Self {
        Self::disabled()
    }
}

impl DeployNotifier {
    pub fn new(hook: Option<Url>, timeout: Duration) -> Self {
        Self {
            http_client: http::client(timeout),
            hook,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, Duration::from_secs(10))
    }

    pub fn is_enabled(&self) -> bool {
        self.hook.is_some()
    }

    /// Sends the trigger and reports what happened. Never returns an error.
    pub async fn notify(&self) -> NotifyOutcome {
        let Some(hook) = &self.hook else {
            return NotifyOutcome::Skipped;
        };
        // only scheme and host are logged, hook paths usually embed a secret
        let target = format!("{}://{}", hook.scheme(), hook.host_str().unwrap_or_default());

        match self.http_client.post(hook.clone()).send().await {
            Ok(response) if response.status().is_success() => {
                let status = response.status().as_u16();
                tracing::info!(%target, status, "deploy hook triggered");
                NotifyOutcome::Delivered(status)
            }
            Ok(response) => {
                let status = response.status();
                tracing::warn!(%target, %status, "deploy hook rejected the trigger");
                NotifyOutcome::Failed(format!("deploy hook answered {status}"))
            }
            Err(e) => {
                tracing::warn!(%target, error = %e, "deploy hook unreachable");
                NotifyOutcome::Failed(e.to_string())
            }
        }
    }

    /// Fires [`notify`](Self::notify) on the runtime without waiting for it.
    pub fn spawn(&self) -> Option<JoinHandle<NotifyOutcome>> {
        if !self.is_enabled() {
            return None;
        }
        let notifier = self.clone();
        Some(tokio::spawn(async move { notifier.notify().await }))
    }
}
