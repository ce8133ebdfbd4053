//! Request pipeline shared by the HTTP routes and the CLI:
//! validate → (render transcript) → commit builder → deploy notifier.
//!
//! Input is validated before any store call, so a rejected request leaves the
//! repository untouched.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::{
    internal::{
        builder::{self, ArtifactRequest, CommitBuilder, Strategy, WriteOutcome},
        config::Config,
        notify::DeployNotifier,
        store::{BranchTip, ObjectStore, StoreError},
        transcript::{TranscriptError, TranscriptRenderer},
    },
    utils::path::{self, PathError},
};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    Upstream { status: Option<u16>, message: String },

    /// A collaborator needed for this request is not configured.
    #[error("{0}")]
    Unavailable(String),
}

impl ArtifactError {
    /// HTTP status this error is reported with.
    pub fn status(&self) -> u16 {
        match self {
            ArtifactError::InvalidInput(_) => 400,
            ArtifactError::NotFound(_) => 404,
            ArtifactError::Conflict(_) => 409,
            ArtifactError::Upstream { .. } => 502,
            ArtifactError::Unavailable(_) => 500,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            ArtifactError::InvalidInput(_) => "invalid_input",
            ArtifactError::NotFound(_) => "not_found",
            ArtifactError::Conflict(_) => "conflict",
            ArtifactError::Upstream { .. } => "upstream_error",
            ArtifactError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<StoreError> for ArtifactError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) | StoreError::InvalidBase(m) => ArtifactError::NotFound(m),
            StoreError::Conflict(m) | StoreError::NotAFile(m) => ArtifactError::Conflict(m),
            StoreError::InvalidPath(m) => ArtifactError::InvalidInput(m),
            StoreError::Upstream { status, message } => ArtifactError::Upstream {
                status: Some(status),
                message,
            },
            other => ArtifactError::Upstream {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

impl From<TranscriptError> for ArtifactError {
    fn from(e: TranscriptError) -> Self {
        match e {
            TranscriptError::ChannelNotFound(id) => {
                ArtifactError::NotFound(format!("Channel not found: {id}"))
            }
            TranscriptError::Upstream { status, message } => ArtifactError::Upstream {
                status: Some(status),
                message,
            },
            TranscriptError::Template(e) => {
                ArtifactError::Unavailable(format!("transcript rendering failed: {e}"))
            }
            other => ArtifactError::Upstream {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

impl From<PathError> for ArtifactError {
    fn from(e: PathError) -> Self {
        ArtifactError::InvalidInput(e.to_string())
    }
}

/// Body of a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReceipt {
    pub message: String,
    pub path: String,
    /// Object id of the stored content.
    pub sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Raw-content URL of the stored file.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
    #[serde(skip)]
    pub created: bool,
}

impl ArtifactReceipt {
    pub fn status(&self) -> u16 {
        if self.created { 201 } else { 200 }
    }
}

/// Where and how artifacts are written.
#[derive(Debug, Clone)]
pub struct ServicePolicy {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub raw_url: String,
    pub required_suffix: Option<String>,
    pub transcript_dir: String,
}

impl ServicePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            owner: config.github.owner.clone(),
            repo: config.github.repo.clone(),
            branch: config.github.branch.clone(),
            raw_url: config.github.raw_url.clone(),
            required_suffix: config.commit.required_suffix.clone(),
            transcript_dir: config.chat.transcript_dir.clone(),
        }
    }

    /// `{raw_url}/{owner}/{repo}/{branch}/{path}`
    pub fn raw_url_for(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_url.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.branch,
            path
        )
    }
}

pub struct ArtifactService {
    store: Arc<dyn ObjectStore>,
    builder: Arc<dyn CommitBuilder>,
    renderer: Option<Arc<dyn TranscriptRenderer>>,
    notifier: DeployNotifier,
    policy: ServicePolicy,
}

impl ArtifactService {
    pub fn new(store: Arc<dyn ObjectStore>, strategy: Strategy, policy: ServicePolicy) -> Self {
        Self {
            builder: builder::for_strategy(strategy, store.clone()),
            store,
            renderer: None,
            notifier: DeployNotifier::disabled(),
            policy,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn TranscriptRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_notifier(mut self, notifier: DeployNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn policy(&self) -> &ServicePolicy {
        &self.policy
    }

    pub fn strategy(&self) -> Strategy {
        self.builder.strategy()
    }

    /// Reads the configured branch; used as a startup access check.
    pub async fn check_branch(&self) -> Result<BranchTip, ArtifactError> {
        Ok(self.store.resolve_branch(&self.policy.branch).await?)
    }

    /// Stores `content` as text at `name`. Both must be present and non-empty.
    pub async fn store_content(
        &self,
        name: Option<&str>,
        content: Option<&str>,
    ) -> Result<ArtifactReceipt, ArtifactError> {
        let (Some(name), Some(content)) = (
            name.filter(|n| !n.trim().is_empty()),
            content.filter(|c| !c.is_empty()),
        ) else {
            return Err(ArtifactError::InvalidInput(
                "Missing 'name' or 'content' query parameter".to_string(),
            ));
        };
        self.store_bytes(name, Bytes::copy_from_slice(content.as_bytes()), None)
            .await
    }

    /// Stores raw bytes at `name`, optionally overriding the commit message.
    pub async fn store_bytes(
        &self,
        name: &str,
        content: Bytes,
        message: Option<String>,
    ) -> Result<ArtifactReceipt, ArtifactError> {
        let path = path::validate_target(name, self.policy.required_suffix.as_deref())?;
        let mut request = ArtifactRequest::new(path, content);
        request.message = message;

        let outcome = self.commit(&request).await?;
        let message = if outcome.created {
            format!("File '{}' created successfully", outcome.path)
        } else {
            format!("File '{}' updated successfully", outcome.path)
        };
        Ok(self.receipt(outcome, message))
    }

    /// Renders the channel's transcript and stores it under the transcript directory.
    pub async fn store_transcript(
        &self,
        channel_id: Option<&str>,
    ) -> Result<ArtifactReceipt, ArtifactError> {
        let channel_id = channel_id.map(str::trim).unwrap_or_default();
        if channel_id.is_empty() {
            return Err(ArtifactError::InvalidInput(
                "Channel ID is required".to_string(),
            ));
        }
        if channel_id.contains('/') {
            return Err(ArtifactError::InvalidInput(format!(
                "invalid channel ID '{channel_id}'"
            )));
        }
        let Some(renderer) = &self.renderer else {
            return Err(ArtifactError::Unavailable(
                "transcript rendering is not configured".to_string(),
            ));
        };

        let transcript = renderer.render(channel_id).await?;
        let path = path::validate_target(
            &path::join(&self.policy.transcript_dir, &transcript.filename),
            None,
        )?;
        let request = ArtifactRequest::new(path, transcript.bytes)
            .with_message(format!("Add transcript for channel {channel_id}"));

        let outcome = self.commit(&request).await?;
        Ok(self.receipt(
            outcome,
            format!("Transcript for channel {channel_id} saved"),
        ))
    }

    async fn commit(&self, request: &ArtifactRequest) -> Result<WriteOutcome, ArtifactError> {
        let branch = self.policy.branch.as_str();
        let outcome = match self.builder.write(branch, request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(branch, path = %request.path, error = %e, "write failed");
                return Err(e.into());
            }
        };
        tracing::info!(
            branch,
            path = %outcome.path,
            strategy = %self.builder.strategy(),
            sha = outcome.object_id.short(),
            created = outcome.created,
            "artifact stored"
        );
        // fire and forget; the result is logged by the notifier
        let _ = self.notifier.spawn();
        Ok(outcome)
    }

    fn receipt(&self, outcome: WriteOutcome, message: String) -> ArtifactReceipt {
        ArtifactReceipt {
            message,
            url: self.policy.raw_url_for(&outcome.path),
            sha: outcome.object_id.to_string(),
            commit: outcome.commit.map(|c| c.to_string()),
            html_url: outcome.html_url,
            created: outcome.created,
            path: outcome.path,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::internal::{
        store::memory::MemoryStore,
        transcript::Transcript,
    };

    fn policy() -> ServicePolicy {
        ServicePolicy {
            owner: "octo".to_string(),
            repo: "notes".to_string(),
            branch: "main".to_string(),
            raw_url: "https://raw.githubusercontent.com/".to_string(),
            required_suffix: None,
            transcript_dir: "transcripts".to_string(),
        }
    }

    struct StaticRenderer;

    #[async_trait]
    impl TranscriptRenderer for StaticRenderer {
        async fn render(&self, channel_id: &str) -> Result<Transcript, TranscriptError> {
            if channel_id == "404" {
                return Err(TranscriptError::ChannelNotFound(channel_id.to_string()));
            }
            Ok(Transcript {
                filename: format!("{channel_id}.html"),
                bytes: Bytes::from_static(b"<html></html>"),
            })
        }
    }

    #[tokio::test]
    async fn test_missing_input_makes_no_store_calls() {
        let store = Arc::new(MemoryStore::with_branch("main").unwrap());
        let service = ArtifactService::new(store.clone(), Strategy::GitData, policy());

        for (name, content) in [(None, Some("x")), (Some("a.html"), None), (Some(" "), Some("x")), (Some("a"), Some(""))] {
            let err = service.store_content(name, content).await.unwrap_err();
            assert_eq!(err.status(), 400);
        }
        let err = service.store_content(Some("a/../b"), Some("x")).await.unwrap_err();
        assert_eq!(err.category(), "invalid_input");
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_store_content_receipt() {
        let store = Arc::new(MemoryStore::with_branch("main").unwrap());
        let service = ArtifactService::new(store.clone(), Strategy::GitData, policy());

        let receipt = service
            .store_content(Some("notes/a.html"), Some("<p>hi</p>"))
            .await
            .unwrap();
        assert_eq!(receipt.status(), 201);
        assert_eq!(
            receipt.url,
            "https://raw.githubusercontent.com/octo/notes/main/notes/a.html"
        );
        assert_eq!(receipt.commit, store.branch_tip("main").map(|c| c.to_string()));
    }

    #[tokio::test]
    async fn test_update_reports_200() {
        let store = Arc::new(MemoryStore::with_branch("main").unwrap());
        let service = ArtifactService::new(store, Strategy::Contents, policy());

        let first = service.store_content(Some("a.html"), Some("1")).await.unwrap();
        assert_eq!(first.status(), 201);
        let second = service.store_content(Some("a.html"), Some("2")).await.unwrap();
        assert_eq!(second.status(), 200);
        assert!(second.message.contains("updated"));
    }

    #[tokio::test]
    async fn test_suffix_policy() {
        let store = Arc::new(MemoryStore::with_branch("main").unwrap());
        let mut policy = policy();
        policy.required_suffix = Some(".html".to_string());
        let service = ArtifactService::new(store.clone(), Strategy::Contents, policy);

        let err = service.store_content(Some("a.txt"), Some("x")).await.unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_branch_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let service = ArtifactService::new(store, Strategy::GitData, policy());

        let err = service.store_content(Some("a.html"), Some("x")).await.unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn test_store_transcript() {
        let store = Arc::new(MemoryStore::with_branch("main").unwrap());
        let service = ArtifactService::new(store.clone(), Strategy::GitData, policy())
            .with_renderer(Arc::new(StaticRenderer));

        let receipt = service.store_transcript(Some("42")).await.unwrap();
        assert_eq!(receipt.path, "transcripts/42.html");
        assert!(receipt.url.ends_with("/main/transcripts/42.html"));

        let tip = store.branch_tip("main").unwrap();
        assert_eq!(
            store.commit(&tip).unwrap().message,
            "Add transcript for channel 42"
        );

        let err = service.store_transcript(Some("404")).await.unwrap_err();
        assert_eq!(err.status(), 404);
        let err = service.store_transcript(None).await.unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn test_transcript_without_renderer() {
        let store = Arc::new(MemoryStore::with_branch("main").unwrap());
        let service = ArtifactService::new(store, Strategy::GitData, policy());

        let err = service.store_transcript(Some("42")).await.unwrap_err();
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn test_store_error_mapping() {
        let cases = [
            (StoreError::NotFound("x".into()), 404),
            (StoreError::InvalidBase("x".into()), 404),
            (StoreError::Conflict("x".into()), 409),
            (StoreError::InvalidPath("x".into()), 400),
            (
                StoreError::Upstream {
                    status: 500,
                    message: "boom".into(),
                },
                502,
            ),
            (StoreError::Malformed("x".into()), 502),
        ];
        for (err, status) in cases {
            assert_eq!(ArtifactError::from(err).status(), status);
        }
    }
}
