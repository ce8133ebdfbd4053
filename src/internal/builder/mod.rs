//! Commit builders: turn one artifact into one new commit on a branch.
//!
//! Two strategies share the [`CommitBuilder`] interface and are picked once at
//! construction time:
//! - [`Strategy::Contents`] ([`contents::ContentsBuilder`]): existence read plus a single
//!   create-or-update call guarded by the path's object id. Default.
//! - [`Strategy::GitData`] ([`git_data::GitDataBuilder`]): blob → tree → commit → ref
//!   fast-forward guarded by the previously observed tip.
//!
//! Neither strategy retries. A [`StoreError::Conflict`] means another writer got there
//! first; re-running the whole write is safe.

pub mod contents;
pub mod git_data;

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::internal::store::{ObjectId, ObjectStore, StoreError};

/// How a builder writes into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Path-level create-or-update (GitHub Contents API).
    #[default]
    Contents,
    /// Explicit blob/tree/commit construction and ref update (GitHub Git Data API).
    GitData,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Contents => f.write_str("contents"),
            Strategy::GitData => f.write_str("git-data"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contents" | "high-level" => Ok(Strategy::Contents),
            "git-data" | "git_data" | "low-level" => Ok(Strategy::GitData),
            other => Err(format!(
                "unknown strategy '{other}', expected 'contents' or 'git-data'"
            )),
        }
    }
}

/// One file to persist: target path plus raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    pub path: String,
    pub content: Bytes,
    /// Overrides the strategy's default commit message.
    pub message: Option<String>,
}

impl ArtifactRequest {
    pub fn new(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// What a successful write produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub path: String,
    /// Blob id of the stored content.
    pub object_id: ObjectId,
    /// Commit that introduced the content, when the store reports it.
    pub commit: Option<ObjectId>,
    /// Tip (git-data) or path object id (contents) observed before the write.
    pub previous: Option<ObjectId>,
    /// `false` only when an existing path was overwritten.
    pub created: bool,
    pub html_url: Option<String>,
}

#[async_trait]
pub trait CommitBuilder: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Persists `request` on `branch`, failing closed on any concurrent change.
    async fn write(
        &self,
        branch: &str,
        request: &ArtifactRequest,
    ) -> Result<WriteOutcome, StoreError>;
}

/// Builds the builder for `strategy` over `store`.
pub fn for_strategy(strategy: Strategy, store: Arc<dyn ObjectStore>) -> Arc<dyn CommitBuilder> {
    match strategy {
        Strategy::Contents => Arc::new(contents::ContentsBuilder::new(store)),
        Strategy::GitData => Arc::new(git_data::GitDataBuilder::new(store)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::store::memory::MemoryStore;

    #[test]
    fn test_strategy_parse_and_display() {
        assert_eq!("git-data".parse::<Strategy>().unwrap(), Strategy::GitData);
        assert_eq!("Contents".parse::<Strategy>().unwrap(), Strategy::Contents);
        assert!("merge".parse::<Strategy>().is_err());
        assert_eq!(Strategy::GitData.to_string(), "git-data");
    }

    #[test]
    fn test_for_strategy_picks_implementation() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        assert_eq!(
            for_strategy(Strategy::GitData, store.clone()).strategy(),
            Strategy::GitData
        );
        assert_eq!(
            for_strategy(Strategy::Contents, store).strategy(),
            Strategy::Contents
        );
    }
}
