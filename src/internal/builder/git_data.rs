//! Low-level builder: composes blob, tree, commit and ref primitives into one
//! branch advance.
//!
//! ```text
//! resolve_branch ──► create_blob ──► create_tree(base = tip tree)
//!        │                                   │
//!        └── tip commit ──► create_commit(parents = [tip]) ──► update_branch(expected = tip)
//! ```
//!
//! The tip read in the first step is the base snapshot. If the branch moves before
//! `update_branch`, the update fails with [`StoreError::Conflict`] and the blob,
//! tree and commit created so far stay behind unreferenced.
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use super::{ArtifactRequest, CommitBuilder, Strategy, WriteOutcome};
use crate::internal::store::{ObjectId, ObjectStore, StoreError, TreeEntry};

pub struct GitDataBuilder {
    store: Arc<dyn ObjectStore>,
}

impl GitDataBuilder {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Commits several files at once. Later requests for the same path win.
    ///
    /// Returns one outcome per distinct path, all sharing the same commit.
    pub async fn write_batch(
        &self,
        branch: &str,
        requests: &[ArtifactRequest],
        message: &str,
    ) -> Result<Vec<WriteOutcome>, StoreError> {
        // last write wins: keep each path's final request, in first-seen order
        let mut order: Vec<&str> = Vec::new();
        let mut latest: HashMap<&str, &ArtifactRequest> = HashMap::new();
        for request in requests {
            if latest.insert(request.path.as_str(), request).is_none() {
                order.push(request.path.as_str());
            }
        }
        if order.is_empty() {
            return Err(StoreError::InvalidPath("empty batch".to_string()));
        }

        let tip = self.store.resolve_branch(branch).await?;
        tracing::debug!(branch, tip = tip.commit.short(), files = order.len(), "base snapshot");

        let mut entries = Vec::with_capacity(order.len());
        for path in &order {
            let blob = self.store.create_blob(&latest[path].content).await?;
            entries.push(TreeEntry::file(*path, blob));
        }

        let commit = self.commit_entries(branch, &tip.tree, &tip.commit, &entries, message).await?;

        Ok(entries
            .into_iter()
            .map(|entry| WriteOutcome {
                path: entry.path,
                object_id: entry.blob,
                commit: Some(commit.clone()),
                previous: Some(tip.commit.clone()),
                created: true,
                html_url: None,
            })
            .collect())
    }

    async fn commit_entries(
        &self,
        branch: &str,
        base_tree: &ObjectId,
        parent: &ObjectId,
        entries: &[TreeEntry],
        message: &str,
    ) -> Result<ObjectId, StoreError> {
        let tree = self.store.create_tree(base_tree, entries).await?;
        let commit = self
            .store
            .create_commit(&tree, std::slice::from_ref(parent), message)
            .await?;

        if let Err(e) = self.store.update_branch(branch, &commit, parent, false).await {
            if matches!(e, StoreError::Conflict(_)) {
                tracing::warn!(
                    branch,
                    expected = parent.short(),
                    orphaned = commit.short(),
                    "branch moved during write; commit left unreferenced"
                );
            }
            return Err(e);
        }
        Ok(commit)
    }
}

#[async_trait]
impl CommitBuilder for GitDataBuilder {
    fn strategy(&self) -> Strategy {
        Strategy::GitData
    }

    async fn write(
        &self,
        branch: &str,
        request: &ArtifactRequest,
    ) -> Result<WriteOutcome, StoreError> {
        let tip = self.store.resolve_branch(branch).await?;
        tracing::debug!(branch, tip = tip.commit.short(), "base snapshot");

        let blob = self.store.create_blob(&request.content).await?;
        let message = request
            .message
            .clone()
            .unwrap_or_else(|| format!("Add {}", request.path));
        let entries = [TreeEntry::file(request.path.clone(), blob.clone())];
        let commit = self
            .commit_entries(branch, &tip.tree, &tip.commit, &entries, &message)
            .await?;

        Ok(WriteOutcome {
            path: request.path.clone(),
            object_id: blob,
            commit: Some(commit),
            previous: Some(tip.commit),
            created: true,
            html_url: None,
        })
    }
}
