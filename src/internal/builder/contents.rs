//! High-level builder: one existence read, one guarded create-or-update.
use std::sync::Arc;

use async_trait::async_trait;

use super::{ArtifactRequest, CommitBuilder, Strategy, WriteOutcome};
use crate::internal::store::{ObjectStore, StoreError};

pub struct ContentsBuilder {
    store: Arc<dyn ObjectStore>,
}

impl ContentsBuilder {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CommitBuilder for ContentsBuilder {
    fn strategy(&self) -> Strategy {
        Strategy::Contents
    }

    async fn write(
        &self,
        branch: &str,
        request: &ArtifactRequest,
    ) -> Result<WriteOutcome, StoreError> {
        let previous = match self.store.get_path_content(branch, &request.path).await {
            Ok(existing) => Some(existing.object_id),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        tracing::debug!(
            branch,
            path = %request.path,
            exists = previous.is_some(),
            "checked path"
        );

        let message = request
            .message
            .clone()
            .unwrap_or_else(|| format!("Add or update file: {}", request.path));
        let outcome = self
            .store
            .put_path_content(
                branch,
                &request.path,
                &request.content,
                &message,
                previous.as_ref(),
            )
            .await?;

        Ok(WriteOutcome {
            path: request.path.clone(),
            object_id: outcome.object_id,
            commit: outcome.commit,
            previous,
            created: outcome.created,
            html_url: outcome.html_url,
        })
    }
}
