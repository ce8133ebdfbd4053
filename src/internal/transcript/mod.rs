//! Chat transcript rendering.
//!
//! A [`TranscriptRenderer`] turns a channel id into a self-contained document and
//! a suggested filename. [`discord::DiscordRenderer`] is the bundled implementation.

pub mod discord;
pub mod gate;
pub mod html;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Rendered transcript ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub filename: String,
    pub bytes: Bytes,
}

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("chat login failed: {0}")]
    Login(String),

    #[error("chat API error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("HttpError: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JsonError: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TemplateError: {0}")]
    Template(#[from] askama::Error),
}

#[async_trait]
pub trait TranscriptRenderer: Send + Sync {
    async fn render(&self, channel_id: &str) -> Result<Transcript, TranscriptError>;
}
