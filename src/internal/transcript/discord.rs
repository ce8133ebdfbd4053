//! Discord REST renderer.
//!
//! The bot logs in lazily: the first render checks the token against
//! `GET /users/@me` through a [`ReadinessGate`], concurrent renders wait on that
//! same attempt, and later renders skip it.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use url::Url;

use super::{
    Transcript, TranscriptError, TranscriptRenderer,
    gate::ReadinessGate,
    html::{self, AttachmentView, ChannelView, MessageView},
};
use crate::{internal::config::ChatSettings, utils::http};

/// Discord caps a single history page at 100 messages.
const PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct BotSession {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Author {
    username: String,
    #[serde(default)]
    global_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    filename: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
    #[serde(default)]
    content: String,
    timestamp: DateTime<Utc>,
    author: Author,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        MessageView {
            author: message
                .author
                .global_name
                .unwrap_or(message.author.username),
            timestamp: message.timestamp,
            content: message.content,
            attachments: message
                .attachments
                .into_iter()
                .map(|a| AttachmentView {
                    filename: a.filename,
                    url: a.url,
                })
                .collect(),
        }
    }
}

pub struct DiscordRenderer {
    http_client: HttpClient,
    api_url: Url,
    token: Option<String>,
    max_messages: usize,
    session: ReadinessGate<BotSession>,
}

impl fmt::Debug for DiscordRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordRenderer")
            .field("api_url", &self.api_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("max_messages", &self.max_messages)
            .field("ready", &self.session.is_ready())
            .finish()
    }
}

impl DiscordRenderer {
    pub fn new(
        api_url: &str,
        token: Option<String>,
        max_messages: usize,
        timeout: Duration,
    ) -> Result<Self, TranscriptError> {
        let api_url = Url::parse(api_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| TranscriptError::Login(format!("invalid chat API url '{api_url}'")))?;
        Ok(Self {
            http_client: http::client(timeout),
            api_url,
            token,
            max_messages: max_messages.max(1),
            session: ReadinessGate::new(),
        })
    }

    pub fn from_settings(settings: &ChatSettings) -> Result<Self, TranscriptError> {
        Self::new(
            &settings.api_url,
            settings.token.clone(),
            settings.max_messages,
            Duration::from_secs(30),
        )
    }

    pub fn session(&self) -> Option<&BotSession> {
        self.session.get()
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, TranscriptError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| TranscriptError::Login("chat API url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, TranscriptError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| TranscriptError::Login("no chat token configured".to_string()))?;
        Ok(request.header("Authorization", format!("Bot {token}")))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<(StatusCode, T), TranscriptError> {
        let response = self.authorized(request)?.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.message)
                .unwrap_or(text);
            return Err(TranscriptError::Upstream {
                status: status.as_u16(),
                message,
            });
        }
        Ok((status, serde_json::from_str(&text)?))
    }

    async fn login(&self) -> Result<BotSession, TranscriptError> {
        let url = self.url(["users", "@me"])?;
        match self.execute::<BotSession>(self.http_client.get(url)).await {
            Ok((_, session)) => {
                tracing::info!(user = %session.username, "chat client ready");
                Ok(session)
            }
            Err(TranscriptError::Upstream { status, message }) => {
                Err(TranscriptError::Login(format!("{status}: {message}")))
            }
            Err(e) => Err(e),
        }
    }

    /// Blocks until the bot is logged in, logging in at most once concurrently.
    pub async fn ensure_ready(&self) -> Result<&BotSession, TranscriptError> {
        self.session.ready(|| self.login()).await
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<Channel, TranscriptError> {
        let url = self.url(["channels", channel_id])?;
        match self.execute::<Channel>(self.http_client.get(url)).await {
            Ok((_, channel)) => Ok(channel),
            Err(TranscriptError::Upstream { status: 404, .. }) => {
                Err(TranscriptError::ChannelNotFound(channel_id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Newest-first history, at most `max_messages` entries.
    async fn fetch_messages(&self, channel_id: &str) -> Result<Vec<Message>, TranscriptError> {
        let mut messages: Vec<Message> = Vec::new();
        let mut before: Option<String> = None;

        while messages.len() < self.max_messages {
            let limit = PAGE_LIMIT.min(self.max_messages - messages.len());
            let url = self.url(["channels", channel_id, "messages"])?;
            let mut query = vec![("limit", limit.to_string())];
            if let Some(before) = &before {
                query.push(("before", before.clone()));
            }
            let (_, page): (_, Vec<Message>) = self
                .execute(self.http_client.get(url).query(&query))
                .await?;

            let page_len = page.len();
            before = page.last().map(|m| m.id.clone());
            messages.extend(page);
            tracing::debug!(channel_id, page_len, total = messages.len(), "fetched history page");
            if page_len < limit {
                break;
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl TranscriptRenderer for DiscordRenderer {
    async fn render(&self, channel_id: &str) -> Result<Transcript, TranscriptError> {
        self.ensure_ready().await?;
        let channel = self.fetch_channel(channel_id).await?;
        let mut messages = self.fetch_messages(&channel.id).await?;
        messages.reverse();

        let view = ChannelView {
            id: channel.id.clone(),
            name: channel.name,
        };
        let messages: Vec<MessageView> = messages.into_iter().map(MessageView::from).collect();
        let document = html::render_document(&view, &messages, Utc::now())?;
        tracing::info!(channel_id, messages = messages.len(), "rendered transcript");

        Ok(Transcript {
            filename: format!("{}.html", channel.id),
            bytes: Bytes::from(document),
        })
    }
}
