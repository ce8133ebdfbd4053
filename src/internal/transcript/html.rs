//! Self-contained HTML rendering of a channel's messages.

use askama::Template;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ChannelView {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AttachmentView {
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct MessageView {
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub attachments: Vec<AttachmentView>,
}

/// Page model for `templates/transcript.html`; askama escapes every field.
#[derive(Template)]
#[template(path = "transcript.html")]
struct TranscriptPage<'a> {
    title: String,
    count: usize,
    generated: String,
    messages: Vec<MessageRow<'a>>,
}

struct MessageRow<'a> {
    author: &'a str,
    time: String,
    content: &'a str,
    attachments: Vec<&'a AttachmentView>,
}

impl<'a> From<&'a MessageView> for MessageRow<'a> {
    fn from(message: &'a MessageView) -> Self {
        Self {
            author: &message.author,
            time: message.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            content: &message.content,
            attachments: message.attachments.iter().collect(),
        }
    }
}

/// Renders `messages` (oldest first) as one HTML document.
pub fn render_document(
    channel: &ChannelView,
    messages: &[MessageView],
    generated_at: DateTime<Utc>,
) -> askama::Result<String> {
    let title = match &channel.name {
        Some(name) => format!("#{name}"),
        None => channel.id.clone(),
    };
    TranscriptPage {
        title,
        count: messages.len(),
        generated: generated_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        messages: messages.iter().map(MessageRow::from).collect(),
    }
    .render()
}
