// src/history/mod.rs

//! Seam for the chat-history collaborator plus transcript rendering for the
//! mapping prompt.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One message as observed in a group chat stream.
#[derive(Debug, Clone)]
pub struct MessageSnapshot {
    pub user_id: String,
    /// Display name the platform showed for the sender at the time, if any.
    pub display_name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Supplies ordered message snapshots for a conversation.
#[async_trait]
pub trait ChatHistory: Send + Sync {
    /// Messages in the group before `before`, oldest first, at most `limit`.
    async fn recent_messages(
        &self,
        platform: &str,
        group_id: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MessageSnapshot>>;
}

/// Render messages into the readable transcript fed to the mapping prompt,
/// one line per message with a coarse relative timestamp.
pub fn render_transcript(messages: &[MessageSnapshot], now: DateTime<Utc>) -> String {
    let mut lines = Vec::with_capacity(messages.len());
    for msg in messages {
        let name = msg.display_name.as_deref().unwrap_or(&msg.user_id);
        lines.push(format!(
            "({}) {}: {}",
            relative_age(msg.timestamp, now),
            name,
            msg.text
        ));
    }
    lines.join("\n")
}

fn relative_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}
