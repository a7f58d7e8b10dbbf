// src/sobriquet/types.rs

use std::collections::HashMap;

/// One unit of work: "check this conversation snippet for nickname mentions."
/// Built per triggering chat turn, consumed at most once, never persisted.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    /// Readable rendering of the recent group history.
    pub transcript: String,
    /// The bot's own latest reply, joined into one string.
    pub bot_reply: String,
    pub platform: String,
    pub group_id: String,
    /// Platform user id to the display name shown in the prompt. The bot's
    /// own entry carries the `(self)` marker.
    pub display_names: HashMap<String, String>,
}

/// Outcome of interpreting one model completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub exists: bool,
    /// Platform user id to confirmed nickname; empty unless `exists`.
    pub mapping: HashMap<String, String>,
}

impl ExtractionResult {
    pub fn none() -> Self {
        Self {
            exists: false,
            mapping: HashMap::new(),
        }
    }
}
