// src/identity/mod.rs

//! Seams for the identity-resolution and display-name collaborators.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

/// Marker appended to the bot's own display name so downstream filtering can
/// recognize it without a side channel.
pub const SELF_MARKER: &str = "(self)";

/// Maps a `(platform, platform user id)` pair to a stable person key.
#[async_trait]
pub trait PersonResolver: Send + Sync {
    /// Returns the person key for the account, or `None` when the account is
    /// unknown. Absence is an expected outcome, not an error.
    async fn resolve_person_key(&self, platform: &str, user_id: &str) -> Result<Option<String>>;
}

/// Batch lookup of human-readable names for platform accounts.
#[async_trait]
pub trait DisplayNameResolver: Send + Sync {
    /// Returns a map of user id to display name. Ids without a known name are
    /// simply absent from the result.
    async fn display_names(
        &self,
        platform: &str,
        user_ids: &[String],
    ) -> Result<HashMap<String, String>>;
}
