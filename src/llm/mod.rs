// src/llm/mod.rs

//! Seam for the external text-generation model. The pipeline only needs
//! request/response semantics; the response is treated as untrusted text.

use anyhow::Result;
use async_trait::async_trait;

/// A text-generation backend (hosted model, local model, or a scripted test double).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce a raw completion for the given prompt. No output format is
    /// guaranteed; callers parse defensively.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
