// src/sobriquet/mod.rs

//! Nickname observation and re-surfacing.
//!
//! Two independent flows share the profile store: the observe flow builds an
//! analysis job from a chat turn and hands it to a background consumer that
//! asks the mapping model for user-to-nickname pairs and counts confirmed
//! ones; the inject flow reads aggregated counts back, picks a small
//! usage-weighted subset, and renders it for a downstream prompt builder.

pub mod interpreter;
pub mod pipeline;
pub mod prompt;
pub mod selector;
pub mod types;

pub use interpreter::ResponseInterpreter;
pub use pipeline::SobriquetPipeline;
pub use selector::{SelectedSobriquet, UserSobriquets, format_injection, select_for_prompt};
pub use types::{AnalysisJob, ExtractionResult};
