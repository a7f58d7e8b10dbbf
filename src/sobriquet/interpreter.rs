// src/sobriquet/interpreter.rs

//! Turns a raw model completion into a validated nickname mapping.
//!
//! Models wrap output in prose and code fences, so extraction is tolerant
//! best-effort; anything that fails to parse or validate degrades to a "no
//! mapping" result rather than an error. Hosts that move to a strict
//! structured-output mode only need to swap this type.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SobriquetConfig;
use crate::identity::SELF_MARKER;
use crate::sobriquet::types::ExtractionResult;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced json regex"));

pub struct ResponseInterpreter {
    min_length: usize,
    max_length: usize,
    bot_display_name: String,
}

impl ResponseInterpreter {
    pub fn new(config: &SobriquetConfig) -> Self {
        Self {
            min_length: config.min_length,
            max_length: config.max_length,
            bot_display_name: config.bot_display_name.clone(),
        }
    }

    /// Parse and validate one completion. `display_names` is the same map the
    /// prompt was built from; it is used to recognize the bot's own entry.
    pub fn interpret(
        &self,
        raw: &str,
        display_names: &HashMap<String, String>,
    ) -> ExtractionResult {
        let Some(candidate) = extract_json_candidate(raw) else {
            debug!("completion contains no JSON object");
            return ExtractionResult::none();
        };

        let value: Value = match serde_json::from_str(&candidate) {
            Ok(value) => value,
            Err(e) => {
                warn!("failed to parse mapping JSON: {e}");
                return ExtractionResult::none();
            }
        };
        let Some(object) = value.as_object() else {
            warn!("mapping JSON is not an object");
            return ExtractionResult::none();
        };

        let Some(is_exist) = object.get("is_exist").and_then(Value::as_bool) else {
            warn!("mapping JSON has no boolean is_exist");
            return ExtractionResult::none();
        };
        if !is_exist {
            debug!("model reported no nickname mapping");
            return ExtractionResult::none();
        }

        let Some(data) = object
            .get("data")
            .and_then(Value::as_object)
            .filter(|data| !data.is_empty())
        else {
            warn!("is_exist is true but data is missing or empty");
            return ExtractionResult::none();
        };

        let mapping = self.filter_mapping(data, display_names);
        if mapping.is_empty() {
            info!("every candidate mapping was filtered out");
            return ExtractionResult::none();
        }

        info!("confirmed {} nickname mapping(s)", mapping.len());
        ExtractionResult {
            exists: true,
            mapping,
        }
    }

    /// Each check vetoes independently: the bot itself, blank values, and
    /// out-of-bounds lengths all drop the entry. Survivors are trimmed.
    fn filter_mapping(
        &self,
        data: &serde_json::Map<String, Value>,
        display_names: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut filtered = HashMap::new();

        for (user_id, value) in data {
            let Some(nickname) = value.as_str() else {
                continue;
            };

            let display = display_names
                .get(user_id)
                .map(String::as_str)
                .unwrap_or_default();
            if display.contains(SELF_MARKER) || display == self.bot_display_name {
                debug!("dropping mapping for the bot itself (user {user_id})");
                continue;
            }

            let cleaned = nickname.trim();
            if cleaned.is_empty() {
                continue;
            }

            let length = cleaned.chars().count();
            if length < self.min_length || length > self.max_length {
                debug!(
                    "dropping nickname '{cleaned}' for user {user_id}: length {length} outside {}..={}",
                    self.min_length, self.max_length
                );
                continue;
            }

            filtered.insert(user_id.clone(), cleaned.to_string());
        }

        filtered
    }
}

/// Best-effort extraction of a JSON object from untrusted model text:
/// fenced code block first, then the whole trimmed text, then the outermost
/// brace-delimited substring.
fn extract_json_candidate(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(caps) = FENCED_JSON.captures(trimmed) {
        return Some(caps[1].trim().to_string());
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed.to_string());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (start < end).then(|| trimmed[start..=end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter(min: usize, max: usize) -> ResponseInterpreter {
        ResponseInterpreter::new(&SobriquetConfig {
            min_length: min,
            max_length: max,
            bot_display_name: "TestBot".to_string(),
            ..SobriquetConfig::default()
        })
    }

    fn names(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect()
    }

    #[test]
    fn extracts_from_fenced_block() {
        let raw = "Sure, here you go:\n```json\n{\"is_exist\": true, \"data\": {\"u1\": \"Old Zhang\"}}\n```\nHope that helps.";
        let result = interpreter(1, 15).interpret(raw, &names(&[("u1", "Zhang San")]));
        assert!(result.exists);
        assert_eq!(result.mapping["u1"], "Old Zhang");
    }

    #[test]
    fn extracts_bare_object() {
        let raw = "  {\"is_exist\": true, \"data\": {\"u1\": \"Old Zhang\"}}  ";
        let result = interpreter(1, 15).interpret(raw, &names(&[("u1", "Zhang San")]));
        assert!(result.exists);
    }

    #[test]
    fn extracts_embedded_object() {
        let raw = "The answer is {\"is_exist\": true, \"data\": {\"u1\": \"Old Zhang\"}} as requested";
        let result = interpreter(1, 15).interpret(raw, &names(&[("u1", "Zhang San")]));
        assert!(result.exists);
        assert_eq!(result.mapping["u1"], "Old Zhang");
    }

    #[test]
    fn no_json_is_a_quiet_negative() {
        let result = interpreter(1, 15).interpret("no mappings here, sorry", &HashMap::new());
        assert_eq!(result, ExtractionResult::none());
    }

    #[test]
    fn unparseable_json_degrades() {
        let result = interpreter(1, 15).interpret("{is_exist: yes}", &HashMap::new());
        assert!(!result.exists);
    }

    #[test]
    fn missing_or_non_boolean_is_exist_degrades() {
        let interp = interpreter(1, 15);
        assert!(!interp.interpret("{\"data\": {\"u1\": \"x\"}}", &HashMap::new()).exists);
        assert!(
            !interp
                .interpret("{\"is_exist\": \"true\"}", &HashMap::new())
                .exists
        );
    }

    #[test]
    fn exists_without_data_degrades() {
        let interp = interpreter(1, 15);
        assert!(!interp.interpret("{\"is_exist\": true}", &HashMap::new()).exists);
        assert!(
            !interp
                .interpret("{\"is_exist\": true, \"data\": {}}", &HashMap::new())
                .exists
        );
    }

    #[test]
    fn explicit_negative_is_quiet() {
        let result = interpreter(1, 15).interpret("{\"is_exist\": false}", &HashMap::new());
        assert!(!result.exists);
    }

    #[test]
    fn filters_bot_blank_and_length_bounds() {
        let display = names(&[
            ("bot_id", "TestBot(self)"),
            ("userA", "Alice"),
            ("userB", "Bob"),
            ("userC", "Carol"),
        ]);
        let raw = r#"{"is_exist": true, "data": {
            "bot_id": "Botty",
            "userA": "   ",
            "userB": "ab",
            "userC": "valid_name",
            "userD": "this_nickname_is_far_too_long"
        }}"#;

        let result = interpreter(2, 10).interpret(raw, &display);
        assert!(result.exists);
        assert!(!result.mapping.contains_key("bot_id"));
        assert!(!result.mapping.contains_key("userA"));
        assert_eq!(result.mapping["userB"], "ab");
        assert_eq!(result.mapping["userC"], "valid_name");
        assert!(!result.mapping.contains_key("userD"));
    }

    #[test]
    fn bot_detected_by_configured_display_name() {
        let display = names(&[("bot_id", "TestBot")]);
        let raw = r#"{"is_exist": true, "data": {"bot_id": "Botty"}}"#;
        let result = interpreter(1, 15).interpret(raw, &display);
        assert!(!result.exists, "only the bot survived, so the mapping is empty");
    }

    #[test]
    fn survivors_are_trimmed() {
        let display = names(&[("u1", "Zhang San")]);
        let raw = r#"{"is_exist": true, "data": {"u1": "  Old Zhang  "}}"#;
        let result = interpreter(1, 15).interpret(raw, &display);
        assert_eq!(result.mapping["u1"], "Old Zhang");
    }

    #[test]
    fn all_filtered_means_no_result() {
        let display = names(&[("u1", "Zhang San")]);
        let raw = r#"{"is_exist": true, "data": {"u1": "this_nickname_is_far_too_long"}}"#;
        let result = interpreter(1, 10).interpret(raw, &display);
        assert_eq!(result, ExtractionResult::none());
    }
}
