//! Tolerant JSON extraction from a model response (§9: "LLM JSON output is
//! unreliable... load-bearing and must be reproduced" at every call site
//! expecting structured output). Cascade: raw parse, then a fenced
//! ` ```json ` block, then the first `{` through the last `}`. Never
//! panics; returns `None` on exhaustion of every strategy.

use serde_json::Value;

/// Extracts a JSON value from `text`, tolerating prose wrapping or a fenced
/// code block around the actual payload.
#[must_use]
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    if let Some(start) = text.find("```json") {
        let body_start = start + "```json".len();
        if let Some(relative_end) = text[body_start..].find("```") {
            let snippet = text[body_start..body_start + relative_end].trim();
            if let Ok(value) = serde_json::from_str(snippet) {
                return Some(value);
            }
        }
    }

    let start = text.find('{');
    let end = text.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                return Some(value);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_json_parses_directly() {
        assert_eq!(extract_json(r#"{"path": "/tmp/x"}"#), Some(json!({"path": "/tmp/x"})));
    }

    #[test]
    fn fenced_code_block_is_extracted() {
        let text = "Here is the fix:\n```json\n{\"path\": \"/tmp/x\"}\n```\nDone.";
        assert_eq!(extract_json(text), Some(json!({"path": "/tmp/x"})));
    }

    #[test]
    fn surrounding_prose_is_stripped_via_brace_scan() {
        let text = "Sure, the fixed inputs are {\"path\": \"/tmp/x\"} as requested.";
        assert_eq!(extract_json(text), Some(json!({"path": "/tmp/x"})));
    }

    #[test]
    fn unparseable_text_returns_none() {
        assert_eq!(extract_json("I cannot help with that."), None);
    }
}
