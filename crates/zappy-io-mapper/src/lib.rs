#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Bridges the gap between planner-synthesised actions and a skill's strict
//! input/output contract (§4.9): resolves dotted references into concrete
//! values, fuzzy-maps near-miss parameter names, infers a missing `action`
//! enum value from the step's description, coerces loosely-typed values, and
//! smart-maps a skill's raw output onto its declared output schema.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::{json, Value};
use zappy_core::action::Action;
use zappy_core::error::RuntimeError;
use zappy_core::execution::ExecutionState;
use zappy_core::skill::SkillMetadata;

/// Synonym tables for fuzzy input-parameter mapping (§4.9 step 1).
static INPUT_SYNONYMS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    HashMap::from([
        ("path", vec!["file_path", "filename", "file_name", "key", "target", "uri", "location", "path_to_file"]),
        ("content", vec!["data", "text", "body", "payload", "message", "value", "content_body"]),
        ("action", vec!["operation", "op", "method", "task", "mode", "act"]),
        ("query", vec!["q", "search_term", "text", "message", "prompt", "question"]),
        ("message", vec!["text", "msg", "content", "query", "prompt", "input_text"]),
        ("url", vec!["uri", "link", "address", "website", "site"]),
        ("location", vec!["city", "place", "address", "town", "region", "target_location"]),
    ])
});

/// Synonym table for smart output-key mapping (§4.9 `validate_output`).
static OUTPUT_SYNONYMS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    HashMap::from([
        ("content", vec!["data", "text", "body", "file_content", "result", "message"]),
        ("reply", vec!["response", "answer", "text", "message", "output"]),
        ("status", vec!["success", "message", "result", "state"]),
    ])
});

/// Resolves every input for `action`: static inputs, then inline
/// `action_id.key` string references, then the explicit `reference_map`
/// (which overrides both), then — if `skill` metadata is supplied — smart
/// schema alignment via [`auto_map_to_schema`].
pub fn resolve_inputs(
    action: &Action,
    state: &ExecutionState,
    skill: Option<&SkillMetadata>,
) -> Result<HashMap<String, Value>, RuntimeError> {
    let mut resolved: HashMap<String, Value> = action
        .inputs
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    for (key, value) in &action.inputs {
        if let Some(text) = value.as_str() {
            if text.starts_with("action_") && text.contains('.') {
                if let Some(resolved_value) = state.resolve(text) {
                    resolved.insert(key.clone(), resolved_value.clone());
                }
            }
        }
    }

    for (param_name, reference) in &action.reference_map {
        let value = state.resolve(reference).ok_or_else(|| {
            RuntimeError::Validation(format!(
                "action {}: cannot resolve input reference '{reference}'",
                action.id
            ))
        })?;
        resolved.insert(param_name.clone(), value.clone());
    }

    if let Some(metadata) = skill {
        resolved = auto_map_to_schema(resolved, metadata, &action.description);
    }

    Ok(resolved)
}

/// Self-healing alignment between loosely-specified planner inputs and a
/// skill's strict schema (§4.9 step 2): fuzzy parameter synonyms, semantic
/// action-enum inference from the step description, and type coercion.
#[must_use]
pub fn auto_map_to_schema(inputs: HashMap<String, Value>, metadata: &SkillMetadata, description: &str) -> HashMap<String, Value> {
    let (properties, required) = schema_properties(&metadata.input_schema);
    let mut mapped = inputs;

    let missing_required: Vec<&String> = required.iter().filter(|key| !mapped.contains_key(*key)).collect();
    for missing in missing_required {
        if let Some(candidates) = INPUT_SYNONYMS.get(missing.as_str()) {
            if let Some(value) = candidates.iter().find_map(|alt| mapped.get(*alt).cloned()) {
                mapped.insert(missing.clone(), value);
            }
        }
    }

    let target_action_key = if properties.contains_key("action") {
        Some("action")
    } else if properties.contains_key("operation") {
        Some("operation")
    } else {
        None
    };
    if let Some(key) = target_action_key {
        if !mapped.contains_key(key) && !description.is_empty() {
            if let Some(enum_values) = properties.get(key).and_then(|p| p.get("enum")).and_then(Value::as_array) {
                let desc_lower = description.to_lowercase();
                for candidate in enum_values {
                    let Some(candidate) = candidate.as_str() else { continue };
                    let stem = candidate.split('_').next().unwrap_or(candidate).to_lowercase();
                    if stem.len() > 3 && desc_lower.contains(&stem) {
                        mapped.insert(key.to_string(), Value::from(candidate));
                        break;
                    }
                }
            }
        }
    }

    for (key, expected_type) in &properties {
        let Some(value) = mapped.get(key) else { continue };
        let Some(expected_type) = expected_type.get("type").and_then(Value::as_str) else { continue };
        let coerced = coerce(value, expected_type);
        if let Some(coerced) = coerced {
            mapped.insert(key.clone(), coerced);
        }
    }

    mapped
}

fn coerce(value: &Value, expected_type: &str) -> Option<Value> {
    match expected_type {
        "integer" => value.as_str().filter(|s| s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty()).and_then(|s| s.parse::<i64>().ok()).map(Value::from),
        "boolean" => value.as_str().and_then(|s| match s.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(Value::Bool(true)),
            "false" | "no" | "0" | "off" => Some(Value::Bool(false)),
            _ => None,
        }),
        "string" if !value.is_string() => {
            if value.is_array() || value.is_object() {
                serde_json::to_string_pretty(value).ok().map(Value::from)
            } else {
                Some(Value::from(value.to_string()))
            }
        }
        _ => None,
    }
}

/// Normalises a skill's `input_schema`/`output_schema` shape — either a
/// JSON-Schema object with `properties`/`required`, or a bare
/// `{name: type_string}` map — into `(properties, required)`.
fn schema_properties(schema: &Value) -> (HashMap<String, Value>, Vec<String>) {
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        let required: Vec<String> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        return (properties.iter().map(|(k, v)| (k.clone(), v.clone())).collect(), required);
    }
    if let Some(map) = schema.as_object() {
        if !map.contains_key("type") {
            let properties: HashMap<String, Value> = map.iter().map(|(k, v)| (k.clone(), json!({"type": v}))).collect();
            let required = properties.keys().cloned().collect();
            return (properties, required);
        }
    }
    (HashMap::new(), Vec::new())
}

/// Smart-maps a skill's raw output onto its declared output schema (§4.9
/// step 3): missing keys are filled via [`OUTPUT_SYNONYMS`] when possible,
/// and loosely-typed values are coerced rather than rejected. An explicit
/// `success: false` output is returned unchanged — failure outputs are not
/// schema-enforced. `output.is_empty()` becomes a synthetic failure output,
/// matching the distilled source's null/empty guard.
#[must_use]
pub fn validate_output(output: HashMap<String, Value>, expected_schema: &Value, action_id: &str) -> HashMap<String, Value> {
    if output.is_empty() {
        return HashMap::from([
            ("success".to_string(), Value::Bool(false)),
            ("error".to_string(), Value::from("skill returned no output")),
        ]);
    }
    if output.get("success") == Some(&Value::Bool(false)) {
        return output;
    }
    if expected_schema.is_null() || (expected_schema.is_object() && expected_schema.as_object().unwrap().is_empty()) {
        return output;
    }

    let (target_keys, _) = schema_properties(expected_schema);
    let wants_status = target_keys.contains_key("success") || target_keys.contains_key("error");
    let mut mapped = output;
    for (key, type_def) in &target_keys {
        if !mapped.contains_key(key) {
            if let Some(candidates) = OUTPUT_SYNONYMS.get(key.as_str()) {
                if let Some(value) = candidates.iter().find_map(|alt| mapped.get(*alt).cloned()) {
                    mapped.insert(key.clone(), value);
                }
            }
            continue;
        }
        let Some(type_str) = type_def.get("type").and_then(Value::as_str) else { continue };
        let value = mapped.get(key).expect("checked above");
        if !check_type(value, type_str) {
            if let Some(coerced) = coerce_output(value, type_str) {
                mapped.insert(key.clone(), coerced);
            }
        }
    }

    // §4.9 step 3's one hard-failure carve-out: a missing `success`/`error`
    // is ordinarily just a warning, unless no status key at all survived
    // aliasing — then there is nothing for a caller to branch on.
    let has_status_key = ["success", "error", "status"].iter().any(|key| mapped.contains_key(*key));
    if wants_status && !has_status_key {
        return HashMap::from([
            ("success".to_string(), Value::Bool(false)),
            (
                "error".to_string(),
                Value::from(format!("{action_id} produced no success/error/status key")),
            ),
        ]);
    }

    mapped
}

fn coerce_output(value: &Value, type_str: &str) -> Option<Value> {
    match type_str {
        "str" => Some(Value::from(value.to_string())),
        "int" => value.as_str().and_then(|s| s.parse::<i64>().ok()).map(Value::from),
        "float" => value.as_str().and_then(|s| s.parse::<f64>().ok()).and_then(Value::from_f64),
        _ => None,
    }
}

/// Parameter names declared by `schema`'s `properties` (or a bare
/// `{name: type}` map), used to sanitise a Corrector's proposed patch down
/// to keys a skill's schema actually accepts before retrying.
#[must_use]
pub fn declared_input_keys(schema: &Value) -> Vec<String> {
    schema_properties(schema).0.into_keys().collect()
}

/// Basic structural type check used by [`validate_output`]; a non-string
/// `type_definition` (nested schema) always passes.
#[must_use]
pub fn check_type(value: &Value, type_str: &str) -> bool {
    match type_str {
        "str" => value.is_string(),
        "int" => value.is_i64() || value.is_u64(),
        "float" => value.is_number(),
        "bool" => value.is_boolean(),
        "dict" => value.is_object(),
        "list" => value.is_array(),
        "Any" => true,
        other if other.starts_with("List[") => value.is_array(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use zappy_core::action::ActionMetadata;
    use zappy_core::execution::StepResult;

    fn action_with(inputs: Vec<(&str, Value)>, reference_map: Vec<(&str, &str)>) -> Action {
        Action {
            id: "step_2".to_string(),
            skill: "writer".to_string(),
            description: "store the analysis result".to_string(),
            inputs: inputs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            reference_map: reference_map.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            expected_output: Value::Null,
            depends_on: vec!["step_1".to_string()],
            priority: zappy_core::action::ActionPriority::Major,
            metadata: ActionMetadata::default(),
        }
    }

    #[test]
    fn reference_map_overrides_inline_reference_and_statics() {
        let mut state = ExecutionState::new(["step_1".to_string(), "step_2".to_string()]);
        state.mark_completed(StepResult {
            action_id: "step_1".to_string(),
            success: true,
            output: HashMap::from([("result".to_string(), Value::from("analysis text"))]),
            error: None,
            duration_ms: 5,
            inputs_used: HashMap::new(),
            corrected: false,
        });
        let action = action_with(vec![("content", Value::from("placeholder"))], vec![("content", "step_1.result")]);
        let resolved = resolve_inputs(&action, &state, None).unwrap();
        assert_eq!(resolved["content"], Value::from("analysis text"));
    }

    #[test]
    fn unresolvable_reference_is_a_validation_error() {
        let state = ExecutionState::new(["step_1".to_string(), "step_2".to_string()]);
        let action = action_with(vec![], vec![("content", "step_1.missing")]);
        assert!(matches!(resolve_inputs(&action, &state, None), Err(RuntimeError::Validation(_))));
    }

    fn metadata_with_schema(schema: Value) -> SkillMetadata {
        SkillMetadata {
            name: "writer".to_string(),
            description: "writes content".to_string(),
            category: "io".to_string(),
            sub_category: String::new(),
            input_schema: schema,
            output_schema: json!({}),
            config_schema: None,
            dependencies: vec![],
            version: "0.1.0".to_string(),
            timeout_default_ms: 30_000,
        }
    }

    #[test]
    fn fuzzy_parameter_mapping_fills_missing_required_key() {
        let metadata = metadata_with_schema(json!({
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
        }));
        let inputs = HashMap::from([("file_path".to_string(), Value::from("/tmp/x.txt"))]);
        let mapped = auto_map_to_schema(inputs, &metadata, "");
        assert_eq!(mapped["path"], Value::from("/tmp/x.txt"));
    }

    #[test]
    fn semantic_action_inference_from_description() {
        let metadata = metadata_with_schema(json!({
            "properties": {"action": {"type": "string", "enum": ["read_file", "write_file"]}},
            "required": ["action"],
        }));
        let mapped = auto_map_to_schema(HashMap::new(), &metadata, "please read the config file");
        assert_eq!(mapped["action"], Value::from("read_file"));
    }

    #[test]
    fn integer_string_is_coerced() {
        let metadata = metadata_with_schema(json!({
            "properties": {"count": {"type": "integer"}},
            "required": [],
        }));
        let inputs = HashMap::from([("count".to_string(), Value::from("42"))]);
        let mapped = auto_map_to_schema(inputs, &metadata, "");
        assert_eq!(mapped["count"], Value::from(42));
    }

    #[test]
    fn validate_output_fills_reply_from_response_synonym() {
        let schema = json!({"properties": {"reply": {"type": "str"}}});
        let output = HashMap::from([("response".to_string(), Value::from("hi there"))]);
        let mapped = validate_output(output, &schema, "step_1");
        assert_eq!(mapped["reply"], Value::from("hi there"));
    }

    #[test]
    fn explicit_failure_output_is_returned_unchanged() {
        let output = HashMap::from([
            ("success".to_string(), Value::Bool(false)),
            ("error".to_string(), Value::from("boom")),
        ]);
        let mapped = validate_output(output.clone(), &json!({"properties": {"reply": {"type": "str"}}}), "step_1");
        assert_eq!(mapped, output);
    }

    #[test]
    fn empty_output_becomes_synthetic_failure() {
        let mapped = validate_output(HashMap::new(), &json!({}), "step_1");
        assert_eq!(mapped["success"], Value::Bool(false));
    }

    #[test]
    fn missing_status_key_with_no_aliasable_candidate_is_a_hard_failure() {
        let schema = json!({"properties": {"success": {"type": "bool"}, "reply": {"type": "str"}}});
        let output = HashMap::from([("reply".to_string(), Value::from("hi there"))]);
        let mapped = validate_output(output, &schema, "step_1");
        assert_eq!(mapped["success"], Value::Bool(false));
        assert!(mapped["error"].as_str().unwrap().contains("step_1"));
    }

    #[test]
    fn a_status_key_under_any_recognised_name_avoids_the_hard_failure() {
        let schema = json!({"properties": {"success": {"type": "bool"}}});
        let output = HashMap::from([("status".to_string(), Value::from("ok"))]);
        let mapped = validate_output(output.clone(), &schema, "step_1");
        assert_eq!(mapped, output);
    }

    #[test]
    fn missing_success_is_only_a_warning_when_the_schema_does_not_ask_for_status() {
        let schema = json!({"properties": {"reply": {"type": "str"}}});
        let output = HashMap::from([("reply".to_string(), Value::from("hi there"))]);
        let mapped = validate_output(output, &schema, "step_1");
        assert_eq!(mapped["reply"], Value::from("hi there"));
        assert!(!mapped.contains_key("success"));
    }
}
