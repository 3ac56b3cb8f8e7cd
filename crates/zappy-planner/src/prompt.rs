//! System/user prompt rendering for plan synthesis and replan (§4.8).

use serde_json::Value;
use zappy_core::skill::SkillMetadata;

const SYSTEM_PROMPT_TEMPLATE: &str = "\
You are an expert AI planner that decomposes complex goals into executable action sequences.

Your task is to create a DETAILED, STEP-BY-STEP plan that breaks down the user's goal into discrete actions.

# Available Skills

You must ONLY use the following skills. Do not invent new ones.

{skills_section}

# Planning Guidelines

1. Decompose thoroughly: break complex tasks into small, focused actions.
2. Define dependencies with `depends_on` to ensure proper ordering.
3. Clearly specify each action's inputs and outputs.
4. Connect actions using `input_refs`, e.g. {{\"text\": \"action_1.results\"}}.
5. Use the exact input parameter names declared by each skill; do not invent keys.

# Output Format

Respond with a valid JSON object and nothing else:
{{
  \"reasoning\": \"step-by-step explanation\",
  \"actions\": [
    {{
      \"id\": \"action_1\",
      \"skill\": \"skill_name\",
      \"description\": \"what this action accomplishes\",
      \"inputs\": {{}},
      \"input_refs\": {{}},
      \"output_schema\": {{}},
      \"depends_on\": []
    }}
  ],
  \"expected_outcome\": \"description of the final result\"
}}
";

/// Renders the planner's system prompt, enumerating every candidate
/// skill's inputs (name, type, enum values) and outputs.
#[must_use]
pub fn render_system_prompt(skills: &[SkillMetadata]) -> String {
    let mut skills_section = String::new();
    for skill in skills {
        skills_section.push_str(&format!("- **{}**: {}\n", skill.name, skill.description));
        skills_section.push_str(&format!("  - Inputs: {}\n", describe_inputs(&skill.input_schema)));
        skills_section.push_str(&format!("  - Outputs: {}\n\n", describe_outputs(&skill.output_schema)));
    }
    SYSTEM_PROMPT_TEMPLATE.replace("{skills_section}", &skills_section)
}

fn describe_inputs(input_schema: &Value) -> String {
    let Some(properties) = input_schema.get("properties").and_then(Value::as_object) else {
        return "None".to_string();
    };
    if properties.is_empty() {
        return "None".to_string();
    }
    properties
        .iter()
        .map(|(name, prop)| {
            let mut type_str = prop.get("type").and_then(Value::as_str).unwrap_or("any").to_string();
            if let Some(enum_values) = prop.get("enum").and_then(Value::as_array) {
                let values: Vec<String> = enum_values.iter().map(value_to_display).collect();
                type_str = format!("{type_str} (Allowed: {})", values.join(", "));
            }
            format!("{name} ({type_str})")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_outputs(output_schema: &Value) -> String {
    if let Some(properties) = output_schema.get("properties").and_then(Value::as_object) {
        return properties
            .iter()
            .map(|(name, prop)| format!("{name} ({})", prop.get("type").and_then(Value::as_str).unwrap_or("any")))
            .collect::<Vec<_>>()
            .join(", ");
    }
    let Some(map) = output_schema.as_object() else {
        return String::new();
    };
    map.iter().map(|(name, type_value)| format!("{name} ({})", value_to_display(type_value))).collect::<Vec<_>>().join(", ")
}

fn value_to_display(value: &Value) -> String {
    value.as_str().map_or_else(|| value.to_string(), str::to_string)
}

/// Builds the user-turn prompt: the goal plus a flattened context section.
#[must_use]
pub fn build_planning_prompt(goal: &str, context: &Value) -> String {
    let mut prompt = format!("# Goal\n\n{goal}\n\n");
    if let Some(map) = context.as_object() {
        if !map.is_empty() {
            prompt.push_str("# Context\n\n");
            for (key, value) in map {
                prompt.push_str(&format!("- {key}: {value}\n"));
            }
            prompt.push('\n');
        }
    }
    prompt.push_str("Create a detailed action plan to accomplish this goal. Think step-by-step and output valid JSON matching the required schema.");
    prompt
}

/// Builds the replan continuation goal and context (§4.8 "reuses the same
/// pipeline with a goal string describing continuation work").
#[must_use]
pub fn build_replan_goal(original_goal: &str, failed_step: &str, error: &str, completed_steps: &[String]) -> String {
    format!(
        "Continue working on: {original_goal}\nPrevious attempt failed at step '{failed_step}' with error: {error}\nCompleted steps: {}",
        completed_steps.join(", ")
    )
}
