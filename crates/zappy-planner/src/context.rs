//! Best-effort sensor context gathering ahead of plan synthesis (§4.8 step
//! 1, §9 "Planner context-gathering best-effort"). Any failure along this
//! path degrades silently to an empty context; planning always proceeds.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use zappy_logging::{JsonLogger, LogLevel};
use zappy_model_router::{ChatMessage, ModelRouter, TaskClass};
use zappy_perception::PerceptionLayer;

#[derive(Debug, Deserialize)]
struct SearchPhraseResponse {
    #[serde(default)]
    search_phrase: String,
}

/// Asks the fast model which kind of environmental information the goal
/// needs, searches the Perception Layer for matching sensors, and fetches
/// their current readings. Returns an empty object on any failure.
pub(crate) async fn gather_relevant_context(
    goal: &str,
    router: &ModelRouter,
    perception: Option<&Arc<PerceptionLayer>>,
    logger: Option<&JsonLogger>,
) -> Value {
    let Some(perception) = perception else {
        return json!({});
    };

    let phrase = match search_phrase(goal, router).await {
        Some(phrase) if !phrase.is_empty() => phrase,
        _ => return json!({}),
    };

    let candidates = match perception.search_sensors(router, &phrase, 5).await {
        Ok(names) => names,
        Err(err) => {
            if let Some(logger) = logger {
                logger.event(LogLevel::Warn, "planner.context.search_failed", json!({"error": err.to_string()}));
            }
            return json!({});
        }
    };

    let mut context_data = serde_json::Map::new();
    for name in candidates {
        if let Ok(value) = perception.perceive(&name, None).await {
            context_data.insert(name, value);
        }
    }

    if context_data.is_empty() {
        json!({})
    } else {
        json!({ "sensor_data": Value::Object(context_data) })
    }
}

async fn search_phrase(goal: &str, router: &ModelRouter) -> Option<String> {
    let prompt = format!(
        "Goal: {goal}\n\
         Identify what kind of environmental information is needed to achieve this goal.\n\
         Return a JSON object with a key 'search_phrase' containing a short natural language \
         phrase describing the needed context (e.g. 'local weather conditions'). Return an \
         empty string if none is needed."
    );
    let messages = vec![
        ChatMessage::system("You are a context-aware system. Output JSON only."),
        ChatMessage::user(prompt),
    ];
    let raw = router.chat(TaskClass::Fast, &messages, 0.0, 200).await.ok()?;
    let parsed: SearchPhraseResponse = serde_json::from_str(&raw).ok()?;
    Some(parsed.search_phrase)
}
