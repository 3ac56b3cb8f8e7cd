//! Bridges sensor-layer voice events into a two-action plan (§4.6, §8
//! scenario 4), grounded on
//! `agi/reflex/modules/voice_command/system.py`.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{json, Value};
use zappy_core::action::{Action, ActionMetadata, ActionPriority};
use zappy_reflex::{ReflexMetadata, ReflexModule};

/// Watches for `voice_input` events and, once triggered, emits a plan that
/// detects emotion ahead of delegating the transcribed command back to the
/// brain with `speak: true`. Stateful between `evaluate` and `get_plan`
/// because [`ReflexModule::get_plan`] takes no event argument — the same
/// constraint the distilled source works around by stashing
/// `self.last_command`.
pub struct VoiceCommanderReflex {
    metadata: ReflexMetadata,
    last_command: RwLock<String>,
}

impl VoiceCommanderReflex {
    /// An idle reflex with no command captured yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: ReflexMetadata::new(
                "voice_commander",
                "Delegates transcribed voice commands to the brain",
                "event",
            ),
            last_command: RwLock::new(String::new()),
        }
    }
}

impl Default for VoiceCommanderReflex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReflexModule for VoiceCommanderReflex {
    fn metadata(&self) -> &ReflexMetadata {
        &self.metadata
    }

    async fn evaluate(&self, event: &Value) -> bool {
        if event.get("type").and_then(Value::as_str) != Some("voice_input") {
            return false;
        }
        let Some(text) = event.pointer("/payload/text").and_then(Value::as_str) else {
            return false;
        };
        if text.trim().is_empty() {
            return false;
        }
        *self.last_command.write() = text.to_string();
        true
    }

    async fn get_plan(&self) -> Vec<Action> {
        let command = self.last_command.read().clone();
        let mut detect_inputs = IndexMap::new();
        detect_inputs.insert("text".to_string(), Value::String(command.clone()));

        let mut delegate_inputs = IndexMap::new();
        delegate_inputs.insert("goal".to_string(), Value::String(command));
        delegate_inputs.insert("speak".to_string(), Value::Bool(true));

        vec![
            Action {
                id: "detect_emotion".to_string(),
                skill: "emotion_detection".to_string(),
                description: "Detect the emotional state of the speaker".to_string(),
                inputs: detect_inputs,
                reference_map: IndexMap::new(),
                expected_output: json!({}),
                depends_on: vec![],
                priority: ActionPriority::Minor,
                metadata: ActionMetadata::default(),
            },
            Action {
                id: "delegate_to_brain".to_string(),
                skill: "agi_brain_interface".to_string(),
                description: "Delegate the transcribed command to the brain".to_string(),
                inputs: delegate_inputs,
                reference_map: IndexMap::new(),
                expected_output: json!({}),
                depends_on: vec!["detect_emotion".to_string()],
                priority: ActionPriority::Major,
                metadata: ActionMetadata::default(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ignores_non_voice_events() {
        let reflex = VoiceCommanderReflex::new();
        assert!(!reflex.evaluate(&json!({"type": "time_event"})).await);
    }

    #[tokio::test]
    async fn ignores_voice_events_with_empty_text() {
        let reflex = VoiceCommanderReflex::new();
        let event = json!({"type": "voice_input", "payload": {"text": "   "}});
        assert!(!reflex.evaluate(&event).await);
    }

    #[tokio::test]
    async fn triggers_on_transcribed_voice_input_and_builds_a_two_step_plan() {
        let reflex = VoiceCommanderReflex::new();
        let event = json!({"type": "voice_input", "payload": {"text": "turn on the lights"}});
        assert!(reflex.evaluate(&event).await);

        let plan = reflex.get_plan().await;
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].id, "detect_emotion");
        assert_eq!(plan[0].skill, "emotion_detection");
        assert!(plan[0].depends_on.is_empty());
        assert_eq!(plan[1].id, "delegate_to_brain");
        assert_eq!(plan[1].skill, "agi_brain_interface");
        assert_eq!(plan[1].depends_on, vec!["detect_emotion".to_string()]);
        assert_eq!(
            plan[1].inputs.get("goal").and_then(Value::as_str),
            Some("turn on the lights")
        );
        assert_eq!(plan[1].inputs.get("speak").and_then(Value::as_bool), Some(true));
    }
}
