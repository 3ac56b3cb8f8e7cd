use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single action invocation, see §3 "Execution State".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Action id this result belongs to.
    pub action_id: String,
    /// Whether the action ultimately succeeded.
    pub success: bool,
    /// Output map produced by the skill (post IO-Mapper smart-validation).
    #[serde(default)]
    pub output: HashMap<String, Value>,
    /// Human-readable error, set only when `success` is `false`.
    #[serde(default)]
    pub error: Option<String>,
    /// Wall-clock duration of the invocation.
    pub duration_ms: u64,
    /// The inputs actually used (post-mapping), for diagnostics/replay.
    #[serde(default)]
    pub inputs_used: HashMap<String, Value>,
    /// `true` once an in-place Corrector retry has succeeded for this step.
    #[serde(default)]
    pub corrected: bool,
}

/// Tracks per-action results and the global dotted-path output map for one
/// in-flight [`crate::action::Plan`] execution (§3).
#[derive(Debug, Default)]
pub struct ExecutionState {
    results: HashMap<String, StepResult>,
    completed: HashSet<String>,
    failed: HashSet<String>,
    pending: HashSet<String>,
    /// `<action_id>.<key>` → value, populated atomically on completion.
    global_state: HashMap<String, Value>,
}

impl ExecutionState {
    /// Creates state for a plan with the given action ids, all initially
    /// pending.
    #[must_use]
    pub fn new(action_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            pending: action_ids.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Records a successful step, installing its outputs into the global
    /// dotted-path map atomically.
    pub fn mark_completed(&mut self, result: StepResult) {
        let action_id = result.action_id.clone();
        for (key, value) in &result.output {
            self.global_state
                .insert(format!("{action_id}.{key}"), value.clone());
        }
        self.pending.remove(&action_id);
        self.failed.remove(&action_id);
        self.completed.insert(action_id.clone());
        self.results.insert(action_id, result);
    }

    /// Records a failed step. Never touches the global state map.
    pub fn mark_failed(&mut self, result: StepResult) {
        let action_id = result.action_id.clone();
        self.pending.remove(&action_id);
        self.completed.remove(&action_id);
        self.failed.insert(action_id.clone());
        self.results.insert(action_id, result);
    }

    /// The stored result for an action, if any.
    #[must_use]
    pub fn result(&self, action_id: &str) -> Option<&StepResult> {
        self.results.get(action_id)
    }

    /// Resolves a dotted reference `<action_id>.<key>` from the global
    /// state map.
    #[must_use]
    pub fn resolve(&self, dotted_path: &str) -> Option<&Value> {
        self.global_state.get(dotted_path)
    }

    /// `true` if every dependency of `action_id` is in the completed set.
    #[must_use]
    pub fn is_action_ready(&self, depends_on: &[String]) -> bool {
        depends_on.iter().all(|dep| self.completed.contains(dep))
    }

    /// Ids completed successfully so far.
    #[must_use]
    pub const fn completed(&self) -> &HashSet<String> {
        &self.completed
    }

    /// Ids that have failed (and not since been repaired) so far.
    #[must_use]
    pub const fn failed(&self) -> &HashSet<String> {
        &self.failed
    }

    /// Ids not yet attempted.
    #[must_use]
    pub const fn pending(&self) -> &HashSet<String> {
        &self.pending
    }

    /// Renders the full state as a JSON value, for replan prompts and
    /// diagnostics.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "completed": self.completed,
            "failed": self.failed,
            "pending": self.pending,
            "results": self.results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, success: bool) -> StepResult {
        StepResult {
            action_id: id.to_string(),
            success,
            output: HashMap::from([("value".to_string(), Value::from(42))]),
            error: if success { None } else { Some("boom".into()) },
            duration_ms: 10,
            inputs_used: HashMap::new(),
            corrected: false,
        }
    }

    #[test]
    fn completed_and_failed_are_disjoint() {
        let mut state = ExecutionState::new(["a".to_string(), "b".to_string()]);
        state.mark_completed(result("a", true));
        state.mark_failed(result("b", false));
        assert!(state.completed().is_disjoint(state.failed()));
        assert_eq!(state.resolve("a.value"), Some(&Value::from(42)));
    }

    #[test]
    fn dependents_ready_only_once_all_deps_complete() {
        let mut state = ExecutionState::new(["a".to_string(), "b".to_string()]);
        let deps = vec!["a".to_string(), "b".to_string()];
        assert!(!state.is_action_ready(&deps));
        state.mark_completed(result("a", true));
        assert!(!state.is_action_ready(&deps));
        state.mark_completed(result("b", true));
        assert!(state.is_action_ready(&deps));
    }
}
