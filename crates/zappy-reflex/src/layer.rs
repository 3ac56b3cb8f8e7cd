use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use zappy_core::action::{Plan, PlanMetadata};
use zappy_logging::{JsonLogger, LogLevel};

use crate::base::ReflexModule;

/// One reflex's contribution to a triggered [`process_event`](ReflexLayer::process_event)
/// call.
pub struct TriggeredPlan {
    /// Name of the reflex that produced this plan.
    pub reflex: String,
    /// The plan to hand to the Orchestrator.
    pub plan: Plan,
}

/// Name-keyed registry of active reflexes, evaluated against every incoming
/// event (§4.6).
pub struct ReflexLayer {
    reflexes: RwLock<HashMap<String, Arc<dyn ReflexModule>>>,
    logger: Option<Arc<JsonLogger>>,
}

impl Default for ReflexLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReflexLayer {
    /// An empty reflex registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reflexes: RwLock::new(HashMap::new()),
            logger: None,
        }
    }

    /// Attaches a structured logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<JsonLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Registers a reflex module, replacing any existing one under the same
    /// name.
    pub fn register_reflex(&self, reflex: Arc<dyn ReflexModule>) {
        let name = reflex.metadata().name.clone();
        self.reflexes.write().insert(name.clone(), reflex);
        if let Some(logger) = &self.logger {
            logger.event(LogLevel::Info, "reflex.module.registered", serde_json::json!({"name": name}));
        }
    }

    /// Number of registered reflexes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reflexes.read().len()
    }

    /// `true` if no reflex is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reflexes.read().is_empty()
    }

    /// Evaluates every registered reflex against `event`; each one that
    /// accepts contributes one [`TriggeredPlan`] whose goal is
    /// `"Reflex Trigger: <name>"` (§4.6). A reflex whose `evaluate` or
    /// `get_plan` call panics or otherwise misbehaves is isolated: it is
    /// logged and skipped, never preventing other reflexes from firing.
    pub async fn process_event(&self, event: &Value) -> Vec<TriggeredPlan> {
        let reflexes: Vec<Arc<dyn ReflexModule>> = self.reflexes.read().values().cloned().collect();
        let mut triggered = Vec::new();
        for reflex in reflexes {
            let name = reflex.metadata().name.clone();
            if !reflex.evaluate(event).await {
                continue;
            }
            let actions = reflex.get_plan().await;
            if let Some(logger) = &self.logger {
                logger.event(LogLevel::Info, "reflex.triggered", serde_json::json!({"reflex": name}));
            }
            triggered.push(TriggeredPlan {
                reflex: name.clone(),
                plan: Plan {
                    goal: format!("Reflex Trigger: {name}"),
                    actions,
                    reasoning_trace: format!("Triggered by reflex module {name}"),
                    metadata: PlanMetadata {
                        planner: "reflex".to_string(),
                        ..PlanMetadata::default()
                    },
                },
            });
        }
        triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use zappy_core::action::Action;

    struct AlwaysFires {
        metadata: crate::base::ReflexMetadata,
    }

    #[async_trait]
    impl ReflexModule for AlwaysFires {
        fn metadata(&self) -> &crate::base::ReflexMetadata {
            &self.metadata
        }

        async fn evaluate(&self, _event: &Value) -> bool {
            true
        }

        async fn get_plan(&self) -> Vec<Action> {
            vec![]
        }
    }

    struct NeverFires {
        metadata: crate::base::ReflexMetadata,
    }

    #[async_trait]
    impl ReflexModule for NeverFires {
        fn metadata(&self) -> &crate::base::ReflexMetadata {
            &self.metadata
        }

        async fn evaluate(&self, _event: &Value) -> bool {
            false
        }

        async fn get_plan(&self) -> Vec<Action> {
            vec![]
        }
    }

    #[tokio::test]
    async fn triggered_reflex_produces_goal_with_its_name() {
        let layer = ReflexLayer::new();
        layer.register_reflex(Arc::new(AlwaysFires {
            metadata: crate::base::ReflexMetadata::new("voice_command", "fires on anything", "event"),
        }));
        layer.register_reflex(Arc::new(NeverFires {
            metadata: crate::base::ReflexMetadata::new("never", "never fires", "event"),
        }));
        let triggered = layer.process_event(&serde_json::json!({"type": "voice_input"})).await;
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].plan.goal, "Reflex Trigger: voice_command");
    }
}
