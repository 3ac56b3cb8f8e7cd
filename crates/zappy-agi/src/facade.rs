//! Wires intent classification, planning, execution, memory, and
//! reflex/sensor event ingestion into one entry point (§4.12), grounded on
//! `agi/__init__.py`'s `AGI.execute`/`AGI.handle_event`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::OnceCell;
use zappy_core::action::Plan;
use zappy_core::error::RuntimeError;
use zappy_core::event::{Event, EventPhase};
use zappy_core::skill::SkillMetadata;
use zappy_event_bus::{EventPublisher, FanoutPublisher, FileEventPublisher, MemoryEventBus};
use zappy_logging::{JsonLogger, LogLevel};
use zappy_memory::MemoryStore;
use zappy_model_router::{Intent, ModelRouter};
use zappy_orchestrator::{ExecutionOutcome, Orchestrator};
use zappy_perception::PerceptionLayer;
use zappy_planner::Planner;
use zappy_reflex::ReflexLayer;
use zappy_sensors::AudioGate;
use zappy_skill_registry::SkillRegistry;

use crate::builtin::{
    AgiBrainInterfaceSkill, EmotionDetectionSkill, EmotionPerceptionModule, GeneralChatSkill, SpeakSkill,
    TextAnalyzerSkill, WebSearchSkill,
};
use crate::reflexes::VoiceCommanderReflex;

/// How many candidate skills the planner's prompt is handed per call.
const SKILL_RETRIEVAL_LIMIT: usize = 8;

/// Fallback reply when a plan completes with no field a caller would
/// recognise as a conversational answer.
const DEFAULT_REPLY: &str = "Task completed.";

/// Outcome of one [`Agi::execute`] call (§4.12).
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    /// The text ultimately resolved for this call: spoken if requested,
    /// always recorded to short-term memory regardless of `speak`.
    pub reply: String,
    /// `true` if the call resolved via the CHAT fast-path rather than the
    /// planner/orchestrator pipeline.
    pub chat_fast_path: bool,
    /// The full orchestrator outcome, when the planner/orchestrator path
    /// ran (`None` on the CHAT fast-path).
    pub outcome: Option<ExecutionOutcome>,
}

/// Wires every tier of the runtime into one facade (§4.12). Cheap to clone
/// — every field is `Arc`-backed — so a handle can be given to a skill that
/// needs to call back into the facade (see
/// [`crate::builtin::AgiBrainInterfaceSkill`]).
#[derive(Clone)]
pub struct Agi {
    router: Arc<ModelRouter>,
    memory: Arc<MemoryStore>,
    skills: Arc<SkillRegistry>,
    perception: Arc<PerceptionLayer>,
    reflexes: Arc<ReflexLayer>,
    planner: Arc<Planner>,
    orchestrator: Arc<Orchestrator>,
    events: Arc<MemoryEventBus>,
    publisher: Arc<dyn EventPublisher>,
    logger: Option<Arc<JsonLogger>>,
}

impl Agi {
    /// The live event bus, for subscribing to a snapshot or live stream of
    /// everything this facade has published.
    #[must_use]
    pub fn events(&self) -> &Arc<MemoryEventBus> {
        &self.events
    }

    /// The skill registry, for callers that want to inspect or extend the
    /// installed skill set after construction.
    #[must_use]
    pub fn skills(&self) -> &Arc<SkillRegistry> {
        &self.skills
    }

    /// The reflex layer, for callers that want to register additional
    /// reflexes after construction.
    #[must_use]
    pub fn reflexes(&self) -> &Arc<ReflexLayer> {
        &self.reflexes
    }

    /// The memory store, for callers that want to inspect recent turns or
    /// trigger a long-term summarisation pass.
    #[must_use]
    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    /// Runs one goal through the full pipeline (§4.12):
    ///
    /// 1. Fire-and-forget emotion perception, folded into short-term memory
    ///    as a side effect rather than blocking this call.
    /// 2. Intent classification. `CHAT` short-circuits straight to the
    ///    `general_chat` skill; every other intent falls through to the same
    ///    retrieval → plan → execute path, since the planner's own DAG
    ///    shape already collapses a single-action goal into a one-node plan.
    /// 3. For the non-`CHAT` path: relevant-skill retrieval, plan synthesis,
    ///    dependency-ordered execution.
    /// 4. A reply is always resolved and stored to short-term memory,
    ///    independent of whether `speak` was requested.
    ///
    /// `context`, when supplied, is merged into the working-memory context
    /// handed to the planner — an object's keys are folded in alongside
    /// `working_memory` (caller keys win on conflict); a non-object value is
    /// ignored, since the planner prompt expects an object.
    pub async fn execute(
        &self,
        goal: &str,
        context: Option<Value>,
        speak: bool,
    ) -> Result<ExecuteOutcome, RuntimeError> {
        self.sense_emotion(goal);

        let history_text = self.history_as_text();
        let intent = self.router.classify_intent(goal, &history_text).await?;
        self.publish(Event::IntentDetected {
            phase: EventPhase::Planning,
            intent: format!("{intent:?}"),
        })
        .await;

        let outcome = if intent == Intent::Chat {
            let reply = self.run_general_chat(goal).await?;
            ExecuteOutcome {
                reply,
                chat_fast_path: true,
                outcome: None,
            }
        } else {
            let merged_context = merge_context(
                json!({ "working_memory": self.memory.get_context_window() }),
                context,
            );
            let skill_metadata = self.candidate_skills(goal).await?;
            let plan = self.planner.create_plan(goal, merged_context, &skill_metadata).await?;
            self.run_plan(plan).await?
        };

        if speak {
            self.speak(&outcome.reply).await;
        }
        self.memory.short_term().add(goal, &outcome.reply);

        Ok(outcome)
    }

    /// Evaluates every registered reflex against `event`; each triggered
    /// reflex's plan is executed independently via the Orchestrator (§4.6,
    /// §8 scenario 4). Errors from one reflex's plan do not prevent another
    /// from running.
    pub async fn handle_sensor_event(&self, event: &Value) -> Vec<Result<ExecutionOutcome, RuntimeError>> {
        let triggered = self.reflexes.process_event(event).await;
        let mut results = Vec::with_capacity(triggered.len());
        for triggered_plan in triggered {
            if let Some(logger) = &self.logger {
                logger.event(
                    LogLevel::Info,
                    "agi.reflex.plan_execution_started",
                    json!({"reflex": triggered_plan.reflex}),
                );
            }
            results.push(self.orchestrator.execute_plan(triggered_plan.plan).await);
        }
        results
    }

    async fn run_plan(&self, plan: Plan) -> Result<ExecuteOutcome, RuntimeError> {
        match self.orchestrator.execute_plan(plan).await {
            Ok(outcome) => {
                let reply = resolve_reply(&outcome);
                Ok(ExecuteOutcome {
                    reply,
                    chat_fast_path: false,
                    outcome: Some(outcome),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn run_general_chat(&self, goal: &str) -> Result<String, RuntimeError> {
        let skill = self.skills.get("general_chat")?;
        let mut inputs = HashMap::new();
        inputs.insert("message".to_string(), Value::String(goal.to_string()));
        inputs.insert("history".to_string(), self.history_as_turns());
        let output = skill.execute(inputs).await?;
        Ok(output
            .get("reply")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_REPLY.to_string()))
    }

    async fn candidate_skills(&self, goal: &str) -> Result<Vec<SkillMetadata>, RuntimeError> {
        let hits = self
            .skills
            .retrieve_relevant(&self.router, goal, SKILL_RETRIEVAL_LIMIT, None, None)
            .await?;
        let all = self.skills.list(false)?;
        let ordered = hits
            .into_iter()
            .filter_map(|hit| all.iter().find(|m| m.name == hit.name).cloned())
            .collect();
        Ok(ordered)
    }

    fn sense_emotion(&self, goal: &str) {
        let perception = Arc::clone(&self.perception);
        let goal = goal.to_string();
        tokio::spawn(async move {
            let _ = perception.perceive("emotion", Some(&goal)).await;
        });
    }

    async fn speak(&self, text: &str) {
        let Ok(skill) = self.skills.get("speak") else { return };
        let mut inputs = HashMap::new();
        inputs.insert("text".to_string(), Value::String(text.to_string()));
        let _ = skill.execute(inputs).await;
    }

    fn history_as_text(&self) -> String {
        self.memory
            .short_term()
            .turns()
            .iter()
            .map(|turn| format!("User: {}\nAssistant: {}", turn.goal, turn.result))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn history_as_turns(&self) -> Value {
        let mut entries = Vec::new();
        for turn in self.memory.short_term().turns() {
            entries.push(json!({"role": "user", "content": turn.goal}));
            entries.push(json!({"role": "assistant", "content": turn.result}));
        }
        Value::Array(entries)
    }

    async fn publish(&self, event: Event) {
        let _ = self.publisher.publish(event).await;
    }

    /// Logs a background (fire-and-forget) delegation failure; used by
    /// [`crate::builtin::AgiBrainInterfaceSkill`], which cannot propagate a
    /// nested `execute` error anywhere else.
    pub(crate) fn log_background_failure(&self, goal: &str, err: &RuntimeError) {
        if let Some(logger) = &self.logger {
            logger.event(
                LogLevel::Error,
                "agi.brain_interface.background_execution_failed",
                json!({"goal": goal, "error": err.to_string()}),
            );
        }
    }
}

/// Folds an optional caller-supplied `context` object into `base`, caller
/// keys winning on conflict. A non-object `context` is dropped rather than
/// replacing `base` wholesale, since the planner always expects an object.
fn merge_context(base: Value, context: Option<Value>) -> Value {
    let Some(Value::Object(extra)) = context else {
        return base;
    };
    let Value::Object(mut map) = base else {
        return Value::Object(extra);
    };
    for (key, value) in extra {
        map.insert(key, value);
    }
    Value::Object(map)
}

/// Resolves the text a caller should treat as "the answer", trying the
/// common reply-shaped keys an executed plan's last action might have
/// produced before falling back to a generic acknowledgement. Grounded on
/// the distilled source's `reply or text or response or "Task completed."`
/// chain, but applied unconditionally rather than only when `speak` is set,
/// so short-term memory always records something meaningful.
fn resolve_reply(outcome: &ExecutionOutcome) -> String {
    let Some(result) = &outcome.result else {
        return DEFAULT_REPLY.to_string();
    };
    for key in ["reply", "text", "response"] {
        if let Some(value) = result.get(key).and_then(Value::as_str) {
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    DEFAULT_REPLY.to_string()
}

/// Assembles an [`Agi`], registering the built-in reference skills,
/// perception, and reflex described in §1 for end-to-end testability.
pub struct AgiBuilder {
    router: Arc<ModelRouter>,
    memory: Arc<MemoryStore>,
    skills: Arc<SkillRegistry>,
    perception: Arc<PerceptionLayer>,
    reflexes: Arc<ReflexLayer>,
    logger: Option<Arc<JsonLogger>>,
    event_capacity: usize,
    event_log_path: Option<PathBuf>,
    audio_gate: Option<Arc<AudioGate>>,
}

impl AgiBuilder {
    /// Wires the shared component handles every built-in skill/module needs.
    #[must_use]
    pub fn new(
        router: Arc<ModelRouter>,
        memory: Arc<MemoryStore>,
        skills: Arc<SkillRegistry>,
        perception: Arc<PerceptionLayer>,
        reflexes: Arc<ReflexLayer>,
    ) -> Self {
        Self {
            router,
            memory,
            skills,
            perception,
            reflexes,
            logger: None,
            event_capacity: 256,
            event_log_path: None,
            audio_gate: None,
        }
    }

    /// Attaches a structured logger to the planner, corrector, orchestrator,
    /// and facade.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<JsonLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Overrides the default in-memory event backlog/broadcast capacity.
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Also durably appends every published event as JSON lines to `path`.
    #[must_use]
    pub fn with_event_log(mut self, path: PathBuf) -> Self {
        self.event_log_path = Some(path);
        self
    }

    /// Shares an externally-owned [`AudioGate`] with the `speak` skill
    /// instead of letting `build` create its own, so a caller's own sensor
    /// drivers (e.g. a `VoiceEar`) see the same speaking state and suppress
    /// self-triggering on the runtime's own spoken output.
    #[must_use]
    pub fn with_audio_gate(mut self, gate: Arc<AudioGate>) -> Self {
        self.audio_gate = Some(gate);
        self
    }

    /// Registers the built-in reference skills/perception/reflex, wires the
    /// planner/corrector/orchestrator, and returns the assembled facade.
    pub async fn build(self) -> Result<Agi, RuntimeError> {
        let memory_events = Arc::new(MemoryEventBus::new(self.event_capacity));
        let publisher: Arc<dyn EventPublisher> = if let Some(path) = &self.event_log_path {
            let file: Arc<dyn EventPublisher> = Arc::new(
                FileEventPublisher::new(path).map_err(|err| RuntimeError::Fatal(err.to_string()))?,
            );
            let mem: Arc<dyn EventPublisher> = Arc::clone(&memory_events) as Arc<dyn EventPublisher>;
            Arc::new(FanoutPublisher::new(vec![mem, file]))
        } else {
            Arc::clone(&memory_events) as Arc<dyn EventPublisher>
        };

        self.skills
            .register(Arc::new(GeneralChatSkill::new(Arc::clone(&self.router))))?;
        self.skills.register(Arc::new(TextAnalyzerSkill::new()))?;
        self.skills
            .register(Arc::new(WebSearchSkill::new(self.skills.store().clone())))?;
        self.skills.register(Arc::new(EmotionDetectionSkill::new(
            Arc::clone(&self.router),
            Arc::clone(&self.memory),
        )))?;

        let gate = self.audio_gate.unwrap_or_else(AudioGate::new);
        self.skills.register(Arc::new(SpeakSkill::new(Arc::clone(&gate))))?;

        self.perception
            .register_module(Arc::new(EmotionPerceptionModule::new(
                Arc::clone(&self.router),
                Arc::clone(&self.memory),
            )))?;

        let brain_cell: Arc<OnceCell<Agi>> = Arc::new(OnceCell::new());
        self.skills
            .register(Arc::new(AgiBrainInterfaceSkill::new(Arc::clone(&brain_cell))))?;

        self.reflexes
            .register_reflex(Arc::new(VoiceCommanderReflex::new()));

        let mut planner = Planner::new(Arc::clone(&self.router)).with_perception(Arc::clone(&self.perception));
        if let Some(logger) = &self.logger {
            planner = planner.with_logger(Arc::clone(logger));
        }
        let planner = Arc::new(planner);

        let mut corrector = zappy_corrector::Corrector::new(Arc::clone(&self.router));
        if let Some(logger) = &self.logger {
            corrector = corrector.with_logger(Arc::clone(logger));
        }
        let corrector = Arc::new(corrector);

        let mut orchestrator = Orchestrator::new(Arc::clone(&self.skills))
            .with_self_correction(Arc::clone(&corrector), Arc::clone(&planner));
        if let Some(logger) = &self.logger {
            orchestrator = orchestrator.with_logger(Arc::clone(logger));
        }
        let orchestrator = Arc::new(orchestrator);

        let agi = Agi {
            router: self.router,
            memory: self.memory,
            skills: self.skills,
            perception: self.perception,
            reflexes: self.reflexes,
            planner,
            orchestrator,
            events: memory_events,
            publisher,
            logger: self.logger,
        };
        let _ = brain_cell.set(agi.clone());
        Ok(agi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use zappy_config_store::perceptions::PerceptionStore;
    use zappy_memory::long_term::LongTermMemory;
    use zappy_memory::short_term::ShortTermMemory;
    use zappy_model_router::{ChatMessage, ModelCandidate, ModelProvider, ModelRouterError, TaskClass};
    use zappy_persistence::{migrate_skills_db, migrate_state_db, Database};

    struct FixedProvider {
        name: &'static str,
        reply: String,
    }

    #[async_trait]
    impl ModelProvider for FixedProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<String, ModelRouterError> {
            Ok(self.reply.clone())
        }

        async fn stream_chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<BoxStream<'static, Result<String, ModelRouterError>>, ModelRouterError> {
            let reply = self.reply.clone();
            Ok(Box::pin(stream::iter(vec![Ok(reply)])))
        }
    }

    fn test_agi_parts() -> (Arc<SkillRegistry>, Arc<MemoryStore>, Arc<PerceptionLayer>, Arc<ReflexLayer>) {
        let skills_db = Database::open_in_memory(migrate_skills_db).unwrap();
        let state_db = Database::open_in_memory(migrate_state_db).unwrap();
        let skills = Arc::new(SkillRegistry::new(skills_db));
        let memory = Arc::new(MemoryStore::new(ShortTermMemory::new(), LongTermMemory::new(state_db.clone())));
        let perception = Arc::new(PerceptionLayer::new(PerceptionStore::new(state_db)));
        let reflexes = Arc::new(ReflexLayer::new());
        (skills, memory, perception, reflexes)
    }

    fn router_for(classes: Vec<(TaskClass, &str)>) -> Arc<ModelRouter> {
        let mut builder = ModelRouter::builder();
        for (idx, (task_class, reply)) in classes.into_iter().enumerate() {
            let name: &'static str = Box::leak(format!("fixed_{idx}").into_boxed_str());
            builder = builder
                .provider(Arc::new(FixedProvider {
                    name,
                    reply: reply.to_string(),
                }))
                .priority(task_class, vec![ModelCandidate::new(name, "m1")]);
        }
        Arc::new(builder.build())
    }

    #[tokio::test]
    async fn chat_intent_takes_the_fast_path_without_a_plan() {
        let (skills, memory, perception, reflexes) = test_agi_parts();
        let router = router_for(vec![(TaskClass::Fast, "CHAT"), (TaskClass::General, "Hello there!")]);
        let agi = AgiBuilder::new(router, memory, skills, perception, reflexes).build().await.unwrap();

        let outcome = agi.execute("hi", None, false).await.unwrap();
        assert!(outcome.chat_fast_path);
        assert!(outcome.outcome.is_none());
        assert_eq!(outcome.reply, "Hello there!");
    }

    #[tokio::test]
    async fn non_chat_intent_runs_the_planner_and_orchestrator() {
        const PLAN_JSON: &str = r#"{
            "reasoning": "trivial",
            "actions": [{"id": "a1", "skill": "general_chat", "description": "chat", "inputs": {"message": "hi"}, "input_refs": {}, "output_schema": {}, "depends_on": []}],
            "expected_outcome": "done"
        }"#;
        let (skills, memory, perception, reflexes) = test_agi_parts();
        let router = router_for(vec![
            (TaskClass::Fast, "PLAN"),
            (TaskClass::Planning, PLAN_JSON),
            (TaskClass::General, "Plan path reply"),
        ]);
        let agi = AgiBuilder::new(router, memory, skills, perception, reflexes).build().await.unwrap();

        let outcome = agi.execute("do something", None, false).await.unwrap();
        assert!(!outcome.chat_fast_path);
        assert!(outcome.outcome.is_some());
        assert_eq!(outcome.reply, "Plan path reply");
    }

    #[tokio::test]
    async fn handle_sensor_event_triggers_the_voice_commander_reflex() {
        let (skills, memory, perception, reflexes) = test_agi_parts();
        let router = router_for(vec![(TaskClass::Fast, "neutral")]);
        let agi = AgiBuilder::new(router, memory, skills, perception, reflexes).build().await.unwrap();

        let event = json!({
            "type": "voice_input",
            "source": "sensor_ear",
            "payload": {"text": "turn on the lights", "status": "success"}
        });
        let results = agi.handle_sensor_event(&event).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[tokio::test]
    async fn handle_sensor_event_ignores_unrelated_events() {
        let (skills, memory, perception, reflexes) = test_agi_parts();
        let router = router_for(vec![(TaskClass::Fast, "neutral")]);
        let agi = AgiBuilder::new(router, memory, skills, perception, reflexes).build().await.unwrap();

        let event = json!({"type": "time_event", "source": "sensor_time", "payload": {}});
        let results = agi.handle_sensor_event(&event).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn with_audio_gate_shares_the_caller_s_gate_with_the_speak_skill() {
        let (skills, memory, perception, reflexes) = test_agi_parts();
        let router = router_for(vec![(TaskClass::Fast, "neutral")]);
        let gate = AudioGate::new();
        let strong_count_before = Arc::strong_count(&gate);
        let agi = AgiBuilder::new(router, memory, skills, perception, reflexes)
            .with_audio_gate(Arc::clone(&gate))
            .build()
            .await
            .unwrap();

        // `build` consumed the clone `with_audio_gate` made and handed its
        // own clone to `SpeakSkill`, so one extra owner remains beyond the
        // caller's own handle — proof the same gate was actually shared.
        assert_eq!(Arc::strong_count(&gate), strong_count_before + 1);

        let speak = agi.skills.get("speak").unwrap();
        let mut inputs = HashMap::new();
        inputs.insert("text".to_string(), Value::String("hi".to_string()));
        speak.execute(inputs).await.unwrap();
        assert!(!gate.is_speaking());
    }

    #[test]
    fn resolve_reply_falls_back_to_default_when_no_recognised_key_is_present() {
        let outcome = ExecutionOutcome {
            success: true,
            result: Some(HashMap::from([("analysis".to_string(), Value::String("x".to_string()))])),
            errors: vec![],
            state: zappy_core::execution::ExecutionState::new(vec!["a1".to_string()]),
        };
        assert_eq!(resolve_reply(&outcome), DEFAULT_REPLY);
    }

    #[test]
    fn merge_context_folds_caller_keys_over_the_base_and_wins_conflicts() {
        let base = json!({"working_memory": [], "scope": "default"});
        let extra = Some(json!({"scope": "override", "user_id": "u1"}));
        let merged = merge_context(base, extra);
        assert_eq!(merged["working_memory"], json!([]));
        assert_eq!(merged["scope"], json!("override"));
        assert_eq!(merged["user_id"], json!("u1"));
    }

    #[test]
    fn merge_context_ignores_a_non_object_caller_context() {
        let base = json!({"working_memory": []});
        let merged = merge_context(base.clone(), Some(json!("not an object")));
        assert_eq!(merged, base);
    }

    #[test]
    fn merge_context_passes_base_through_unchanged_when_no_context_given() {
        let base = json!({"working_memory": []});
        let merged = merge_context(base.clone(), None);
        assert_eq!(merged, base);
    }
}
