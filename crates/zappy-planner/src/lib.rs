#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Synthesises a goal into a dependency-ordered DAG of actions, streams the
//! reasoning process as it happens, and rebuilds a continuation plan after a
//! MAJOR-priority failure (§4.8).

mod context;
mod prompt;
mod schema;

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use zappy_core::action::Plan;
use zappy_core::error::RuntimeError;
use zappy_core::event::{Event, EventPhase};
use zappy_core::json_extract::extract_json;
use zappy_core::skill::SkillMetadata;
use zappy_logging::{JsonLogger, LogLevel};
use zappy_model_router::{ChatMessage, ModelRouter, ModelRouterError, TaskClass};
use zappy_perception::PerceptionLayer;

use crate::context::gather_relevant_context;
use crate::prompt::{build_planning_prompt, build_replan_goal, render_system_prompt};
use crate::schema::{into_plan, ActionPlanSchema};

/// Stable identifier recorded in [`zappy_core::action::PlanMetadata::planner`].
const PLANNER_NAME: &str = "dag_planner";

/// Failures from plan synthesis or replan.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// The underlying model call failed.
    #[error("model call failed: {0}")]
    Model(#[from] ModelRouterError),
    /// The model's response was not valid JSON.
    #[error("planner response was not valid JSON: {0}")]
    MalformedResponse(String),
    /// The parsed plan failed DAG or skill-reference validation.
    #[error("plan failed validation: {0}")]
    Validation(String),
}

impl From<PlannerError> for RuntimeError {
    fn from(err: PlannerError) -> Self {
        match err {
            PlannerError::Model(inner) => inner.into(),
            PlannerError::MalformedResponse(_) | PlannerError::Validation(_) => Self::Validation(err.to_string()),
        }
    }
}

/// Turns a goal plus candidate skills into an executable [`Plan`] (§4.8).
pub struct Planner {
    router: Arc<ModelRouter>,
    perception: Option<Arc<PerceptionLayer>>,
    logger: Option<Arc<JsonLogger>>,
    temperature: f32,
    max_tokens: u32,
}

impl Planner {
    /// Wires a model router; context gathering, logging, and generation
    /// parameters are opt-in via the builder methods below.
    #[must_use]
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self {
            router,
            perception: None,
            logger: None,
            temperature: 0.2,
            max_tokens: 4096,
        }
    }

    /// Enables best-effort sensor context gathering ahead of planning.
    #[must_use]
    pub fn with_perception(mut self, perception: Arc<PerceptionLayer>) -> Self {
        self.perception = Some(perception);
        self
    }

    /// Attaches a structured logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<JsonLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Overrides the default sampling temperature and token budget.
    #[must_use]
    pub const fn with_generation_params(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Builds a plan for `goal`, gathering sensor context, rendering the
    /// system prompt from `skills`, and validating the model's JSON
    /// response against DAG and skill-reference invariants.
    pub async fn create_plan(&self, goal: &str, context: Value, skills: &[SkillMetadata]) -> Result<Plan, PlannerError> {
        let merged_context = merge_sensor_context(
            context,
            gather_relevant_context(goal, &self.router, self.perception.as_ref(), self.logger.as_deref()).await,
        );
        let raw = self.call_model(goal, &merged_context, skills).await?;
        let plan = parse_and_validate(goal, &raw, skills, merged_context)?;
        if let Some(logger) = &self.logger {
            logger.event(
                LogLevel::Info,
                "planner.create_plan.completed",
                json!({"goal": goal, "action_count": plan.actions.len()}),
            );
        }
        Ok(plan)
    }

    /// Same pipeline as [`Planner::create_plan`], yielding
    /// [`Event::PlanStarted`], [`Event::ContextGathered`], a
    /// [`Event::ReasoningToken`] per streamed chunk, and finally either
    /// [`Event::PlanComplete`] or [`Event::PlanningError`].
    pub async fn create_plan_streaming(&self, goal: &str, context: Value, skills: &[SkillMetadata]) -> BoxStream<'static, Event> {
        let started = Event::PlanStarted {
            phase: EventPhase::Planning,
            goal: goal.to_string(),
        };
        let merged_context = merge_sensor_context(
            context,
            gather_relevant_context(goal, &self.router, self.perception.as_ref(), self.logger.as_deref()).await,
        );
        let context_event = Event::ContextGathered {
            phase: EventPhase::Planning,
            context: merged_context.clone(),
        };

        let system_prompt = render_system_prompt(skills);
        let user_prompt = build_planning_prompt(goal, &merged_context);
        let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)];

        match self
            .router
            .stream_chat(TaskClass::Planning, &messages, self.temperature, self.max_tokens)
            .await
        {
            Ok(inner) => {
                let state = FinalizeState {
                    inner,
                    content: String::new(),
                    goal: goal.to_string(),
                    skills: skills.to_vec(),
                    context: merged_context,
                    done: false,
                };
                let tail = stream::unfold(state, finalize_step);
                Box::pin(stream::iter(vec![started, context_event]).chain(tail))
            }
            Err(err) => Box::pin(stream::iter(vec![
                started,
                context_event,
                Event::PlanningError {
                    phase: EventPhase::Planning,
                    error: err.to_string(),
                },
            ])),
        }
    }

    /// Builds a continuation plan for the remaining work after a
    /// MAJOR-priority failure, per §4.8: the new goal describes what
    /// completed, what failed, and why, so the DAG does not redo completed
    /// work.
    pub async fn replan(
        &self,
        original_goal: &str,
        failed_step: &str,
        error: &str,
        completed_steps: &[String],
        skills: &[SkillMetadata],
    ) -> Result<Plan, PlannerError> {
        let goal = build_replan_goal(original_goal, failed_step, error, completed_steps);
        let context = json!({
            "original_goal": original_goal,
            "completed_actions": completed_steps,
            "failed_action": failed_step,
            "error": error,
        });
        self.create_plan(&goal, context, skills).await
    }

    async fn call_model(&self, goal: &str, context: &Value, skills: &[SkillMetadata]) -> Result<String, PlannerError> {
        let system_prompt = render_system_prompt(skills);
        let user_prompt = build_planning_prompt(goal, context);
        let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)];
        Ok(self.router.chat(TaskClass::Planning, &messages, self.temperature, self.max_tokens).await?)
    }
}

struct FinalizeState {
    inner: BoxStream<'static, Result<String, ModelRouterError>>,
    content: String,
    goal: String,
    skills: Vec<SkillMetadata>,
    context: Value,
    done: bool,
}

async fn finalize_step(mut state: FinalizeState) -> Option<(Event, FinalizeState)> {
    if state.done {
        return None;
    }
    match state.inner.next().await {
        Some(Ok(token)) => {
            state.content.push_str(&token);
            let event = Event::ReasoningToken {
                phase: EventPhase::Planning,
                token,
                partial_content: state.content.clone(),
            };
            Some((event, state))
        }
        Some(Err(err)) => {
            state.done = true;
            let event = Event::PlanningError {
                phase: EventPhase::Planning,
                error: err.to_string(),
            };
            Some((event, state))
        }
        None => {
            state.done = true;
            let event = match parse_and_validate(&state.goal, &state.content, &state.skills, state.context.clone()) {
                Ok(plan) => Event::PlanComplete { phase: EventPhase::Planning, plan },
                Err(err) => Event::PlanningError {
                    phase: EventPhase::Planning,
                    error: err.to_string(),
                },
            };
            Some((event, state))
        }
    }
}

fn parse_and_validate(goal: &str, raw: &str, skills: &[SkillMetadata], context: Value) -> Result<Plan, PlannerError> {
    let value = extract_json(raw).ok_or_else(|| {
        PlannerError::MalformedResponse("no JSON object found in the model's reply".to_string())
    })?;
    let parsed: ActionPlanSchema =
        serde_json::from_value(value).map_err(|e| PlannerError::MalformedResponse(e.to_string()))?;
    // The chosen model string is an internal detail of `ModelRouter::select`
    // and is not surfaced to callers; record the task class instead.
    let plan = into_plan(goal.to_string(), parsed, PLANNER_NAME, "planning", context);
    let known_skills: HashSet<String> = skills.iter().map(|s| s.name.clone()).collect();
    plan.validate(Some(&known_skills)).map_err(|e| PlannerError::Validation(e.to_string()))?;
    Ok(plan)
}

fn merge_sensor_context(base: Value, gathered: Value) -> Value {
    let mut map = match base {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    if let Value::Object(gathered_map) = gathered {
        for (key, value) in gathered_map {
            map.insert(key, value);
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use zappy_model_router::ModelCandidate;

    struct FixedProvider {
        name: &'static str,
        reply: String,
    }

    #[async_trait]
    impl zappy_model_router::ModelProvider for FixedProvider {
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
            let chunks: Vec<Result<String, ModelRouterError>> =
                self.reply.as_bytes().chunks(8).map(|c| Ok(String::from_utf8_lossy(c).to_string())).collect();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    fn router_with_reply(reply: &str) -> Arc<ModelRouter> {
        Arc::new(
            ModelRouter::builder()
                .provider(Arc::new(FixedProvider {
                    name: "fixed",
                    reply: reply.to_string(),
                }))
                .priority(TaskClass::Planning, vec![ModelCandidate::new("fixed", "m1")])
                .priority(TaskClass::Fast, vec![ModelCandidate::new("fixed", "m1")])
                .build(),
        )
    }

    fn skill(name: &str) -> SkillMetadata {
        SkillMetadata {
            name: name.to_string(),
            description: String::new(),
            category: "general".to_string(),
            sub_category: String::new(),
            input_schema: json!({}),
            output_schema: json!({}),
            config_schema: None,
            dependencies: vec![],
            version: "0.1.0".to_string(),
            timeout_default_ms: 30_000,
        }
    }

    const VALID_PLAN_JSON: &str = r#"{
        "reasoning": "do the thing",
        "actions": [{"id": "action_1", "skill": "echo", "description": "say hi", "inputs": {}, "input_refs": {}, "output_schema": {}, "depends_on": []}],
        "expected_outcome": "a greeting"
    }"#;

    #[tokio::test]
    async fn valid_response_becomes_a_validated_plan() {
        let planner = Planner::new(router_with_reply(VALID_PLAN_JSON));
        let plan = planner.create_plan("say hi", json!({}), &[skill("echo")]).await.unwrap();
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].skill, "echo");
        assert_eq!(plan.metadata.planner, PLANNER_NAME);
    }

    #[tokio::test]
    async fn a_fenced_reply_wrapped_in_prose_still_parses() {
        let wrapped = format!("Sure, here's the plan:\n```json\n{VALID_PLAN_JSON}\n```\nLet me know if that works.");
        let planner = Planner::new(router_with_reply(&wrapped));
        let plan = planner.create_plan("say hi", json!({}), &[skill("echo")]).await.unwrap();
        assert_eq!(plan.actions.len(), 1);
    }

    #[tokio::test]
    async fn malformed_json_is_a_planner_error() {
        let planner = Planner::new(router_with_reply("not json"));
        let result = planner.create_plan("say hi", json!({}), &[skill("echo")]).await;
        assert!(matches!(result, Err(PlannerError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn unknown_skill_reference_fails_validation() {
        let planner = Planner::new(router_with_reply(VALID_PLAN_JSON));
        let result = planner.create_plan("say hi", json!({}), &[skill("other_skill")]).await;
        assert!(matches!(result, Err(PlannerError::Validation(_))));
    }

    #[tokio::test]
    async fn replan_goal_describes_continuation() {
        let planner = Planner::new(router_with_reply(VALID_PLAN_JSON));
        let plan = planner
            .replan("book a flight", "action_1", "timeout", &["action_0".to_string()], &[skill("echo")])
            .await
            .unwrap();
        assert!(plan.goal.contains("book a flight"));
        assert!(plan.goal.contains("action_1"));
        assert!(plan.goal.contains("timeout"));
    }

    #[tokio::test]
    async fn streaming_emits_tokens_then_plan_complete() {
        let planner = Planner::new(router_with_reply(VALID_PLAN_JSON));
        let events: Vec<Event> = planner.create_plan_streaming("say hi", json!({}), &[skill("echo")]).await.collect().await;

        assert!(matches!(events.first(), Some(Event::PlanStarted { .. })));
        assert!(events.iter().any(|e| matches!(e, Event::ReasoningToken { .. })));
        assert!(matches!(events.last(), Some(Event::PlanComplete { .. })));
    }
}
