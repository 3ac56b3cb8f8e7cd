#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Executes a [`Plan`] level by level, in-place repairs failed actions, and
//! escalates unrepaired MAJOR failures to a full replan (§4.10).

mod action;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use tokio::sync::mpsc;
use zappy_core::action::{Action, ActionPriority, Plan};
use zappy_core::error::RuntimeError;
use zappy_core::event::{Event, EventPhase};
use zappy_core::execution::{ExecutionState, StepResult};
use zappy_corrector::Corrector;
use zappy_logging::{JsonLogger, LogLevel};
use zappy_planner::Planner;
use zappy_skill_registry::SkillRegistry;

use crate::action::{attempt_correction, run_action};

/// Default per-action timeout when neither the action nor the orchestrator
/// overrides it, matching the distilled source's `action_timeout: int = 60`.
const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of a full (possibly recursively re-planned) plan execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// `true` once every level ran to completion without a MAJOR abort.
    pub success: bool,
    /// The last completed action's output, if any action completed.
    pub result: Option<HashMap<String, Value>>,
    /// Errors recorded for MINOR/SKIPPABLE failures along the way.
    pub errors: Vec<String>,
    /// The full per-action state, for diagnostics and replay.
    pub state: ExecutionState,
}

/// Runs a [`Plan`]'s actions in dependency order, repairing and escalating
/// failures per §4.10. Cheap to clone: every field is an `Arc` or `Copy`, so
/// the streaming variant clones `self` into its background task rather than
/// requiring callers to hold an `Arc<Orchestrator>`.
#[derive(Clone)]
pub struct Orchestrator {
    skills: Arc<SkillRegistry>,
    corrector: Option<Arc<Corrector>>,
    planner: Option<Arc<Planner>>,
    logger: Option<Arc<JsonLogger>>,
    action_timeout: Duration,
}

impl Orchestrator {
    /// Wires a skill registry; self-correction and replan are opt-in via
    /// [`Orchestrator::with_self_correction`], logging via
    /// [`Orchestrator::with_logger`].
    #[must_use]
    pub fn new(skills: Arc<SkillRegistry>) -> Self {
        Self {
            skills,
            corrector: None,
            planner: None,
            logger: None,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    /// Enables in-place repair and MAJOR-failure replan. Without this, a
    /// MAJOR failure aborts the plan immediately and MINOR/SKIPPABLE
    /// failures are never retried.
    #[must_use]
    pub fn with_self_correction(mut self, corrector: Arc<Corrector>, planner: Arc<Planner>) -> Self {
        self.corrector = Some(corrector);
        self.planner = Some(planner);
        self
    }

    /// Attaches a structured logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<JsonLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Overrides the default 60-second per-action timeout.
    #[must_use]
    pub const fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Executes `plan` to completion, recursing into a freshly synthesised
    /// continuation plan after an unrepaired MAJOR failure (§4.8, §4.10).
    /// Returns `Err` only for an aborted plan: a MAJOR failure with
    /// self-correction disabled, a failed replan, or a skill that requires
    /// configuration the caller must supply.
    pub fn execute_plan(&self, plan: Plan) -> BoxFuture<'_, Result<ExecutionOutcome, RuntimeError>> {
        Box::pin(async move {
            if let Some(logger) = &self.logger {
                logger.event(
                    LogLevel::Info,
                    "orchestrator.execute_plan.started",
                    serde_json::json!({"goal": plan.goal, "action_count": plan.actions.len()}),
                );
            }

            let levels = plan.topological_generations()?;
            let ids: Vec<String> = plan.actions.iter().map(|a| a.id.clone()).collect();
            let by_id: HashMap<&str, &Action> = plan.actions.iter().map(|a| (a.id.as_str(), a)).collect();
            let mut state = ExecutionState::new(ids);
            let mut errors = Vec::new();
            let mut last_output: Option<HashMap<String, Value>> = None;

            for level in &levels {
                let results = self.run_level(level, &by_id, &state).await;
                for (action_id, outcome) in results {
                    let action = by_id[action_id.as_str()];
                    let failed = match outcome {
                        Err(err) => return Err(err),
                        Ok(result) if result.success => {
                            last_output = Some(result.output.clone());
                            state.mark_completed(result);
                            continue;
                        }
                        Ok(failed) => failed,
                    };

                    let repaired = self.try_repair(action, &failed).await;
                    if let Some(repaired) = repaired {
                        last_output = Some(repaired.output.clone());
                        state.mark_completed(repaired);
                        continue;
                    }

                    let error_text = failed.error.clone().unwrap_or_default();
                    state.mark_failed(failed);

                    match action.priority {
                        ActionPriority::Skippable => {}
                        ActionPriority::Minor => {
                            errors.push(error_text.clone());
                            if let Some(logger) = &self.logger {
                                logger.event(
                                    LogLevel::Warn,
                                    "orchestrator.action.minor_failure",
                                    serde_json::json!({"action_id": action.id, "error": error_text}),
                                );
                            }
                        }
                        ActionPriority::Major => {
                            if self.corrector.is_none() {
                                return Err(RuntimeError::Execution(format!(
                                    "MAJOR action '{}' failed and self-correction is disabled: {error_text}",
                                    action.id
                                )));
                            }
                            let Some(planner) = &self.planner else {
                                return Err(RuntimeError::Correction(
                                    "self-correction is enabled but no planner is wired for replan".to_string(),
                                ));
                            };
                            let new_plan = self.replan(planner, &plan, action, &state, &error_text).await?;
                            return self.execute_plan(new_plan).await;
                        }
                    }
                }
            }

            if let Some(logger) = &self.logger {
                logger.event(
                    LogLevel::Info,
                    "orchestrator.execute_plan.completed",
                    serde_json::json!({"goal": plan.goal, "failed_count": errors.len()}),
                );
            }

            Ok(ExecutionOutcome {
                success: true,
                result: last_output,
                errors,
                state,
            })
        })
    }

    /// Streams per-action lifecycle events in real time. Unlike
    /// [`Orchestrator::execute_plan`], a failure is never auto-repaired into
    /// a replan here: the stream yields [`Event::ActionFailed`] and stops,
    /// leaving the decision to retry to the caller.
    pub fn execute_plan_streaming(&self, plan: Plan) -> futures::stream::BoxStream<'static, Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run_streaming(plan, &tx).await;
        });
        Box::pin(futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|event| (event, rx)) }))
    }

    async fn run_streaming(&self, plan: Plan, tx: &mpsc::UnboundedSender<Event>) {
        let levels = match plan.topological_generations() {
            Ok(levels) => levels,
            Err(err) => {
                let _ = tx.send(Event::Error {
                    phase: EventPhase::Execution,
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                });
                return;
            }
        };

        let _ = tx.send(Event::ExecutionStarted {
            phase: EventPhase::Execution,
            action_count: plan.actions.len(),
        });

        let ids: Vec<String> = plan.actions.iter().map(|a| a.id.clone()).collect();
        let by_id: HashMap<&str, &Action> = plan.actions.iter().map(|a| (a.id.as_str(), a)).collect();
        let mut state = ExecutionState::new(ids);
        let mut last_output: Option<HashMap<String, Value>> = None;

        for (index, level) in levels.iter().enumerate() {
            let _ = tx.send(Event::LevelStarted {
                phase: EventPhase::Execution,
                level: index + 1,
                actions: level.clone(),
            });
            for action_id in level {
                let action = by_id[action_id.as_str()];
                let _ = tx.send(Event::ActionStarted {
                    phase: EventPhase::Execution,
                    action_id: action.id.clone(),
                    skill: action.skill.clone(),
                });
            }

            let results = self.run_level(level, &by_id, &state).await;
            for (action_id, outcome) in results {
                match outcome {
                    Err(RuntimeError::Configuration { component, missing_keys, schema }) => {
                        let _ = tx.send(Event::ConfigRequired {
                            phase: EventPhase::Execution,
                            skill: component,
                            missing_keys,
                            schema,
                        });
                        return;
                    }
                    Err(err) => {
                        let _ = tx.send(Event::Error {
                            phase: EventPhase::Execution,
                            kind: err.kind().to_string(),
                            message: err.to_string(),
                        });
                        return;
                    }
                    Ok(result) if result.success => {
                        let output = Value::Object(result.output.clone().into_iter().collect());
                        let corrected = result.corrected;
                        last_output = Some(result.output.clone());
                        state.mark_completed(result);
                        let _ = tx.send(Event::ActionCompleted {
                            phase: EventPhase::Execution,
                            action_id,
                            output,
                            corrected,
                        });
                    }
                    Ok(failed) => {
                        let error = failed.error.clone().unwrap_or_default();
                        state.mark_failed(failed);
                        let _ = tx.send(Event::ActionFailed {
                            phase: EventPhase::Execution,
                            action_id,
                            error: error.clone(),
                        });
                        let _ = tx.send(Event::ExecutionCompleted {
                            phase: EventPhase::Execution,
                            success: false,
                            result: None,
                            errors: vec![error],
                        });
                        return;
                    }
                }
            }
        }

        let final_output = last_output.map(|output| Value::Object(output.into_iter().collect()));
        let _ = tx.send(Event::ExecutionCompleted {
            phase: EventPhase::Execution,
            success: true,
            result: final_output,
            errors: vec![],
        });
    }

    async fn run_level<'a>(
        &self,
        level: &'a [String],
        by_id: &HashMap<&str, &'a Action>,
        state: &ExecutionState,
    ) -> Vec<(String, Result<StepResult, RuntimeError>)> {
        let tasks = level.iter().map(|action_id| {
            let action = by_id[action_id.as_str()];
            async move {
                let skill = self.skills.get(&action.skill).map_err(RuntimeError::from);
                let result = run_action(skill, action, state, self.action_timeout).await;
                (action_id.clone(), result)
            }
        });
        join_all(tasks).await
    }

    async fn try_repair(&self, action: &Action, failed: &StepResult) -> Option<StepResult> {
        let corrector = self.corrector.as_ref()?;
        let skill = self.skills.get(&action.skill).ok()?;
        attempt_correction(corrector, skill.as_ref(), action, failed, self.action_timeout).await
    }

    async fn replan(
        &self,
        planner: &Planner,
        plan: &Plan,
        failed_action: &Action,
        state: &ExecutionState,
        error: &str,
    ) -> Result<Plan, RuntimeError> {
        let completed: Vec<String> = state.completed().iter().cloned().collect();
        let skills = self.skills.list(false).map_err(RuntimeError::from)?;
        planner
            .replan(&plan.goal, &failed_action.id, error, &completed, &skills)
            .await
            .map_err(|err| RuntimeError::Correction(format!("replan failed: {err}")))
    }
}
