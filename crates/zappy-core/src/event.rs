use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::Plan;

/// Which pipeline phase emitted an [`Event`], per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    /// Intent classification and plan synthesis.
    Planning,
    /// DAG execution and repair.
    Execution,
    /// Reflex/sensor-driven background activity.
    Motivation,
}

/// The runtime-wide typed event vocabulary (§3, §6). Emitted strictly
/// sequentially within one execution; consumed either locally (facade
/// `execute_streaming`) or relayed over SSE by an external HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The fast-model intent classifier produced a verdict.
    IntentDetected {
        /// Emitting phase.
        phase: EventPhase,
        /// One of `CHAT | RESEARCH | SINGLE_ACTION | PLAN`.
        intent: String,
    },
    /// Plan synthesis has begun.
    PlanStarted {
        /// Emitting phase.
        phase: EventPhase,
        /// The goal being planned for.
        goal: String,
    },
    /// A token streamed from the planning model.
    ReasoningToken {
        /// Emitting phase.
        phase: EventPhase,
        /// The newly streamed token.
        token: String,
        /// The accumulated partial content so far.
        partial_content: String,
    },
    /// Best-effort sensor context was folded into the planning prompt.
    ContextGathered {
        /// Emitting phase.
        phase: EventPhase,
        /// The captured context, possibly empty.
        context: Value,
    },
    /// Plan synthesis finished successfully.
    PlanComplete {
        /// Emitting phase.
        phase: EventPhase,
        /// The synthesised plan.
        plan: Plan,
    },
    /// Plan synthesis failed.
    PlanningError {
        /// Emitting phase.
        phase: EventPhase,
        /// Human-readable error.
        error: String,
    },
    /// DAG execution has begun.
    ExecutionStarted {
        /// Emitting phase.
        phase: EventPhase,
        /// Total action count in the plan.
        action_count: usize,
    },
    /// A new topological level has begun executing.
    LevelStarted {
        /// Emitting phase.
        phase: EventPhase,
        /// 1-based level index.
        level: usize,
        /// Action ids running concurrently in this level.
        actions: Vec<String>,
    },
    /// A single action began executing.
    ActionStarted {
        /// Emitting phase.
        phase: EventPhase,
        /// The action id.
        action_id: String,
        /// The skill it is bound to.
        skill: String,
    },
    /// A single action completed successfully.
    ActionCompleted {
        /// Emitting phase.
        phase: EventPhase,
        /// The action id.
        action_id: String,
        /// The action's (possibly corrected) output map.
        output: Value,
        /// `true` if this completion followed a Corrector retry.
        corrected: bool,
    },
    /// A single action failed terminally.
    ActionFailed {
        /// Emitting phase.
        phase: EventPhase,
        /// The action id.
        action_id: String,
        /// Human-readable error.
        error: String,
    },
    /// An in-place repair attempt has begun for a failed action.
    CorrectionStarted {
        /// Emitting phase.
        phase: EventPhase,
        /// The action id being repaired.
        action_id: String,
    },
    /// DAG execution finished, successfully or not.
    ExecutionCompleted {
        /// Emitting phase.
        phase: EventPhase,
        /// Overall success.
        success: bool,
        /// The final resolved reply, if any.
        result: Option<Value>,
        /// Errors collected along the way, if the run aborted.
        errors: Vec<String>,
    },
    /// An unrecoverable error terminated the current operation.
    Error {
        /// Emitting phase.
        phase: EventPhase,
        /// Machine-readable error kind, from [`crate::error::RuntimeError::kind`].
        kind: String,
        /// Human-readable message.
        message: String,
    },
    /// A skill cannot run until an operator supplies configuration.
    ConfigRequired {
        /// Emitting phase.
        phase: EventPhase,
        /// The skill needing configuration.
        skill: String,
        /// The missing config keys.
        missing_keys: Vec<String>,
        /// Schema describing the missing keys.
        schema: Value,
    },
}

impl Event {
    /// The phase tag carried by every variant.
    #[must_use]
    pub const fn phase(&self) -> EventPhase {
        match self {
            Self::IntentDetected { phase, .. }
            | Self::PlanStarted { phase, .. }
            | Self::ReasoningToken { phase, .. }
            | Self::ContextGathered { phase, .. }
            | Self::PlanComplete { phase, .. }
            | Self::PlanningError { phase, .. }
            | Self::ExecutionStarted { phase, .. }
            | Self::LevelStarted { phase, .. }
            | Self::ActionStarted { phase, .. }
            | Self::ActionCompleted { phase, .. }
            | Self::ActionFailed { phase, .. }
            | Self::CorrectionStarted { phase, .. }
            | Self::ExecutionCompleted { phase, .. }
            | Self::Error { phase, .. }
            | Self::ConfigRequired { phase, .. } => *phase,
        }
    }
}
