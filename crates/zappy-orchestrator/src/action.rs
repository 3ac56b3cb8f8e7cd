//! Per-action execution: resolve, check, invoke with a timeout, validate the
//! output, and in-place repair via the Corrector when it fails (§4.10).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use zappy_core::action::Action;
use zappy_core::error::RuntimeError;
use zappy_core::execution::{ExecutionState, StepResult};
use zappy_core::skill::Skill;
use zappy_corrector::Corrector;
use zappy_io_mapper::{declared_input_keys, resolve_inputs, validate_output};
use zappy_skill_registry::SkillHandle;

/// Overrides `default` with the action's own timeout when one is set.
pub(crate) fn timeout_for(action: &Action, default: Duration) -> Duration {
    action.metadata.timeout_override_ms.map_or(default, Duration::from_millis)
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn failure_result(action: &Action, inputs_used: HashMap<String, Value>, error: String, start: Instant) -> StepResult {
    StepResult {
        action_id: action.id.clone(),
        success: false,
        output: HashMap::new(),
        error: Some(error),
        duration_ms: elapsed_ms(start),
        inputs_used,
        corrected: false,
    }
}

/// Runs one action to completion: skill lookup, config check, input
/// resolution, validation, timed invocation, and output validation.
///
/// Returns `Ok(StepResult)` for every ordinary outcome, success or failure.
/// The only `Err` case is a missing-configuration failure, which the caller
/// must treat as terminal (§4.10 step 2b).
pub(crate) async fn run_action(
    skill: Result<SkillHandle, RuntimeError>,
    action: &Action,
    state: &ExecutionState,
    default_timeout: Duration,
) -> Result<StepResult, RuntimeError> {
    let start = Instant::now();
    let skill = match skill {
        Ok(skill) => skill,
        Err(err) => return Ok(failure_result(action, HashMap::new(), err.to_string(), start)),
    };

    if let Err(err) = skill.check_config() {
        if matches!(err, RuntimeError::Configuration { .. }) {
            return Err(err);
        }
        return Ok(failure_result(action, HashMap::new(), err.to_string(), start));
    }

    let inputs = match resolve_inputs(action, state, Some(skill.metadata())) {
        Ok(inputs) => inputs,
        Err(err) => return Ok(failure_result(action, HashMap::new(), err.to_string(), start)),
    };

    if let Err(err) = skill.validate_inputs(&inputs) {
        return Ok(failure_result(action, inputs, err.to_string(), start));
    }

    let timeout = timeout_for(action, default_timeout);
    let outcome = tokio::time::timeout(timeout, skill.execute(inputs.clone())).await;
    let raw_output = match outcome {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => return Ok(failure_result(action, inputs, err.to_string(), start)),
        Err(_) => {
            return Ok(failure_result(
                action,
                inputs,
                format!("action '{}' timed out after {}ms", action.id, timeout.as_millis()),
                start,
            ))
        }
    };

    let output = validate_output(raw_output, &action.expected_output, &action.id);
    if output.get("success") == Some(&Value::Bool(false)) {
        let message = output
            .get("error")
            .or_else(|| output.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("skill reported failure without a message")
            .to_string();
        return Ok(failure_result(action, inputs, message, start));
    }

    Ok(StepResult {
        action_id: action.id.clone(),
        success: true,
        output,
        error: None,
        duration_ms: elapsed_ms(start),
        inputs_used: inputs,
        corrected: false,
    })
}

/// Attempts one in-place repair of `failed` via the Corrector: a proposed
/// input patch, sanitised down to the skill's declared input keys, retried
/// once against the same timeout budget. `None` means no repair happened;
/// the caller falls through to priority-based escalation (§4.11).
pub(crate) async fn attempt_correction(
    corrector: &Corrector,
    skill: &dyn Skill,
    action: &Action,
    failed: &StepResult,
    default_timeout: Duration,
) -> Option<StepResult> {
    if failed.inputs_used.is_empty() {
        return None;
    }
    let error_message = failed.error.clone().unwrap_or_default();
    let patch = corrector.correct(&action.skill, &failed.inputs_used, &error_message).await?;

    let valid_keys = declared_input_keys(&skill.metadata().input_schema);
    let sanitized: HashMap<String, Value> = if valid_keys.is_empty() {
        patch
    } else {
        patch.into_iter().filter(|(key, _)| valid_keys.contains(key)).collect()
    };

    let timeout = timeout_for(action, default_timeout);
    let start = Instant::now();
    let output = match tokio::time::timeout(timeout, skill.execute(sanitized.clone())).await {
        Ok(Ok(output)) => output,
        _ => return None,
    };

    let output = validate_output(output, &action.expected_output, &action.id);
    if output.get("success") == Some(&Value::Bool(false)) {
        return None;
    }

    Some(StepResult {
        action_id: action.id.clone(),
        success: true,
        output,
        error: None,
        duration_ms: elapsed_ms(start),
        inputs_used: sanitized,
        corrected: true,
    })
}
