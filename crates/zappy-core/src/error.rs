use serde_json::Value;
use thiserror::Error;

/// The six-member error taxonomy every subsystem ultimately maps into
/// (§7). Subsystem crates define their own narrower `thiserror` enums and
/// implement `From<SubsystemError> for RuntimeError`, so the facade's
/// outermost result is always renderable as exactly one of these kinds.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Missing credentials or runtime settings a skill declared as required.
    #[error("configuration required: {missing_keys:?}")]
    Configuration {
        /// Skill or component name that needs configuration.
        component: String,
        /// Keys that must be supplied before retrying.
        missing_keys: Vec<String>,
        /// Config schema describing the missing keys, when known.
        schema: Value,
    },
    /// Input schema violation, malformed plan JSON, or a DAG cycle.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A skill raised, timed out, or reported `success=false`.
    #[error("execution failed: {0}")]
    Execution(String),
    /// The Corrector returned nothing, or the corrected retry also failed.
    #[error("correction failed: {0}")]
    Correction(String),
    /// A model provider call failed transiently (rate limit, 5xx).
    #[error("transient model error: {0}")]
    TransientModel(String),
    /// An unrecoverable infrastructure failure (database down, loop
    /// stopped).
    #[error("fatal system error: {0}")]
    Fatal(String),
}

impl RuntimeError {
    /// Short machine-readable kind name, used when rendering `error` events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::Validation(_) => "validation_error",
            Self::Execution(_) => "execution_error",
            Self::Correction(_) => "correction_error",
            Self::TransientModel(_) => "transient_model_error",
            Self::Fatal(_) => "fatal_system_error",
        }
    }
}
