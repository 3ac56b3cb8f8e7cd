use serde_json::Value;
use zappy_core::action::Action;

/// Static description of a reflex module (§4.6).
#[derive(Debug, Clone)]
pub struct ReflexMetadata {
    /// Unique module name.
    pub name: String,
    /// Human-readable summary.
    pub description: String,
    /// The kind of trigger this reflex watches for (`"webhook"`, `"event"`,
    /// `"schedule"`).
    pub trigger_type: String,
    /// Free-form version string.
    pub version: String,
    /// Declares required runtime settings, if any.
    pub config_schema: Option<Value>,
}

impl ReflexMetadata {
    /// Builds metadata with a `"0.1.0"` version default.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, trigger_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            trigger_type: trigger_type.into(),
            version: "0.1.0".to_string(),
            config_schema: None,
        }
    }
}

/// An automatic "if trigger then plan" unit that runs independent of the
/// deliberative planner until triggered (§4.6).
#[async_trait::async_trait]
pub trait ReflexModule: Send + Sync {
    /// Static description of this reflex.
    fn metadata(&self) -> &ReflexMetadata;

    /// Checks whether the incoming event triggers this reflex.
    async fn evaluate(&self, event: &Value) -> bool;

    /// Returns the actions to run once triggered.
    async fn get_plan(&self) -> Vec<Action>;
}
