use serde_json::Value;

/// Static description of a perception module (§4.5).
#[derive(Debug, Clone)]
pub struct PerceptionMetadata {
    /// Unique module name.
    pub name: String,
    /// Summary folded into retrieval and planning prompts.
    pub description: String,
    /// Broad taxonomic category.
    pub category: String,
    /// Narrower taxonomic category.
    pub sub_category: String,
    /// Free-form version string.
    pub version: String,
    /// Declares required runtime settings, if any.
    pub config_schema: Option<Value>,
}

impl PerceptionMetadata {
    /// Builds metadata with `"general"`/`"general"` category defaults,
    /// matching the distilled source's dataclass defaults.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: "general".to_string(),
            sub_category: "general".to_string(),
            version: "0.1.0".to_string(),
            config_schema: None,
        }
    }

    /// Sets the category/sub-category pair.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>, sub_category: impl Into<String>) -> Self {
        self.category = category.into();
        self.sub_category = sub_category.into();
        self
    }
}

/// A sensing module that gathers data from the environment and normalises it
/// for the runtime (§4.5). Implementors may be built-in or dynamically
/// loaded.
#[async_trait::async_trait]
pub trait PerceptionModule: Send + Sync {
    /// Static description of this module.
    fn metadata(&self) -> &PerceptionMetadata;

    /// Establishes a connection to the perception source, if any is needed.
    async fn connect(&self) -> bool {
        true
    }

    /// Gathers perception data, optionally focused by `query`.
    async fn perceive(&self, query: Option<&str>) -> Value;

    /// Releases any held resources. Default is a no-op.
    async fn disconnect(&self) {}
}
