use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use zappy_core::error::RuntimeError;
use zappy_core::skill::{Skill, SkillMetadata};

use crate::SkillRegistryError;

/// `connex.json`: the declarative manifest a dynamic skill directory must
/// carry (§4.2, §9). `type` selects one of [`BUILTIN_TEMPLATES`]; any other
/// value still loads, as a stub that reports a configuration error when run.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Unique skill name; becomes [`SkillMetadata::name`].
    pub name: String,
    /// Template key selecting which built-in implementation to wrap.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable summary.
    #[serde(default)]
    pub description: String,
    /// Broad category, used by retrieval.
    #[serde(default)]
    pub category: String,
    /// Template-specific parameters, passed through verbatim.
    #[serde(default)]
    pub params: Value,
}

/// `SKILL.md` YAML frontmatter: optional input/output schema metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillFrontmatter {
    /// JSON-Schema fragment for accepted inputs.
    #[serde(default)]
    pub input_schema: Option<Value>,
    /// JSON-Schema fragment (or simplified type map) for produced outputs.
    #[serde(default)]
    pub output_schema: Option<Value>,
}

/// Template keys recognised by `load_directory` (§4.2, §9).
pub const BUILTIN_TEMPLATES: &[&str] = &["http_request", "shell_echo"];

/// Reads `connex.json` (and optional `SKILL.md`) from `dir` and builds a
/// boxed [`Skill`] implementation. Never fails on an unrecognised `type`;
/// that becomes a [`StubSkill`] instead (§9 "loading never panics").
pub async fn load_skill_directory(dir: &Path) -> Result<Box<dyn Skill>, SkillRegistryError> {
    let manifest_path = dir.join("connex.json");
    let raw = tokio::fs::read_to_string(&manifest_path)
        .await
        .map_err(|e| SkillRegistryError::Manifest {
            path: dir.display().to_string(),
            detail: format!("failed to read connex.json: {e}"),
        })?;
    let manifest: Manifest = serde_json::from_str(&raw).map_err(|e| SkillRegistryError::Manifest {
        path: dir.display().to_string(),
        detail: format!("invalid connex.json: {e}"),
    })?;

    let frontmatter = read_frontmatter(&dir.join("SKILL.md")).await;

    let metadata = SkillMetadata {
        name: manifest.name.clone(),
        description: manifest.description.clone(),
        category: manifest.category.clone(),
        sub_category: String::new(),
        input_schema: frontmatter
            .as_ref()
            .and_then(|f| f.input_schema.clone())
            .unwrap_or_else(|| serde_json::json!({"properties": {}, "required": []})),
        output_schema: frontmatter
            .as_ref()
            .and_then(|f| f.output_schema.clone())
            .unwrap_or_else(|| serde_json::json!({})),
        config_schema: None,
        dependencies: vec![],
        version: "0.1.0".to_string(),
        timeout_default_ms: 30_000,
    };

    match manifest.kind.as_str() {
        "http_request" => Ok(Box::new(HttpRequestSkill { metadata, params: manifest.params })),
        "shell_echo" => Ok(Box::new(ShellEchoSkill { metadata })),
        other => Ok(Box::new(StubSkill {
            metadata,
            unimplemented_type: other.to_string(),
        })),
    }
}

async fn read_frontmatter(path: &Path) -> Option<SkillFrontmatter> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    let body = raw.strip_prefix("---\n").and_then(|rest| rest.split_once("\n---")).map(|(front, _)| front)?;
    serde_yaml::from_str(body).ok()
}

/// Built-in template: issues a GET/POST to a URL fixed in the manifest.
struct HttpRequestSkill {
    metadata: SkillMetadata,
    params: Value,
}

#[async_trait]
impl Skill for HttpRequestSkill {
    fn metadata(&self) -> &SkillMetadata {
        &self.metadata
    }

    async fn execute(&self, inputs: HashMap<String, Value>) -> Result<HashMap<String, Value>, RuntimeError> {
        let url = inputs
            .get("url")
            .and_then(Value::as_str)
            .or_else(|| self.params.get("url").and_then(Value::as_str))
            .ok_or_else(|| RuntimeError::Validation("http_request requires a `url`".to_string()))?;
        let method = self.params.get("method").and_then(Value::as_str).unwrap_or("GET");
        let client = reqwest::Client::new();
        let request = match method.to_uppercase().as_str() {
            "POST" => client.post(url),
            _ => client.get(url),
        };
        let response = request
            .send()
            .await
            .map_err(|e| RuntimeError::Execution(format!("http_request failed: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RuntimeError::Execution(format!("http_request body read failed: {e}")))?;
        let mut outputs = HashMap::new();
        outputs.insert("status".to_string(), Value::from(status));
        outputs.insert("body".to_string(), Value::from(body));
        Ok(outputs)
    }
}

/// Built-in template: echoes its `text` input back under `reply`.
struct ShellEchoSkill {
    metadata: SkillMetadata,
}

#[async_trait]
impl Skill for ShellEchoSkill {
    fn metadata(&self) -> &SkillMetadata {
        &self.metadata
    }

    async fn execute(&self, inputs: HashMap<String, Value>) -> Result<HashMap<String, Value>, RuntimeError> {
        let text = inputs.get("text").and_then(Value::as_str).unwrap_or_default();
        let mut outputs = HashMap::new();
        outputs.insert("reply".to_string(), Value::from(text));
        Ok(outputs)
    }
}

/// Stands in for a manifest whose `type` names no known template.
struct StubSkill {
    metadata: SkillMetadata,
    unimplemented_type: String,
}

#[async_trait]
impl Skill for StubSkill {
    fn metadata(&self) -> &SkillMetadata {
        &self.metadata
    }

    async fn execute(&self, _inputs: HashMap<String, Value>) -> Result<HashMap<String, Value>, RuntimeError> {
        Err(RuntimeError::Configuration {
            component: self.metadata.name.clone(),
            missing_keys: vec![],
            schema: serde_json::json!({"unimplemented_template": self.unimplemented_type}),
        })
    }
}
