use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use zappy_core::skill::{Skill, SkillMetadata};
use zappy_logging::{JsonLogger, LogLevel};
use zappy_model_router::ModelRouter;
use zappy_persistence::Database;

use crate::loader::load_skill_directory;
use crate::retrieval::{score_candidates, SkillHit};
use crate::store::SkillStore;
use crate::SkillRegistryError;

/// Shared handle to a registered skill, cheap to clone and send across the
/// Orchestrator's concurrent action dispatch.
pub type SkillHandle = Arc<dyn Skill>;

/// Loads, persists, and serves semantic retrieval over the installed skill
/// set (§4.2). Mirrors the distilled source's `SkillDock` registry: one
/// in-memory map of live [`Skill`] objects, backed by a SQLite store of
/// metadata, embeddings, and per-skill config.
pub struct SkillRegistry {
    skills: RwLock<IndexMap<String, SkillHandle>>,
    store: SkillStore,
    logger: Option<Arc<JsonLogger>>,
}

impl SkillRegistry {
    /// Wraps an already-migrated skills database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            skills: RwLock::new(IndexMap::new()),
            store: SkillStore::new(db),
            logger: None,
        }
    }

    /// Attaches a structured logger; registration and load failures are
    /// logged through it if present.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn with_logger(mut self, logger: Arc<JsonLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The underlying skills database, for built-in skills that need to read
    /// their own persisted config outside the `execute` call path (e.g. a
    /// config-gated skill's synchronous `check_config`).
    #[must_use]
    pub const fn store(&self) -> &SkillStore {
        &self.store
    }

    /// Installs `skill`, upserting its metadata. Replacing an existing name
    /// is allowed and logged.
    pub fn register(&self, skill: SkillHandle) -> Result<(), SkillRegistryError> {
        let metadata = skill.metadata().clone();
        let replaced = self.skills.read().contains_key(&metadata.name);
        self.store.upsert_metadata(&metadata)?;
        self.skills.write().insert(metadata.name.clone(), skill);
        if let Some(logger) = &self.logger {
            logger.event(
                LogLevel::Info,
                "skill_registry.skill.registered",
                serde_json::json!({"name": metadata.name, "replaced": replaced}),
            );
        }
        Ok(())
    }

    /// Looks up a live skill by name.
    pub fn get(&self, name: &str) -> Result<SkillHandle, SkillRegistryError> {
        self.skills
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SkillRegistryError::NotFound(name.to_string()))
    }

    /// Metadata for every registered skill, optionally including disabled
    /// ones.
    pub fn list(&self, include_disabled: bool) -> Result<Vec<SkillMetadata>, SkillRegistryError> {
        let mut out = Vec::new();
        for skill in self.skills.read().values() {
            let metadata = skill.metadata();
            if include_disabled || self.store.is_enabled(&metadata.name)? {
                out.push(metadata.clone());
            }
        }
        Ok(out)
    }

    /// Ranks registered skills against `query` (§4.2 retrieval algorithm),
    /// embedding the query first when the router has an embedding-capable
    /// provider configured.
    pub async fn retrieve_relevant(
        &self,
        router: &ModelRouter,
        query: &str,
        limit: usize,
        category: Option<&str>,
        sub_category: Option<&str>,
    ) -> Result<Vec<SkillHit>, SkillRegistryError> {
        let query_embedding = if router.has_embedding_provider() {
            Some(router.embed(query).await?)
        } else {
            None
        };
        let metadata = self.list(false)?;
        let embeddings: HashMap<String, Vec<f32>> = self.store.all_embeddings()?.into_iter().collect();
        let store = &self.store;
        let enabled = move |name: &str| store.is_enabled(name).unwrap_or(false);
        Ok(score_candidates(
            query,
            query_embedding.as_deref(),
            &metadata,
            &embeddings,
            category,
            sub_category,
            &enabled,
            limit,
        ))
    }

    /// Merges `patch` into a skill's persisted config.
    pub fn update_config(&self, name: &str, patch: &Value) -> Result<Value, SkillRegistryError> {
        if !self.skills.read().contains_key(name) {
            return Err(SkillRegistryError::NotFound(name.to_string()));
        }
        self.store.update_config(name, patch)
    }

    /// Scans `root` for subdirectories containing a `connex.json` manifest
    /// and registers each as a dynamic skill. Individual directory failures
    /// are logged and skipped rather than aborting the whole scan.
    pub async fn load_directory(&self, root: &Path) -> Result<usize, SkillRegistryError> {
        let mut entries = tokio::fs::read_dir(root).await.map_err(|e| SkillRegistryError::Manifest {
            path: root.display().to_string(),
            detail: e.to_string(),
        })?;
        let mut loaded = 0usize;
        while let Some(entry) = entries.next_entry().await.map_err(|e| SkillRegistryError::Manifest {
            path: root.display().to_string(),
            detail: e.to_string(),
        })? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if !path.join("connex.json").exists() {
                continue;
            }
            match load_skill_directory(&path).await {
                Ok(skill) => {
                    self.register(Arc::from(skill))?;
                    loaded += 1;
                }
                Err(err) => {
                    if let Some(logger) = &self.logger {
                        logger.event(
                            LogLevel::Warn,
                            "skill_registry.directory.load_failed",
                            serde_json::json!({"path": path.display().to_string(), "error": err.to_string()}),
                        );
                    }
                }
            }
        }
        Ok(loaded)
    }

    /// Computes and persists an embedding for every registered skill that is
    /// missing one.
    pub async fn ensure_embeddings(&self, router: &ModelRouter) -> Result<usize, SkillRegistryError> {
        let missing = self.store.missing_embeddings()?;
        let mut embedded = 0usize;
        for name in missing {
            let Ok(skill) = self.get(&name) else { continue };
            let vector = router.embed(&skill.metadata().description).await?;
            self.store.set_embedding(&name, &vector)?;
            embedded += 1;
        }
        Ok(embedded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use std::collections::HashMap as StdHashMap;
    use zappy_core::error::RuntimeError;
    use zappy_model_router::{ChatMessage, ModelProvider, ModelRouterError};
    use zappy_persistence::migrate_skills_db;

    struct EchoSkill {
        metadata: SkillMetadata,
    }

    #[async_trait]
    impl Skill for EchoSkill {
        fn metadata(&self) -> &SkillMetadata {
            &self.metadata
        }

        async fn execute(&self, inputs: StdHashMap<String, Value>) -> Result<StdHashMap<String, Value>, RuntimeError> {
            Ok(inputs)
        }
    }

    fn metadata(name: &str, category: &str, description: &str) -> SkillMetadata {
        SkillMetadata {
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            sub_category: String::new(),
            input_schema: serde_json::json!({}),
            output_schema: serde_json::json!({}),
            config_schema: None,
            dependencies: vec![],
            version: "0.1.0".into(),
            timeout_default_ms: 30_000,
        }
    }

    fn registry() -> SkillRegistry {
        SkillRegistry::new(Database::open_in_memory(migrate_skills_db).unwrap())
    }

    struct FakeEmbedder;

    #[async_trait]
    impl ModelProvider for FakeEmbedder {
        fn name(&self) -> &str {
            "fake"
        }
        fn is_configured(&self) -> bool {
            true
        }
        fn supports_embeddings(&self) -> bool {
            true
        }
        async fn chat(&self, _: &str, _: &[ChatMessage], _: f32, _: u32) -> Result<String, ModelRouterError> {
            Ok(String::new())
        }
        async fn stream_chat(
            &self,
            _: &str,
            _: &[ChatMessage],
            _: f32,
            _: u32,
        ) -> Result<BoxStream<'static, Result<String, ModelRouterError>>, ModelRouterError> {
            Ok(Box::pin(stream::empty()))
        }
        async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>, ModelRouterError> {
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[test]
    fn register_then_get_round_trips() {
        let registry = registry();
        let skill = Arc::new(EchoSkill {
            metadata: metadata("echo", "io", "echoes input back"),
        });
        registry.register(skill).unwrap();
        assert!(registry.get("echo").is_ok());
        assert!(registry.get("missing").is_err());
    }

    #[tokio::test]
    async fn ensure_embeddings_fills_in_missing_vectors() {
        let registry = registry();
        registry
            .register(Arc::new(EchoSkill {
                metadata: metadata("echo", "io", "echoes input back"),
            }))
            .unwrap();
        let router = ModelRouter::builder().provider(Arc::new(FakeEmbedder)).build();
        let embedded = registry.ensure_embeddings(&router).await.unwrap();
        assert_eq!(embedded, 1);
        assert!(registry.store.missing_embeddings().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retrieve_relevant_uses_lexical_boost_without_embeddings() {
        let registry = registry();
        registry
            .register(Arc::new(EchoSkill {
                metadata: metadata("web_search", "web", "search the web for information"),
            }))
            .unwrap();
        let router = ModelRouter::builder().build();
        let hits = registry
            .retrieve_relevant(&router, "search the web", 5, None, None)
            .await
            .unwrap();
        assert_eq!(hits[0].name, "web_search");
    }
}
