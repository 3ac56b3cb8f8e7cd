use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use zappy_config_store::perceptions::{PerceptionRow, PerceptionStore};
use zappy_logging::{JsonLogger, LogLevel};
use zappy_model_router::ModelRouter;

use crate::base::{PerceptionMetadata, PerceptionModule};
use crate::PerceptionError;

/// Live perception-module registry and search harness (§4.5). Mirrors the
/// distilled source's `PerceptionLayer`: an in-memory map of connected
/// modules, backed by the shared `perceptions` table for metadata and
/// embeddings.
pub struct PerceptionLayer {
    modules: RwLock<HashMap<String, Arc<dyn PerceptionModule>>>,
    store: PerceptionStore,
    logger: Option<Arc<JsonLogger>>,
}

impl PerceptionLayer {
    /// Wraps an already-migrated state database's perception table.
    #[must_use]
    pub fn new(store: PerceptionStore) -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
            store,
            logger: None,
        }
    }

    /// Attaches a structured logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<JsonLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Registers a live module instance, upserting its metadata. An existing
    /// embedding for the same name is preserved (`PerceptionStore::upsert`'s
    /// `COALESCE`).
    pub fn register_module(&self, module: Arc<dyn PerceptionModule>) -> Result<(), PerceptionError> {
        let metadata = module.metadata().clone();
        self.store.upsert(&PerceptionRow {
            name: metadata.name.clone(),
            description: metadata.description.clone(),
            category: metadata.category.clone(),
            sub_category: metadata.sub_category.clone(),
            kind: "built_in".to_string(),
            version: metadata.version.clone(),
            enabled: true,
        })?;
        self.modules.write().insert(metadata.name.clone(), module);
        if let Some(logger) = &self.logger {
            logger.event(
                LogLevel::Info,
                "perception.module.registered",
                serde_json::json!({"name": metadata.name}),
            );
        }
        Ok(())
    }

    /// A specific module instance, if registered.
    #[must_use]
    pub fn get_module(&self, name: &str) -> Option<Arc<dyn PerceptionModule>> {
        self.modules.read().get(name).cloned()
    }

    /// Maps every registered module's name to its description.
    #[must_use]
    pub fn available_sensors(&self) -> HashMap<String, String> {
        self.modules
            .read()
            .values()
            .map(|module| (module.metadata().name.clone(), module.metadata().description.clone()))
            .collect()
    }

    /// Requests perception from a specific module, connecting it first if
    /// needed.
    pub async fn perceive(&self, module_name: &str, query: Option<&str>) -> Result<Value, PerceptionError> {
        let module = self
            .get_module(module_name)
            .ok_or_else(|| PerceptionError::NotFound(module_name.to_string()))?;
        module.connect().await;
        Ok(module.perceive(query).await)
    }

    /// Generates and persists embeddings for every registered module that is
    /// missing one.
    pub async fn ensure_embeddings(&self, router: &ModelRouter) -> Result<usize, PerceptionError> {
        if !router.has_embedding_provider() {
            return Ok(0);
        }
        let missing = self.store.missing_embeddings()?;
        let mut embedded = 0usize;
        for name in missing {
            let Some(module) = self.get_module(&name) else { continue };
            let metadata = module.metadata();
            let text = format!(
                "Perception Module {}: {}. Category: {}/{} (v{})",
                metadata.name, metadata.description, metadata.category, metadata.sub_category, metadata.version
            );
            let vector = router.embed(&text).await?;
            self.store.set_embedding(&name, &vector)?;
            embedded += 1;
        }
        Ok(embedded)
    }

    /// Ranks registered modules against `query`: vector similarity (when an
    /// embedding provider is configured) scaled into `[0.5, 1.0]`, plus
    /// lexical boosts of `+0.5` category / `+0.3` sub-category / `+0.3`
    /// description-keyword match, then one highest-scored module per
    /// category, sorted and truncated to `limit` (§4.5). An empty `query`
    /// returns the first `limit` registered module names, unranked.
    pub async fn search_sensors(&self, router: &ModelRouter, query: &str, limit: usize) -> Result<Vec<String>, PerceptionError> {
        if query.trim().is_empty() {
            return Ok(self.modules.read().keys().take(limit).cloned().collect());
        }

        let rows = self.store.all_with_embeddings()?;
        let mut vector_scores: HashMap<String, f32> = HashMap::new();
        if router.has_embedding_provider() {
            let query_vec = router.embed(query).await?;
            let mut ranked: Vec<(String, f32)> = rows
                .iter()
                .filter_map(|(row, embedding)| {
                    embedding
                        .as_ref()
                        .map(|vec| (row.name.clone(), zappy_core::embedding::cosine_similarity(&query_vec, vec)))
                })
                .collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            ranked.truncate(limit.saturating_mul(2).max(1));
            for (name, raw) in ranked {
                vector_scores.insert(name, 0.5 + 0.5 * raw.clamp(0.0, 1.0));
            }
        }

        let query_lower = query.to_lowercase();
        let query_words: Vec<&str> = query_lower.split_whitespace().filter(|w| w.len() > 3).collect();
        let has_vector_results = !vector_scores.is_empty();

        let mut best_per_category: HashMap<String, (String, f32)> = HashMap::new();
        for (row, _) in &rows {
            if !row.enabled || !self.modules.read().contains_key(&row.name) {
                continue;
            }
            let mut score = vector_scores.get(&row.name).copied().unwrap_or(0.0);

            let category_lower = row.category.to_lowercase();
            if !category_lower.is_empty() && (query_lower.contains(&category_lower) || category_lower.contains(&query_lower)) {
                score += 0.5;
            }
            let sub_category_lower = row.sub_category.to_lowercase();
            if !sub_category_lower.is_empty()
                && (query_lower.contains(&sub_category_lower) || sub_category_lower.contains(&query_lower))
            {
                score += 0.3;
            }
            let description_lower = row.description.to_lowercase();
            if query_words.iter().any(|word| description_lower.contains(word)) {
                score += 0.3;
            }

            if score <= 0.0 && has_vector_results {
                continue;
            }

            best_per_category
                .entry(row.category.clone())
                .and_modify(|(existing_name, existing_score)| {
                    if score > *existing_score {
                        *existing_name = row.name.clone();
                        *existing_score = score;
                    }
                })
                .or_insert((row.name.clone(), score));
        }

        let mut diverse: Vec<(String, f32)> = best_per_category.into_values().collect();
        diverse.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        diverse.truncate(limit);
        Ok(diverse.into_iter().map(|(name, _)| name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use zappy_model_router::{ChatMessage, ModelProvider, ModelRouterError};
    use zappy_persistence::{migrate_state_db, Database};

    struct FakeModule {
        metadata: PerceptionMetadata,
    }

    #[async_trait]
    impl PerceptionModule for FakeModule {
        fn metadata(&self) -> &PerceptionMetadata {
            &self.metadata
        }

        async fn perceive(&self, _query: Option<&str>) -> Value {
            serde_json::json!({"ok": true})
        }
    }

    fn layer() -> PerceptionLayer {
        PerceptionLayer::new(PerceptionStore::new(Database::open_in_memory(migrate_state_db).unwrap()))
    }

    #[test]
    fn register_then_get_round_trips() {
        let layer = layer();
        layer
            .register_module(Arc::new(FakeModule {
                metadata: PerceptionMetadata::new("clock", "reports the current time").with_category("time", "clock"),
            }))
            .unwrap();
        assert!(layer.get_module("clock").is_some());
        assert!(layer.get_module("missing").is_none());
    }

    #[tokio::test]
    async fn search_diversifies_across_categories() {
        let layer = layer();
        layer
            .register_module(Arc::new(FakeModule {
                metadata: PerceptionMetadata::new("weather_a", "current weather conditions").with_category("weather", ""),
            }))
            .unwrap();
        layer
            .register_module(Arc::new(FakeModule {
                metadata: PerceptionMetadata::new("weather_b", "current weather conditions").with_category("weather", ""),
            }))
            .unwrap();
        layer
            .register_module(Arc::new(FakeModule {
                metadata: PerceptionMetadata::new("clock", "reports the current time").with_category("time", ""),
            }))
            .unwrap();
        let router = ModelRouter::builder().build();
        let names = layer.search_sensors(&router, "weather conditions", 5).await.unwrap();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("weather_"));
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

    #[tokio::test]
    async fn ensure_embeddings_fills_missing_vectors() {
        let layer = layer();
        layer
            .register_module(Arc::new(FakeModule {
                metadata: PerceptionMetadata::new("clock", "reports the current time").with_category("time", ""),
            }))
            .unwrap();
        let router = ModelRouter::builder().provider(Arc::new(FakeEmbedder)).build();
        let embedded = layer.ensure_embeddings(&router).await.unwrap();
        assert_eq!(embedded, 1);
    }
}
