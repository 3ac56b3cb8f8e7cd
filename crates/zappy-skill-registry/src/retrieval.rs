use std::collections::HashMap;

use zappy_core::embedding::cosine_similarity;
use zappy_core::skill::SkillMetadata;

/// One ranked hit from [`score_candidates`].
#[derive(Debug, Clone, PartialEq)]
pub struct SkillHit {
    /// Matched skill name.
    pub name: String,
    /// Combined vector + lexical score.
    pub score: f32,
}

/// Scores every enabled skill against `query` (§4.2 retrieval algorithm).
///
/// `embeddings` holds every stored skill embedding; pass an empty map when no
/// embedding-capable provider is configured — lexical boosting alone still
/// produces a usable ranking. `query_embedding` is `None` under the same
/// condition.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn score_candidates(
    query: &str,
    query_embedding: Option<&[f32]>,
    metadata: &[SkillMetadata],
    embeddings: &HashMap<String, Vec<f32>>,
    category: Option<&str>,
    sub_category: Option<&str>,
    enabled: &dyn Fn(&str) -> bool,
    limit: usize,
) -> Vec<SkillHit> {
    let query_lower = query.to_lowercase();
    let query_words: Vec<&str> = query_lower
        .split_whitespace()
        .filter(|word| word.len() > 3)
        .collect();

    // Step 1: vector candidates, scaled into [0.5, 1.0], top 2*limit.
    let mut vector_scores: HashMap<&str, f32> = HashMap::new();
    if let Some(query_vec) = query_embedding {
        let mut ranked: Vec<(&str, f32)> = metadata
            .iter()
            .filter_map(|skill| {
                embeddings
                    .get(&skill.name)
                    .map(|vec| (skill.name.as_str(), cosine_similarity(query_vec, vec)))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit.saturating_mul(2).max(1));
        for (name, raw) in ranked {
            let scaled = 0.5 + 0.5 * raw.clamp(0.0, 1.0);
            vector_scores.insert(name, scaled);
        }
    }

    // Step 2 + 3: lexical boost, combined additively with any vector score.
    let mut scored: Vec<(SkillMetadata, f32)> = Vec::new();
    for skill in metadata {
        if !enabled(&skill.name) {
            continue;
        }
        let mut boost = 0.0_f32;
        if let Some(category) = category {
            if skill.category.eq_ignore_ascii_case(category) {
                boost += 0.8;
            }
        }
        if let Some(sub_category) = sub_category {
            if !skill.sub_category.is_empty() && skill.sub_category.eq_ignore_ascii_case(sub_category) {
                boost += 0.4;
            }
        }
        let category_lower = skill.category.to_lowercase();
        if !category_lower.is_empty() && query_lower.contains(&category_lower) {
            boost += 0.3;
        }
        let sub_category_lower = skill.sub_category.to_lowercase();
        if !sub_category_lower.is_empty() && query_lower.contains(&sub_category_lower) {
            boost += 0.1;
        }
        let description_lower = skill.description.to_lowercase();
        if query_words.iter().any(|word| description_lower.contains(word)) {
            boost += 0.3;
        }

        let vector_component = vector_scores.get(skill.name.as_str()).copied().unwrap_or(0.0);
        let total = vector_component + boost;
        if total > 0.0 {
            scored.push((skill.clone(), total));
        }
    }

    // Step 4: diversity policy.
    if category.is_some() {
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        return scored
            .into_iter()
            .map(|(skill, score)| SkillHit { name: skill.name, score })
            .collect();
    }

    let mut best_per_category: HashMap<String, (SkillMetadata, f32)> = HashMap::new();
    for (skill, score) in scored {
        best_per_category
            .entry(skill.category.clone())
            .and_modify(|(existing_skill, existing_score)| {
                if score > *existing_score {
                    *existing_skill = skill.clone();
                    *existing_score = score;
                }
            })
            .or_insert((skill, score));
    }
    let mut diverse: Vec<(SkillMetadata, f32)> = best_per_category.into_values().collect();
    diverse.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    diverse.truncate(limit);
    diverse
        .into_iter()
        .map(|(skill, score)| SkillHit { name: skill.name, score })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(name: &str, category: &str, description: &str) -> SkillMetadata {
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

    #[test]
    fn diversity_returns_at_most_one_per_category() {
        let metadata = vec![
            skill("web_a", "web", "summarise this document online"),
            skill("web_b", "web", "summarise this document online"),
            skill("web_c", "web", "summarise this document online"),
            skill("io_a", "io", "summarise this document to disk"),
        ];
        let embeddings = HashMap::new();
        let hits = score_candidates(
            "summarise this document",
            None,
            &metadata,
            &embeddings,
            None,
            None,
            &|_| true,
            3,
        );
        let categories: Vec<&str> = hits
            .iter()
            .map(|hit| metadata.iter().find(|m| m.name == hit.name).unwrap().category.as_str())
            .collect();
        let mut unique = categories.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(categories.len(), unique.len());
    }

    #[test]
    fn targeted_category_skips_diversity_and_returns_top_overall() {
        let metadata = vec![skill("web_a", "web", "fetch a url"), skill("web_b", "web", "fetch a url")];
        let embeddings = HashMap::new();
        let hits = score_candidates("fetch", None, &metadata, &embeddings, Some("web"), None, &|_| true, 5);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn disabled_skills_are_excluded() {
        let metadata = vec![skill("disabled_skill", "web", "fetch a url")];
        let embeddings = HashMap::new();
        let hits = score_candidates("fetch a url", None, &metadata, &embeddings, None, None, &|_| false, 5);
        assert!(hits.is_empty());
    }
}
