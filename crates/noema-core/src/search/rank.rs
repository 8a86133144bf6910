//! Ranking stage (§4.6 step 7).
//!
//! Scores each search candidate with a composite, documented function so
//! the pipeline can hand back a short per-result explanation string
//! alongside the score (spec.md §4.6: "contributions must be documented per
//! result").

use chrono::Utc;

use crate::types::{Entity, SearchContext, SearchIntent};

/// Results below this composite score are dropped before relation
/// expansion (§4.6, final paragraph).
pub const MIN_RELEVANCE: f64 = 0.01;

/// Score one candidate. `base_rank` is the term index's own rank for this
/// row (0 = best); it contributes inversely. Returns `(score, explanation)`.
pub fn score_entity(
    entity: &Entity,
    base_rank: Option<usize>,
    context: Option<&SearchContext>,
    intent: Option<SearchIntent>,
    content_type_match: bool,
) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut explanation = Vec::new();

    let base = match base_rank {
        Some(rank) => 1.0 / (1.0 + rank as f64),
        None => 0.3, // fallback (substring) hits have no index rank
    };
    score += base;
    explanation.push(format!("base: +{base:.3} (index rank)"));

    if let Some(ctx) = context {
        let mut boost = 0.0;
        if ctx.current_entities.iter().any(|n| n.eq_ignore_ascii_case(&entity.name)) {
            boost += 1.0;
            explanation.push("context: +1 (currentEntities)".to_string());
        }
        if ctx.recent_searches.iter().any(|t| entity.name.to_lowercase().contains(&t.to_lowercase())) {
            boost += 1.0;
            explanation.push("context: +1 (recentSearches)".to_string());
        }
        if let Some(user_ctx) = &ctx.user_context {
            if entity.entity_type.eq_ignore_ascii_case(user_ctx) {
                boost += 1.0;
                explanation.push("context: +1 (userContext type match)".to_string());
            }
        }
        if let Some(conv) = &ctx.conversation_context {
            let hay = conv.to_lowercase();
            let matches_name = entity.name.to_lowercase().contains(&hay) || hay.contains(&entity.name.to_lowercase());
            let matches_obs = entity.observations.iter().any(|o| o.contains_text(conv));
            if matches_name || matches_obs {
                boost += 1.0;
                explanation.push("context: +1 (conversationContext)".to_string());
            }
        }
        score += boost;
    }

    // Recency boost: function of last_accessed, then updated_at.
    let reference = entity.last_accessed.unwrap_or(entity.updated_at);
    let age_days = (Utc::now() - reference).num_seconds().max(0) as f64 / 86_400.0;
    let recency = (1.0 / (1.0 + age_days)).clamp(0.0, 1.0);
    score += recency * 0.5;
    explanation.push(format!("recency: +{:.3}", recency * 0.5));

    // Usage boost: function of access_count and prominence.
    let access = entity.access_count.unwrap_or(0) as f64;
    let prominence = entity.prominence_score.unwrap_or(1.0);
    let usage = (access.ln_1p() / 10.0).min(1.0) * prominence.clamp(0.0, 5.0);
    score += usage * 0.3;
    explanation.push(format!("usage: +{:.3}", usage * 0.3));

    // Intent boost.
    if let Some(intent) = intent {
        let bonus = match intent {
            SearchIntent::Find => 0.2,
            SearchIntent::Browse => 0.05,
            SearchIntent::Explore => 0.1,
            SearchIntent::Verify => 0.15,
        };
        score += bonus;
        explanation.push(format!("intent({intent:?}): +{bonus:.2}"));
    }

    // Content-type filter: multiplicative 0 if no match, 1 otherwise — this
    // *enforces* the filter rather than merely nudging score.
    if !content_type_match {
        explanation.push("content-type: x0 (no matching block)".to_string());
        return (0.0, explanation);
    }

    (score, explanation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentBlock;

    fn sample_entity() -> Entity {
        Entity::new("Alice", "person", vec![ContentBlock::Text { text: "loves climbing".into() }])
    }

    #[test]
    fn context_boost_adds_for_current_entities() {
        let entity = sample_entity();
        let ctx = SearchContext { current_entities: vec!["Alice".into()], ..Default::default() };
        let (with_ctx, _) = score_entity(&entity, Some(0), Some(&ctx), None, true);
        let (without_ctx, _) = score_entity(&entity, Some(0), None, None, true);
        assert!(with_ctx > without_ctx);
    }

    #[test]
    fn content_type_mismatch_zeroes_score() {
        let entity = sample_entity();
        let (score, _) = score_entity(&entity, Some(0), None, None, false);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn better_base_rank_scores_higher_all_else_equal() {
        let entity = sample_entity();
        let (best, _) = score_entity(&entity, Some(0), None, None, true);
        let (worse, _) = score_entity(&entity, Some(5), None, None, true);
        assert!(best > worse);
    }
}
