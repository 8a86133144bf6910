//! Core data model: entities, relations, content observations, and the
//! request/response shapes the facade (C9) hands back to callers.
//!
//! Mirrors spec.md §3. Field names use `camelCase` on the wire, matching the
//! convention the teacher crate uses throughout its `serde(rename_all)`
//! attributes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single content observation attached to an entity.
///
/// Equality is *structural*: two blocks of the same variant with the same
/// defining fields are equal regardless of other metadata (spec.md §3).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { data: String, mime_type: String },
    Audio { data: String, mime_type: String },
    ResourceLink {
        uri: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Resource {
        data: String,
        mime_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl ContentBlock {
    /// The fields that define structural identity for this variant — used
    /// for dedup (P5) and targeted deletion. Titles/descriptions on
    /// resource/resource_link are metadata, not identity.
    fn identity_key(&self) -> (u8, &str, &str) {
        match self {
            ContentBlock::Text { text } => (0, text.as_str(), ""),
            ContentBlock::Image { data, mime_type } => (1, data.as_str(), mime_type.as_str()),
            ContentBlock::Audio { data, mime_type } => (2, data.as_str(), mime_type.as_str()),
            ContentBlock::ResourceLink { uri, .. } => (3, uri.as_str(), ""),
            ContentBlock::Resource { data, mime_type, .. } => (4, data.as_str(), mime_type.as_str()),
        }
    }

    /// True iff `self` matches `other` does what P5/§3 calls "structurally equal".
    pub fn structurally_eq(&self, other: &ContentBlock) -> bool {
        self.identity_key() == other.identity_key()
    }

    /// Returns true if the content block contains the given substring in
    /// any text-bearing field (used by context-boost ranking and by the
    /// content-type filter's text scan).
    pub fn contains_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        match self {
            ContentBlock::Text { text } => text.to_lowercase().contains(&needle),
            ContentBlock::ResourceLink { uri, title, description } => {
                uri.to_lowercase().contains(&needle)
                    || title.as_deref().is_some_and(|t| t.to_lowercase().contains(&needle))
                    || description.as_deref().is_some_and(|d| d.to_lowercase().contains(&needle))
            }
            ContentBlock::Resource { title, description, .. } => {
                title.as_deref().is_some_and(|t| t.to_lowercase().contains(&needle))
                    || description.as_deref().is_some_and(|d| d.to_lowercase().contains(&needle))
            }
            _ => false,
        }
    }

    /// Discriminant name used by the content-type filter (§4.6 step 6).
    pub fn kind(&self) -> &'static str {
        match self {
            ContentBlock::Text { .. } => "text",
            ContentBlock::Image { .. } => "image",
            ContentBlock::Audio { .. } => "audio",
            ContentBlock::ResourceLink { .. } => "resource_link",
            ContentBlock::Resource { .. } => "resource",
        }
    }
}

/// Merge `incoming` into `existing` with structural dedup, preserving
/// insertion order of retained items (L2/L3, §4.7 add-observations).
pub fn merge_observations(existing: &mut Vec<ContentBlock>, incoming: Vec<ContentBlock>) {
    for block in incoming {
        if !existing.iter().any(|b| b.structurally_eq(&block)) {
            existing.push(block);
        }
    }
}

/// Remove every block in `existing` that structurally matches one of `to_remove`.
pub fn remove_observations(existing: &mut Vec<ContentBlock>, to_remove: &[ContentBlock]) {
    existing.retain(|b| !to_remove.iter().any(|r| b.structurally_eq(r)));
}

/// An entity (node) in the knowledge graph.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub name: String,
    pub entity_type: String,
    pub observations: Vec<ContentBlock>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prominence_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance_weight: Option<f64>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>, observations: Vec<ContentBlock>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            observations,
            created_at: now,
            updated_at: now,
            access_count: Some(0),
            last_accessed: None,
            prominence_score: Some(1.0),
            importance_weight: Some(1.0),
        }
    }
}

/// A directed, typed edge between two entities, unique by (from, to, relation_type).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub from: String,
    pub to: String,
    pub relation_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prominence_score: Option<f64>,
}

impl Relation {
    pub fn new(from: impl Into<String>, to: impl Into<String>, relation_type: impl Into<String>) -> Self {
        Self {
            from: from.into().to_lowercase(),
            to: to.into().to_lowercase(),
            relation_type: relation_type.into(),
            created_at: Some(Utc::now()),
            access_count: Some(0),
            last_accessed: None,
            prominence_score: Some(1.0),
        }
    }
}

/// Direction filter for neighbor expansion (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

/// Caller-supplied intent hint used by the ranking stage's intent boost (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchIntent {
    #[default]
    Find,
    Browse,
    Explore,
    Verify,
}

/// Search mode; `Auto` lets the pipeline decide (primary, then fallback).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Auto,
    Exact,
    Fuzzy,
}

/// Caller's conversational/session context, used only for ranking boosts
/// (§4.6 context boost) — never for semantic embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchContext {
    #[serde(default)]
    pub current_entities: Vec<String>,
    #[serde(default)]
    pub recent_searches: Vec<String>,
    #[serde(default)]
    pub user_context: Option<String>,
    #[serde(default)]
    pub conversation_context: Option<String>,
}

/// A `search_nodes` request (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub context: Option<SearchContext>,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default)]
    pub content_types: Option<Vec<String>>,
    #[serde(default)]
    pub intent: Option<SearchIntent>,
}

fn default_limit() -> usize {
    10
}

/// One scored search hit, with a documented ranking explanation (§4.6, per
/// spec.md's requirement that contributions be explainable).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredEntity {
    #[serde(flatten)]
    pub entity: Entity,
    pub score: f64,
    pub rank_explanation: Vec<String>,
}

/// A `search_nodes` result: scored entities plus the relations touching
/// the survivors (§4.6 step 8).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchGraphResult {
    pub entities: Vec<ScoredEntity>,
    pub relations: Vec<Relation>,
}

/// A graph read result: entities plus the relations touching them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphResult {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

/// Outcome of `find_shortest_path` (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    pub found: bool,
    pub path: Vec<String>,
    pub distance: usize,
    pub nodes_explored: usize,
}

/// Per-call performance record returned alongside every tool result (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfRecord {
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_per_sec: Option<f64>,
    pub counts: usize,
}

impl PerfRecord {
    pub fn new(duration_ms: u64, counts: usize) -> Self {
        let rate_per_sec = if duration_ms > 0 {
            Some(counts as f64 / (duration_ms as f64 / 1000.0))
        } else {
            None
        };
        Self { duration_ms, rate_per_sec, counts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality_ignores_metadata() {
        let a = ContentBlock::ResourceLink { uri: "u".into(), title: Some("a".into()), description: None };
        let b = ContentBlock::ResourceLink { uri: "u".into(), title: Some("b".into()), description: Some("x".into()) };
        assert!(a.structurally_eq(&b));
    }

    #[test]
    fn structural_equality_distinguishes_variants() {
        let a = ContentBlock::Text { text: "x".into() };
        let b = ContentBlock::ResourceLink { uri: "x".into(), title: None, description: None };
        assert!(!a.structurally_eq(&b));
    }

    #[test]
    fn merge_preserves_order_and_dedups() {
        let mut existing = vec![ContentBlock::Text { text: "a".into() }, ContentBlock::Text { text: "b".into() }];
        merge_observations(&mut existing, vec![ContentBlock::Text { text: "b".into() }, ContentBlock::Text { text: "c".into() }]);
        let texts: Vec<_> = existing.iter().map(|b| match b { ContentBlock::Text { text } => text.clone(), _ => unreachable!() }).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }
}
