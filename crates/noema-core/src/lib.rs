//! # Noema Core
//!
//! An embedded knowledge-graph store for agent/assistant memory: typed
//! entities with ordered observation lists, typed relations between them,
//! full-text search with a substring fallback and explainable ranking, and
//! a single-writer/pooled-reader concurrency model over SQLite.
//!
//! The operation surface lives on [`facade::Core`]. Everything else in this
//! crate is an internal layer `Core` composes:
//!
//! - [`bloom`] — counting bloom filter for cheap non-membership checks (C1)
//! - [`cache`] — pluggable-eviction bounded caches (C2)
//! - [`codec`] — observation (de)serialization, with optional compression (C3)
//! - [`storage`] — schema/migrations/pragmas and the pooled reader (C4, C5)
//! - [`search`] — the query pipeline and ranking model (C6)
//! - [`mutation`] — create/update/delete, including the bulk fast paths (C7)
//! - [`transaction`] — closure-scoped and manual transaction lifecycles (C8)
//! - [`neighbors`] — BFS neighbor expansion and shortest-path search
//! - [`breaker`] — circuit breaker guarding the bulk mutation paths
//! - [`maintenance`] — operator-triggered rebuilds and consistency checks (C10)
//!
//! See `facade::Core` for the full operation surface (C9): `create_entities`,
//! `create_relations`, `add_observations`, `delete_observations`,
//! `delete_entities`, `delete_relations`, `search_nodes`, `read_graph`,
//! `open_nodes`, `get_neighbors`, `find_shortest_path`, `get_stats`,
//! transaction begin/commit/rollback, and `backup`.

pub mod bloom;
pub mod breaker;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod maintenance;
pub mod mutation;
pub mod neighbors;
pub mod search;
pub mod storage;
pub mod transaction;
pub mod types;

pub use config::{AgingConfig, AgingPreset, BreakerConfig, CacheStrategy, Config};
pub use error::{CoreError, CoreResult, StorageError};
pub use facade::{BloomStatsView, CacheStatsView, Core, Stats};
pub use maintenance::ConsistencyReport;
pub use types::{
    ContentBlock, Direction, Entity, GraphResult, PathResult, PerfRecord, Relation, ScoredEntity,
    SearchContext, SearchGraphResult, SearchIntent, SearchMode, SearchRequest,
};
