//! Configuration (§6).
//!
//! Loaded by the caller (the surrounding process is responsible for reading
//! a config file or environment); the core only defines the shape and sane
//! defaults, following a `ProjectDirs`-derived default path plus an
//! env-var override.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cache eviction policy (§4.2, §6 `cache_strategy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    #[default]
    Lru,
    #[serde(rename = "2q")]
    TwoQ,
    Arc,
    Radix,
}

/// Aging preset (§6 `aging.preset`). Half-life is in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgingPreset {
    Balanced,
    Conservative,
    Aggressive,
    Work,
    Personal,
}

impl AgingPreset {
    /// `(decay_rate, half_life_days, access_boost)`.
    pub fn factors(self) -> (f64, f64, f64) {
        match self {
            AgingPreset::Balanced => (0.05, 30.0, 0.1),
            AgingPreset::Conservative => (0.02, 90.0, 0.05),
            AgingPreset::Aggressive => (0.12, 10.0, 0.2),
            AgingPreset::Work => (0.08, 14.0, 0.15),
            AgingPreset::Personal => (0.03, 60.0, 0.08),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgingConfig {
    pub enabled: bool,
    pub preset: Option<AgingPreset>,
    pub custom_decay_rate: Option<f64>,
    pub custom_half_life_days: Option<f64>,
    pub custom_access_boost: Option<f64>,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self { enabled: false, preset: Some(AgingPreset::Balanced), custom_decay_rate: None, custom_half_life_days: None, custom_access_boost: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 3, recovery_timeout_ms: 30_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    // Storage
    pub db_path: PathBuf,
    pub page_cache_mb: u32,
    pub mmap_mb: u32,
    pub page_size_kb: u32,
    pub busy_timeout_ms: u32,
    pub checkpoint_interval: u32,

    // Performance
    pub entity_cache_size: usize,
    pub search_cache_size: usize,
    pub relation_query_threshold: usize,
    pub compression_enabled: bool,
    pub cache_strategy: CacheStrategy,
    pub read_pool_enabled: bool,
    pub read_pool_size: usize,
    pub batch_size: usize,
    pub max_batch_size: usize,
    pub target_batch_memory_mb: u32,
    pub bulk_ops_enabled: bool,
    pub dynamic_batch_sizing: bool,

    // Bloom
    pub expected_items: usize,
    pub false_positive_rate: f64,

    // Aging
    pub aging: AgingConfig,

    // Breaker
    pub breaker: BreakerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            page_cache_mb: 64,
            mmap_mb: 256,
            page_size_kb: 8,
            busy_timeout_ms: 5_000,
            checkpoint_interval: 1_000,

            entity_cache_size: 10_000,
            search_cache_size: 2_000,
            relation_query_threshold: 50,
            compression_enabled: true,
            cache_strategy: CacheStrategy::Lru,
            read_pool_enabled: true,
            read_pool_size: 4,
            batch_size: 10,
            max_batch_size: 5_000,
            target_batch_memory_mb: 16,
            bulk_ops_enabled: true,
            dynamic_batch_sizing: false,

            expected_items: 100_000,
            false_positive_rate: 0.01,

            aging: AgingConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

/// `NOEMA_DB_PATH` env override, else a per-platform data directory from
/// `directories::ProjectDirs`, else `./noema.db`.
fn default_db_path() -> PathBuf {
    if let Ok(p) = std::env::var("NOEMA_DB_PATH") {
        return PathBuf::from(p);
    }
    if let Some(dirs) = ProjectDirs::from("dev", "noema", "noema") {
        return dirs.data_dir().join("graph.db");
    }
    PathBuf::from("noema.db")
}

impl Config {
    /// Bulk-path threshold (§4.7): sizes at or above this use the bulk
    /// fast path guarded by the circuit breaker.
    pub fn bulk_threshold(&self) -> usize {
        self.batch_size.max(10)
    }
}
