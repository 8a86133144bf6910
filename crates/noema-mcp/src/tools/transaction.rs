//! `begin_transaction` / `commit_transaction` / `rollback_transaction` tools
//! (spec.md §4.8, §4.9). These drive the manual transaction lifecycle —
//! nesting another facade call between `begin` and `commit`/`rollback` is
//! unsupported and surfaces as a storage error from the underlying SQLite
//! `BEGIN`.

use std::sync::Arc;

use noema_core::Core;

pub fn schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

pub async fn begin(core: &Arc<Core>, _args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    core.begin_transaction().map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "status": "active" }))
}

pub async fn commit(core: &Arc<Core>, _args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    core.commit_transaction().map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "status": "committed" }))
}

pub async fn rollback(core: &Arc<Core>, _args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    core.rollback_transaction().map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "status": "rolled_back" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use noema_core::Config;
    use tempfile::TempDir;

    fn test_core() -> (Arc<Core>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.db_path = dir.path().join("test.db");
        (Arc::new(Core::open(config).unwrap()), dir)
    }

    #[tokio::test]
    async fn begin_then_rollback_round_trips() {
        let (core, _dir) = test_core();
        assert!(begin(&core, None).await.is_ok());
        assert!(rollback(&core, None).await.is_ok());
    }

    #[tokio::test]
    async fn double_begin_without_commit_fails() {
        let (core, _dir) = test_core();
        assert!(begin(&core, None).await.is_ok());
        assert!(begin(&core, None).await.is_err());
        rollback(&core, None).await.ok();
    }
}
