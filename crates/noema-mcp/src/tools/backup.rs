//! `backup` tool (spec.md §4.8, §4.9).

use std::path::PathBuf;
use std::sync::Arc;

use noema_core::Core;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupArgs {
    target_path: PathBuf,
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["targetPath"],
        "properties": { "targetPath": { "type": "string" } }
    })
}

pub async fn execute(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let args: BackupArgs = serde_json::from_value(args.ok_or("missing arguments")?)
        .map_err(|e| format!("invalid arguments: {e}"))?;
    core.backup(&args.target_path).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({ "targetPath": args.target_path }))
}
