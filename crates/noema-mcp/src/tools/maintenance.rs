//! `maintenance` tool — operator-triggered upkeep (spec.md §4.7, §7, §4.9's
//! maintenance surface, C10). A single dispatching tool keyed on `action`,
//! grouping infrequent operator actions together rather than exposing one
//! tool per action.

use std::sync::Arc;

use noema_core::Core;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Action {
    RebuildBloom,
    RebuildTermIndex,
    CheckConsistency,
    RunAgingPass,
}

#[derive(Debug, Deserialize)]
struct MaintenanceArgs {
    action: Action,
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["action"],
        "properties": {
            "action": {
                "type": "string",
                "enum": ["rebuild_bloom", "rebuild_term_index", "check_consistency", "run_aging_pass"]
            }
        }
    })
}

pub async fn execute(core: &Arc<Core>, args: Option<serde_json::Value>) -> Result<serde_json::Value, String> {
    let args: MaintenanceArgs = serde_json::from_value(args.ok_or("missing arguments")?)
        .map_err(|e| format!("invalid arguments: {e}"))?;

    match args.action {
        Action::RebuildBloom => {
            core.rebuild_bloom().map_err(|e| e.to_string())?;
            Ok(serde_json::json!({ "status": "ok" }))
        }
        Action::RebuildTermIndex => {
            core.rebuild_term_index().map_err(|e| e.to_string())?;
            Ok(serde_json::json!({ "status": "ok" }))
        }
        Action::CheckConsistency => {
            let report = core.check_consistency().map_err(|e| e.to_string())?;
            serde_json::to_value(report).map_err(|e| e.to_string())
        }
        Action::RunAgingPass => {
            let updated = core.run_aging_pass().map_err(|e| e.to_string())?;
            Ok(serde_json::json!({ "updated": updated }))
        }
    }
}
