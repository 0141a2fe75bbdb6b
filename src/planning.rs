//! Planning stage: compose an orchestration plan from the ranked top.
//!
//! Consumes ranked output only — no retrieval logic lives here, and the stage
//! does not synthesize fallback data. Callers hand in at most
//! [`PLAN_TOP_N`] entries; when the ranking came back empty they substitute a
//! zero-closeness fallback drawn from the retrieved candidates first.

use serde_json::{json, Value};
use tracing::warn;

use crate::gateway::ChatBackend;
use crate::prompts::render_planner;
use crate::topsis::RankedEntry;

/// How many ranked entries the planner sees.
pub const PLAN_TOP_N: usize = 6;

/// Ask the planner collaborator for a workflow over the given candidates.
///
/// The plan is an opaque JSON object; its internal shape is the planner's
/// business. A failed or malformed planner response yields an empty object —
/// the pipeline completes with a degenerate plan rather than aborting.
pub async fn plan(backend: &dyn ChatBackend, goal: &str, ranked_top: &[RankedEntry]) -> Value {
    let compact: Vec<Value> = ranked_top
        .iter()
        .take(PLAN_TOP_N)
        .map(|entry| {
            json!({
                "api_id": entry.api_id,
                "C": (entry.closeness * 10_000.0).round() / 10_000.0,
            })
        })
        .collect();

    let prompt = render_planner(goal, &Value::Array(compact).to_string());

    let reply = match backend.chat_json(&prompt.to_request()).await {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, code = err.code(), "planner call failed; plan empty");
            return json!({});
        }
    };

    match serde_json::from_str::<Value>(&reply) {
        Ok(v @ Value::Object(_)) => v,
        _ => json!({}),
    }
}
