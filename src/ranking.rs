//! Ranking stage: model-driven TOPSIS plus the deterministic verifier.
//!
//! The ranker collaborator is handed the exact QoS table and instructed to
//! reproduce TOPSIS; its answer is advisory. The same table goes through the
//! deterministic engine in `topsis`, and both lists are returned side by side.
//! Reconciling them is the caller's policy — the core never merges them.

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::catalog::CatalogItem;
use crate::gateway::ChatBackend;
use crate::prompts::render_ranker;
use crate::topsis::{self, QosRow, RankedEntry, Weights};

/// Build the QoS decision table for a set of catalog items.
/// Missing QoS blocks or fields become null, never zero.
pub fn qos_table(items: &[CatalogItem]) -> Vec<QosRow> {
    items
        .iter()
        .map(|item| {
            let qos = item.qos.clone().unwrap_or_default();
            QosRow {
                api_id: item.api_id.clone(),
                rt_ms: qos.rt_ms,
                tp_rps: qos.tp_rps,
                availability: qos.availability,
            }
        })
        .collect()
}

/// Blank a table's criteria to all-unknown. Used for no-QoS runs, where the
/// verifier degrades to all-zero closeness and planning runs on the fallback.
pub fn blank_qos(rows: &[QosRow]) -> Vec<QosRow> {
    rows.iter()
        .map(|r| QosRow {
            api_id: r.api_id.clone(),
            rt_ms: None,
            tp_rps: None,
            availability: None,
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct RankedResponse {
    #[serde(default)]
    ranked: Vec<ModelRankedEntry>,
}

/// One entry as the model reported it. Only `api_id` and `C` are required;
/// entries missing either are dropped rather than repaired.
#[derive(Debug, Deserialize)]
struct ModelRankedEntry {
    api_id: Option<String>,
    #[serde(rename = "C")]
    closeness: Option<f64>,
    #[serde(rename = "D_plus", default)]
    d_plus: Option<f64>,
    #[serde(rename = "D_minus", default)]
    d_minus: Option<f64>,
}

/// Rank the QoS table twice: once by the ranker collaborator, once by the
/// deterministic engine over the same rows and weights.
///
/// Returns `(model_ranked, verified_ranked)`. The model list is unverified
/// and may be empty (collaborator failure or malformed output); the verified
/// list is ground truth and always covers every row.
pub async fn rank_candidates(
    backend: &dyn ChatBackend,
    rows: &[QosRow],
    weights: Weights,
) -> (Vec<RankedEntry>, Vec<RankedEntry>) {
    let model_ranked = model_rank(backend, rows, weights).await;
    let verified = topsis::rank(rows, weights);
    (model_ranked, verified)
}

async fn model_rank(backend: &dyn ChatBackend, rows: &[QosRow], weights: Weights) -> Vec<RankedEntry> {
    let table_json = serde_json::to_value(rows).unwrap_or_else(|_| json!([]));
    let prompt = render_ranker(&table_json.to_string(), weights);

    let reply = match backend.chat_json(&prompt.to_request()).await {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, code = err.code(), "ranker call failed; model ranking empty");
            return Vec::new();
        }
    };

    let parsed: RankedResponse = serde_json::from_str(&reply).unwrap_or_default();

    let mut ranked: Vec<RankedEntry> = parsed
        .ranked
        .into_iter()
        .filter_map(|entry| {
            let api_id = entry.api_id?;
            let closeness = entry.closeness?;
            Some(RankedEntry {
                api_id,
                closeness,
                d_plus: entry.d_plus.unwrap_or(0.0),
                d_minus: entry.d_minus.unwrap_or(0.0),
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.closeness
            .partial_cmp(&a.closeness)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
