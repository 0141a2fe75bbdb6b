//! Candidate retrieval: batched catalog paging with model-driven selection.
//!
//! The retriever pages the catalog in fixed batches and asks the retrieval
//! collaborator which services in each batch are relevant. The collaborator is
//! untrusted: it may return prose, fabricate ids, or fail outright. A bad
//! response costs one batch's worth of picks, never the run.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::catalog::{CatalogError, CatalogItem, CatalogSource};
use crate::gateway::ChatBackend;
use crate::prompts::render_retriever;

/// Catalog page size for retrieval batches.
pub const PAGE_SIZE: usize = 50;

/// Upper bound on unique candidates per run.
pub const MAX_CANDIDATES: usize = 12;

/// An API the retriever kept, with its stated reason.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct Candidate {
    pub api_id: String,
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
struct KeepResponse {
    #[serde(default)]
    keep: Vec<KeepItem>,
}

#[derive(Debug, Deserialize)]
struct KeepItem {
    api_id: Option<String>,
    #[serde(default)]
    reason: String,
}

/// Collect up to [`MAX_CANDIDATES`] unique candidates for the goal.
///
/// Batches are processed sequentially because the stopping conditions (unique
/// count, batch cap) depend on cumulative state. Stops on catalog exhaustion,
/// on reaching the unique cap, or after `max_batches` fetches — the last is a
/// safety bound against a collaborator that never converges. Duplicate
/// `api_id`s keep their first reason; ids absent from the batch are discarded.
///
/// Catalog errors propagate; collaborator failures degrade to an empty batch.
pub async fn collect_candidates(
    backend: &dyn ChatBackend,
    source: &dyn CatalogSource,
    goal: &str,
    category: &str,
    max_batches: usize,
) -> Result<Vec<Candidate>, CatalogError> {
    let mut kept: Vec<Candidate> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut offset = 0usize;

    for batch_idx in 0..max_batches {
        let batch = source.fetch(category, offset, PAGE_SIZE)?;
        if batch.is_empty() {
            break;
        }

        let picks = keep_from_batch(backend, goal, &batch).await;
        let batch_ids: HashSet<&str> = batch.iter().map(|item| item.api_id.as_str()).collect();

        for pick in picks {
            if !batch_ids.contains(pick.api_id.as_str()) {
                warn!(api_id = %pick.api_id, batch = batch_idx, "retriever fabricated an api_id; discarding");
                continue;
            }
            if seen.insert(pick.api_id.clone()) {
                kept.push(pick);
            }
        }

        if kept.len() >= MAX_CANDIDATES {
            break;
        }
        offset += PAGE_SIZE;
    }

    kept.truncate(MAX_CANDIDATES);
    info!(count = kept.len(), category, "retrieval complete");
    Ok(kept)
}

/// Ask the retriever which items in one batch to keep.
///
/// Any failure — provider error, prose instead of JSON, missing `keep` key —
/// is "kept nothing" for this batch.
async fn keep_from_batch(
    backend: &dyn ChatBackend,
    goal: &str,
    batch: &[CatalogItem],
) -> Vec<Candidate> {
    let batch_json = serde_json::to_value(batch).unwrap_or_else(|_| json!([]));
    let prompt = render_retriever(goal, &batch_json.to_string());

    let reply = match backend.chat_json(&prompt.to_request()).await {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, code = err.code(), "retriever call failed; keeping nothing for batch");
            return Vec::new();
        }
    };

    // chat_json already ran recovery, so this parse only fails on a shape
    // mismatch (e.g. the model returned a bare array).
    let parsed: KeepResponse = serde_json::from_str(&reply).unwrap_or_default();

    parsed
        .keep
        .into_iter()
        .filter_map(|item| {
            let api_id = item.api_id?;
            if api_id.is_empty() {
                return None;
            }
            Some(Candidate {
                api_id,
                reason: item.reason,
            })
        })
        .collect()
}
