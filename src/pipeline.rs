//! End-to-end pipeline: retrieve → gather QoS → rank (+ verify) → plan.
//!
//! One request flows strictly forward through the stages; each run constructs
//! fresh collections, so concurrent runs share nothing. Stage-local failures
//! have already degraded to empty data by the time they reach this level —
//! the orchestrator itself only fails on catalog/configuration problems.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::catalog::{CatalogError, CatalogItem, CatalogSource};
use crate::gateway::ChatBackend;
use crate::planning::{self, PLAN_TOP_N};
use crate::ranking;
use crate::retrieval::{self, Candidate};
use crate::topsis::{RankedEntry, Weights};

/// Page size for the QoS gathering pass. Larger than the retrieval page
/// because no collaborator call sits in this loop.
const GATHER_PAGE_SIZE: usize = 200;

/// Configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub goal: String,
    pub category: String,
    /// When false, every QoS criterion is blanked to unknown before ranking.
    pub with_qos: bool,
    /// Safety bound on retrieval fetches.
    pub max_batches: usize,
    pub weights: Weights,
}

impl RunConfig {
    pub fn new(goal: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            category: category.into(),
            with_qos: true,
            max_batches: 5,
            weights: Weights::default(),
        }
    }
}

/// Metadata record partitioning one run's outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: Uuid,
    pub created_at: String,
    pub provider: String,
    pub model: String,
    pub category: String,
    pub goal: String,
}

/// Everything one run produced.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunArtifacts {
    pub meta: RunMeta,
    /// Candidates the retriever kept, in insertion order.
    pub candidates: Vec<Candidate>,
    /// The model-driven ranking. Advisory; may be empty.
    pub model_ranking: Vec<RankedEntry>,
    /// The deterministic ranking over the same table. Ground truth.
    pub verified_ranking: Vec<RankedEntry>,
    /// Opaque orchestration plan.
    pub plan: Value,
}

/// Run the full pipeline once.
///
/// Only catalog access can fail here; collaborator misbehavior has been
/// absorbed stage-by-stage, so a run always completes with a (possibly
/// empty) plan plus the verification ranking.
pub async fn run_once(
    backend: &dyn ChatBackend,
    source: &dyn CatalogSource,
    config: &RunConfig,
) -> Result<RunArtifacts, CatalogError> {
    let candidates = retrieval::collect_candidates(
        backend,
        source,
        &config.goal,
        &config.category,
        config.max_batches,
    )
    .await?;

    let items = gather_items(source, &config.category, &candidates)?;

    let mut rows = ranking::qos_table(&items);
    if !config.with_qos {
        rows = ranking::blank_qos(&rows);
    }

    let (model_ranking, verified_ranking) =
        ranking::rank_candidates(backend, &rows, config.weights).await;

    // Ranking absent (not failed): feed the planner a zero-closeness top-N
    // drawn from the retrieved candidates instead.
    let ranked_top: Vec<RankedEntry> = if model_ranking.is_empty() {
        candidates
            .iter()
            .take(PLAN_TOP_N)
            .map(|c| RankedEntry {
                api_id: c.api_id.clone(),
                closeness: 0.0,
                d_plus: 0.0,
                d_minus: 0.0,
            })
            .collect()
    } else {
        model_ranking.iter().take(PLAN_TOP_N).cloned().collect()
    };

    let plan = planning::plan(backend, &config.goal, &ranked_top).await;

    info!(
        candidates = candidates.len(),
        model_ranked = model_ranking.len(),
        verified = verified_ranking.len(),
        "pipeline run complete"
    );

    Ok(RunArtifacts {
        meta: RunMeta {
            run_id: Uuid::new_v4(),
            created_at: Utc::now().to_rfc3339(),
            provider: backend.provider().to_string(),
            model: backend.model().to_string(),
            category: config.category.clone(),
            goal: config.goal.clone(),
        },
        candidates,
        model_ranking,
        verified_ranking,
        plan,
    })
}

/// Re-page the catalog collecting full records for the picked ids,
/// preserving retrieval insertion order.
fn gather_items(
    source: &dyn CatalogSource,
    category: &str,
    candidates: &[Candidate],
) -> Result<Vec<CatalogItem>, CatalogError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_id: HashMap<String, CatalogItem> = HashMap::new();
    let mut offset = 0usize;
    loop {
        let page = source.fetch(category, offset, GATHER_PAGE_SIZE)?;
        if page.is_empty() {
            break;
        }
        for item in page {
            if candidates.iter().any(|c| c.api_id == item.api_id) {
                by_id.entry(item.api_id.clone()).or_insert(item);
            }
        }
        offset += GATHER_PAGE_SIZE;
    }

    Ok(candidates
        .iter()
        .filter_map(|c| by_id.remove(&c.api_id))
        .collect())
}

/// Write the four run documents plus the metadata record into `dir`.
pub fn write_artifacts(dir: impl AsRef<Path>, artifacts: &RunArtifacts) -> std::io::Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let write = |name: &str, value: &Value| -> std::io::Result<()> {
        let pretty = serde_json::to_string_pretty(value)?;
        std::fs::write(dir.join(name), pretty)
    };

    write("retrieved.json", &serde_json::to_value(&artifacts.candidates)?)?;
    write("ranking_model.json", &serde_json::to_value(&artifacts.model_ranking)?)?;
    write(
        "ranking_verified.json",
        &serde_json::to_value(&artifacts.verified_ranking)?,
    )?;
    write("plan.json", &artifacts.plan)?;
    write("run.json", &serde_json::to_value(&artifacts.meta)?)?;

    info!(dir = %dir.display(), "run artifacts written");
    Ok(())
}
