use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map};

use apiflow::catalog::{CatalogError, CatalogItem, CatalogSource, JsonlCatalog, Qos};
use apiflow::gateway::{ChatBackend, ChatRequest, ProviderError};
use apiflow::pipeline::{run_once, RunConfig};
use apiflow::ranking::rank_candidates;
use apiflow::retrieval::{collect_candidates, Candidate, MAX_CANDIDATES};
use apiflow::topsis::Weights;

// =============================================================================
// Test doubles
// =============================================================================

/// Backend that replays a scripted list of replies and records every request.
struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn provider(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "test-model"
    }

    async fn chat_raw(&self, req: &ChatRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(req.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        Ok(reply.unwrap_or_else(|| "{}".to_string()))
    }
}

/// Catalog that never runs out: every page is full of fresh unique ids.
struct EndlessCatalog {
    fetches: AtomicUsize,
}

impl EndlessCatalog {
    fn new() -> Self {
        Self {
            fetches: AtomicUsize::new(0),
        }
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl CatalogSource for EndlessCatalog {
    fn fetch(
        &self,
        _category: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok((0..limit)
            .map(|i| item(&format!("svc-{}", offset + i), None))
            .collect())
    }
}

fn item(api_id: &str, qos: Option<Qos>) -> CatalogItem {
    CatalogItem {
        api_id: api_id.to_string(),
        category: "Weather".to_string(),
        qos,
        extra: Map::new(),
    }
}

fn qos(rt: f64, tp: f64, av: f64) -> Qos {
    Qos {
        rt_ms: Some(rt),
        tp_rps: Some(tp),
        availability: Some(av),
    }
}

fn weather_catalog() -> JsonlCatalog {
    JsonlCatalog::from_items(vec![
        item("A", Some(qos(100.0, 50.0, 0.99))),
        item("B", Some(qos(200.0, 100.0, 0.95))),
        item("C", Some(qos(50.0, 10.0, 0.90))),
    ])
}

// =============================================================================
// End-to-end
// =============================================================================

#[tokio::test]
async fn full_run_produces_all_artifacts() {
    let backend = ScriptedBackend::new(&[
        // Retriever: prose-wrapped, one fabricated id to be discarded.
        concat!(
            "Here is my selection:\n",
            r#"{"keep": [{"api_id": "A", "reason": "forecast"}, {"api_id": "B", "reason": "history"}, "#,
            r#"{"api_id": "C", "reason": "alerts"}, {"api_id": "ghost", "reason": "fabricated"}]}"#,
        ),
        // Ranker: unsorted, one entry missing C that must be dropped.
        concat!(
            r#"{"ranked": [{"api_id": "B", "C": 0.42}, {"api_id": "X"}, "#,
            r#"{"api_id": "A", "C": 0.59}, {"api_id": "C", "C": 0.58}]}"#,
        ),
        // Planner.
        r#"{"workflow": [{"step": 1, "api_id": "A", "action": "fetch 5 day forecast"}]}"#,
    ]);
    let catalog = weather_catalog();
    let config = RunConfig::new("5 day forecast and yesterday weather", "Weather");

    let artifacts = run_once(&backend, &catalog, &config).await.unwrap();

    // Retriever: fabricated id discarded, insertion order kept.
    let ids: Vec<&str> = artifacts.candidates.iter().map(|c| c.api_id.as_str()).collect();
    assert_eq!(ids, ["A", "B", "C"]);

    // Model ranking: parsed, filtered, sorted descending by C.
    let model_ids: Vec<&str> = artifacts.model_ranking.iter().map(|r| r.api_id.as_str()).collect();
    assert_eq!(model_ids, ["A", "C", "B"]);

    // Deterministic verification over the same table.
    let verified_ids: Vec<&str> = artifacts
        .verified_ranking
        .iter()
        .map(|r| r.api_id.as_str())
        .collect();
    assert_eq!(verified_ids, ["A", "C", "B"]);
    assert!((artifacts.verified_ranking[0].closeness - 0.58506).abs() < 1e-3);
    assert!((artifacts.verified_ranking[2].closeness - 0.42363).abs() < 1e-3);

    // Plan passes through as an opaque object.
    assert!(artifacts.plan.get("workflow").is_some());

    assert_eq!(artifacts.meta.provider, "scripted");
    assert_eq!(artifacts.meta.model, "test-model");
    assert_eq!(artifacts.meta.category, "Weather");

    // One call per role: the second retrieval batch is empty, so no extra call.
    assert_eq!(backend.call_count(), 3);
}

#[tokio::test]
async fn garbage_ranker_falls_back_to_zero_closeness_planner_input() {
    let backend = ScriptedBackend::new(&[
        r#"{"keep": [{"api_id": "A", "reason": "r"}, {"api_id": "B", "reason": "r"}]}"#,
        "the ranker has nothing useful to say",
        r#"{"workflow": []}"#,
    ]);
    let catalog = weather_catalog();
    let config = RunConfig::new("goal", "Weather");

    let artifacts = run_once(&backend, &catalog, &config).await.unwrap();

    // Model ranking absorbed to empty; verified ranking still computed.
    assert!(artifacts.model_ranking.is_empty());
    assert_eq!(artifacts.verified_ranking.len(), 2);

    // The planner saw the zero-closeness fallback built from the candidates.
    let requests = backend.requests();
    let planner_user = &requests.last().unwrap().user;
    assert!(planner_user.contains(r#""api_id":"A"#));
    assert!(planner_user.contains(r#""C":0.0"#));

    assert_eq!(artifacts.plan, json!({"workflow": []}));
}

#[tokio::test]
async fn no_qos_run_verifies_to_all_zero_closeness() {
    let backend = ScriptedBackend::new(&[
        r#"{"keep": [{"api_id": "A", "reason": "r"}, {"api_id": "B", "reason": "r"}]}"#,
        r#"{"ranked": [{"api_id": "A", "C": 0.9}]}"#,
        r#"{"plan": "ok"}"#,
    ]);
    let catalog = weather_catalog();
    let mut config = RunConfig::new("goal", "Weather");
    config.with_qos = false;

    let artifacts = run_once(&backend, &catalog, &config).await.unwrap();

    assert_eq!(artifacts.verified_ranking.len(), 2);
    for entry in &artifacts.verified_ranking {
        assert_eq!(entry.closeness, 0.0);
    }
}

#[tokio::test]
async fn non_object_plan_reply_collapses_to_empty_object() {
    let backend = ScriptedBackend::new(&[
        r#"{"keep": [{"api_id": "A", "reason": "r"}]}"#,
        r#"{"ranked": [{"api_id": "A", "C": 1.0}]}"#,
        r#"[1, 2, 3]"#,
    ]);
    let catalog = weather_catalog();
    let config = RunConfig::new("goal", "Weather");

    let artifacts = run_once(&backend, &catalog, &config).await.unwrap();
    assert_eq!(artifacts.plan, json!({}));
}

// =============================================================================
// Retrieval protocol
// =============================================================================

#[tokio::test]
async fn empty_catalog_means_zero_collaborator_calls() {
    let backend = ScriptedBackend::new(&[]);
    let catalog = JsonlCatalog::from_items(vec![]);

    let picks = collect_candidates(&backend, &catalog, "goal", "Weather", 5)
        .await
        .unwrap();

    assert!(picks.is_empty());
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn retrieval_stops_at_max_batches_despite_eager_collaborator() {
    // The collaborator keeps answering but only ever fabricates ids, so the
    // unique count never moves and only the batch cap can stop the loop.
    let backend = ScriptedBackend::new(&[
        r#"{"keep": [{"api_id": "nope-1", "reason": "x"}]}"#,
        r#"{"keep": [{"api_id": "nope-2", "reason": "x"}]}"#,
        r#"{"keep": [{"api_id": "nope-3", "reason": "x"}]}"#,
        r#"{"keep": [{"api_id": "nope-4", "reason": "x"}]}"#,
        r#"{"keep": [{"api_id": "nope-5", "reason": "x"}]}"#,
    ]);
    let catalog = EndlessCatalog::new();

    let picks = collect_candidates(&backend, &catalog, "goal", "Weather", 4)
        .await
        .unwrap();

    assert!(picks.is_empty());
    assert_eq!(catalog.fetch_count(), 4);
    assert_eq!(backend.call_count(), 4);
}

#[tokio::test]
async fn retrieval_truncates_to_candidate_cap() {
    let items: Vec<CatalogItem> = (0..20).map(|i| item(&format!("svc-{i}"), None)).collect();
    let catalog = JsonlCatalog::from_items(items);

    let keep: Vec<serde_json::Value> = (0..20)
        .map(|i| json!({"api_id": format!("svc-{i}"), "reason": "relevant"}))
        .collect();
    let reply = json!({ "keep": keep }).to_string();
    let backend = ScriptedBackend::new(&[&reply]);

    let picks = collect_candidates(&backend, &catalog, "goal", "Weather", 5)
        .await
        .unwrap();

    assert_eq!(picks.len(), MAX_CANDIDATES);
    assert_eq!(picks[0].api_id, "svc-0");
    assert_eq!(picks[11].api_id, "svc-11");
    // The cap was hit in the first batch; no second fetch happened.
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn duplicate_ids_keep_first_reason() {
    let catalog = JsonlCatalog::from_items(vec![item("A", None)]);
    let backend = ScriptedBackend::new(&[
        r#"{"keep": [{"api_id": "A", "reason": "first"}, {"api_id": "A", "reason": "second"}]}"#,
    ]);

    let picks = collect_candidates(&backend, &catalog, "goal", "Weather", 5)
        .await
        .unwrap();

    assert_eq!(
        picks,
        vec![Candidate {
            api_id: "A".to_string(),
            reason: "first".to_string(),
        }]
    );
}

#[tokio::test]
async fn braceless_retriever_reply_keeps_nothing_and_continues() {
    let backend = ScriptedBackend::new(&[
        "no braces at all in this reply",
        r#"{"keep": [{"api_id": "svc-50", "reason": "second batch pick"}]}"#,
    ]);
    let catalog = EndlessCatalog::new();

    let picks = collect_candidates(&backend, &catalog, "goal", "Weather", 2)
        .await
        .unwrap();

    // Batch one was absorbed as empty; batch two still contributed.
    assert_eq!(picks.len(), 1);
    assert_eq!(picks[0].api_id, "svc-50");
}

// =============================================================================
// Ranking stage
// =============================================================================

#[tokio::test]
async fn rank_candidates_returns_model_and_verified_separately() {
    let rows = apiflow::ranking::qos_table(&[
        item("A", Some(qos(100.0, 50.0, 0.99))),
        item("B", Some(qos(200.0, 100.0, 0.95))),
    ]);

    // The model disagrees with the verifier on purpose.
    let backend = ScriptedBackend::new(&[
        r#"{"ranked": [{"api_id": "B", "C": 0.99, "D_plus": 0.1, "D_minus": 0.9}, {"api_id": "A", "C": 0.2}]}"#,
    ]);

    let (model, verified) = rank_candidates(&backend, &rows, Weights::default()).await;

    assert_eq!(model[0].api_id, "B");
    assert_eq!(model[0].d_minus, 0.9);
    // Never merged: the verifier ranks from the numbers alone.
    assert_eq!(verified.len(), 2);
    assert_ne!(model[0].api_id, verified[0].api_id);
}
