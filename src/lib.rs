#![forbid(unsafe_code)]

//! # apiflow
//!
//! Selects and sequences external APIs against a natural-language goal.
//!
//! The pipeline pages a service catalog through a retrieval model, ranks the
//! surviving candidates by quality-of-service with TOPSIS (once by a model,
//! once deterministically as a cross-check), and asks a planner model to
//! compose an orchestration plan from the top of the ranking. Model output is
//! treated as untrusted free text: every response passes through JSON recovery
//! before anything downstream looks at it, and a malformed response degrades
//! to an empty result instead of aborting the run.

pub mod catalog;
pub mod gateway;
pub mod json_recovery;
pub mod pipeline;
pub mod planning;
pub mod prompts;
pub mod ranking;
pub mod retrieval;
pub mod topsis;

pub use catalog::{CatalogItem, CatalogSource, JsonlCatalog};
pub use gateway::{backend_from_env, ChatBackend, ChatRequest, Provider, ProviderError};
pub use json_recovery::{extract_json, recover_object};
pub use pipeline::{run_once, write_artifacts, RunArtifacts, RunConfig, RunMeta};
pub use retrieval::{collect_candidates, Candidate};
pub use topsis::{rank, QosRow, RankedEntry, Weights};
