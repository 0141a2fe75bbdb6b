//! Service catalog source.
//!
//! The catalog is line-delimited JSON on disk; the pipeline only depends on
//! the paginated [`CatalogSource`] contract, so tests can swap in an in-memory
//! source. An empty page is the normal exhaustion signal, not an error. A
//! missing or malformed catalog file is a startup failure — the pipeline does
//! not degrade to a catalog-less mode.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Measured quality-of-service for one API. All fields optional; `null` (or a
/// `-1` sentinel, handled by the decision engine) means "not measured".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Qos {
    #[serde(default)]
    pub rt_ms: Option<f64>,
    #[serde(default)]
    pub tp_rps: Option<f64>,
    #[serde(default)]
    pub availability: Option<f64>,
}

/// One immutable catalog record. `api_id` is the join key across the whole
/// pipeline and is treated as an opaque stable string.
///
/// Unmodeled fields (names, descriptions, endpoints) are preserved in `extra`
/// so the retrieval prompt shows the model everything the catalog knows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub api_id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub qos: Option<Qos>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog not found: {0}")]
    NotFound(PathBuf),
    #[error("io error reading catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed catalog record at line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Paginated catalog access. `fetch` returns at most `limit` items of the
/// given category starting at `offset`; an empty vec signals exhaustion.
pub trait CatalogSource: Send + Sync {
    fn fetch(
        &self,
        category: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CatalogItem>, CatalogError>;
}

/// Catalog backed by a `.jsonl` file, loaded once at open.
#[derive(Debug, Clone)]
pub struct JsonlCatalog {
    items: Vec<CatalogItem>,
}

impl JsonlCatalog {
    /// Load a line-delimited JSON catalog. Fails on a missing file or any
    /// malformed record; blank lines are skipped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CatalogError::NotFound(path.to_path_buf()));
        }

        let reader = BufReader::new(File::open(path)?);
        let mut items = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let item: CatalogItem = serde_json::from_str(trimmed)
                .map_err(|source| CatalogError::Malformed { line: idx + 1, source })?;
            items.push(item);
        }

        debug!(count = items.len(), path = %path.display(), "loaded catalog");
        Ok(Self { items })
    }

    /// Build from already-parsed items. Used by tests and by callers that
    /// source the catalog elsewhere.
    pub fn from_items(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl CatalogSource for JsonlCatalog {
    fn fetch(
        &self,
        category: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        let page: Vec<CatalogItem> = self
            .items
            .iter()
            .filter(|item| item.category == category)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(page)
    }
}
