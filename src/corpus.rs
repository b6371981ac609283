use crate::models::CatalogRow;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus file i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("corpus file is not a JSON array of rows: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Shared corpus snapshot. Queries clone an `Arc` and read an immutable
/// view; the enrichment worker swaps in a whole new snapshot when a run
/// finishes, so readers never observe a half-merged corpus.
#[derive(Clone)]
pub struct CorpusStore {
    rows: Arc<RwLock<Arc<Vec<CatalogRow>>>>,
    path: Option<PathBuf>,
}

impl CorpusStore {
    pub fn from_env() -> Result<Self, CorpusError> {
        let path = std::env::var("CORPUS_PATH").ok().map(PathBuf::from);
        let rows = match &path {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(raw) => {
                    let rows: Vec<CatalogRow> = serde_json::from_str(&raw)?;
                    info!(
                        target = "stylist.corpus",
                        rows = rows.len(),
                        path = %path.display(),
                        "corpus loaded"
                    );
                    rows
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    warn!(
                        target = "stylist.corpus",
                        path = %path.display(),
                        "corpus file missing, starting empty"
                    );
                    Vec::new()
                }
                Err(err) => return Err(err.into()),
            },
            None => Vec::new(),
        };
        Ok(Self {
            rows: Arc::new(RwLock::new(Arc::new(rows))),
            path,
        })
    }

    pub fn in_memory(rows: Vec<CatalogRow>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(Arc::new(rows))),
            path: None,
        }
    }

    pub async fn snapshot(&self) -> Arc<Vec<CatalogRow>> {
        self.rows.read().await.clone()
    }

    /// Swaps in a freshly enriched snapshot and persists it when a corpus
    /// path is configured. Persistence failures are logged, not fatal: the
    /// in-memory snapshot is already live.
    pub async fn replace(&self, rows: Vec<CatalogRow>) {
        let rows = Arc::new(rows);
        *self.rows.write().await = rows.clone();
        if let Some(path) = &self.path {
            let result = serde_json::to_string(rows.as_slice())
                .map_err(io::Error::other)
                .and_then(|raw| std::fs::write(path, raw));
            if let Err(err) = result {
                warn!(target = "stylist.corpus", "corpus persist failed: {err}");
            }
        }
    }
}
