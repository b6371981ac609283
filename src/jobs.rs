use crate::{
    cache::CacheStore,
    corpus::CorpusStore,
    enrich::{EnrichOptions, Enricher},
    extract::ExtractClient,
    models::{ApiError, EnrichMode, EnrichSummary},
    probe::HttpProbe,
    security::AuthContext,
};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    statuses: Arc<Mutex<HashMap<Uuid, JobState>>>,
}

#[derive(Clone)]
struct Job {
    id: Uuid,
    mode: EnrichMode,
    context: AuthContext,
}

#[derive(Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed { summary: EnrichSummary },
    Failed { error: String },
}

#[derive(Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    #[serde(flatten)]
    pub state: JobState,
}

impl JobQueue {
    /// Spawns the single enrichment worker. Jobs run one at a time; each
    /// builds its transport and cache from env, enriches a corpus snapshot
    /// and swaps the result in on success.
    pub fn spawn(corpus: CorpusStore) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(queue_capacity_from_env());
        let statuses = Arc::new(Mutex::new(HashMap::new()));
        let statuses_bg = statuses.clone();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                {
                    let mut guard = statuses_bg.lock().await;
                    guard.insert(job.id, JobState::Running);
                }
                info!(
                    target = "stylist.jobs",
                    job_id = %job.id,
                    org_id = %job.context.org_id,
                    mode = ?job.mode,
                    "enrichment job started"
                );

                let rows = corpus.snapshot().await.as_ref().clone();
                if rows.is_empty() {
                    let mut guard = statuses_bg.lock().await;
                    guard.insert(
                        job.id,
                        JobState::Failed {
                            error: "corpus is empty".into(),
                        },
                    );
                    continue;
                }
                let options = EnrichOptions::from_env(job.mode);
                let cache = match CacheStore::open(cache_path_from_env()) {
                    Ok(store) => Some(store),
                    Err(err) => {
                        warn!(target = "stylist.jobs", "cache store unavailable: {err}");
                        None
                    }
                };
                let client = ExtractClient::from_env();
                info!(
                    target = "stylist.jobs",
                    job_id = %job.id,
                    session_id = %client.session_id(),
                    "transport session opened"
                );
                let mut enricher = Enricher::new(client, HttpProbe::from_env(), cache);
                let (rows, summary) = enricher.enrich(rows, &options).await;
                corpus.replace(rows).await;

                let mut guard = statuses_bg.lock().await;
                guard.insert(job.id, JobState::Completed { summary });
            }
        });

        (Self { tx, statuses }, handle)
    }

    pub async fn enqueue_enrich(
        &self,
        mode: EnrichMode,
        context: AuthContext,
    ) -> Result<Uuid, ApiError> {
        let id = Uuid::new_v4();
        {
            let mut guard = self.statuses.lock().await;
            guard.insert(id, JobState::Queued);
        }
        let job = Job { id, mode, context };
        self.tx.send(job).await.map_err(|_| ApiError {
            error: "queue_send_failed".into(),
            detail: Some("worker not available".into()),
        })?;
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Option<JobInfo> {
        let guard = self.statuses.lock().await;
        guard.get(&id).cloned().map(|state| JobInfo {
            id: id.to_string(),
            state,
        })
    }
}

fn queue_capacity_from_env() -> usize {
    std::env::var("QUEUE_CAPACITY")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(64)
}

fn cache_path_from_env() -> String {
    std::env::var("CACHE_IDS_PATH").unwrap_or_else(|_| "cache_ids.json".to_string())
}
