mod cache;
mod corpus;
mod enrich;
mod extract;
mod http;
mod jobs;
mod look;
mod lookgen;
mod matcher;
mod metrics;
mod models;
mod probe;
mod prompts;
mod reconcile;
mod schema;
mod security;

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use corpus::CorpusStore;
use extract::{ExtractClient, ExtractError};
use matcher::MatcherConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, EnrichMode, GeneratedLook, MatchResult};
use security::{AuthContext, AuthState, require_api_auth};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "stylist.api", "server crashed: {err}");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let auth_state = AuthState::from_env();
    let corpus = CorpusStore::from_env()?;
    let (queue, _worker) = jobs::JobQueue::spawn(corpus.clone());
    let openapi: serde_json::Value = serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or(json!({"openapi":"3.0.3"}));
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    let state = AppState {
        corpus,
        queue,
        client: Arc::new(ExtractClient::from_env()),
        openapi: Arc::new(openapi),
        prometheus_handle,
    };

    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/looks", post(create_look))
        .nest(
            "/stages",
            Router::new()
                .route("/generate_look", post(stage_generate_look))
                .route("/match", post(stage_match)),
        )
        .route("/corpus/summary", get(corpus_summary))
        .nest(
            "/jobs",
            Router::new()
                .route("/enrich", post(enqueue_enrich_job))
                .route("/{id}", get(get_job_status)),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_api_auth));

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "stylist.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    corpus: CorpusStore,
    queue: jobs::JobQueue,
    client: Arc<ExtractClient>,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "stylist-api-rs",
    }))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Ok(key) = std::env::var("OPENAPI_KEY") {
        let presented = headers
            .get("X-Docs-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != key {
            return Err(AppError::invalid_input("docs", "unauthorized"));
        }
    }
    Ok(Json((*state.openapi).clone()))
}

async fn swagger_ui() -> axum::http::Response<String> {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Stylist API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    axum::http::Response::builder()
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.to_string())
        .unwrap()
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> axum::http::Response<String> {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return axum::http::Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .body("unauthorized".into())
                .unwrap();
        }
    }
    let body = state.prometheus_handle.render();
    axum::http::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .unwrap()
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

#[derive(Debug, Deserialize)]
struct MatchOverrides {
    min_keep: Option<usize>,
    per_slot_cap: Option<usize>,
    include_unisex: Option<bool>,
}

impl MatchOverrides {
    fn apply(&self, mut config: MatcherConfig) -> MatcherConfig {
        if let Some(min_keep) = self.min_keep {
            config.min_keep = min_keep.max(1);
        }
        if let Some(cap) = self.per_slot_cap {
            config.per_slot_cap = cap.max(1);
        }
        if let Some(include_unisex) = self.include_unisex {
            config.include_unisex = include_unisex;
        }
        config
    }
}

#[derive(Debug, Deserialize)]
struct LookRequest {
    request: String,
    #[serde(flatten)]
    overrides: MatchOverrides,
}

#[derive(Debug, Serialize)]
struct LookResponse {
    look: GeneratedLook,
    matches: MatchResult,
}

/// Full query path: free-text request → structured look → per-slot
/// candidate sets against the current corpus snapshot.
///
/// - Method: `POST`
/// - Path: `/looks`
/// - Auth: `Authorization: Bearer <key>` or `X-Stylist-Key: <key>`
async fn create_look(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<LookRequest>,
) -> Result<Json<LookResponse>, AppError> {
    crate::metrics::inc_requests("/looks");
    if payload.request.trim().is_empty() {
        return Err(AppError::invalid_input("looks", "empty_request"));
    }
    info!(
        target = "stylist.api",
        org_id = %context.org_id,
        api_key = %context.api_key_id,
        "look query invoked",
    );

    let started = Instant::now();
    let look = lookgen::generate_look(&state.client, &payload.request).await?;
    crate::metrics::stage_elapsed("generate_look", started.elapsed().as_millis());

    let config = payload.overrides.apply(MatcherConfig::from_env());
    let snapshot = state.corpus.snapshot().await;
    let started = Instant::now();
    let matches = look::assemble(&snapshot, &look, &config);
    crate::metrics::stage_elapsed("match", started.elapsed().as_millis());

    Ok(Json(LookResponse { look, matches }))
}

#[derive(Debug, Deserialize)]
struct GenerateLookRequest {
    request: String,
}

async fn stage_generate_look(
    State(state): State<AppState>,
    Json(payload): Json<GenerateLookRequest>,
) -> Result<Json<GeneratedLook>, AppError> {
    crate::metrics::inc_requests("/stages/generate_look");
    if payload.request.trim().is_empty() {
        return Err(AppError::invalid_input("generate_look", "empty_request"));
    }
    let look = lookgen::generate_look(&state.client, &payload.request).await?;
    Ok(Json(look))
}

#[derive(Debug, Deserialize)]
struct MatchRequest {
    look: GeneratedLook,
    #[serde(flatten)]
    overrides: MatchOverrides,
}

async fn stage_match(
    State(state): State<AppState>,
    Json(payload): Json<MatchRequest>,
) -> Result<Json<MatchResult>, AppError> {
    crate::metrics::inc_requests("/stages/match");
    let config = payload.overrides.apply(MatcherConfig::from_env());
    let snapshot = state.corpus.snapshot().await;
    Ok(Json(look::assemble(&snapshot, &payload.look, &config)))
}

#[derive(Debug, Serialize)]
struct CorpusSummary {
    rows: usize,
    enriched: usize,
}

async fn corpus_summary(State(state): State<AppState>) -> Json<CorpusSummary> {
    crate::metrics::inc_requests("/corpus/summary");
    let snapshot = state.corpus.snapshot().await;
    Json(CorpusSummary {
        rows: snapshot.len(),
        enriched: snapshot.iter().filter(|row| row.extracted.is_some()).count(),
    })
}

#[derive(Debug, Deserialize)]
struct EnrichRequest {
    mode: EnrichMode,
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    job_id: String,
}

async fn enqueue_enrich_job(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<EnrichRequest>,
) -> Result<Json<EnqueueResponse>, AppError> {
    crate::metrics::inc_requests("/jobs/enrich");
    let id = state
        .queue
        .enqueue_enrich(payload.mode, context)
        .await
        .map_err(|err| AppError::internal("enqueue", err.error))?;
    Ok(Json(EnqueueResponse {
        job_id: id.to_string(),
    }))
}

async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<jobs::JobInfo>, AppError> {
    let Ok(uuid) = uuid::Uuid::parse_str(&id) else {
        return Err(AppError::invalid_input("jobs", "invalid_job_id"));
    };
    if let Some(info) = state.queue.get(uuid).await {
        Ok(Json(info))
    } else {
        Err(AppError::invalid_input("jobs", "not_found"))
    }
}

#[derive(Debug)]
enum AppError {
    InvalidInput { stage: &'static str, code: String },
    Internal { stage: &'static str, detail: String },
    Upstream(ExtractError),
}

impl AppError {
    fn invalid_input(stage: &'static str, code: impl Into<String>) -> Self {
        Self::InvalidInput {
            stage,
            code: code.into(),
        }
    }

    fn internal(stage: &'static str, detail: impl Into<String>) -> Self {
        Self::Internal {
            stage,
            detail: detail.into(),
        }
    }
}

impl From<ExtractError> for AppError {
    fn from(value: ExtractError) -> Self {
        Self::Upstream(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, payload) = match self {
            AppError::InvalidInput { stage, code } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: stage.to_string(),
                    detail: Some(code),
                },
            ),
            AppError::Internal { stage, detail } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError {
                    error: stage.to_string(),
                    detail: Some(detail),
                },
            ),
            AppError::Upstream(err) => (
                StatusCode::BAD_GATEWAY,
                ApiError {
                    error: "inference".to_string(),
                    detail: Some(err.to_string()),
                },
            ),
        };
        (status, Json(payload)).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
