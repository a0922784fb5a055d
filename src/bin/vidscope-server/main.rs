use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Path as AxPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use vidscope::blob::HttpBlobStore;
use vidscope::concurrency::Cancellation;
use vidscope::config::Config;
use vidscope::ingest::LocalFileIngestAdapter;
use vidscope::job::{Job, JobStatus, SourceKind};
use vidscope::lm::LmClient;
use vidscope::lm::transport::HttpLmTransport;
use vidscope::media::MediaToolkit;
use vidscope::orchestrator::Orchestrator;
use vidscope::store::{InMemoryJobStore, JobStore};

/// Internal trigger surface over the core pipeline. **Not** the stable HTTP
/// API of spec §6 — job submission from Drive/YouTube, pagination,
/// chat-over-report, playlists, and downloads stay external per the scope
/// boundary. This exists only so the `axum`/`tower-http`/`prometheus` stack
/// the teacher carries has a real caller.
#[derive(Parser, Debug)]
#[command(name = "vidscope-server")]
#[command(about = "Internal HTTP trigger surface for the video intelligence pipeline")]
struct Params {
    /// Path to a JSON config file; falls back to `Config::default()`.
    #[arg(short = 'c', long = "config")]
    config: Option<String>,

    /// Host interface to bind to.
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", default_value_t = 8088)]
    port: u16,

    /// Credentials passed to the blob store's re-authentication endpoint.
    #[arg(long = "blob-credentials", default_value = "")]
    blob_credentials: String,
}

struct Metrics {
    registry: Registry,
    jobs_submitted: IntCounter,
    jobs_completed: IntCounter,
    jobs_failed: IntCounter,
    jobs_in_flight: IntGauge,
}

impl Metrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();
        let jobs_submitted = IntCounter::new("vidscope_jobs_submitted_total", "Jobs submitted")?;
        let jobs_completed = IntCounter::new("vidscope_jobs_completed_total", "Jobs completed")?;
        let jobs_failed = IntCounter::new("vidscope_jobs_failed_total", "Jobs failed")?;
        let jobs_in_flight = IntGauge::new("vidscope_jobs_in_flight", "Jobs currently running")?;
        registry.register(Box::new(jobs_submitted.clone()))?;
        registry.register(Box::new(jobs_completed.clone()))?;
        registry.register(Box::new(jobs_failed.clone()))?;
        registry.register(Box::new(jobs_in_flight.clone()))?;
        Ok(Self {
            registry,
            jobs_submitted,
            jobs_completed,
            jobs_failed,
            jobs_in_flight,
        })
    }
}

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn JobStore>,
    metrics: Arc<Metrics>,
}

#[derive(Debug, Deserialize)]
struct ProcessRequest {
    /// Path to an already-local video file; this trigger surface only wires
    /// up `SourceKind::Upload` via `LocalFileIngestAdapter`.
    local_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct ProcessResponse {
    job_id: Uuid,
    status: JobStatus,
    progress: f64,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: JobStatus,
    progress: f64,
    current_action: String,
    log: Vec<vidscope::job::LogEntry>,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    vidscope::logging::init();
    let params = Params::parse();

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let config = match &params.config {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {path:?}"))?;
            Config::from_json(&data).context("failed to parse config file")?
        }
        None => Config::default(),
    };

    let media = MediaToolkit::new("ffmpeg");
    let transport = Arc::new(
        HttpLmTransport::new(config.lm_base_url.clone()).context("failed to build LM transport")?,
    );
    let lm = LmClient::new(transport, config.lm_model_id.clone());
    let blob = Arc::new(
        HttpBlobStore::new(config.blob_base_url.clone(), params.blob_credentials.clone())
            .context("failed to build blob store")?,
    );
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let ingest = Arc::new(LocalFileIngestAdapter::new(config.temp_dir.clone()));

    let orchestrator = Arc::new(Orchestrator::new(config, media, lm, blob, store.clone(), ingest));
    let metrics = Arc::new(Metrics::new().context("failed to build metrics registry")?);

    let state = AppState {
        orchestrator,
        store,
        metrics,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .route("/v1/videos/process", post(process_video))
        .route("/v1/videos/status/{id}", get(video_status))
        .route("/v1/videos/results/{id}", get(video_results))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    let listener = tokio::net::TcpListener::bind(addr).await.context("bind failed")?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    let families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    if TextEncoder::new().encode(&families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], buffer).into_response()
}

async fn process_video(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> std::result::Result<Json<ProcessResponse>, AppError> {
    if !request.local_path.is_file() {
        return Err(AppError::bad_request(format!(
            "local_path {:?} does not exist or is not a file",
            request.local_path
        )));
    }

    let job = Job::new(SourceKind::Upload, request.local_path.to_string_lossy().into_owned());
    let job_id = state
        .store
        .create(job)
        .await
        .map_err(|err| AppError::internal(err.to_string()))?;

    state.metrics.jobs_submitted.inc();
    state.metrics.jobs_in_flight.inc();

    let orchestrator = Arc::clone(&state.orchestrator);
    let metrics = Arc::clone(&state.metrics);
    tokio::spawn(async move {
        let cancellation = Cancellation::new();
        let outcome = orchestrator.run(job_id, &cancellation).await;
        metrics.jobs_in_flight.dec();
        match outcome {
            Ok(()) => metrics.jobs_completed.inc(),
            Err(_) => metrics.jobs_failed.inc(),
        }
    });

    Ok(Json(ProcessResponse {
        job_id,
        status: JobStatus::Pending,
        progress: 0.0,
    }))
}

async fn video_status(
    State(state): State<AppState>,
    AxPath(id): AxPath<Uuid>,
) -> std::result::Result<Json<StatusResponse>, AppError> {
    let job = lookup(&state, id).await?;
    Ok(Json(StatusResponse {
        status: job.status,
        progress: job.progress,
        current_action: job.current_action,
        log: job.log,
    }))
}

async fn video_results(
    State(state): State<AppState>,
    AxPath(id): AxPath<Uuid>,
) -> std::result::Result<Response, AppError> {
    let job = lookup(&state, id).await?;
    match job.status {
        JobStatus::Completed => Ok(Json(job).into_response()),
        JobStatus::Failed => Err(AppError::internal(
            job.error_message.unwrap_or_else(|| "job failed".to_string()),
        )),
        _ => Err(AppError::bad_request("job is still in flight")),
    }
}

async fn lookup(state: &AppState, id: Uuid) -> std::result::Result<Job, AppError> {
    state
        .store
        .read(id)
        .await
        .map_err(|_| AppError::not_found(format!("no job with id {id}")))
}
