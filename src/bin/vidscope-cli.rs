// src/bin/vidscope-cli.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use uuid::Uuid;

use vidscope::blob::HttpBlobStore;
use vidscope::concurrency::Cancellation;
use vidscope::config::Config;
use vidscope::ingest::LocalFileIngestAdapter;
use vidscope::job::{Job, SourceKind};
use vidscope::lm::LmClient;
use vidscope::lm::transport::HttpLmTransport;
use vidscope::media::MediaToolkit;
use vidscope::orchestrator::Orchestrator;
use vidscope::store::{InMemoryJobStore, JobStore};

fn main() -> Result<()> {
    vidscope::logging::init();

    let params = Params::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(params))
}

async fn run(params: Params) -> Result<()> {
    let config = match &params.config {
        Some(path) => {
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read config file: {path:?}"))?;
            Config::from_json(&data).context("failed to parse config file")?
        }
        None => Config::default(),
    };

    // Map CLI flags into library options, the same explicit-wiring shape
    // `scribble-cli` uses to keep the library reusable and the binary thin.
    let media = MediaToolkit::new(params.ffmpeg_bin.clone().unwrap_or_else(|| "ffmpeg".to_string()));
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

    let orchestrator = Orchestrator::new(config, media, lm, blob, store.clone(), ingest);

    let job = Job::new(SourceKind::Upload, params.input.to_string_lossy().into_owned());
    let job_id: Uuid = store.create(job).await.context("failed to create job record")?;

    let cancellation = Cancellation::new();
    orchestrator
        .run(job_id, &cancellation)
        .await
        .context("pipeline run failed")?;

    let finished = store.read(job_id).await.context("failed to read finished job")?;
    let rendered = serde_json::to_string_pretty(&finished).context("failed to serialize job")?;
    println!("{rendered}");
    Ok(())
}

/// CLI parameters for `vidscope`.
#[derive(Parser, Debug)]
#[command(name = "vidscope")]
#[command(about = "Run the video intelligence pipeline once against a local file")]
struct Params {
    /// Path to the local video file to process.
    #[arg(short = 'i', long = "input", required = true)]
    pub input: PathBuf,

    /// Path to a JSON config file (see `vidscope::config::Config`); falls
    /// back to `Config::default()` when omitted.
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Override the `ffmpeg` binary path (defaults to `ffmpeg` on `$PATH`).
    #[arg(long = "ffmpeg-bin")]
    pub ffmpeg_bin: Option<String>,

    /// Credentials passed to the blob store's re-authentication endpoint.
    #[arg(long = "blob-credentials", default_value = "")]
    pub blob_credentials: String,
}
