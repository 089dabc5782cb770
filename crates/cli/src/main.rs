//! `kenburns` -- turn still images into short motion clips.
//!
//! Queues every image given on the command line, converts them one at a
//! time through the Conversion Service and saves the resulting MP4 files.
//!
//! ```text
//! kenburns --duration 8 --stage 2 photos/*.jpg
//! ```
//!
//! Options fall back to environment variables (see [`Args`]); a `.env`
//! file is honoured.

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kenburns_cli::config::{Args, CliConfig};
use kenburns_cli::input::load_sources;
use kenburns_cli::sink::FileWriterSink;
use kenburns_client::ConversionApi;
use kenburns_core::effects::EffectPolicy;
use kenburns_core::job::JobStatus;
use kenburns_core::queue::JobQueue;
use kenburns_pipeline::{QueueEvent, Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "kenburns_cli=info,kenburns_pipeline=info,kenburns_client=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = CliConfig::from_args(&args);
    tracing::info!(
        api_url = %config.api_url,
        output_dir = %config.output_dir.display(),
        "Loaded configuration",
    );

    let catalog = config.load_catalog().await?;
    let selection = config.selection(&catalog);

    let api = ConversionApi::with_timeout(config.api_url.clone(), config.request_timeout)
        .context("Failed to build HTTP client")?;
    let sink = FileWriterSink::new(api.clone(), &config.output_dir);
    let queue = JobQueue::new(EffectPolicy::new(catalog));
    let scheduler = Scheduler::new(queue, api, sink, config.poller_config());

    let reporter = tokio::spawn(report_progress(scheduler.subscribe()));

    let sources = load_sources(&args.paths).await;
    let admission = scheduler.enqueue(sources, &selection).await;
    if admission.admitted == 0 {
        reporter.abort();
        anyhow::bail!("No images to convert");
    }

    tokio::select! {
        _ = scheduler.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted");
            scheduler.shutdown().await;
        }
    }
    reporter.abort();

    let jobs = scheduler.snapshot().await;
    let done = jobs.iter().filter(|j| j.status == JobStatus::Done).count();
    let failed = jobs.iter().filter(|j| j.status == JobStatus::Error).count();
    let skipped = jobs.iter().filter(|j| j.is_active()).count();
    tracing::info!(done, failed, skipped, "Finished");

    if failed > 0 || skipped > 0 {
        anyhow::bail!("{} of {} conversions did not complete", failed + skipped, jobs.len());
    }
    Ok(())
}

/// Log per-job progress; everything else is already logged by the scheduler.
async fn report_progress(mut events: broadcast::Receiver<QueueEvent>) {
    loop {
        match events.recv().await {
            Ok(QueueEvent::JobProgress { job_id, percent }) => {
                tracing::info!(job_id, percent, "Converting");
            }
            Ok(event) => {
                if let Ok(json) = serde_json::to_string(&event) {
                    tracing::debug!(event = %json, "Queue event");
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(missed = n, "Progress reporter lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
