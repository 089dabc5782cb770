use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use kenburns_client::retry::RetryConfig;
use kenburns_core::effects::{EffectCatalog, DEFAULT_EFFECT_ID};
use kenburns_core::params::{parse_duration, parse_stage};
use kenburns_core::queue::JobSelection;
use kenburns_pipeline::PollerConfig;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_RETRY_ATTEMPTS: u32 = 3;

/// Command-line arguments. Every option can also be set through the
/// environment variable named next to it.
///
/// | Option                   | Env Var                | Default                 |
/// |--------------------------|------------------------|-------------------------|
/// | `--api-url`              | `CONVERT_API_URL`      | `http://127.0.0.1:8000` |
/// | `--output-dir`           | `OUTPUT_DIR`           | `.`                     |
/// | `--effect`               | `DEFAULT_EFFECT`       | `zoom_in_center`        |
/// | `--duration`             | `DEFAULT_DURATION`     | `5`                     |
/// | `--stage`                | `DEFAULT_STAGE`        | `1`                     |
/// | `--poll-interval-ms`     | `POLL_INTERVAL_MS`     | `500`                   |
/// | `--request-timeout-secs` | `REQUEST_TIMEOUT_SECS` | `30`                    |
/// | `--poll-retry-attempts`  | `POLL_RETRY_ATTEMPTS`  | `3`                     |
/// | `--effects-file`         | `EFFECTS_FILE`         | built-in set            |
#[derive(Parser, Debug)]
#[command(name = "kenburns")]
#[command(version)]
#[command(about = "Turn still images into short motion clips")]
pub struct Args {
    /// Images to convert, in queue order
    #[arg(required = true, value_name = "IMAGE")]
    pub paths: Vec<PathBuf>,

    /// Base URL of the Conversion Service
    #[arg(long, env = "CONVERT_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Directory finished clips are written to
    #[arg(long, short = 'o', env = "OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Effect id for a single image; batches of two or more get random effects
    #[arg(long, short = 'e', env = "DEFAULT_EFFECT", default_value = DEFAULT_EFFECT_ID)]
    pub effect: String,

    /// Clip length in seconds (unusable values fall back to 5, capped at 60)
    #[arg(long, short = 'd', env = "DEFAULT_DURATION")]
    pub duration: Option<String>,

    /// Effect stage 1-3 (anything else falls back to 1)
    #[arg(long, short = 's', env = "DEFAULT_STAGE")]
    pub stage: Option<String>,

    /// Delay between progress polls
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Per-request HTTP timeout
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Attempts per progress poll when the service is unreachable
    #[arg(long, env = "POLL_RETRY_ATTEMPTS", default_value_t = DEFAULT_POLL_RETRY_ATTEMPTS)]
    pub poll_retry_attempts: u32,

    /// JSON effect catalog replacing the built-in set
    #[arg(long, env = "EFFECTS_FILE")]
    pub effects_file: Option<PathBuf>,
}

/// Resolved CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub api_url: String,
    pub output_dir: PathBuf,
    /// Effect id applied when fewer than two images are queued.
    pub default_effect: String,
    /// Clip length in seconds.
    pub duration: f64,
    /// Effect stage (1-3).
    pub stage: u8,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Total attempts for a progress poll that fails at the transport level.
    pub poll_retry_attempts: u32,
    pub effects_file: Option<PathBuf>,
}

impl CliConfig {
    /// Apply the lenient defaults to parsed arguments.
    pub fn from_args(args: &Args) -> Self {
        let poll_interval_ms = match args.poll_interval_ms {
            0 => DEFAULT_POLL_INTERVAL_MS,
            ms => ms,
        };
        let request_timeout_secs = match args.request_timeout_secs {
            0 => DEFAULT_REQUEST_TIMEOUT_SECS,
            secs => secs,
        };

        Self {
            api_url: args.api_url.clone(),
            output_dir: args.output_dir.clone(),
            default_effect: args.effect.trim().to_string(),
            duration: parse_duration(args.duration.as_deref()),
            stage: parse_stage(args.stage.as_deref()),
            poll_interval: Duration::from_millis(poll_interval_ms),
            request_timeout: Duration::from_secs(request_timeout_secs),
            poll_retry_attempts: args.poll_retry_attempts.max(1),
            effects_file: args.effects_file.clone(),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poll_interval,
            retry: RetryConfig {
                max_attempts: self.poll_retry_attempts,
                ..Default::default()
            },
        }
    }

    /// The built-in effect set, or the catalog in `effects_file`.
    pub async fn load_catalog(&self) -> anyhow::Result<EffectCatalog> {
        let Some(path) = &self.effects_file else {
            return Ok(EffectCatalog::default());
        };
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read effects file {}", path.display()))?;
        let catalog = EffectCatalog::from_json(&json)
            .with_context(|| format!("Invalid effects file {}", path.display()))?;
        Ok(catalog)
    }

    /// The explicit selection every queued image starts with.
    ///
    /// Unknown effect ids resolve to the catalog default.
    pub fn selection(&self, catalog: &EffectCatalog) -> JobSelection {
        if catalog.get(&self.default_effect).is_none() {
            tracing::warn!(
                effect_id = %self.default_effect,
                fallback = %catalog.default_effect().id,
                "Unknown effect, using default",
            );
        }
        JobSelection {
            effect: catalog.resolve(&self.default_effect).clone(),
            duration: self.duration,
            stage: self.stage,
        }
    }
}
