use anyhow::{Context, Result};
use clap::Parser;
use pubdate_actors::{DateService, JobOutcome};
use pubdate_common::observability::{LogConfig, LogFormat, init_logging};
use pubdate_common::{ExtractOptions, FetchMethod};
use pubdate_config::{LoggingConfig, PubdateConfig, PubdateConfigLoader, default_config_path};
use serde_json::{Value, json};
use std::path::PathBuf;

/// Find when an article was published (and optionally last modified).
#[derive(Debug, Parser)]
#[command(name = "pubdate", version, about)]
struct Cli {
    /// YAML config file; defaults to the per-user config when present.
    #[arg(long, env = "PUBDATE_CONFIG")]
    config: Option<PathBuf>,

    /// Also look for a modification date.
    #[arg(long)]
    modified: bool,

    /// Bypass the result and fetch-method caches.
    #[arg(long)]
    no_cache: bool,

    /// Force `fetch` or `render` instead of racing both.
    #[arg(long)]
    method: Option<FetchMethod>,

    /// Per-URL deadline; defaults to `service.job_timeout_ms`.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Mirror logs to stderr.
    #[arg(long, short)]
    verbose: bool,

    #[arg(required = true)]
    urls: Vec<String>,
}

impl Cli {
    fn options(&self, job_timeout_ms: u64) -> ExtractOptions {
        ExtractOptions {
            check_modified: self.modified,
            disable_cache: self.no_cache,
            fetch_method: self.method,
            timeout_ms: self.timeout_ms.unwrap_or(job_timeout_ms),
            ..ExtractOptions::default()
        }
    }

    fn load_config(&self) -> Result<PubdateConfig> {
        let mut loader = PubdateConfigLoader::new();
        if let Some(path) = &self.config {
            loader = loader.with_file(path);
        } else if let Some(path) = default_config_path() {
            loader = loader.with_optional_file(path);
        }
        loader.load().context("loading configuration")
    }
}

fn log_config(logging: &LoggingConfig, verbose: bool) -> LogConfig {
    LogConfig {
        log_dir: logging.dir.clone(),
        emit_stderr: logging.emit_stderr || verbose,
        format: if logging.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        },
        default_filter: logging.filter.clone(),
        ..LogConfig::default()
    }
}

/// One output line: the result, or the error tagged with `errorType`.
fn render_line(url: &str, outcome: &JobOutcome) -> Value {
    let body = match outcome {
        Ok(result) => serde_json::to_value(result),
        Err(e) => serde_json::to_value(e).map(|mut v| {
            if let Value::Object(map) = &mut v {
                map.entry("message").or_insert_with(|| json!(e.to_string()));
            }
            v
        }),
    };
    let mut line = body
        .unwrap_or_else(|e| json!({ "errorType": "internal", "message": e.to_string() }));
    if let Value::Object(map) = &mut line {
        map.entry("url").or_insert_with(|| json!(url));
    }
    line
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = cli.load_config()?;
    init_logging(log_config(&cfg.logging, cli.verbose))?;

    let options = cli.options(cfg.service.job_timeout_ms);
    let service = DateService::builder(cfg).build()?;
    let outcomes = futures::future::join_all(
        cli.urls
            .iter()
            .map(|url| service.extract(url, options.clone())),
    )
    .await;

    for (url, outcome) in cli.urls.iter().zip(&outcomes) {
        println!("{}", render_line(url, outcome));
    }
    tracing::info!(
        urls = cli.urls.len(),
        failed = outcomes.iter().filter(|o| o.is_err()).count(),
        "app.run.finished"
    );

    service.close(false).await;
    service.shutdown().await
}
