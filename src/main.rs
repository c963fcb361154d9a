use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};

use chronostream_client::metrics::buffer::MAX_WINDOW;
use chronostream_client::{
    server, CancelHandle, CorrectnessParams, CorrectnessReport, CorrectnessWatcher, FinalReport,
    HttpJobService, JobOutcome, JobParams, JobRunner, JobSpec, LiveBoard, ResultService,
    StreamConfig,
};

#[derive(Parser, Debug)]
#[command(name = "chronostream")]
#[command(about = "Start benchmark jobs and stream their latency/throughput results")]
struct Cli {
    /// Base URL of the job service
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    /// TOML file with stream settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Samples requested per poll (overrides the config file)
    #[arg(long)]
    page_size: Option<u64>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Retries after a transport failure
    #[arg(long)]
    retries: Option<u32>,

    /// Times a stream interrupted by a transport failure is resumed from its cursor
    #[arg(long, default_value_t = 2)]
    resumes: u32,

    /// Serve the live observatory on this address, e.g. 127.0.0.1:3000
    #[arg(long)]
    serve: Option<SocketAddr>,

    /// Write the final reports as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the primitives and providers the service can benchmark
    List,

    /// Start a perf job and stream its results
    Run {
        #[arg(long)]
        primitive: String,
        #[arg(long)]
        provider: String,
        #[arg(long, default_value_t = 10)]
        bytes: u32,
        #[arg(long, default_value_t = 1000)]
        iterations: u32,
        #[arg(long, default_value_t = 100)]
        threads: u32,
    },

    /// Start a correctness job and wait for it to finish
    Correctness {
        #[arg(long, default_value_t = 100)]
        iterations: u32,
        #[arg(long, default_value_t = 4)]
        threads: u32,
    },

    /// Stream jobs that are already running
    Watch {
        #[arg(required = true)]
        ids: Vec<u64>,
        /// Chart window per job
        #[arg(long, default_value_t = MAX_WINDOW)]
        window: usize,
    },
}

#[derive(Serialize)]
struct RunSummary {
    server: String,
    finished_at: DateTime<Utc>,
    jobs: Vec<JobSummary>,
}

#[derive(Serialize)]
struct CorrectnessSummary {
    server: String,
    finished_at: DateTime<Utc>,
    report: CorrectnessReport,
}

#[derive(Serialize)]
struct JobSummary {
    job_id: u64,
    summary: String,
    report: Option<FinalReport>,
    partial: Option<FinalReport>,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let service = Arc::new(
        HttpJobService::new(&cli.server)
            .with_context(|| format!("Failed to create client for {}", cli.server))?,
    );

    let cancel_all = CancelHandle::new();
    let trigger = cancel_all.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            trigger.cancel();
        }
    });

    let specs = match &cli.command {
        Command::List => return list(service.as_ref()).await,
        Command::Correctness { iterations, threads } => {
            let params = CorrectnessParams {
                iterations: *iterations,
                threads: *threads,
            };
            return correctness(&cli, service, config, params, cancel_all).await;
        }
        Command::Run {
            primitive,
            provider,
            bytes,
            iterations,
            threads,
        } => {
            let params = JobParams {
                primitive: primitive.clone(),
                provider: provider.clone(),
                bytes: *bytes,
                iterations: *iterations,
                threads: *threads,
            };
            let started = service
                .start_job(&params)
                .await
                .context("Failed to start job")?;
            info!("started job {}: {}", started.id, started.summary);
            vec![JobSpec {
                job_id: started.id,
                summary: started.summary,
                window: params.expected_samples().min(MAX_WINDOW as u64) as usize,
            }]
        }
        Command::Watch { ids, window } => ids
            .iter()
            .map(|&id| JobSpec {
                job_id: id,
                summary: format!("job {id}"),
                window: *window,
            })
            .collect(),
    };

    let board = Arc::new(LiveBoard::new());
    if let Some(addr) = cli.serve {
        let board = board.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(addr, board).await {
                error!("observatory stopped: {e}");
            }
        });
    }

    let summaries: Vec<String> = specs.iter().map(|s| s.summary.clone()).collect();
    let runner = JobRunner::new(service, config, board);
    let mut outcomes = runner.run_all(specs, cancel_all.clone()).await;
    for _ in 0..cli.resumes {
        if cancel_all.is_cancelled() {
            break;
        }
        resume_interrupted(&runner, &mut outcomes).await;
    }

    let failed = print_outcomes(&outcomes, &summaries);

    if let Some(path) = &cli.json {
        write_json(path, &cli.server, outcomes, summaries)?;
        info!("reports written to {}", path.display());
    }

    if cli.serve.is_some() && !cancel_all.is_cancelled() {
        info!("all streams finished; observatory still up, ctrl-c to exit");
        let _ = tokio::signal::ctrl_c().await;
    }

    if failed > 0 {
        anyhow::bail!("{failed} job(s) did not complete");
    }
    Ok(())
}

/// Resume every stream that stopped on a recoverable failure, in place.
async fn resume_interrupted(runner: &JobRunner, outcomes: &mut [JobOutcome]) {
    let handles: Vec<_> = outcomes
        .iter_mut()
        .enumerate()
        .filter_map(|(i, o)| o.resume.take().map(|c| (i, runner.resume(c))))
        .collect();
    for (i, handle) in handles {
        outcomes[i] = handle.join().await;
    }
}

async fn correctness(
    cli: &Cli,
    service: Arc<HttpJobService>,
    config: StreamConfig,
    params: CorrectnessParams,
    cancel: CancelHandle,
) -> Result<()> {
    let started = service
        .start_correctness(&params)
        .await
        .context("Failed to start correctness job")?;
    info!("started job {}: {}", started.id, started.summary);

    let mut watcher =
        CorrectnessWatcher::new(started.id, service, config, params.expected_iterations())
            .with_cancel(cancel);
    let report = watcher
        .run()
        .await
        .with_context(|| format!("Correctness job {} did not finish", started.id))?;

    println!();
    println!("job {}: {}", started.id, started.summary);
    print!("{report}");

    if let Some(path) = &cli.json {
        let summary = CorrectnessSummary {
            server: cli.server.clone(),
            finished_at: Utc::now(),
            report,
        };
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("report written to {}", path.display());
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<StreamConfig> {
    let mut config = match &cli.config {
        Some(path) => StreamConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => StreamConfig::default(),
    };

    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.request_timeout_ms = timeout_ms;
    }
    if let Some(retries) = cli.retries {
        config.max_retries = retries;
    }
    config.validate()?;
    Ok(config)
}

async fn list(service: &dyn ResultService) -> Result<()> {
    let catalog = service
        .list_catalog()
        .await
        .context("Failed to list primitives")?;

    println!("primitives:");
    for (key, name) in &catalog.primitives {
        println!("  {key:<24} {name}");
    }
    println!("providers:");
    for provider in &catalog.providers {
        println!("  {provider}");
    }
    Ok(())
}

/// Print every outcome; returns how many jobs did not complete.
fn print_outcomes(outcomes: &[JobOutcome], summaries: &[String]) -> usize {
    let mut failed = 0;
    for (outcome, summary) in outcomes.iter().zip(summaries) {
        println!();
        println!("job {}: {summary}", outcome.job_id);
        match &outcome.result {
            Ok(report) => println!("{report}"),
            Err(e) => {
                failed += 1;
                println!("failed: {e}");
                if let Some(partial) = &outcome.partial {
                    println!("partial results:");
                    println!("{partial}");
                }
            }
        }
    }
    failed
}

fn write_json(
    path: &Path,
    server: &str,
    outcomes: Vec<JobOutcome>,
    summaries: Vec<String>,
) -> Result<()> {
    let jobs = outcomes
        .into_iter()
        .zip(summaries)
        .map(|(outcome, summary)| {
            let (report, error) = match outcome.result {
                Ok(report) => (Some(report), None),
                Err(e) => (None, Some(e.to_string())),
            };
            JobSummary {
                job_id: outcome.job_id,
                summary,
                report,
                partial: outcome.partial,
                error,
            }
        })
        .collect();

    let summary = RunSummary {
        server: server.to_owned(),
        finished_at: Utc::now(),
        jobs,
    };
    let json = serde_json::to_string_pretty(&summary)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
