use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use opportunity_scout::config::PipelineConfig;
use opportunity_scout::email::load_email_file;
use opportunity_scout::llm::{LlmConfig, create_provider};
use opportunity_scout::tools::tavily::{TavilyClient, TavilyConfig};
use opportunity_scout::{Pipeline, PipelineDeps, WorkflowEvent, WorkflowPhase, WorkflowRun};

const USAGE: &str = "Usage: opportunity-scout <email.eml|email.json> [--stream]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Held for the life of the process so buffered log lines are flushed.
    let _log_guard = init_tracing();

    let (path, stream) = parse_args()?;

    let llm_config = LlmConfig::from_env().context("LLM configuration")?;
    let config = PipelineConfig::from_env().context("pipeline configuration")?;
    let tavily = TavilyConfig::from_env().context("search configuration")?;

    eprintln!("🔎 Opportunity Scout v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Email: {}", path.display());
    eprintln!(
        "   Research: {} iterations, {} concurrent\n",
        config.research.max_iterations, config.research.concurrency
    );

    let llm = create_provider(&llm_config).context("creating LLM provider")?;
    let search = Arc::new(TavilyClient::new(tavily).context("creating search client")?);
    let email = load_email_file(&path)
        .await
        .with_context(|| format!("loading {}", path.display()))?;

    let pipeline = Pipeline::new(config, PipelineDeps { llm, search });
    let run = if stream {
        stream_run(&pipeline, email).await?
    } else {
        pipeline.run(email).await
    };

    eprintln!("{}", run.summary.trim_end());
    eprintln!(
        "   {} ms, {} tokens, ~${}",
        run.elapsed_ms,
        run.usage.total(),
        run.estimated_cost.round_dp(4)
    );
    println!("{}", serde_json::to_string_pretty(&run).context("serializing run")?);

    if run.phase == WorkflowPhase::Error {
        let reasons: Vec<String> = run.errors.iter().map(|e| format!("{}: {}", e.stage, e.message)).collect();
        bail!("run ended in error: {}", reasons.join("; "));
    }
    Ok(())
}

fn parse_args() -> anyhow::Result<(PathBuf, bool)> {
    let mut path = None;
    let mut stream = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--stream" => stream = true,
            "-h" | "--help" => {
                eprintln!("{USAGE}");
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            _ if path.is_none() => path = Some(PathBuf::from(&arg)),
            _ => bail!("unexpected argument {arg}\n{USAGE}"),
        }
    }
    let path = path.with_context(|| USAGE.to_string())?;
    Ok((path, stream))
}

/// Print progress events to stderr as JSON lines and return the final run.
async fn stream_run(pipeline: &Pipeline, email: opportunity_scout::EmailInput) -> anyhow::Result<WorkflowRun> {
    let mut events = pipeline.run_stream(email);
    while let Some(event) = events.next().await {
        match event {
            WorkflowEvent::Finished { run } => return Ok(*run),
            other => eprintln!("{}", serde_json::to_string(&other).context("serializing event")?),
        }
    }
    bail!("pipeline stopped without a result")
}

/// Stderr logging filtered by `RUST_LOG` (default `info`), plus daily log
/// files when `SCOUT_LOG_DIR` is set.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match std::env::var("SCOUT_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "opportunity-scout.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}
