mod config;
mod export;

use anyhow::Context;
use config::{InputSpec, WorkerConfig};
use export::{ExportHooks, RowExport};
use ledgerline_db::SqliteConnector;
use ledgerline_engine::{
    BindValue, DbRowSource, DirectoryHost, FileRowSource, ReportAggregator, RowSource, RunSummary, TaskEngine,
};
use serde::Serialize;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "LEDGERLINE_LOG";

/// Printed to stdout as one JSON object when the run succeeds.
#[derive(Serialize)]
struct RunOutcome {
    dispatched: usize,
    performed: usize,
    outputs: usize,
    limit_reached: bool,
    reports: Vec<String>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(args: Vec<String>) -> anyhow::Result<WorkerConfig> {
    let mut config = match config::config_path(&args) {
        Some(path) => WorkerConfig::load(&path)?,
        None => WorkerConfig::default(),
    };
    config.apply_env();
    config.apply_flags(args)?;
    Ok(config)
}

fn execute<S: RowSource>(
    source: S,
    config: &WorkerConfig,
    reports: Arc<ReportAggregator>,
) -> anyhow::Result<RunSummary> {
    let title = config.report_title();
    let mut engine = TaskEngine::new(source, reports).with_config(config.engine_config());
    let summary = engine.run_with_hooks(&mut ExportHooks::new(title), || RowExport::new(title))?;
    Ok(summary)
}

fn run(args: Vec<String>) -> anyhow::Result<RunOutcome> {
    let config = load_config(args)?;
    let host = DirectoryHost::new(config.report_dir());
    let reports = Arc::new(ReportAggregator::new(Arc::new(host), config.posting_date()?));

    let summary = match config.input()? {
        InputSpec::Query { db, sql, params } => {
            let connector = Arc::new(SqliteConnector::read_only(db));
            let params = params.into_iter().map(BindValue::from).collect();
            let source = DbRowSource::new(connector, sql).with_params(params);
            execute(source, &config, Arc::clone(&reports))
        }
        InputSpec::File {
            path,
            delimiter,
            has_header,
        } => {
            let source = FileRowSource::new(path, delimiter, has_header);
            execute(source, &config, Arc::clone(&reports))
        }
    }
    .context("batch run failed")?;

    Ok(RunOutcome {
        dispatched: summary.dispatched,
        performed: summary.performed,
        outputs: summary.outputs,
        limit_reached: summary.limit_reached,
        reports: reports.titles(),
    })
}

fn main() -> ExitCode {
    init_logging();
    let args: Vec<String> = env::args().skip(1).collect();
    match run(args) {
        Ok(outcome) => match serde_json::to_string(&outcome) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to encode run summary");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "worker failed");
            ExitCode::FAILURE
        }
    }
}
