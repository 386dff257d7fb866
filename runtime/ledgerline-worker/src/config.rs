use anyhow::{Context, bail};
use chrono::NaiveDate;
use ledgerline_engine::{Delimiter, EngineConfig};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const WORKERS_ENV: &str = "LEDGERLINE_WORKERS";
pub const MAX_TASKS_ENV: &str = "LEDGERLINE_MAX_TASKS";

/// Where rows come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    Query {
        db: PathBuf,
        sql: String,
        params: Vec<String>,
    },
    File {
        path: PathBuf,
        delimiter: Delimiter,
        has_header: bool,
    },
}

/// Job settings. Loaded from an optional JSON file, then environment, then
/// command-line flags, each layer overriding the previous one.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    pub db: Option<PathBuf>,
    pub sql: Option<String>,
    pub params: Vec<String>,
    pub csv: Option<PathBuf>,
    pub delimiter: Option<String>,
    pub headers: bool,
    pub workers: Option<usize>,
    pub max_tasks: Option<usize>,
    pub queue_depth: Option<usize>,
    pub report_dir: Option<PathBuf>,
    pub report: Option<String>,
    pub posting_date: Option<String>,
}

impl WorkerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Apply `LEDGERLINE_WORKERS` and `LEDGERLINE_MAX_TASKS`. Unparseable
    /// values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| env::var(key).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(workers) = lookup(WORKERS_ENV).and_then(|val| val.parse().ok()) {
            self.workers = Some(workers);
        }
        if let Some(max_tasks) = lookup(MAX_TASKS_ENV).and_then(|val| val.parse().ok()) {
            self.max_tasks = Some(max_tasks);
        }
    }

    /// Apply `--flag value` pairs. `--config` is handled by the caller.
    pub fn apply_flags<I>(&mut self, args: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| args.next().with_context(|| format!("{flag} needs a value"));
            match arg.as_str() {
                "--db" => self.db = Some(PathBuf::from(value("--db")?)),
                "--sql" => self.sql = Some(value("--sql")?),
                "--param" => self.params.push(value("--param")?),
                "--csv" => self.csv = Some(PathBuf::from(value("--csv")?)),
                "--delimiter" => self.delimiter = Some(value("--delimiter")?),
                "--headers" => self.headers = true,
                "--threads" => self.workers = Some(parse_count("--threads", &value("--threads")?)?),
                "--limit" => self.max_tasks = Some(parse_count("--limit", &value("--limit")?)?),
                "--queue-depth" => self.queue_depth = Some(parse_count("--queue-depth", &value("--queue-depth")?)?),
                "--report-dir" => self.report_dir = Some(PathBuf::from(value("--report-dir")?)),
                "--report" => self.report = Some(value("--report")?),
                "--posting-date" => self.posting_date = Some(value("--posting-date")?),
                "--config" => {
                    value("--config")?;
                }
                other => bail!("unknown flag {other}"),
            }
        }
        Ok(())
    }

    pub fn input(&self) -> anyhow::Result<InputSpec> {
        match (&self.db, &self.csv) {
            (Some(db), None) => {
                let sql = self.sql.clone().context("--sql is required with --db")?;
                Ok(InputSpec::Query {
                    db: db.clone(),
                    sql,
                    params: self.params.clone(),
                })
            }
            (None, Some(path)) => {
                let delimiter = match self.delimiter.as_deref() {
                    Some(name) => name.parse().map_err(anyhow::Error::msg)?,
                    None => Delimiter::default(),
                };
                Ok(InputSpec::File {
                    path: path.clone(),
                    delimiter,
                    has_header: self.headers,
                })
            }
            (Some(_), Some(_)) => bail!("--db and --csv are mutually exclusive"),
            (None, None) => bail!("one of --db or --csv is required"),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_tasks: self.max_tasks,
            workers: self.workers.unwrap_or(1),
            queue_depth: self.queue_depth.unwrap_or(0),
        }
    }

    pub fn report_dir(&self) -> PathBuf {
        self.report_dir.clone().unwrap_or_else(|| PathBuf::from("reports"))
    }

    pub fn report_title(&self) -> &str {
        self.report.as_deref().unwrap_or("Export")
    }

    /// Posting date for structured reports; today when not configured.
    pub fn posting_date(&self) -> anyhow::Result<NaiveDate> {
        match self.posting_date.as_deref() {
            Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .with_context(|| format!("invalid posting date {text}")),
            None => Ok(chrono::Local::now().date_naive()),
        }
    }
}

/// Location of the JSON config file, if `--config` was given.
pub fn config_path(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .position(|arg| arg == "--config")
        .and_then(|idx| args.get(idx + 1))
        .map(PathBuf::from)
}

fn parse_count(flag: &str, value: &str) -> anyhow::Result<usize> {
    value
        .parse()
        .with_context(|| format!("{flag} expects a non-negative integer, got {value}"))
}
