//! Row dispatch.
//!
//! The calling thread owns the row source: it is the only thread that
//! fetches rows and numbers them, so row indices follow source order no
//! matter how many workers run. Rows travel to the workers, together with
//! a fresh work unit, over a bounded queue.

use crate::error::EngineError;
use crate::report::ReportAggregator;
use crate::row::PositionalRow;
use crate::source::RowSource;
use crate::task::{NoHooks, RunContext, RunHooks, RunShared, TaskContext, WorkUnit};
use crossbeam_channel::{Receiver, Sender, bounded};
use ledgerline_db::Connector;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

const QUEUE_SLOTS_PER_WORKER: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Stop after this many units have been dispatched.
    pub max_tasks: Option<usize>,
    pub workers: usize,
    /// Rows buffered between the dispatcher and the workers; 0 picks a
    /// depth from the worker count.
    pub queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tasks: None,
            workers: 1,
            queue_depth: 0,
        }
    }
}

impl EngineConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = Some(max_tasks);
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    pub fn queue_capacity(&self) -> usize {
        if self.queue_depth == 0 {
            self.worker_count() * QUEUE_SLOTS_PER_WORKER
        } else {
            self.queue_depth
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub dispatched: usize,
    /// Units that finished without error.
    pub performed: usize,
    /// Units whose output step ran to completion.
    pub outputs: usize,
    /// Dispatch stopped because `max_tasks` was reached.
    pub limit_reached: bool,
}

struct Job<W> {
    index: usize,
    row: PositionalRow,
    unit: W,
}

#[derive(Default)]
struct RunState {
    aborted: AtomicBool,
    failure: Mutex<Option<EngineError>>,
    performed: AtomicUsize,
    outputs: AtomicUsize,
}

impl RunState {
    /// Keep the first failure only and tell everyone to stop.
    fn fail(&self, err: EngineError) {
        let mut failure = self.failure.lock().unwrap();
        if failure.is_none() {
            tracing::warn!(error = %err, "stopping run");
            *failure = Some(err);
        }
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Option<EngineError> {
        self.failure.lock().unwrap().take()
    }
}

/// Pulls rows from a source and runs one work unit per row.
pub struct TaskEngine<S> {
    source: S,
    config: EngineConfig,
    connector: Option<Arc<dyn Connector>>,
    reports: Arc<ReportAggregator>,
}

impl<S: RowSource> TaskEngine<S> {
    pub fn new(source: S, reports: Arc<ReportAggregator>) -> Self {
        Self {
            source,
            config: EngineConfig::default(),
            connector: None,
            reports,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Where work units and hooks get their own connections.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn limit_tasks(&mut self, max_tasks: usize) {
        self.config.max_tasks = Some(max_tasks);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn reports(&self) -> &Arc<ReportAggregator> {
        &self.reports
    }

    pub fn run<W, F>(&mut self, factory: F) -> Result<RunSummary, EngineError>
    where
        W: WorkUnit,
        F: FnMut() -> W,
    {
        self.run_with_hooks(&mut NoHooks, factory)
    }

    /// Dispatch every row (up to `max_tasks`) and close all reports.
    ///
    /// The first failure anywhere stops dispatch; rows already queued are
    /// dropped without running, reports are flushed but left unfinished,
    /// and that failure is returned.
    pub fn run_with_hooks<W, F, H>(&mut self, hooks: &mut H, mut factory: F) -> Result<RunSummary, EngineError>
    where
        W: WorkUnit,
        F: FnMut() -> W,
        H: RunHooks<S>,
    {
        let workers = self.config.worker_count();
        tracing::info!(workers, max_tasks = ?self.config.max_tasks, "run starting");

        let mut run_ctx = RunContext::new(self.connector.clone(), Arc::clone(&self.reports));
        if let Err(cause) = hooks.before_run(&mut run_ctx, &mut self.source) {
            return Err(self.abort(EngineError::Hook {
                stage: "before",
                cause,
            }));
        }
        run_ctx.release_connection();
        if let Err(err) = self.source.open() {
            return Err(self.abort(err));
        }

        let shared = RunShared {
            connector: self.connector.clone(),
            reports: Arc::clone(&self.reports),
            headers: self.source.headers().map(<[String]>::to_vec),
        };
        let state = RunState::default();
        let max_tasks = self.config.max_tasks;
        let capacity = self.config.queue_capacity();
        let source = &mut self.source;

        let (dispatched, limit_reached) = thread::scope(|scope| {
            let (job_tx, job_rx) = bounded::<Job<W>>(capacity);
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let shared = &shared;
                let state = &state;
                scope.spawn(move || worker_loop(job_rx, shared, state));
            }
            drop(job_rx);
            dispatch(source, max_tasks, &job_tx, &state, &mut factory)
        });

        let summary = RunSummary {
            dispatched,
            performed: state.performed.load(Ordering::SeqCst),
            outputs: state.outputs.load(Ordering::SeqCst),
            limit_reached,
        };
        if let Some(err) = state.take_failure() {
            return Err(self.abort(err));
        }

        run_ctx.set_dispatched(dispatched);
        if let Err(cause) = hooks.after_run(&mut run_ctx) {
            return Err(self.abort(EngineError::Hook {
                stage: "after",
                cause,
            }));
        }
        drop(run_ctx);

        self.source.close();
        self.reports.close_all()?;
        tracing::info!(
            dispatched = summary.dispatched,
            performed = summary.performed,
            outputs = summary.outputs,
            limit_reached = summary.limit_reached,
            "run finished"
        );
        Ok(summary)
    }

    fn abort(&mut self, err: EngineError) -> EngineError {
        tracing::error!(error = %err, "run aborted");
        if let Err(flush_err) = self.reports.flush_all() {
            tracing::warn!(error = %flush_err, "failed to flush reports after abort");
        }
        self.source.close();
        err
    }
}

/// Returns how many rows were dispatched and whether the limit stopped us.
fn dispatch<S, W, F>(
    source: &mut S,
    max_tasks: Option<usize>,
    jobs: &Sender<Job<W>>,
    state: &RunState,
    factory: &mut F,
) -> (usize, bool)
where
    S: RowSource,
    F: FnMut() -> W,
{
    let mut dispatched = 0;
    loop {
        if state.is_aborted() {
            return (dispatched, false);
        }
        if max_tasks.is_some_and(|limit| dispatched >= limit) {
            tracing::debug!(dispatched, "task limit reached");
            return (dispatched, true);
        }
        let row = match source.next_row() {
            Ok(Some(row)) => row,
            Ok(None) => return (dispatched, false),
            Err(err) => {
                state.fail(err);
                return (dispatched, false);
            }
        };
        dispatched += 1;
        tracing::trace!(row_index = dispatched, "dispatching row");
        let job = Job {
            index: dispatched,
            row,
            unit: factory(),
        };
        if jobs.send(job).is_err() {
            return (dispatched, false);
        }
    }
}

fn worker_loop<W: WorkUnit>(jobs: Receiver<Job<W>>, shared: &RunShared, state: &RunState) {
    while let Ok(job) = jobs.recv() {
        // Drain without running once the run is failing.
        if state.is_aborted() {
            continue;
        }
        let Job {
            index,
            row,
            mut unit,
        } = job;
        let mut ctx = TaskContext::new(row, index, shared);
        let result = panic::catch_unwind(AssertUnwindSafe(|| run_unit(&mut unit, &mut ctx, state)))
            .unwrap_or_else(|payload| Err(anyhow::anyhow!("work unit panicked: {}", panic_message(&*payload))));
        match result {
            Ok(()) => {
                state.performed.fetch_add(1, Ordering::SeqCst);
            }
            Err(cause) => state.fail(EngineError::TaskFailed {
                row_index: index,
                cause,
            }),
        }
    }
}

fn run_unit<W: WorkUnit>(unit: &mut W, ctx: &mut TaskContext<'_>, state: &RunState) -> anyhow::Result<()> {
    unit.perform(ctx)?;
    if ctx.output_enabled() {
        unit.output(ctx)?;
        state.outputs.fetch_add(1, Ordering::SeqCst);
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text
    } else {
        "non-string panic payload"
    }
}
