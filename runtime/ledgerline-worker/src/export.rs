//! The built-in row export job: every input row is written, as a
//! comma-separated line, to one text report.

use ledgerline_engine::delimited::format_fields;
use ledgerline_engine::{RowSource, RunContext, RunHooks, TaskContext, WorkUnit, format_row};

pub struct RowExport {
    title: String,
}

impl RowExport {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }
}

impl WorkUnit for RowExport {
    fn perform(&mut self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        if !ctx.row().is_empty() {
            ctx.enable_output();
        }
        Ok(())
    }

    fn output(&mut self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let line = format_row(&ctx.row().raw_values());
        ctx.reports().write_line(&self.title, &line)?;
        Ok(())
    }
}

/// Writes the header line first, when the source has one, and logs the
/// row count at the end.
pub struct ExportHooks {
    title: String,
}

impl ExportHooks {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }
}

impl<S: RowSource> RunHooks<S> for ExportHooks {
    fn before_run(&mut self, ctx: &mut RunContext, source: &mut S) -> anyhow::Result<()> {
        source.open()?;
        let report = ctx.reports().text(&self.title)?;
        if let Some(headers) = source.headers() {
            report.write_line(&format_fields(headers))?;
        }
        Ok(())
    }

    fn after_run(&mut self, ctx: &mut RunContext) -> anyhow::Result<()> {
        tracing::info!(title = %self.title, rows = ctx.dispatched(), "export written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgerline_engine::{Delimiter, EngineConfig, FileRowSource, MemoryHost, ReportAggregator, TaskEngine};
    use std::sync::Arc;

    #[test]
    fn exports_header_and_rows() {
        let host = MemoryHost::new();
        let reports = Arc::new(ReportAggregator::new(
            Arc::new(host.clone()),
            NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
        ));
        let source = FileRowSource::from_text(
            "ACCOUNT|NAME\n0001|Smith, Ann\n0002|\"Bob\"\n",
            Delimiter::Pipe,
            true,
        );
        let mut engine = TaskEngine::new(source, reports).with_config(EngineConfig::default().with_workers(1));
        let summary = engine
            .run_with_hooks(&mut ExportHooks::new("Out"), || RowExport::new("Out"))
            .unwrap();
        assert_eq!(summary.outputs, 2);
        assert_eq!(
            host.contents("Out").unwrap(),
            "ACCOUNT,NAME\n0001,\"Smith, Ann\"\n0002,Bob\n"
        );
    }

    #[test]
    fn empty_input_still_creates_the_report() {
        let host = MemoryHost::new();
        let reports = Arc::new(ReportAggregator::new(
            Arc::new(host.clone()),
            NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
        ));
        let source = FileRowSource::from_text("", Delimiter::Comma, false);
        let mut engine = TaskEngine::new(source, reports);
        engine
            .run_with_hooks(&mut ExportHooks::new("Out"), || RowExport::new("Out"))
            .unwrap();
        assert_eq!(host.contents("Out").as_deref(), Some(""));
    }
}
