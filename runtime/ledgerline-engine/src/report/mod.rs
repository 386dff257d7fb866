//! Report aggregation.
//!
//! Work units running on different threads append to shared, named
//! reports. The title map is locked only to look up or register a report;
//! each report serialises its own writes, so units writing to different
//! reports never contend.

mod host;
mod markup;

pub use host::{DirectoryHost, MemoryHost, ReportHost, sanitize_title};
pub use markup::{FieldChange, Operation, Record, Sequence, Step, Transaction};

use crate::error::EngineError;
use chrono::NaiveDate;
use markup::{document_end, document_start, render_sequence};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    /// Structured change document posted back to the core system.
    Markup,
    Text,
}

impl ReportKind {
    pub fn extension(self) -> &'static str {
        match self {
            ReportKind::Markup => "xml",
            ReportKind::Text => "txt",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportKind::Markup => "markup",
            ReportKind::Text => "text",
        })
    }
}

/// Whether the host applies a structured report or only checks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostingMode {
    Verify,
    #[default]
    Post,
}

impl PostingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PostingMode::Verify => "verify",
            PostingMode::Post => "post",
        }
    }
}

impl fmt::Display for PostingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Sink = BufWriter<Box<dyn Write + Send>>;

/// One named output stream.
pub struct Report {
    title: String,
    kind: ReportKind,
    mode: PostingMode,
    state: Mutex<ReportState>,
}

struct ReportState {
    sink: Option<Sink>,
    entries: usize,
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("title", &self.title)
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Report {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    pub fn mode(&self) -> PostingMode {
        self.mode
    }

    /// Lines or sequences written so far.
    pub fn entries(&self) -> usize {
        self.state.lock().unwrap().entries
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().sink.is_none()
    }

    /// Append one line to a text report.
    pub fn write_line(&self, line: &str) -> Result<(), EngineError> {
        self.expect_kind(ReportKind::Text)?;
        self.with_sink(|sink| {
            sink.write_all(line.as_bytes())?;
            sink.write_all(b"\n")
        })
    }

    /// Append one change sequence to a structured report.
    pub fn put_sequence(&self, sequence: &Sequence) -> Result<(), EngineError> {
        self.expect_kind(ReportKind::Markup)?;
        let rendered = render_sequence(sequence);
        self.with_sink(|sink| sink.write_all(rendered.as_bytes()))
    }

    pub fn flush(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        match state.sink.as_mut() {
            Some(sink) => sink.flush().map_err(|source| self.io_error(source)),
            None => Ok(()),
        }
    }

    /// Finalise the document and release the sink. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let Some(mut sink) = state.sink.take() else {
            return Ok(());
        };
        if self.kind == ReportKind::Markup {
            sink.write_all(document_end().as_bytes())
                .map_err(|source| self.io_error(source))?;
        }
        sink.flush().map_err(|source| self.io_error(source))?;
        tracing::debug!(title = %self.title, entries = state.entries, "report closed");
        Ok(())
    }

    fn expect_kind(&self, expected: ReportKind) -> Result<(), EngineError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(EngineError::ReportKindMismatch {
                title: self.title.clone(),
                expected,
                actual: self.kind,
            })
        }
    }

    fn with_sink(&self, write: impl FnOnce(&mut Sink) -> io::Result<()>) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        let Some(sink) = state.sink.as_mut() else {
            return Err(EngineError::ReportClosed {
                title: self.title.clone(),
            });
        };
        write(sink).map_err(|source| self.io_error(source))?;
        state.entries += 1;
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> EngineError {
        EngineError::ReportIo {
            title: self.title.clone(),
            source,
        }
    }
}

/// Registry of every report a run writes, keyed by title.
pub struct ReportAggregator {
    host: Arc<dyn ReportHost>,
    posting_date: NaiveDate,
    reports: Mutex<HashMap<String, Arc<Report>>>,
    finalized: AtomicBool,
}

impl ReportAggregator {
    pub fn new(host: Arc<dyn ReportHost>, posting_date: NaiveDate) -> Self {
        Self {
            host,
            posting_date,
            reports: Mutex::new(HashMap::new()),
            finalized: AtomicBool::new(false),
        }
    }

    pub fn posting_date(&self) -> NaiveDate {
        self.posting_date
    }

    /// Register a new report. A title can be opened once per run.
    pub fn open(&self, title: &str, kind: ReportKind, mode: PostingMode) -> Result<Arc<Report>, EngineError> {
        let mut reports = self.reports.lock().unwrap();
        if reports.contains_key(title) {
            return Err(EngineError::DuplicateReport {
                title: title.to_string(),
            });
        }
        self.register(&mut reports, title, kind, mode)
    }

    /// Existing report of `kind`, opened on first use. Structured reports
    /// open in post mode; text reports are always verify-only.
    pub fn report(&self, title: &str, kind: ReportKind) -> Result<Arc<Report>, EngineError> {
        let mut reports = self.reports.lock().unwrap();
        if let Some(report) = reports.get(title) {
            report.expect_kind(kind)?;
            return Ok(Arc::clone(report));
        }
        let mode = match kind {
            ReportKind::Markup => PostingMode::Post,
            ReportKind::Text => PostingMode::Verify,
        };
        self.register(&mut reports, title, kind, mode)
    }

    pub fn markup(&self, title: &str) -> Result<Arc<Report>, EngineError> {
        self.report(title, ReportKind::Markup)
    }

    pub fn text(&self, title: &str) -> Result<Arc<Report>, EngineError> {
        self.report(title, ReportKind::Text)
    }

    /// A report that must already exist.
    pub fn get(&self, title: &str) -> Result<Arc<Report>, EngineError> {
        self.reports
            .lock()
            .unwrap()
            .get(title)
            .cloned()
            .ok_or_else(|| EngineError::UnknownReport {
                title: title.to_string(),
            })
    }

    pub fn write_line(&self, title: &str, line: &str) -> Result<(), EngineError> {
        self.text(title)?.write_line(line)
    }

    pub fn put_sequence(&self, title: &str, sequence: &Sequence) -> Result<(), EngineError> {
        self.markup(title)?.put_sequence(sequence)
    }

    pub fn close(&self, title: &str) -> Result<(), EngineError> {
        self.get(title)?.close()
    }

    /// Close every report and refuse new ones. Every report is attempted;
    /// the first failure is returned.
    pub fn close_all(&self) -> Result<(), EngineError> {
        self.finalized.store(true, Ordering::SeqCst);
        let mut first_err = None;
        for report in self.snapshot() {
            if let Err(err) = report.close() {
                tracing::error!(title = %report.title(), error = %err, "failed to close report");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Push buffered output to the host without finalising any document.
    pub fn flush_all(&self) -> Result<(), EngineError> {
        let mut first_err = None;
        for report in self.snapshot() {
            if let Err(err) = report.flush() {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Registered titles, sorted.
    pub fn titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = self.reports.lock().unwrap().keys().cloned().collect();
        titles.sort();
        titles
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Vec<Arc<Report>> {
        self.reports.lock().unwrap().values().cloned().collect()
    }

    fn register(
        &self,
        reports: &mut HashMap<String, Arc<Report>>,
        title: &str,
        kind: ReportKind,
        mode: PostingMode,
    ) -> Result<Arc<Report>, EngineError> {
        if self.is_finalized() {
            return Err(EngineError::ReportClosed {
                title: title.to_string(),
            });
        }
        let io_error = |source| EngineError::ReportIo {
            title: title.to_string(),
            source,
        };
        let mut sink = BufWriter::new(self.host.open(title, kind, mode).map_err(io_error)?);
        if kind == ReportKind::Markup {
            sink.write_all(document_start(self.posting_date, mode).as_bytes())
                .map_err(io_error)?;
        }
        tracing::debug!(%title, %kind, %mode, "report opened");
        let report = Arc::new(Report {
            title: title.to_string(),
            kind,
            mode,
            state: Mutex::new(ReportState {
                sink: Some(sink),
                entries: 0,
            }),
        });
        reports.insert(title.to_string(), Arc::clone(&report));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    fn aggregator() -> (MemoryHost, ReportAggregator) {
        let host = MemoryHost::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        (host.clone(), ReportAggregator::new(Arc::new(host), date))
    }

    #[test]
    fn duplicate_title_is_rejected() {
        let (_host, reports) = aggregator();
        reports
            .open("Exceptions", ReportKind::Text, PostingMode::Verify)
            .unwrap();
        assert!(matches!(
            reports.open("Exceptions", ReportKind::Markup, PostingMode::Post),
            Err(EngineError::DuplicateReport { .. })
        ));
    }

    #[test]
    fn writes_after_close_all_fail() {
        let (_host, reports) = aggregator();
        let report = reports.text("T").unwrap();
        report.write_line("one").unwrap();
        reports.close_all().unwrap();
        assert!(report.is_closed());
        assert!(matches!(
            report.write_line("two"),
            Err(EngineError::ReportClosed { .. })
        ));
        assert!(matches!(
            reports.write_line("T", "three"),
            Err(EngineError::ReportClosed { .. })
        ));
        assert!(matches!(
            reports.write_line("Other", "x"),
            Err(EngineError::ReportClosed { .. })
        ));
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let (_host, reports) = aggregator();
        reports.text("T").unwrap();
        assert!(matches!(
            reports.markup("T"),
            Err(EngineError::ReportKindMismatch {
                expected: ReportKind::Markup,
                actual: ReportKind::Text,
                ..
            })
        ));
    }

    #[test]
    fn markup_report_is_wrapped_in_a_batch_query() {
        let (host, reports) = aggregator();
        reports
            .open("Changes", ReportKind::Markup, PostingMode::Verify)
            .unwrap();
        reports.put_sequence("Changes", &Sequence::new()).unwrap();
        reports.close("Changes").unwrap();
        let text = host.contents("Changes").unwrap();
        assert_eq!(
            text,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <batchQuery postingDate=\"2024-01-31\" postingMode=\"verify\">\n  \
             <sequence>\n  </sequence>\n</batchQuery>\n"
        );
    }

    #[test]
    fn flush_makes_text_visible_without_closing() {
        let (host, reports) = aggregator();
        reports.write_line("T", "a").unwrap();
        reports.flush_all().unwrap();
        assert_eq!(host.contents("T").as_deref(), Some("a\n"));
        assert!(!reports.get("T").unwrap().is_closed());
    }

    #[test]
    fn unknown_report_cannot_be_closed() {
        let (_host, reports) = aggregator();
        assert!(matches!(
            reports.close("nope"),
            Err(EngineError::UnknownReport { .. })
        ));
    }

    #[test]
    fn concurrent_writers_share_one_report() {
        let (host, reports) = aggregator();
        thread::scope(|scope| {
            for worker in 0..4 {
                let reports = &reports;
                scope.spawn(move || {
                    for n in 0..25 {
                        reports.write_line("T", &format!("{worker}-{n}")).unwrap();
                    }
                });
            }
        });
        assert_eq!(reports.get("T").unwrap().entries(), 100);
        reports.close_all().unwrap();
        assert_eq!(reports.titles(), vec!["T".to_string()]);
        assert_eq!(host.contents("T").unwrap().lines().count(), 100);
    }
}
