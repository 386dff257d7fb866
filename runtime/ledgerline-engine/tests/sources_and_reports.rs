use chrono::NaiveDate;
use ledgerline_db::{SqliteConn, SqliteConnector, SqliteOpenMode};
use ledgerline_engine::delimited::split_line;
use ledgerline_engine::{
    Amount, BindValue, CellKind, DbRowSource, Delimiter, DirectoryHost, EngineConfig, EngineError, FileRowSource, MemoryHost,
    PositionalRow, PostingMode, ReportAggregator, ReportKind, RowSource, TaskContext, TaskEngine, TypedCell, WorkUnit,
};
use proptest::prelude::*;
use std::io::Write;
use std::sync::Arc;

fn drain(source: &mut impl RowSource) -> usize {
    let mut count = 0;
    while source.next_row().unwrap().is_some() {
        count += 1;
    }
    count
}

#[test]
fn file_source_counts_non_blank_lines_minus_header() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "ACCOUNT|NAME\n0001|\"Ann\"\n\n0002|Bob\n   \n0003|Cy").unwrap();
    let mut source = FileRowSource::new(file.path(), Delimiter::Pipe, true);
    assert_eq!(drain(&mut source), 3);
    assert_eq!(source.headers().unwrap(), ["ACCOUNT", "NAME"]);
    assert!(source.is_exhausted());
}

#[test]
fn database_source_counts_result_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("core.db");
    let conn = SqliteConn::open(&path, SqliteOpenMode::ReadWrite).unwrap();
    conn.execute_batch(
        "CREATE TABLE SHARE (ID INTEGER, OPENED DATE);
         INSERT INTO SHARE VALUES (1, '2020-01-02');
         INSERT INTO SHARE VALUES (2, '2021-03-04');
         INSERT INTO SHARE VALUES (3, NULL);
         INSERT INTO SHARE VALUES (4, '2023-07-08');",
    )
    .unwrap();
    let mut source = DbRowSource::new(Arc::new(SqliteConnector::read_only(path)), "SELECT ID, OPENED FROM SHARE");
    assert_eq!(drain(&mut source), 4);
    assert_eq!(source.produced(), 4);
}

#[test]
fn quoted_delimiters_survive_tokenising() {
    assert_eq!(split_line("a,\"b,c\",d", Delimiter::Comma), ["a", "b,c", "d"]);
}

#[test]
fn reads_are_idempotent_and_kinds_are_enforced() {
    let mut row = PositionalRow::new();
    row.push(TypedCell::of(Some(&Amount::from_cents(1234))));
    row.push(TypedCell::of(Some(&NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())));

    for _ in 0..3 {
        assert_eq!(row.require::<Amount>(1).unwrap(), Amount::from_cents(1234));
        assert!(matches!(
            row.get::<NaiveDate>(1),
            Err(EngineError::TypeMismatch {
                position: 1,
                expected: CellKind::Date,
                actual: CellKind::Amount,
            })
        ));
    }
    assert_eq!(row.require::<NaiveDate>(2).unwrap().to_string(), "2024-02-29");
}

#[test]
fn report_titles_are_unique_and_close_all_is_final() {
    let host = MemoryHost::new();
    let date = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
    let reports = ReportAggregator::new(Arc::new(host), date);
    let text = reports.open("Audit", ReportKind::Text, PostingMode::Verify).unwrap();
    let markup = reports.open("Changes", ReportKind::Markup, PostingMode::Post).unwrap();
    assert!(matches!(
        reports.open("Audit", ReportKind::Text, PostingMode::Verify),
        Err(EngineError::DuplicateReport { .. })
    ));

    reports.close_all().unwrap();
    assert!(text.is_closed() && markup.is_closed());
    assert!(matches!(text.write_line("late"), Err(EngineError::ReportClosed { .. })));
    assert!(matches!(
        markup.put_sequence(&Default::default()),
        Err(EngineError::ReportClosed { .. })
    ));
}

#[test]
fn titles_that_share_a_file_name_cannot_both_be_opened() {
    let dir = tempfile::tempdir().unwrap();
    let reports = ReportAggregator::new(
        Arc::new(DirectoryHost::new(dir.path())),
        NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
    );
    reports.write_line("Courtesy Pay", "from-space").unwrap();
    let err = reports.write_line("Courtesy_Pay", "from-underscore").unwrap_err();
    assert!(matches!(err, EngineError::ReportIo { ref title, .. } if title == "Courtesy_Pay"));
    reports.close_all().unwrap();
    assert_eq!(reports.titles(), vec!["Courtesy Pay".to_string()]);
    let written = std::fs::read_to_string(dir.path().join("Courtesy_Pay.txt")).unwrap();
    assert_eq!(written, "from-space\n");
}

#[test]
fn raw_byte_parameters_are_rejected_before_the_query_runs() {
    let connector = Arc::new(|| -> Result<SqliteConn, ledgerline_db::DbError> {
        panic!("the query must not be attempted")
    });
    let mut source = DbRowSource::new(connector, "SELECT * FROM SHARE WHERE ID = ?");
    let bytes: Vec<u8> = vec![0xde, 0xad];
    assert!(matches!(
        source.bind_any(&bytes),
        Err(EngineError::ParameterBinding { position: 1, .. })
    ));
    assert!(matches!(
        BindValue::from_any(2, &bytes),
        Err(EngineError::ParameterBinding { position: 2, .. })
    ));
}

struct Nothing;

impl WorkUnit for Nothing {
    fn perform(&mut self, _ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn output(&mut self, _ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn limit_dispatches_min_of_limit_and_rows(rows in 0usize..40, limit in 0usize..50, workers in 1usize..5) {
        let text: String = (0..rows).map(|n| format!("{n},x\n")).collect();
        let source = FileRowSource::from_text(text, Delimiter::Comma, false);
        let reports = Arc::new(ReportAggregator::new(
            Arc::new(MemoryHost::new()),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        ));
        let mut engine = TaskEngine::new(source, reports)
            .with_config(EngineConfig::default().with_workers(workers).with_max_tasks(limit));
        let summary = engine.run(|| Nothing).unwrap();
        prop_assert_eq!(summary.dispatched, rows.min(limit));
        prop_assert_eq!(summary.performed, rows.min(limit));
    }

    #[test]
    fn every_non_blank_line_becomes_a_row(lines in proptest::collection::vec("[a-z0-9 ]{0,8}", 0..30)) {
        let expected = lines.iter().filter(|line| !line.trim().is_empty()).count();
        let mut source = FileRowSource::from_text(lines.join("\n"), Delimiter::Tab, false);
        prop_assert_eq!(drain(&mut source), expected);
    }
}
