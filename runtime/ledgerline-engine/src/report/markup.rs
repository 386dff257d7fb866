//! Structured change-report grammar: sequence > transaction > step >
//! record > field, rendered as indented XML.

use crate::report::PostingMode;
use crate::value::Serial;
use chrono::NaiveDate;

/// Record operation, written as `<operation option="U"/>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn option(self) -> &'static str {
        match self {
            Operation::Insert => "I",
            Operation::Update => "U",
            Operation::Delete => "D",
        }
    }
}

/// Old and new contents of one column. `None` is an explicit null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub column: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl FieldChange {
    pub fn new(column: impl Into<String>, old: Option<String>, new: Option<String>) -> Self {
        Self {
            column: column.into(),
            old,
            new,
        }
    }

    pub fn is_change(&self) -> bool {
        self.old != self.new
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub operation: Operation,
    pub table: String,
    pub target_serial: Option<Serial>,
    pub fields: Vec<FieldChange>,
}

impl Record {
    pub fn new(operation: Operation, table: impl Into<String>, target_serial: Option<Serial>) -> Self {
        Self {
            operation,
            table: table.into(),
            target_serial,
            fields: Vec::new(),
        }
    }

    pub fn update(table: impl Into<String>, target: Serial) -> Self {
        Self::new(Operation::Update, table, Some(target))
    }

    pub fn insert(table: impl Into<String>) -> Self {
        Self::new(Operation::Insert, table, None)
    }

    pub fn delete(table: impl Into<String>, target: Serial) -> Self {
        Self::new(Operation::Delete, table, Some(target))
    }

    pub fn field(mut self, column: impl Into<String>, old: Option<String>, new: Option<String>) -> Self {
        self.fields.push(FieldChange::new(column, old, new));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    pub records: Vec<Record>,
}

impl Step {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    /// Prefix the host prepends to exception descriptions, usually the
    /// account number.
    pub exception_prefix: Option<String>,
    pub steps: Vec<Step>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exception_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.exception_prefix = Some(prefix.into());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequence {
    pub transactions: Vec<Transaction>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(transaction: Transaction) -> Self {
        Self {
            transactions: vec![transaction],
        }
    }

    pub fn transaction(mut self, transaction: Transaction) -> Self {
        self.transactions.push(transaction);
        self
    }
}

pub(crate) const ROOT: &str = "batchQuery";

pub(crate) fn document_start(posting_date: NaiveDate, mode: PostingMode) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<{ROOT} postingDate=\"{}\" postingMode=\"{}\">\n",
        posting_date.format("%Y-%m-%d"),
        mode.as_str()
    )
}

pub(crate) fn document_end() -> String {
    format!("</{ROOT}>\n")
}

/// Render one sequence one level below the document root.
pub(crate) fn render_sequence(sequence: &Sequence) -> String {
    let mut out = MarkupBuffer::new(1);
    out.open("sequence");
    for transaction in &sequence.transactions {
        out.open("transaction");
        if let Some(prefix) = &transaction.exception_prefix {
            out.leaf("exceptionDescriptionPrefix", Some(prefix.as_str()));
        }
        for step in &transaction.steps {
            out.open("step");
            for record in &step.records {
                render_record(&mut out, record);
            }
            out.close("step");
        }
        out.close("transaction");
    }
    out.close("sequence");
    out.finish()
}

fn render_record(out: &mut MarkupBuffer, record: &Record) {
    out.open("record");
    out.empty_with_option("operation", record.operation.option());
    out.leaf("tableName", Some(record.table.as_str()));
    if let Some(serial) = record.target_serial {
        out.leaf("targetSerial", Some(serial.to_string().as_str()));
    }
    for field in &record.fields {
        out.open("field");
        out.leaf("columnName", Some(field.column.as_str()));
        out.leaf("oldContents", field.old.as_deref());
        out.leaf("newContents", field.new.as_deref());
        out.close("field");
    }
    out.close("record");
}

struct MarkupBuffer {
    text: String,
    depth: usize,
}

impl MarkupBuffer {
    fn new(depth: usize) -> Self {
        Self {
            text: String::new(),
            depth,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.text.push_str("  ");
        }
    }

    fn open(&mut self, name: &str) {
        self.indent();
        self.text.push_str(&format!("<{name}>\n"));
        self.depth += 1;
    }

    fn close(&mut self, name: &str) {
        self.depth -= 1;
        self.indent();
        self.text.push_str(&format!("</{name}>\n"));
    }

    fn leaf(&mut self, name: &str, value: Option<&str>) {
        self.indent();
        match value {
            Some(value) => self
                .text
                .push_str(&format!("<{name}>{}</{name}>\n", escape_xml(value))),
            None => self.text.push_str(&format!("<{name} null=\"true\"/>\n")),
        }
    }

    fn empty_with_option(&mut self, name: &str, option: &str) {
        self.indent();
        self.text
            .push_str(&format!("<{name} option=\"{}\"/>\n", escape_xml(option)));
    }

    fn finish(self) -> String {
        self.text
    }
}

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn update_record_renders_nested_elements() {
        let sequence = Sequence::single(
            Transaction::new().exception_prefix("0000123456").step(
                Step::new().record(
                    Record::update("SHARE", Serial::new(42))
                        .field("COURTESY_PAY_LIMIT", Some("0.00".into()), Some("500.00".into()))
                        .field("COURTESY_PAY_RESTRICT_SERIAL", Some("7".into()), None),
                ),
            ),
        );
        let expected = "  <sequence>
    <transaction>
      <exceptionDescriptionPrefix>0000123456</exceptionDescriptionPrefix>
      <step>
        <record>
          <operation option=\"U\"/>
          <tableName>SHARE</tableName>
          <targetSerial>42</targetSerial>
          <field>
            <columnName>COURTESY_PAY_LIMIT</columnName>
            <oldContents>0.00</oldContents>
            <newContents>500.00</newContents>
          </field>
          <field>
            <columnName>COURTESY_PAY_RESTRICT_SERIAL</columnName>
            <oldContents>7</oldContents>
            <newContents null=\"true\"/>
          </field>
        </record>
      </step>
    </transaction>
  </sequence>
";
        assert_eq!(render_sequence(&sequence), expected);
    }

    #[test]
    fn text_content_is_escaped() {
        let sequence = Sequence::single(Transaction::new().exception_prefix("A&B <x>"));
        assert!(render_sequence(&sequence).contains("A&amp;B &lt;x&gt;"));
    }

    #[test]
    fn document_root_carries_posting_mode() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        assert!(
            document_start(date, PostingMode::Verify)
                .ends_with("<batchQuery postingDate=\"2024-05-31\" postingMode=\"verify\">\n")
        );
        assert_eq!(document_end(), "</batchQuery>\n");
    }

    #[test]
    fn unchanged_field_is_detected() {
        assert!(!FieldChange::new("X", Some("1".into()), Some("1".into())).is_change());
        assert!(FieldChange::new("X", None, Some("1".into())).is_change());
    }
}
