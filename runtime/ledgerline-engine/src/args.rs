//! Sequential access to a job's string arguments.

use crate::error::EngineError;
use crate::value::{Amount, Rate};
use chrono::NaiveDate;
use std::collections::VecDeque;

const DEFAULT_LIST_DELIMITER: &str = ",";

/// Hands out job arguments one at a time, converting each to the type the
/// caller asks for. The `optional` variants return `None` once the
/// arguments run out; the others fail.
#[derive(Debug, Clone)]
pub struct ArgumentIterator {
    args: VecDeque<String>,
    list_delimiter: String,
}

impl ArgumentIterator {
    pub fn new<I>(args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            list_delimiter: DEFAULT_LIST_DELIMITER.to_string(),
        }
    }

    pub fn set_list_delimiter(&mut self, delimiter: impl Into<String>) {
        self.list_delimiter = delimiter.into();
    }

    pub fn remaining(&self) -> usize {
        self.args.len()
    }

    pub fn next_date(&mut self) -> Result<NaiveDate, EngineError> {
        self.required("date", parse_date)
    }

    pub fn next_optional_date(&mut self) -> Result<Option<NaiveDate>, EngineError> {
        self.optional("date", parse_date)
    }

    pub fn next_rate(&mut self) -> Result<Rate, EngineError> {
        self.required("rate", |text| text.parse().ok())
    }

    pub fn next_optional_rate(&mut self) -> Result<Option<Rate>, EngineError> {
        self.optional("rate", |text| text.parse().ok())
    }

    pub fn next_int(&mut self) -> Result<i64, EngineError> {
        self.required("integer", |text| text.parse().ok())
    }

    pub fn next_optional_int(&mut self) -> Result<Option<i64>, EngineError> {
        self.optional("integer", |text| text.parse().ok())
    }

    pub fn next_amount(&mut self) -> Result<Amount, EngineError> {
        self.required("amount", |text| text.parse().ok())
    }

    pub fn next_optional_amount(&mut self) -> Result<Option<Amount>, EngineError> {
        self.optional("amount", |text| text.parse().ok())
    }

    /// The next argument verbatim. A blank argument is rejected.
    pub fn next_string(&mut self) -> Result<String, EngineError> {
        self.next_token("string")
    }

    /// The next argument, or `None` when it is blank or there is none.
    pub fn next_optional_string(&mut self) -> Option<String> {
        self.args.pop_front().filter(|text| !is_blank(text))
    }

    /// The next argument split on the list delimiter. Whitespace after a
    /// delimiter is dropped, as are trailing empty items.
    pub fn next_string_list(&mut self) -> Result<Vec<String>, EngineError> {
        let text = self.next_token("list")?;
        let mut items: Vec<String> = text
            .split(self.list_delimiter.as_str())
            .enumerate()
            .map(|(idx, item)| if idx == 0 { item } else { item.trim_start() })
            .map(str::to_string)
            .collect();
        while items.last().is_some_and(String::is_empty) {
            items.pop();
        }
        Ok(items)
    }

    /// Every argument not consumed yet.
    pub fn remaining_arguments(&mut self) -> Vec<String> {
        self.args.drain(..).collect()
    }

    fn next_token(&mut self, expected: &'static str) -> Result<String, EngineError> {
        let text = self
            .args
            .pop_front()
            .ok_or(EngineError::InsufficientArguments { expected })?;
        if is_blank(&text) {
            return Err(EngineError::BlankArgument { expected });
        }
        Ok(text)
    }

    fn required<T>(&mut self, expected: &'static str, parse: impl Fn(&str) -> Option<T>) -> Result<T, EngineError> {
        let text = self.next_token(expected)?;
        parse(text.trim()).ok_or(EngineError::InvalidArgumentFormat { expected, value: text })
    }

    fn optional<T>(
        &mut self,
        expected: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<T>, EngineError> {
        let Some(text) = self.args.pop_front() else {
            return Ok(None);
        };
        if is_blank(&text) {
            return Ok(None);
        }
        match parse(text.trim()) {
            Some(value) => Ok(Some(value)),
            None => Err(EngineError::InvalidArgumentFormat { expected, value: text }),
        }
    }
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, crate::cell::DATE_FORMAT).ok()
}
