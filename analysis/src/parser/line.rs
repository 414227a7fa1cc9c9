//! Line-pattern parsing for `path:line:col: CODE message` style output.
//!
//! A [`LineDialect`] lists the regex patterns a tool's lines may take and
//! which capture group feeds which record field. Each line is matched
//! against the first pattern that fits; lines matching nothing are chatter
//! and are skipped. A matched line whose numeric fields fail to parse is
//! dropped on its own and counted, never failing the rest of the stream.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

use pyreview_core::IssueRecord;

use super::normalize::normalize_output;
use super::{Parsed, Target, number_value};

/// Record field fed by one capture group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Path,
    Line,
    Column,
    Code,
    Kind,
    Message,
    /// Stored under this key in `extra`.
    Extra(&'static str),
}

/// How a dialect counts columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnBase {
    One,
    Zero,
}

#[derive(Debug)]
struct LinePattern {
    regex: Regex,
    fields: &'static [Field],
    kind: Option<&'static str>,
}

#[derive(Debug)]
enum SummaryCapture {
    /// Capture group N is stored under key N-1; numbers are coerced.
    Keys(&'static [&'static str]),
    /// Capture group 1 is a `N word, N word` tally stored per word, plus
    /// the raw text under `session`.
    Counts,
}

#[derive(Debug)]
struct SummaryRule {
    regex: Regex,
    capture: SummaryCapture,
}

enum LineMatch {
    Record(IssueRecord),
    Foreign,
    Partial(String),
}

/// One tool's line-oriented output dialect.
#[derive(Debug)]
pub struct LineDialect {
    name: &'static str,
    patterns: Vec<LinePattern>,
    summary: Vec<SummaryRule>,
    column_base: ColumnBase,
}

impl LineDialect {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            patterns: Vec::new(),
            summary: Vec::new(),
            column_base: ColumnBase::One,
        }
    }

    fn pattern(self, regex: &str, fields: &'static [Field]) -> Self {
        self.push_pattern(regex, fields, None)
    }

    fn pattern_with_kind(self, regex: &str, fields: &'static [Field], kind: &'static str) -> Self {
        self.push_pattern(regex, fields, Some(kind))
    }

    fn push_pattern(
        mut self,
        regex: &str,
        fields: &'static [Field],
        kind: Option<&'static str>,
    ) -> Self {
        self.patterns.push(LinePattern {
            regex: Regex::new(regex).expect("static regex must compile"),
            fields,
            kind,
        });
        self
    }

    fn summary_keys(mut self, regex: &str, keys: &'static [&'static str]) -> Self {
        self.summary.push(SummaryRule {
            regex: Regex::new(regex).expect("static regex must compile"),
            capture: SummaryCapture::Keys(keys),
        });
        self
    }

    fn summary_counts(mut self, regex: &str) -> Self {
        self.summary.push(SummaryRule {
            regex: Regex::new(regex).expect("static regex must compile"),
            capture: SummaryCapture::Counts,
        });
        self
    }

    fn zero_based_columns(mut self) -> Self {
        self.column_base = ColumnBase::Zero;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Parses `raw` into records attributed to `target`.
    pub fn parse(&self, raw: &str, target: Target<'_>) -> Parsed {
        let mut parsed = Parsed::default();

        for line in normalize_output(raw).lines() {
            let text = line.trim_end();
            if text.trim().is_empty() {
                continue;
            }

            let matched = self
                .patterns
                .iter()
                .find_map(|pattern| pattern.regex.captures(text).map(|caps| (pattern, caps)));

            if let Some((pattern, caps)) = matched {
                match self.record(pattern, &caps, text, target) {
                    LineMatch::Record(issue) => parsed.issues.push(issue),
                    LineMatch::Foreign => parsed.foreign_records += 1,
                    LineMatch::Partial(reason) => {
                        debug!(
                            dialect = self.name,
                            line = text,
                            reason = %reason,
                            "Dropped partial line"
                        );
                        parsed.dropped_lines += 1;
                    }
                }
                continue;
            }

            if let Some((rule, caps)) = self
                .summary
                .iter()
                .find_map(|rule| rule.regex.captures(text).map(|caps| (rule, caps)))
            {
                capture_summary(rule, &caps, &mut parsed.summary);
            }
        }

        parsed
    }

    fn record(
        &self,
        pattern: &LinePattern,
        caps: &Captures<'_>,
        text: &str,
        target: Target<'_>,
    ) -> LineMatch {
        let mut reported_path = None;
        let mut line = None;
        let mut column = None;
        let mut code = None;
        let mut kind = pattern.kind.map(str::to_string);
        let mut message = None;
        let mut extra = Map::new();

        for (index, field) in pattern.fields.iter().enumerate() {
            let Some(capture) = caps.get(index + 1) else {
                continue;
            };
            let value = capture.as_str().trim();
            match field {
                Field::Path => reported_path = Some(value),
                Field::Line => match value.parse::<u32>() {
                    Ok(parsed) => line = Some(parsed),
                    Err(_) => return LineMatch::Partial(format!("line '{value}' is not a number")),
                },
                Field::Column => match value.parse::<u32>() {
                    Ok(parsed) => {
                        column = match self.column_base {
                            ColumnBase::One => Some(parsed),
                            ColumnBase::Zero => parsed.checked_add(1),
                        }
                    }
                    Err(_) => {
                        return LineMatch::Partial(format!("column '{value}' is not a number"));
                    }
                },
                Field::Code if !value.is_empty() => code = Some(value.to_string()),
                Field::Kind if !value.is_empty() => kind = Some(value.to_string()),
                Field::Message => message = Some(value),
                Field::Extra(key) if !value.is_empty() => {
                    extra.insert((*key).to_string(), Value::String(value.to_string()));
                }
                _ => {}
            }
        }

        if let Some(reported) = reported_path {
            if !target.owns(reported) {
                return LineMatch::Foreign;
            }
        }

        let mut issue = IssueRecord::new(target.canonical, message.unwrap_or(text))
            .with_position(line, column);
        issue.code = code;
        issue.kind = kind;
        issue.extra = extra;
        LineMatch::Record(issue)
    }
}

fn capture_summary(rule: &SummaryRule, caps: &Captures<'_>, summary: &mut Map<String, Value>) {
    match &rule.capture {
        SummaryCapture::Keys(keys) => {
            for (index, key) in keys.iter().enumerate() {
                if let Some(capture) = caps.get(index + 1) {
                    let text = capture.as_str().trim();
                    let value =
                        number_value(text).unwrap_or_else(|| Value::String(text.to_string()));
                    summary.insert((*key).to_string(), value);
                }
            }
        }
        SummaryCapture::Counts => {
            let Some(tally) = caps.get(1) else {
                return;
            };
            let tally = tally.as_str().trim();
            summary.insert("session".to_string(), Value::String(tally.to_string()));
            for part in tally.split(',') {
                let mut words = part.split_whitespace();
                if let (Some(count), Some(word), None) = (words.next(), words.next(), words.next())
                {
                    if let Ok(count) = count.parse::<u64>() {
                        summary.insert(word.to_string(), Value::from(count));
                    }
                }
            }
        }
    }
}

use Field::{Code, Column, Extra, Kind, Line, Message, Path};

/// `pylint` default text output; columns are 0-based.
pub static PYLINT: LazyLock<LineDialect> = LazyLock::new(|| {
    LineDialect::new("pylint")
        .pattern(
            r"^(.*?):(\d+):(\d+):\s+([A-Z]\d{4}):\s+(.*?)\s+\(([a-z0-9-]+)\)$",
            &[Path, Line, Column, Code, Message, Extra("symbol")],
        )
        .summary_keys(r"Your code has been rated at (-?[\d.]+)/10", &["rating"])
        .zero_based_columns()
});

pub static FLAKE8: LazyLock<LineDialect> = LazyLock::new(|| {
    LineDialect::new("flake8").pattern(
        r"^(.*?):(\d+):(\d+):\s+([A-Z]{1,3}\d{2,4})\s+(.*)$",
        &[Path, Line, Column, Code, Message],
    )
});

/// `mypy` output: column and bracketed error code are optional.
pub static MYPY: LazyLock<LineDialect> = LazyLock::new(|| {
    LineDialect::new("mypy")
        .pattern(
            r"^(.*?):(\d+):(?:(\d+):)?\s+(error|warning|note):\s+(.*?)(?:\s{2}\[([a-z0-9-]+)\])?$",
            &[Path, Line, Column, Kind, Message, Code],
        )
        .summary_keys(r"^Found (\d+) errors? in (\d+) files?", &["errors", "files"])
        .summary_keys(r"^Success: no issues found in (\d+) source files?", &["checked"])
});

pub static CODESPELL: LazyLock<LineDialect> = LazyLock::new(|| {
    LineDialect::new("codespell").pattern(
        r"^(.*?):(\d+):\s*((\S+)\s*==>\s*(.*))$",
        &[Path, Line, Message, Extra("word"), Extra("suggestion")],
    )
});

pub static PEP8_NAMING: LazyLock<LineDialect> = LazyLock::new(|| {
    LineDialect::new("pep8-naming").pattern_with_kind(
        r"^(.*?):(\d+):(\d+):\s+(N\d{3})\s+(.*)$",
        &[Path, Line, Column, Code, Message],
        "N-series naming",
    )
});

pub static DARGLINT: LazyLock<LineDialect> = LazyLock::new(|| {
    LineDialect::new("darglint").pattern(
        r"^(.*?):(\S+):(\d+):\s*(DAR\d+):?\s*(.*)$",
        &[Path, Extra("object"), Line, Code, Message],
    )
});

/// `pytest -rA` short test summary plus the final session line.
pub static PYTEST: LazyLock<LineDialect> = LazyLock::new(|| {
    LineDialect::new("pytest")
        .pattern_with_kind(
            r"^SKIPPED\s+\[\d+\]\s+(.+?):(\d+):\s*(.*)$",
            &[Path, Line, Message],
            "SKIPPED",
        )
        .pattern(
            r"^(PASSED|FAILED|ERROR|XFAIL|XPASS)\s+(.+?)::(.+?)(?:\s+-\s+(.*))?$",
            &[Kind, Path, Extra("test"), Message],
        )
        .summary_counts(r"^=+\s+(.*?)\s+in\s+[\d.]+s(?:\s+\([^)]*\))?\s+=+$")
});

/// `pytest -v` per-test progress lines.
pub static PYTEST_VERBOSE: LazyLock<LineDialect> = LazyLock::new(|| {
    LineDialect::new("pytest-verbose")
        .pattern(
            r"^(.+?)::(\S+)\s+(PASSED|FAILED|ERROR|SKIPPED|XFAIL|XPASS)(?:\s+\[\s*\d+%\])?$",
            &[Path, Message, Kind],
        )
        .summary_counts(r"^=+\s+(.*?)\s+in\s+[\d.]+s(?:\s+\([^)]*\))?\s+=+$")
});
