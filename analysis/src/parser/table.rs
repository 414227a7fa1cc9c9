//! Tabular-summary parsing for whitespace-aligned reports.

use serde_json::{Map, Value};

use super::number_value;

/// Column layout of one tool's table.
#[derive(Debug, Clone, Copy)]
pub struct TableLayout {
    /// Token the header row starts with.
    pub header_token: &'static str,
    /// Token that must appear later on the header row.
    pub trailing_token: &'static str,
    /// Field names, in column order. The last column takes the remainder
    /// of the row, spaces included.
    pub columns: &'static [&'static str],
    /// Index of the column that identifies the row.
    pub key_column: usize,
    /// Rows with fewer fields are skipped.
    pub min_fields: usize,
    /// First-column value of the aggregate trailer row.
    pub aggregate_marker: Option<&'static str>,
}

/// `coverage report -m`.
pub const COVERAGE: TableLayout = TableLayout {
    header_token: "Name",
    trailing_token: "Missing",
    columns: &["file", "statements", "missed", "coverage", "missing_lines"],
    key_column: 0,
    min_fields: 4,
    aggregate_marker: Some("TOTAL"),
};

/// `pstats` listing printed by `python -m cProfile`.
pub const CPROFILE: TableLayout = TableLayout {
    header_token: "ncalls",
    trailing_token: "filename:lineno(function)",
    columns: &[
        "ncalls",
        "total_time",
        "per_call_time",
        "cumulative_time",
        "cumulative_per_call",
        "location",
    ],
    key_column: 5,
    min_fields: 6,
    aggregate_marker: None,
};

/// One data row. `cells` holds every column except the key; a missing
/// trailing field is an empty string.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub key: String,
    pub cells: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub rows: Vec<TableRow>,
    /// The trailer row, keyed by the aggregate marker.
    pub aggregate: Option<TableRow>,
    /// Rows skipped for having too few fields.
    pub skipped_rows: usize,
}

/// Parses the first table matching `layout`. Returns `None` when no header
/// row is present.
///
/// # Examples
///
/// ```
/// use pyreview_analysis::parser::table::{COVERAGE, parse_table};
///
/// let report = "\
/// Name   Stmts  Miss  Cover  Missing
/// a.py   100   10   90%   45-50
/// TOTAL  100   10   90%
/// ";
/// let table = parse_table(report, &COVERAGE).unwrap();
/// assert_eq!(table.rows.len(), 1);
/// let total = table.aggregate.unwrap();
/// assert_eq!(total.key, "TOTAL");
/// assert_eq!(total.cells["statements"], 100);
/// assert_eq!(total.cells["coverage"], "90%");
/// ```
pub fn parse_table(raw: &str, layout: &TableLayout) -> Option<Table> {
    let mut lines = raw.lines();
    lines.by_ref().find(|line| is_header(line, layout))?;

    let mut table = Table::default();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if is_rule(trimmed) {
            continue;
        }

        let fields = split_bounded(trimmed, layout.columns.len());
        if fields.len() < layout.min_fields {
            table.skipped_rows += 1;
            continue;
        }

        let is_aggregate = layout
            .aggregate_marker
            .is_some_and(|marker| fields.first() == Some(&marker));
        let row = build_row(&fields, layout);
        if is_aggregate {
            table.aggregate = Some(row);
            break;
        }
        table.rows.push(row);
    }

    Some(table)
}

fn is_header(line: &str, layout: &TableLayout) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with(layout.header_token)
        && trimmed[layout.header_token.len()..].contains(layout.trailing_token)
}

fn is_rule(line: &str) -> bool {
    line.chars().all(|ch| ch == '-' || ch == '=')
}

/// Splits on whitespace runs into at most `max` fields; the last field
/// keeps the rest of the line.
fn split_bounded(line: &str, max: usize) -> Vec<&str> {
    let mut fields = Vec::with_capacity(max);
    let mut rest = line.trim();
    while !rest.is_empty() {
        if fields.len() + 1 == max {
            fields.push(rest);
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                fields.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }
    fields
}

fn build_row(fields: &[&str], layout: &TableLayout) -> TableRow {
    let mut key = String::new();
    let mut cells = Map::new();
    for (index, column) in layout.columns.iter().enumerate() {
        let text = fields.get(index).copied().unwrap_or("");
        if index == layout.key_column {
            key = text.to_string();
            continue;
        }
        let value = number_value(text).unwrap_or_else(|| Value::String(text.to_string()));
        cells.insert((*column).to_string(), value);
    }
    TableRow { key, cells }
}
