//! JSON-report parsing for tools whose documents vary in top-level layout.
//!
//! The layout is chosen per tool at registration time through a
//! [`JsonShape`]; the parser never guesses it from the document.

use serde_json::{Map, Value};
use tracing::debug;

use pyreview_core::{Failure, IssueRecord};

use super::{Parsed, Target};

/// Which object keys feed which record fields. Keys may be dotted
/// (`location.line`) to reach into nested objects.
#[derive(Debug, Clone, Copy)]
pub struct RecordKeys {
    pub line: Option<&'static str>,
    pub column: Option<&'static str>,
    pub zero_based_column: bool,
    pub code: Option<&'static str>,
    pub kind: Option<&'static str>,
    /// Candidate message keys; the first string value present wins.
    pub message: &'static [&'static str],
    /// Message used when none of the message keys is present.
    pub fallback_message: &'static str,
    /// Renames applied to keys copied into `extra`.
    pub renames: &'static [(&'static str, &'static str)],
}

impl RecordKeys {
    pub const EMPTY: Self = Self {
        line: None,
        column: None,
        zero_based_column: false,
        code: None,
        kind: None,
        message: &[],
        fallback_message: "",
        renames: &[],
    };
}

/// Supported top-level document layouts.
#[derive(Debug, Clone, Copy)]
pub enum JsonShape {
    /// Object mapping a path to either a metrics object or a list of block
    /// records. `container` locates the object inside the document;
    /// `records` locates the list inside the matched path's value.
    PathKeyed {
        container: Option<&'static str>,
        records: Option<&'static str>,
        keys: RecordKeys,
    },
    /// Object mapping a path to an object keyed by sub-tool name whose
    /// value carries an `error`/`message` pair.
    PathKeyedNested { tool: &'static str },
    /// List of self-describing records. `path` names the key holding each
    /// record's file; records without one belong to the target.
    FlatList {
        container: Option<&'static str>,
        path: Option<&'static str>,
        keys: RecordKeys,
    },
}

impl JsonShape {
    fn accepts(&self, document: &Value) -> bool {
        match self {
            Self::PathKeyed { container, .. } => {
                scope(document, *container).is_some_and(Value::is_object)
            }
            Self::PathKeyedNested { .. } => document.is_object(),
            Self::FlatList { container, .. } => {
                scope(document, *container).is_some_and(Value::is_array)
            }
        }
    }
}

/// Parses raw text as JSON. Syntax errors are fatal for the tool result.
pub fn parse_document(raw: &str) -> Result<Value, Failure> {
    if raw.trim().is_empty() {
        return Err(Failure::invalid_format("empty output where JSON was expected"));
    }
    serde_json::from_str(raw).map_err(|err| Failure::invalid_format(format!("invalid JSON: {err}")))
}

/// Parses and extracts in one step.
pub fn parse_json(raw: &str, shape: &JsonShape, target: Target<'_>) -> Result<Parsed, Failure> {
    let document = parse_document(raw)?;
    extract(&document, shape, target)
}

/// Extracts with the first shape whose top-level layout fits the document.
pub fn extract_any(
    document: &Value,
    shapes: &[JsonShape],
    target: Target<'_>,
) -> Result<Parsed, Failure> {
    let shape = shapes
        .iter()
        .find(|shape| shape.accepts(document))
        .ok_or_else(|| Failure::invalid_format("JSON document has an unexpected layout"))?;
    extract(document, shape, target)
}

/// Extracts records for `target` from an already parsed document.
pub fn extract(document: &Value, shape: &JsonShape, target: Target<'_>) -> Result<Parsed, Failure> {
    match shape {
        JsonShape::PathKeyed {
            container,
            records,
            keys,
        } => extract_path_keyed(document, *container, *records, keys, target),
        JsonShape::PathKeyedNested { tool } => extract_nested(document, tool, target),
        JsonShape::FlatList {
            container,
            path,
            keys,
        } => extract_flat_list(document, *container, *path, keys, target),
    }
}

fn extract_path_keyed(
    document: &Value,
    container: Option<&str>,
    records: Option<&str>,
    keys: &RecordKeys,
    target: Target<'_>,
) -> Result<Parsed, Failure> {
    let object = scope(document, container)
        .and_then(Value::as_object)
        .ok_or_else(|| Failure::invalid_format("expected an object keyed by path"))?;
    let (key, entry) = matching_entry(object, target)?;

    let mut parsed = Parsed {
        foreign_records: object.len() - 1,
        ..Parsed::default()
    };

    let body = match records {
        Some(path) => lookup(entry, path).unwrap_or(&Value::Null),
        None => entry,
    };

    match body {
        Value::Array(items) => {
            for item in items {
                match item.as_object() {
                    Some(map) => match record_from_object(map, keys, target.canonical) {
                        Ok(issue) => parsed.issues.push(issue),
                        Err(reason) => drop_record(&mut parsed, &reason),
                    },
                    None => drop_record(&mut parsed, "block is not an object"),
                }
            }
        }
        Value::Object(map) if map.contains_key("error") => {
            parsed.issues.push(error_record(map, target.canonical));
        }
        Value::Object(map) => match record_from_object(map, keys, target.canonical) {
            Ok(issue) => parsed.issues.push(issue),
            Err(reason) => drop_record(&mut parsed, &reason),
        },
        Value::Null if records.is_some() => {}
        other => {
            return Err(Failure::invalid_format(format!(
                "unexpected {} for path '{key}'",
                type_name(other)
            )));
        }
    }

    Ok(parsed)
}

fn extract_nested(document: &Value, tool: &str, target: Target<'_>) -> Result<Parsed, Failure> {
    let object = document
        .as_object()
        .ok_or_else(|| Failure::invalid_format("expected an object keyed by path"))?;
    let (key, entry) = matching_entry(object, target)?;

    let mut parsed = Parsed {
        foreign_records: object.len() - 1,
        ..Parsed::default()
    };

    let tools = entry
        .as_object()
        .ok_or_else(|| {
            Failure::invalid_format(format!("expected an object of tools for '{key}'"))
        })?;

    match tools.get(tool) {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => parsed.issues.push(error_record(map, target.canonical)),
        Some(Value::Array(items)) => {
            for item in items {
                match item.as_object() {
                    Some(map) => parsed.issues.push(error_record(map, target.canonical)),
                    None => drop_record(&mut parsed, "tool entry is not an object"),
                }
            }
        }
        Some(other) => {
            return Err(Failure::invalid_format(format!(
                "unexpected {} for tool '{tool}'",
                type_name(other)
            )));
        }
    }

    Ok(parsed)
}

fn extract_flat_list(
    document: &Value,
    container: Option<&str>,
    path: Option<&str>,
    keys: &RecordKeys,
    target: Target<'_>,
) -> Result<Parsed, Failure> {
    let items = scope(document, container)
        .and_then(Value::as_array)
        .ok_or_else(|| match container {
            Some(name) => {
                Failure::invalid_format(format!("expected a list of records at '{name}'"))
            }
            None => Failure::invalid_format("expected a list of records"),
        })?;

    let mut parsed = Parsed::default();
    for item in items {
        let Some(map) = item.as_object() else {
            drop_record(&mut parsed, "record is not an object");
            continue;
        };

        if let Some(path_key) = path {
            match lookup_in(map, path_key).and_then(Value::as_str) {
                Some(reported) if target.owns(reported) => {}
                Some(_) => {
                    parsed.foreign_records += 1;
                    continue;
                }
                None => {
                    drop_record(&mut parsed, "record has no path");
                    continue;
                }
            }
        }

        match record_from_object(map, keys, target.canonical) {
            Ok(mut issue) => {
                if let Some(path_key) = path {
                    remove_leaf(&mut issue.extra, path_key);
                }
                parsed.issues.push(issue);
            }
            Err(reason) => drop_record(&mut parsed, &reason),
        }
    }

    Ok(parsed)
}

/// Finds the entry whose key reconciles with the target, or reports every
/// key that was compared.
fn matching_entry<'v>(
    object: &'v Map<String, Value>,
    target: Target<'_>,
) -> Result<(&'v str, &'v Value), Failure> {
    let found = target
        .reconciler
        .find_match(target.canonical, object.keys().map(String::as_str));

    match found.and_then(|key| object.get_key_value(key)) {
        Some((key, value)) => Ok((key.as_str(), value)),
        None => {
            let searched = target
                .reconciler
                .normalize(target.canonical)
                .unwrap_or_else(|| target.canonical.to_string());
            let candidates = object.keys().map(|key| {
                target
                    .reconciler
                    .normalize(key)
                    .unwrap_or_else(|| key.clone())
            });
            Err(Failure::path_not_found(&searched, candidates))
        }
    }
}

fn record_from_object(
    map: &Map<String, Value>,
    keys: &RecordKeys,
    canonical: &str,
) -> Result<IssueRecord, String> {
    let line = position(map, keys.line, false)?;
    let column = position(map, keys.column, keys.zero_based_column)?;
    let code = keys.code.and_then(|key| lookup_in(map, key)).and_then(scalar_text);
    let kind = keys.kind.and_then(|key| lookup_in(map, key)).and_then(scalar_text);

    let message_key = keys.message.iter().copied().find(|key| {
        lookup_in(map, key)
            .and_then(Value::as_str)
            .is_some_and(|text| !text.trim().is_empty())
    });
    let message = message_key
        .and_then(|key| lookup_in(map, key))
        .and_then(Value::as_str)
        .unwrap_or(keys.fallback_message);

    let mut rest = map.clone();
    for key in [keys.line, keys.column, keys.code, keys.kind, message_key]
        .into_iter()
        .flatten()
    {
        remove_leaf(&mut rest, key);
    }

    let mut issue = IssueRecord::new(canonical, message).with_position(line, column);
    issue.code = code;
    issue.kind = kind;
    for (key, value) in &rest {
        let name = keys
            .renames
            .iter()
            .find(|(from, _)| *from == key)
            .map_or(key.as_str(), |(_, to)| *to);
        issue.extra.insert(name.to_string(), coerce_number(value));
    }

    Ok(issue)
}

fn error_record(map: &Map<String, Value>, canonical: &str) -> IssueRecord {
    let message = map
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| map.get("error").and_then(Value::as_str))
        .unwrap_or("error");

    let mut issue = IssueRecord::new(canonical, message).with_kind("error");
    for (key, value) in map {
        if key != "message" {
            issue.extra.insert(key.clone(), coerce_number(value));
        }
    }
    issue
}

fn position(
    map: &Map<String, Value>,
    key: Option<&str>,
    zero_based: bool,
) -> Result<Option<u32>, String> {
    let Some(key) = key else {
        return Ok(None);
    };
    let value = match lookup_in(map, key) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };

    let number = value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|float| float.fract() == 0.0 && *float >= 0.0)
                .map(|float| float as u64)
        })
        .or_else(|| value.as_str().and_then(|text| text.trim().parse::<u64>().ok()))
        .ok_or_else(|| format!("'{key}' is not a non-negative integer: {value}"))?;

    let number = u32::try_from(number).map_err(|_| format!("'{key}' out of range: {number}"))?;
    Ok(if zero_based {
        number.checked_add(1)
    } else {
        Some(number)
    })
}

fn coerce_number(value: &Value) -> Value {
    match value {
        Value::Number(number) => number.as_f64().map_or(Value::Null, Value::from),
        other => other.clone(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn drop_record(parsed: &mut Parsed, reason: &str) {
    debug!(reason, "Dropped partial JSON record");
    parsed.dropped_lines += 1;
}

fn scope<'v>(document: &'v Value, container: Option<&str>) -> Option<&'v Value> {
    match container {
        Some(path) => lookup(document, path),
        None => Some(document),
    }
}

/// Resolves a dotted key path (`a.b.c`) inside a value.
pub(crate) fn lookup<'v>(value: &'v Value, dotted: &str) -> Option<&'v Value> {
    dotted
        .split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

fn lookup_in<'v>(map: &'v Map<String, Value>, dotted: &str) -> Option<&'v Value> {
    let (head, rest) = match dotted.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (dotted, None),
    };
    let value = map.get(head)?;
    match rest {
        Some(rest) => lookup(value, rest),
        None => Some(value),
    }
}

/// Removes the value at a dotted key. Parent objects left empty are
/// removed too; siblings of the removed leaf stay.
fn remove_leaf(map: &mut Map<String, Value>, dotted: &str) {
    let Some((head, rest)) = dotted.split_once('.') else {
        map.remove(dotted);
        return;
    };
    let Some(Value::Object(child)) = map.get_mut(head) else {
        return;
    };
    remove_leaf(child, rest);
    if child.is_empty() {
        map.remove(head);
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::{CaseSensitivity, PathOptions, PathReconciler};
    use pyreview_core::FailureKind;

    fn reconciler() -> PathReconciler {
        PathReconciler::new(
            "/proj",
            PathOptions {
                case_sensitivity: CaseSensitivity::Sensitive,
                unify_separators: true,
                resolve_symlinks: false,
            },
        )
    }

    const BLOCKS: JsonShape = JsonShape::PathKeyed {
        container: None,
        records: None,
        keys: RecordKeys {
            line: Some("lineno"),
            column: Some("col_offset"),
            zero_based_column: true,
            kind: Some("type"),
            message: &["name"],
            fallback_message: "block",
            ..RecordKeys::EMPTY
        },
    };

    #[test]
    fn test_invalid_json_is_invalid_format() {
        let reconciler = reconciler();
        let target = Target::new("/proj/a.py", &reconciler);
        for raw in ["", "{not json", "[1, 2", "   "] {
            let failure = parse_json(raw, &BLOCKS, target).unwrap_err();
            assert_eq!(failure.kind, FailureKind::InvalidFormat, "{raw:?}");
        }
    }

    #[test]
    fn test_nested_tool_scenario() {
        let reconciler = reconciler();
        let target = Target::new("a.py", &reconciler);
        let raw = r#"{"a.py": {"toolX": {"error": "E1", "message": "boom"}}}"#;
        let shape = JsonShape::PathKeyedNested { tool: "toolX" };
        let parsed = parse_json(raw, &shape, target).unwrap();

        assert_eq!(parsed.issues.len(), 1);
        let issue = &parsed.issues[0];
        assert_eq!(issue.file, "a.py");
        assert_eq!(issue.extra_str("error"), Some("E1"));
        assert_eq!(issue.message, "boom");
    }

    #[test]
    fn test_path_keyed_blocks_keep_rank_and_coerce_scores() {
        let reconciler = reconciler();
        let target = Target::new("/proj/pkg/m.py", &reconciler);
        let raw = r#"{
            "pkg/m.py": [
                {"type": "function", "rank": "B", "col_offset": 0, "complexity": 7, "lineno": 3, "name": "f"},
                {"type": "method", "rank": "A", "col_offset": 4, "complexity": 1, "lineno": 10, "name": "g", "classname": "C"}
            ],
            "pkg/other.py": []
        }"#;
        let parsed = parse_json(raw, &BLOCKS, target).unwrap();

        assert_eq!(parsed.issues.len(), 2);
        assert_eq!(parsed.foreign_records, 1);
        let first = &parsed.issues[0];
        assert_eq!(first.message, "f");
        assert_eq!(first.kind.as_deref(), Some("function"));
        assert_eq!(first.line, Some(3));
        assert_eq!(first.column, Some(1));
        assert_eq!(first.extra["rank"], "B");
        assert_eq!(first.extra["complexity"], Value::from(7.0));
        assert_eq!(parsed.issues[1].extra_str("classname"), Some("C"));
    }

    #[test]
    fn test_path_not_found_lists_searched_path_and_keys() {
        let reconciler = reconciler();
        let target = Target::new("/proj/missing.py", &reconciler);
        let raw = r#"{"a.py": {"mi": 70.1, "rank": "A"}, "b/c.py": {"mi": 12.0, "rank": "C"}}"#;
        let failure = parse_json(raw, &BLOCKS, target).unwrap_err();

        assert_eq!(failure.kind, FailureKind::PathNotFound);
        assert!(failure.detail.contains("/proj/missing.py"));
        assert!(failure.detail.contains("/proj/a.py"));
        assert!(failure.detail.contains("/proj/b/c.py"));
    }

    #[test]
    fn test_metrics_object_is_one_record_with_renames() {
        let reconciler = reconciler();
        let target = Target::new("/proj/a.py", &reconciler);
        let shape = JsonShape::PathKeyed {
            container: None,
            records: None,
            keys: RecordKeys {
                fallback_message: "maintainability index",
                renames: &[("mi", "maintainability_index")],
                ..RecordKeys::EMPTY
            },
        };
        let raw = r#"{"/proj/a.py": {"mi": 64, "rank": "A"}}"#;
        let parsed = parse_json(raw, &shape, target).unwrap();
        let issue = &parsed.issues[0];
        assert_eq!(issue.message, "maintainability index");
        assert_eq!(issue.extra["maintainability_index"], Value::from(64.0));
        assert_eq!(issue.extra["rank"], "A");
    }

    #[test]
    fn test_error_object_becomes_error_record() {
        let reconciler = reconciler();
        let target = Target::new("/proj/a.py", &reconciler);
        let parsed = parse_json(
            r#"{"a.py": {"error": "invalid syntax (<unknown>, line 3)"}}"#,
            &BLOCKS,
            target,
        )
        .unwrap();
        assert_eq!(parsed.issues[0].kind.as_deref(), Some("error"));
        assert_eq!(parsed.issues[0].message, "invalid syntax (<unknown>, line 3)");
    }

    #[test]
    fn test_flat_list_filters_foreign_and_drops_bad_records() {
        let reconciler = reconciler();
        let target = Target::new("/proj/a.py", &reconciler);
        let shape = JsonShape::FlatList {
            container: Some("results"),
            path: Some("filename"),
            keys: RecordKeys {
                line: Some("line_number"),
                column: Some("col_offset"),
                zero_based_column: true,
                code: Some("test_id"),
                kind: Some("issue_severity"),
                message: &["issue_text"],
                fallback_message: "finding",
                ..RecordKeys::EMPTY
            },
        };
        let raw = r#"{"errors": [], "results": [
            {"filename": "./a.py", "line_number": 4, "col_offset": 0, "test_id": "B101",
             "issue_severity": "LOW", "issue_confidence": "HIGH", "issue_text": "Use of assert detected."},
            {"filename": "b.py", "line_number": 1, "test_id": "B105", "issue_text": "x"},
            {"filename": "a.py", "line_number": "many", "test_id": "B102", "issue_text": "y"},
            "garbage"
        ]}"#;
        let parsed = parse_json(raw, &shape, target).unwrap();

        assert_eq!(parsed.issues.len(), 1);
        assert_eq!(parsed.foreign_records, 1);
        assert_eq!(parsed.dropped_lines, 2);
        let issue = &parsed.issues[0];
        assert_eq!(issue.code.as_deref(), Some("B101"));
        assert_eq!(issue.kind.as_deref(), Some("LOW"));
        assert_eq!(issue.column, Some(1));
        assert_eq!(issue.extra_str("issue_confidence"), Some("HIGH"));
        assert!(issue.extra.get("filename").is_none());
    }

    #[test]
    fn test_dotted_keys_reach_nested_fields() {
        let reconciler = reconciler();
        let target = Target::new("/proj/a.py", &reconciler);
        let shape = JsonShape::FlatList {
            container: None,
            path: Some("location.file"),
            keys: RecordKeys {
                line: Some("location.line"),
                code: Some("error.code"),
                message: &["error.message"],
                fallback_message: "dependency issue",
                ..RecordKeys::EMPTY
            },
        };
        let raw = r#"[{"error": {"code": "DEP001", "message": "'requests' imported but missing from the dependency definitions"},
                      "module": "requests", "location": {"file": "a.py", "line": 2, "column": 0}}]"#;
        let parsed = parse_json(raw, &shape, target).unwrap();
        let issue = &parsed.issues[0];
        assert_eq!(issue.code.as_deref(), Some("DEP001"));
        assert_eq!(issue.line, Some(2));
        assert!(issue.message.starts_with("'requests'"));
        assert_eq!(issue.extra_str("module"), Some("requests"));
        assert_eq!(issue.extra["location"], serde_json::json!({"column": 0}));
        assert!(issue.extra.get("error").is_none());
    }

    #[test]
    fn test_partly_consumed_object_keeps_siblings() {
        let reconciler = reconciler();
        let target = Target::new("/proj/a.py", &reconciler);
        let shape = JsonShape::FlatList {
            container: None,
            path: None,
            keys: RecordKeys {
                line: Some("location.line"),
                message: &["message"],
                ..RecordKeys::EMPTY
            },
        };
        let raw = r#"[{"message": "m", "location": {"line": 3, "end_line": 5}}]"#;
        let parsed = parse_json(raw, &shape, target).unwrap();

        let issue = &parsed.issues[0];
        assert_eq!(issue.line, Some(3));
        assert_eq!(issue.extra["location"], serde_json::json!({"end_line": 5}));
        assert!(issue.extra.get("message").is_none());
    }

    #[test]
    fn test_extract_any_picks_layout_by_shape_order() {
        let reconciler = reconciler();
        let target = Target::new("/proj/a.py", &reconciler);
        let shapes = [
            JsonShape::FlatList {
                container: None,
                path: None,
                keys: RecordKeys {
                    message: &["msg"],
                    ..RecordKeys::EMPTY
                },
            },
            JsonShape::PathKeyedNested { tool: "deptry" },
        ];

        let list = serde_json::json!([{"msg": "one"}]);
        assert_eq!(extract_any(&list, &shapes, target).unwrap().issues[0].message, "one");

        let nested = serde_json::json!({"a.py": {"deptry": {"error": "E", "message": "two"}}});
        assert_eq!(extract_any(&nested, &shapes, target).unwrap().issues[0].message, "two");

        let failure = extract_any(&Value::from(3), &shapes, target).unwrap_err();
        assert_eq!(failure.kind, FailureKind::InvalidFormat);
    }
}
