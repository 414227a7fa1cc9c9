//! Diff-block parsing for formatter and refactoring suggestions.
//!
//! No diff grammar is enforced. Lines fall into three classes: a file marker
//! naming the path the following hunks apply to, a hunk header (`@@ ...`)
//! that flushes the body accumulated so far, and body lines kept verbatim.
//!
//! Inside a hunk every `-`, `+`, ` ` or `\` line is body, even one that
//! looks like a `---`/`+++` header. A hunk ends once the line counts from its
//! header are used up, or at the first line that cannot belong to it.

use regex::Regex;
use std::sync::LazyLock;

use pyreview_core::IssueRecord;

use super::normalize::normalize_output;
use super::{Parsed, Target};

static HUNK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@+\s+-(\d+)(?:,(\d+))?\s+\+(\d+)(?:,(\d+))?")
        .expect("static regex must compile")
});

/// Lines still owed to the open hunk.
#[derive(Debug, Clone, Copy)]
enum Hunk {
    Closed,
    /// Counts from the header: old-side and new-side lines remaining.
    Counted { old: u32, new: u32 },
    /// Header without readable counts; diff-shaped lines stay in the hunk.
    Open,
}

impl Hunk {
    fn from_header(header: &str) -> Self {
        let Some(caps) = HUNK_RE.captures(header) else {
            return Self::Open;
        };
        let count = |index: usize| -> Option<u32> {
            caps.get(index).map_or(Some(1), |n| n.as_str().parse().ok())
        };
        match (count(2), count(4)) {
            (Some(old), Some(new)) => Self::Counted { old, new },
            _ => Self::Open,
        }
    }

    /// Consumes `line` as hunk body when it belongs to the hunk.
    fn take(&mut self, line: &str) -> bool {
        let first = line.chars().next();
        match self {
            Self::Closed => false,
            Self::Open => matches!(first, None | Some(' ' | '-' | '+' | '\\')),
            Self::Counted { old, new } => {
                let (needs_old, needs_new) = match first {
                    Some('\\') => return *old > 0 || *new > 0,
                    Some('-') => (true, false),
                    Some('+') => (false, true),
                    None | Some(' ') => (true, true),
                    Some(_) => return false,
                };
                if (needs_old && *old == 0) || (needs_new && *new == 0) {
                    return false;
                }
                if needs_old {
                    *old -= 1;
                }
                if needs_new {
                    *new -= 1;
                }
                true
            }
        }
    }
}

/// How one tool marks files in its diff stream.
#[derive(Debug, Clone, Copy)]
pub struct DiffDialect {
    /// Lines starting with this prefix name the file that follows.
    pub marker_prefix: Option<&'static str>,
    /// Treat `+++ path` headers as file markers.
    pub plus_header_marks_file: bool,
    /// Path prefixes some tools add (`b/`, `fixed/`).
    pub strip_prefixes: &'static [&'static str],
    /// Path suffixes some tools add (`:after`).
    pub strip_suffixes: &'static [&'static str],
}

/// Plain unified diff as printed by black, isort, autopep8 and docformatter.
pub const UNIFIED: DiffDialect = DiffDialect {
    marker_prefix: None,
    plus_header_marks_file: true,
    strip_prefixes: &["b/", "fixed/", "after/"],
    strip_suffixes: &[":after"],
};

/// Refactoring tools that announce each file with a `refactor:` line.
pub const REFACTOR: DiffDialect = DiffDialect {
    marker_prefix: Some("refactor:"),
    plus_header_marks_file: false,
    strip_prefixes: &[],
    strip_suffixes: &[],
};

/// One hunk (or the informational placeholder for empty input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffBlock {
    /// Path from the most recent file marker, as printed.
    pub file: Option<String>,
    /// The `@@` line that opened this hunk.
    pub header: Option<String>,
    pub body: Vec<String>,
    pub placeholder: bool,
}

impl DiffBlock {
    fn placeholder() -> Self {
        Self {
            file: None,
            header: None,
            body: Vec::new(),
            placeholder: true,
        }
    }

    /// First line of the original range, from `@@ -12,3 +12,4 @@`.
    pub fn start_line(&self) -> Option<u32> {
        let header = self.header.as_deref()?;
        let caps = HUNK_RE.captures(header)?;
        caps.get(1)?.as_str().parse().ok()
    }

    pub fn text(&self) -> String {
        self.body.join("\n")
    }
}

/// Splits a diff stream into blocks.
///
/// Empty input yields a single placeholder block: empty output from this
/// tool class means there is nothing to suggest.
pub fn parse_diff(raw: &str, dialect: &DiffDialect) -> Vec<DiffBlock> {
    if raw.trim().is_empty() {
        return vec![DiffBlock::placeholder()];
    }

    let mut blocks = Vec::new();
    let mut file: Option<String> = None;
    let mut header: Option<String> = None;
    let mut body: Vec<String> = Vec::new();
    let mut hunk = Hunk::Closed;

    let normalized = normalize_output(raw);
    for line in normalized.lines() {
        if hunk.take(line) {
            body.push(line.to_string());
            continue;
        }
        hunk = Hunk::Closed;

        if let Some(path) = marker_path(line, dialect) {
            flush(&mut blocks, &file, &mut header, &mut body);
            file = Some(path);
            continue;
        }
        if line.starts_with("---") || line.starts_with("+++") {
            continue;
        }
        if line.starts_with("@@") {
            flush(&mut blocks, &file, &mut header, &mut body);
            header = Some(line.to_string());
            hunk = Hunk::from_header(line);
            continue;
        }
        body.push(line.to_string());
    }
    flush(&mut blocks, &file, &mut header, &mut body);

    blocks
}

fn flush(
    blocks: &mut Vec<DiffBlock>,
    file: &Option<String>,
    header: &mut Option<String>,
    body: &mut Vec<String>,
) {
    let has_body = body.iter().any(|line| !line.trim().is_empty());
    if header.is_some() || (has_body && file.is_some()) {
        blocks.push(DiffBlock {
            file: file.clone(),
            header: header.take(),
            body: std::mem::take(body),
            placeholder: false,
        });
    } else {
        body.clear();
    }
}

fn marker_path(line: &str, dialect: &DiffDialect) -> Option<String> {
    let rest = if let Some(prefix) = dialect.marker_prefix {
        line.strip_prefix(prefix)?
    } else if dialect.plus_header_marks_file {
        line.strip_prefix("+++ ")?
    } else {
        return None;
    };

    let mut path = rest.split('\t').next().unwrap_or(rest).trim();
    for prefix in dialect.strip_prefixes {
        if let Some(stripped) = path.strip_prefix(prefix) {
            path = stripped;
            break;
        }
    }
    for suffix in dialect.strip_suffixes {
        if let Some(stripped) = path.strip_suffix(suffix) {
            path = stripped;
            break;
        }
    }
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// Turns blocks into records for `target`. Blocks for other files are
/// counted as foreign; blocks with no file marker belong to the target.
pub fn blocks_to_parsed(blocks: &[DiffBlock], target: Target<'_>, kind: &str) -> Parsed {
    let mut parsed = Parsed::default();
    for block in blocks.iter().filter(|block| !block.placeholder) {
        if let Some(file) = block.file.as_deref() {
            if !target.owns(file) {
                parsed.foreign_records += 1;
                continue;
            }
        }
        let message = match block.header.as_deref() {
            Some(header) => format!("suggested change {header}"),
            None => "suggested change".to_string(),
        };
        parsed.issues.push(
            IssueRecord::new(target.canonical, message)
                .with_position(block.start_line(), None)
                .with_kind(kind)
                .with_extra("diff", block.text()),
        );
    }
    parsed
}
