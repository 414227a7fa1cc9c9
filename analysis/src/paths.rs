//! Path reconciliation between tool-reported paths and the canonical file.
//!
//! Tools print paths relative to their working directory, absolute, with
//! platform separators, or through a symlinked project root. The
//! [`PathReconciler`] folds all of these into one comparable form.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Case handling used when comparing paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseSensitivity {
    /// Case-insensitive on Windows and macOS, sensitive elsewhere.
    #[default]
    Platform,
    Sensitive,
    Insensitive,
}

impl CaseSensitivity {
    pub fn folds_case(&self) -> bool {
        match self {
            Self::Platform => cfg!(any(windows, target_os = "macos")),
            Self::Sensitive => false,
            Self::Insensitive => true,
        }
    }
}

/// Path comparison settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathOptions {
    pub case_sensitivity: CaseSensitivity,
    /// Treat `\` and `/` as the same separator.
    pub unify_separators: bool,
    /// Resolve symlinks through the filesystem when the path exists.
    pub resolve_symlinks: bool,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            case_sensitivity: CaseSensitivity::Platform,
            unify_separators: true,
            resolve_symlinks: true,
        }
    }
}

/// Decides whether two path strings denote the same file.
///
/// Relative paths are resolved against `base`, the directory the tools were
/// run from.
///
/// # Examples
///
/// ```
/// use pyreview_analysis::paths::{CaseSensitivity, PathOptions, PathReconciler};
///
/// let options = PathOptions {
///     case_sensitivity: CaseSensitivity::Insensitive,
///     unify_separators: true,
///     resolve_symlinks: false,
/// };
/// let reconciler = PathReconciler::new("/work/proj", options);
///
/// assert!(reconciler.reconcile("pkg\\Mod.py", "/work/proj/pkg/mod.py"));
/// assert!(reconciler.reconcile("./pkg/../pkg/mod.py  ", "/work/proj/pkg/mod.py"));
/// assert!(!reconciler.reconcile("", "/work/proj/pkg/mod.py"));
/// ```
#[derive(Debug, Clone)]
pub struct PathReconciler {
    base: PathBuf,
    options: PathOptions,
}

impl PathReconciler {
    pub fn new(base: impl Into<PathBuf>, options: PathOptions) -> Self {
        Self {
            base: base.into(),
            options,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn options(&self) -> &PathOptions {
        &self.options
    }

    /// Returns `true` iff both paths normalize to the same string.
    ///
    /// Malformed candidates (empty, multi-line, containing NUL) never match.
    pub fn reconcile(&self, candidate: &str, canonical: &str) -> bool {
        match (self.normalize(candidate), self.normalize(canonical)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    /// Returns the first candidate that reconciles with `canonical`.
    pub fn find_match<'a, I>(&self, canonical: &str, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted = self.normalize(canonical)?;
        candidates
            .into_iter()
            .find(|candidate| self.normalize(candidate).as_deref() == Some(wanted.as_str()))
    }

    /// Absolute, separator-unified, dot-free form of `raw`, with case
    /// preserved. Used as the canonical identity of a file under review.
    pub fn absolute(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.contains(['\n', '\r', '\0']) {
            return None;
        }

        let unified = self.unify(trimmed);
        let joined = if is_absolute(&unified) {
            unified
        } else {
            let base = self.unify(&self.base.to_string_lossy());
            format!("{}/{}", base.trim_end_matches('/'), unified)
        };
        let lexical = lexical_normalize(&joined);

        if self.options.resolve_symlinks {
            if let Ok(resolved) = std::fs::canonicalize(&lexical) {
                let resolved = resolved.to_string_lossy();
                let resolved = resolved
                    .strip_prefix(r"\\?\")
                    .unwrap_or(resolved.as_ref());
                return Some(lexical_normalize(&self.unify(resolved)));
            }
        }

        Some(lexical)
    }

    /// Comparison form of `raw`: [`absolute`](Self::absolute) plus case folding.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let absolute = self.absolute(raw)?;
        if self.options.case_sensitivity.folds_case() {
            Some(absolute.to_lowercase())
        } else {
            Some(absolute)
        }
    }

    fn unify(&self, raw: &str) -> String {
        if self.options.unify_separators {
            raw.replace('\\', "/")
        } else {
            raw.to_string()
        }
    }
}

fn is_absolute(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

/// Collapses `.`, `..` and repeated separators without touching the
/// filesystem. `..` never climbs above the root.
fn lexical_normalize(path: &str) -> String {
    let (prefix, rest) = split_root(path);
    let mut parts: Vec<&str> = Vec::new();

    for part in rest.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    format!("{prefix}{}", parts.join("/"))
}

fn split_root(path: &str) -> (&str, &str) {
    let bytes = path.as_bytes();
    if bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/' {
        return path.split_at(3);
    }
    if path.starts_with("//") {
        return path.split_at(2);
    }
    if path.starts_with('/') {
        return path.split_at(1);
    }
    ("", path)
}
