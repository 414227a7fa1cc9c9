//! Discovery of Python source files under a project root.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Restartable, sorted walk over the `.py` files below a root.
///
/// Hidden directories and directories named in the exclusion list are not
/// entered. Each iteration walks the filesystem afresh.
///
/// # Examples
///
/// ```
/// use pyreview_analysis::walk::PythonFiles;
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::create_dir(dir.path().join("__pycache__")).unwrap();
/// std::fs::write(dir.path().join("b.py"), "").unwrap();
/// std::fs::write(dir.path().join("a.py"), "").unwrap();
/// std::fs::write(dir.path().join("notes.txt"), "").unwrap();
/// std::fs::write(dir.path().join("__pycache__/a.py"), "").unwrap();
///
/// let files = PythonFiles::new(dir.path()).exclude(["__pycache__"]);
/// let names: Vec<_> = files
///     .iter()
///     .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
///     .collect();
/// assert_eq!(names, ["a.py", "b.py"]);
/// ```
#[derive(Debug, Clone)]
pub struct PythonFiles {
    root: PathBuf,
    exclude_dirs: Vec<String>,
}

impl PythonFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude_dirs: Vec::new(),
        }
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_dirs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = PathBuf> + '_> {
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.skips(entry));

        Box::new(walker.filter_map(|entry| match entry {
            Ok(entry) => {
                let is_source = entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "py");
                is_source.then(|| entry.into_path())
            }
            Err(err) => {
                debug!(error = %err, "Skipping unreadable entry");
                None
            }
        }))
    }

    fn skips(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.exclude_dirs.iter().any(|excluded| *excluded == name)
    }
}

impl<'a> IntoIterator for &'a PythonFiles {
    type Item = PathBuf;
    type IntoIter = Box<dyn Iterator<Item = PathBuf> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
