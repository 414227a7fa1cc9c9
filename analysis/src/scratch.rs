//! Per-invocation scratch directories.

use std::path::{Path, PathBuf};

use pyreview_core::Failure;
use tempfile::TempDir;
use tracing::debug;

/// A temporary directory owned by exactly one adapter invocation.
///
/// Removed when dropped, on success and failure alike.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    pub fn create(label: &str) -> Result<Self, Failure> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("pyreview-{label}-"))
            .tempdir()
            .map_err(|err| Failure::adapter_fault(format!("cannot create scratch space: {err}")))?;
        debug!(path = %dir.path().display(), "Created scratch space");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the scratch space.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Reads a file the tool was asked to write. `None` when it was not
    /// written.
    pub fn read(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.file(name)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_on_drop() {
        let path = {
            let scratch = ScratchSpace::create("test").unwrap();
            std::fs::write(scratch.file("out.json"), "{}").unwrap();
            assert_eq!(scratch.read("out.json").as_deref(), Some("{}"));
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_removed_when_unwinding() {
        let mut kept = None;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let scratch = ScratchSpace::create("panic").unwrap();
            kept = Some(scratch.path().to_path_buf());
            panic!("adapter blew up");
        }));
        assert!(result.is_err());
        assert!(!kept.unwrap().exists());
    }

    #[test]
    fn test_missing_file_reads_none() {
        let scratch = ScratchSpace::create("test").unwrap();
        assert!(scratch.read("absent.json").is_none());
    }
}
