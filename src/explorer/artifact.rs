use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::executor::CandidateCode;

/// One `<name>.py` file per function, so out-of-process tools can import
/// the verified candidate.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, function_name: &str) -> PathBuf {
        self.dir.join(format!("{}.py", sanitize_name(function_name)))
    }

    /// Writes the candidate unless a file for this function already
    /// exists. Returns the artifact path either way.
    pub fn persist(&self, code: &CandidateCode) -> io::Result<PathBuf> {
        let path = self.path_for(&code.function_name);
        if path.exists() {
            debug!(path = %path.display(), "artifact already present");
            return Ok(path);
        }

        ensure_parent_dir(&path)?;
        fs::write(&path, format!("{}\n", code.source.trim_end()))?;
        debug!(path = %path.display(), "artifact written");
        Ok(path)
    }
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        "candidate".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("programs"));

        let first = CandidateCode::new("multiply", "def multiply(a, b):\n    return a * b");
        let path = store.persist(&first).unwrap();
        assert_eq!(path, tmp.path().join("programs/multiply.py"));
        assert!(path.starts_with(store.dir()));

        let second = CandidateCode::new("multiply", "def multiply(a, b):\n    return 0");
        assert_eq!(store.persist(&second).unwrap(), path);
        assert_eq!(fs::read_to_string(&path).unwrap(), "def multiply(a, b):\n    return a * b\n");
    }

    #[test]
    fn names_are_sanitized() {
        let store = ArtifactStore::new("/tmp/x");
        assert_eq!(store.path_for("../evil"), PathBuf::from("/tmp/x/___evil.py"));
    }
}
