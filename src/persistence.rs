use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::config::app_dir;
use crate::workflow::WorkflowState;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("no saved session for {0:?}; start one with `specloop run`")]
    NotFound(String),
    #[error("session file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("session file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One JSON file per function name under a sessions directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(app_dir().join("sessions"))
    }
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, function_name: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(function_name.as_bytes());
        self.root.join(format!("{}.json", hex::encode(hasher.finalize())))
    }

    pub fn save(&self, state: &WorkflowState) -> Result<PathBuf, PersistenceError> {
        let path = self.path_for(&state.signature.name);
        let io_err = |source| PersistenceError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let text = serde_json::to_string_pretty(state).map_err(|source| PersistenceError::Corrupt {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, text).map_err(io_err)?;
        debug!(path = %path.display(), "session saved");
        Ok(path)
    }

    pub fn load(&self, function_name: &str) -> Result<WorkflowState, PersistenceError> {
        let path = self.path_for(function_name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PersistenceError::NotFound(function_name.to_string()))
            }
            Err(source) => return Err(PersistenceError::Io { path, source }),
        };

        serde_json::from_str(&raw).map_err(|source| PersistenceError::Corrupt { path, source })
    }

    pub fn remove(&self, function_name: &str) -> Result<bool, PersistenceError> {
        let path = self.path_for(function_name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(PersistenceError::Io { path, source }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
