//! Symbolic exploration of verified candidates for extra inputs.

pub mod artifact;
pub mod crosshair;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::signature::FunctionSignature;
use crate::value::Value;

pub use artifact::ArtifactStore;
pub use crosshair::CrosshairExplorer;

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("{tool} is not available: {reason}")]
    Unavailable { tool: String, reason: String },
    #[error("artifact {} does not exist", .0.display())]
    MissingArtifact(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub trait Explorer {
    /// Pre-flight. An unavailable tool is a configuration error for the
    /// caller, never an empty result.
    fn check_available(&self) -> Result<(), ExplorerError>;

    /// Input tuples likely to hit edge cases of the function in `artifact`.
    /// Empty when the tool finds nothing or fails on the file.
    fn explore(&self, artifact: &Path, sig: &FunctionSignature) -> Result<Vec<Value>, ExplorerError>;
}
