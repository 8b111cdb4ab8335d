//! Verification and refutation loops over explicit workflow state.

pub mod ledger;
pub mod refute;
pub mod session;
pub mod state;
pub mod verify;

use thiserror::Error;

use crate::doctest::DoctestError;
use crate::executor::ExecutionError;
use crate::explorer::ExplorerError;
use crate::sandbox::SandboxError;
use crate::signature::SignatureError;

pub use ledger::{AccuracyLedger, LedgerEntry};
pub use refute::{Exploration, Refuter, ReviewOutcome};
pub use session::{Session, StepOutcome};
pub use state::{PendingReview, ReviewKind, WorkflowState};
pub use verify::{Limits, LoopState, Seed, Verifier, VerifyOutcome};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Doctest(#[from] DoctestError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Explorer(#[from] ExplorerError),
    #[error("no review is pending")]
    NoPendingReview,
    #[error("no verified code yet; run the workflow first")]
    NoVerifiedCode,
}
