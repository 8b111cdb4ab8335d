use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::doctest::{ConflictPolicy, DoctestCase, DoctestCollection};
use crate::executor::CandidateCode;
use crate::signature::FunctionSignature;
use crate::workflow::ledger::AccuracyLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    /// Cases suggested after the first verified candidate.
    Suggested,
    /// Cases proposed to challenge accepted code.
    Refuted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReview {
    pub kind: ReviewKind,
    pub proposals: Vec<DoctestCase>,
}

/// Everything a multi-step workflow carries between steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: Uuid,
    pub signature: FunctionSignature,
    pub docstring: String,
    pub doctests: DoctestCollection,
    pub code: Option<CandidateCode>,
    pub pending: Option<PendingReview>,
    #[serde(default)]
    pub ledger: AccuracyLedger,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(signature: FunctionSignature, docstring: impl Into<String>, policy: ConflictPolicy) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            signature,
            docstring: docstring.into(),
            doctests: DoctestCollection::new(policy),
            code: None,
            pending: None,
            ledger: AccuracyLedger::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
