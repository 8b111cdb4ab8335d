//! Multi-step workflow driven by a presentation layer: start, review,
//! refute, review again. All state lives in the `WorkflowState` the caller
//! passes in and persists.

use tracing::{info, warn};

use crate::builder::{self, ReviewDecision};
use crate::doctest::{parse_user_cases, DoctestCase};
use crate::executor::{CandidateCode, ExecutionSandbox};
use crate::synth::{InputSuggester, Synthesizer};
use crate::workflow::ledger::{AccuracyLedger, LedgerEntry};
use crate::workflow::refute::{self, Exploration, Refuter, ReviewOutcome};
use crate::workflow::state::{PendingReview, ReviewKind, WorkflowState};
use crate::workflow::verify::{Limits, Seed, Verifier, VerifyOutcome};
use crate::workflow::WorkflowError;

/// Where a step left the workflow. Every terminal failure is a distinct
/// variant.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The user's doctests are unusable; nothing was synthesized.
    InvalidInput(String),
    /// No candidate could be synthesized.
    SynthesisFailed { least_bad: Option<LedgerEntry> },
    /// Candidates were produced but none satisfied every case.
    Exhausted { least_bad: Option<LedgerEntry> },
    /// Proposed cases wait for accept/override decisions.
    AwaitingReview { kind: ReviewKind, proposals: Vec<DoctestCase> },
    Final(CandidateCode),
}

pub struct Session<'a> {
    synth: &'a dyn Synthesizer,
    suggester: &'a dyn InputSuggester,
    sandbox: &'a dyn ExecutionSandbox,
    exploration: Option<Exploration<'a>>,
    limits: Limits,
}

impl<'a> Session<'a> {
    pub fn new(
        synth: &'a dyn Synthesizer,
        suggester: &'a dyn InputSuggester,
        sandbox: &'a dyn ExecutionSandbox,
        limits: Limits,
    ) -> Self {
        Self {
            synth,
            suggester,
            sandbox,
            exploration: None,
            limits,
        }
    }

    pub fn with_exploration(mut self, exploration: Exploration<'a>) -> Self {
        self.exploration = Some(exploration);
        self
    }

    fn verifier(&self) -> Verifier<'a> {
        Verifier::new(self.synth, self.sandbox, self.limits)
    }

    /// Seeds from user cases, verifies a first candidate and proposes
    /// suggested cases for review.
    pub fn start(&self, state: &mut WorkflowState, user_cases: &[(String, String)]) -> Result<StepOutcome, WorkflowError> {
        state.touch();

        let cases = match parse_user_cases(user_cases, &state.signature) {
            Ok(cases) => cases,
            Err(e) => {
                warn!(error = %e, "user doctests rejected");
                return Ok(StepOutcome::InvalidInput(e.to_string()));
            }
        };
        let seed = match builder::build_seed(cases, &state.signature, state.doctests.policy()) {
            Ok(seed) => seed,
            Err(e) => {
                warn!(error = %e, "user doctests rejected");
                return Ok(StepOutcome::InvalidInput(e.to_string()));
            }
        };
        state.doctests = seed;

        let outcome = self
            .verifier()
            .verify(&state.signature, &state.docstring, &state.doctests, Seed::Fresh)?;
        let code = match settle(state, outcome) {
            Ok(code) => code,
            Err(terminal) => return Ok(terminal),
        };

        let from_llm = match self.suggester.suggest_inputs(&state.signature, &state.docstring) {
            Ok(inputs) => builder::conform_inputs(&state.signature, &state.doctests, inputs),
            Err(e) => {
                warn!(error = %e, "no suggested inputs from synthesizer");
                Vec::new()
            }
        };
        let from_explorer = match &self.exploration {
            Some(exploration) => {
                builder::conform_inputs(&state.signature, &state.doctests, exploration.inputs(&code, &state.signature)?)
            }
            None => Vec::new(),
        };

        let inputs = builder::suggest(&state.doctests, &[from_llm.as_slice(), from_explorer.as_slice()]);
        let proposals = builder::materialize(self.sandbox, &code, &state.signature, &inputs, state.doctests.policy())?;
        Ok(await_review(state, ReviewKind::Suggested, proposals.cases().to_vec(), code))
    }

    /// Applies accept/override decisions to the pending proposals.
    pub fn review(&self, state: &mut WorkflowState, decisions: &[ReviewDecision]) -> Result<StepOutcome, WorkflowError> {
        state.touch();

        let pending = state.pending.take().ok_or(WorkflowError::NoPendingReview)?;
        let Some(code) = state.code.clone() else {
            state.pending = Some(pending);
            return Err(WorkflowError::NoVerifiedCode);
        };

        let verifier = self.verifier();
        let concluded = refute::conclude(
            &verifier,
            &state.signature,
            &state.docstring,
            &mut state.doctests,
            &code,
            pending.kind,
            &pending.proposals,
            decisions,
        );

        let reviewed = match concluded {
            Ok(reviewed) => reviewed,
            Err(e) => {
                state.pending = Some(pending);
                return Err(e);
            }
        };

        match reviewed {
            ReviewOutcome::Unchanged(code) => {
                info!(function = %state.signature.name, "all proposals accepted");
                Ok(StepOutcome::Final(code))
            }
            ReviewOutcome::Reverified(outcome) => match settle(state, outcome) {
                Ok(code) => Ok(StepOutcome::Final(code)),
                Err(terminal) => Ok(terminal),
            },
        }
    }

    /// Proposes inputs that challenge the current code.
    pub fn refute(&self, state: &mut WorkflowState) -> Result<StepOutcome, WorkflowError> {
        state.touch();

        let code = state.code.clone().ok_or(WorkflowError::NoVerifiedCode)?;
        let refuter = Refuter::new(self.synth, self.sandbox, self.exploration);
        let proposals = refuter.propose(&state.signature, &code, &state.doctests)?;
        Ok(await_review(state, ReviewKind::Refuted, proposals, code))
    }
}

/// Records a verification outcome on the state. Returns the verified code,
/// or the terminal step outcome for the failures.
fn settle(state: &mut WorkflowState, outcome: VerifyOutcome) -> Result<CandidateCode, StepOutcome> {
    match outcome {
        VerifyOutcome::Succeeded { code, attempts, ledger } => {
            info!(function = %state.signature.name, attempts, "candidate verified");
            state.ledger = ledger;
            state.code = Some(code.clone());
            Ok(code)
        }
        VerifyOutcome::Exhausted { ledger } => Err(StepOutcome::Exhausted {
            least_bad: remember(state, ledger),
        }),
        VerifyOutcome::SynthesisFailed { ledger } => Err(StepOutcome::SynthesisFailed {
            least_bad: remember(state, ledger),
        }),
    }
}

fn remember(state: &mut WorkflowState, ledger: AccuracyLedger) -> Option<LedgerEntry> {
    let least_bad = ledger.least_bad().cloned();
    state.ledger = ledger;
    least_bad
}

fn await_review(state: &mut WorkflowState, kind: ReviewKind, proposals: Vec<DoctestCase>, code: CandidateCode) -> StepOutcome {
    if proposals.is_empty() {
        info!(function = %state.signature.name, "nothing to review");
        state.pending = None;
        return StepOutcome::Final(code);
    }

    state.pending = Some(PendingReview {
        kind,
        proposals: proposals.clone(),
    });
    StepOutcome::AwaitingReview { kind, proposals }
}
