//! Refutation: challenge accepted code with fresh inputs, then fold the
//! reviewed results back and re-verify.

use tracing::{info, warn};

use crate::builder::{self, fold_reviewed, ReviewDecision};
use crate::doctest::{DoctestCase, DoctestCollection};
use crate::executor::{CandidateCode, ExecutionSandbox};
use crate::explorer::{ArtifactStore, Explorer, ExplorerError};
use crate::signature::FunctionSignature;
use crate::synth::Synthesizer;
use crate::value::Value;
use crate::workflow::state::ReviewKind;
use crate::workflow::verify::{Seed, Verifier, VerifyOutcome};
use crate::workflow::WorkflowError;

/// An explorer together with the store it reads candidates from.
#[derive(Clone, Copy)]
pub struct Exploration<'a> {
    pub explorer: &'a dyn Explorer,
    pub store: &'a ArtifactStore,
}

impl Exploration<'_> {
    /// Persists `code` and asks the explorer for inputs. A missing tool is
    /// an error, not an empty list.
    pub fn inputs(&self, code: &CandidateCode, sig: &FunctionSignature) -> Result<Vec<Value>, WorkflowError> {
        self.explorer.check_available()?;
        let artifact = self.store.persist(code).map_err(ExplorerError::from)?;
        let inputs = self.explorer.explore(&artifact, sig)?;
        info!(function = %sig.name, found = inputs.len(), "explorer finished");
        Ok(inputs)
    }
}

pub struct Refuter<'a> {
    synth: &'a dyn Synthesizer,
    sandbox: &'a dyn ExecutionSandbox,
    exploration: Option<Exploration<'a>>,
}

impl<'a> Refuter<'a> {
    pub fn new(
        synth: &'a dyn Synthesizer,
        sandbox: &'a dyn ExecutionSandbox,
        exploration: Option<Exploration<'a>>,
    ) -> Self {
        Self {
            synth,
            sandbox,
            exploration,
        }
    }

    /// New cases for review: inputs from the synthesizer and the explorer,
    /// minus those already in `doctests`, paired with what `code` does on
    /// them.
    pub fn propose(
        &self,
        sig: &FunctionSignature,
        code: &CandidateCode,
        doctests: &DoctestCollection,
    ) -> Result<Vec<DoctestCase>, WorkflowError> {
        let from_synth = match self.synth.refute_variant(code, doctests) {
            Ok(inputs) => builder::conform_inputs(sig, doctests, inputs),
            Err(e) => {
                warn!(error = %e, "no refutation inputs from synthesizer");
                Vec::new()
            }
        };

        let from_explorer = match &self.exploration {
            Some(exploration) => builder::conform_inputs(sig, doctests, exploration.inputs(code, sig)?),
            None => Vec::new(),
        };

        let inputs = builder::suggest(doctests, &[from_synth.as_slice(), from_explorer.as_slice()]);
        let proposals = builder::materialize(self.sandbox, code, sig, &inputs, doctests.policy())?;
        info!(function = %sig.name, proposals = proposals.len(), "refutation round proposed cases");
        Ok(proposals.cases().to_vec())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    /// Every proposal was accepted; the reviewed code stands.
    Unchanged(CandidateCode),
    /// Overrides forced another verification run.
    Reverified(VerifyOutcome),
}

/// Folds reviewed proposals into `doctests` and, unless all were accepted,
/// re-enters verification. Suggestion reviews synthesize afresh; refutation
/// reviews repair the refuted code.
#[allow(clippy::too_many_arguments)]
pub fn conclude(
    verifier: &Verifier<'_>,
    sig: &FunctionSignature,
    docstring: &str,
    doctests: &mut DoctestCollection,
    code: &CandidateCode,
    kind: ReviewKind,
    proposals: &[DoctestCase],
    decisions: &[ReviewDecision],
) -> Result<ReviewOutcome, WorkflowError> {
    let fold = fold_reviewed(doctests, proposals, decisions)?;
    info!(folded = fold.folded, all_accepted = fold.all_accepted, total = doctests.len(), "review folded");

    if fold.all_accepted {
        return Ok(ReviewOutcome::Unchanged(code.clone()));
    }

    let seed = match kind {
        ReviewKind::Suggested => Seed::Fresh,
        ReviewKind::Refuted => Seed::Repair(code),
    };
    Ok(ReviewOutcome::Reverified(verifier.verify(sig, docstring, doctests, seed)?))
}
