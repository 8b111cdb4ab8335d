//! Doctest set builder: seeds, suggestions, materialization and the
//! review fold.

use tracing::{debug, warn};

use crate::doctest::{ConflictPolicy, DoctestCase, DoctestCollection, DoctestError, Output};
use crate::executor::{self, CandidateCode, ExecutionError, ExecutionSandbox};
use crate::signature::{CallShape, FunctionSignature};
use crate::value::Value;

/// Builds the seed collection from already parsed user cases.
pub fn build_seed(
    cases: Vec<DoctestCase>,
    sig: &FunctionSignature,
    policy: ConflictPolicy,
) -> Result<DoctestCollection, DoctestError> {
    if cases.is_empty() {
        return Err(DoctestError::NoCases);
    }

    let seed = DoctestCollection::from_cases(cases, policy);
    seed.validate(sig)?;
    debug!(function = %sig.name, cases = seed.len(), "seed collection built");
    Ok(seed)
}

/// Normalizes raw candidate inputs to the declared shape and drops the
/// ones the signature cannot be called with.
///
/// For a single-parameter signature the inputs must also agree with the
/// tuple-ness of `existing`, so a folded proposal can never leave the
/// collection with mixed shapes.
pub fn conform_inputs(sig: &FunctionSignature, existing: &DoctestCollection, inputs: Vec<Value>) -> Vec<Value> {
    let single = sig.call_shape() == CallShape::Single;
    let mut tuple_shape = existing.inputs().next().map(Value::is_tuple);

    inputs
        .into_iter()
        .map(|input| sig.normalize_input(input))
        .filter(|input| {
            if !sig.admits(input) {
                warn!(function = %sig.name, %input, "dropping input that does not fit the signature");
                return false;
            }
            if !single {
                return true;
            }
            match tuple_shape {
                Some(expected) if expected != input.is_tuple() => {
                    warn!(function = %sig.name, %input, "dropping input whose shape differs from the doctests");
                    false
                }
                Some(_) => true,
                None => {
                    tuple_shape = Some(input.is_tuple());
                    true
                }
            }
        })
        .collect()
}

/// Every input from `sources`, in consultation order, that is neither in
/// `existing` nor already emitted by this call.
///
/// Inputs may hold unhashable values, so this is a linear equality scan.
pub fn suggest(existing: &DoctestCollection, sources: &[&[Value]]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for source in sources {
        for input in source.iter() {
            if existing.contains_input(input) || out.contains(input) {
                continue;
            }
            out.push(input.clone());
        }
    }
    out
}

/// Pairs each input with the candidate's observed output (or `Error`),
/// keeping suggestion order.
pub fn materialize(
    sandbox: &dyn ExecutionSandbox,
    code: &CandidateCode,
    sig: &FunctionSignature,
    inputs: &[Value],
    policy: ConflictPolicy,
) -> Result<DoctestCollection, ExecutionError> {
    let observed = executor::observe(sandbox, code, sig, inputs)?;
    let collection = DoctestCollection::from_cases(observed, policy);
    debug!(function = %sig.name, cases = collection.len(), "materialized suggestions");
    Ok(collection)
}

/// User verdict on one proposed case.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewDecision {
    /// Keep the observed output.
    Accept,
    /// Replace it with the user's expected output.
    Override(Output),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldResult {
    pub folded: usize,
    /// No proposal was overridden, so the reviewed code already agrees with
    /// every case the user confirmed.
    pub all_accepted: bool,
}

/// Folds reviewed proposals into `collection`. Cases whose final output is
/// `Error` are not folded.
pub fn fold_reviewed(
    collection: &mut DoctestCollection,
    proposals: &[DoctestCase],
    decisions: &[ReviewDecision],
) -> Result<FoldResult, DoctestError> {
    if proposals.len() != decisions.len() {
        return Err(DoctestError::DecisionCount {
            expected: proposals.len(),
            found: decisions.len(),
        });
    }

    let mut folded = 0;
    let mut all_accepted = true;

    for (proposal, decision) in proposals.iter().zip(decisions) {
        let expected = match decision {
            ReviewDecision::Accept => proposal.expected.clone(),
            ReviewDecision::Override(output) => {
                all_accepted = false;
                output.clone()
            }
        };

        if expected.is_error() {
            continue;
        }

        if collection.insert(DoctestCase {
            input: proposal.input.clone(),
            expected,
        }) {
            folded += 1;
        }
    }

    Ok(FoldResult { folded, all_accepted })
}
