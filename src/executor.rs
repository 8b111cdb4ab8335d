//! Candidate executor.
//!
//! Runs candidate code against doctests through an [`ExecutionSandbox`] and
//! classifies each case. The sandbox decides where the code actually runs;
//! the classification rules live here.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::doctest::{DoctestCase, DoctestCollection, DoctestError, Output};
use crate::sandbox::SandboxError;
use crate::signature::{CallShape, FunctionSignature};
use crate::value::Value;

/// Source text of one candidate implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCode {
    pub function_name: String,
    pub source: String,
}

impl CandidateCode {
    pub fn new(function_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            source: source.into(),
        }
    }
}

impl fmt::Display for CandidateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// What happened when the candidate was defined.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Defined,
    /// The source did not compile or did not bind the function name.
    Invalid(String),
}

/// Raw outcome of one call.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Returned(Value),
    Raised(String),
}

/// Isolation boundary for running untrusted candidate code.
pub trait ExecutionSandbox {
    /// Defines the candidate in a fresh namespace without calling it.
    fn define(&self, code: &CandidateCode) -> Result<Definition, SandboxError>;

    /// Defines the candidate and calls it once per input, in order.
    fn invoke(
        &self,
        code: &CandidateCode,
        shape: CallShape,
        inputs: &[Value],
    ) -> Result<Vec<Invocation>, SandboxError>;
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Shape(#[from] DoctestError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("sandbox returned {found} results for {expected} inputs")]
    ResultCount { expected: usize, found: usize },
}

/// Per-case verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Pass,
    Fail(Value),
    Errored(String),
}

impl ExecutionResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, ExecutionResult::Pass)
    }

    /// Observed output, with any raise collapsed to the `Error` sentinel.
    pub fn actual(&self, expected: &Output) -> Output {
        match self {
            ExecutionResult::Pass => expected.clone(),
            ExecutionResult::Fail(v) => Output::Value(v.clone()),
            ExecutionResult::Errored(_) => Output::Error,
        }
    }
}

/// A non-passing case with both sides of the disagreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCase {
    pub input: Value,
    pub expected: Output,
    pub actual: Output,
}

impl fmt::Display for FailedCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input {} expected {} but got {}",
            self.input, self.expected, self.actual
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub results: Vec<(DoctestCase, ExecutionResult)>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|(_, r)| r.is_pass())
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|(_, r)| !r.is_pass()).count()
    }

    pub fn failed_cases(&self) -> Vec<FailedCase> {
        self.results
            .iter()
            .filter(|(_, r)| !r.is_pass())
            .map(|(case, r)| FailedCase {
                input: case.input.clone(),
                expected: case.expected.clone(),
                actual: r.actual(&case.expected),
            })
            .collect()
    }

    /// The two parallel views of the failed set: `(input, expected)` and
    /// `(input, actual)`, same cases in the same order.
    pub fn split(&self) -> (Vec<(Value, Output)>, Vec<(Value, Output)>) {
        self.failed_cases()
            .into_iter()
            .map(|f| ((f.input.clone(), f.expected), (f.input, f.actual)))
            .unzip()
    }
}

fn classify(expected: &Output, invocation: Invocation) -> ExecutionResult {
    match (expected, invocation) {
        (Output::Error, Invocation::Raised(_)) => ExecutionResult::Pass,
        (Output::Value(_), Invocation::Raised(msg)) => ExecutionResult::Errored(msg),
        (Output::Value(want), Invocation::Returned(got)) if *want == got => ExecutionResult::Pass,
        (_, Invocation::Returned(got)) => ExecutionResult::Fail(got),
    }
}

/// Runs the whole collection and classifies every case. An empty
/// collection returns an empty report without touching the sandbox.
pub fn run(
    sandbox: &dyn ExecutionSandbox,
    code: &CandidateCode,
    sig: &FunctionSignature,
    doctests: &DoctestCollection,
) -> Result<RunReport, ExecutionError> {
    if doctests.is_empty() {
        return Ok(RunReport::default());
    }

    doctests.validate(sig)?;

    let inputs: Vec<Value> = doctests.inputs().cloned().collect();
    let invocations = invoke_checked(sandbox, code, sig.call_shape(), &inputs)?;

    let results: Vec<(DoctestCase, ExecutionResult)> = doctests
        .iter()
        .cloned()
        .zip(invocations)
        .map(|(case, inv)| {
            let verdict = classify(&case.expected, inv);
            (case, verdict)
        })
        .collect();

    let report = RunReport { results };
    debug!(
        function = %code.function_name,
        cases = doctests.len(),
        failed = report.failed_count(),
        "doctest run finished"
    );
    Ok(report)
}

/// Calls the candidate on each input and records what it returns or
/// that it raised, without comparing to anything.
pub fn observe(
    sandbox: &dyn ExecutionSandbox,
    code: &CandidateCode,
    sig: &FunctionSignature,
    inputs: &[Value],
) -> Result<Vec<DoctestCase>, ExecutionError> {
    if inputs.is_empty() {
        return Ok(Vec::new());
    }

    let invocations = invoke_checked(sandbox, code, sig.call_shape(), inputs)?;
    Ok(inputs
        .iter()
        .cloned()
        .zip(invocations)
        .map(|(input, inv)| match inv {
            Invocation::Returned(v) => DoctestCase::new(input, v),
            Invocation::Raised(_) => DoctestCase::raising(input),
        })
        .collect())
}

fn invoke_checked(
    sandbox: &dyn ExecutionSandbox,
    code: &CandidateCode,
    shape: CallShape,
    inputs: &[Value],
) -> Result<Vec<Invocation>, ExecutionError> {
    let invocations = sandbox.invoke(code, shape, inputs)?;
    if invocations.len() != inputs.len() {
        return Err(ExecutionError::ResultCount {
            expected: inputs.len(),
            found: invocations.len(),
        });
    }
    Ok(invocations)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::doctest::ConflictPolicy;

    /// Multiplies spread integer pairs; raises on (0, 0).
    struct Multiplier {
        calls: Cell<usize>,
    }

    impl ExecutionSandbox for Multiplier {
        fn define(&self, _code: &CandidateCode) -> Result<Definition, SandboxError> {
            Ok(Definition::Defined)
        }

        fn invoke(
            &self,
            _code: &CandidateCode,
            _shape: CallShape,
            inputs: &[Value],
        ) -> Result<Vec<Invocation>, SandboxError> {
            self.calls.set(self.calls.get() + 1);
            Ok(inputs
                .iter()
                .map(|input| match input.as_tuple() {
                    Some([Value::Int(0), Value::Int(0)]) => Invocation::Raised("ZeroDivisionError".into()),
                    Some([Value::Int(a), Value::Int(b)]) => Invocation::Returned(Value::Int(a * b)),
                    _ => Invocation::Raised("TypeError".into()),
                })
                .collect())
        }
    }

    fn pair(a: i64, b: i64) -> Value {
        Value::tuple([Value::Int(a), Value::Int(b)])
    }

    fn sig() -> FunctionSignature {
        FunctionSignature::parse("multiply(a: int, b: int) -> int").unwrap()
    }

    fn code() -> CandidateCode {
        CandidateCode::new("multiply", "def multiply(a, b): return a*b")
    }

    #[test]
    fn empty_collection_short_circuits() {
        let sandbox = Multiplier { calls: Cell::new(0) };
        let report = run(&sandbox, &code(), &sig(), &DoctestCollection::default()).unwrap();
        let (expected, actual) = report.split();
        assert!(expected.is_empty() && actual.is_empty());
        assert_eq!(sandbox.calls.get(), 0);
    }

    #[test]
    fn classifies_fail_and_error() {
        let sandbox = Multiplier { calls: Cell::new(0) };
        let doctests = DoctestCollection::from_cases(
            [
                DoctestCase::new(pair(2, 3), Value::Int(6)),
                DoctestCase::new(pair(2, 2), Value::Int(5)),
                DoctestCase::new(pair(0, 0), Value::Int(0)),
                DoctestCase::raising(pair(0, 0).clone()),
            ],
            ConflictPolicy::FirstWins,
        );
        let report = run(&sandbox, &code(), &sig(), &doctests).unwrap();

        assert_eq!(report.failed_count(), 2);
        let (expected, actual) = report.split();
        assert_eq!(expected[0], (pair(2, 2), Output::Value(Value::Int(5))));
        assert_eq!(actual[0], (pair(2, 2), Output::Value(Value::Int(4))));
        assert_eq!(expected[1], (pair(0, 0), Output::Value(Value::Int(0))));
        assert_eq!(actual[1], (pair(0, 0), Output::Error));
        assert_eq!(actual[1].1.to_string(), "Error");
    }

    #[test]
    fn expected_raise_passes_when_candidate_raises() {
        let sandbox = Multiplier { calls: Cell::new(0) };
        let doctests = DoctestCollection::from_cases([DoctestCase::raising(pair(0, 0))], ConflictPolicy::LastWins);
        assert!(run(&sandbox, &code(), &sig(), &doctests).unwrap().passed());
    }

    #[test]
    fn mis_shaped_collection_is_rejected_before_invocation() {
        let sandbox = Multiplier { calls: Cell::new(0) };
        let doctests = DoctestCollection::from_cases([DoctestCase::new(Value::Int(3), Value::Int(3))], ConflictPolicy::LastWins);
        let err = run(&sandbox, &code(), &sig(), &doctests).unwrap_err();
        assert!(matches!(err, ExecutionError::Shape(DoctestError::ShapeMismatch { .. })));
        assert_eq!(sandbox.calls.get(), 0);
    }

    #[test]
    fn observe_pairs_inputs_with_outputs_in_order() {
        let sandbox = Multiplier { calls: Cell::new(0) };
        let cases = observe(&sandbox, &code(), &sig(), &[pair(4, 5), pair(0, 0)]).unwrap();
        assert_eq!(cases[0], DoctestCase::new(pair(4, 5), Value::Int(20)));
        assert_eq!(cases[1], DoctestCase::raising(pair(0, 0)));
    }
}
