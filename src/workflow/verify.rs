//! Verification loop and the syntax acquisition sub-loop.

use std::fmt;

use tracing::{debug, info, warn};

use crate::doctest::{DoctestCollection, Output};
use crate::executor::{self, CandidateCode, Definition, ExecutionError, ExecutionSandbox, FailedCase};
use crate::sandbox::SandboxError;
use crate::signature::FunctionSignature;
use crate::synth::{SynthesisError, Synthesizer};
use crate::workflow::ledger::AccuracyLedger;
use crate::workflow::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Generating,
    Executing,
    Succeeded,
    Exhausted,
    SynthesisFailed,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LoopState::Succeeded | LoopState::Exhausted | LoopState::SynthesisFailed
        )
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Generating => "generating",
            LoopState::Executing => "executing",
            LoopState::Succeeded => "succeeded",
            LoopState::Exhausted => "exhausted",
            LoopState::SynthesisFailed => "synthesis-failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Total verification attempts, the first generation included.
    pub attempts: usize,
    /// Tries per syntax acquisition.
    pub syntax_attempts: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            attempts: 5,
            syntax_attempts: 3,
        }
    }
}

/// Where the first candidate of a verification run comes from.
#[derive(Debug, Clone, Copy)]
pub enum Seed<'a> {
    /// Synthesize from the signature, docstring and doctests.
    Fresh,
    /// Rewrite code that the doctests have shown to be wrong.
    Repair(&'a CandidateCode),
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Succeeded {
        code: CandidateCode,
        attempts: usize,
        ledger: AccuracyLedger,
    },
    Exhausted {
        ledger: AccuracyLedger,
    },
    SynthesisFailed {
        ledger: AccuracyLedger,
    },
}

impl VerifyOutcome {
    pub fn state(&self) -> LoopState {
        match self {
            VerifyOutcome::Succeeded { .. } => LoopState::Succeeded,
            VerifyOutcome::Exhausted { .. } => LoopState::Exhausted,
            VerifyOutcome::SynthesisFailed { .. } => LoopState::SynthesisFailed,
        }
    }

    pub fn ledger(&self) -> &AccuracyLedger {
        match self {
            VerifyOutcome::Succeeded { ledger, .. }
            | VerifyOutcome::Exhausted { ledger }
            | VerifyOutcome::SynthesisFailed { ledger } => ledger,
        }
    }
}

struct Run {
    state: LoopState,
    attempts: usize,
    ledger: AccuracyLedger,
    current: Option<CandidateCode>,
    failing: Vec<FailedCase>,
}

impl Run {
    fn finish(self) -> VerifyOutcome {
        match (self.state, self.current) {
            (LoopState::Succeeded, Some(code)) => VerifyOutcome::Succeeded {
                code,
                attempts: self.attempts,
                ledger: self.ledger,
            },
            (LoopState::Exhausted, _) => VerifyOutcome::Exhausted { ledger: self.ledger },
            _ => VerifyOutcome::SynthesisFailed { ledger: self.ledger },
        }
    }
}

fn transition(run: &mut Run, next: LoopState) {
    debug!(from = %run.state, to = %next, attempt = run.attempts, "verification transition");
    run.state = next;
}

pub struct Verifier<'a> {
    synth: &'a dyn Synthesizer,
    sandbox: &'a dyn ExecutionSandbox,
    limits: Limits,
}

impl<'a> Verifier<'a> {
    pub fn new(synth: &'a dyn Synthesizer, sandbox: &'a dyn ExecutionSandbox, limits: Limits) -> Self {
        Self { synth, sandbox, limits }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Syntax acquisition: asks `generate` for a candidate until one defines
    /// cleanly, at most `syntax_attempts` times. `None` on exhaustion.
    pub fn acquire(
        &self,
        mut generate: impl FnMut() -> Result<CandidateCode, SynthesisError>,
    ) -> Result<Option<CandidateCode>, WorkflowError> {
        let tries = self.limits.syntax_attempts.max(1);
        for attempt in 1..=tries {
            let code = match generate() {
                Ok(code) => code,
                Err(e) => {
                    warn!(attempt, error = %e, "synthesizer produced no candidate");
                    continue;
                }
            };

            if self.defines(&code)? {
                debug!(attempt, function = %code.function_name, "candidate acquired");
                return Ok(Some(code));
            }
        }

        warn!(tries, "no definable candidate after syntax acquisition");
        Ok(None)
    }

    fn defines(&self, code: &CandidateCode) -> Result<bool, WorkflowError> {
        match self.sandbox.define(code) {
            Ok(Definition::Defined) => Ok(true),
            Ok(Definition::Invalid(reason)) => {
                warn!(function = %code.function_name, %reason, "candidate does not define");
                Ok(false)
            }
            Err(SandboxError::Timeout(limit)) => {
                warn!(function = %code.function_name, ?limit, "candidate hangs at definition time");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Runs the loop to a terminal state. Every attempt is checked against
    /// the whole collection.
    pub fn verify(
        &self,
        sig: &FunctionSignature,
        docstring: &str,
        doctests: &DoctestCollection,
        seed: Seed<'_>,
    ) -> Result<VerifyOutcome, WorkflowError> {
        doctests.validate(sig)?;

        let mut run = Run {
            state: LoopState::Generating,
            attempts: 0,
            ledger: AccuracyLedger::default(),
            current: None,
            failing: Vec::new(),
        };

        while !run.state.is_terminal() {
            match run.state {
                LoopState::Generating => self.generate(&mut run, sig, docstring, doctests, seed)?,
                LoopState::Executing => self.execute(&mut run, sig, doctests)?,
                _ => {}
            }
        }

        let outcome = run.finish();
        info!(
            function = %sig.name,
            state = %outcome.state(),
            candidates = outcome.ledger().len(),
            "verification finished"
        );
        Ok(outcome)
    }

    fn generate(
        &self,
        run: &mut Run,
        sig: &FunctionSignature,
        docstring: &str,
        doctests: &DoctestCollection,
        seed: Seed<'_>,
    ) -> Result<(), WorkflowError> {
        let next = match (&run.current, seed) {
            (None, Seed::Fresh) => self.acquire(|| self.synth.synthesize(sig, docstring, doctests))?,
            (None, Seed::Repair(previous)) => self.acquire(|| self.synth.repair(previous, doctests))?,
            (Some(previous), _) => match self.synth.regenerate(previous, doctests, &run.failing) {
                Ok(code) => self.defines(&code)?.then_some(code),
                Err(e) => {
                    warn!(error = %e, "regeneration failed");
                    None
                }
            },
        };

        match next {
            Some(code) => {
                run.current = Some(code);
                transition(run, LoopState::Executing);
            }
            None => transition(run, LoopState::SynthesisFailed),
        }
        Ok(())
    }

    fn execute(&self, run: &mut Run, sig: &FunctionSignature, doctests: &DoctestCollection) -> Result<(), WorkflowError> {
        let Some(code) = run.current.as_ref() else {
            transition(run, LoopState::SynthesisFailed);
            return Ok(());
        };
        run.attempts += 1;

        let failing = match executor::run(self.sandbox, code, sig, doctests) {
            Ok(report) => report.failed_cases(),
            Err(ExecutionError::Sandbox(e @ (SandboxError::Timeout(_) | SandboxError::Undefined(_)))) => {
                warn!(error = %e, "candidate run aborted; counting every case as failed");
                doctests
                    .iter()
                    .map(|case| FailedCase {
                        input: case.input.clone(),
                        expected: case.expected.clone(),
                        actual: Output::Error,
                    })
                    .collect()
            }
            Err(e) => return Err(e.into()),
        };

        if failing.is_empty() {
            transition(run, LoopState::Succeeded);
            return Ok(());
        }

        info!(attempt = run.attempts, failed = failing.len(), total = doctests.len(), "candidate failed doctests");
        run.ledger.record(code.clone(), failing.len());
        run.failing = failing;

        let next = if run.attempts >= self.limits.attempts.max(1) {
            LoopState::Exhausted
        } else {
            LoopState::Generating
        };
        transition(run, next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::doctest::{ConflictPolicy, DoctestCase};
    use crate::executor::Invocation;
    use crate::signature::CallShape;
    use crate::value::Value;

    /// Evaluates the candidates `a*b`, `a+b` and `bad` by source text.
    struct Arith;

    impl ExecutionSandbox for Arith {
        fn define(&self, code: &CandidateCode) -> Result<Definition, SandboxError> {
            Ok(if code.source.contains("bad") {
                Definition::Invalid("SyntaxError".into())
            } else {
                Definition::Defined
            })
        }

        fn invoke(&self, code: &CandidateCode, _shape: CallShape, inputs: &[Value]) -> Result<Vec<Invocation>, SandboxError> {
            Ok(inputs
                .iter()
                .map(|i| match i.as_tuple() {
                    Some([Value::Int(a), Value::Int(b)]) if code.source.contains("a*b") => Invocation::Returned(Value::Int(a * b)),
                    Some([Value::Int(a), Value::Int(b)]) => Invocation::Returned(Value::Int(a + b)),
                    _ => Invocation::Raised("TypeError".into()),
                })
                .collect())
        }
    }

    /// Hands out scripted sources in order; repeats the last one.
    struct Script {
        sources: RefCell<Vec<&'static str>>,
        calls: RefCell<Vec<&'static str>>,
    }

    impl Script {
        fn new(sources: &[&'static str]) -> Self {
            Self {
                sources: RefCell::new(sources.iter().rev().copied().collect()),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn next(&self, call: &'static str) -> Result<CandidateCode, SynthesisError> {
            self.calls.borrow_mut().push(call);
            let mut sources = self.sources.borrow_mut();
            let src = if sources.len() > 1 { sources.pop() } else { sources.last().copied() };
            src.map(|s| CandidateCode::new("multiply", s)).ok_or(SynthesisError::NoFunction)
        }
    }

    impl Synthesizer for Script {
        fn synthesize(&self, _: &FunctionSignature, _: &str, _: &DoctestCollection) -> Result<CandidateCode, SynthesisError> {
            self.next("synthesize")
        }
        fn regenerate(&self, _: &CandidateCode, _: &DoctestCollection, _: &[FailedCase]) -> Result<CandidateCode, SynthesisError> {
            self.next("regenerate")
        }
        fn repair(&self, _: &CandidateCode, _: &DoctestCollection) -> Result<CandidateCode, SynthesisError> {
            self.next("repair")
        }
        fn refute_variant(&self, _: &CandidateCode, _: &DoctestCollection) -> Result<Vec<Value>, SynthesisError> {
            Ok(Vec::new())
        }
    }

    fn sig() -> FunctionSignature {
        FunctionSignature::parse("multiply(a: int, b: int) -> int").unwrap()
    }

    fn seed() -> DoctestCollection {
        DoctestCollection::from_cases(
            [DoctestCase::new(Value::tuple([Value::Int(2), Value::Int(3)]), Value::Int(6))],
            ConflictPolicy::LastWins,
        )
    }

    #[test]
    fn acquisition_retries_undefinable_candidates() {
        let synth = Script::new(&["bad", "bad", "return a*b"]);
        let verifier = Verifier::new(&synth, &Arith, Limits::default());
        let got = verifier.acquire(|| synth.synthesize(&sig(), "", &seed())).unwrap();
        assert_eq!(got.map(|c| c.source), Some("return a*b".to_string()));
    }

    #[test]
    fn acquisition_gives_up_after_three() {
        let synth = Script::new(&["bad"]);
        let verifier = Verifier::new(&synth, &Arith, Limits::default());
        assert!(verifier.acquire(|| synth.synthesize(&sig(), "", &seed())).unwrap().is_none());
        assert_eq!(synth.calls.borrow().len(), 3);
    }

    #[test]
    fn repair_seed_starts_from_repair() {
        let synth = Script::new(&["return a*b"]);
        let verifier = Verifier::new(&synth, &Arith, Limits::default());
        let wrong = CandidateCode::new("multiply", "return a+b");
        let outcome = verifier.verify(&sig(), "", &seed(), Seed::Repair(&wrong)).unwrap();
        assert_eq!(outcome.state(), LoopState::Succeeded);
        assert_eq!(*synth.calls.borrow(), vec!["repair"]);
    }

    #[test]
    fn undefinable_regeneration_is_synthesis_failure() {
        let synth = Script::new(&["return a+b", "bad"]);
        let verifier = Verifier::new(&synth, &Arith, Limits::default());
        let outcome = verifier.verify(&sig(), "", &seed(), Seed::Fresh).unwrap();
        assert_eq!(outcome.state(), LoopState::SynthesisFailed);
        assert_eq!(outcome.ledger().failures_for("return a+b"), Some(1));
    }

    #[test]
    fn attempt_bound_is_configurable() {
        let synth = Script::new(&["return a+b"]);
        let limits = Limits { attempts: 2, syntax_attempts: 3 };
        let verifier = Verifier::new(&synth, &Arith, limits);
        let outcome = verifier.verify(&sig(), "", &seed(), Seed::Fresh).unwrap();
        assert_eq!(outcome.state(), LoopState::Exhausted);
        assert_eq!(*synth.calls.borrow(), vec!["synthesize", "regenerate"]);
    }
}
