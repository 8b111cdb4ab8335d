//! In-memory stand-ins for the interpreter and the model.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use specloop::doctest::{ConflictPolicy, DoctestCase, DoctestCollection};
use specloop::executor::{CandidateCode, Definition, ExecutionSandbox, FailedCase, Invocation};
use specloop::sandbox::SandboxError;
use specloop::signature::{CallShape, FunctionSignature};
use specloop::synth::{InputSuggester, SynthesisError, Synthesizer};
use specloop::value::Value;

pub const MUL: &str = "def multiply(a, b):\n    return a * b";
pub const ADD: &str = "def multiply(a, b):\n    return a + b";
pub const OFF_BY_ONE: &str = "def multiply(a, b):\n    return a * b - 1";
/// Multiplies, but refuses zero.
pub const GUARDED: &str = "def multiply(a, b):\n    assert a and b\n    return a * b";
pub const BROKEN: &str = "def multiply(a, b)\n    return a * b";

pub fn sig() -> FunctionSignature {
    FunctionSignature::parse("multiply(a: int, b: int) -> int").unwrap()
}

pub fn pair(a: i64, b: i64) -> Value {
    Value::tuple([Value::Int(a), Value::Int(b)])
}

pub fn case(a: i64, b: i64, out: i64) -> DoctestCase {
    DoctestCase::new(pair(a, b), Value::Int(out))
}

pub fn collection(cases: impl IntoIterator<Item = DoctestCase>) -> DoctestCollection {
    DoctestCollection::from_cases(cases, ConflictPolicy::LastWins)
}

pub fn code(source: &str) -> CandidateCode {
    CandidateCode::new("multiply", source)
}

/// Interprets the handful of sources above by text.
#[derive(Default)]
pub struct FakeSandbox {
    pub invocations: Cell<usize>,
}

impl ExecutionSandbox for FakeSandbox {
    fn define(&self, code: &CandidateCode) -> Result<Definition, SandboxError> {
        Ok(if code.source == BROKEN {
            Definition::Invalid("SyntaxError: expected ':'".into())
        } else {
            Definition::Defined
        })
    }

    fn invoke(&self, code: &CandidateCode, _shape: CallShape, inputs: &[Value]) -> Result<Vec<Invocation>, SandboxError> {
        if code.source == BROKEN {
            return Err(SandboxError::Undefined("SyntaxError: expected ':'".into()));
        }
        self.invocations.set(self.invocations.get() + 1);

        Ok(inputs
            .iter()
            .map(|input| {
                let Some([Value::Int(a), Value::Int(b)]) = input.as_tuple() else {
                    return Invocation::Raised("TypeError: bad operands".into());
                };
                let (a, b) = (*a, *b);
                match code.source.as_str() {
                    ADD => Invocation::Returned(Value::Int(a + b)),
                    OFF_BY_ONE => Invocation::Returned(Value::Int(a * b - 1)),
                    GUARDED if a == 0 || b == 0 => Invocation::Raised("AssertionError: ".into()),
                    _ => Invocation::Returned(Value::Int(a * b)),
                }
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Synthesize,
    Regenerate {
        doctests: DoctestCollection,
        failing: Vec<FailedCase>,
    },
    Repair {
        previous: CandidateCode,
    },
    RefuteVariant,
    Suggest,
}

/// Hands out scripted sources in order and repeats the last one.
pub struct ScriptedSynth {
    sources: RefCell<Vec<&'static str>>,
    pub calls: RefCell<Vec<Call>>,
    pub suggestions: Vec<Value>,
    pub refutations: Vec<Value>,
}

impl ScriptedSynth {
    pub fn new(sources: &[&'static str]) -> Self {
        Self {
            sources: RefCell::new(sources.iter().rev().copied().collect()),
            calls: RefCell::new(Vec::new()),
            suggestions: Vec::new(),
            refutations: Vec::new(),
        }
    }

    pub fn suggesting(mut self, inputs: Vec<Value>) -> Self {
        self.suggestions = inputs;
        self
    }

    pub fn refuting(mut self, inputs: Vec<Value>) -> Self {
        self.refutations = inputs;
        self
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    fn next(&self, call: Call) -> Result<CandidateCode, SynthesisError> {
        self.calls.borrow_mut().push(call);
        let mut sources = self.sources.borrow_mut();
        let source = if sources.len() > 1 { sources.pop() } else { sources.last().copied() };
        source.map(code).ok_or(SynthesisError::NoFunction)
    }
}

impl Synthesizer for ScriptedSynth {
    fn synthesize(&self, _: &FunctionSignature, _: &str, _: &DoctestCollection) -> Result<CandidateCode, SynthesisError> {
        self.next(Call::Synthesize)
    }

    fn regenerate(
        &self,
        _: &CandidateCode,
        doctests: &DoctestCollection,
        failing: &[FailedCase],
    ) -> Result<CandidateCode, SynthesisError> {
        self.next(Call::Regenerate {
            doctests: doctests.clone(),
            failing: failing.to_vec(),
        })
    }

    fn repair(&self, previous: &CandidateCode, _: &DoctestCollection) -> Result<CandidateCode, SynthesisError> {
        self.next(Call::Repair {
            previous: previous.clone(),
        })
    }

    fn refute_variant(&self, _: &CandidateCode, _: &DoctestCollection) -> Result<Vec<Value>, SynthesisError> {
        self.calls.borrow_mut().push(Call::RefuteVariant);
        Ok(self.refutations.clone())
    }
}

impl InputSuggester for ScriptedSynth {
    fn suggest_inputs(&self, _: &FunctionSignature, _: &str) -> Result<Vec<Value>, SynthesisError> {
        self.calls.borrow_mut().push(Call::Suggest);
        Ok(self.suggestions.clone())
    }
}
