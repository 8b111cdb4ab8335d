//! Code synthesis and input suggestion capabilities.

use thiserror::Error;
use tracing::{debug, warn};

use crate::doctest::DoctestCollection;
use crate::executor::{CandidateCode, FailedCase};
use crate::llm::extract::{extract_function_code, extract_input_list};
use crate::llm::{prompt, ChatBackend, LlmError, LlmPrompt};
use crate::signature::FunctionSignature;
use crate::value::Value;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("reply contained no function definition")]
    NoFunction,
}

/// Produces candidate source text.
pub trait Synthesizer {
    fn synthesize(
        &self,
        sig: &FunctionSignature,
        docstring: &str,
        doctests: &DoctestCollection,
    ) -> Result<CandidateCode, SynthesisError>;

    /// Revises `previous` given the whole collection and the cases it failed.
    fn regenerate(
        &self,
        previous: &CandidateCode,
        doctests: &DoctestCollection,
        failing: &[FailedCase],
    ) -> Result<CandidateCode, SynthesisError>;

    /// Rewrites `previous`, which is known to be wrong, against corrected
    /// doctests.
    fn repair(&self, previous: &CandidateCode, doctests: &DoctestCollection) -> Result<CandidateCode, SynthesisError>;

    /// New candidate inputs meant to challenge `previous`. Returns inputs,
    /// never code.
    fn refute_variant(&self, previous: &CandidateCode, doctests: &DoctestCollection) -> Result<Vec<Value>, SynthesisError>;
}

/// Proposes inputs (without outputs) from the signature and docstring.
pub trait InputSuggester {
    fn suggest_inputs(&self, sig: &FunctionSignature, docstring: &str) -> Result<Vec<Value>, SynthesisError>;
}

/// Synthesizer backed by a chat model.
pub struct LlmSynthesizer<B> {
    backend: B,
}

impl<B: ChatBackend> LlmSynthesizer<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    fn code(&self, function_name: &str, prompt: LlmPrompt) -> Result<CandidateCode, SynthesisError> {
        let reply = self.backend.complete(&prompt)?;
        let source = extract_function_code(&reply).ok_or_else(|| {
            warn!(function = function_name, "reply had no function definition");
            SynthesisError::NoFunction
        })?;
        debug!(function = function_name, lines = source.lines().count(), "candidate extracted");
        Ok(CandidateCode::new(function_name, source))
    }

    fn inputs(&self, prompt: LlmPrompt) -> Result<Vec<Value>, SynthesisError> {
        let reply = self.backend.complete(&prompt)?;
        Ok(extract_input_list(&reply))
    }
}

impl<B: ChatBackend> Synthesizer for LlmSynthesizer<B> {
    fn synthesize(
        &self,
        sig: &FunctionSignature,
        docstring: &str,
        doctests: &DoctestCollection,
    ) -> Result<CandidateCode, SynthesisError> {
        self.code(&sig.name, prompt::synthesis(sig, docstring, doctests))
    }

    fn regenerate(
        &self,
        previous: &CandidateCode,
        doctests: &DoctestCollection,
        failing: &[FailedCase],
    ) -> Result<CandidateCode, SynthesisError> {
        self.code(&previous.function_name, prompt::regeneration(previous, doctests, failing))
    }

    fn repair(&self, previous: &CandidateCode, doctests: &DoctestCollection) -> Result<CandidateCode, SynthesisError> {
        self.code(&previous.function_name, prompt::repair(previous, doctests))
    }

    fn refute_variant(&self, previous: &CandidateCode, doctests: &DoctestCollection) -> Result<Vec<Value>, SynthesisError> {
        self.inputs(prompt::refutation(previous, doctests))
    }
}

impl<B: ChatBackend> InputSuggester for LlmSynthesizer<B> {
    fn suggest_inputs(&self, sig: &FunctionSignature, docstring: &str) -> Result<Vec<Value>, SynthesisError> {
        self.inputs(prompt::suggestion(sig, docstring))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::doctest::{ConflictPolicy, DoctestCase};

    /// Replays canned replies and records the prompts it saw.
    struct Canned {
        replies: RefCell<Vec<String>>,
        seen: RefCell<Vec<LlmPrompt>>,
    }

    impl Canned {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: RefCell::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChatBackend for Canned {
        fn complete(&self, prompt: &LlmPrompt) -> Result<String, LlmError> {
            self.seen.borrow_mut().push(prompt.clone());
            self.replies
                .borrow_mut()
                .pop()
                .ok_or_else(|| LlmError::Malformed("no canned reply".into()))
        }
    }

    fn sig() -> FunctionSignature {
        FunctionSignature::parse("multiply(a: int, b: int) -> int").unwrap()
    }

    #[test]
    fn synthesize_names_the_candidate_after_the_signature() {
        let synth = LlmSynthesizer::new(Canned::new(&["```python\ndef multiply(a, b):\n    return a * b\n```"]));
        let code = synth.synthesize(&sig(), "", &DoctestCollection::default()).unwrap();
        assert_eq!(code.function_name, "multiply");
        assert!(code.source.starts_with("def multiply"));
    }

    #[test]
    fn prose_reply_is_no_function() {
        let synth = LlmSynthesizer::new(Canned::new(&["I am unable to help."]));
        let err = synth.synthesize(&sig(), "", &DoctestCollection::default()).unwrap_err();
        assert!(matches!(err, SynthesisError::NoFunction));
    }

    #[test]
    fn refute_variant_returns_inputs() {
        let backend = Canned::new(&["[(0, 0), (-1, 2)]"]);
        let synth = LlmSynthesizer::new(&backend);
        let previous = CandidateCode::new("multiply", "def multiply(a, b): return a*b");
        let doctests = DoctestCollection::from_cases(
            [DoctestCase::new(Value::tuple([Value::Int(2), Value::Int(3)]), Value::Int(6))],
            ConflictPolicy::LastWins,
        );
        let inputs = synth.refute_variant(&previous, &doctests).unwrap();
        assert_eq!(inputs.len(), 2);
        assert!(backend.seen.borrow()[0].user.contains("((2, 3), 6)"));
    }

    #[test]
    fn transport_failure_propagates() {
        let synth = LlmSynthesizer::new(Canned::new(&[]));
        assert!(matches!(
            synth.suggest_inputs(&sig(), "doc"),
            Err(SynthesisError::Llm(LlmError::Malformed(_)))
        ));
    }
}
