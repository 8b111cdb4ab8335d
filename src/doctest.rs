//! Doctest cases and collections.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::literal::{parse_literal, LiteralError};
use crate::signature::{CallShape, FunctionSignature};
use crate::value::Value;

/// Text that marks an expected (or observed) raise.
pub const ERROR_SENTINEL: &str = "Error";

#[derive(Debug, Error, PartialEq)]
pub enum DoctestError {
    #[error("no doctests were provided")]
    NoCases,
    #[error("doctest {index}: bad input: {source}")]
    BadInput {
        index: usize,
        #[source]
        source: LiteralError,
    },
    #[error("doctest {index}: bad output: {source}")]
    BadOutput {
        index: usize,
        #[source]
        source: LiteralError,
    },
    #[error("doctest {0:?} has no `=>` between input and output")]
    MissingArrow(String),
    #[error("doctest {index}: input {found} does not fit {expected}")]
    ShapeMismatch {
        index: usize,
        expected: CallShape,
        found: String,
    },
    #[error("doctest inputs mix tuple and non-tuple shapes")]
    MixedShapes,
    #[error("expected {expected} review decisions, got {found}")]
    DecisionCount { expected: usize, found: usize },
}

/// Expected or observed result of one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Output {
    Value(Value),
    /// The call raises.
    Error,
}

impl Output {
    pub fn is_error(&self) -> bool {
        matches!(self, Output::Error)
    }

    /// Parses user-authored output text. `Error` denotes a raise; for
    /// `str`-returning functions anything but a quoted string literal is
    /// taken verbatim.
    pub fn parse(text: &str, returns_str: bool) -> Result<Self, LiteralError> {
        let trimmed = text.trim();
        if trimmed == ERROR_SENTINEL {
            return Ok(Output::Error);
        }

        match parse_literal(trimmed) {
            Ok(Value::Str(s)) => Ok(Output::Value(Value::Str(s))),
            _ if returns_str => Ok(Output::Value(Value::Str(trimmed.to_string()))),
            Ok(v) => Ok(Output::Value(v)),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Value(v) => write!(f, "{v}"),
            Output::Error => f.write_str(ERROR_SENTINEL),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctestCase {
    pub input: Value,
    pub expected: Output,
}

impl DoctestCase {
    pub fn new(input: Value, expected: Value) -> Self {
        Self {
            input,
            expected: Output::Value(expected),
        }
    }

    pub fn raising(input: Value) -> Self {
        Self {
            input,
            expected: Output::Error,
        }
    }
}

impl fmt::Display for DoctestCase {
    /// Python tuple form `(input, output)`, as shown to the model.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expected {
            Output::Value(v) => write!(f, "({}, {})", self.input, v),
            Output::Error => write!(f, "({}, '{}')", self.input, ERROR_SENTINEL),
        }
    }
}

/// Resolution for two cases with equal inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The newer expected output replaces the older one in place.
    #[default]
    LastWins,
    /// The first accepted expected output is kept.
    FirstWins,
}

/// Ordered doctests with set semantics on the input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoctestCollection {
    cases: Vec<DoctestCase>,
    #[serde(default)]
    policy: ConflictPolicy,
}

impl DoctestCollection {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            cases: Vec::new(),
            policy,
        }
    }

    pub fn from_cases(cases: impl IntoIterator<Item = DoctestCase>, policy: ConflictPolicy) -> Self {
        let mut out = Self::new(policy);
        out.extend(cases);
        out
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Adds a case, resolving an input collision by the policy.
    /// Returns true when the collection changed.
    pub fn insert(&mut self, case: DoctestCase) -> bool {
        match self.cases.iter_mut().find(|c| c.input == case.input) {
            None => {
                self.cases.push(case);
                true
            }
            Some(existing) => match self.policy {
                ConflictPolicy::LastWins if existing.expected != case.expected => {
                    existing.expected = case.expected;
                    true
                }
                _ => false,
            },
        }
    }

    pub fn extend(&mut self, cases: impl IntoIterator<Item = DoctestCase>) {
        for case in cases {
            self.insert(case);
        }
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DoctestCase> {
        self.cases.iter()
    }

    pub fn cases(&self) -> &[DoctestCase] {
        &self.cases
    }

    pub fn contains_input(&self, input: &Value) -> bool {
        self.cases.iter().any(|c| &c.input == input)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Value> {
        self.cases.iter().map(|c| &c.input)
    }

    /// Every input of `other` is present here.
    pub fn covers(&self, other: &DoctestCollection) -> bool {
        other.inputs().all(|i| self.contains_input(i))
    }

    /// Checks every input against the signature's declared shape. A
    /// single-parameter collection must also be uniformly tuple or
    /// non-tuple.
    pub fn validate(&self, sig: &FunctionSignature) -> Result<(), DoctestError> {
        let shape = sig.call_shape();
        for (index, case) in self.cases.iter().enumerate() {
            if !sig.admits(&case.input) {
                return Err(DoctestError::ShapeMismatch {
                    index,
                    expected: shape,
                    found: case.input.to_string(),
                });
            }
        }

        if shape == CallShape::Single {
            let tuples = self.cases.iter().filter(|c| c.input.is_tuple()).count();
            if tuples != 0 && tuples != self.cases.len() {
                return Err(DoctestError::MixedShapes);
            }
        }
        Ok(())
    }

    /// Python list-of-tuples rendering used in prompts.
    pub fn render(&self) -> String {
        render_cases(&self.cases)
    }
}

impl<'a> IntoIterator for &'a DoctestCollection {
    type Item = &'a DoctestCase;
    type IntoIter = std::slice::Iter<'a, DoctestCase>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.iter()
    }
}

pub fn render_cases<'a>(cases: impl IntoIterator<Item = &'a DoctestCase>) -> String {
    let parts: Vec<String> = cases.into_iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

/// Parses user-authored `(input, output)` text pairs. Any malformed pair
/// fails the whole set, so callers never synthesize from partial input.
pub fn parse_user_cases(
    pairs: &[(String, String)],
    sig: &FunctionSignature,
) -> Result<Vec<DoctestCase>, DoctestError> {
    if pairs.is_empty() {
        return Err(DoctestError::NoCases);
    }

    pairs
        .iter()
        .enumerate()
        .map(|(index, (input, output))| {
            let input = parse_literal(input).map_err(|source| DoctestError::BadInput { index, source })?;
            let expected = Output::parse(output, sig.returns_str())
                .map_err(|source| DoctestError::BadOutput { index, source })?;
            Ok(DoctestCase {
                input: sig.normalize_input(input),
                expected,
            })
        })
        .collect()
}

/// Splits `input => output` at the first arrow outside string quotes.
pub fn split_case_text(text: &str) -> Result<(String, String), DoctestError> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    for (pos, &(byte, c)) in chars.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, '=') if chars.get(pos + 1).is_some_and(|&(_, n)| n == '>') => {
                let input = text[..byte].trim().to_string();
                let output = text[byte + 2..].trim().to_string();
                return Ok((input, output));
            }
            _ => {}
        }
    }

    Err(DoctestError::MissingArrow(text.to_string()))
}
