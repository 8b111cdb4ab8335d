//! Function signatures and the call shape they declare.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Error, PartialEq)]
pub enum SignatureError {
    #[error("function name {0:?} is not a valid identifier")]
    InvalidName(String),
    #[error("cannot parse signature {0:?}; expected `name(a: int, b: int) -> int`")]
    Malformed(String),
    #[error("parameter {0:?} has no name")]
    EmptyParam(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub annotation: Option<String>,
}

impl Param {
    /// Accepts `x` or `x: int`.
    pub fn parse(text: &str) -> Result<Self, SignatureError> {
        let (name, annotation) = match text.split_once(':') {
            Some((n, a)) => (n.trim(), Some(a.trim().to_string()).filter(|a| !a.is_empty())),
            None => (text.trim(), None),
        };

        if name.is_empty() {
            return Err(SignatureError::EmptyParam(text.to_string()));
        }
        if !is_identifier(name) {
            return Err(SignatureError::InvalidName(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            annotation,
        })
    }

    pub fn is_tuple_typed(&self) -> bool {
        self.annotation.as_deref().is_some_and(|a| {
            let a = a.trim_start_matches("typing.");
            a.starts_with("tuple") || a.starts_with("Tuple")
        })
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.annotation {
            Some(a) => write!(f, "{}: {}", self.name, a),
            None => f.write_str(&self.name),
        }
    }
}

/// How doctest inputs are handed to the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallShape {
    /// One parameter: the input is the sole argument.
    Single,
    /// `n` parameters: the input is an `n`-tuple spread positionally.
    Spread(usize),
}

impl CallShape {
    pub fn spreads(self) -> bool {
        matches!(self, CallShape::Spread(_))
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallShape::Single => f.write_str("a single argument"),
            CallShape::Spread(n) => write!(f, "a {n}-tuple of arguments"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<Param>,
    /// Empty when unannotated.
    pub return_type: String,
}

impl FunctionSignature {
    /// Assembles a signature from separately collected fields.
    pub fn from_parts(
        name: &str,
        params: &[impl AsRef<str>],
        return_type: &str,
    ) -> Result<Self, SignatureError> {
        let name = name.trim();
        if !is_identifier(name) {
            return Err(SignatureError::InvalidName(name.to_string()));
        }

        let params = params
            .iter()
            .map(|p| Param::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let return_type = return_type.trim().to_string();

        Ok(Self {
            name: name.to_string(),
            params,
            return_type,
        })
    }

    /// Parses `name(a: int, b: int) -> int`, with or without a leading
    /// `def` and trailing colon.
    pub fn parse(text: &str) -> Result<Self, SignatureError> {
        let re = Regex::new(r"^\s*(?:def\s+)?([A-Za-z_]\w*)\s*\((.*)\)\s*(?:->\s*(.+?))?\s*:?\s*$")
            .map_err(|_| SignatureError::Malformed(text.to_string()))?;
        let caps = re
            .captures(text)
            .ok_or_else(|| SignatureError::Malformed(text.to_string()))?;

        let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let params = split_params(caps.get(2).map(|m| m.as_str()).unwrap_or_default());
        let return_type = caps.get(3).map(|m| m.as_str()).unwrap_or("");

        Self::from_parts(name, &params, return_type)
    }

    pub fn call_shape(&self) -> CallShape {
        match self.params.len() {
            1 => CallShape::Single,
            n => CallShape::Spread(n),
        }
    }

    pub fn returns_str(&self) -> bool {
        self.return_type == "str"
    }

    /// Brings an input into the declared shape: a 1-tuple wrapping the
    /// argument of a single-parameter function is unwrapped, unless the
    /// parameter itself is tuple-typed.
    pub fn normalize_input(&self, input: Value) -> Value {
        let tuple_param = self.params.first().is_some_and(Param::is_tuple_typed);
        match (self.call_shape(), input) {
            (CallShape::Single, Value::Tuple(mut items)) if items.len() == 1 && !tuple_param => {
                items.remove(0)
            }
            (_, other) => other,
        }
    }

    /// Whether `input` can be passed under the declared shape.
    pub fn admits(&self, input: &Value) -> bool {
        match self.call_shape() {
            CallShape::Single => true,
            CallShape::Spread(n) => input.as_tuple().is_some_and(|items| items.len() == n),
        }
    }

    /// Renders a call expression for display, e.g. `multiply(2, 3)`.
    pub fn render_call(&self, input: &Value) -> String {
        match (self.call_shape(), input) {
            (CallShape::Spread(_), Value::Tuple(items)) => {
                let args: Vec<String> = items.iter().map(ToString::to_string).collect();
                format!("{}({})", self.name, args.join(", "))
            }
            _ => format!("{}({})", self.name, input),
        }
    }
}

impl fmt::Display for FunctionSignature {
    /// Python header line, e.g. `def multiply(a: int, b: int) -> int:`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        write!(f, "def {}({})", self.name, params.join(", "))?;
        if !self.return_type.is_empty() {
            write!(f, " -> {}", self.return_type)?;
        }
        f.write_str(":")
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Splits on commas that are not nested inside brackets (`dict[str, int]`).
fn split_params(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();

    for c in text.chars() {
        match c {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth -= 1,
            ',' if depth == 0 => {
                out.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }

    if !current.trim().is_empty() {
        out.push(current);
    }
    out.into_iter().map(|p| p.trim().to_string()).collect()
}
