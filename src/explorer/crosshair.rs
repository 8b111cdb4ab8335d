use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use regex::Regex;
use tracing::{debug, warn};

use crate::explorer::{Explorer, ExplorerError};
use crate::literal::parse_literal;
use crate::signature::{CallShape, FunctionSignature};
use crate::value::Value;

/// Runs `crosshair cover` on a persisted candidate and turns each reported
/// call into an input tuple.
#[derive(Debug, Clone)]
pub struct CrosshairExplorer {
    program: String,
}

impl Default for CrosshairExplorer {
    fn default() -> Self {
        Self::new("crosshair")
    }
}

impl CrosshairExplorer {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl Explorer for CrosshairExplorer {
    fn check_available(&self) -> Result<(), ExplorerError> {
        let status = Command::new(&self.program)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(s) if s.success() => Ok(()),
            Ok(s) => Err(ExplorerError::Unavailable {
                tool: self.program.clone(),
                reason: format!("`{} --help` exited with {}", self.program, s),
            }),
            Err(e) => Err(ExplorerError::Unavailable {
                tool: self.program.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn explore(&self, artifact: &Path, sig: &FunctionSignature) -> Result<Vec<Value>, ExplorerError> {
        if !artifact.exists() {
            return Err(ExplorerError::MissingArtifact(artifact.to_path_buf()));
        }

        let out = Command::new(&self.program)
            .arg("cover")
            .arg(artifact)
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ExplorerError::Unavailable {
                    tool: self.program.clone(),
                    reason: e.to_string(),
                },
                _ => ExplorerError::Io(e),
            })?;

        let stdout = String::from_utf8_lossy(&out.stdout);
        debug!(tool = %self.program, stdout = %stdout, "crosshair finished");

        if !out.status.success() {
            warn!(
                tool = %self.program,
                status = %out.status,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "crosshair reported an error; no inputs taken"
            );
            return Ok(Vec::new());
        }

        Ok(parse_cover_output(&stdout, sig))
    }
}

/// Parses lines such as `divide(0, -1)` into `(0, -1)`. Lines for other
/// functions or with unparsable arguments are skipped.
///
/// Each line is an argument list, so for a single-parameter signature the
/// sole argument is the input itself, tuple or not.
pub fn parse_cover_output(stdout: &str, sig: &FunctionSignature) -> Vec<Value> {
    let single = sig.call_shape() == CallShape::Single;
    let call = match Regex::new(r"^\s*(\w+)\((.*)\)\s*$") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    stdout
        .lines()
        .filter_map(|line| {
            let caps = call.captures(line)?;
            if caps.get(1)?.as_str() != sig.name {
                return None;
            }

            let args = caps.get(2)?.as_str().trim();
            if args.is_empty() {
                return Some(Value::Tuple(Vec::new()));
            }

            match parse_literal(&format!("({args},)")) {
                Ok(Value::Tuple(mut items)) if single && items.len() == 1 => Some(items.remove(0)),
                Ok(Value::Tuple(_)) if single => None,
                Ok(v @ Value::Tuple(_)) => Some(v),
                Ok(_) => None,
                Err(e) => {
                    debug!(line, error = %e, "skipping crosshair line");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reported_calls_as_tuples() {
        let stdout = "divide(0, 0)\ndivide(-1, 'x')\nhelper(1)\ndivide(a=1)\n\n";
        let divide = FunctionSignature::parse("divide(a, b)").unwrap();
        let got = parse_cover_output(stdout, &divide);
        assert_eq!(
            got,
            vec![
                Value::tuple([Value::Int(0), Value::Int(0)]),
                Value::tuple([Value::Int(-1), Value::str("x")]),
            ]
        );
    }

    #[test]
    fn single_argument_calls_yield_the_argument() {
        let double = FunctionSignature::parse("double(x)").unwrap();
        let got = parse_cover_output("double('')\ndouble([1, 2])\ndouble(1, 2)", &double);
        assert_eq!(got, vec![Value::str(""), Value::List(vec![Value::Int(1), Value::Int(2)])]);
    }

    #[test]
    fn tuple_parameter_keeps_its_tuple() {
        let head = FunctionSignature::parse("head(t: tuple) -> int").unwrap();
        let got = parse_cover_output("head((1, 2))\nhead((3,))", &head);
        assert_eq!(
            got,
            vec![
                Value::tuple([Value::Int(1), Value::Int(2)]),
                Value::tuple([Value::Int(3)]),
            ]
        );

        let seed = crate::doctest::DoctestCollection::from_cases(
            [crate::doctest::DoctestCase::new(Value::tuple([Value::Int(9)]), Value::Int(9))],
            crate::doctest::ConflictPolicy::LastWins,
        );
        let conformed = crate::builder::conform_inputs(&head, &seed, got.clone());
        assert_eq!(conformed, got);
    }

    #[test]
    fn missing_tool_is_unavailable() {
        let explorer = CrosshairExplorer::new("specloop-no-such-crosshair");
        assert!(matches!(explorer.check_available(), Err(ExplorerError::Unavailable { .. })));
    }

    #[test]
    fn missing_artifact_is_an_error() {
        let explorer = CrosshairExplorer::default();
        let sig = FunctionSignature::parse("f(x)").unwrap();
        let err = explorer.explore(Path::new("/definitely/not/here.py"), &sig).unwrap_err();
        assert!(matches!(err, ExplorerError::MissingArtifact(_)));
    }
}
