//! Out-of-process execution of candidate code.
//!
//! Every define or invoke spawns a fresh interpreter in isolated mode
//! (`-I`), feeds it one JSON request on stdin and reads one JSON reply from
//! stdout. The candidate never runs inside this process, and a wall-clock
//! deadline kills runaway candidates.

use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::executor::{CandidateCode, Definition, ExecutionSandbox, Invocation};
use crate::signature::CallShape;
use crate::value::Value;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const STDERR_TAIL: usize = 4000;

/// Runs inside the child interpreter. Candidate prints go to stderr so the
/// reply on stdout stays parseable.
const HARNESS: &str = r##"
import json, sys

def decode(o):
    t = o["t"]
    v = o.get("v")
    if t == "none":
        return None
    if t in ("bool", "int", "str"):
        return v
    if t == "float":
        return float(v)
    if t == "list":
        return [decode(x) for x in v]
    if t == "tuple":
        return tuple(decode(x) for x in v)
    if t == "dict":
        return {decode(k): decode(x) for k, x in v}
    raise TypeError("cannot pass opaque value %s" % v)

def encode(x):
    if x is None:
        return {"t": "none"}
    if isinstance(x, bool):
        return {"t": "bool", "v": x}
    if isinstance(x, int):
        if -(2 ** 63) <= x < 2 ** 63:
            return {"t": "int", "v": x}
        return {"t": "opaque", "v": repr(x)}
    if isinstance(x, float):
        return {"t": "float", "v": repr(x)}
    if isinstance(x, str):
        return {"t": "str", "v": x}
    if isinstance(x, list):
        return {"t": "list", "v": [encode(i) for i in x]}
    if isinstance(x, tuple):
        return {"t": "tuple", "v": [encode(i) for i in x]}
    if isinstance(x, dict):
        return {"t": "dict", "v": [[encode(k), encode(i)] for k, i in x.items()]}
    return {"t": "opaque", "v": repr(x)}

def describe(e):
    return "%s: %s" % (type(e).__name__, e)

def main():
    req = json.loads(sys.stdin.read())
    out = sys.stdout
    sys.stdout = sys.stderr

    def reply(obj):
        out.write(json.dumps(obj))
        out.write("\n")
        out.flush()

    try:
        args = [decode(raw) for raw in req["inputs"]]
    except BaseException as e:
        reply({"defined": False, "bad_input": describe(e)})
        return

    ns = {"__name__": "__candidate__"}
    try:
        exec(compile(req["source"], "<candidate>", "exec"), ns)
        fn = ns.get(req["name"])
        if not callable(fn):
            raise NameError("%s is not defined" % req["name"])
    except BaseException as e:
        reply({"defined": False, "error": describe(e)})
        return

    results = []
    for arg in args:
        try:
            value = fn(*arg) if req["spread"] else fn(arg)
            results.append({"ok": encode(value)})
        except BaseException as e:
            results.append({"raised": describe(e)})
    reply({"defined": True, "results": results})

main()
"##;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to start interpreter {interpreter:?}: {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: io::Error,
    },
    #[error("interpreter i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("candidate did not finish within {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("interpreter exited with {code:?}: {stderr}")]
    Interpreter { code: Option<i32>, stderr: String },
    #[error("candidate could not be defined: {0}")]
    Undefined(String),
    #[error("malformed sandbox reply: {0}")]
    Protocol(String),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct Request<'a> {
    name: &'a str,
    source: &'a str,
    spread: bool,
    inputs: &'a [Value],
}

#[derive(Debug, Deserialize)]
struct Reply {
    defined: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Vec<Slot>,
    /// Set when an input could not be rebuilt on the Python side; the
    /// candidate was never called.
    #[serde(default)]
    bad_input: Option<String>,
}

impl Reply {
    fn checked(self) -> Result<Self, SandboxError> {
        match self.bad_input {
            Some(reason) => Err(SandboxError::Protocol(format!("input cannot be passed to Python: {reason}"))),
            None => Ok(self),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Slot {
    Ok(Value),
    Raised(String),
}

impl From<Slot> for Invocation {
    fn from(slot: Slot) -> Self {
        match slot {
            Slot::Ok(v) => Invocation::Returned(v),
            Slot::Raised(msg) => Invocation::Raised(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PythonSandbox {
    interpreter: String,
    timeout: Duration,
}

impl PythonSandbox {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// Reports the interpreter version, or why it cannot be started.
    pub fn probe(&self) -> Result<String, SandboxError> {
        let out = Command::new(&self.interpreter)
            .arg("--version")
            .output()
            .map_err(|source| SandboxError::Spawn {
                interpreter: self.interpreter.clone(),
                source,
            })?;

        if !out.status.success() {
            return Err(SandboxError::Interpreter {
                code: out.status.code(),
                stderr: tail(&String::from_utf8_lossy(&out.stderr)),
            });
        }

        let text = if out.stdout.is_empty() { out.stderr } else { out.stdout };
        Ok(String::from_utf8_lossy(&text).trim().to_string())
    }

    fn exchange(&self, request: &Request<'_>) -> Result<Reply, SandboxError> {
        let payload = serde_json::to_vec(request)?;

        let mut child = Command::new(&self.interpreter)
            .arg("-I")
            .arg("-c")
            .arg(HARNESS)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                interpreter: self.interpreter.clone(),
                source,
            })?;

        // Dropping the handle closes stdin so the harness sees EOF.
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| SandboxError::Protocol("missing stdin".into()))?;
            stdin.write_all(&payload)?;
        }

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let start = Instant::now();
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if start.elapsed() > self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(function = request.name, "candidate timed out");
                    return Err(SandboxError::Timeout(self.timeout));
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;
        debug!(
            function = request.name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "sandbox exchange finished"
        );

        match stdout.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => serde_json::from_str::<Reply>(line)
                .map_err(|e| SandboxError::Protocol(format!("{e}: {}", tail(line))))?
                .checked(),
            None => Err(SandboxError::Interpreter {
                code: status.code(),
                stderr: tail(&stderr),
            }),
        }
    }
}

impl ExecutionSandbox for PythonSandbox {
    fn define(&self, code: &CandidateCode) -> Result<Definition, SandboxError> {
        let reply = self.exchange(&Request {
            name: &code.function_name,
            source: &code.source,
            spread: false,
            inputs: &[],
        })?;

        Ok(if reply.defined {
            Definition::Defined
        } else {
            Definition::Invalid(reply.error.unwrap_or_default())
        })
    }

    fn invoke(
        &self,
        code: &CandidateCode,
        shape: CallShape,
        inputs: &[Value],
    ) -> Result<Vec<Invocation>, SandboxError> {
        let reply = self.exchange(&Request {
            name: &code.function_name,
            source: &code.source,
            spread: shape.spreads(),
            inputs,
        })?;

        if !reply.defined {
            return Err(SandboxError::Undefined(reply.error.unwrap_or_default()));
        }
        Ok(reply.results.into_iter().map(Invocation::from).collect())
    }
}

type Drain = Option<thread::JoinHandle<io::Result<String>>>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Drain {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            pipe.read_to_string(&mut buf).map(|_| buf)
        })
    })
}

fn collect(handle: Drain) -> Result<String, SandboxError> {
    match handle {
        Some(h) => h
            .join()
            .map_err(|_| SandboxError::Protocol("pipe reader panicked".into()))?
            .map_err(SandboxError::from),
        None => Ok(String::new()),
    }
}

fn tail(s: &str) -> String {
    let count = s.chars().count();
    if count <= STDERR_TAIL {
        s.trim().to_string()
    } else {
        s.chars().skip(count - STDERR_TAIL).collect::<String>().trim().to_string()
    }
}
