//! Runs against a real interpreter; every test returns early when
//! `python3` is not on PATH.

use std::time::Duration;

use specloop::doctest::{ConflictPolicy, DoctestCase, DoctestCollection};
use specloop::executor::{self, CandidateCode, Definition, ExecutionSandbox, ExecutionResult, Invocation};
use specloop::sandbox::{PythonSandbox, SandboxError};
use specloop::signature::{CallShape, FunctionSignature};
use specloop::value::Value;

fn sandbox() -> Option<PythonSandbox> {
    let sandbox = PythonSandbox::new("python3", Duration::from_secs(5));
    match sandbox.probe() {
        Ok(_) => Some(sandbox),
        Err(e) => {
            eprintln!("skipping: {e}");
            None
        }
    }
}

fn pair(a: i64, b: i64) -> Value {
    Value::tuple([Value::Int(a), Value::Int(b)])
}

#[test]
fn defines_and_rejects_candidates() {
    let Some(sandbox) = sandbox() else { return };

    let good = CandidateCode::new("multiply", "def multiply(a, b):\n    return a * b\n");
    assert_eq!(sandbox.define(&good).unwrap(), Definition::Defined);

    let syntax = CandidateCode::new("multiply", "def multiply(a, b)\n    return a * b\n");
    assert!(matches!(sandbox.define(&syntax).unwrap(), Definition::Invalid(m) if m.contains("SyntaxError")));

    let misnamed = CandidateCode::new("multiply", "def times(a, b):\n    return a * b\n");
    assert!(matches!(sandbox.define(&misnamed).unwrap(), Definition::Invalid(m) if m.contains("NameError")));
}

#[test]
fn spreads_tuples_and_captures_raises() {
    let Some(sandbox) = sandbox() else { return };
    let code = CandidateCode::new("divide", "def divide(a, b):\n    print('noise')\n    return a // b\n");

    let calls = sandbox.invoke(&code, CallShape::Spread(2), &[pair(7, 2), pair(1, 0)]).unwrap();
    assert_eq!(calls[0], Invocation::Returned(Value::Int(3)));
    assert!(matches!(&calls[1], Invocation::Raised(m) if m.starts_with("ZeroDivisionError")));
}

#[test]
fn single_parameter_receives_the_whole_value() {
    let Some(sandbox) = sandbox() else { return };
    let code = CandidateCode::new("total", "def total(xs):\n    return sum(xs)\n");
    let input = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

    let calls = sandbox.invoke(&code, CallShape::Single, &[input]).unwrap();
    assert_eq!(calls, vec![Invocation::Returned(Value::Int(6))]);
}

#[test]
fn unrepresentable_inputs_are_not_reported_as_raises() {
    let Some(sandbox) = sandbox() else { return };
    let code = CandidateCode::new("size", "def size(x):\n    return len(x)\n");

    let opaque = Value::Opaque("{1, 2}".into());
    let err = sandbox.invoke(&code, CallShape::Single, &[Value::Int(1), opaque]).unwrap_err();
    assert!(matches!(err, SandboxError::Protocol(m) if m.contains("opaque")));

    let list_key = Value::Dict(vec![(Value::List(vec![Value::Int(1)]), Value::Int(2))]);
    let err = sandbox.invoke(&code, CallShape::Single, &[list_key]).unwrap_err();
    assert!(matches!(err, SandboxError::Protocol(m) if m.contains("unhashable")));
}

#[test]
fn doctest_run_through_the_interpreter() {
    let Some(sandbox) = sandbox() else { return };
    let sig = FunctionSignature::parse("divide(a: int, b: int) -> int").unwrap();
    let code = CandidateCode::new("divide", "def divide(a, b):\n    return a // b\n");
    let doctests = DoctestCollection::from_cases(
        [
            DoctestCase::new(pair(9, 3), Value::Int(3)),
            DoctestCase::raising(pair(1, 0)),
            DoctestCase::new(pair(5, 0), Value::Int(0)),
        ],
        ConflictPolicy::LastWins,
    );

    let report = executor::run(&sandbox, &code, &sig, &doctests).unwrap();
    assert_eq!(report.results[0].1, ExecutionResult::Pass);
    assert_eq!(report.results[1].1, ExecutionResult::Pass);
    assert!(matches!(report.results[2].1, ExecutionResult::Errored(_)));
}

#[test]
fn runaway_candidate_is_killed() {
    let Some(_) = sandbox() else { return };
    let sandbox = PythonSandbox::new("python3", Duration::from_millis(500));
    let code = CandidateCode::new("spin", "def spin(x):\n    while True:\n        pass\n");

    let err = sandbox.invoke(&code, CallShape::Single, &[Value::Int(1)]).unwrap_err();
    assert!(matches!(err, SandboxError::Timeout(_)));
}
