use crate::doctest::{render_cases, DoctestCase, DoctestCollection};
use crate::executor::{CandidateCode, FailedCase};
use crate::signature::FunctionSignature;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmPrompt {
    pub system: String,
    pub user: String,
}

/* ============================================================
   System prompts (stable, reused)
   ============================================================ */

fn coder_system() -> String {
    r#"
You are an expert Python programmer who writes small, correct functions.

Rules:
- Doctests are `(input, output)` tuples; a tuple input is spread as positional arguments
- An output of 'Error' means the call must raise
- Do NOT add comments other than the docstring
- Do NOT print, read files, or touch the network
- Only output the function code in a ```python block, nothing else
"#
    .trim()
    .to_string()
}

fn tester_system() -> String {
    r#"
You are an expert at designing test inputs that catch subtle bugs in Python functions.

Rules:
- Output a single Python list literal, nothing else
- Each list item is the input of one call: a tuple of arguments, or a bare value for one-argument functions
- DO NOT give expected outputs, only inputs
"#
    .trim()
    .to_string()
}

/* ============================================================
   Shared blocks
   ============================================================ */

fn function_stub(sig: &FunctionSignature, docstring: &str) -> String {
    let mut out = format!("{sig}\n    \"\"\"\n");
    for line in docstring.trim().lines() {
        out.push_str("    ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.push_str("    \"\"\"\n");
    out
}

fn shape_examples() -> &'static str {
    "For example, for multiply(a: int, b: int) a good answer is:\n\
     [(2, 3), (-1, 0), (6, -6)]\n\
     and for double(a: str) a good answer is:\n\
     [\"hello\", \"\", \"hi\"]\n"
}

/* ============================================================
   Code prompts
   ============================================================ */

pub fn synthesis(sig: &FunctionSignature, docstring: &str, doctests: &DoctestCollection) -> LlmPrompt {
    let mut user = String::new();
    user.push_str("Write the Python function below.\n\n");
    user.push_str(&function_stub(sig, docstring));
    user.push_str("    # your code here\n\n");
    user.push_str(&format!(
        "The function must satisfy these doctests: {}\n",
        doctests.render()
    ));
    user.push_str("Ensure that every doctest passes.\n");

    LlmPrompt {
        system: coder_system(),
        user,
    }
}

/// Regeneration after a failed run. Carries the literal failing cases and
/// tells the model to trust the doctests over the docstring.
pub fn regeneration(previous: &CandidateCode, doctests: &DoctestCollection, failing: &[FailedCase]) -> LlmPrompt {
    let wanted: Vec<DoctestCase> = failing
        .iter()
        .map(|f| DoctestCase {
            input: f.input.clone(),
            expected: f.expected.clone(),
        })
        .collect();
    let got: Vec<DoctestCase> = failing
        .iter()
        .map(|f| DoctestCase {
            input: f.input.clone(),
            expected: f.actual.clone(),
        })
        .collect();

    let mut user = String::new();
    user.push_str("This function is incorrect:\n\n```python\n");
    user.push_str(previous.source.trim_end());
    user.push_str("\n```\n\n");
    user.push_str(&format!("It fails these doctests: {}\n", render_cases(&wanted)));
    user.push_str(&format!("For those inputs it actually produced: {}\n\n", render_cases(&got)));
    user.push_str(&format!(
        "Modify it to satisfy ALL of these doctests: {}\n",
        doctests.render()
    ));
    user.push_str(
        "The failures come from wrong assumptions in the code. Find the pattern in the doctests and \
         reverse engineer the behaviour they describe.\n\
         The docstring is ambiguous, do not rely on it. Only trust the doctests.\n\
         Some edge cases appear in a single doctest, do not ignore them.\n\
         Keep the same function name and parameters.\n",
    );

    LlmPrompt {
        system: coder_system(),
        user,
    }
}

/// "This code is wrong, here are the correct doctests."
pub fn repair(previous: &CandidateCode, doctests: &DoctestCollection) -> LlmPrompt {
    let mut user = String::new();
    user.push_str("The Python function below is wrong, it does not do the task it was asked to:\n\n```python\n");
    user.push_str(previous.source.trim_end());
    user.push_str("\n```\n\n");
    user.push_str(&format!(
        "Here are doctests with the correct answers: {}\n\
         Rewrite the function so that it passes all of them. Keep the same name and parameters.\n",
        doctests.render()
    ));

    LlmPrompt {
        system: coder_system(),
        user,
    }
}

/* ============================================================
   Input prompts
   ============================================================ */

pub fn suggestion(sig: &FunctionSignature, docstring: &str) -> LlmPrompt {
    let mut user = String::new();
    user.push_str("Propose doctest inputs for this function:\n\n");
    user.push_str(&function_stub(sig, docstring));
    user.push('\n');
    user.push_str(
        "Think of every ambiguity in the signature and docstring and find at least 5-7 edge cases.\n\
         Prefer edge cases over ordinary cases.\n",
    );
    user.push_str(shape_examples());

    LlmPrompt {
        system: tester_system(),
        user,
    }
}

pub fn refutation(code: &CandidateCode, doctests: &DoctestCollection) -> LlmPrompt {
    let mut user = String::new();
    user.push_str(
        "The following function may be buggy and its docstring may be meaningless. \
         Propose new inputs that would reveal what the correct function should do:\n\n```python\n",
    );
    user.push_str(code.source.trim_end());
    user.push_str("\n```\n\n");
    user.push_str(&format!(
        "These doctests are already known, do not repeat their inputs: {}\n",
        doctests.render()
    ));
    user.push_str(shape_examples());

    LlmPrompt {
        system: tester_system(),
        user,
    }
}
