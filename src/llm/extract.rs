//! Pulling usable payloads out of free-form model replies.

use regex::Regex;
use tracing::{debug, warn};

use crate::literal::parse_value_list;
use crate::value::Value;

/// Function source from a reply: a fenced block starting with `def` wins,
/// otherwise everything from the first `def ` up to the first
/// non-blank, non-indented line.
pub fn extract_function_code(reply: &str) -> Option<String> {
    if let Ok(fenced) = Regex::new(r"(?s)```(?:python|py)?\s*(def .+?)```") {
        if let Some(m) = fenced.captures(reply).and_then(|c| c.get(1)) {
            return Some(m.as_str().trim().to_string());
        }
    }

    let start = reply.find("def ")?;
    let body = &reply[start..];
    let mut lines = body.lines();
    let mut kept: Vec<&str> = lines.next().into_iter().collect();

    for line in lines {
        if !line.trim().is_empty() && !line.starts_with(' ') && !line.starts_with('\t') {
            break;
        }
        kept.push(line);
    }

    warn!("no fenced code block in reply; used fallback extraction");
    Some(kept.join("\n").trim().to_string()).filter(|code| !code.is_empty())
}

/// Candidate inputs from a reply: the outermost `[...]` span, then a fenced
/// list, parsed with the safe literal grammar. Unparsable replies yield an
/// empty list.
pub fn extract_input_list(reply: &str) -> Vec<Value> {
    if let (Some(open), Some(close)) = (reply.find('['), reply.rfind(']')) {
        if open < close {
            match parse_value_list(&reply[open..=close]) {
                Ok(items) => return items,
                Err(e) => debug!(error = %e, "bracketed span is not a literal list"),
            }
        }
    }

    let fenced = match Regex::new(r"(?s)```(?:python|py)?\s*\n(\[.*?\])\s*```") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    for caps in fenced.captures_iter(reply) {
        if let Some(m) = caps.get(1) {
            if let Ok(items) = parse_value_list(m.as_str()) {
                return items;
            }
        }
    }

    warn!("no input list could be parsed from reply");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_fenced_block() {
        let reply = "Sure!\n```python\ndef f(x):\n    return x + 1\n```\nThis adds one.";
        assert_eq!(extract_function_code(reply).unwrap(), "def f(x):\n    return x + 1");
    }

    #[test]
    fn falls_back_to_indented_body() {
        let reply = "Here you go:\ndef f(x):\n    y = x\n\n    return y\nThat is all.";
        assert_eq!(
            extract_function_code(reply).unwrap(),
            "def f(x):\n    y = x\n\n    return y"
        );
        assert!(extract_function_code("I cannot do that.").is_none());
    }

    #[test]
    fn slices_bracketed_list_with_comments() {
        let reply = "Inputs:\n[(2, 3),  # normal\n (-1, 0), (2**31 - 1, 1)]\nDone.";
        let inputs = extract_input_list(reply);
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[2], Value::tuple([Value::Int(2147483647), Value::Int(1)]));
    }

    #[test]
    fn falls_back_to_fenced_list() {
        let reply = "Using [brackets] loosely.\n```python\n[\"a\", \"\"]\n```\n";
        assert_eq!(extract_input_list(reply), vec![Value::str("a"), Value::str("")]);
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(extract_input_list("no list here").is_empty());
        assert!(extract_input_list("[__import__('os')]").is_empty());
    }
}
