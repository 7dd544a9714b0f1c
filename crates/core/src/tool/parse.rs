//! Output parsing as a chain of strategies, structured formats first.

use serde_json::Value;

use crate::finding::Finding;
use crate::sandbox::SandboxOutput;

use super::error::ToolError;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The output was understood; the list may be empty.
    Parsed(Vec<Finding>),
    /// The strategy does not recognize this output, with the reason.
    Unrecognized(String),
}

/// One way of turning raw tool output into findings.
pub trait ParseStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn parse(&self, output: &SandboxOutput) -> ParseOutcome;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub strategy: &'static str,
    pub findings: Vec<Finding>,
}

/// Try each strategy in order; the first that recognizes the output wins.
pub fn parse_chain(
    strategies: &[Box<dyn ParseStrategy>],
    output: &SandboxOutput,
) -> Result<Parsed, ToolError> {
    let mut reasons = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        match strategy.parse(output) {
            ParseOutcome::Parsed(findings) => {
                return Ok(Parsed {
                    strategy: strategy.name(),
                    findings,
                })
            }
            ParseOutcome::Unrecognized(reason) => {
                reasons.push(format!("{}: {reason}", strategy.name()));
            }
        }
    }
    if reasons.is_empty() {
        reasons.push("no parser configured".to_string());
    }
    Err(ToolError::Parse(reasons.join("; ")))
}

/// Every JSON object or array embedded in `text`, in order, ignoring
/// surrounding noise such as progress lines or compiler warnings. Scanning
/// resumes after each document, so nested values are not yielded again.
pub fn json_documents(text: &str) -> impl Iterator<Item = Value> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || {
        while pos < text.len() {
            let offset = text[pos..].find(['{', '['])?;
            let start = pos + offset;
            let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) => {
                    pos = start + stream.byte_offset().max(1);
                    return Some(value);
                }
                _ => pos = start + 1,
            }
        }
        None
    })
}

/// First JSON object or array embedded in `text`.
pub fn extract_json(text: &str) -> Option<Value> {
    json_documents(text).next()
}

/// Some images wrap the tool as `{"status", "stdout", "stderr", "returncode"}`.
/// Returns the inner document when `value` is such an envelope.
pub fn unwrap_envelope(value: Value) -> Value {
    let is_envelope = value.as_object().is_some_and(|map| {
        map.contains_key("stdout") && (map.contains_key("returncode") || map.contains_key("status"))
    });
    if !is_envelope {
        return value;
    }
    let inner = match value.get("stdout") {
        Some(Value::String(s)) => extract_json(s),
        Some(v @ (Value::Object(_) | Value::Array(_))) => Some(v.clone()),
        _ => None,
    };
    inner.unwrap_or(value)
}

/// Structured documents in a tool's output: stdout first, then stderr.
pub fn structured_payloads(output: &SandboxOutput) -> impl Iterator<Item = Value> + '_ {
    json_documents(&output.stdout)
        .chain(json_documents(&output.stderr))
        .map(unwrap_envelope)
}

/// Offer each structured document to `parse` until one is recognized.
/// Unrecognized carries the reason given for the last document tried.
pub fn parse_structured(
    output: &SandboxOutput,
    mut parse: impl FnMut(&Value) -> ParseOutcome,
) -> ParseOutcome {
    let mut last_reason = None;
    for doc in structured_payloads(output) {
        match parse(&doc) {
            ParseOutcome::Unrecognized(reason) => last_reason = Some(reason),
            parsed => return parsed,
        }
    }
    ParseOutcome::Unrecognized(last_reason.unwrap_or_else(|| "no JSON document".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Severity, VulnerabilityType};
    use serde_json::json;

    fn output(stdout: &str) -> SandboxOutput {
        SandboxOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    struct Never;
    impl ParseStrategy for Never {
        fn name(&self) -> &'static str {
            "never"
        }
        fn parse(&self, _: &SandboxOutput) -> ParseOutcome {
            ParseOutcome::Unrecognized("nothing here".into())
        }
    }

    struct Always;
    impl ParseStrategy for Always {
        fn name(&self) -> &'static str {
            "always"
        }
        fn parse(&self, _: &SandboxOutput) -> ParseOutcome {
            ParseOutcome::Parsed(vec![Finding::new(
                "t",
                "x",
                "",
                VulnerabilityType::Unknown,
                Severity::Low,
                0.5,
            )])
        }
    }

    #[test]
    fn test_chain_falls_through_to_next_strategy() {
        let chain: Vec<Box<dyn ParseStrategy>> = vec![Box::new(Never), Box::new(Always)];
        let parsed = parse_chain(&chain, &output("")).unwrap();
        assert_eq!(parsed.strategy, "always");
        assert_eq!(parsed.findings.len(), 1);
    }

    #[test]
    fn test_chain_failure_lists_reasons() {
        let chain: Vec<Box<dyn ParseStrategy>> = vec![Box::new(Never)];
        let err = parse_chain(&chain, &output("")).unwrap_err();
        assert!(matches!(err, ToolError::Parse(ref m) if m.contains("never: nothing here")));
    }

    #[test]
    fn test_extract_json_skips_noise() {
        let text = "Compiling...\n[warn] something\n{\"success\": true, \"results\": {}}\ntrailer";
        assert_eq!(
            extract_json(text),
            Some(json!({"success": true, "results": {}}))
        );
        assert_eq!(extract_json("no json at all"), None);
    }

    #[test]
    fn test_envelope_is_unwrapped() {
        let env = json!({
            "status": "ok",
            "returncode": 255,
            "stdout": "{\"issues\": []}",
            "stderr": ""
        });
        assert_eq!(unwrap_envelope(env), json!({"issues": []}));
        let plain = json!({"issues": []});
        assert_eq!(unwrap_envelope(plain.clone()), plain);
    }

    #[test]
    fn test_structured_payloads_fall_back_to_stderr() {
        let out = SandboxOutput {
            stdout: "nothing".into(),
            stderr: "{\"a\": 1}".into(),
            exit_code: 1,
        };
        let docs: Vec<Value> = structured_payloads(&out).collect();
        assert_eq!(docs, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_documents_are_yielded_in_order_without_nesting() {
        let text = "progress [1] {} done\n{\"results\": {\"detectors\": [{\"check\": \"x\"}]}}";
        let docs: Vec<Value> = json_documents(text).collect();
        assert_eq!(
            docs,
            vec![json!([1]), json!({}), json!({"results": {"detectors": [{"check": "x"}]}})]
        );
    }

    #[test]
    fn test_documents_past_many_brackets_are_found() {
        let noise = "[x] ".repeat(200);
        let text = format!("{noise}{{\"issues\": []}}");
        assert_eq!(extract_json(&text), Some(json!({"issues": []})));
    }

    #[test]
    fn test_parse_structured_skips_unrecognized_documents() {
        let out = output("[1]\n{}\n{\"report\": true}");
        let outcome = parse_structured(&out, |doc| {
            if doc.get("report").is_some() {
                ParseOutcome::Parsed(Vec::new())
            } else {
                ParseOutcome::Unrecognized("not a report".into())
            }
        });
        assert_eq!(outcome, ParseOutcome::Parsed(Vec::new()));

        let outcome = parse_structured(&output("[1]"), |_| ParseOutcome::Unrecognized("not a report".into()));
        assert_eq!(outcome, ParseOutcome::Unrecognized("not a report".into()));
        let outcome = parse_structured(&output("plain text"), |_| ParseOutcome::Parsed(Vec::new()));
        assert_eq!(outcome, ParseOutcome::Unrecognized("no JSON document".into()));
    }
}
