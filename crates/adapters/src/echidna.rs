use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use vulnhunter::config::{AnalysisLayer, ToolConfig};
use vulnhunter::finding::{Finding, Severity, VulnerabilityLocation, VulnerabilityType};
use vulnhunter::pipeline::solidity_sources;
use vulnhunter::sandbox::{ExecutionContext, Sandbox, SandboxOutput};
use vulnhunter::tool::parse::parse_structured;
use vulnhunter::tool::{
    ContainerTool, ParseOutcome, ParseStrategy, ResolvedTarget, ToolAdapter, ToolDriver,
    ToolError, ToolResult,
};

use crate::discover;

pub const NAME: &str = "echidna";

const CONFIDENCE: f64 = 0.9;
const DEFAULT_TEST_LIMIT: u64 = 50_000;
const TEST_CONTRACT_PATTERN: &str = "Test*.sol";
const HARNESS_DIR: &str = "echidna";
const PROPERTY_PREFIX: &str = "echidna_";

/// Property-name keywords, first match wins.
const PROPERTY_KEYWORDS: &[(&str, VulnerabilityType)] = &[
    ("balance", VulnerabilityType::UnprotectedEther),
    ("theft", VulnerabilityType::UnprotectedEther),
    ("reentrancy", VulnerabilityType::Reentrancy),
    ("overflow", VulnerabilityType::IntegerOverflow),
    ("underflow", VulnerabilityType::IntegerUnderflow),
    ("access", VulnerabilityType::AccessControl),
    ("dos", VulnerabilityType::DosGasLimit),
];

pub fn property_type(property: &str) -> VulnerabilityType {
    let lower = property.to_ascii_lowercase();
    PROPERTY_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map_or(VulnerabilityType::Unknown, |(_, t)| *t)
}

/// Echidna property-based fuzzer. Runs against `Test*.sol` harnesses that
/// declare `echidna_*` boolean properties.
pub struct Echidna {
    tool: ContainerTool,
    strategies: Vec<Box<dyn ParseStrategy>>,
}

impl Echidna {
    pub fn new(config: ToolConfig, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            tool: ContainerTool::new(NAME, config, sandbox),
            strategies: vec![Box::new(JsonTests), Box::new(TextTests)],
        }
    }
}

fn is_harness(path: &Path) -> bool {
    path.file_name().is_some_and(|name| {
        glob::Pattern::new(TEST_CONTRACT_PATTERN).is_ok_and(|p| p.matches(&name.to_string_lossy()))
    })
}

/// `echidna/Test*.sol` when the project has a harness directory, otherwise
/// any `Test*.sol` in the tree. Sorted.
pub fn find_harnesses(dir: &Path) -> Vec<PathBuf> {
    let harness_dir = dir.join(HARNESS_DIR);
    let candidates = if harness_dir.is_dir() {
        discover::top_level_sources(&harness_dir)
    } else {
        solidity_sources(dir)
    };
    candidates.into_iter().filter(|p| is_harness(p)).collect()
}

impl ToolDriver for Echidna {
    fn resolve(&self, path: &Path) -> Result<ResolvedTarget, ToolError> {
        if path.is_file() {
            return discover::solidity_file(path);
        }
        if !path.is_dir() {
            return Err(discover::missing(path));
        }
        let harnesses = find_harnesses(path);
        debug!(dir = %path.display(), count = harnesses.len(), "echidna harnesses");
        let first = harnesses.into_iter().next().ok_or_else(|| {
            ToolError::Execution(format!(
                "no Echidna test contracts ({TEST_CONTRACT_PATTERN} with {PROPERTY_PREFIX} properties) found in {}",
                path.display()
            ))
        })?;
        discover::file_target(&first)
    }

    fn command(&self, target: &ResolvedTarget, config: &ToolConfig) -> Vec<String> {
        let mut cmd = vec![
            "echidna".to_string(),
            target.target.clone(),
            "--format".to_string(),
            config.arg("format").unwrap_or("text").to_string(),
            "--test-limit".to_string(),
            config.arg_or("test-limit", DEFAULT_TEST_LIMIT).to_string(),
        ];
        let contract = config.arg("contract").map(str::to_string).or_else(|| {
            Path::new(&target.target)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|stem| stem.starts_with("Test"))
        });
        if let Some(contract) = contract {
            cmd.push("--contract".to_string());
            cmd.push(contract);
        }
        cmd.extend(config.extra_flags(&["format", "test-limit", "contract"]));
        cmd
    }

    fn strategies(&self) -> &[Box<dyn ParseStrategy>] {
        &self.strategies
    }
}

impl ToolAdapter for Echidna {
    fn name(&self) -> &str {
        NAME
    }

    fn layer(&self) -> AnalysisLayer {
        AnalysisLayer::Fuzzing
    }

    fn description(&self) -> &str {
        "Echidna property-based fuzzing of echidna_* invariants"
    }

    fn fingerprint(&self) -> String {
        self.tool.fingerprint()
    }

    fn initialize(&self, ctx: &ExecutionContext) -> Result<(), ToolError> {
        self.tool.initialize(ctx)
    }

    fn analyze(&self, path: &Path, ctx: &ExecutionContext) -> ToolResult {
        self.tool.run(self, path, ctx)
    }

    fn cleanup(&self) {
        self.tool.cleanup()
    }

    fn is_available(&self) -> bool {
        self.tool.is_available()
    }
}

fn violation(test_name: &str, description: String, raw: Value) -> Finding {
    let property = test_name.strip_prefix(PROPERTY_PREFIX).unwrap_or(test_name);
    Finding::new(
        NAME,
        format!("Property Violation: {test_name}"),
        description,
        property_type(property),
        Severity::High,
        CONFIDENCE,
    )
    .with_raw(raw)
}

/// `--format json`: `tests` is either a map keyed by property or a list of
/// `{name, status, ...}` entries.
struct JsonTests;

impl ParseStrategy for JsonTests {
    fn name(&self) -> &'static str {
        "echidna-json"
    }

    fn parse(&self, output: &SandboxOutput) -> ParseOutcome {
        parse_structured(output, test_findings)
    }
}

fn test_findings(doc: &Value) -> ParseOutcome {
    let findings = match doc.get("tests") {
        Some(Value::Object(tests)) => tests
            .iter()
            .filter(|(_, result)| {
                result.get("status").and_then(Value::as_str) == Some("failed")
                    || result.get("passed").and_then(Value::as_bool) == Some(false)
            })
            .map(|(name, result)| {
                let counterexample = result
                    .get("counterexample")
                    .map(render)
                    .unwrap_or_else(|| "Not provided".to_string());
                violation(
                    name,
                    format!("Echidna found inputs that violate the property '{name}'. Counterexample: {counterexample}"),
                    result.clone(),
                )
            })
            .collect(),
        Some(Value::Array(tests)) => tests
            .iter()
            .filter(|test| {
                matches!(test.get("status").and_then(Value::as_str), Some("solved" | "failed"))
            })
            .map(|test| {
                let name = test.get("name").and_then(Value::as_str).unwrap_or("unknown");
                let counterexample = test
                    .get("transactions")
                    .or_else(|| test.get("counterexample"))
                    .map(render)
                    .unwrap_or_else(|| "Not provided".to_string());
                violation(
                    name,
                    format!("Echidna found inputs that violate the property '{name}'. Counterexample: {counterexample}"),
                    test.clone(),
                )
            })
            .collect(),
        _ => return ParseOutcome::Unrecognized("JSON has no `tests`".into()),
    };
    ParseOutcome::Parsed(findings)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn status_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)echidna_(\w+):\s*(passing|passed|failed|fuzzing)").expect("valid regex")
    })
}

fn assertion_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Assertion failed.*?at\s+([^:\s]+):(\d+)").expect("valid regex")
    })
}

/// `--format text`: one `echidna_<prop>: passing|failed!` line per property,
/// plus `Assertion failed ... at <file>:<line>` for assertion mode.
struct TextTests;

impl ParseStrategy for TextTests {
    fn name(&self) -> &'static str {
        "echidna-text"
    }

    fn parse(&self, output: &SandboxOutput) -> ParseOutcome {
        let text = output.combined();
        let mut recognized = false;
        let mut findings = Vec::new();

        for caps in status_regex().captures_iter(&text) {
            recognized = true;
            if !caps[2].eq_ignore_ascii_case("failed") {
                continue;
            }
            let property = &caps[1];
            let test_name = format!("{PROPERTY_PREFIX}{property}");
            findings.push(violation(
                &test_name,
                format!(
                    "Echidna found inputs that violate the property '{test_name}'. The expected invariant can be broken."
                ),
                json!({ "property": property, "status": "failed" }),
            ));
        }

        for caps in assertion_regex().captures_iter(&text) {
            recognized = true;
            let Ok(line) = caps[2].parse::<usize>() else {
                continue;
            };
            findings.push(
                Finding::new(
                    NAME,
                    "Assertion Failure",
                    "Echidna triggered an assertion failure, so a contract invariant was violated.",
                    VulnerabilityType::LogicError,
                    Severity::High,
                    CONFIDENCE,
                )
                .with_location(Some(VulnerabilityLocation::new(&caps[1], line, line)))
                .with_raw(json!({ "type": "assertion_failure", "line": line })),
            );
        }

        if recognized {
            ParseOutcome::Parsed(findings)
        } else {
            ParseOutcome::Unrecognized("no property status lines".into())
        }
    }
}
