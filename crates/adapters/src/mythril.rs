use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use vulnhunter::config::{AnalysisLayer, ToolConfig};
use vulnhunter::finding::taxonomy::{normalize_swc_id, parse_severity, type_for_swc};
use vulnhunter::finding::{Finding, VulnerabilityLocation, VulnerabilityType};
use vulnhunter::sandbox::{ExecutionContext, Sandbox, SandboxOutput};
use vulnhunter::tool::parse::parse_structured;
use vulnhunter::tool::{
    ContainerTool, ParseOutcome, ParseStrategy, Parsed, ResolvedTarget, ToolAdapter, ToolDriver,
    ToolError, ToolResult,
};

use crate::discover;

pub const NAME: &str = "mythril";

const CONFIDENCE: f64 = 0.8;
const DEFAULT_MAX_DEPTH: u64 = 22;
const SUCCESS_MARKER: &str = "The analysis was completed successfully";

/// Mythril symbolic execution engine.
pub struct Mythril {
    tool: ContainerTool,
    strategies: Vec<Box<dyn ParseStrategy>>,
}

impl Mythril {
    pub fn new(config: ToolConfig, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            tool: ContainerTool::new(NAME, config, sandbox),
            strategies: vec![Box::new(JsonIssues), Box::new(TextIssues)],
        }
    }
}

impl ToolDriver for Mythril {
    /// A directory analyzes its first top-level source in name order.
    fn resolve(&self, path: &Path) -> Result<ResolvedTarget, ToolError> {
        if path.is_file() {
            return discover::solidity_file(path);
        }
        if !path.is_dir() {
            return Err(discover::missing(path));
        }
        let first = discover::top_level_sources(path)
            .into_iter()
            .next()
            .ok_or_else(|| {
                ToolError::Execution(format!(
                    "no Solidity files found in {}",
                    path.display()
                ))
            })?;
        discover::file_target(&first)
    }

    fn command(&self, target: &ResolvedTarget, config: &ToolConfig) -> Vec<String> {
        // Leave headroom for the solver to report before the container is killed.
        let execution_timeout = config.arg_or("execution-timeout", (config.timeout * 9 / 10).max(1));
        let max_depth = config.arg_or("max-depth", DEFAULT_MAX_DEPTH);
        let mut cmd = vec![
            "myth".to_string(),
            "analyze".to_string(),
            target.target.clone(),
            "-o".to_string(),
            "json".to_string(),
            "--execution-timeout".to_string(),
            execution_timeout.to_string(),
            "--max-depth".to_string(),
            max_depth.to_string(),
        ];
        cmd.extend(config.extra_flags(&["execution-timeout", "max-depth"]));
        cmd
    }

    fn strategies(&self) -> &[Box<dyn ParseStrategy>] {
        &self.strategies
    }

    fn accepts(&self, output: &SandboxOutput, parsed: Option<&Parsed>) -> bool {
        parsed.is_some() || (output.exit_code == 0 && output.combined().contains(SUCCESS_MARKER))
    }
}

impl ToolAdapter for Mythril {
    fn name(&self) -> &str {
        NAME
    }

    fn layer(&self) -> AnalysisLayer {
        AnalysisLayer::Symbolic
    }

    fn description(&self) -> &str {
        "Mythril symbolic execution of EVM bytecode"
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

/// `-o json`: `{"success", "error", "issues": [...]}`, a `results` list,
/// or a bare list of issues.
struct JsonIssues;

impl ParseStrategy for JsonIssues {
    fn name(&self) -> &'static str {
        "mythril-json"
    }

    fn parse(&self, output: &SandboxOutput) -> ParseOutcome {
        parse_structured(output, issue_findings)
    }
}

fn issue_findings(doc: &Value) -> ParseOutcome {
    if doc.get("success").and_then(Value::as_bool) == Some(false) {
        let error = doc
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("no error message");
        return ParseOutcome::Unrecognized(format!("mythril reported failure: {error}"));
    }
    let issues = match doc {
        Value::Array(list) if list.iter().all(Value::is_object) => list,
        Value::Array(_) => return ParseOutcome::Unrecognized("JSON list is not an issue list".into()),
        Value::Object(map) => match map.get("issues").or_else(|| map.get("results")) {
            Some(Value::Array(list)) => list,
            _ => return ParseOutcome::Unrecognized("JSON has no issue list".into()),
        },
        _ => return ParseOutcome::Unrecognized("unexpected JSON shape".into()),
    };
    ParseOutcome::Parsed(issues.iter().filter_map(issue_finding).collect())
}

fn issue_finding(issue: &Value) -> Option<Finding> {
    issue.as_object()?;
    let text = |key: &str| issue.get(key).and_then(Value::as_str);

    let swc = ["swc-id", "swcID"]
        .iter()
        .find_map(|key| match issue.get(*key) {
            Some(Value::String(s)) => normalize_swc_id(s),
            Some(Value::Number(n)) => normalize_swc_id(&n.to_string()),
            _ => None,
        });
    let location = issue
        .get("lineno")
        .and_then(Value::as_u64)
        .filter(|line| *line > 0)
        .map(|line| {
            let location =
                VulnerabilityLocation::new(text("filename").unwrap_or_default(), line as usize, line as usize);
            match text("code") {
                Some(code) if !code.is_empty() => location.with_snippet(code),
                _ => location,
            }
        });

    let finding = Finding::new(
        NAME,
        text("title").unwrap_or("Unknown Issue"),
        text("description").unwrap_or_default(),
        swc.as_deref().map_or(VulnerabilityType::Unknown, type_for_swc),
        parse_severity(text("severity").unwrap_or("Medium")),
        CONFIDENCE,
    )
    .with_location(location)
    .with_raw(issue.clone())
    .with_cross_reference(swc.as_deref());
    Some(finding)
}

/// Default text report:
///
/// ```text
/// ==== External Call To User-Supplied Address ====
/// SWC ID: 107
/// Severity: Low
/// ...
/// --------------------
/// In file: Vault.sol:14
/// ```
struct TextIssues;

#[derive(Default)]
struct TextBlock<'a> {
    title: &'a str,
    swc: Option<String>,
    severity: Option<&'a str>,
    file: Option<(&'a str, usize)>,
    code: Vec<&'a str>,
    description: Vec<&'a str>,
}

impl TextBlock<'_> {
    fn into_finding(self) -> Finding {
        let location = self.file.map(|(file, line)| {
            let location = VulnerabilityLocation::new(file, line, line);
            if self.code.is_empty() {
                location
            } else {
                location.with_snippet(self.code.join("\n"))
            }
        });
        Finding::new(
            NAME,
            self.title,
            self.description.join("\n"),
            self.swc.as_deref().map_or(VulnerabilityType::Unknown, type_for_swc),
            parse_severity(self.severity.unwrap_or("Medium")),
            CONFIDENCE,
        )
        .with_location(location)
        .with_raw(json!({ "title": self.title, "swc_id": self.swc }))
        .with_cross_reference(self.swc.as_deref())
    }
}

impl ParseStrategy for TextIssues {
    fn name(&self) -> &'static str {
        "mythril-text"
    }

    fn parse(&self, output: &SandboxOutput) -> ParseOutcome {
        let text = output.combined();
        let mut findings = Vec::new();
        let mut current: Option<TextBlock<'_>> = None;
        let mut in_code = false;

        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(title) = trimmed
                .strip_prefix("====")
                .and_then(|rest| rest.strip_suffix("===="))
            {
                findings.extend(current.take().map(TextBlock::into_finding));
                current = Some(TextBlock {
                    title: title.trim(),
                    ..TextBlock::default()
                });
                in_code = false;
                continue;
            }
            let Some(block) = current.as_mut() else {
                continue;
            };
            if trimmed.starts_with("----") {
                in_code = false;
            } else if let Some(id) = trimmed.strip_prefix("SWC ID:") {
                block.swc = normalize_swc_id(id);
            } else if let Some(severity) = trimmed.strip_prefix("Severity:") {
                block.severity = Some(severity.trim());
            } else if let Some(loc) = trimmed.strip_prefix("In file:") {
                block.file = loc
                    .trim()
                    .rsplit_once(':')
                    .and_then(|(file, line)| Some((file, line.trim().parse().ok()?)));
                in_code = true;
            } else if trimmed.is_empty() {
                continue;
            } else if in_code {
                block.code.push(trimmed);
            } else if !is_metadata(trimmed) {
                block.description.push(trimmed);
            }
        }
        findings.extend(current.map(TextBlock::into_finding));

        if findings.is_empty() {
            ParseOutcome::Unrecognized("no `==== title ====` blocks".into())
        } else {
            ParseOutcome::Parsed(findings)
        }
    }
}

fn is_metadata(line: &str) -> bool {
    ["Contract:", "Function name:", "PC address:", "Estimated Gas Usage:", "Initial State:", "Transaction Sequence:"]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}
