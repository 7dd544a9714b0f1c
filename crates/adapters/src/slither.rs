use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{json, Value};

use vulnhunter::config::{AnalysisLayer, ToolConfig};
use vulnhunter::finding::taxonomy::{parse_severity, swc_id};
use vulnhunter::finding::{Finding, Severity, VulnerabilityLocation, VulnerabilityType};
use vulnhunter::pipeline::solidity_sources;
use vulnhunter::sandbox::{ExecutionContext, Sandbox, SandboxOutput};
use vulnhunter::tool::parse::parse_structured;
use vulnhunter::tool::{
    ContainerTool, ParseOutcome, ParseStrategy, Parsed, ResolvedTarget, ToolAdapter, ToolDriver,
    ToolError, ToolResult,
};

use crate::discover;

pub const NAME: &str = "slither";

/// Confidence given to findings recovered from the human-readable report.
const TEXT_CONFIDENCE: f64 = 0.7;

/// Known detectors: check id, wiki anchor, type, default impact.
const DETECTORS: &[(&str, &str, VulnerabilityType, Severity)] = &[
    ("reentrancy-eth", "reentrancy-vulnerabilities", VulnerabilityType::Reentrancy, Severity::High),
    ("reentrancy-no-eth", "reentrancy-vulnerabilities-1", VulnerabilityType::Reentrancy, Severity::Medium),
    ("reentrancy-benign", "reentrancy-vulnerabilities-2", VulnerabilityType::Reentrancy, Severity::Low),
    ("reentrancy-events", "reentrancy-vulnerabilities-3", VulnerabilityType::Reentrancy, Severity::Low),
    ("reentrancy-unlimited-gas", "reentrancy-vulnerabilities-4", VulnerabilityType::Reentrancy, Severity::Info),
    ("unprotected-upgrade", "unprotected-upgradeable-contract", VulnerabilityType::AccessControl, Severity::High),
    ("suicidal", "suicidal", VulnerabilityType::UnprotectedSelfdestruct, Severity::High),
    ("unchecked-transfer", "unchecked-transfer", VulnerabilityType::UncheckedCall, Severity::High),
    ("unchecked-lowlevel", "unchecked-low-level-calls", VulnerabilityType::UncheckedCall, Severity::Medium),
    ("unchecked-send", "unchecked-send", VulnerabilityType::UncheckedSend, Severity::Medium),
    ("arbitrary-send", "functions-that-send-ether-to-arbitrary-destinations", VulnerabilityType::UnprotectedEther, Severity::High),
    ("arbitrary-send-eth", "functions-that-send-ether-to-arbitrary-destinations", VulnerabilityType::UnprotectedEther, Severity::High),
    ("controlled-delegatecall", "controlled-delegatecall", VulnerabilityType::Delegatecall, Severity::High),
    ("delegatecall-loop", "payable-functions-using-delegatecall-inside-a-loop", VulnerabilityType::Delegatecall, Severity::High),
    ("timestamp", "block-timestamp", VulnerabilityType::TimestampDependence, Severity::Low),
    ("weak-prng", "weak-PRNG", VulnerabilityType::WeakRandomness, Severity::High),
    ("divide-before-multiply", "divide-before-multiply", VulnerabilityType::IntegerOverflow, Severity::Medium),
    ("locked-ether", "contracts-that-lock-ether", VulnerabilityType::LogicError, Severity::Medium),
    ("tx-origin", "dangerous-usage-of-txorigin", VulnerabilityType::AccessControl, Severity::Medium),
    ("shadowing-state", "state-variable-shadowing", VulnerabilityType::Shadowing, Severity::High),
    ("incorrect-equality", "dangerous-strict-equalities", VulnerabilityType::LogicError, Severity::Medium),
    ("uninitialized-state", "uninitialized-state-variables", VulnerabilityType::LogicError, Severity::High),
    ("uninitialized-storage", "uninitialized-storage-variables", VulnerabilityType::LogicError, Severity::High),
    ("uninitialized-local", "uninitialized-local-variables", VulnerabilityType::LogicError, Severity::Medium),
    ("pragma", "different-pragma-directives-are-used", VulnerabilityType::FloatingPragma, Severity::Info),
    ("solc-version", "incorrect-versions-of-solidity", VulnerabilityType::OutdatedCompiler, Severity::Info),
];

/// Vulnerability type for a Slither check id; unmapped checks are `Unknown`.
pub fn detector_type(check: &str) -> VulnerabilityType {
    DETECTORS
        .iter()
        .find(|(id, ..)| *id == check)
        .map(|(_, _, t, _)| *t)
        .unwrap_or(VulnerabilityType::Unknown)
}

fn check_for_anchor(anchor: &str) -> Option<&'static str> {
    DETECTORS
        .iter()
        .find(|(_, a, ..)| a.eq_ignore_ascii_case(anchor))
        .map(|(id, ..)| *id)
}

fn default_impact(check: &str) -> Severity {
    DETECTORS
        .iter()
        .find(|(id, ..)| *id == check)
        .map(|(.., s)| *s)
        .unwrap_or(Severity::Medium)
}

fn confidence_score(word: &str) -> f64 {
    match word {
        "High" => 0.9,
        "Medium" => 0.7,
        "Low" => 0.5,
        _ => 0.7,
    }
}

/// Slither static analyzer.
pub struct Slither {
    tool: ContainerTool,
    strategies: Vec<Box<dyn ParseStrategy>>,
}

impl Slither {
    pub fn new(config: ToolConfig, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            tool: ContainerTool::new(NAME, config, sandbox),
            strategies: vec![Box::new(JsonReport), Box::new(TextReport)],
        }
    }
}

impl ToolDriver for Slither {
    fn resolve(&self, path: &Path) -> Result<ResolvedTarget, ToolError> {
        if path.is_file() {
            return discover::solidity_file(path);
        }
        if !path.is_dir() {
            return Err(discover::missing(path));
        }
        let sources = solidity_sources(path);
        if sources.is_empty() {
            return Err(ToolError::Execution(format!(
                "no Solidity sources found in {}",
                path.display()
            )));
        }
        Ok(ResolvedTarget {
            mount_dir: path.to_path_buf(),
            target: ".".to_string(),
            sources,
        })
    }

    fn command(&self, target: &ResolvedTarget, config: &ToolConfig) -> Vec<String> {
        let mut cmd = vec![
            "slither".to_string(),
            target.target.clone(),
            "--json".to_string(),
            "-".to_string(),
        ];
        cmd.extend(config.extra_flags(&[]));
        cmd
    }

    fn strategies(&self) -> &[Box<dyn ParseStrategy>] {
        &self.strategies
    }

    fn accepts(&self, output: &SandboxOutput, parsed: Option<&Parsed>) -> bool {
        if parsed.is_some() {
            return true;
        }
        let text = output.combined();
        text.contains("\"success\": true") || text.contains("analyzed (")
    }
}

impl ToolAdapter for Slither {
    fn name(&self) -> &str {
        NAME
    }

    fn layer(&self) -> AnalysisLayer {
        AnalysisLayer::Static
    }

    fn description(&self) -> &str {
        "Slither static analyzer (detector suite over the Solidity AST)"
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

/// `--json` report: `{"success", "error", "results": {"detectors": [...]}}`.
struct JsonReport;

impl ParseStrategy for JsonReport {
    fn name(&self) -> &'static str {
        "slither-json"
    }

    fn parse(&self, output: &SandboxOutput) -> ParseOutcome {
        parse_structured(output, report_findings)
    }
}

fn report_findings(doc: &Value) -> ParseOutcome {
    if doc.get("success").is_none() && doc.get("results").is_none() {
        return ParseOutcome::Unrecognized("JSON is not a slither report".into());
    }
    if doc.get("success").and_then(Value::as_bool) == Some(false) {
        let error = doc
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("no error message");
        return ParseOutcome::Unrecognized(format!("slither reported failure: {error}"));
    }
    let findings = doc
        .pointer("/results/detectors")
        .and_then(Value::as_array)
        .map(|detectors| detectors.iter().filter_map(detector_finding).collect())
        .unwrap_or_default();
    ParseOutcome::Parsed(findings)
}

fn detector_finding(detector: &Value) -> Option<Finding> {
    detector.as_object()?;
    let text = |key: &str| detector.get(key).and_then(Value::as_str);

    let check = text("check").unwrap_or("unknown");
    let vuln_type = detector_type(check);
    let finding = Finding::new(
        NAME,
        check,
        text("description").unwrap_or_default().trim(),
        vuln_type,
        parse_severity(text("impact").unwrap_or("Medium")),
        confidence_score(text("confidence").unwrap_or("Medium")),
    )
    .with_location(element_location(detector))
    .with_raw(detector.clone())
    .with_cross_reference(swc_id(vuln_type));
    Some(finding)
}

fn element_location(detector: &Value) -> Option<VulnerabilityLocation> {
    let element = detector.get("elements")?.as_array()?.first()?;
    let mapping = element.get("source_mapping")?;
    let file = ["filename", "filename_relative", "filename_short", "filename_absolute"]
        .iter()
        .find_map(|key| mapping.get(*key).and_then(Value::as_str))
        .filter(|f| !f.is_empty())?;
    let lines: Vec<usize> = mapping
        .get("lines")
        .and_then(Value::as_array)
        .map(|l| l.iter().filter_map(|n| n.as_u64()).map(|n| n as usize).collect())
        .unwrap_or_default();
    let start = lines.first().copied().unwrap_or(0);
    let end = lines.last().copied().unwrap_or(start);
    let location = VulnerabilityLocation::new(file, start, end);
    Some(match element.get("source").and_then(Value::as_str) {
        Some(snippet) if !snippet.is_empty() => location.with_snippet(snippet),
        _ => location,
    })
}

fn location_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^()\s]+)#(\d+)(?:-(\d+))?\)").expect("valid regex"))
}

/// Human-readable report: blocks of text, each closed by a
/// `Reference: <wiki url>#<anchor>` line.
struct TextReport;

impl ParseStrategy for TextReport {
    fn name(&self) -> &'static str {
        "slither-text"
    }

    fn parse(&self, output: &SandboxOutput) -> ParseOutcome {
        let text = output.combined();
        let mut findings = Vec::new();
        let mut block: Vec<&str> = Vec::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("INFO:") || trimmed.starts_with("WARNING:") || trimmed.starts_with("ERROR:") {
                block.clear();
            } else if let Some(url) = trimmed.strip_prefix("Reference:") {
                if let Some(finding) = text_finding(&block, url.trim()) {
                    findings.push(finding);
                }
                block.clear();
            } else if !trimmed.is_empty() {
                block.push(line.trim_end());
            }
        }
        if findings.is_empty() {
            ParseOutcome::Unrecognized("no `Reference:` blocks".into())
        } else {
            ParseOutcome::Parsed(findings)
        }
    }
}

fn text_finding(block: &[&str], reference: &str) -> Option<Finding> {
    let title = block.first()?.trim();
    let anchor = reference.rsplit_once('#').map(|(_, a)| a).unwrap_or("");
    let check = check_for_anchor(anchor).unwrap_or(if anchor.is_empty() { "unknown" } else { anchor });
    let vuln_type = detector_type(check);

    let location = block.iter().find_map(|line| {
        let caps = location_regex().captures(line)?;
        let start: usize = caps.get(2)?.as_str().parse().ok()?;
        let end = caps
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(start);
        Some(VulnerabilityLocation::new(caps.get(1)?.as_str(), start, end))
    });

    Some(
        Finding::new(
            NAME,
            check,
            block.join("\n"),
            vuln_type,
            default_impact(check),
            TEXT_CONFIDENCE,
        )
        .with_location(location)
        .with_raw(json!({ "check": check, "title": title, "reference": reference }))
        .with_cross_reference(swc_id(vuln_type)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdout(s: &str, exit_code: i32) -> SandboxOutput {
        SandboxOutput {
            stdout: s.to_string(),
            stderr: String::new(),
            exit_code,
        }
    }

    const REENTRANCY_JSON: &str = r#"{
      "success": true,
      "error": null,
      "results": {
        "detectors": [
          {
            "check": "reentrancy-eth",
            "impact": "High",
            "confidence": "Medium",
            "description": "Reentrancy in Vault.withdraw(uint256) (Vault.sol#10-16):\n",
            "elements": [
              {
                "type": "function",
                "name": "withdraw",
                "source_mapping": {
                  "filename_relative": "Vault.sol",
                  "lines": [10, 11, 12, 13, 14, 15, 16]
                }
              }
            ]
          },
          {
            "check": "some-new-detector",
            "impact": "Optimization",
            "confidence": "High",
            "description": "new detector",
            "elements": []
          }
        ]
      }
    }"#;

    #[test]
    fn test_json_report() {
        let ParseOutcome::Parsed(findings) = JsonReport.parse(&stdout(REENTRANCY_JSON, 255)) else {
            panic!("expected parsed output");
        };
        assert_eq!(findings.len(), 2);

        let r = &findings[0];
        assert_eq!(r.vulnerability_type, VulnerabilityType::Reentrancy);
        assert_eq!(r.severity, Severity::High);
        assert_eq!(r.confidence, 0.7);
        assert_eq!(r.cross_reference(), Some("SWC-107"));
        let loc = r.location.as_ref().unwrap();
        assert_eq!((loc.file_path.as_str(), loc.start_line, loc.end_line), ("Vault.sol", 10, 16));

        // Unmapped checks still surface.
        assert_eq!(findings[1].vulnerability_type, VulnerabilityType::Unknown);
        assert_eq!(findings[1].severity, Severity::Info);
        assert!(findings[1].location.is_none());
        assert_eq!(findings[1].cross_reference(), None);
    }

    #[test]
    fn test_json_without_detectors_is_clean_run() {
        let out = stdout(r#"{"success": true, "error": null, "results": {}}"#, 0);
        assert_eq!(JsonReport.parse(&out), ParseOutcome::Parsed(vec![]));
    }

    #[test]
    fn test_json_failure_is_unrecognized() {
        let out = stdout(r#"{"success": false, "error": "Invalid compilation", "results": {}}"#, 1);
        assert!(matches!(
            JsonReport.parse(&out),
            ParseOutcome::Unrecognized(ref m) if m.contains("Invalid compilation")
        ));
    }

    #[test]
    fn test_stray_json_before_report_is_skipped() {
        let noisy = format!("Compilation warnings: [1]\n{{}}\n{REENTRANCY_JSON}");
        assert!(matches!(
            JsonReport.parse(&stdout(&noisy, 255)),
            ParseOutcome::Parsed(ref f) if f.len() == 2
        ));
    }

    #[test]
    fn test_wrapped_json_report() {
        let wrapped = json!({
            "status": "success",
            "returncode": 255,
            "stdout": REENTRANCY_JSON,
            "stderr": ""
        });
        let out = stdout(&wrapped.to_string(), 0);
        assert!(matches!(JsonReport.parse(&out), ParseOutcome::Parsed(ref f) if f.len() == 2));
    }

    #[test]
    fn test_text_report() {
        let text = "\
INFO:Detectors:
Reentrancy in Vault.withdraw(uint256) (contracts/Vault.sol#10-16):
\tExternal calls:
\t- (ok,None) = msg.sender.call{value: amount}() (contracts/Vault.sol#12)
Reference: https://github.com/crytic/slither/wiki/Detector-Documentation#reentrancy-vulnerabilities
INFO:Detectors:
Pragma version^0.8.0 (contracts/Vault.sol#2) allows old versions
Reference: https://github.com/crytic/slither/wiki/Detector-Documentation#some-future-anchor
INFO:Slither:. analyzed (1 contracts with 93 detectors), 2 result(s) found
";
        let ParseOutcome::Parsed(findings) = TextReport.parse(&stdout(text, 1)) else {
            panic!("expected parsed output");
        };
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].title, "reentrancy-eth");
        assert_eq!(findings[0].severity, Severity::High);
        let loc = findings[0].location.as_ref().unwrap();
        assert_eq!((loc.start_line, loc.end_line), (10, 16));
        assert_eq!(findings[1].vulnerability_type, VulnerabilityType::Unknown);
        assert_eq!(findings[1].title, "some-future-anchor");
    }

    #[test]
    fn test_markers() {
        let slither = Slither::new(ToolConfig::default(), Arc::new(vulnhunter::sandbox::ContainerSandbox::default()));
        let clean = stdout("INFO:Slither:. analyzed (3 contracts with 93 detectors), 0 result(s) found", 0);
        assert!(slither.accepts(&clean, None));
        assert!(!slither.accepts(&stdout("Traceback (most recent call last):", 1), None));
    }

    #[test]
    fn test_command() {
        let slither = Slither::new(ToolConfig::default(), Arc::new(vulnhunter::sandbox::ContainerSandbox::default()));
        let target = ResolvedTarget {
            mount_dir: "/tmp".into(),
            target: "Vault.sol".into(),
            sources: vec![],
        };
        assert_eq!(
            slither.command(&target, &ToolConfig::default()),
            vec!["slither", "Vault.sol", "--json", "-"]
        );
    }

    #[test]
    fn test_locked_ether_maps_to_logic_error() {
        assert_eq!(detector_type("locked-ether"), VulnerabilityType::LogicError);
        assert_eq!(detector_type("brand-new"), VulnerabilityType::Unknown);
    }
}
