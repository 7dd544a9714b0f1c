use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::json;
use vulnhunter::finding::Severity;
use vulnhunter::report::{AnalysisReport, AnalysisStatus, Vulnerability};

/// Render SARIF 2.1.0 output for GitHub Code Scanning integration
pub fn render(report: &AnalysisReport) -> Result<String> {
    // One rule per (tool, check), in a stable order
    let mut rules_by_id: BTreeMap<String, &Vulnerability> = BTreeMap::new();
    for vuln in &report.vulnerabilities {
        rules_by_id.entry(rule_id(vuln)).or_insert(vuln);
    }
    let rule_index: BTreeMap<&str, usize> = rules_by_id
        .keys()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let rules: Vec<serde_json::Value> = rules_by_id
        .iter()
        .map(|(id, vuln)| {
            let mut rule = json!({
                "id": id,
                "shortDescription": { "text": vuln.finding.title },
                "defaultConfiguration": {
                    "level": severity_to_sarif_level(vuln.severity())
                },
                "properties": {
                    "tool": vuln.finding.tool,
                    "category": vuln.finding.vulnerability_type.as_str()
                }
            });
            if let Some(swc) = &vuln.swc_id {
                rule["helpUri"] = json!(format!("https://swcregistry.io/docs/{swc}"));
                rule["properties"]["swc"] = json!(swc);
            }
            rule
        })
        .collect();

    let results: Vec<serde_json::Value> = report
        .vulnerabilities
        .iter()
        .map(|v| {
            let f = &v.finding;
            let id = rule_id(v);
            let message = if f.description.trim().is_empty() {
                f.title.clone()
            } else {
                f.description.trim().to_string()
            };
            let locations: Vec<serde_json::Value> = f
                .location
                .iter()
                .map(|loc| {
                    let mut region = json!({
                        "startLine": loc.start_line.max(1),
                        "endLine": loc.end_line.max(loc.start_line).max(1)
                    });
                    if let Some(snippet) = &loc.code_snippet {
                        region["snippet"] = json!({ "text": snippet });
                    }
                    json!({
                        "physicalLocation": {
                            "artifactLocation": { "uri": loc.file_path },
                            "region": region
                        }
                    })
                })
                .collect();

            json!({
                "ruleId": id,
                "ruleIndex": rule_index.get(id.as_str()),
                "level": severity_to_sarif_level(f.severity),
                "message": { "text": message },
                "locations": locations,
                "properties": {
                    "id": v.id,
                    "severity": f.severity.as_str(),
                    "confidence": f.confidence
                }
            })
        })
        .collect();

    // Tools that did not finish cleanly surface as notifications
    let notifications: Vec<serde_json::Value> = report
        .tool_results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| {
            json!({
                "level": "error",
                "message": {
                    "text": format!(
                        "{} {}: {}",
                        r.tool_name,
                        r.status,
                        r.error_message.as_deref().unwrap_or("no details")
                    )
                }
            })
        })
        .collect();

    let sarif = json!({
        "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/main/sarif-2.1/schema/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "vulnhunter",
                    "version": env!("CARGO_PKG_VERSION"),
                    "informationUri": "https://github.com/vulnhunter/vulnhunter",
                    "rules": rules
                }
            },
            "invocations": [{
                "executionSuccessful": report.status == AnalysisStatus::Completed,
                "toolExecutionNotifications": notifications
            }],
            "results": results
        }]
    });

    let json = serde_json::to_string_pretty(&sarif)?;
    Ok(format!("{json}\n"))
}

fn rule_id(vuln: &Vulnerability) -> String {
    format!("{}/{}", vuln.finding.tool, vuln.finding.title)
}

fn severity_to_sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low | Severity::Info => "note",
    }
}
