use std::fmt::Write;

use colored::Colorize;
use vulnhunter::finding::Severity;
use vulnhunter::report::{AnalysisReport, AnalysisStatus};
use vulnhunter::tool::ToolStatus;

/// Longest description excerpt shown per vulnerability.
const MAX_DESCRIPTION_LINES: usize = 4;

pub fn render(report: &AnalysisReport, quiet: bool, no_color: bool) -> String {
    if no_color {
        colored::control::set_override(false);
    }
    let mut out = String::new();

    if !quiet {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "  vulnhunter - Smart Contract Security Analysis".bold());
        let _ = writeln!(out, "  Target: {}", report.contract_name);
        if let Some(address) = &report.contract_address {
            let _ = writeln!(out, "  Address: {address}");
        }
        let _ = writeln!(out, "  Files analyzed: {}", report.contracts_analyzed.len());
        let _ = writeln!(out, "  Status: {}", status_label(report.status));
        let _ = writeln!(out);
    }

    if report.vulnerabilities.is_empty() && !quiet {
        let _ = writeln!(out, "  {} No issues found.", "✓".green().bold());
        let _ = writeln!(out);
    }

    for vuln in &report.vulnerabilities {
        let finding = &vuln.finding;
        let severity_label = match finding.severity {
            Severity::Critical => "CRITICAL".red().bold().reversed(),
            Severity::High => "HIGH".red().bold(),
            Severity::Medium => "MEDIUM".yellow().bold(),
            Severity::Low => "LOW".blue(),
            Severity::Info => "INFO".dimmed(),
        };
        let swc = vuln
            .swc_id
            .as_deref()
            .map(|id| format!(" {id}"))
            .unwrap_or_default();

        let _ = writeln!(
            out,
            "  [{}] {} ({}, {}){}",
            severity_label, finding.title, finding.tool, finding.vulnerability_type, swc
        );
        for line in finding
            .description
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(MAX_DESCRIPTION_LINES)
        {
            let _ = writeln!(out, "    {}", line.trim_end());
        }
        if let Some(loc) = &finding.location {
            let _ = writeln!(out, "    {} {}:{}", "-->".dimmed(), loc.file_path, loc.start_line);
            if let Some(snippet) = &loc.code_snippet {
                for line in snippet.lines() {
                    let _ = writeln!(out, "    {} {}", "|".dimmed(), line);
                }
            }
        }
        let _ = writeln!(
            out,
            "    {} {}  confidence {:.0}%",
            "id".dimmed(),
            vuln.id,
            finding.confidence * 100.0
        );
        let _ = writeln!(out);
    }

    if quiet {
        return out;
    }

    let _ = writeln!(out, "{}", "  Tools".bold().underline());
    for result in &report.tool_results {
        let status = match result.status {
            ToolStatus::Success => result.status.as_str().green(),
            ToolStatus::Timeout => result.status.as_str().yellow(),
            ToolStatus::Failed | ToolStatus::Error => result.status.as_str().red(),
        };
        let detail = match &result.error_message {
            Some(message) => message.clone(),
            None => format!("{} findings", result.findings.len()),
        };
        let cached = if result.metadata.get("cached").and_then(|v| v.as_bool()) == Some(true) {
            " (cached)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "    {:<10} {} {:>7.1}s  {}{}",
            result.tool_name, status, result.execution_time, detail, cached
        );
    }
    for note in &report.notes {
        let _ = writeln!(out, "    {} {}", "note:".dimmed(), note);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "{}", "  Summary".bold().underline());
    for severity in Severity::ALL {
        let count = report
            .metrics
            .by_severity
            .get(severity.as_str())
            .copied()
            .unwrap_or(0);
        let label = format!("{}:", capitalize(severity.as_str()));
        let _ = writeln!(out, "    {label:<14} {count}");
    }
    let _ = writeln!(out, "    {:<14} {}", "Total:", report.metrics.total_vulnerabilities);
    let _ = writeln!(out, "    {:<14} {:.1}/10", "Risk score:", report.metrics.risk_score);
    let _ = writeln!(out);

    out
}

fn status_label(status: AnalysisStatus) -> colored::ColoredString {
    match status {
        AnalysisStatus::Completed => status.as_str().green(),
        AnalysisStatus::Timeout | AnalysisStatus::Cancelled => status.as_str().yellow(),
        _ => status.as_str().red(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("critical"), "Critical");
        assert_eq!(capitalize(""), "");
    }
}
