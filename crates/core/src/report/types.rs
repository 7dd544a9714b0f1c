use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::finding::{Finding, Severity};
use crate::tool::ToolResult;

use super::aggregate::compute_metrics;

/// Lifecycle of one analysis run. Terminal states are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl AnalysisStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AnalysisStatus::Completed
                | AnalysisStatus::Failed
                | AnalysisStatus::Timeout
                | AnalysisStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: AnalysisStatus) -> bool {
        match self {
            AnalysisStatus::Pending => matches!(
                next,
                AnalysisStatus::Running | AnalysisStatus::Failed | AnalysisStatus::Cancelled
            ),
            AnalysisStatus::Running => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Running => "running",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
            AnalysisStatus::Timeout => "timeout",
            AnalysisStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ReportError {
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: AnalysisStatus,
        to: AnalysisStatus,
    },
}

/// A finding promoted into the report, with a stable id and its
/// cross-reference id lifted out of the raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swc_id: Option<String>,
    #[serde(flatten)]
    pub finding: Finding,
}

impl Vulnerability {
    pub fn from_finding(id: String, finding: Finding) -> Self {
        Self {
            id,
            swc_id: finding.cross_reference().map(str::to_string),
            finding,
        }
    }

    pub fn severity(&self) -> Severity {
        self.finding.severity
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    pub total_vulnerabilities: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_swc: BTreeMap<String, usize>,
    /// Seconds per tool.
    pub tool_durations: BTreeMap<String, f64>,
    /// Sum of tool durations, in seconds.
    pub total_duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_avg: Option<f64>,
    pub risk_score: f64,
}

/// Source file covered by a run, identified by content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedContract {
    pub name: String,
    pub path: PathBuf,
    /// SHA-256 of the file contents, hex encoded.
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    pub contract_name: String,
    pub status: AnalysisStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub tools_used: Vec<String>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub tool_results: Vec<ToolResult>,
    pub metrics: AnalysisMetrics,
    pub contracts_analyzed: Vec<AnalyzedContract>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl AnalysisReport {
    /// Wall-clock duration; `None` until the run finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }

    pub fn has_critical_findings(&self) -> bool {
        self.vulnerabilities
            .iter()
            .any(|v| v.severity() == Severity::Critical)
    }

    pub fn vulnerabilities_by_severity(&self, severity: Severity) -> Vec<&Vulnerability> {
        self.vulnerabilities
            .iter()
            .filter(|v| v.severity() == severity)
            .collect()
    }

    /// Vulnerabilities at or above `min` severity.
    pub fn at_least(&self, min: Severity) -> impl Iterator<Item = &Vulnerability> {
        self.vulnerabilities
            .iter()
            .filter(move |v| v.severity() <= min)
    }

    /// Keep only vulnerabilities at or above `min` severity. Metrics are
    /// recomputed so they describe the vulnerabilities that remain.
    pub fn retain_at_least(&mut self, min: Severity) {
        let before = self.vulnerabilities.len();
        self.vulnerabilities.retain(|v| v.severity() <= min);
        let omitted = before - self.vulnerabilities.len();
        if omitted > 0 {
            self.metrics = compute_metrics(&self.vulnerabilities, &self.tool_results);
            self.notes
                .push(format!("{omitted} vulnerabilities below {min} severity omitted"));
        }
    }

    pub fn summary(&self) -> String {
        let duration = match self.duration() {
            Some(d) => format!("{:.1}s", d.num_milliseconds() as f64 / 1000.0),
            None => "in progress".to_string(),
        };
        let mut lines = vec![
            format!("Analysis Report for {}", self.contract_name),
            format!("Status: {}", self.status),
            format!("Duration: {duration}"),
            String::new(),
            "Findings Summary:".to_string(),
            format!("- Total Vulnerabilities: {}", self.metrics.total_vulnerabilities),
        ];
        for severity in Severity::ALL {
            let count = self
                .metrics
                .by_severity
                .get(severity.as_str())
                .copied()
                .unwrap_or(0);
            if count > 0 {
                lines.push(format!("  - {}: {count}", severity.as_str().to_uppercase()));
            }
        }
        lines.push(String::new());
        lines.push(format!("Risk Score: {:.1}/10", self.metrics.risk_score));
        lines.join("\n")
    }
}
