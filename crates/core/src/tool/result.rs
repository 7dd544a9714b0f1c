use serde::{Deserialize, Serialize};

use crate::finding::{Finding, Severity};

use super::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Failed,
    Timeout,
    Error,
}

impl ToolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Failed => "failed",
            ToolStatus::Timeout => "timeout",
            ToolStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one adapter invocation.
///
/// Built only through [`ToolResult::success`] and [`ToolResult::failure`]:
/// a non-success result never carries findings and always explains itself
/// through `error_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub status: ToolStatus,
    pub findings: Vec<Finding>,
    /// Wall-clock seconds.
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ToolResult {
    pub fn success(tool_name: impl Into<String>, findings: Vec<Finding>, execution_time: f64) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Success,
            findings,
            execution_time: execution_time.max(0.0),
            raw_output: None,
            error_message: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn failure(tool_name: impl Into<String>, error: &ToolError, execution_time: f64) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: error.status(),
            findings: Vec::new(),
            execution_time: execution_time.max(0.0),
            raw_output: None,
            error_message: Some(error.to_string()),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if !raw.is_empty() {
            self.raw_output = Some(raw);
        }
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    pub fn has_critical(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Critical)
    }

    /// Set when the tool was never actually run (unavailable, not initialized).
    pub fn is_skipped(&self) -> bool {
        self.metadata
            .get("skipped")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::VulnerabilityType;

    #[test]
    fn test_failure_has_no_findings_and_a_message() {
        let r = ToolResult::failure("mythril", &ToolError::Execution("exit 2".into()), 1.5);
        assert_eq!(r.status, ToolStatus::Error);
        assert!(r.findings.is_empty());
        assert!(r.error_message.unwrap().contains("exit 2"));
    }

    #[test]
    fn test_has_critical() {
        let f = Finding::new("t", "x", "", VulnerabilityType::Unknown, Severity::Critical, 1.0);
        let r = ToolResult::success("t", vec![f], 0.1);
        assert!(r.has_critical());
        assert!(!ToolResult::success("t", vec![], 0.1).has_critical());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ToolStatus::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
    }

    #[test]
    fn test_skipped_flag() {
        let r = ToolResult::failure("slither", &ToolError::Unavailable("no docker".into()), 0.0)
            .with_metadata("skipped", true);
        assert!(r.is_skipped());
        assert_eq!(r.status, ToolStatus::Failed);
    }
}
