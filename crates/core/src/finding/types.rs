use serde::{Deserialize, Serialize};

/// Severity levels ordered from most to least severe.
/// Derived `Ord` puts Critical < High < Medium < Low < Info: sorting ascending
/// ranks the worst first and `severity <= threshold` keeps "at least as bad".
/// Do NOT reorder these variants.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Weight used by the report risk score before confidence scaling.
    pub fn weight(self) -> f64 {
        match self {
            Severity::Critical => 10.0,
            Severity::High => 7.5,
            Severity::Medium => 5.0,
            Severity::Low => 2.5,
            Severity::Info => 0.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

/// Closed vulnerability taxonomy every tool's categories are folded into.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum VulnerabilityType {
    Reentrancy,
    IntegerOverflow,
    IntegerUnderflow,
    UnprotectedEther,
    UnprotectedSelfdestruct,
    UncheckedCall,
    UncheckedSend,
    AccessControl,
    Delegatecall,
    TimestampDependence,
    WeakRandomness,
    DosGasLimit,
    LogicError,
    Shadowing,
    FloatingPragma,
    OutdatedCompiler,
    Unknown,
}

impl VulnerabilityType {
    pub fn as_str(self) -> &'static str {
        match self {
            VulnerabilityType::Reentrancy => "reentrancy",
            VulnerabilityType::IntegerOverflow => "integer_overflow",
            VulnerabilityType::IntegerUnderflow => "integer_underflow",
            VulnerabilityType::UnprotectedEther => "unprotected_ether",
            VulnerabilityType::UnprotectedSelfdestruct => "unprotected_selfdestruct",
            VulnerabilityType::UncheckedCall => "unchecked_call",
            VulnerabilityType::UncheckedSend => "unchecked_send",
            VulnerabilityType::AccessControl => "access_control",
            VulnerabilityType::Delegatecall => "delegatecall",
            VulnerabilityType::TimestampDependence => "timestamp_dependence",
            VulnerabilityType::WeakRandomness => "weak_randomness",
            VulnerabilityType::DosGasLimit => "dos_gas_limit",
            VulnerabilityType::LogicError => "logic_error",
            VulnerabilityType::Shadowing => "shadowing",
            VulnerabilityType::FloatingPragma => "floating_pragma",
            VulnerabilityType::OutdatedCompiler => "outdated_compiler",
            VulnerabilityType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityLocation {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
}

impl VulnerabilityLocation {
    pub fn new(file_path: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Self {
            file_path: file_path.into(),
            start_line,
            end_line: end_line.max(start_line),
            code_snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        let snippet = snippet.into();
        if !snippet.trim().is_empty() {
            self.code_snippet = Some(snippet);
        }
        self
    }
}

/// Key under which adapters attach a cross-reference id to the raw payload.
pub const CROSS_REFERENCE_KEY: &str = "swc_id";

/// One normalized observation from one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub tool: String,
    pub title: String,
    pub description: String,
    pub vulnerability_type: VulnerabilityType,
    pub severity: Severity,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<VulnerabilityLocation>,
    #[serde(default)]
    pub raw_output: serde_json::Value,
}

impl Finding {
    /// Confidence is clamped into [0, 1]; NaN becomes 0.
    pub fn new(
        tool: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        vulnerability_type: VulnerabilityType,
        severity: Severity,
        confidence: f64,
    ) -> Self {
        Self {
            tool: tool.into(),
            title: title.into(),
            description: description.into(),
            vulnerability_type,
            severity,
            confidence: clamp_confidence(confidence),
            location: None,
            raw_output: serde_json::Value::Null,
        }
    }

    pub fn with_location(mut self, location: Option<VulnerabilityLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw_output = raw;
        self
    }

    /// Attach a cross-reference id (e.g. `SWC-107`) to the raw payload.
    /// A non-object payload is wrapped as `{"raw": <payload>}` first.
    pub fn with_cross_reference(mut self, id: Option<&str>) -> Self {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return self;
        };
        if !self.raw_output.is_object() {
            let previous = std::mem::take(&mut self.raw_output);
            let mut map = serde_json::Map::new();
            if !previous.is_null() {
                map.insert("raw".to_string(), previous);
            }
            self.raw_output = serde_json::Value::Object(map);
        }
        if let Some(map) = self.raw_output.as_object_mut() {
            map.insert(
                CROSS_REFERENCE_KEY.to_string(),
                serde_json::Value::String(id.to_string()),
            );
        }
        self
    }

    pub fn cross_reference(&self) -> Option<&str> {
        self.raw_output
            .get(CROSS_REFERENCE_KEY)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical < Severity::High);
        assert!(Severity::High < Severity::Medium);
        assert!(Severity::Low < Severity::Info);
        let mut sorted = vec![Severity::Info, Severity::Critical, Severity::Medium];
        sorted.sort();
        assert_eq!(sorted, vec![Severity::Critical, Severity::Medium, Severity::Info]);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let f = Finding::new("t", "a", "b", VulnerabilityType::Unknown, Severity::Low, 1.7);
        assert_eq!(f.confidence, 1.0);
        let f = Finding::new("t", "a", "b", VulnerabilityType::Unknown, Severity::Low, -0.2);
        assert_eq!(f.confidence, 0.0);
        let f = Finding::new("t", "a", "b", VulnerabilityType::Unknown, Severity::Low, f64::NAN);
        assert_eq!(f.confidence, 0.0);
    }

    #[test]
    fn test_cross_reference_on_object_payload() {
        let f = Finding::new("slither", "x", "y", VulnerabilityType::Reentrancy, Severity::High, 0.9)
            .with_raw(json!({"check": "reentrancy-eth"}))
            .with_cross_reference(Some("SWC-107"));
        assert_eq!(f.cross_reference(), Some("SWC-107"));
        assert_eq!(f.raw_output["check"], "reentrancy-eth");
    }

    #[test]
    fn test_cross_reference_wraps_scalar_payload() {
        let f = Finding::new("t", "x", "y", VulnerabilityType::Unknown, Severity::Info, 0.5)
            .with_raw(json!("plain text"))
            .with_cross_reference(Some("SWC-103"));
        assert_eq!(f.raw_output["raw"], "plain text");
        assert_eq!(f.cross_reference(), Some("SWC-103"));
    }

    #[test]
    fn test_empty_cross_reference_ignored() {
        let f = Finding::new("t", "x", "y", VulnerabilityType::Unknown, Severity::Info, 0.5)
            .with_cross_reference(Some(""));
        assert!(f.cross_reference().is_none());
        assert!(f.raw_output.is_null());
    }

    #[test]
    fn test_serializes_lowercase_enums() {
        let f = Finding::new("t", "x", "y", VulnerabilityType::DosGasLimit, Severity::Critical, 0.5);
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["severity"], "critical");
        assert_eq!(v["vulnerability_type"], "dos_gas_limit");
        assert!(v.get("location").is_none());
    }
}
