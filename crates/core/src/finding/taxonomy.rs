//! Fixed vocabulary tables shared by the tool adapters.
//!
//! Cross-reference ids come from a static, hand-maintained table
//! ([`swc_id`]). This is the extension point for deriving them from an
//! external weakness registry later on.

use super::types::{Severity, VulnerabilityType};

/// Map a tool severity word onto [`Severity`]. Unrecognized words are `Medium`.
pub fn parse_severity(word: &str) -> Severity {
    match word.trim().to_ascii_lowercase().as_str() {
        "critical" => Severity::Critical,
        "high" => Severity::High,
        "medium" | "warning" => Severity::Medium,
        "low" => Severity::Low,
        "info" | "informational" | "optimization" | "note" => Severity::Info,
        _ => Severity::Medium,
    }
}

/// Standard weakness id for a vulnerability type, when one exists.
pub fn swc_id(vuln_type: VulnerabilityType) -> Option<&'static str> {
    match vuln_type {
        VulnerabilityType::Reentrancy => Some("SWC-107"),
        VulnerabilityType::IntegerOverflow | VulnerabilityType::IntegerUnderflow => {
            Some("SWC-101")
        }
        VulnerabilityType::UnprotectedSelfdestruct => Some("SWC-106"),
        VulnerabilityType::UnprotectedEther => Some("SWC-105"),
        VulnerabilityType::UncheckedCall => Some("SWC-104"),
        VulnerabilityType::FloatingPragma => Some("SWC-103"),
        VulnerabilityType::OutdatedCompiler => Some("SWC-102"),
        VulnerabilityType::Delegatecall => Some("SWC-112"),
        VulnerabilityType::WeakRandomness => Some("SWC-120"),
        VulnerabilityType::TimestampDependence => Some("SWC-116"),
        VulnerabilityType::Shadowing => Some("SWC-119"),
        VulnerabilityType::UncheckedSend => Some("SWC-113"),
        VulnerabilityType::AccessControl => Some("SWC-115"),
        VulnerabilityType::DosGasLimit => Some("SWC-128"),
        VulnerabilityType::LogicError | VulnerabilityType::Unknown => None,
    }
}

/// Vulnerability type for a standard weakness id (`SWC-107`, `107`, `swc-107`).
pub fn type_for_swc(id: &str) -> VulnerabilityType {
    match normalize_swc_id(id).as_deref() {
        Some("SWC-101") => VulnerabilityType::IntegerOverflow,
        Some("SWC-102") => VulnerabilityType::OutdatedCompiler,
        Some("SWC-103") => VulnerabilityType::FloatingPragma,
        Some("SWC-104") => VulnerabilityType::UncheckedCall,
        Some("SWC-105") => VulnerabilityType::UnprotectedEther,
        Some("SWC-106") => VulnerabilityType::UnprotectedSelfdestruct,
        Some("SWC-107") => VulnerabilityType::Reentrancy,
        Some("SWC-110") => VulnerabilityType::LogicError,
        Some("SWC-112") => VulnerabilityType::Delegatecall,
        Some("SWC-113") => VulnerabilityType::UncheckedSend,
        Some("SWC-115") | Some("SWC-124") => VulnerabilityType::AccessControl,
        Some("SWC-116") => VulnerabilityType::TimestampDependence,
        Some("SWC-119") => VulnerabilityType::Shadowing,
        Some("SWC-120") => VulnerabilityType::WeakRandomness,
        Some("SWC-128") => VulnerabilityType::DosGasLimit,
        _ => VulnerabilityType::Unknown,
    }
}

/// Canonical `SWC-<n>` form, or `None` when `id` carries no number.
pub fn normalize_swc_id(id: &str) -> Option<String> {
    let trimmed = id.trim();
    let digits = trimmed
        .strip_prefix("SWC-")
        .or_else(|| trimmed.strip_prefix("swc-"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("SWC-{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_severity_defaults_to_medium() {
        assert_eq!(parse_severity("High"), Severity::High);
        assert_eq!(parse_severity("Informational"), Severity::Info);
        assert_eq!(parse_severity("Optimization"), Severity::Info);
        assert_eq!(parse_severity("catastrophic"), Severity::Medium);
        assert_eq!(parse_severity(""), Severity::Medium);
    }

    #[test]
    fn test_normalize_swc_id() {
        assert_eq!(normalize_swc_id("107").as_deref(), Some("SWC-107"));
        assert_eq!(normalize_swc_id("SWC-101").as_deref(), Some("SWC-101"));
        assert_eq!(normalize_swc_id(" swc-116 ").as_deref(), Some("SWC-116"));
        assert_eq!(normalize_swc_id(""), None);
        assert_eq!(normalize_swc_id("SWC-"), None);
        assert_eq!(normalize_swc_id("abc"), None);
    }

    #[test]
    fn test_swc_round_trip_for_mapped_types() {
        // IntegerUnderflow shares SWC-101 with IntegerOverflow.
        for t in [
            VulnerabilityType::Reentrancy,
            VulnerabilityType::IntegerOverflow,
            VulnerabilityType::UnprotectedEther,
            VulnerabilityType::UnprotectedSelfdestruct,
            VulnerabilityType::UncheckedCall,
            VulnerabilityType::UncheckedSend,
            VulnerabilityType::AccessControl,
            VulnerabilityType::Delegatecall,
            VulnerabilityType::TimestampDependence,
            VulnerabilityType::WeakRandomness,
            VulnerabilityType::DosGasLimit,
            VulnerabilityType::Shadowing,
            VulnerabilityType::FloatingPragma,
            VulnerabilityType::OutdatedCompiler,
        ] {
            let id = swc_id(t).unwrap();
            assert_eq!(type_for_swc(id), t, "{id}");
        }
        assert_eq!(type_for_swc("SWC-101"), VulnerabilityType::IntegerOverflow);
    }

    #[test]
    fn test_unmapped_swc_is_unknown() {
        assert_eq!(type_for_swc("SWC-999"), VulnerabilityType::Unknown);
        assert_eq!(type_for_swc("not-an-id"), VulnerabilityType::Unknown);
        assert_eq!(swc_id(VulnerabilityType::Unknown), None);
    }
}
