//! Merging tool results into report-level vulnerabilities and metrics.
//!
//! Everything here is independent of the order in which tool results
//! arrive: vulnerabilities are put in a canonical order and floating point
//! sums always run over sorted terms.

use std::collections::BTreeMap;

use crate::finding::Severity;
use crate::tool::ToolResult;

use super::types::{AnalysisMetrics, Vulnerability};

/// Upper bound of the risk score.
pub const MAX_RISK_SCORE: f64 = 10.0;

/// Promote every finding to a [`Vulnerability`] with id `<tool>-<n>`
/// (1-based position within that tool's findings), most severe first.
pub fn promote(results: &[ToolResult]) -> Vec<Vulnerability> {
    let mut keyed: Vec<(Severity, &str, usize, Vulnerability)> = results
        .iter()
        .flat_map(|result| {
            result.findings.iter().enumerate().map(move |(idx, finding)| {
                let n = idx + 1;
                let vuln =
                    Vulnerability::from_finding(format!("{}-{n}", result.tool_name), finding.clone());
                (finding.severity, result.tool_name.as_str(), n, vuln)
            })
        })
        .collect();
    keyed.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
    keyed.into_iter().map(|(_, _, _, v)| v).collect()
}

/// Risk score in `[0, 10]`: mean of severity weight times confidence.
/// Zero when there is nothing to score.
pub fn risk_score(vulnerabilities: &[Vulnerability]) -> f64 {
    if vulnerabilities.is_empty() {
        return 0.0;
    }
    let weights: Vec<f64> = vulnerabilities
        .iter()
        .map(|v| v.finding.severity.weight() * v.finding.confidence)
        .collect();
    (sorted_sum(weights) / vulnerabilities.len() as f64).min(MAX_RISK_SCORE)
}

pub fn compute_metrics(vulnerabilities: &[Vulnerability], results: &[ToolResult]) -> AnalysisMetrics {
    let mut by_severity: BTreeMap<String, usize> = Severity::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let mut by_type = BTreeMap::new();
    let mut by_swc = BTreeMap::new();

    for vuln in vulnerabilities {
        *by_severity
            .entry(vuln.finding.severity.as_str().to_string())
            .or_insert(0) += 1;
        *by_type
            .entry(vuln.finding.vulnerability_type.as_str().to_string())
            .or_insert(0) += 1;
        if let Some(swc) = &vuln.swc_id {
            *by_swc.entry(swc.clone()).or_insert(0) += 1;
        }
    }

    let mut tool_durations: BTreeMap<String, f64> = BTreeMap::new();
    for result in results {
        *tool_durations.entry(result.tool_name.clone()).or_insert(0.0) += result.execution_time;
    }
    let total_duration = sorted_sum(tool_durations.values().copied().collect());

    let confidence_avg = if vulnerabilities.is_empty() {
        None
    } else {
        let confidences = vulnerabilities.iter().map(|v| v.finding.confidence).collect();
        Some(sorted_sum(confidences) / vulnerabilities.len() as f64)
    };

    AnalysisMetrics {
        total_vulnerabilities: vulnerabilities.len(),
        by_severity,
        by_type,
        by_swc,
        tool_durations,
        total_duration,
        confidence_avg,
        risk_score: risk_score(vulnerabilities),
    }
}

fn sorted_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    values.into_iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Finding, VulnerabilityType};

    fn finding(tool: &str, severity: Severity, confidence: f64) -> Finding {
        Finding::new(tool, "t", "d", VulnerabilityType::Reentrancy, severity, confidence)
            .with_cross_reference(Some("SWC-107"))
    }

    fn results() -> Vec<ToolResult> {
        vec![
            ToolResult::success(
                "slither",
                vec![
                    finding("slither", Severity::High, 0.9),
                    finding("slither", Severity::Low, 0.3),
                ],
                1.25,
            ),
            ToolResult::success("mythril", vec![finding("mythril", Severity::Critical, 0.8)], 7.1),
            ToolResult::success("echidna", vec![finding("echidna", Severity::Medium, 0.7)], 0.35),
        ]
    }

    #[test]
    fn test_permuted_arrival_gives_identical_metrics() {
        let a = results();
        let mut b = results();
        b.reverse();
        b.swap(0, 1);

        let va = promote(&a);
        let vb = promote(&b);
        assert_eq!(va, vb);
        let ma = compute_metrics(&va, &a);
        let mb = compute_metrics(&vb, &b);
        assert_eq!(ma, mb);
        assert_eq!(ma.risk_score.to_bits(), mb.risk_score.to_bits());
        assert_eq!(ma.total_duration.to_bits(), mb.total_duration.to_bits());
    }

    #[test]
    fn test_ids_and_order() {
        let vulns = promote(&results());
        let ids: Vec<&str> = vulns.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["mythril-1", "slither-1", "echidna-1", "slither-2"]);
        assert!(vulns.iter().all(|v| v.swc_id.as_deref() == Some("SWC-107")));
    }

    #[test]
    fn test_zero_score_without_findings() {
        let metrics = compute_metrics(&[], &[ToolResult::success("slither", vec![], 1.0)]);
        assert_eq!(metrics.risk_score, 0.0);
        assert_eq!(metrics.total_vulnerabilities, 0);
        assert_eq!(metrics.confidence_avg, None);
        assert_eq!(metrics.by_severity["high"], 0);
    }

    #[test]
    fn test_score_is_monotonic_in_severity() {
        let mut previous = -1.0;
        for severity in Severity::ALL.iter().rev() {
            let r = vec![ToolResult::success("t", vec![finding("t", *severity, 1.0)], 0.0)];
            let score = risk_score(&promote(&r));
            assert!(score > previous, "{severity:?} should score above the level below it");
            previous = score;
        }
        assert_eq!(previous, MAX_RISK_SCORE);
    }

    #[test]
    fn test_metrics_counts() {
        let r = results();
        let metrics = compute_metrics(&promote(&r), &r);
        assert_eq!(metrics.total_vulnerabilities, 4);
        assert_eq!(metrics.by_severity["critical"], 1);
        assert_eq!(metrics.by_type["reentrancy"], 4);
        assert_eq!(metrics.by_swc["SWC-107"], 4);
        assert_eq!(metrics.tool_durations.len(), 3);
        assert!(metrics.risk_score > 0.0 && metrics.risk_score <= MAX_RISK_SCORE);
    }

    #[test]
    fn test_unattached_swc_is_not_counted() {
        let f = Finding::new("t", "x", "", VulnerabilityType::Unknown, Severity::Low, 0.5);
        let r = vec![ToolResult::success("t", vec![f], 0.0)];
        let metrics = compute_metrics(&promote(&r), &r);
        assert!(metrics.by_swc.is_empty());
        assert_eq!(metrics.by_type["unknown"], 1);
    }
}
