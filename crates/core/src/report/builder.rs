use chrono::Utc;
use uuid::Uuid;

use crate::tool::ToolResult;

use super::aggregate::{compute_metrics, promote};
use super::types::{
    AnalysisMetrics, AnalysisReport, AnalysisStatus, AnalyzedContract, ReportError,
};

/// Accumulates one run's results. Owned by the pipeline for the length of a
/// run; [`ReportBuilder::finish`] consumes it.
#[derive(Debug)]
pub struct ReportBuilder {
    report: AnalysisReport,
}

impl ReportBuilder {
    pub fn new(contract_name: impl Into<String>) -> Self {
        Self {
            report: AnalysisReport {
                id: Uuid::new_v4(),
                contract_address: None,
                contract_name: contract_name.into(),
                status: AnalysisStatus::Pending,
                started_at: Utc::now(),
                completed_at: None,
                tools_used: Vec::new(),
                vulnerabilities: Vec::new(),
                tool_results: Vec::new(),
                metrics: AnalysisMetrics::default(),
                contracts_analyzed: Vec::new(),
                notes: Vec::new(),
            },
        }
    }

    pub fn contract_address(mut self, address: Option<String>) -> Self {
        self.report.contract_address = address;
        self
    }

    pub fn contracts(mut self, contracts: Vec<AnalyzedContract>) -> Self {
        self.report.contracts_analyzed = contracts;
        self
    }

    pub fn status(&self) -> AnalysisStatus {
        self.report.status
    }

    /// Move to `Running` and restart the clock.
    pub fn start(&mut self) -> Result<(), ReportError> {
        self.transition(AnalysisStatus::Running)?;
        self.report.started_at = Utc::now();
        Ok(())
    }

    pub fn record(&mut self, result: ToolResult) {
        if !self.report.tools_used.contains(&result.tool_name) {
            self.report.tools_used.push(result.tool_name.clone());
        }
        self.report.tool_results.push(result);
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.report.notes.push(note.into());
    }

    pub fn results(&self) -> &[ToolResult] {
        &self.report.tool_results
    }

    /// Aggregate everything recorded and close the run with `status`.
    pub fn finish(mut self, status: AnalysisStatus) -> Result<AnalysisReport, ReportError> {
        self.transition(status)?;
        let vulnerabilities = promote(&self.report.tool_results);
        self.report.metrics = compute_metrics(&vulnerabilities, &self.report.tool_results);
        self.report.vulnerabilities = vulnerabilities;
        self.report.completed_at = Some(Utc::now());
        Ok(self.report)
    }

    fn transition(&mut self, next: AnalysisStatus) -> Result<(), ReportError> {
        let current = self.report.status;
        if !current.can_transition_to(next) {
            return Err(ReportError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        self.report.status = next;
        Ok(())
    }
}
