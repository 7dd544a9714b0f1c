use anyhow::Result;
use vulnhunter::report::AnalysisReport;

pub fn render(report: &AnalysisReport) -> Result<String> {
    let json = serde_json::to_string_pretty(report)?;
    Ok(format!("{json}\n"))
}
