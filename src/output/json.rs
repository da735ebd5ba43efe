use crate::model::{AggregatedResult, Finding, Severity};
use anyhow::Result;
use serde::Serialize;

/// Machine-readable scan report.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub packages_scanned: usize,
    pub findings: Vec<&'a Finding>,
    pub summary: Summary,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Malware and typosquat findings together.
    pub malware: usize,
}

impl Summary {
    pub fn from_result(result: &AggregatedResult) -> Self {
        Self {
            total: result.total_findings,
            critical: result.count_by_severity(Severity::Critical),
            high: result.count_by_severity(Severity::High),
            medium: result.count_by_severity(Severity::Medium),
            low: result.count_by_severity(Severity::Low),
            malware: result.malware_count(),
        }
    }
}

impl<'a> JsonReport<'a> {
    pub fn new(result: &'a AggregatedResult) -> Self {
        Self {
            packages_scanned: result.total_packages,
            findings: result.findings().collect(),
            summary: Summary::from_result(result),
        }
    }
}

pub fn format_json(result: &AggregatedResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(&JsonReport::new(result))?)
}

pub fn print_json(result: &AggregatedResult) -> Result<()> {
    println!("{}", format_json(result)?);
    Ok(())
}
