use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Finding, FindingType, Severity};

/// One scanner's output for one scan invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub scanner: String,
    #[serde(rename = "packages_scanned")]
    pub packages: usize,
    pub findings: Vec<Finding>,
    pub duration: Duration,
    pub cached: bool,
}

impl ScanResult {
    pub fn new(
        scanner: impl Into<String>,
        packages: usize,
        findings: Vec<Finding>,
        duration: Duration,
    ) -> Self {
        Self {
            scanner: scanner.into(),
            packages,
            findings,
            duration,
            cached: false,
        }
    }

    pub fn empty(scanner: impl Into<String>) -> Self {
        Self::new(scanner, 0, Vec::new(), Duration::ZERO)
    }
}

/// Merged view of every successful scanner's findings for one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub results: Vec<ScanResult>,
    pub total_packages: usize,
    pub total_findings: usize,
    pub has_malware: bool,
    pub has_critical: bool,
    pub has_high: bool,
    pub duration: Duration,
    pub scanned_at: DateTime<Utc>,
}

impl AggregatedResult {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            total_packages: 0,
            total_findings: 0,
            has_malware: false,
            has_critical: false,
            has_high: false,
            duration: Duration::ZERO,
            scanned_at: Utc::now(),
        }
    }

    /// Folds scanner results into an aggregate.
    ///
    /// The fold only counts and ORs flags, so the outcome does not depend on
    /// the order in which scanners finished.
    pub fn from_results(
        results: Vec<ScanResult>,
        total_packages: usize,
        duration: Duration,
    ) -> Self {
        let mut aggregated = Self::empty();
        aggregated.total_packages = total_packages;
        aggregated.duration = duration;
        for result in results {
            aggregated.push(result);
        }
        aggregated
    }

    /// Appends a scanner result and folds its findings into the totals.
    pub fn push(&mut self, result: ScanResult) {
        for finding in &result.findings {
            self.record(finding);
        }
        self.results.push(result);
    }

    fn record(&mut self, finding: &Finding) {
        self.total_findings += 1;

        if finding.finding_type.is_supply_chain_threat() {
            self.has_malware = true;
        }

        match finding.severity {
            Severity::Critical => self.has_critical = true,
            Severity::High => self.has_high = true,
            _ => {}
        }
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.results.iter().flat_map(|r| r.findings.iter())
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.findings().filter(|f| f.severity == severity).count()
    }

    pub fn count_by_type(&self, finding_type: FindingType) -> usize {
        self.findings()
            .filter(|f| f.finding_type == finding_type)
            .count()
    }

    /// Malware plus typosquat findings.
    pub fn malware_count(&self) -> usize {
        self.findings()
            .filter(|f| f.finding_type.is_supply_chain_threat())
            .count()
    }

    pub fn malware_findings(&self) -> Vec<&Finding> {
        self.findings()
            .filter(|f| f.finding_type.is_supply_chain_threat())
            .collect()
    }

    /// CVE findings, most severe first.
    pub fn cve_findings(&self) -> Vec<&Finding> {
        let mut findings: Vec<&Finding> = self
            .findings()
            .filter(|f| f.finding_type == FindingType::Cve)
            .collect();
        findings.sort_by_key(|f| f.severity);
        findings
    }

    /// Distinct severities among CVE findings, most severe first.
    pub fn cve_severities_present(&self) -> Vec<Severity> {
        let mut severities: Vec<Severity> = self
            .findings()
            .filter(|f| f.finding_type == FindingType::Cve)
            .map(|f| f.severity)
            .collect();
        severities.sort();
        severities.dedup();
        severities
    }

    /// Findings not covered by the malware or CVE views.
    pub fn other_findings(&self) -> Vec<&Finding> {
        let mut findings: Vec<&Finding> = self
            .findings()
            .filter(|f| {
                !f.finding_type.is_supply_chain_threat() && f.finding_type != FindingType::Cve
            })
            .collect();
        findings.sort_by_key(|f| f.severity);
        findings
    }
}

impl Default for AggregatedResult {
    fn default() -> Self {
        Self::empty()
    }
}
