use crate::error::ScannerError;
use crate::model::{truncate, Finding, FindingType, Package, ScanResult, Severity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::http::HttpClient;

const NAME: &str = "Google OSV";
const DEFAULT_BASE_URL: &str = "https://api.osv.dev";
const BATCH_PATH: &str = "/v1/querybatch";

/// Maximum number of packages to query in a single batch request.
const BATCH_SIZE: usize = 1000;

const MAX_DESCRIPTION_LEN: usize = 500;

/// Known-vulnerability lookups against OSV.dev. Needs no credentials.
pub struct OsvScanner {
    http: HttpClient,
    base_url: String,
    timeout: Duration,
}

impl OsvScanner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: HttpClient::new(NAME, timeout),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    /// Points the scanner at another OSV-compatible API, e.g. a mirror.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn batch_query(&self, packages: &[Package]) -> Result<OsvBatchResponse, ScannerError> {
        let queries = packages
            .iter()
            .map(|pkg| OsvBatchQueryItem {
                package: OsvPackage {
                    name: pkg.name.clone(),
                    ecosystem: pkg.ecosystem.as_str().to_string(),
                },
                version: pkg.version.clone(),
            })
            .collect();

        let url = format!("{}{}", self.base_url, BATCH_PATH);
        self.http
            .post_json(&url, &OsvBatchQuery { queries }, None)
            .await
    }
}

impl Default for OsvScanner {
    fn default() -> Self {
        Self::new(super::DEFAULT_TIMEOUT)
    }
}

#[derive(Serialize, Clone)]
struct OsvPackage {
    name: String,
    ecosystem: String,
}

#[derive(Serialize)]
struct OsvBatchQuery {
    queries: Vec<OsvBatchQueryItem>,
}

#[derive(Serialize)]
struct OsvBatchQueryItem {
    package: OsvPackage,
    version: String,
}

#[derive(Deserialize)]
struct OsvBatchResponse {
    #[serde(default)]
    results: Vec<OsvBatchResult>,
}

#[derive(Deserialize)]
struct OsvBatchResult {
    vulns: Option<Vec<OsvVuln>>,
}

#[derive(Deserialize)]
struct OsvVuln {
    id: String,
    summary: Option<String>,
    details: Option<String>,
    severity: Option<Vec<OsvSeverity>>,
    affected: Option<Vec<OsvAffected>>,
    references: Option<Vec<OsvReference>>,
    database_specific: Option<OsvDatabaseSpecific>,
}

#[derive(Deserialize)]
struct OsvSeverity {
    #[serde(rename = "type")]
    severity_type: Option<String>,
    score: Option<String>,
}

#[derive(Deserialize)]
struct OsvAffected {
    ranges: Option<Vec<OsvRange>>,
}

#[derive(Deserialize)]
struct OsvRange {
    events: Option<Vec<OsvEvent>>,
}

#[derive(Deserialize)]
struct OsvEvent {
    fixed: Option<String>,
}

#[derive(Deserialize)]
struct OsvReference {
    url: Option<String>,
}

#[derive(Deserialize)]
struct OsvDatabaseSpecific {
    severity: Option<String>,
}

#[async_trait]
impl super::Scanner for OsvScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn scan(&self, packages: &[Package]) -> Result<ScanResult, ScannerError> {
        let start = Instant::now();
        let mut findings = Vec::new();

        for chunk in packages.chunks(BATCH_SIZE) {
            let response = self.batch_query(chunk).await?;
            debug!(scanner = NAME, queried = chunk.len(), "batch query complete");
            findings.extend(convert_to_findings(chunk, response));
        }

        Ok(ScanResult::new(NAME, packages.len(), findings, start.elapsed()))
    }
}

/// Pairs each batch result with the package it was queried for.
fn convert_to_findings(packages: &[Package], response: OsvBatchResponse) -> Vec<Finding> {
    packages
        .iter()
        .zip(response.results)
        .flat_map(|(package, result)| {
            result
                .vulns
                .unwrap_or_default()
                .into_iter()
                .map(move |vuln| vuln_to_finding(package, vuln))
        })
        .collect()
}

fn vuln_to_finding(package: &Package, vuln: OsvVuln) -> Finding {
    let severity = map_severity(&vuln);
    let fixed_version = extract_fixed_version(&vuln);
    let references = vuln
        .references
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| r.url)
        .collect();

    let title = vuln
        .summary
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| vuln.id.clone());

    let mut finding = Finding::new(package, FindingType::Cve, severity, title)
        .with_description(truncate(
            vuln.details.as_deref().unwrap_or_default(),
            MAX_DESCRIPTION_LEN,
        ))
        .with_id(vuln.id)
        .with_references(references);

    if let Some(fixed) = fixed_version {
        finding = finding.with_remediation(format!("Upgrade to {}", fixed));
    }

    finding
}

/// Estimates a severity level from a CVSS score or vector.
///
/// Numeric scores use the standard CVSS bands. Vector strings are NOT scored
/// with the CVSS formula: this is a heuristic that counts high-impact flags
/// (`C:H`, `I:H`, `A:H`, `AV:N`, `PR:N`). Four or more is critical, three is
/// high, two is medium, anything else low.
///
/// Returns `None` when the input is neither a number nor a CVSS vector.
pub fn estimate_severity(score: &str) -> Option<Severity> {
    let score = score.trim();

    if let Ok(cvss) = score.parse::<f32>() {
        return match cvss {
            s if s >= 9.0 => Some(Severity::Critical),
            s if s >= 7.0 => Some(Severity::High),
            s if s >= 4.0 => Some(Severity::Medium),
            s if s > 0.0 => Some(Severity::Low),
            _ => None,
        };
    }

    if !score.starts_with("CVSS:") {
        return None;
    }

    const HIGH_IMPACT_FLAGS: [&str; 5] = ["C:H", "I:H", "A:H", "AV:N", "PR:N"];
    let high_count = score
        .split('/')
        .skip(1)
        .filter(|metric| HIGH_IMPACT_FLAGS.contains(metric))
        .count();

    Some(match high_count {
        n if n >= 4 => Severity::Critical,
        3 => Severity::High,
        2 => Severity::Medium,
        _ => Severity::Low,
    })
}

fn parse_label(label: &str) -> Option<Severity> {
    match label.to_uppercase().as_str() {
        "CRITICAL" => Some(Severity::Critical),
        "HIGH" => Some(Severity::High),
        "MODERATE" | "MEDIUM" => Some(Severity::Medium),
        "LOW" => Some(Severity::Low),
        _ => None,
    }
}

/// CVSS entries win, then ecosystem-provided labels, then the advisory
/// database's own label. Unrated advisories default to medium.
fn map_severity(vuln: &OsvVuln) -> Severity {
    let severities = vuln.severity.as_deref().unwrap_or_default();

    let from_cvss = severities
        .iter()
        .filter(|s| {
            s.severity_type
                .as_deref()
                .is_some_and(|t| t.starts_with("CVSS_"))
        })
        .find_map(|s| s.score.as_deref().and_then(estimate_severity));

    let from_ecosystem = || {
        severities
            .iter()
            .filter(|s| s.severity_type.as_deref() == Some("ECOSYSTEM"))
            .find_map(|s| s.score.as_deref().and_then(parse_label))
    };

    let from_database = || {
        vuln.database_specific
            .as_ref()
            .and_then(|d| d.severity.as_deref())
            .and_then(parse_label)
    };

    from_cvss
        .or_else(from_ecosystem)
        .or_else(from_database)
        .unwrap_or(Severity::Medium)
}

fn extract_fixed_version(vuln: &OsvVuln) -> Option<String> {
    vuln.affected.as_ref()?.iter().find_map(|affected| {
        affected.ranges.as_ref()?.iter().find_map(|range| {
            range
                .events
                .as_ref()?
                .iter()
                .find_map(|event| event.fixed.clone())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Scanner;
    use httpmock::prelude::*;

    #[test]
    fn test_estimate_numeric_scores() {
        assert_eq!(estimate_severity("9.8"), Some(Severity::Critical));
        assert_eq!(estimate_severity("10.0"), Some(Severity::Critical));
        assert_eq!(estimate_severity("7.0"), Some(Severity::High));
        assert_eq!(estimate_severity("6.9"), Some(Severity::Medium));
        assert_eq!(estimate_severity("4.0"), Some(Severity::Medium));
        assert_eq!(estimate_severity("3.9"), Some(Severity::Low));
        assert_eq!(estimate_severity("0.0"), None);
        assert_eq!(estimate_severity("not a number"), None);
    }

    #[test]
    fn test_estimate_vector_heuristic() {
        // AV:N, PR:N, C:H, I:H, A:H
        assert_eq!(
            estimate_severity("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"),
            Some(Severity::Critical)
        );
        // AV:N, PR:N, C:H
        assert_eq!(
            estimate_severity("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N"),
            Some(Severity::High)
        );
        // AV:N, C:H
        assert_eq!(
            estimate_severity("CVSS:3.1/AV:N/AC:H/PR:L/UI:R/S:U/C:H/I:N/A:N"),
            Some(Severity::Medium)
        );
        assert_eq!(
            estimate_severity("CVSS:3.1/AV:L/AC:H/PR:H/UI:R/S:U/C:L/I:N/A:N"),
            Some(Severity::Low)
        );
    }

    fn parse_response(json: &str) -> OsvBatchResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_convert_pairs_results_with_packages() {
        let packages = vec![
            Package::npm("lodash", "4.17.20"),
            Package::npm("express", "4.18.2"),
            Package::npm("minimist", "1.2.5"),
        ];
        let response = parse_response(
            r#"{
                "results": [
                    { "vulns": [{
                        "id": "GHSA-p6mc-m468-83gw",
                        "summary": "Prototype Pollution in lodash",
                        "details": "Versions of lodash prior to 4.17.21 are vulnerable.",
                        "severity": [{ "type": "CVSS_V3", "score": "CVSS:3.1/AV:N/AC:H/PR:H/UI:N/S:U/C:N/I:H/A:H" }],
                        "affected": [{ "ranges": [{ "type": "SEMVER", "events": [{ "introduced": "0" }, { "fixed": "4.17.21" }] }] }],
                        "references": [{ "type": "ADVISORY", "url": "https://github.com/advisories/GHSA-p6mc-m468-83gw" }, { "type": "WEB" }]
                    }]},
                    {},
                    { "vulns": [{
                        "id": "GHSA-xvch-5gv4-984h",
                        "database_specific": { "severity": "CRITICAL" }
                    }]}
                ]
            }"#,
        );

        let findings = convert_to_findings(&packages, response);
        assert_eq!(findings.len(), 2);

        let lodash = &findings[0];
        assert_eq!(lodash.package, "lodash");
        assert_eq!(lodash.version, "4.17.20");
        assert_eq!(lodash.finding_type, FindingType::Cve);
        // AV:N, I:H, A:H
        assert_eq!(lodash.severity, Severity::High);
        assert_eq!(lodash.title, "Prototype Pollution in lodash");
        assert_eq!(lodash.id.as_deref(), Some("GHSA-p6mc-m468-83gw"));
        assert_eq!(lodash.references.len(), 1);
        assert_eq!(lodash.remediation.as_deref(), Some("Upgrade to 4.17.21"));

        let minimist = &findings[1];
        assert_eq!(minimist.package, "minimist");
        assert_eq!(minimist.severity, Severity::Critical);
        assert_eq!(minimist.title, "GHSA-xvch-5gv4-984h");
        assert!(minimist.remediation.is_none());
    }

    #[test]
    fn test_ecosystem_label_and_default() {
        let packages = vec![Package::npm("a", "1.0.0"), Package::npm("b", "1.0.0")];
        let response = parse_response(
            r#"{
                "results": [
                    { "vulns": [{ "id": "A-1", "severity": [{ "type": "ECOSYSTEM", "score": "HIGH" }] }] },
                    { "vulns": [{ "id": "B-1" }] }
                ]
            }"#,
        );

        let findings = convert_to_findings(&packages, response);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[1].severity, Severity::Medium);
    }

    #[test]
    fn test_long_details_are_truncated() {
        let packages = vec![Package::npm("a", "1.0.0")];
        let details = "x".repeat(2000);
        let json = format!(
            r#"{{ "results": [{{ "vulns": [{{ "id": "A-1", "details": "{}" }}] }}] }}"#,
            details
        );

        let findings = convert_to_findings(&packages, parse_response(&json));
        assert_eq!(findings[0].description.chars().count(), MAX_DESCRIPTION_LEN);
        assert!(findings[0].description.ends_with("..."));
    }

    #[test]
    fn test_osv_scanner_default() {
        let scanner = OsvScanner::default();
        assert_eq!(scanner.name(), "Google OSV");
        assert!(scanner.is_available());
        assert!(!scanner.detects_malware());
        assert_eq!(scanner.timeout(), crate::scanner::DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_scan_decodes_batch_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/querybatch")
                    .json_body_partial(
                        r#"{ "queries": [{ "package": { "name": "lodash", "ecosystem": "npm" }, "version": "4.17.20" }] }"#,
                    );
                then.status(200)
                    .header("content-type", "application/json")
                    .body(
                        r#"{ "results": [{ "vulns": [{
                            "id": "GHSA-p6mc-m468-83gw",
                            "summary": "Prototype Pollution in lodash",
                            "database_specific": { "severity": "HIGH" }
                        }] }] }"#,
                    );
            })
            .await;

        let scanner = OsvScanner::new(Duration::from_secs(5)).with_base_url(server.base_url());
        let result = scanner
            .scan(&[Package::npm("lodash", "4.17.20")])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.scanner, "Google OSV");
        assert_eq!(result.packages, 1);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn test_large_scans_are_split_into_batches() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/querybatch");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{ "results": [] }"#);
            })
            .await;

        let packages: Vec<Package> = (0..BATCH_SIZE + 1)
            .map(|i| Package::npm(format!("pkg-{}", i), "1.0.0"))
            .collect();
        let scanner = OsvScanner::new(Duration::from_secs(5)).with_base_url(server.base_url());
        let result = scanner.scan(&packages).await.unwrap();

        mock.assert_hits_async(2).await;
        assert_eq!(result.packages, BATCH_SIZE + 1);
        assert!(result.findings.is_empty());
    }
}
