use crate::error::ScannerError;
use crate::model::{Finding, FindingType, Package, ScanResult, Severity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::http::HttpClient;

const NAME: &str = "Socket.dev";
const DEFAULT_BASE_URL: &str = "https://api.socket.dev";
const PURL_PATH: &str = "/v0/purl";

/// Supply-chain analysis from Socket.dev: malware, typosquats, install
/// scripts, maintainer changes. Requires an API token.
pub struct SocketScanner {
    http: HttpClient,
    base_url: String,
    api_token: Option<String>,
    timeout: Duration,
}

impl SocketScanner {
    pub fn new(api_token: Option<String>, timeout: Duration) -> Self {
        Self {
            http: HttpClient::new(NAME, timeout),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token: api_token.filter(|t| !t.trim().is_empty()),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct SocketBatchRequest {
    packages: Vec<SocketPackageId>,
}

#[derive(Serialize)]
struct SocketPackageId {
    purl: String,
}

#[derive(Deserialize)]
struct SocketBatchResponse {
    #[serde(default)]
    results: Vec<SocketPackageResult>,
}

#[derive(Deserialize)]
struct SocketPackageResult {
    purl: String,
    #[serde(default)]
    alerts: Vec<SocketAlert>,
}

#[derive(Deserialize)]
struct SocketAlert {
    #[serde(default)]
    key: String,
    #[serde(rename = "type")]
    alert_type: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl super::Scanner for SocketScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self) -> bool {
        self.api_token.is_some()
    }

    fn detects_malware(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn scan(&self, packages: &[Package]) -> Result<ScanResult, ScannerError> {
        let start = Instant::now();

        let Some(token) = self.api_token.as_deref() else {
            return Err(ScannerError::auth(NAME, "no API token configured"));
        };

        if packages.is_empty() {
            return Ok(ScanResult::empty(NAME));
        }

        let request = SocketBatchRequest {
            packages: packages
                .iter()
                .map(|pkg| SocketPackageId { purl: pkg.purl() })
                .collect(),
        };

        let url = format!("{}{}", self.base_url, PURL_PATH);
        let response: SocketBatchResponse =
            self.http.post_json(&url, &request, Some(token)).await?;
        debug!(scanner = NAME, results = response.results.len(), "purl lookup complete");

        let findings = convert_to_findings(response);
        Ok(ScanResult::new(NAME, packages.len(), findings, start.elapsed()))
    }
}

fn convert_to_findings(response: SocketBatchResponse) -> Vec<Finding> {
    response
        .results
        .into_iter()
        .flat_map(|result| {
            let package = parse_purl(&result.purl);
            result.alerts.into_iter().map(move |alert| {
                let mut finding = Finding::new(
                    &package,
                    map_alert_type(&alert.alert_type),
                    map_severity(&alert.severity),
                    alert.alert_type,
                )
                .with_description(alert.message);
                if !alert.key.is_empty() {
                    finding = finding.with_id(alert.key);
                }
                finding
            })
        })
        .collect()
}

fn map_alert_type(alert_type: &str) -> FindingType {
    match alert_type {
        "malware" | "potentialVulnerability" | "protestware" => FindingType::Malware,
        "typosquat" | "socketPkgWithoutProvenance" => FindingType::Typosquat,
        "cve" | "vulnerability" | "criticalCVE" | "highCVE" | "moderateCVE" | "lowCVE" => {
            FindingType::Cve
        }
        "copyleftLicense" | "nonpermissiveLicense" | "unknownLicense" => FindingType::License,
        "newAuthor" | "noAuthor" | "suspiciousAuthorEmail" => FindingType::Maintainer,
        _ => FindingType::Quality,
    }
}

fn map_severity(severity: &str) -> Severity {
    match severity.to_lowercase().as_str() {
        "critical" => Severity::Critical,
        "high" => Severity::High,
        "medium" | "moderate" => Severity::Medium,
        "low" => Severity::Low,
        _ => Severity::Info,
    }
}

/// Parses `pkg:npm/<name>@<version>`. The version follows the last `@`, so
/// scoped names keep their leading `@`.
fn parse_purl(purl: &str) -> Package {
    let rest = purl.strip_prefix("pkg:npm/").unwrap_or(purl);

    match rest.rfind('@') {
        Some(idx) if idx > 0 => Package::npm(&rest[..idx], &rest[idx + 1..]),
        _ => Package::npm(rest, ""),
    }
}
