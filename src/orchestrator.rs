//! Concurrent multi-source scanning.
//!
//! The [`Orchestrator`] fans a package list out to every available scanner at
//! once, tolerates individual scanner failures, and folds the successful
//! results into one [`AggregatedResult`].
//!
//! Each scanner runs as its own future under its own deadline; the futures
//! are joined before aggregation, so nothing outlives a `scan` call. Dropping
//! the `scan` future cancels every in-flight scanner together.
//!
//! # Example
//!
//! ```no_run
//! use depvet::model::Package;
//! use depvet::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let orchestrator = Orchestrator::from_config(&config);
//!
//!     let packages = vec![Package::npm("lodash", "4.17.20")];
//!     let result = orchestrator.scan(&packages).await?;
//!     println!("{} findings", result.total_findings);
//!     Ok(())
//! }
//! ```

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result, ScannerError};
use crate::model::{AggregatedResult, Finding, FindingType, Package, ScanResult, Severity};
use crate::policy::Policy;
use crate::scanner::{OsvScanner, Scanner, SocketScanner};

/// Scanner name attributed to findings injected from the blocklist.
pub const POLICY_SCANNER: &str = "policy";

/// Progress transitions reported by [`Orchestrator::scan_with_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Started,
    Finished,
}

pub struct Orchestrator {
    scanners: Vec<Arc<dyn Scanner>>,
    policy: Policy,
}

impl Orchestrator {
    pub fn new(scanners: Vec<Arc<dyn Scanner>>, policy: Policy) -> Self {
        Self { scanners, policy }
    }

    /// Builds the scanners enabled in `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut scanners: Vec<Arc<dyn Scanner>> = Vec::new();

        let socket = &config.scanning.socket;
        if socket.enabled {
            scanners.push(Arc::new(SocketScanner::new(
                config.socket_token(),
                Duration::from_secs(socket.timeout_secs),
            )));
        }

        let osv = &config.scanning.osv;
        if osv.enabled {
            scanners.push(Arc::new(OsvScanner::new(Duration::from_secs(
                osv.timeout_secs,
            ))));
        }

        Self::new(scanners, config.policy())
    }

    pub fn scanners(&self) -> &[Arc<dyn Scanner>] {
        &self.scanners
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Names of scanners that will run.
    pub fn available_scanners(&self) -> Vec<&'static str> {
        self.scanners
            .iter()
            .filter(|s| s.is_available())
            .map(|s| s.name())
            .collect()
    }

    pub fn has_scanner(&self, name: &str) -> bool {
        self.scanners
            .iter()
            .any(|s| s.name() == name && s.is_available())
    }

    /// Whether any available scanner covers malware and typosquats.
    pub fn has_malware_scanner(&self) -> bool {
        self.scanners
            .iter()
            .any(|s| s.detects_malware() && s.is_available())
    }

    /// Scans `packages` with every available scanner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllScannersFailed`] only when every scanner that ran
    /// failed. Partial failures are tolerated and leave no trace in the
    /// result.
    pub async fn scan(&self, packages: &[Package]) -> Result<AggregatedResult> {
        self.scan_with_progress(packages, |_, _| {}).await
    }

    /// Like [`scan`](Self::scan), reporting when each scanner starts and
    /// finishes.
    pub async fn scan_with_progress<F>(
        &self,
        packages: &[Package],
        on_progress: F,
    ) -> Result<AggregatedResult>
    where
        F: Fn(&str, ScanPhase) + Sync,
    {
        let start = Instant::now();

        if packages.is_empty() {
            return Ok(AggregatedResult::empty());
        }

        let filtered: Vec<Package> = packages
            .iter()
            .filter(|p| !self.policy.is_allowlisted(&p.name))
            .cloned()
            .collect();
        if filtered.len() < packages.len() {
            debug!(
                skipped = packages.len() - filtered.len(),
                "allowlisted packages excluded from scanning"
            );
        }

        let (results, failures) = self.fan_out(&filtered, &on_progress).await;

        if results.is_empty() {
            if let Some(first) = failures.into_iter().next() {
                return Err(Error::AllScannersFailed(first));
            }
        }

        let mut aggregated = AggregatedResult::from_results(results, filtered.len(), Duration::ZERO);

        if let Some(blocked) = self.blocklist_result(packages) {
            aggregated.push(blocked);
        }

        aggregated.duration = start.elapsed();
        info!(
            packages = aggregated.total_packages,
            findings = aggregated.total_findings,
            elapsed_ms = aggregated.duration.as_millis() as u64,
            "scan complete"
        );

        Ok(aggregated)
    }

    /// Runs every available scanner concurrently and separates successes
    /// from failures. Each future owns its outcome until the join.
    async fn fan_out<F>(
        &self,
        packages: &[Package],
        on_progress: &F,
    ) -> (Vec<ScanResult>, Vec<ScannerError>)
    where
        F: Fn(&str, ScanPhase) + Sync,
    {
        if packages.is_empty() {
            debug!("no packages left after allowlist, skipping scanners");
            return (Vec::new(), Vec::new());
        }

        let tasks = self
            .scanners
            .iter()
            .filter(|scanner| {
                let available = scanner.is_available();
                if !available {
                    debug!(scanner = scanner.name(), "scanner unavailable, skipping");
                }
                available
            })
            .map(|scanner| async move {
                let name = scanner.name();
                let deadline = scanner.timeout();

                on_progress(name, ScanPhase::Started);
                let outcome = match tokio::time::timeout(deadline, scanner.scan(packages)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ScannerError::timeout(name, deadline)),
                };
                on_progress(name, ScanPhase::Finished);

                outcome
            });

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for outcome in join_all(tasks).await {
            match outcome {
                Ok(result) => {
                    debug!(
                        scanner = %result.scanner,
                        findings = result.findings.len(),
                        "scanner finished"
                    );
                    results.push(result);
                }
                Err(e) => {
                    debug!(scanner = %e.scanner, error = %e, "scanner failed");
                    failures.push(e);
                }
            }
        }

        (results, failures)
    }

    /// Synthetic critical malware findings for blocklisted packages. Checked
    /// against the unfiltered list, so the blocklist wins over the allowlist.
    fn blocklist_result(&self, packages: &[Package]) -> Option<ScanResult> {
        let findings: Vec<Finding> = packages
            .iter()
            .filter(|p| self.policy.is_blocklisted(&p.name))
            .map(|p| {
                Finding::new(p, FindingType::Malware, Severity::Critical, "Blocklisted package")
                    .with_description("This package is in your blocklist")
            })
            .collect();

        if findings.is_empty() {
            return None;
        }

        Some(ScanResult::new(
            POLICY_SCANNER,
            findings.len(),
            findings,
            Duration::ZERO,
        ))
    }
}
