//! Threat-intelligence scanners.
//!
//! This module provides the [`Scanner`] trait and implementations that query
//! external sources for security issues in a set of packages.
//!
//! # Available Scanners
//!
//! | Scanner | Detects | Requires |
//! |---------|---------|----------|
//! | [`OsvScanner`] | Known vulnerabilities (CVE/GHSA) | Nothing |
//! | [`SocketScanner`] | Malware, typosquats, risky maintainers | `SOCKET_API_TOKEN` |
//!
//! # Example
//!
//! ```no_run
//! use depvet::model::Package;
//! use depvet::scanner::{OsvScanner, Scanner};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scanner = OsvScanner::new(Duration::from_secs(30));
//!     let packages = vec![Package::npm("lodash", "4.17.20")];
//!
//!     let result = scanner.scan(&packages).await?;
//!     for finding in &result.findings {
//!         println!("{}: {}", finding.package_ref(), finding.title);
//!     }
//!     Ok(())
//! }
//! ```

mod http;
mod osv;
mod socket;

pub use osv::{estimate_severity, OsvScanner};
pub use socket::SocketScanner;

use crate::error::ScannerError;
use crate::model::{Package, ScanResult};
use async_trait::async_trait;
use std::time::Duration;

/// Deadline applied to a scanner that does not configure its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A source of security findings for a set of packages.
///
/// The orchestrator only depends on this trait; which implementations run is
/// decided by configuration.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Stable identifier used in output and capability queries.
    fn name(&self) -> &'static str;

    /// Returns true if the scanner has what it needs (e.g. credentials) to
    /// produce meaningful results. Unavailable scanners are skipped.
    fn is_available(&self) -> bool;

    /// Returns true if the scanner reports malware and typosquats.
    fn detects_malware(&self) -> bool {
        false
    }

    /// Deadline for a single [`scan`](Self::scan) call.
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Queries the source for findings about `packages`.
    ///
    /// # Errors
    ///
    /// Returns a [`ScannerError`] on authentication, quota, or transport
    /// failure.
    async fn scan(&self, packages: &[Package]) -> Result<ScanResult, ScannerError>;
}
