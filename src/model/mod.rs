//! Core data types for packages, findings, and scan results.
//!
//! This module contains the fundamental types used throughout depvet:
//!
//! - [`Package`] - A dependency identified by name and version
//! - [`Ecosystem`] - The registry a package belongs to
//! - [`Finding`] - A single security issue reported by one scanner
//! - [`ScanResult`] - One scanner's output for one scan
//! - [`AggregatedResult`] - The merged view across all scanners
//!
//! # Example
//!
//! ```
//! use depvet::model::{AggregatedResult, Finding, FindingType, Package, ScanResult, Severity};
//! use std::time::Duration;
//!
//! let package = Package::npm("lodash", "4.17.20");
//! let finding = Finding::new(&package, FindingType::Cve, Severity::High, "Prototype pollution");
//! let result = ScanResult::new("Google OSV", 1, vec![finding], Duration::ZERO);
//!
//! let aggregated = AggregatedResult::from_results(vec![result], 1, Duration::ZERO);
//! assert_eq!(aggregated.total_findings, 1);
//! assert!(aggregated.has_high);
//! ```

mod finding;
mod package;
mod result;

pub use finding::*;
pub use package::*;
pub use result::*;
