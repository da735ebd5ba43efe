//! Pre-install supply-chain vetting for npm dependencies.
//!
//! `depvet` resolves a project's exact dependency versions, queries several
//! security sources concurrently, and applies a configurable policy that
//! decides whether installation may proceed.
//!
//! - [`manifest`] reads `package.json` and `package-lock.json`
//! - [`scanner`] defines the [`Scanner`] capability and its OSV and
//!   Socket.dev implementations
//! - [`orchestrator`] runs scanners in parallel and aggregates findings
//! - [`policy`] turns an aggregated result into a pass or block decision

pub mod config;
pub mod error;
pub mod manifest;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod policy;
pub mod prompt;
pub mod scanner;

pub use config::Config;
pub use error::{Error, Result, ScannerError};
pub use model::{AggregatedResult, Finding, Package, ScanResult};
pub use orchestrator::{Orchestrator, ScanPhase};
pub use policy::{decide, Decision, Policy};
pub use scanner::Scanner;
