//! Error types.
//!
//! [`ScannerError`] describes a single threat source failing. It never
//! escapes the orchestrator on its own; only when every scanner fails does it
//! surface as [`Error::AllScannersFailed`].

use std::time::Duration;

/// Exit codes for CI integration
pub mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const SECURITY_BLOCK: u8 = 2;
    pub const CONFIG_ERROR: u8 = 3;
    pub const SCANNER_ERROR: u8 = 6;
    pub const MANIFEST_ERROR: u8 = 7;
    pub const USER_ABORT: u8 = 130;
}

/// Why a scanner could not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScannerErrorKind {
    /// Credentials missing, invalid, or not entitled
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Rate limit or quota exhausted
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// Network failure or unexpected HTTP status
    #[error("transport error: {0}")]
    Transport(String),

    /// The scanner did not finish within its deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{scanner} scanner failed: {kind}")]
pub struct ScannerError {
    pub scanner: String,
    pub kind: ScannerErrorKind,
}

impl ScannerError {
    pub fn new(scanner: impl Into<String>, kind: ScannerErrorKind) -> Self {
        Self {
            scanner: scanner.into(),
            kind,
        }
    }

    pub fn auth(scanner: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(scanner, ScannerErrorKind::Auth(msg.into()))
    }

    pub fn quota(scanner: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(scanner, ScannerErrorKind::Quota(msg.into()))
    }

    pub fn transport(scanner: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(scanner, ScannerErrorKind::Transport(msg.into()))
    }

    pub fn timeout(scanner: impl Into<String>, after: Duration) -> Self {
        Self::new(scanner, ScannerErrorKind::Timeout(after))
    }

    pub fn invalid_response(scanner: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(scanner, ScannerErrorKind::InvalidResponse(msg.into()))
    }
}

/// Top-level failures surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Every invoked scanner failed; carries the first failure
    #[error("all scanners failed: {0}")]
    AllScannersFailed(#[source] ScannerError),

    /// The security policy blocked installation
    #[error("security policy blocked installation: {}", reasons.join(", "))]
    PolicyBlock { reasons: Vec<String> },

    /// A human declined a confirmation prompt
    #[error("operation cancelled by user")]
    UserAbort,

    #[error("config error: {0}")]
    Config(String),

    #[error("manifest error: {path}: {reason}")]
    Manifest { path: String, reason: String },
}

impl Error {
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::AllScannersFailed(_) => exit_codes::SCANNER_ERROR,
            Error::PolicyBlock { .. } => exit_codes::SECURITY_BLOCK,
            Error::UserAbort => exit_codes::USER_ABORT,
            Error::Config(_) => exit_codes::CONFIG_ERROR,
            Error::Manifest { .. } => exit_codes::MANIFEST_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
