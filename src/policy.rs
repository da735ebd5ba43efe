//! Security policy evaluation.
//!
//! [`decide`] maps an [`AggregatedResult`] to a [`Decision`]. Every rule is
//! evaluated independently; any single blocking rule is enough to block.
//! The engine never talks to a human: when a block is overridable, the
//! caller is responsible for asking for the [`FORCE_PHRASE`].
//!
//! # Example
//!
//! ```
//! use depvet::model::{AggregatedResult, Finding, FindingType, Package, ScanResult, Severity};
//! use depvet::policy::{decide, Policy};
//! use std::time::Duration;
//!
//! let pkg = Package::npm("minimist", "1.2.5");
//! let finding = Finding::new(&pkg, FindingType::Cve, Severity::Critical, "Prototype pollution");
//! let result = AggregatedResult::from_results(
//!     vec![ScanResult::new("Google OSV", 1, vec![finding], Duration::ZERO)],
//!     1,
//!     Duration::ZERO,
//! );
//!
//! let decision = decide(&result, &Policy::default());
//! assert_eq!(decision.reason(), Some("critical vulnerabilities detected"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::Error;
use crate::model::{AggregatedResult, Severity};

/// Typed to bypass a missing malware scanner before scanning.
pub const UNSECURE_PHRASE: &str = "unsecure";

/// Typed to proceed despite an overridable policy block.
pub const FORCE_PHRASE: &str = "force";

/// Case-insensitive comparison of user input against a confirmation phrase.
pub fn phrase_matches(input: &str, phrase: &str) -> bool {
    input.trim().eq_ignore_ascii_case(phrase)
}

/// What to do when a category of finding is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Block,
    Warn,
    #[default]
    Ignore,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Block => "block",
            Action::Warn => "warn",
            Action::Ignore => "ignore",
        };
        write!(f, "{}", s)
    }
}

/// Immutable policy for one scan and decision cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub malware_action: Action,
    pub cve_action_by_severity: HashMap<Severity, Action>,
    pub allow_override: bool,
    pub allowlist: HashSet<String>,
    pub blocklist: HashSet<String>,
}

impl Policy {
    /// Action for CVE findings of `severity`; unmapped severities are ignored.
    pub fn cve_action(&self, severity: Severity) -> Action {
        self.cve_action_by_severity
            .get(&severity)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_allowlisted(&self, name: &str) -> bool {
        self.allowlist.contains(name)
    }

    pub fn is_blocklisted(&self, name: &str) -> bool {
        self.blocklist.contains(name)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            malware_action: Action::Block,
            cve_action_by_severity: HashMap::from([
                (Severity::Critical, Action::Block),
                (Severity::High, Action::Block),
                (Severity::Medium, Action::Block),
                (Severity::Low, Action::Warn),
            ]),
            allow_override: false,
            allowlist: HashSet::new(),
            blocklist: HashSet::new(),
        }
    }
}

/// Outcome of evaluating a scan against a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Installation may proceed. Warnings are informational only.
    Pass { warnings: Vec<String> },
    /// Installation must not proceed unless `overridable` and a human
    /// confirms with [`FORCE_PHRASE`].
    Block {
        reasons: Vec<String>,
        warnings: Vec<String>,
        overridable: bool,
    },
}

impl Decision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Decision::Block { .. })
    }

    pub fn is_overridable(&self) -> bool {
        matches!(self, Decision::Block { overridable: true, .. })
    }

    /// The most significant block reason.
    pub fn reason(&self) -> Option<&str> {
        self.reasons().first().map(String::as_str)
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            Decision::Pass { .. } => &[],
            Decision::Block { reasons, .. } => reasons,
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            Decision::Pass { warnings } | Decision::Block { warnings, .. } => warnings,
        }
    }

    /// Converts a block into [`Error::PolicyBlock`].
    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Decision::Pass { .. } => Ok(()),
            Decision::Block { reasons, .. } => Err(Error::PolicyBlock { reasons }),
        }
    }
}

/// Evaluates `result` against `policy`.
///
/// Reasons are ordered malware first, then CVE severities from critical to
/// low. `ignore`-mapped categories contribute neither reasons nor warnings.
pub fn decide(result: &AggregatedResult, policy: &Policy) -> Decision {
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();

    if result.has_malware {
        let message = "malware detected".to_string();
        match policy.malware_action {
            Action::Block => reasons.push(message),
            Action::Warn => warnings.push(message),
            Action::Ignore => {}
        }
    }

    for severity in result.cve_severities_present() {
        let message = format!("{} vulnerabilities detected", severity);
        match policy.cve_action(severity) {
            Action::Block => reasons.push(message),
            Action::Warn => warnings.push(message),
            Action::Ignore => {}
        }
    }

    if reasons.is_empty() {
        Decision::Pass { warnings }
    } else {
        Decision::Block {
            reasons,
            warnings,
            overridable: policy.allow_override,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Finding, FindingType, Package, ScanResult};
    use std::time::Duration;

    fn result_with(findings: Vec<(FindingType, Severity)>) -> AggregatedResult {
        let pkg = Package::npm("some-lib", "1.0.0");
        let findings = findings
            .into_iter()
            .map(|(t, s)| Finding::new(&pkg, t, s, "issue"))
            .collect();
        AggregatedResult::from_results(
            vec![ScanResult::new("test", 1, findings, Duration::ZERO)],
            1,
            Duration::ZERO,
        )
    }

    fn example_policy() -> Policy {
        Policy {
            malware_action: Action::Block,
            cve_action_by_severity: HashMap::from([
                (Severity::Critical, Action::Block),
                (Severity::High, Action::Warn),
                (Severity::Medium, Action::Warn),
                (Severity::Low, Action::Ignore),
            ]),
            ..Policy::default()
        }
    }

    #[test]
    fn test_high_cve_with_warn_passes() {
        let result = result_with(vec![(FindingType::Cve, Severity::High)]);
        let decision = decide(&result, &example_policy());

        assert_eq!(
            decision,
            Decision::Pass {
                warnings: vec!["high vulnerabilities detected".to_string()]
            }
        );
    }

    #[test]
    fn test_critical_cve_blocks() {
        let result = result_with(vec![(FindingType::Cve, Severity::Critical)]);
        let decision = decide(&result, &example_policy());

        assert!(decision.is_blocked());
        assert_eq!(decision.reason(), Some("critical vulnerabilities detected"));
        assert!(!decision.is_overridable());
    }

    #[test]
    fn test_malware_blocks_before_cves() {
        let result = result_with(vec![
            (FindingType::Cve, Severity::Critical),
            (FindingType::Malware, Severity::High),
        ]);
        let decision = decide(&result, &example_policy());

        assert_eq!(
            decision.reasons(),
            &[
                "malware detected".to_string(),
                "critical vulnerabilities detected".to_string()
            ]
        );
    }

    #[test]
    fn test_malware_warn_and_ignore() {
        let result = result_with(vec![(FindingType::Typosquat, Severity::Low)]);

        let warn = Policy {
            malware_action: Action::Warn,
            ..example_policy()
        };
        assert_eq!(decide(&result, &warn).warnings(), &["malware detected".to_string()]);

        let ignore = Policy {
            malware_action: Action::Ignore,
            ..example_policy()
        };
        assert_eq!(decide(&result, &ignore), Decision::Pass { warnings: vec![] });
    }

    #[test]
    fn test_ignored_and_unmapped_severities() {
        let result = result_with(vec![
            (FindingType::Cve, Severity::Low),
            (FindingType::Cve, Severity::Info),
        ]);
        let decision = decide(&result, &example_policy());

        assert_eq!(decision, Decision::Pass { warnings: vec![] });
        assert_eq!(result.total_findings, 2);
    }

    #[test]
    fn test_non_cve_findings_do_not_trigger_cve_rules() {
        let result = result_with(vec![
            (FindingType::License, Severity::Critical),
            (FindingType::Quality, Severity::High),
        ]);
        assert!(!decide(&result, &example_policy()).is_blocked());
    }

    #[test]
    fn test_override_flag_follows_policy() {
        let result = result_with(vec![(FindingType::Malware, Severity::Critical)]);
        let policy = Policy {
            allow_override: true,
            ..example_policy()
        };

        let decision = decide(&result, &policy);
        assert!(decision.is_overridable());

        let err = decision.into_result().unwrap_err();
        assert!(matches!(err, Error::PolicyBlock { .. }));
    }

    #[test]
    fn test_default_policy() {
        let policy = Policy::default();
        assert_eq!(policy.malware_action, Action::Block);
        assert_eq!(policy.cve_action(Severity::Medium), Action::Block);
        assert_eq!(policy.cve_action(Severity::Low), Action::Warn);
        assert_eq!(policy.cve_action(Severity::Info), Action::Ignore);
        assert!(!policy.allow_override);
    }

    #[test]
    fn test_phrase_matches() {
        assert!(phrase_matches("force", FORCE_PHRASE));
        assert!(phrase_matches("  FORCE\n", FORCE_PHRASE));
        assert!(phrase_matches("Unsecure", UNSECURE_PHRASE));
        assert!(!phrase_matches("yes", FORCE_PHRASE));
        assert!(!phrase_matches("force it", FORCE_PHRASE));
        assert!(!phrase_matches("unsecure", FORCE_PHRASE));
    }
}
