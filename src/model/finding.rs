use serde::{Deserialize, Serialize};

use super::Package;

/// Category of a reported security issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingType {
    Malware,
    Cve,
    Typosquat,
    License,
    Maintainer,
    Quality,
}

impl FindingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingType::Malware => "malware",
            FindingType::Cve => "cve",
            FindingType::Typosquat => "typosquat",
            FindingType::License => "license",
            FindingType::Maintainer => "maintainer",
            FindingType::Quality => "quality",
        }
    }

    /// Malware and typosquats are both treated as supply-chain threats.
    pub fn is_supply_chain_threat(&self) -> bool {
        matches!(self, FindingType::Malware | FindingType::Typosquat)
    }
}

impl std::fmt::Display for FindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of a finding.
///
/// The derived ordering puts the most severe level first:
/// `Critical < High < Medium < Low < Info`. Sorting a list of findings by
/// severity therefore lists critical issues first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single security issue against one package version, from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub package: String,
    pub version: String,
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl Finding {
    pub fn new(
        package: &Package,
        finding_type: FindingType,
        severity: Severity,
        title: impl Into<String>,
    ) -> Self {
        Self {
            package: package.name.clone(),
            version: package.version.clone(),
            finding_type,
            severity,
            title: title.into(),
            description: String::new(),
            id: None,
            references: Vec::new(),
            remediation: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_references(mut self, references: Vec<String>) -> Self {
        self.references = references;
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    /// `name@version` of the affected package.
    pub fn package_ref(&self) -> String {
        format!("{}@{}", self.package, self.version)
    }
}

/// Shortens `s` to at most `max_chars` characters, ending in `...` when cut.
/// Widths below 4 leave no room for the ellipsis and cut plainly.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return s.chars().take(max_chars).collect();
    }
    let keep = max_chars - 3;
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}
