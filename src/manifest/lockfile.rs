//! `package-lock.json` parsing and package identity resolution.
//!
//! Lockfiles v2/v3 key every installed package by its path on disk:
//!
//! ```json
//! {
//!   "lockfileVersion": 3,
//!   "packages": {
//!     "": { "name": "my-app", "version": "1.0.0" },
//!     "node_modules/lodash": { "version": "4.17.21" },
//!     "node_modules/@babel/core": { "version": "7.24.0", "dev": true },
//!     "node_modules/foo/node_modules/@types/node": { "version": "20.11.0" }
//!   }
//! }
//! ```
//!
//! The package name is recovered from the trailing path segments. Scoped
//! names span two segments (`@babel/core`), so the scope segment has to be
//! rejoined with the segment after it.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::trace;

use crate::model::Package;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Lockfile {
    #[serde(default, rename = "lockfileVersion")]
    pub lockfile_version: u32,
    #[serde(default)]
    pub packages: HashMap<String, LockEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LockEntry {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub resolved: Option<String>,
    #[serde(default)]
    pub integrity: Option<String>,
    #[serde(default)]
    pub dev: bool,
}

impl Lockfile {
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Whether the lockfile carries the flat `packages` map (v2 and later).
    pub fn has_package_map(&self) -> bool {
        self.lockfile_version >= 2
    }

    pub fn packages(&self, include_dev: bool) -> Vec<Package> {
        packages_from_lockfile(&self.packages, include_dev)
    }
}

/// Extracts the package name from a lockfile path key.
///
/// Only the last one or two segments matter: the last segment is the name,
/// unless the segment before it is a scope (`@scope`), in which case both are
/// joined. Anything malformed degrades to the last segment.
pub fn extract_package_name(path: &str) -> String {
    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());

    let Some(last) = segments.next() else {
        return String::new();
    };

    match segments.next() {
        Some(scope) if scope.starts_with('@') && !last.starts_with('@') => {
            format!("{}/{}", scope, last)
        }
        _ => last.to_string(),
    }
}

/// Resolves lockfile entries into packages.
///
/// The root entry (empty path), entries without a name or version, and dev
/// entries (unless `include_dev`) are skipped. The result is sorted so runs
/// over the same lockfile are reproducible.
pub fn packages_from_lockfile(
    entries: &HashMap<String, LockEntry>,
    include_dev: bool,
) -> Vec<Package> {
    let mut packages: Vec<Package> = entries
        .iter()
        .filter_map(|(path, entry)| {
            if path.is_empty() {
                return None;
            }
            if entry.dev && !include_dev {
                trace!(path = %path, "skipping dev dependency");
                return None;
            }

            let name = extract_package_name(path);
            if name.is_empty() || entry.version.is_empty() {
                trace!(path = %path, "skipping entry without name or version");
                return None;
            }

            Some(Package::npm(name, entry.version.clone()))
        })
        .collect();

    packages.sort();
    packages
}
