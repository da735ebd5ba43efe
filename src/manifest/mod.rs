//! Project dependency discovery.
//!
//! [`Project`] reads `package.json` and, when present, `package-lock.json`
//! from a project directory and produces the flat package list handed to the
//! orchestrator. Exact lockfile versions are preferred; without a v2+
//! lockfile the declared ranges from `package.json` are used with their
//! range operators stripped.

mod lockfile;

pub use lockfile::{extract_package_name, packages_from_lockfile, LockEntry, Lockfile};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::Package;

const MANIFEST_FILE: &str = "package.json";
const LOCKFILE_FILE: &str = "package-lock.json";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, String>,
}

impl Manifest {
    pub fn packages(&self, include_dev: bool) -> Vec<Package> {
        let dev = include_dev.then_some(&self.dev_dependencies);

        self.dependencies
            .iter()
            .chain(dev.into_iter().flatten())
            .map(|(name, range)| Package::npm(name.clone(), clean_version(range)))
            .collect()
    }
}

/// A JavaScript project directory.
pub struct Project {
    dir: PathBuf,
}

impl Project {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.dir.join(LOCKFILE_FILE)
    }

    pub fn has_manifest(&self) -> bool {
        self.manifest_path().is_file()
    }

    pub fn has_lockfile(&self) -> bool {
        self.lockfile_path().is_file()
    }

    pub fn read_manifest(&self) -> Result<Manifest> {
        let path = self.manifest_path();
        let content = fs::read_to_string(&path).map_err(|e| manifest_error(&path, e))?;
        serde_json::from_str(&content).map_err(|e| manifest_error(&path, e))
    }

    /// Reads the lockfile. A missing lockfile is not an error.
    pub fn read_lockfile(&self) -> Result<Option<Lockfile>> {
        let path = self.lockfile_path();
        if !path.is_file() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| manifest_error(&path, e))?;
        let lockfile = Lockfile::from_json(&content).map_err(|e| manifest_error(&path, e))?;
        Ok(Some(lockfile))
    }

    /// Collects every dependency to vet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Manifest`] if `package.json` is missing or invalid.
    /// An unreadable lockfile only downgrades to the manifest's ranges.
    pub fn dependencies(&self, include_dev: bool) -> Result<Vec<Package>> {
        let manifest = self.read_manifest()?;

        match self.read_lockfile() {
            Ok(Some(lockfile)) if lockfile.has_package_map() => {
                let packages = lockfile.packages(include_dev);
                debug!(count = packages.len(), "resolved packages from lockfile");
                return Ok(packages);
            }
            Ok(Some(lockfile)) => {
                debug!(
                    version = lockfile.lockfile_version,
                    "lockfile predates the packages map, using package.json ranges"
                );
            }
            Ok(None) => debug!("no lockfile, using package.json ranges"),
            Err(e) => warn!(error = %e, "ignoring unreadable lockfile"),
        }

        Ok(manifest.packages(include_dev))
    }
}

fn manifest_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Manifest {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Strips a leading range operator (`^`, `~`, `>=`, ...) from a version.
pub fn clean_version(version: &str) -> String {
    const PREFIXES: [&str; 7] = [">=", "<=", "^", "~", ">", "<", "="];

    let version = version.trim();
    PREFIXES
        .iter()
        .find_map(|prefix| version.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(version)
        .trim()
        .to_string()
}

/// Splits a command-line package spec such as `lodash@4.17.20` or
/// `@types/node@20.0.0` into a package. Without a version, `latest` is used.
pub fn parse_package_arg(arg: &str) -> Package {
    let (scope_offset, rest) = match arg.strip_prefix('@') {
        Some(rest) => (1, rest),
        None => (0, arg),
    };

    match rest.rfind('@') {
        Some(idx) if idx + 1 < rest.len() => {
            let split = idx + scope_offset;
            Package::npm(&arg[..split], &arg[split + 1..])
        }
        Some(idx) => Package::npm(&arg[..idx + scope_offset], "latest"),
        None => Package::npm(arg, "latest"),
    }
}
