//! Configuration file handling.
//!
//! Configuration is read from a TOML file. Every key is optional; missing
//! keys take their default.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/depvet/config.toml`
//! - macOS: `~/Library/Application Support/depvet/config.toml`
//! - Windows: `%APPDATA%\depvet\config.toml`
//!
//! `--config <FILE>` points at a different file.
//!
//! # Example Configuration
//!
//! ```toml
//! [scanning]
//! enabled = true
//!
//! [scanning.osv]
//! enabled = true
//! timeout_secs = 30
//!
//! [scanning.socket]
//! enabled = true
//! api_token = "sk_..."    # falls back to $SOCKET_API_TOKEN
//!
//! [policy]
//! malware = "block"       # block | warn | ignore
//! allow_override = false
//! allowlist = ["left-pad"]
//! blocklist = ["event-stream"]
//!
//! [policy.cve]
//! critical = "block"
//! high = "block"
//! medium = "block"
//! low = "warn"
//!
//! [ui]
//! verbose = false
//! default_format = "table"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::Severity;
use crate::policy::{Action, Policy};
use crate::scanner::DEFAULT_TIMEOUT;

/// Environment variable consulted when no Socket.dev token is configured.
pub const SOCKET_TOKEN_ENV: &str = "SOCKET_API_TOKEN";

/// Application configuration.
///
/// # Example
///
/// ```no_run
/// use depvet::Config;
///
/// let config = Config::load().unwrap();
/// let policy = config.policy();
///
/// println!("Override allowed: {}", policy.allow_override);
/// println!("Socket.dev token: {}", config.has_socket_token());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scanning: ScanningConfig,
    pub policy: PolicyConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Master switch. When false, installs proceed without a security scan.
    pub enabled: bool,
    pub osv: OsvConfig,
    pub socket: SocketConfig,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            osv: OsvConfig::default(),
            socket: SocketConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsvConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for OsvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_token: None,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Action when malware or a typosquat is found.
    pub malware: Action,

    /// Whether a blocked install may be forced by typing `force`.
    pub allow_override: bool,

    /// Package names never sent to scanners.
    pub allowlist: Vec<String>,

    /// Package names always reported as critical malware.
    pub blocklist: Vec<String>,

    pub cve: CveConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            malware: Action::Block,
            allow_override: false,
            allowlist: Vec::new(),
            blocklist: Vec::new(),
            cve: CveConfig::default(),
        }
    }
}

/// Action per CVE severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CveConfig {
    pub critical: Action,
    pub high: Action,
    pub medium: Action,
    pub low: Action,
}

impl Default for CveConfig {
    fn default() -> Self {
        Self {
            critical: Action::Block,
            high: Action::Block,
            medium: Action::Block,
            low: Action::Warn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub verbose: bool,

    /// Valid values: "table", "json"
    pub default_format: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            default_format: "table".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the default location, falling back to
    /// defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid {}: {}", path.display(), e)))?;
        config
            .validate()
            .map_err(|reason| Error::Config(format!("invalid {}: {}", path.display(), reason)))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.scanning.osv.timeout_secs == 0 {
            return Err("scanning.osv.timeout_secs must be at least 1".to_string());
        }
        if self.scanning.socket.timeout_secs == 0 {
            return Err("scanning.socket.timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }

    /// Saves to `path`, creating the parent directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::Config(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot serialize config: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| Error::Config(format!("cannot write {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    ///
    /// ```
    /// use depvet::Config;
    ///
    /// let path = Config::config_path();
    /// assert!(path.ends_with("depvet/config.toml"));
    /// ```
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("depvet")
            .join("config.toml")
    }

    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Builds the immutable policy used for one scan and decision cycle.
    pub fn policy(&self) -> Policy {
        let p = &self.policy;
        Policy {
            malware_action: p.malware,
            cve_action_by_severity: HashMap::from([
                (Severity::Critical, p.cve.critical),
                (Severity::High, p.cve.high),
                (Severity::Medium, p.cve.medium),
                (Severity::Low, p.cve.low),
            ]),
            allow_override: p.allow_override,
            allowlist: p.allowlist.iter().cloned().collect(),
            blocklist: p.blocklist.iter().cloned().collect(),
        }
    }

    /// The Socket.dev token from the config file or `$SOCKET_API_TOKEN`.
    pub fn socket_token(&self) -> Option<String> {
        resolve_token(
            self.scanning.socket.api_token.as_deref(),
            std::env::var(SOCKET_TOKEN_ENV).ok(),
        )
    }

    pub fn has_socket_token(&self) -> bool {
        self.socket_token().is_some()
    }
}

fn resolve_token(configured: Option<&str>, env: Option<String>) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .or_else(|| env.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()))
}
