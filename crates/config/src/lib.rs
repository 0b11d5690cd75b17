//! Configuration for zerocert.
//!
//! The configuration is a single YAML document with camelCase keys:
//!
//! ```yaml
//! dataDir: /var/lib/zerocert
//! cleanUnfinished: true
//! certConfigs:
//!   - confId: edge-1
//!     apiKey: "..."
//!     commonName: 10.0.0.5
//!     keyType: ecdsa
//!     certFile: /etc/ssl/edge-1.crt
//!     keyFile: /etc/ssl/edge-1.key
//! ```
//!
//! Loading goes through three stages: serde deserialization, normalization
//! (defaults for zero or missing values) and validation (`validator` derive
//! rules plus the cross-entry checks in [`validate`]).

pub mod keys;
pub mod validate;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};
use validator::Validate;

use zerocert_common::RetryPolicy;

pub use keys::{KeyCurve, KeySpec, KeyType, RsaBits, RsaDigest, SignatureAlgorithm};
pub use validate::{Category, Finding, Severity, ValidationResult};

/// Default metrics port
pub const DEFAULT_METRICS_PORT: u16 = 2112;
/// Default readiness timeout in minutes
pub const DEFAULT_MAX_WAIT_MINUTES: u64 = 180;
/// Default readiness poll interval in seconds
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;
/// Default retry budget
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;
/// Default first backoff wait in seconds
pub const DEFAULT_RETRY_WAIT_SECS: u64 = 15;
/// Default certificate validity in days
pub const DEFAULT_VALIDITY_DAYS: u32 = 90;
/// ZeroSSL REST endpoint
pub const DEFAULT_CA_API_URL: &str = "https://api.zerossl.com";
/// Name of the state file inside `dataDir`
pub const STATE_FILE_NAME: &str = "current.yaml";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("invalid config:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

// ============================================================================
// Main Configuration Structure
// ============================================================================

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_config_semantics"))]
pub struct Config {
    /// Directory holding the state file and temporary working directories
    pub data_dir: PathBuf,

    /// Append JSON logs to this file instead of stdout
    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub log_file: Option<PathBuf>,

    /// Cancel draft and pending certificates before creating a new one
    #[serde(default)]
    pub clean_unfinished: bool,

    #[serde(default)]
    pub metrics_port: u16,

    /// Readiness timeout in minutes
    #[serde(default)]
    pub max_wait_time: u64,

    /// Readiness poll interval in seconds
    #[serde(default)]
    pub check_interval: u64,

    #[serde(default)]
    pub retry_max_attempts: u32,

    /// First backoff wait in seconds
    #[serde(default)]
    pub retry_wait_time: u64,

    #[serde(default)]
    pub ca_api_url: String,

    #[serde(default)]
    #[validate(nested)]
    pub cert_configs: Vec<CertConf>,
}

/// One certificate to issue and keep renewed
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_cert_paths"))]
pub struct CertConf {
    /// Join key to the persisted state
    #[validate(length(min = 1, message = "confId must not be empty"))]
    pub conf_id: String,

    #[validate(length(min = 1, message = "apiKey must not be empty"))]
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub organization_unit: String,

    /// IP address or domain the certificate is issued for
    #[validate(length(min = 1, message = "commonName must not be empty"))]
    pub common_name: String,

    #[serde(default)]
    #[validate(range(min = 1, max = 365, message = "days must be between 1 and 365"))]
    pub days: u32,

    #[serde(default)]
    pub key_type: KeyType,

    #[serde(default)]
    pub key_bits: u32,

    #[serde(default)]
    pub key_curve: Option<KeyCurve>,

    #[serde(default)]
    pub sig_alg: Option<SignatureAlgorithm>,

    /// Accepts `true`/`false` as well as `1`/`0`
    #[serde(default, deserialize_with = "bool_or_int")]
    pub strict_domains: bool,

    #[serde(default)]
    pub verify_method: VerifyMethod,

    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub verify_hook: Option<PathBuf>,

    #[serde(default, deserialize_with = "empty_path_as_none")]
    pub post_hook: Option<PathBuf>,

    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Domain validation method requested from the CA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerifyMethod {
    #[default]
    #[serde(rename = "HTTP_CSR_HASH")]
    HttpCsrHash,
}

impl VerifyMethod {
    /// Wire name used by the CA
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyMethod::HttpCsrHash => "HTTP_CSR_HASH",
        }
    }
}

impl fmt::Display for VerifyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Config Implementation
// ============================================================================

impl Config {
    /// Configuration with every optional value at its default
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self {
            data_dir: data_dir.into(),
            log_file: None,
            clean_unfinished: false,
            metrics_port: 0,
            max_wait_time: 0,
            check_interval: 0,
            retry_max_attempts: 0,
            retry_wait_time: 0,
            ca_api_url: String::new(),
            cert_configs: Vec::new(),
        };
        config.normalize();
        config
    }

    /// Load, normalize and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        debug!(path = %path.display(), "Loaded configuration file");
        Self::from_yaml(&content)
    }

    /// Parse, normalize and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.normalize();
        config.validate_all()?;
        Ok(config)
    }

    /// Fill in defaults for zero or missing values
    pub fn normalize(&mut self) {
        if self.metrics_port == 0 {
            self.metrics_port = DEFAULT_METRICS_PORT;
        }
        if self.max_wait_time == 0 {
            self.max_wait_time = DEFAULT_MAX_WAIT_MINUTES;
        }
        if self.check_interval == 0 {
            self.check_interval = DEFAULT_CHECK_INTERVAL_SECS;
        }
        if self.retry_max_attempts == 0 {
            self.retry_max_attempts = DEFAULT_RETRY_MAX_ATTEMPTS;
        }
        if self.retry_wait_time == 0 {
            self.retry_wait_time = DEFAULT_RETRY_WAIT_SECS;
        }
        let url = self.ca_api_url.trim().trim_end_matches('/');
        self.ca_api_url = if url.is_empty() {
            DEFAULT_CA_API_URL.to_string()
        } else {
            url.to_string()
        };

        for conf in &mut self.cert_configs {
            if conf.days == 0 {
                conf.days = DEFAULT_VALIDITY_DAYS;
            }
        }
    }

    /// Run field rules and cross-entry checks; warnings are logged
    pub fn validate_all(&self) -> Result<ValidationResult, ConfigError> {
        trace!(
            cert_configs = self.cert_configs.len(),
            "Validating configuration"
        );

        Validate::validate(self)?;

        let result = self.check();
        for warning in result.warnings() {
            warn!(warning = %warning, "Configuration warning");
        }

        if !result.is_valid() {
            return Err(ConfigError::Invalid(
                result.errors().map(|e| e.to_string()).collect(),
            ));
        }

        Ok(result)
    }

    /// Cross-entry and filesystem checks
    pub fn check(&self) -> ValidationResult {
        validate::certs::validate_cert_configs(self)
    }

    /// Path of the persisted state file
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE_NAME)
    }

    /// Readiness timeout
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_time.saturating_mul(60))
    }

    /// Readiness poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    /// Backoff policy for CA calls
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_secs(self.retry_wait_time),
        )
    }
}

impl CertConf {
    /// Entry with default key and subject parameters
    pub fn new(
        conf_id: impl Into<String>,
        common_name: impl Into<String>,
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            conf_id: conf_id.into(),
            api_key: String::new(),
            country: String::new(),
            province: String::new(),
            city: String::new(),
            locality: String::new(),
            organization: String::new(),
            organization_unit: String::new(),
            common_name: common_name.into(),
            days: DEFAULT_VALIDITY_DAYS,
            key_type: KeyType::default(),
            key_bits: 0,
            key_curve: None,
            sig_alg: None,
            strict_domains: false,
            verify_method: VerifyMethod::default(),
            verify_hook: None,
            post_hook: None,
            cert_file: cert_file.into(),
            key_file: key_file.into(),
        }
    }

    /// Resolve the key parameters into a consistent specification
    pub fn key_spec(&self) -> Result<KeySpec, String> {
        KeySpec::resolve(self.key_type, self.key_bits, self.key_curve, self.sig_alg)
    }
}

// ============================================================================
// Semantic validation
// ============================================================================

fn validate_config_semantics(config: &Config) -> Result<(), validator::ValidationError> {
    let mut errors: Vec<String> = Vec::new();

    if config.data_dir.as_os_str().is_empty() {
        errors.push("dataDir must not be empty".to_string());
    }

    let mut seen = HashSet::new();
    for conf in &config.cert_configs {
        if !seen.insert(conf.conf_id.as_str()) {
            errors.push(format!("Duplicate confId '{}'", conf.conf_id));
        }
    }

    build_validation_result("config_validation_failed", errors)
}

fn validate_cert_paths(conf: &CertConf) -> Result<(), validator::ValidationError> {
    let mut errors = Vec::new();
    if conf.cert_file.as_os_str().is_empty() {
        errors.push(format!("Entry '{}': certFile must not be empty", conf.conf_id));
    }
    if conf.key_file.as_os_str().is_empty() {
        errors.push(format!("Entry '{}': keyFile must not be empty", conf.conf_id));
    }
    build_validation_result("cert_paths", errors)
}

fn build_validation_result(
    code: &'static str,
    errors: Vec<String>,
) -> Result<(), validator::ValidationError> {
    if errors.is_empty() {
        return Ok(());
    }
    let mut err = validator::ValidationError::new(code);
    err.message = Some(std::borrow::Cow::Owned(errors.join("; ")));
    Err(err)
}

// ============================================================================
// Deserialization helpers
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrInt {
    Bool(bool),
    Int(i64),
    Str(String),
}

fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match BoolOrInt::deserialize(deserializer)? {
        BoolOrInt::Bool(b) => Ok(b),
        BoolOrInt::Int(i) => Ok(i != 0),
        BoolOrInt::Str(s) => match s.trim() {
            "" | "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean or 0/1, got '{}'",
                other
            ))),
        },
    }
}

fn empty_path_as_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from))
}
