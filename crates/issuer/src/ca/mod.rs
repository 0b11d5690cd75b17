//! Certificate authority interface
//!
//! The workflows only talk to [`CaClient`]. Each configuration entry carries
//! its own API key, so clients are obtained per entry through a
//! [`CaConnector`]. [`ZeroSslConnector`] is the production implementation.

mod zerossl;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use zerocert_config::{CertConf, VerifyMethod};

use crate::error::CaError;

pub use zerossl::{ZeroSslClient, ZeroSslConnector};

/// Format of the `expires` field returned by the CA (UTC)
pub const EXPIRES_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Certificate status as reported by the CA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertStatus {
    Draft,
    PendingValidation,
    Issued,
    Revoked,
    Cancelled,
    ExpiringSoon,
    Expired,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CertStatus::Draft => "draft",
            CertStatus::PendingValidation => "pending_validation",
            CertStatus::Issued => "issued",
            CertStatus::Revoked => "revoked",
            CertStatus::Cancelled => "cancelled",
            CertStatus::ExpiringSoon => "expiring_soon",
            CertStatus::Expired => "expired",
            CertStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// HTTP file validation details for one domain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtherMethod {
    #[serde(default)]
    pub file_validation_url_http: String,
    #[serde(default)]
    pub file_validation_url_https: String,
    #[serde(default)]
    pub file_validation_content: Vec<String>,
}

/// Validation block of a certificate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    /// Keyed by domain (the common name for IP certificates)
    #[serde(default, deserialize_with = "map_or_empty")]
    pub other_methods: HashMap<String, OtherMethod>,
}

/// Certificate as returned by the CA
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub id: String,
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub status: CertStatus,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub expires: String,
    #[serde(default)]
    pub validation: Option<Validation>,
}

impl CertificateInfo {
    /// Parse the expiry timestamp
    pub fn expires_at(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDateTime::parse_from_str(&self.expires, EXPIRES_FORMAT).map(|t| t.and_utc())
    }

    /// File validation details for `domain`, if the CA provided any
    pub fn other_method(&self, domain: &str) -> Option<&OtherMethod> {
        self.validation
            .as_ref()
            .and_then(|v| v.other_methods.get(domain))
    }
}

/// Error body returned with `"success": false`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Result of asking the CA to check domain control
///
/// The CA reports `success: false` for HTTP_CSR_HASH even when validation
/// later succeeds, so this is informational only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifyResult {
    pub success: bool,
    pub error: Option<ApiErrorBody>,
}

/// Certificate and CA bundle as returned by the inline download endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadedCertificate {
    #[serde(rename = "certificate.crt")]
    pub certificate: String,
    #[serde(rename = "ca_bundle.crt", default)]
    pub ca_bundle: String,
}

impl DownloadedCertificate {
    /// Leaf certificate followed by the CA bundle
    pub fn full_chain(&self) -> String {
        format!("{}\n{}\n", self.certificate.trim(), self.ca_bundle.trim())
    }
}

/// Parameters of a new certificate request
#[derive(Debug, Clone, PartialEq)]
pub struct NewCertificate {
    pub common_name: String,
    pub csr_pem: String,
    pub days: u32,
    pub strict_domains: bool,
}

/// Operations the workflows need from a CA
#[async_trait]
pub trait CaClient: Send + Sync {
    /// Submit a CSR and create a draft certificate
    async fn create_certificate(&self, request: &NewCertificate)
        -> Result<CertificateInfo, CaError>;

    /// Fetch the current state of a certificate
    async fn get_certificate(&self, id: &str) -> Result<CertificateInfo, CaError>;

    /// Ask the CA to check domain control
    async fn verify_domains(&self, id: &str, method: VerifyMethod)
        -> Result<VerifyResult, CaError>;

    /// Download the issued certificate with its CA bundle
    async fn download_certificate(&self, id: &str) -> Result<DownloadedCertificate, CaError>;

    /// Cancel draft and pending certificates, returning how many were cancelled
    async fn clean_unfinished(&self) -> Result<usize, CaError>;
}

/// Builds a client for one configuration entry
pub trait CaConnector: Send + Sync {
    fn connect(&self, conf: &CertConf) -> Result<Box<dyn CaClient>, CaError>;
}

// The CA sends `[]` instead of `{}` when there are no entries
fn map_or_empty<'de, D>(deserializer: D) -> Result<HashMap<String, OtherMethod>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Object(_) => {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        _ => Ok(HashMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_status_parsing() {
        let info: CertificateInfo = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "status": "expiring_soon"
        }))
        .unwrap();
        assert_eq!(info.status, CertStatus::ExpiringSoon);

        let info: CertificateInfo = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "status": "something_new"
        }))
        .unwrap();
        assert_eq!(info.status, CertStatus::Unknown);
    }

    #[test]
    fn test_expires_at() {
        let info = CertificateInfo {
            expires: "2026-03-01 12:30:00".to_string(),
            ..Default::default()
        };
        let expires = info.expires_at().unwrap();
        assert_eq!(expires.year(), 2026);
        assert_eq!(expires.month(), 3);
        assert_eq!(expires.hour(), 12);

        let info = CertificateInfo {
            expires: "soon".to_string(),
            ..Default::default()
        };
        assert!(info.expires_at().is_err());
    }

    #[test]
    fn test_other_methods() {
        let info: CertificateInfo = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "common_name": "10.0.0.5",
            "status": "draft",
            "validation": {
                "email_validation": {},
                "other_methods": {
                    "10.0.0.5": {
                        "file_validation_url_http": "http://10.0.0.5/.well-known/pki-validation/A.txt",
                        "file_validation_url_https": "https://10.0.0.5/.well-known/pki-validation/A.txt",
                        "file_validation_content": ["hash", "comodoca.com", "token"]
                    }
                }
            }
        }))
        .unwrap();

        let method = info.other_method("10.0.0.5").unwrap();
        assert_eq!(method.file_validation_content.len(), 3);
        assert!(info.other_method("10.0.0.6").is_none());
    }

    #[test]
    fn test_empty_other_methods_array() {
        let info: CertificateInfo = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "validation": { "other_methods": [] }
        }))
        .unwrap();
        assert!(info.other_method("10.0.0.5").is_none());
    }

    #[test]
    fn test_full_chain() {
        let download = DownloadedCertificate {
            certificate: "\n-----BEGIN CERTIFICATE-----\nleaf\n-----END CERTIFICATE-----\n\n".into(),
            ca_bundle: "-----BEGIN CERTIFICATE-----\nca\n-----END CERTIFICATE-----\n".into(),
        };
        assert_eq!(
            download.full_chain(),
            "-----BEGIN CERTIFICATE-----\nleaf\n-----END CERTIFICATE-----\n\
             -----BEGIN CERTIFICATE-----\nca\n-----END CERTIFICATE-----\n"
        );
    }
}
