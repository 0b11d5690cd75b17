//! ZeroSSL REST API client
//!
//! Every call carries the entry's API key as the `access_key` query
//! parameter. Failed calls come back as HTTP 200 with
//! `{"success": false, "error": {"code": ..., "type": ...}}`, which is mapped
//! to [`CaError::Api`].

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};
use url::Url;

use zerocert_config::{CertConf, VerifyMethod};

use super::{
    ApiErrorBody, CaClient, CaConnector, CertificateInfo, DownloadedCertificate, NewCertificate,
    VerifyResult,
};
use crate::error::CaError;

/// Request timeout for CA calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size used when listing unfinished certificates
const LIST_LIMIT: usize = 100;

/// Upper bound on listed pages
const MAX_LIST_PAGES: u32 = 50;

/// Builds [`ZeroSslClient`]s sharing one HTTP connection pool
#[derive(Debug, Clone)]
pub struct ZeroSslConnector {
    http: reqwest::Client,
    base_url: Url,
}

impl ZeroSslConnector {
    /// Create a connector for the API at `base_url`
    pub fn new(base_url: &str) -> Result<Self, CaError> {
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("zerocert/", env!("CARGO_PKG_VERSION")))
            .build()?;

        debug!(base_url = %base_url, "Created ZeroSSL connector");
        Ok(Self { http, base_url })
    }
}

impl CaConnector for ZeroSslConnector {
    fn connect(&self, conf: &CertConf) -> Result<Box<dyn CaClient>, CaError> {
        Ok(Box::new(ZeroSslClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            api_key: conf.api_key.clone(),
        }))
    }
}

/// ZeroSSL client bound to one API key
#[derive(Clone)]
pub struct ZeroSslClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl std::fmt::Debug for ZeroSslClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZeroSslClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct CertificateList {
    #[serde(default)]
    results: Vec<CertificateInfo>,
}

impl ZeroSslClient {
    /// URL of `path` with the access key attached
    fn endpoint(&self, path: &str) -> Result<Url, CaError> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut().append_pair("access_key", &self.api_key);
        Ok(url)
    }

    /// Read a response body as JSON, surfacing API-level failures
    async fn read_json(response: reqwest::Response) -> Result<Value, CaError> {
        let status = response.status();
        let body = response.text().await?;

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(e) if status.is_success() => return Err(CaError::Decode(e.to_string())),
            Err(_) => {
                return Err(CaError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        };

        if let Some(error) = api_error(&value) {
            return Err(CaError::Api {
                code: error.code,
                kind: error.kind,
            });
        }

        if !status.is_success() {
            return Err(CaError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(value)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CaError> {
        let value = Self::read_json(response).await?;
        serde_json::from_value(value).map_err(|e| CaError::Decode(e.to_string()))
    }

    /// Every draft or pending certificate, collected page by page
    ///
    /// All pages are read before anything is cancelled, since cancelling
    /// shrinks the listing under the page cursor.
    async fn list_unfinished(&self) -> Result<Vec<CertificateInfo>, CaError> {
        let mut unfinished = Vec::new();

        for page in 1..=MAX_LIST_PAGES {
            let mut url = self.endpoint("certificates")?;
            url.query_pairs_mut()
                .append_pair("certificate_status", "draft,pending_validation")
                .append_pair("limit", &LIST_LIMIT.to_string())
                .append_pair("page", &page.to_string());

            let response = self.http.get(url).send().await?;
            let list: CertificateList = Self::decode(response).await?;
            let last = list.results.len() < LIST_LIMIT;
            unfinished.extend(list.results);
            if last {
                return Ok(unfinished);
            }
        }

        warn!(
            pages = MAX_LIST_PAGES,
            listed = unfinished.len(),
            "Unfinished certificate listing truncated"
        );
        Ok(unfinished)
    }

    async fn cancel(&self, id: &str) -> Result<(), CaError> {
        let url = self.endpoint(&format!("certificates/{}/cancel", id))?;
        let response = self.http.post(url).send().await?;
        Self::read_json(response).await?;
        Ok(())
    }
}

#[async_trait]
impl CaClient for ZeroSslClient {
    async fn create_certificate(
        &self,
        request: &NewCertificate,
    ) -> Result<CertificateInfo, CaError> {
        let url = self.endpoint("certificates")?;
        let days = request.days.to_string();
        let strict = if request.strict_domains { "1" } else { "0" };

        trace!(common_name = %request.common_name, days = request.days, "Creating certificate");

        let response = self
            .http
            .post(url)
            .form(&[
                ("certificate_domains", request.common_name.as_str()),
                ("certificate_csr", request.csr_pem.as_str()),
                ("certificate_validity_days", days.as_str()),
                ("strict_domains", strict),
            ])
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn get_certificate(&self, id: &str) -> Result<CertificateInfo, CaError> {
        let url = self.endpoint(&format!("certificates/{}", id))?;
        let response = self.http.get(url).send().await?;
        Self::decode(response).await
    }

    async fn verify_domains(
        &self,
        id: &str,
        method: VerifyMethod,
    ) -> Result<VerifyResult, CaError> {
        let url = self.endpoint(&format!("certificates/{}/challenges", id))?;
        let response = self
            .http
            .post(url)
            .form(&[("validation_method", method.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CaError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| CaError::Decode(e.to_string()))?;
        let error = api_error(&value);

        Ok(VerifyResult {
            success: error.is_none(),
            error,
        })
    }

    async fn download_certificate(&self, id: &str) -> Result<DownloadedCertificate, CaError> {
        let mut url = self.endpoint(&format!("certificates/{}/download/return", id))?;
        url.query_pairs_mut().append_pair("include_cross_signed", "1");
        let response = self.http.get(url).send().await?;
        Self::decode(response).await
    }

    async fn clean_unfinished(&self) -> Result<usize, CaError> {
        let unfinished = self.list_unfinished().await?;

        let mut cancelled = 0;
        for cert in &unfinished {
            match self.cancel(&cert.id).await {
                Ok(()) => {
                    info!(cert_id = %cert.id, status = %cert.status, "Cancelled unfinished certificate");
                    cancelled += 1;
                }
                Err(e) => {
                    warn!(cert_id = %cert.id, error = %e, "Failed to cancel unfinished certificate");
                    return Err(e);
                }
            }
        }

        Ok(cancelled)
    }
}

/// Error object of a `{"success": false, ...}` body
fn api_error(value: &Value) -> Option<ApiErrorBody> {
    let failed = match value.get("success") {
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_i64() == Some(0),
        _ => false,
    };
    if !failed {
        return None;
    }
    let body = value
        .get("error")
        .and_then(|e| serde_json::from_value(e.clone()).ok())
        .unwrap_or_default();
    Some(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_carries_access_key() {
        let connector = ZeroSslConnector::new("https://api.zerossl.com/").unwrap();
        let client = ZeroSslClient {
            http: connector.http.clone(),
            base_url: connector.base_url.clone(),
            api_key: "k&1".to_string(),
        };

        let url = client.endpoint("certificates/abc").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.zerossl.com/certificates/abc?access_key=k%261"
        );
    }

    #[test]
    fn test_base_path_is_kept() {
        let connector = ZeroSslConnector::new("http://localhost:8080/proxy").unwrap();
        let url = connector.base_url.join("certificates").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/proxy/certificates");
    }

    #[test]
    fn test_api_error_detection() {
        let failed = serde_json::json!({
            "success": false,
            "error": { "code": 101, "type": "invalid_access_key" }
        });
        let error = api_error(&failed).unwrap();
        assert_eq!(error.code, 101);
        assert_eq!(error.kind, "invalid_access_key");

        assert!(api_error(&serde_json::json!({ "success": 1 })).is_none());
        assert!(api_error(&serde_json::json!({ "id": "abc" })).is_none());
    }

    #[test]
    fn test_debug_hides_key() {
        let connector = ZeroSslConnector::new("https://api.zerossl.com").unwrap();
        let raw = ZeroSslClient {
            http: connector.http.clone(),
            base_url: connector.base_url.clone(),
            api_key: "top-secret".to_string(),
        };
        assert!(!format!("{:?}", raw).contains("top-secret"));
    }
}
