//! Renewal of persisted certificates

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use zerocert_config::CertConf;

use super::{CertOutcome, Orchestrator};
use crate::ca::{CertStatus, CertificateInfo};
use crate::state::CertRecord;

/// Certificates expiring within this many days are renewed
pub const RENEW_BEFORE_DAYS: i64 = 29;

/// Whether a certificate should be renewed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalDecision {
    /// Far from expiry and not flagged by the CA
    NotDue { expires: DateTime<Utc> },
    /// The CA flags the certificate as expiring soon
    ExpiringSoon,
    /// Expires within the renewal window
    WithinWindow { expires: DateTime<Utc> },
    /// Expiry could not be parsed; renew to be safe
    UnknownExpiry,
}

impl RenewalDecision {
    pub fn is_due(&self) -> bool {
        !matches!(self, RenewalDecision::NotDue { .. })
    }
}

/// Decide whether `info` needs renewal at `now`
pub fn renewal_due(info: &CertificateInfo, now: DateTime<Utc>) -> RenewalDecision {
    let expires = match info.expires_at() {
        Ok(expires) => expires,
        Err(e) => {
            warn!(
                cert_id = %info.id,
                expires = %info.expires,
                error = %e,
                "Failed to parse certificate expiry, renewing"
            );
            return RenewalDecision::UnknownExpiry;
        }
    };

    if info.status == CertStatus::ExpiringSoon {
        return RenewalDecision::ExpiringSoon;
    }

    if now + chrono::Duration::days(RENEW_BEFORE_DAYS) < expires {
        RenewalDecision::NotDue { expires }
    } else {
        RenewalDecision::WithinWindow { expires }
    }
}

impl Orchestrator {
    /// Renew the certificate of `record` if it is due
    ///
    /// The record is only ever overwritten, never removed.
    pub(super) async fn renew_record(
        &mut self,
        record: &CertRecord,
        conf: &CertConf,
    ) -> CertOutcome {
        info!(
            conf_id = %conf.conf_id,
            cert_id = %record.cert_id,
            "Checking certificate for renewal"
        );

        let client = match self.connect(conf) {
            Ok(client) => client,
            Err(e) => return CertOutcome::Failed(e),
        };

        let cert_id = record.cert_id.as_str();
        let client_ref = client.as_ref();
        let current = match self
            .settings
            .retry
            .run(self.sleeper.as_ref(), move || client_ref.get_certificate(cert_id))
            .await
        {
            Ok(info) => info,
            Err(e) => {
                self.metrics.inc_api_errors();
                error!(
                    conf_id = %conf.conf_id,
                    cert_id = %cert_id,
                    error = %e,
                    "Failed to fetch certificate"
                );
                return CertOutcome::Failed(e.into());
            }
        };

        let decision = renewal_due(&current, Utc::now());
        if !decision.is_due() {
            info!(
                conf_id = %conf.conf_id,
                status = %current.status,
                expires = %current.expires,
                "Certificate is not due for renewal"
            );
            return CertOutcome::Skipped {
                reason: format!("expires {}", current.expires),
            };
        }

        info!(conf_id = %conf.conf_id, decision = ?decision, "Renewing certificate");
        self.clean_unfinished(client_ref, conf).await;

        let new_id = match self.obtain(client_ref, conf).await {
            Ok(id) => id,
            Err(e) => {
                error!(conf_id = %conf.conf_id, error = %e, "Failed to renew certificate");
                return CertOutcome::Failed(e);
            }
        };

        match self
            .state
            .replace(&record.conf_id, CertRecord::from_conf(conf, &new_id))
        {
            Ok(true) => {}
            Ok(false) => warn!(
                conf_id = %conf.conf_id,
                "Renewed certificate has no record to update"
            ),
            Err(e) => error!(
                conf_id = %conf.conf_id,
                error = %e,
                "Failed to persist renewed certificate"
            ),
        }
        self.metrics.inc_renewed();

        info!(
            conf_id = %conf.conf_id,
            previous = %record.cert_id,
            cert_id = %new_id,
            "Certificate renewed"
        );
        CertOutcome::Renewed {
            previous: record.cert_id.clone(),
            cert_id: new_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info(status: CertStatus, expires: &str) -> CertificateInfo {
        CertificateInfo {
            id: "abc".into(),
            status,
            expires: expires.into(),
            ..Default::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_far_from_expiry_is_not_due() {
        let decision = renewal_due(&info(CertStatus::Issued, "2026-03-01 00:00:00"), now());
        assert!(matches!(decision, RenewalDecision::NotDue { .. }));
        assert!(!decision.is_due());
    }

    #[test]
    fn test_within_window_is_due() {
        let decision = renewal_due(&info(CertStatus::Issued, "2026-01-20 00:00:00"), now());
        assert!(matches!(decision, RenewalDecision::WithinWindow { .. }));
    }

    #[test]
    fn test_window_boundary() {
        // Exactly 29 days out is due; one second later is not
        let at_boundary = renewal_due(&info(CertStatus::Issued, "2026-01-30 00:00:00"), now());
        assert!(at_boundary.is_due());
        let past_boundary = renewal_due(&info(CertStatus::Issued, "2026-01-30 00:00:01"), now());
        assert!(!past_boundary.is_due());
    }

    #[test]
    fn test_expiring_soon_status_forces_renewal() {
        let decision = renewal_due(
            &info(CertStatus::ExpiringSoon, "2026-06-01 00:00:00"),
            now(),
        );
        assert_eq!(decision, RenewalDecision::ExpiringSoon);
    }

    #[test]
    fn test_unparsable_expiry_renews() {
        let decision = renewal_due(&info(CertStatus::Issued, ""), now());
        assert_eq!(decision, RenewalDecision::UnknownExpiry);
    }
}
