//! Issuance of new certificates

use tracing::{debug, error, info};

use zerocert_config::CertConf;

use super::{CertOutcome, Orchestrator};
use crate::ca::{CaClient, NewCertificate};
use crate::error::IssueError;
use crate::hooks;
use crate::install::{self, InstallPaths};
use crate::keys;
use crate::state::CertRecord;

impl Orchestrator {
    /// Issue a certificate for `conf`, or renew it if a record already exists
    pub(super) async fn issue_one(&mut self, conf: &CertConf) -> CertOutcome {
        match self.state.find(&conf.conf_id) {
            Ok(Some(record)) => {
                info!(
                    conf_id = %conf.conf_id,
                    cert_id = %record.cert_id,
                    "Certificate already exists, renewing instead"
                );
                return self.renew_record(&record, conf).await;
            }
            Ok(None) => {}
            Err(e) => return CertOutcome::Failed(e.into()),
        }

        let client = match self.connect(conf) {
            Ok(client) => client,
            Err(e) => return CertOutcome::Failed(e),
        };

        self.clean_unfinished(client.as_ref(), conf).await;

        let cert_id = match self.obtain(client.as_ref(), conf).await {
            Ok(cert_id) => cert_id,
            Err(e) => {
                error!(conf_id = %conf.conf_id, error = %e, "Failed to issue certificate");
                return CertOutcome::Failed(e);
            }
        };

        if let Err(e) = self.state.append(CertRecord::from_conf(conf, &cert_id)) {
            error!(conf_id = %conf.conf_id, error = %e, "Failed to persist certificate record");
        }
        self.metrics.inc_issued();

        info!(conf_id = %conf.conf_id, cert_id = %cert_id, "Certificate issued");
        CertOutcome::Issued { cert_id }
    }

    /// Create, validate, download and install a certificate for `conf`
    ///
    /// Returns the CA id of the new certificate.
    pub(super) async fn obtain(
        &self,
        client: &dyn CaClient,
        conf: &CertConf,
    ) -> Result<String, IssueError> {
        let key = keys::generate(conf)?;

        info!(conf_id = %conf.conf_id, common_name = %conf.common_name, "Creating certificate");
        let request = NewCertificate {
            common_name: conf.common_name.clone(),
            csr_pem: key.csr_pem.clone(),
            days: conf.days,
            strict_domains: conf.strict_domains,
        };
        let created = client.create_certificate(&request).await.map_err(|e| {
            self.metrics.inc_api_errors();
            e
        })?;

        let cert_id = created.id.trim().to_string();
        if cert_id.is_empty() {
            return Err(IssueError::EmptyCertificateId);
        }
        debug!(cert_id = %cert_id, status = %created.status, "Certificate created");

        hooks::run_verify_hook(self.hooks.as_ref(), conf, &created).await?;

        self.await_domain_validation(client, &cert_id, conf).await?;

        let id = cert_id.as_str();
        let downloaded = self
            .settings
            .retry
            .run(self.sleeper.as_ref(), move || client.download_certificate(id))
            .await
            .map_err(|e| {
                self.metrics.inc_api_errors();
                e
            })?;

        install::install_certificate(
            &self.settings.data_dir,
            &downloaded.full_chain(),
            &key.key_pem,
            &InstallPaths {
                cert_file: conf.cert_file.clone(),
                key_file: conf.key_file.clone(),
            },
        )?;

        hooks::run_post_hook(self.hooks.as_ref(), conf).await?;

        Ok(cert_id)
    }
}
