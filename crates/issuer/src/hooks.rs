//! Verify and post hooks
//!
//! Hooks are user supplied executables. The verify hook publishes the HTTP
//! validation file before the CA checks domain control; the post hook runs
//! after the certificate and key have been installed (typically to reload a
//! service). Both receive their input through environment variables and
//! inherit the parent environment and stdio.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use zerocert_config::CertConf;

use crate::ca::CertificateInfo;
use crate::error::HookError;

pub const ENV_FV_HOST: &str = "ZEROSSL_HTTP_FV_HOST";
pub const ENV_FV_PATH: &str = "ZEROSSL_HTTP_FV_PATH";
pub const ENV_FV_PORT: &str = "ZEROSSL_HTTP_FV_PORT";
pub const ENV_FV_CONTENT: &str = "ZEROSSL_HTTP_FV_CONTENT";
pub const ENV_CERT_FPATH: &str = "ZEROSSL_CERT_FPATH";
pub const ENV_KEY_FPATH: &str = "ZEROSSL_KEY_FPATH";

/// Environment passed to a hook
pub type HookEnv = Vec<(String, String)>;

/// Runs a hook executable
#[async_trait]
pub trait HookRunner: Send + Sync {
    async fn run(&self, executable: &Path, env: &HookEnv) -> Result<(), HookError>;
}

/// Spawns hooks as child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessHookRunner;

#[async_trait]
impl HookRunner for ProcessHookRunner {
    async fn run(&self, executable: &Path, env: &HookEnv) -> Result<(), HookError> {
        if !executable.exists() {
            return Err(HookError::NotFound(executable.to_path_buf()));
        }

        debug!(hook = %executable.display(), "Running hook");

        let status = tokio::process::Command::new(executable)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| HookError::Spawn {
                path: executable.to_path_buf(),
                source: e,
            })?;

        if !status.success() {
            return Err(HookError::Failed {
                path: executable.to_path_buf(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Environment for the verify hook
///
/// `None` when the CA sent no file validation details for `common_name`.
pub fn verify_hook_env(
    info: &CertificateInfo,
    common_name: &str,
) -> Result<Option<HookEnv>, HookError> {
    let Some(method) = info.other_method(common_name) else {
        return Ok(None);
    };

    let url = Url::parse(&method.file_validation_url_http).map_err(|e| HookError::InvalidUrl {
        url: method.file_validation_url_http.clone(),
        source: e,
    })?;
    let port = url.port_or_known_default().unwrap_or(80);

    Ok(Some(vec![
        (
            ENV_FV_HOST.to_string(),
            url.host_str().unwrap_or_default().to_string(),
        ),
        (ENV_FV_PATH.to_string(), url.path().to_string()),
        (ENV_FV_PORT.to_string(), port.to_string()),
        (
            ENV_FV_CONTENT.to_string(),
            method.file_validation_content.join("\n"),
        ),
    ]))
}

/// Environment for the post hook
///
/// Paths are made absolute against the current directory.
pub fn post_hook_env(conf: &CertConf) -> HookEnv {
    vec![
        (ENV_CERT_FPATH.to_string(), absolute_display(&conf.cert_file)),
        (ENV_KEY_FPATH.to_string(), absolute_display(&conf.key_file)),
    ]
}

fn absolute_display(path: &Path) -> String {
    match std::path::absolute(path) {
        Ok(absolute) => absolute.display().to_string(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to make path absolute");
            path.display().to_string()
        }
    }
}

/// Run the verify hook of `conf` for a freshly created certificate
///
/// Returns whether the hook ran.
pub async fn run_verify_hook(
    runner: &dyn HookRunner,
    conf: &CertConf,
    info: &CertificateInfo,
) -> Result<bool, HookError> {
    let Some(hook) = conf.verify_hook.as_deref() else {
        debug!(conf_id = %conf.conf_id, "No verify hook configured");
        return Ok(false);
    };

    let common_name = if info.common_name.is_empty() {
        conf.common_name.as_str()
    } else {
        info.common_name.as_str()
    };

    let Some(env) = verify_hook_env(info, common_name)? else {
        info!(
            conf_id = %conf.conf_id,
            common_name = %common_name,
            "No HTTP validation details for common name, skipping verify hook"
        );
        return Ok(false);
    };

    runner.run(hook, &env).await?;
    info!(conf_id = %conf.conf_id, hook = %hook.display(), "Verify hook completed");
    Ok(true)
}

/// Run the post hook of `conf` after installation
///
/// Returns whether the hook ran.
pub async fn run_post_hook(runner: &dyn HookRunner, conf: &CertConf) -> Result<bool, HookError> {
    let Some(hook) = conf.post_hook.as_deref() else {
        debug!(conf_id = %conf.conf_id, "No post hook configured");
        return Ok(false);
    };

    runner.run(hook, &post_hook_env(conf)).await?;
    info!(conf_id = %conf.conf_id, hook = %hook.display(), "Post hook completed");
    Ok(true)
}
