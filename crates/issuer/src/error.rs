//! Error types for certificate issuance

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use zerocert_common::RetryExhausted;

/// Errors returned by the CA API
#[derive(Debug, Error)]
pub enum CaError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CA API error {code} ({kind})")]
    Api { code: i64, kind: String },

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode CA response: {0}")]
    Decode(String),

    #[error("invalid CA URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Key or CSR generation errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("unsupported key parameters: {0}")]
    Params(String),

    #[error("key generation failed: {0}")]
    Generate(#[from] rcgen::Error),
}

/// Persisted state errors
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write state file {path:?}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("refusing to store a record without a certificate id (confId '{0}')")]
    EmptyCertificateId(String),
}

/// Hook execution errors
#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook executable {0:?} does not exist")]
    NotFound(PathBuf),

    #[error("failed to start hook {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("hook {path:?} exited with {status}")]
    Failed { path: PathBuf, status: String },

    #[error("invalid validation URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Errors that can occur while installing certificate files
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Failed to create directory: {0}")]
    CreateDir(String),

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of one issuance or renewal attempt
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("CA request failed: {0}")]
    Api(#[from] CaError),

    #[error(transparent)]
    RetryExhausted(#[from] RetryExhausted<CaError>),

    #[error("certificate {cert_id} not issued after {}s", elapsed.as_secs())]
    ReadinessTimeout { cert_id: String, elapsed: Duration },

    #[error("hook failed: {0}")]
    Hook(#[from] HookError),

    #[error("key generation failed: {0}")]
    Key(#[from] KeyError),

    #[error("installation failed: {0}")]
    Install(#[from] InstallError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("CA returned an empty certificate id")]
    EmptyCertificateId,
}
