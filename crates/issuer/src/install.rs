//! Certificate installation
//!
//! The full chain and the private key are first written to a temporary
//! working directory under the data directory, then copied to the configured
//! destinations. The working directory is removed when installation ends,
//! whether it succeeded or not.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::InstallError;

const TEMP_PREFIX: &str = "temp";
const TEMP_CERT_NAME: &str = "cert-fullchain.pem";
const TEMP_KEY_NAME: &str = "privkey.pem";

/// Destination paths of one certificate
#[derive(Debug, Clone)]
pub struct InstallPaths {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Write `chain_pem` and `key_pem` to their destinations
pub fn install_certificate(
    data_dir: &Path,
    chain_pem: &str,
    key_pem: &str,
    paths: &InstallPaths,
) -> Result<(), InstallError> {
    create_dir_if_missing(data_dir)?;
    let work_dir = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempdir_in(data_dir)?;

    let temp_cert = work_dir.path().join(TEMP_CERT_NAME);
    let temp_key = work_dir.path().join(TEMP_KEY_NAME);
    write_file(&temp_cert, chain_pem)?;
    write_file(&temp_key, key_pem)?;
    set_private(&temp_key)?;

    install_file(&temp_cert, &paths.cert_file)?;
    install_file(&temp_key, &paths.key_file)?;
    set_private(&paths.key_file)?;

    info!(
        cert_file = %paths.cert_file.display(),
        key_file = %paths.key_file.display(),
        "Installed certificate and key"
    );
    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<(), InstallError> {
    fs::write(path, content).map_err(|e| InstallError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Copy a file to its destination, creating missing parent directories
fn install_file(source: &Path, dest: &Path) -> Result<(), InstallError> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_if_missing(parent)?;
        }
    }

    fs::copy(source, dest).map_err(|e| InstallError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Create a directory if it doesn't exist
fn create_dir_if_missing(path: &Path) -> Result<(), InstallError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                InstallError::PermissionDenied(path.display().to_string())
            } else {
                InstallError::CreateDir(format!("{}: {}", path.display(), e))
            }
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_private(path: &Path) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_private(_path: &Path) -> Result<(), InstallError> {
    Ok(())
}
