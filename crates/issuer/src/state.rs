//! Persistent mapping from configuration entries to issued certificates
//!
//! The state lives in `<dataDir>/current.yaml`:
//!
//! ```yaml
//! certs:
//!   - commonName: 10.0.0.5
//!     confId: c1
//!     certId: 2d4e1f...
//!     certFile: /etc/ssl/c1.crt
//!     keyFile: /etc/ssl/c1.key
//! ```
//!
//! The file is loaded on first access and cached. Every mutation rewrites it
//! in full through a temporary file that is renamed over the target.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use zerocert_config::{CertConf, STATE_FILE_NAME};

use crate::error::StateError;

/// One issued certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertRecord {
    pub common_name: String,
    pub conf_id: String,
    pub cert_id: String,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl CertRecord {
    /// Record for a certificate issued from `conf`
    pub fn from_conf(conf: &CertConf, cert_id: impl Into<String>) -> Self {
        Self {
            common_name: conf.common_name.clone(),
            conf_id: conf.conf_id.clone(),
            cert_id: cert_id.into(),
            cert_file: conf.cert_file.clone(),
            key_file: conf.key_file.clone(),
        }
    }
}

/// Contents of the state file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateData {
    #[serde(default)]
    pub certs: Vec<CertRecord>,
}

/// Lazily loaded, write-through state store
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    data: Option<StateData>,
}

impl StateStore {
    /// Store backed by `<data_dir>/current.yaml`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(STATE_FILE_NAME),
            data: None,
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the backing file; a missing file is an empty state
    pub fn load(&self) -> Result<StateData, StateError> {
        if !self.path.exists() {
            trace!(path = %self.path.display(), "No state file, starting empty");
            return Ok(StateData::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| StateError::Read {
            path: self.path.clone(),
            source: e,
        })?;

        // An empty document deserializes to null
        if content.trim().is_empty() {
            return Ok(StateData::default());
        }

        let data: StateData =
            serde_yaml::from_str(&content).map_err(|e| StateError::Corrupt {
                path: self.path.clone(),
                source: e,
            })?;

        debug!(
            path = %self.path.display(),
            records = data.certs.len(),
            "Loaded certificate state"
        );
        Ok(data)
    }

    /// Cached state, loading it on first use
    pub fn get(&mut self) -> Result<&StateData, StateError> {
        Ok(self.cached()?)
    }

    fn cached(&mut self) -> Result<&mut StateData, StateError> {
        if self.data.is_none() {
            self.data = Some(self.load()?);
        }
        Ok(self.data.get_or_insert_with(StateData::default))
    }

    /// Rewrite the backing file from the cached state
    pub fn save(&mut self) -> Result<(), StateError> {
        let data = self.cached()?.clone();
        write_atomic(&self.path, &data)?;
        info!(
            path = %self.path.display(),
            records = data.certs.len(),
            "Saved certificate state"
        );
        Ok(())
    }

    /// Record for a configuration entry
    pub fn find(&mut self, conf_id: &str) -> Result<Option<CertRecord>, StateError> {
        Ok(self
            .get()?
            .certs
            .iter()
            .find(|r| r.conf_id == conf_id)
            .cloned())
    }

    /// Snapshot of all records in file order
    pub fn records(&mut self) -> Result<Vec<CertRecord>, StateError> {
        Ok(self.get()?.certs.clone())
    }

    /// Add a record and save
    pub fn append(&mut self, record: CertRecord) -> Result<(), StateError> {
        if record.cert_id.trim().is_empty() {
            return Err(StateError::EmptyCertificateId(record.conf_id));
        }
        self.cached()?.certs.push(record);
        self.save()
    }

    /// Overwrite the record of `conf_id` in place and save
    ///
    /// Returns `false` if there was no such record; nothing is written then.
    pub fn replace(&mut self, conf_id: &str, record: CertRecord) -> Result<bool, StateError> {
        if record.cert_id.trim().is_empty() {
            return Err(StateError::EmptyCertificateId(record.conf_id));
        }
        let data = self.cached()?;
        let Some(slot) = data.certs.iter_mut().find(|r| r.conf_id == conf_id) else {
            return Ok(false);
        };
        *slot = record;
        self.save()?;
        Ok(true)
    }
}

fn write_atomic(path: &Path, data: &StateData) -> Result<(), StateError> {
    let write_failed = |reason: String| StateError::WriteFailed {
        path: path.to_path_buf(),
        reason,
    };

    let content = serde_yaml::to_string(data).map_err(|e| write_failed(e.to_string()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| write_failed(e.to_string()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_failed(e.to_string()))?;
    tmp.write_all(content.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| write_failed(e.to_string()))?;
    tmp.persist(path)
        .map_err(|e| write_failed(e.error.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, StateStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path());
        (temp_dir, store)
    }

    fn record(conf_id: &str, cert_id: &str) -> CertRecord {
        CertRecord {
            common_name: "10.0.0.5".to_string(),
            conf_id: conf_id.to_string(),
            cert_id: cert_id.to_string(),
            cert_file: PathBuf::from(format!("/etc/ssl/{}.crt", conf_id)),
            key_file: PathBuf::from(format!("/etc/ssl/{}.key", conf_id)),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (_temp_dir, mut store) = setup_store();
        assert!(store.get().unwrap().certs.is_empty());
        assert!(store.find("c1").unwrap().is_none());
    }

    #[test]
    fn test_round_trip_keeps_order() {
        let (temp_dir, mut store) = setup_store();
        for i in 0..5 {
            store
                .append(record(&format!("c{}", i), &format!("id-{}", i)))
                .unwrap();
        }

        let reloaded = StateStore::new(temp_dir.path()).load().unwrap();
        assert_eq!(reloaded, store.get().unwrap().clone());
        let ids: Vec<_> = reloaded.certs.iter().map(|r| r.conf_id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c1", "c2", "c3", "c4"]);
    }

    #[test]
    fn test_file_layout() {
        let (temp_dir, mut store) = setup_store();
        store.append(record("c1", "abc")).unwrap();

        let content = fs::read_to_string(temp_dir.path().join("current.yaml")).unwrap();
        assert!(content.starts_with("certs:"));
        assert!(content.contains("confId: c1"));
        assert!(content.contains("certId: abc"));
        assert!(content.contains("commonName: 10.0.0.5"));
    }

    #[test]
    fn test_reads_existing_file() {
        let (temp_dir, mut store) = setup_store();
        fs::write(
            temp_dir.path().join("current.yaml"),
            "certs:\n- commonName: 1.2.3.4\n  confId: a\n  certId: x\n  certFile: /a.crt\n  keyFile: /a.key\n",
        )
        .unwrap();

        let found = store.find("a").unwrap().unwrap();
        assert_eq!(found.cert_id, "x");
        assert_eq!(found.cert_file, PathBuf::from("/a.crt"));
    }

    #[test]
    fn test_corrupt_file() {
        let (temp_dir, mut store) = setup_store();
        fs::write(temp_dir.path().join("current.yaml"), "certs: [unterminated").unwrap();

        assert!(matches!(store.get(), Err(StateError::Corrupt { .. })));
    }

    #[test]
    fn test_replace_in_place() {
        let (temp_dir, mut store) = setup_store();
        store.append(record("a", "old-a")).unwrap();
        store.append(record("b", "old-b")).unwrap();

        assert!(store.replace("a", record("a", "new-a")).unwrap());
        assert!(!store.replace("zzz", record("zzz", "id")).unwrap());

        let reloaded = StateStore::new(temp_dir.path()).load().unwrap();
        assert_eq!(reloaded.certs.len(), 2);
        assert_eq!(reloaded.certs[0].cert_id, "new-a");
        assert_eq!(reloaded.certs[1].cert_id, "old-b");
    }

    #[test]
    fn test_empty_cert_id_rejected() {
        let (temp_dir, mut store) = setup_store();

        assert!(matches!(
            store.append(record("a", "")),
            Err(StateError::EmptyCertificateId(_))
        ));
        assert!(store.get().unwrap().certs.is_empty());
        assert!(!temp_dir.path().join("current.yaml").exists());
    }

    #[test]
    fn test_write_failure() {
        let temp_dir = TempDir::new().unwrap();
        // A regular file where the data directory should be
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let mut store = StateStore::new(&blocker);

        let result = store.append(record("a", "id"));
        assert!(matches!(result, Err(StateError::WriteFailed { .. })));
        // The cache still holds the record
        assert!(store.find("a").unwrap().is_some());
    }
}
