//! Certificate entry validation
//!
//! Checks key parameters, destination paths and hook executables of every
//! `certConfigs` entry.

use super::{Category, ValidationResult};
use crate::{CertConf, Config};
use std::collections::HashMap;
use std::path::Path;

/// Validate all certificate entries
pub fn validate_cert_configs(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.cert_configs.is_empty() {
        result.warn(
            Category::Entries,
            None,
            "No certificate entries configured, nothing to issue",
        );
    }

    let mut destinations: HashMap<&Path, &str> = HashMap::new();

    for conf in &config.cert_configs {
        validate_entry(conf, &mut result);

        for path in [conf.cert_file.as_path(), conf.key_file.as_path()] {
            if let Some(other) = destinations.insert(path, conf.conf_id.as_str()) {
                if other != conf.conf_id {
                    result.warn(
                        Category::Path,
                        Some(conf.conf_id.as_str()),
                        format!("{:?} is also written by entry '{}'", path, other),
                    );
                }
            }
        }
    }

    result
}

fn validate_entry(conf: &CertConf, result: &mut ValidationResult) {
    let id = conf.conf_id.as_str();

    if let Err(e) = conf.key_spec() {
        result.error(Category::Key, id, e);
    }

    if conf.cert_file == conf.key_file {
        result.error(
            Category::Path,
            id,
            format!("certFile and keyFile are the same path {:?}", conf.cert_file),
        );
    }

    for (name, hook) in [("verifyHook", &conf.verify_hook), ("postHook", &conf.post_hook)] {
        let Some(path) = hook else {
            continue;
        };
        // Missing hooks fail at invocation time, not at load time
        if !path.exists() {
            result.warn(
                Category::Hook,
                Some(id),
                format!("{} {:?} does not exist", name, path),
            );
        } else if !is_executable(path) {
            result.warn(
                Category::Hook,
                Some(id),
                format!("{} {:?} is not executable", name, path),
            );
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyType, Severity, SignatureAlgorithm};

    fn config_with(entries: Vec<CertConf>) -> Config {
        Config {
            cert_configs: entries,
            ..Config::with_data_dir("/var/lib/zerocert")
        }
    }

    #[test]
    fn test_empty_config_warns() {
        let result = validate_cert_configs(&config_with(vec![]));
        assert!(result.is_valid());
        let warning = result.warnings().next().unwrap();
        assert_eq!(warning.category, Category::Entries);
        assert!(warning.conf_id.is_none());
    }

    #[test]
    fn test_incompatible_key_params() {
        let mut conf = CertConf::new("c1", "10.0.0.5", "/tmp/c1.crt", "/tmp/c1.key");
        conf.key_type = KeyType::Ed25519;
        conf.sig_alg = Some(SignatureAlgorithm::Sha256WithRsa);

        let result = validate_cert_configs(&config_with(vec![conf]));

        assert!(!result.is_valid());
        let error = result.errors().next().unwrap();
        assert_eq!(error.category, Category::Key);
        assert_eq!(error.conf_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_same_cert_and_key_path() {
        let conf = CertConf::new("c1", "10.0.0.5", "/tmp/c1.pem", "/tmp/c1.pem");
        let result = validate_cert_configs(&config_with(vec![conf]));
        assert!(result.errors().any(|e| e.category == Category::Path));
    }

    #[test]
    fn test_missing_hook_is_warning() {
        let mut conf = CertConf::new("c1", "10.0.0.5", "/tmp/c1.crt", "/tmp/c1.key");
        conf.verify_hook = Some("/nonexistent/verify.sh".into());

        let result = validate_cert_configs(&config_with(vec![conf]));

        assert!(result.is_valid());
        let hook = result
            .findings()
            .iter()
            .find(|f| f.category == Category::Hook)
            .unwrap();
        assert_eq!(hook.severity, Severity::Warning);
        assert!(hook.message.contains("verifyHook"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_hook_is_warning() {
        let dir = tempfile::TempDir::new().unwrap();
        let hook = dir.path().join("post.sh");
        std::fs::write(&hook, "#!/bin/sh\n").unwrap();

        let mut conf = CertConf::new("c1", "10.0.0.5", "/tmp/c1.crt", "/tmp/c1.key");
        conf.post_hook = Some(hook);

        let result = validate_cert_configs(&config_with(vec![conf]));

        assert!(result
            .warnings()
            .any(|w| w.message.contains("postHook") && w.message.contains("not executable")));
    }

    #[test]
    fn test_shared_destination_warns() {
        let a = CertConf::new("a", "10.0.0.5", "/tmp/shared.crt", "/tmp/a.key");
        let b = CertConf::new("b", "10.0.0.6", "/tmp/shared.crt", "/tmp/b.key");

        let result = validate_cert_configs(&config_with(vec![a, b]));

        assert!(result.is_valid());
        let warning = result.warnings().next().unwrap();
        assert_eq!(warning.conf_id.as_deref(), Some("b"));
        assert!(warning.message.contains("entry 'a'"));
    }
}
