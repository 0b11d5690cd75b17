//! Configuration lint
//!
//! Field-level rules are expressed with `validator` derives on the config
//! structs. This module adds the checks that look at a whole entry, at the
//! relation between entries, or at the filesystem. Every problem becomes a
//! [`Finding`]; errors reject the configuration, warnings are only reported.

pub mod certs;

use std::fmt;

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Which part of an entry a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Key type, size, curve or signature algorithm
    Key,
    /// Certificate or key destination paths
    Path,
    /// Verify or post hook executables
    Hook,
    /// The entry list as a whole
    Entries,
}

impl Category {
    fn as_str(self) -> &'static str {
        match self {
            Category::Key => "key",
            Category::Path => "path",
            Category::Hook => "hook",
            Category::Entries => "entries",
        }
    }
}

/// One problem found in the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub category: Category,
    /// Entry the finding belongs to, if any
    pub conf_id: Option<String>,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.conf_id {
            Some(id) => write!(f, "{} [{}]: {}", id, self.category.as_str(), self.message),
            None => write!(f, "[{}]: {}", self.category.as_str(), self.message),
        }
    }
}

/// Findings of one lint run, in the order they were found
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    findings: Vec<Finding>,
}

impl ValidationResult {
    fn push(
        &mut self,
        severity: Severity,
        category: Category,
        conf_id: Option<&str>,
        message: String,
    ) {
        self.findings.push(Finding {
            severity,
            category,
            conf_id: conf_id.map(str::to_string),
            message,
        });
    }

    pub(crate) fn error(&mut self, category: Category, conf_id: &str, message: impl Into<String>) {
        self.push(Severity::Error, category, Some(conf_id), message.into());
    }

    pub(crate) fn warn(
        &mut self,
        category: Category,
        conf_id: Option<&str>,
        message: impl Into<String>,
    ) {
        self.push(Severity::Warning, category, conf_id, message.into());
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
    }

    /// True when nothing rejects the configuration
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_split() {
        let mut result = ValidationResult::default();
        result.warn(Category::Entries, None, "nothing to issue");
        assert!(result.is_valid());

        result.error(Category::Key, "c1", "bad curve");
        assert!(!result.is_valid());
        assert_eq!(result.errors().count(), 1);
        assert_eq!(result.warnings().count(), 1);
        assert_eq!(result.findings().len(), 2);
    }

    #[test]
    fn test_display() {
        let mut result = ValidationResult::default();
        result.error(Category::Path, "c1", "certFile and keyFile are the same");
        result.warn(Category::Entries, None, "no entries");

        let rendered: Vec<String> = result.findings().iter().map(|f| f.to_string()).collect();
        assert_eq!(rendered[0], "c1 [path]: certFile and keyFile are the same");
        assert_eq!(rendered[1], "[entries]: no entries");
    }
}
