// Per-document structural checks
use super::ValidationIssue;
use crate::config::Config;
use crate::parser::{DocumentSet, FileRole, FilingFiles};
use crate::xml::{self, Element, LINK_NS, XBRLI_NS, XLINK_NS, XSD_NS, XSI_NS};
use crate::{Error, Result};
use log::{debug, warn};
use serde::Serialize;
use std::path::Path;

const MONETARY_NAME_HINTS: &[&str] = &["amount", "value"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructuralReport {
    pub present: DocumentSet,
    pub missing: Vec<FileRole>,
    pub issues: Vec<ValidationIssue>,
    pub facts_checked: usize,
}

impl StructuralReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.len()
    }

    pub(crate) fn record(&mut self, role: FileRole, issues: Vec<ValidationIssue>) {
        self.present |= role.flag();
        self.issues.extend(issues);
    }
}

pub struct StructuralValidator {
    max_file_size: u64,
}

impl Default for StructuralValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralValidator {
    pub fn new() -> Self {
        Self {
            max_file_size: crate::config::DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            max_file_size: config.max_file_size,
        }
    }

    /// Starts a report for `files`; fails only when the instance is absent.
    pub fn check_presence(&self, files: &FilingFiles) -> Result<StructuralReport> {
        if files.get(FileRole::Instance).is_none() {
            return Err(Error::data_validation(
                "file_completeness",
                "Missing required XBRL files: instance",
            ));
        }

        let missing: Vec<FileRole> = FileRole::OPTIONAL
            .into_iter()
            .filter(|role| files.get(*role).is_none())
            .collect();
        let issues = missing
            .iter()
            .map(|&role| ValidationIssue::MissingDocument { role })
            .collect();

        Ok(StructuralReport {
            missing,
            issues,
            ..StructuralReport::default()
        })
    }

    /// Reads and checks every document in `files`; malformed XML is fatal.
    pub fn validate(&self, files: &FilingFiles) -> Result<StructuralReport> {
        let mut report = self.check_presence(files)?;
        for (role, path) in files.iter() {
            let root = xml::read_document(path, self.max_file_size)?;
            let issues = self.check_document(role, path, &root);
            if role == FileRole::Instance {
                report.facts_checked += count_facts(&root);
            }
            report.record(role, issues);
        }

        if !report.is_clean() {
            warn!(
                "Structural validation found {} issue(s)",
                report.warning_count()
            );
        }
        Ok(report)
    }

    /// Checks one already-parsed document; every finding is a warning.
    pub fn check_document(&self, role: FileRole, path: &Path, root: &Element) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let expected = role.suffix();
        if !file_name.ends_with(expected) {
            issues.push(ValidationIssue::NamingConvention {
                role,
                path: path.display().to_string(),
                expected,
            });
        }

        let (namespace, local, display) = expected_root(role);
        if !root.is(namespace, local) {
            issues.push(ValidationIssue::UnexpectedRoot {
                role,
                expected: display,
                found: root.qualified_name(),
            });
        }

        for &namespace in required_namespaces(role) {
            if !root.declares_namespace(namespace) {
                issues.push(ValidationIssue::MissingNamespace { role, namespace });
            }
        }

        if role == FileRole::Instance {
            issues.extend(check_fact_types(root));
        }

        debug!(
            "Structural check of {} ({}): {} issue(s)",
            path.display(),
            role,
            issues.len()
        );
        issues
    }
}

fn expected_root(role: FileRole) -> (&'static str, &'static str, &'static str) {
    match role {
        FileRole::Schema => (XSD_NS, "schema", "xs:schema"),
        FileRole::Instance => (XBRLI_NS, "xbrl", "xbrli:xbrl"),
        _ => (LINK_NS, "linkbase", "link:linkbase"),
    }
}

fn required_namespaces(role: FileRole) -> &'static [&'static str] {
    match role {
        FileRole::Schema => &[XSD_NS],
        FileRole::Instance => &[XBRLI_NS, XSI_NS],
        _ => &[LINK_NS, XLINK_NS],
    }
}

fn fact_elements(root: &Element) -> impl Iterator<Item = &Element> {
    root.descendants().filter(|e| e.attr("contextRef").is_some())
}

fn count_facts(root: &Element) -> usize {
    fact_elements(root).count()
}

/// Monetary facts must parse as numbers; date-shaped facts must look like ISO dates.
fn check_fact_types(root: &Element) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for fact in fact_elements(root) {
        let value = fact.text();
        if value.is_empty() {
            continue;
        }
        let name = fact.local.to_lowercase();
        let unit = fact.attr("unitRef").unwrap_or("").to_lowercase();
        // non-USD amounts may carry free text
        let monetary_hint =
            !unit.is_empty() && MONETARY_NAME_HINTS.iter().any(|h| name.contains(h));

        if unit.contains("usd") {
            if parse_monetary(value).is_none() {
                issues.push(ValidationIssue::InvalidDataType {
                    concept: fact.qualified_name(),
                    expected_type: "monetary",
                    actual_value: value.to_string(),
                });
            }
        } else if !monetary_hint
            && name.contains("date")
            && value.len() >= 8
            && value.contains('-')
            && !value.chars().any(char::is_alphabetic)
            && !is_date_shaped(value)
        {
            issues.push(ValidationIssue::InvalidDataType {
                concept: fact.qualified_name(),
                expected_type: "date",
                actual_value: value.to_string(),
            });
        }
    }
    issues
}

/// Commas are separators, parentheses mean negative.
fn parse_monetary(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != ',' && *c != ')')
        .map(|c| if c == '(' { '-' } else { c })
        .collect();
    cleaned.trim().parse().ok()
}

fn is_date_shaped(value: &str) -> bool {
    (value.len() == 10 && value.matches('-').count() == 2) || value.starts_with("--")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const INSTANCE: &str = r#"<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
        xmlns:us-gaap="http://fasb.org/us-gaap/2024"
        xmlns:dei="http://xbrl.sec.gov/dei/2024">
      <us-gaap:Revenues contextRef="c1" unitRef="usd" decimals="-3">1,000</us-gaap:Revenues>
      <us-gaap:Assets contextRef="c2" unitRef="usd">(500)</us-gaap:Assets>
      <us-gaap:Liabilities contextRef="c2" unitRef="usd">n/a</us-gaap:Liabilities>
      <dei:DocumentPeriodEndDate contextRef="c1">2024/12/31-1</dei:DocumentPeriodEndDate>
      <dei:CurrentFiscalYearEndDate contextRef="c1">--12-31</dei:CurrentFiscalYearEndDate>
    </xbrli:xbrl>"#;

    #[test]
    fn test_instance_checks() {
        let root = xml::parse_str(INSTANCE, "instance").unwrap();
        let issues = StructuralValidator::new().check_document(
            FileRole::Instance,
            &PathBuf::from("acme-20241231_htm.xml"),
            &root,
        );

        assert_eq!(
            issues,
            vec![
                ValidationIssue::MissingNamespace {
                    role: FileRole::Instance,
                    namespace: XSI_NS,
                },
                ValidationIssue::InvalidDataType {
                    concept: "us-gaap:Liabilities".to_string(),
                    expected_type: "monetary",
                    actual_value: "n/a".to_string(),
                },
                ValidationIssue::InvalidDataType {
                    concept: "dei:DocumentPeriodEndDate".to_string(),
                    expected_type: "date",
                    actual_value: "2024/12/31-1".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_linkbase_root_and_suffix() {
        let root = xml::parse_str("<xs:schema xmlns:xs='http://www.w3.org/2001/XMLSchema'/>", "x").unwrap();
        let issues = StructuralValidator::new().check_document(
            FileRole::Label,
            &PathBuf::from("acme-20241231_labels.xml"),
            &root,
        );
        assert_eq!(issues.len(), 4);
        assert!(matches!(issues[0], ValidationIssue::NamingConvention { .. }));
        assert!(matches!(issues[1], ValidationIssue::UnexpectedRoot { .. }));
    }

    #[test]
    fn test_missing_instance_is_fatal() {
        let files = FilingFiles::new().with(FileRole::Schema, "acme-20241231.xsd");
        let err = StructuralValidator::new().check_presence(&files).unwrap_err();
        assert!(matches!(
            err,
            Error::DataValidation {
                kind: "file_completeness",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_reads_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let instance = dir.path().join("acme-20241231_htm.xml");
        std::fs::write(&instance, INSTANCE).unwrap();

        let files = FilingFiles::new().with(FileRole::Instance, &instance);
        let report = StructuralValidator::new().validate(&files).unwrap();
        assert_eq!(report.missing.len(), 5);
        assert_eq!(report.facts_checked, 5);
        assert!(report.present.contains(DocumentSet::INSTANCE));
    }

    #[test]
    fn test_malformed_document_is_a_parsing_error() {
        let dir = tempfile::tempdir().unwrap();
        let instance = dir.path().join("acme-20241231_htm.xml");
        std::fs::write(&instance, "<xbrli:xbrl xmlns:xbrli='http://www.xbrl.org/2003/instance'>").unwrap();

        let files = FilingFiles::new().with(FileRole::Instance, &instance);
        let err = StructuralValidator::new().validate(&files).unwrap_err();
        assert_eq!(err.kind(), "parsing_error");
    }

    #[test]
    fn test_parse_monetary() {
        assert_eq!(parse_monetary("(1,234)"), Some(-1234.0));
        assert_eq!(parse_monetary("12.5"), Some(12.5));
        assert_eq!(parse_monetary("abc"), None);
    }
}
