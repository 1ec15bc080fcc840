//! xbrl-filing - XBRL filing parser and validator
//!
//! Joins a taxonomy schema, its four linkbases and the instance document
//! into one [`FilingData`] with canonical-context lookups, rebuilt
//! financial statements and attached validation reports.
//!
//! Licensed under AGPL-3.0

pub mod config;
pub mod context;
pub mod instance;
pub mod linkbase;
pub mod model;
pub mod parser;
pub mod schema;
pub mod statement;
pub mod validator;
pub mod xml;

pub use config::Config;
pub use context::{CanonicalIndex, ContextFilter, ContextInfo, ContextMapper, ContextSummary};
pub use instance::{InstanceDocument, InstanceParser};
pub use linkbase::{LabelTable, LinkbaseKind, LinkbaseParser, Linkbases};
pub use model::{
    Balance, CalculationRelationship, CompanyInfo, Context, Decimals, DefinitionRelationship,
    Fact, FactValue, FilingData, FinancialStatement, LineItem, Period, PeriodType,
    PresentationRelationship, StatementType, TaxonomyElement, Unit,
};
pub use parser::{DocumentSet, FileRole, FilingFiles, FilingParser};
pub use schema::{SchemaDocument, SchemaParser};
pub use statement::{builder_for, StatementBuilder, StatementInputs};
pub use validator::{
    CalculationReport, CalculationValidator, DataValidator, QualityReport, StructuralReport,
    Severity, StructuralValidator, Tolerance, ValidationIssue,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {path}: {message}")]
    Parsing { path: String, message: String },

    #[error("Data validation error ({kind}): {message}")]
    DataValidation { kind: &'static str, message: String },

    #[error("Calculation error: {message} ({critical_errors} critical)")]
    Calculation {
        message: String,
        critical_errors: usize,
    },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn parsing(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parsing {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn data_validation(kind: &'static str, message: impl Into<String>) -> Self {
        Error::DataValidation {
            kind,
            message: message.into(),
        }
    }

    /// Stable snake_case name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io_error",
            Error::Parsing { .. } => "parsing_error",
            Error::DataValidation { .. } => "data_validation_error",
            Error::Calculation { .. } => "calculation_error",
            Error::Query(_) => "query_error",
            Error::Config(_) => "configuration_error",
            Error::Json(_) => "serialization_error",
        }
    }

    /// Remediation hints for the caller.
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            Error::Io(_) => &[
                "Check that the file exists and is readable",
                "Verify the filing directory path",
            ],
            Error::Parsing { .. } => &[
                "Check that the file is well-formed XML",
                "Verify the file is a valid XBRL document",
                "Make sure the file was not truncated during download",
            ],
            Error::DataValidation { kind, .. } => match *kind {
                "file_completeness" => &[
                    "Verify the instance document path",
                    "Provide the instance document explicitly when auto-detection fails",
                ],
                "file_size" => &[
                    "Raise max_file_size in the configuration",
                    "Check that the file is not corrupted",
                ],
                _ => &[
                    "Check that the filing contains income, balance sheet and cash flow data",
                    "Verify that all linkbase files are present",
                ],
            },
            Error::Calculation { .. } => &[
                "Review the calculation linkbase for the failing parent concepts",
                "Set allow_calculation_errors to continue with inconsistent filings",
            ],
            Error::Query(_) => &[
                "Check the concept name and fiscal year",
                "Inspect the context summary for the available fiscal years",
            ],
            Error::Config(_) => &["Check the configuration file and XBRL_* environment variables"],
            Error::Json(_) => &["Check that the JSON document is valid"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_and_suggestions() {
        let err = Error::parsing("a.xml", "unexpected end of file");
        assert_eq!(err.kind(), "parsing_error");
        assert!(err.to_string().contains("a.xml"));
        assert!(!err.suggestions().is_empty());

        let err = Error::data_validation("file_completeness", "instance missing");
        assert_eq!(err.kind(), "data_validation_error");
        assert!(err.suggestions()[0].contains("instance"));
    }
}
