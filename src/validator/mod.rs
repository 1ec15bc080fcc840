// Structural, data-quality and calculation validation
mod calculation;
mod data;
mod structural;

pub use calculation::{
    BalanceSheetEquation, CalculationCheck, CalculationReport, CalculationValidator,
    EquationStatus, Reconciliation,
};
pub use data::{
    CompletenessReport, ConsistencyReport, DataQuality, DataValidator, MissingElement,
    QualityReport, QualitySummary, CRITICAL_ELEMENTS,
};
pub use structural::{StructuralReport, StructuralValidator};

use crate::config::Config;
use crate::model::StatementType;
use crate::parser::FileRole;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationIssue {
    #[error("Optional {role} document is missing")]
    MissingDocument { role: FileRole },

    #[error("{role} document does not declare namespace {namespace}")]
    MissingNamespace {
        role: FileRole,
        namespace: &'static str,
    },

    #[error("{role} document root is <{found}>, expected <{expected}>")]
    UnexpectedRoot {
        role: FileRole,
        expected: &'static str,
        found: String,
    },

    #[error("{role} file {path} does not end with {expected}")]
    NamingConvention {
        role: FileRole,
        path: String,
        expected: &'static str,
    },

    #[error("Invalid {expected_type} value for {concept}: {actual_value}")]
    InvalidDataType {
        concept: String,
        expected_type: &'static str,
        actual_value: String,
    },

    #[error("Missing financial statement: {statement:?}")]
    MissingStatement { statement: StatementType },

    #[error("Cash mismatch for {period}: balance sheet {balance_sheet}, cash flow {cash_flow}")]
    CashMismatch {
        concept: String,
        period: String,
        balance_sheet: f64,
        cash_flow: f64,
    },

    #[error("{concept} changed {change_percent:.0}% from {previous_period} to {current_period}")]
    PeriodSwing {
        concept: String,
        previous_period: String,
        current_period: String,
        previous_value: f64,
        current_value: f64,
        change_percent: f64,
    },

    #[error("{concept} is reported in several units: {units:?}")]
    InconsistentUnits { concept: String, units: Vec<String> },

    #[error("{concept} value {value} is outside [{lower}, {upper}]")]
    Outlier {
        concept: String,
        period: String,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("{concept} is negative ({value}) for {period}")]
    NegativeValue {
        concept: String,
        period: String,
        value: f64,
    },

    #[error("Monetary fact {concept} has no unit")]
    MissingUnit { concept: String, period: String },
}

impl ValidationIssue {
    pub fn severity(&self) -> Severity {
        match self {
            ValidationIssue::CashMismatch { .. } | ValidationIssue::NegativeValue { .. } => {
                Severity::Error
            }
            _ => Severity::Warning,
        }
    }
}

/// Relative comparison with an absolute fallback when either side is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tolerance {
    pub relative: f64,
    pub zero_absolute: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            relative: 0.02,
            zero_absolute: 1.0,
        }
    }
}

impl Tolerance {
    pub fn new(relative: f64, zero_absolute: f64) -> Self {
        Self {
            relative,
            zero_absolute,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.calculation_tolerance, config.zero_tolerance)
    }

    pub fn approx_eq(&self, a: f64, b: f64) -> bool {
        if a == 0.0 && b == 0.0 {
            return true;
        }
        if a == 0.0 || b == 0.0 {
            return (a - b).abs() <= self.zero_absolute;
        }
        relative_difference(a, b) <= self.relative
    }
}

/// `|a - b| / max(|a|, |b|)`, zero when both are zero.
pub fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}
