// Completeness, consistency and quality scoring over an assembled filing
use super::{Severity, Tolerance, ValidationIssue};
use crate::config::Config;
use crate::model::{contains_any, local_name, Fact, FilingData, StatementType};
use crate::parser::FileRole;
use crate::{Error, Result};
use ahash::{AHashMap, AHashSet};
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeSet;

/// Concepts every complete filing is expected to report, matched as
/// case-insensitive substrings of the local name.
pub const CRITICAL_ELEMENTS: &[(StatementType, &[&str])] = &[
    (
        StatementType::IncomeStatement,
        &[
            "Revenues",
            "Revenue",
            "TotalRevenues",
            "NetIncomeLoss",
            "NetIncome",
            "ProfitLoss",
            "OperatingIncomeLoss",
            "OperatingIncome",
        ],
    ),
    (
        StatementType::BalanceSheet,
        &[
            "Assets",
            "TotalAssets",
            "AssetsCurrent",
            "Liabilities",
            "LiabilitiesAndStockholdersEquity",
            "StockholdersEquity",
            "ShareholdersEquity",
        ],
    ),
    (
        StatementType::CashFlow,
        &[
            "NetCashProvidedByUsedInOperatingActivities",
            "NetCashProvidedByUsedInInvestingActivities",
            "NetCashProvidedByUsedInFinancingActivities",
            "CashAndCashEquivalentsAtCarryingValue",
        ],
    ),
];

// Points per primary statement in the completeness score.
const POINTS_PER_STATEMENT: f64 = 10.0;
const MISSING_DOCUMENT_PENALTY: f64 = 0.05;
const PERIOD_SWING_LIMIT: f64 = 5.0;
const OUTLIER_MIN_SAMPLES: usize = 4;
const MONETARY_KEYWORDS: &[&str] = &["revenue", "income", "expense", "asset", "liabilit", "cash"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingElement {
    pub statement: StatementType,
    pub element: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessReport {
    pub score: f64,
    pub missing_statements: Vec<StatementType>,
    pub missing_elements: Vec<MissingElement>,
    pub missing_documents: Vec<FileRole>,
    /// Distinct period keys across the primary statements.
    pub periods: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub cross_statement: Vec<ValidationIssue>,
    pub period: Vec<ValidationIssue>,
    pub units: Vec<ValidationIssue>,
}

impl ConsistencyReport {
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.cross_statement
            .iter()
            .chain(&self.period)
            .chain(&self.units)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataQuality {
    pub outliers: Vec<ValidationIssue>,
    pub anomalies: Vec<ValidationIssue>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySummary {
    pub total_facts: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub is_acceptable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub overall_score: f64,
    pub completeness: CompletenessReport,
    pub consistency: ConsistencyReport,
    pub quality: DataQuality,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub summary: QualitySummary,
}

impl QualityReport {
    pub fn is_acceptable(&self) -> bool {
        self.summary.is_acceptable
    }
}

pub struct DataValidator {
    tolerance: Tolerance,
    completeness_floor: f64,
    acceptable_quality: f64,
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DataValidator {
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            tolerance: Tolerance::from_config(config),
            completeness_floor: config.completeness_floor,
            acceptable_quality: config.acceptable_quality,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Scores statement and critical-concept coverage; the only hard gate.
    pub fn completeness(&self, filing: &FilingData) -> Result<CompletenessReport> {
        let mut missing_statements = Vec::new();
        let mut missing_elements = Vec::new();

        for &(kind, elements) in CRITICAL_ELEMENTS {
            let statement = match filing.statement(kind).filter(|s| !s.is_empty()) {
                Some(statement) => statement,
                None => {
                    missing_statements.push(kind);
                    continue;
                }
            };
            let present: Vec<String> = statement
                .facts
                .iter()
                .map(|f| f.local_name().to_lowercase())
                .collect();
            for &element in elements {
                let needle = element.to_lowercase();
                if !present.iter().any(|c| c.contains(&needle)) {
                    missing_elements.push(MissingElement {
                        statement: kind,
                        element,
                    });
                }
            }
        }

        let missing_documents: Vec<FileRole> = FileRole::OPTIONAL
            .into_iter()
            .filter(|role| !filing.documents.contains(role.flag()))
            .collect();

        let expected = CRITICAL_ELEMENTS.len() as f64 * POINTS_PER_STATEMENT;
        let missing =
            missing_statements.len() as f64 * POINTS_PER_STATEMENT + missing_elements.len() as f64;
        let coverage = ((expected - missing) / expected).max(0.0);
        let penalty = (1.0 - MISSING_DOCUMENT_PENALTY * missing_documents.len() as f64).max(0.0);
        let score = coverage * penalty;

        let periods: BTreeSet<String> = primary_facts(filing).map(Fact::period_key).collect();

        debug!(
            "Completeness {:.3}: {} missing statement(s), {} missing element(s), {} missing document(s)",
            score,
            missing_statements.len(),
            missing_elements.len(),
            missing_documents.len()
        );

        if score < self.completeness_floor {
            return Err(Error::data_validation(
                "completeness",
                format!(
                    "Data completeness too low: {:.1}% (floor {:.1}%)",
                    score * 100.0,
                    self.completeness_floor * 100.0
                ),
            ));
        }

        Ok(CompletenessReport {
            score,
            missing_statements,
            missing_elements,
            missing_documents,
            periods: periods.into_iter().collect(),
        })
    }

    pub fn consistency(&self, filing: &FilingData) -> ConsistencyReport {
        ConsistencyReport {
            cross_statement: self.cross_statement_issues(filing),
            period: period_swings(filing),
            units: unit_issues(filing),
        }
    }

    pub fn quality(&self, filing: &FilingData) -> DataQuality {
        let facts = distinct_primary_facts(filing);
        let outliers = outliers(&facts);
        let anomalies = anomalies(&facts);

        let score = if facts.is_empty() {
            0.0
        } else {
            (1.0 - (outliers.len() + anomalies.len()) as f64 / facts.len() as f64).max(0.0)
        };

        DataQuality {
            outliers,
            anomalies,
            score,
        }
    }

    /// Rolls the three checks into one report; fails only on the completeness floor.
    pub fn report(&self, filing: &FilingData) -> Result<QualityReport> {
        let completeness = self.completeness(filing)?;
        let consistency = self.consistency(filing);
        let quality = self.quality(filing);

        let cross_penalty = (1.0 - consistency.cross_statement.len() as f64 / 10.0).max(0.0);
        let overall_score =
            (completeness.score * 0.4 + cross_penalty * 0.3 + quality.score * 0.3).max(0.0);

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let document_issues = completeness
            .missing_documents
            .iter()
            .map(|&role| ValidationIssue::MissingDocument { role });
        let statement_issues = completeness
            .missing_statements
            .iter()
            .map(|&statement| ValidationIssue::MissingStatement { statement });
        let all_issues = document_issues
            .chain(statement_issues)
            .chain(consistency.issues().cloned())
            .chain(quality.outliers.iter().cloned())
            .chain(quality.anomalies.iter().cloned());
        for issue in all_issues {
            if issue.severity() >= Severity::Error {
                errors.push(issue);
            } else {
                warnings.push(issue);
            }
        }

        let is_acceptable = overall_score >= self.acceptable_quality;
        if !is_acceptable {
            warn!(
                "Data quality score {:.2} is below the acceptable threshold {:.2}",
                overall_score, self.acceptable_quality
            );
        }

        Ok(QualityReport {
            overall_score,
            summary: QualitySummary {
                total_facts: primary_facts(filing).count(),
                error_count: errors.len(),
                warning_count: warnings.len(),
                is_acceptable,
            },
            completeness,
            consistency,
            quality,
            errors,
            warnings,
        })
    }

    fn cross_statement_issues(&self, filing: &FilingData) -> Vec<ValidationIssue> {
        let (Some(balance_sheet), Some(cash_flow)) = (&filing.balance_sheet, &filing.cash_flow) else {
            return Vec::new();
        };

        let cash_facts = |facts: &[Fact]| -> Vec<(Fact, f64)> {
            facts
                .iter()
                .filter(|f| !f.has_dimensions() && is_cash_equivalent(f))
                .filter_map(|f| f.scaled_value().map(|v| (f.clone(), v)))
                .collect()
        };
        let bs_cash = cash_facts(&balance_sheet.facts);
        let cf_cash = cash_facts(&cash_flow.facts);

        let mut issues = Vec::new();
        for (bs, bs_value) in &bs_cash {
            let period = bs.period_key();
            for (cf, cf_value) in &cf_cash {
                let same_fact = cf.concept == bs.concept && cf.context_ref == bs.context_ref;
                if same_fact || cf.period_key() != period {
                    continue;
                }
                if !self.tolerance.approx_eq(*bs_value, *cf_value) {
                    issues.push(ValidationIssue::CashMismatch {
                        concept: bs.concept.clone(),
                        period: period.clone(),
                        balance_sheet: *bs_value,
                        cash_flow: *cf_value,
                    });
                }
            }
        }
        issues
    }
}

fn is_cash_equivalent(fact: &Fact) -> bool {
    let name = fact.concept.to_lowercase();
    name.contains("cash") && name.contains("equivalent")
}

fn primary_facts(filing: &FilingData) -> impl Iterator<Item = &Fact> {
    StatementType::PRIMARY
        .into_iter()
        .filter_map(move |kind| filing.statement(kind))
        .flat_map(|s| s.facts.iter())
}

/// Primary-statement facts with each (concept, context) counted once.
fn distinct_primary_facts(filing: &FilingData) -> Vec<&Fact> {
    let mut seen = AHashSet::new();
    primary_facts(filing)
        .filter(|f| seen.insert((f.concept.as_str(), f.context_ref.as_str())))
        .collect()
}

fn period_swings(filing: &FilingData) -> Vec<ValidationIssue> {
    let mut by_concept: AHashMap<&str, Vec<(&Fact, f64)>> = AHashMap::new();
    let mut order = Vec::new();
    for fact in distinct_primary_facts(filing) {
        if fact.has_dimensions() {
            continue;
        }
        let Some(value) = fact.scaled_value() else {
            continue;
        };
        let entry = by_concept.entry(fact.concept.as_str()).or_insert_with(|| {
            order.push(fact.concept.as_str());
            Vec::new()
        });
        entry.push((fact, value));
    }

    let mut issues = Vec::new();
    for concept in order {
        let Some(facts) = by_concept.get_mut(concept) else {
            continue;
        };
        facts.sort_by_key(|(f, _)| (f.period_end, f.period_start));
        for pair in facts.windows(2) {
            let (prev, prev_value) = pair[0];
            let (curr, curr_value) = pair[1];
            if prev_value == 0.0 {
                continue;
            }
            let change = ((curr_value - prev_value) / prev_value).abs();
            if change > PERIOD_SWING_LIMIT {
                issues.push(ValidationIssue::PeriodSwing {
                    concept: concept.to_string(),
                    previous_period: prev.period_key(),
                    current_period: curr.period_key(),
                    previous_value: prev_value,
                    current_value: curr_value,
                    change_percent: change * 100.0,
                });
            }
        }
    }
    issues
}

fn unit_issues(filing: &FilingData) -> Vec<ValidationIssue> {
    let mut units: AHashMap<&str, BTreeSet<String>> = AHashMap::new();
    let mut order = Vec::new();
    for fact in primary_facts(filing) {
        let Some(unit) = fact.unit.clone().or_else(|| fact.unit_ref.as_ref().map(|u| u.to_string()))
        else {
            continue;
        };
        units
            .entry(fact.concept.as_str())
            .or_insert_with(|| {
                order.push(fact.concept.as_str());
                BTreeSet::new()
            })
            .insert(unit);
    }

    order
        .into_iter()
        .filter_map(|concept| {
            let found = units.get(concept)?;
            (found.len() > 1).then(|| ValidationIssue::InconsistentUnits {
                concept: concept.to_string(),
                units: found.iter().cloned().collect(),
            })
        })
        .collect()
}

/// Values outside `q1 - 1.5 IQR ..= q3 + 1.5 IQR`.
fn outliers(facts: &[&Fact]) -> Vec<ValidationIssue> {
    let values: Vec<(&Fact, f64)> = facts
        .iter()
        .filter_map(|f| f.scaled_value().map(|v| (*f, v)))
        .collect();
    if values.len() < OUTLIER_MIN_SAMPLES {
        return Vec::new();
    }

    let mut sorted: Vec<f64> = values.iter().map(|(_, v)| *v).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let q1 = sorted[n / 4];
    let q3 = sorted[3 * n / 4];
    let iqr = q3 - q1;
    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;

    values
        .into_iter()
        .filter(|(_, v)| *v < lower || *v > upper)
        .map(|(fact, value)| ValidationIssue::Outlier {
            concept: fact.concept.clone(),
            period: fact.period_key(),
            value,
            lower,
            upper,
        })
        .collect()
}

fn anomalies(facts: &[&Fact]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for fact in facts {
        let Some(value) = fact.scaled_value() else {
            continue;
        };
        let name = local_name(&fact.concept).to_lowercase();
        let negative_revenue = name.contains("revenue") && value < 0.0;
        let negative_assets = name.contains("asset") && !name.contains("liabilit") && value < 0.0;
        if negative_revenue || negative_assets {
            issues.push(ValidationIssue::NegativeValue {
                concept: fact.concept.clone(),
                period: fact.period_key(),
                value,
            });
        }
        if fact.unit_ref.is_none() && contains_any(&name, MONETARY_KEYWORDS) {
            issues.push(ValidationIssue::MissingUnit {
                concept: fact.concept.clone(),
                period: fact.period_key(),
            });
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FinancialStatement;
    use crate::parser::DocumentSet;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn fy(concept: &str, value: &str) -> Fact {
        Fact::new(concept, value, "FY2024")
            .with_duration(date("2024-01-01"), date("2024-12-31"))
            .with_unit("usd", "iso4217:USD")
    }

    fn bs(concept: &str, value: &str) -> Fact {
        Fact::new(concept, value, "I2024")
            .with_instant(date("2024-12-31"))
            .with_unit("usd", "iso4217:USD")
    }

    fn statement(kind: StatementType, facts: Vec<Fact>) -> FinancialStatement {
        FinancialStatement {
            statement_type: kind,
            company_name: "Acme Corp".to_string(),
            period_end: Some(date("2024-12-31")),
            facts,
            calculations: Vec::new(),
            presentation: Vec::new(),
            line_items: Vec::new(),
        }
    }

    fn complete_filing() -> FilingData {
        FilingData {
            income_statement: Some(statement(
                StatementType::IncomeStatement,
                vec![
                    fy("us-gaap:Revenues", "1000"),
                    fy("us-gaap:OperatingIncomeLoss", "200"),
                    fy("us-gaap:NetIncomeLoss", "150"),
                ],
            )),
            balance_sheet: Some(statement(
                StatementType::BalanceSheet,
                vec![
                    bs("us-gaap:Assets", "500"),
                    bs("us-gaap:AssetsCurrent", "200"),
                    bs("us-gaap:Liabilities", "300"),
                    bs("us-gaap:StockholdersEquity", "200"),
                    bs("us-gaap:LiabilitiesAndStockholdersEquity", "500"),
                    bs("us-gaap:CashAndCashEquivalentsAtCarryingValue", "50"),
                ],
            )),
            cash_flow: Some(statement(
                StatementType::CashFlow,
                vec![
                    fy("us-gaap:NetCashProvidedByUsedInOperatingActivities", "180"),
                    fy("us-gaap:NetCashProvidedByUsedInInvestingActivities", "-60"),
                    fy("us-gaap:NetCashProvidedByUsedInFinancingActivities", "-100"),
                    bs("us-gaap:CashAndCashEquivalentsAtCarryingValue", "50"),
                ],
            )),
            documents: DocumentSet::all(),
            ..FilingData::default()
        }
    }

    #[test]
    fn test_completeness_counts_missing_elements() {
        let report = DataValidator::new().completeness(&complete_filing()).unwrap();
        // TotalRevenues, ProfitLoss, TotalAssets, ShareholdersEquity
        assert_eq!(report.missing_elements.len(), 4);
        assert!(report.missing_statements.is_empty());
        assert!((report.score - 26.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_documents_lower_completeness() {
        let mut filing = complete_filing();
        filing.documents = DocumentSet::SCHEMA | DocumentSet::INSTANCE;
        let report = DataValidator::new().completeness(&filing).unwrap();
        assert_eq!(report.missing_documents.len(), 4);
        assert!((report.score - 26.0 / 30.0 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_completeness_floor_is_a_hard_gate() {
        let mut filing = complete_filing();
        filing.balance_sheet = None;
        filing.cash_flow = None;
        let err = DataValidator::new().completeness(&filing).unwrap_err();
        assert!(matches!(
            err,
            Error::DataValidation {
                kind: "completeness",
                ..
            }
        ));
    }

    #[test]
    fn test_cash_mismatch_between_statements() {
        let mut filing = complete_filing();
        if let Some(cf) = filing.cash_flow.as_mut() {
            cf.facts.push(bs(
                "us-gaap:CashCashEquivalentsRestrictedCashAndRestrictedCashEquivalents",
                "80",
            ));
        }
        let report = DataValidator::new().consistency(&filing);
        assert_eq!(report.cross_statement.len(), 1);
        assert_eq!(report.cross_statement[0].severity(), Severity::Error);
    }

    #[test]
    fn test_period_swing_and_units() {
        let mut filing = complete_filing();
        if let Some(is) = filing.income_statement.as_mut() {
            is.facts.push(
                Fact::new("us-gaap:Revenues", "100", "FY2023")
                    .with_duration(date("2023-01-01"), date("2023-12-31"))
                    .with_unit("eur", "iso4217:EUR"),
            );
        }
        let report = DataValidator::new().consistency(&filing);
        assert_eq!(report.period.len(), 1);
        assert_eq!(report.units.len(), 1);
        match &report.period[0] {
            ValidationIssue::PeriodSwing { change_percent, .. } => {
                assert!((change_percent - 900.0).abs() < 1e-9)
            }
            other => panic!("unexpected issue {:?}", other),
        }
    }

    #[test]
    fn test_quality_anomalies() {
        let facts = vec![
            fy("us-gaap:Revenues", "-10"),
            Fact::new("us-gaap:OperatingExpenses", "5", "FY2024"),
            bs("us-gaap:LiabilitiesAndAssetsNet", "-3"),
        ];
        let refs: Vec<&Fact> = facts.iter().collect();
        let issues = anomalies(&refs);
        assert_eq!(issues.len(), 2);
        assert!(matches!(issues[0], ValidationIssue::NegativeValue { .. }));
        assert!(matches!(issues[1], ValidationIssue::MissingUnit { .. }));
    }

    #[test]
    fn test_iqr_outliers() {
        let facts: Vec<Fact> = ["10", "12", "11", "13", "12", "1000"]
            .iter()
            .enumerate()
            .map(|(i, v)| fy(&format!("acme:Item{}", i), v))
            .collect();
        let refs: Vec<&Fact> = facts.iter().collect();
        let found = outliers(&refs);
        assert_eq!(found.len(), 1);
        assert!(matches!(&found[0], ValidationIssue::Outlier { concept, .. } if concept == "acme:Item5"));
    }

    #[test]
    fn test_report_rolls_up_scores() {
        let report = DataValidator::new().report(&complete_filing()).unwrap();
        assert!(report.overall_score > 0.0 && report.overall_score <= 1.0);
        assert_eq!(report.summary.total_facts, 13);
        assert_eq!(report.summary.error_count, report.errors.len());
    }
}
