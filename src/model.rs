use chrono::{Datelike, NaiveDate};
use compact_str::CompactString;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::context::{CanonicalIndex, ContextMapper};
use crate::linkbase::Linkbases;
use crate::parser::DocumentSet;
use crate::validator::{CalculationReport, QualityReport, StructuralReport};
use crate::{Error, Result};

// ============================================================================
// Taxonomy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Instant,
    Duration,
}

impl PeriodType {
    pub fn other(self) -> Self {
        match self {
            PeriodType::Instant => PeriodType::Duration,
            PeriodType::Duration => PeriodType::Instant,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::Instant => "instant",
            PeriodType::Duration => "duration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Balance {
    Debit,
    Credit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxonomyElement {
    /// Namespace-prefixed concept name, e.g. `us-gaap:Assets`.
    pub name: String,
    pub element_type: String,
    pub substitution_group: Option<String>,
    pub period_type: PeriodType,
    pub balance: Option<Balance>,
    pub is_abstract: bool,
    pub nillable: bool,
}

// ============================================================================
// Relationships
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationRelationship {
    pub parent: String,
    pub child: String,
    pub weight: f64,
    pub order: f64,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresentationRelationship {
    pub parent: String,
    pub child: String,
    pub order: f64,
    pub preferred_label: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionRelationship {
    pub parent: String,
    pub child: String,
    pub arcrole: String,
    pub order: f64,
    pub role: String,
    pub closed: Option<bool>,
    pub context_element: Option<String>,
    pub target_role: Option<String>,
}

// ============================================================================
// Contexts and units
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub identifier: String,
    pub scheme: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Period {
    Instant { date: NaiveDate },
    Duration { start: NaiveDate, end: NaiveDate },
    Forever,
}

impl Period {
    pub fn period_type(&self) -> PeriodType {
        match self {
            Period::Instant { .. } => PeriodType::Instant,
            Period::Duration { .. } | Period::Forever => PeriodType::Duration,
        }
    }

    pub fn start(&self) -> Option<NaiveDate> {
        match self {
            Period::Duration { start, .. } => Some(*start),
            _ => None,
        }
    }

    pub fn end(&self) -> Option<NaiveDate> {
        match self {
            Period::Instant { date } => Some(*date),
            Period::Duration { end, .. } => Some(*end),
            Period::Forever => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Member {
    Explicit(String),
    Typed(String),
}

impl Member {
    pub fn value(&self) -> &str {
        match self {
            Member::Explicit(v) | Member::Typed(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    pub id: CompactString,
    pub entity: Entity,
    pub period: Period,
    /// Axis → member, from both the entity segment and the scenario.
    pub dimensions: BTreeMap<String, Member>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UnitMeasure {
    Simple { measure: String },
    Divide { numerator: String, denominator: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    pub id: CompactString,
    pub measure: UnitMeasure,
}

impl Unit {
    pub fn display(&self) -> String {
        match &self.measure {
            UnitMeasure::Simple { measure } => measure.clone(),
            UnitMeasure::Divide {
                numerator,
                denominator,
            } => format!("{}/{}", numerator, denominator),
        }
    }
}

// ============================================================================
// Facts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decimals {
    Finite(i32),
    Infinite,
}

impl Decimals {
    /// `INF` maps to [`Decimals::Infinite`]; anything unparseable is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("INF") {
            return Some(Decimals::Infinite);
        }
        raw.parse().ok().map(Decimals::Finite)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FactValue {
    Numeric(f64),
    Text(String),
}

impl FactValue {
    /// Numeric when the text parses after dropping `,`, `$` and `%`.
    pub fn parse(raw: &str) -> Self {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ',' | '$' | '%') && !c.is_whitespace())
            .collect();
        match cleaned.parse::<f64>() {
            Ok(v) if v.is_finite() => FactValue::Numeric(v),
            _ => FactValue::Text(raw.trim().to_string()),
        }
    }
}

/// Displayed value of a raw reported number.
///
/// Negative decimals divide the raw value back down by `10^|decimals|`;
/// absent, zero, positive or infinite decimals leave it unchanged.
pub fn scale(raw: f64, decimals: Option<Decimals>) -> f64 {
    match decimals {
        Some(Decimals::Finite(d)) if d < 0 => {
            let exponent = i32::try_from(d.unsigned_abs()).unwrap_or(i32::MAX);
            raw / 10f64.powi(exponent)
        }
        _ => raw,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fact {
    pub concept: String,
    pub label: String,
    pub value: FactValue,
    pub raw_value: String,
    pub unit_ref: Option<CompactString>,
    /// Resolved measure, e.g. `iso4217:USD`.
    pub unit: Option<String>,
    pub context_ref: CompactString,
    pub decimals: Option<Decimals>,
    pub period_type: PeriodType,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub dimensions: BTreeMap<String, String>,
    pub id: Option<String>,
}

impl Fact {
    pub fn new(concept: impl Into<String>, raw_value: &str, context_ref: &str) -> Self {
        let concept = concept.into();
        Self {
            label: local_name(&concept).to_string(),
            concept,
            value: FactValue::parse(raw_value),
            raw_value: raw_value.trim().to_string(),
            unit_ref: None,
            unit: None,
            context_ref: CompactString::new(context_ref),
            decimals: None,
            period_type: PeriodType::Duration,
            period_start: None,
            period_end: None,
            dimensions: BTreeMap::new(),
            id: None,
        }
    }

    pub fn with_instant(mut self, date: NaiveDate) -> Self {
        self.period_type = PeriodType::Instant;
        self.period_start = None;
        self.period_end = Some(date);
        self
    }

    pub fn with_duration(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.period_type = PeriodType::Duration;
        self.period_start = Some(start);
        self.period_end = Some(end);
        self
    }

    pub fn with_period(mut self, period: &Period) -> Self {
        self.period_type = period.period_type();
        self.period_start = period.start();
        self.period_end = period.end();
        self
    }

    pub fn with_decimals(mut self, decimals: Decimals) -> Self {
        self.decimals = Some(decimals);
        self
    }

    pub fn with_unit(mut self, unit_ref: &str, measure: impl Into<String>) -> Self {
        self.unit_ref = Some(CompactString::new(unit_ref));
        self.unit = Some(measure.into());
        self
    }

    pub fn with_dimension(mut self, axis: impl Into<String>, member: impl Into<String>) -> Self {
        self.dimensions.insert(axis.into(), member.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.value, FactValue::Numeric(_))
    }

    /// Reported number before scaling.
    pub fn raw_numeric(&self) -> Option<f64> {
        match self.value {
            FactValue::Numeric(v) => Some(v),
            FactValue::Text(_) => None,
        }
    }

    /// Displayed number; every reader of fact values goes through here.
    pub fn scaled_value(&self) -> Option<f64> {
        self.raw_numeric().map(|v| scale(v, self.decimals))
    }

    pub fn local_name(&self) -> &str {
        local_name(&self.concept)
    }

    pub fn fiscal_year(&self) -> Option<i32> {
        self.period_end.map(|d| d.year())
    }

    pub fn has_dimensions(&self) -> bool {
        !self.dimensions.is_empty()
    }

    /// `2024-12-31` for instants, `2024-01-01_to_2024-12-31` for durations.
    pub fn period_key(&self) -> String {
        match (self.period_start, self.period_end) {
            (Some(start), Some(end)) => format!("{}_to_{}", start, end),
            (None, Some(end)) => end.to_string(),
            _ => format!("context:{}", self.context_ref),
        }
    }

    pub fn matches_concept(&self, query: &str) -> bool {
        concept_matches(&self.concept, query)
    }
}

pub fn local_name(concept: &str) -> &str {
    concept.rsplit(':').next().unwrap_or(concept)
}

/// Exact match on qualified names; a bare query matches any prefix.
pub fn concept_matches(concept: &str, query: &str) -> bool {
    if query.contains(':') {
        concept == query
    } else {
        local_name(concept).eq_ignore_ascii_case(query)
    }
}

pub(crate) fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    Equity,
    ComprehensiveIncome,
}

impl StatementType {
    pub const ALL: [StatementType; 5] = [
        StatementType::IncomeStatement,
        StatementType::BalanceSheet,
        StatementType::CashFlow,
        StatementType::Equity,
        StatementType::ComprehensiveIncome,
    ];

    pub const PRIMARY: [StatementType; 3] = [
        StatementType::IncomeStatement,
        StatementType::BalanceSheet,
        StatementType::CashFlow,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StatementType::IncomeStatement => "income_statement",
            StatementType::BalanceSheet => "balance_sheet",
            StatementType::CashFlow => "cash_flow",
            StatementType::Equity => "equity",
            StatementType::ComprehensiveIncome => "comprehensive_income",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            StatementType::IncomeStatement => "Income Statement",
            StatementType::BalanceSheet => "Balance Sheet",
            StatementType::CashFlow => "Cash Flow Statement",
            StatementType::Equity => "Statement of Stockholders' Equity",
            StatementType::ComprehensiveIncome => "Statement of Comprehensive Income",
        }
    }

    /// Orientation used for canonical value lookups.
    pub fn orientation(self) -> PeriodType {
        match self {
            StatementType::BalanceSheet => PeriodType::Instant,
            _ => PeriodType::Duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub concept: String,
    pub label: String,
    pub value: Option<f64>,
    pub level: u8,
    pub is_total: bool,
    pub is_header: bool,
    /// Concept name of the parent line item in the same statement.
    pub parent: Option<String>,
    pub order: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialStatement {
    pub statement_type: StatementType,
    pub company_name: String,
    pub period_end: Option<NaiveDate>,
    pub facts: Vec<Fact>,
    pub calculations: Vec<CalculationRelationship>,
    pub presentation: Vec<PresentationRelationship>,
    pub line_items: Vec<LineItem>,
}

impl FinancialStatement {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn line_item(&self, concept: &str) -> Option<&LineItem> {
        self.line_items
            .iter()
            .find(|item| !item.is_header && concept_matches(&item.concept, concept))
    }

    pub fn facts_for<'a>(&'a self, concept: &'a str) -> impl Iterator<Item = &'a Fact> + 'a {
        self.facts.iter().filter(move |f| f.matches_concept(concept))
    }

    pub fn total_items(&self) -> impl Iterator<Item = &LineItem> {
        self.line_items.iter().filter(|item| item.is_total)
    }

    /// Children of `parent` in the synthesized presentation order.
    pub fn children_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a LineItem> + 'a {
        self.line_items
            .iter()
            .filter(move |item| item.parent.as_deref() == Some(parent))
    }
}

// ============================================================================
// Filing
// ============================================================================

pub const UNKNOWN_COMPANY: &str = "Unknown Company";
pub const UNKNOWN_CIK: &str = "0000000000";
pub const DEFAULT_FORM_TYPE: &str = "10-K";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyInfo {
    pub name: String,
    pub cik: String,
    pub ticker: Option<String>,
    /// `--MM-DD` as reported in the cover page.
    pub fiscal_year_end: Option<String>,
    pub form_type: String,
    pub document_period_end: Option<NaiveDate>,
}

impl Default for CompanyInfo {
    fn default() -> Self {
        Self {
            name: UNKNOWN_COMPANY.to_string(),
            cik: UNKNOWN_CIK.to_string(),
            ticker: None,
            fiscal_year_end: None,
            form_type: DEFAULT_FORM_TYPE.to_string(),
            document_period_end: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FilingData {
    pub company: CompanyInfo,
    pub filing_date: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub income_statement: Option<FinancialStatement>,
    pub balance_sheet: Option<FinancialStatement>,
    pub cash_flow: Option<FinancialStatement>,
    pub equity_statement: Option<FinancialStatement>,
    pub comprehensive_income: Option<FinancialStatement>,
    pub facts: Vec<Fact>,
    pub taxonomy: Vec<TaxonomyElement>,
    pub contexts: Vec<Context>,
    pub units: Vec<Unit>,
    pub linkbases: Linkbases,
    /// Documents that were actually parsed.
    pub documents: DocumentSet,
    pub structural_report: Option<StructuralReport>,
    pub quality_report: Option<QualityReport>,
    pub calculation_report: Option<CalculationReport>,
    /// Canonical contexts over `facts`, built on the first lookup.
    #[serde(skip)]
    pub(crate) canonical: OnceCell<CanonicalIndex>,
}

impl FilingData {
    pub fn statement(&self, kind: StatementType) -> Option<&FinancialStatement> {
        match kind {
            StatementType::IncomeStatement => self.income_statement.as_ref(),
            StatementType::BalanceSheet => self.balance_sheet.as_ref(),
            StatementType::CashFlow => self.cash_flow.as_ref(),
            StatementType::Equity => self.equity_statement.as_ref(),
            StatementType::ComprehensiveIncome => self.comprehensive_income.as_ref(),
        }
    }

    pub(crate) fn statement_slot(&mut self, kind: StatementType) -> &mut Option<FinancialStatement> {
        match kind {
            StatementType::IncomeStatement => &mut self.income_statement,
            StatementType::BalanceSheet => &mut self.balance_sheet,
            StatementType::CashFlow => &mut self.cash_flow,
            StatementType::Equity => &mut self.equity_statement,
            StatementType::ComprehensiveIncome => &mut self.comprehensive_income,
        }
    }

    pub fn statements(&self) -> impl Iterator<Item = &FinancialStatement> {
        StatementType::ALL
            .into_iter()
            .filter_map(move |kind| self.statement(kind))
    }

    pub fn fiscal_year(&self) -> Option<i32> {
        self.period_end.map(|d| d.year())
    }

    /// Canonical-context lookups over every fact of the filing.
    pub fn context_mapper(&self) -> ContextMapper<'_> {
        ContextMapper::new(&self.facts)
    }

    pub fn value_for_year(&self, concept: &str, fiscal_year: i32, orientation: PeriodType) -> Option<f64> {
        self.canonical
            .get_or_init(|| self.context_mapper().canonical_index())
            .value_for_year(&self.facts, concept, fiscal_year, orientation)
    }

    pub fn require_value_for_year(
        &self,
        concept: &str,
        fiscal_year: i32,
        orientation: PeriodType,
    ) -> Result<f64> {
        self.value_for_year(concept, fiscal_year, orientation)
            .ok_or_else(|| {
                Error::Query(format!(
                    "no {} value for {} in fiscal year {}",
                    orientation.as_str(),
                    concept,
                    fiscal_year
                ))
            })
    }

    pub fn element(&self, concept: &str) -> Option<&TaxonomyElement> {
        self.taxonomy
            .iter()
            .find(|e| concept_matches(&e.name, concept))
    }
}
