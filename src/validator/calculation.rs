// Calculation-linkbase sums and hand-authored statement identities
use super::{relative_difference, Severity, Tolerance};
use crate::config::Config;
use crate::model::{
    concept_matches, CalculationRelationship, Fact, FilingData, FinancialStatement, PeriodType,
};
use crate::{Error, Result};
use ahash::{AHashMap, AHashSet};
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;

// Relative differences above this are critical.
const CRITICAL_THRESHOLD: f64 = 0.10;

const ASSETS: &[&str] = &["Assets", "TotalAssets"];
const LIABILITIES: &[&str] = &["Liabilities", "TotalLiabilities", "LiabilitiesTotal"];
const EQUITY: &[&str] = &["StockholdersEquity", "ShareholdersEquity", "Equity"];
const LIABILITIES_AND_EQUITY: &[&str] = &[
    "LiabilitiesAndStockholdersEquity",
    "LiabilitiesAndShareholdersEquity",
];
const REVENUE: &[&str] = &["Revenues", "Revenue", "TotalRevenues", "SalesRevenueNet"];
const COST_OF_REVENUE: &[&str] = &["CostOfRevenue", "CostOfGoodsSold", "CostOfSales"];
const GROSS_PROFIT: &[&str] = &["GrossProfit"];
const OPERATING_EXPENSES: &[&str] = &["OperatingExpenses", "CostsAndExpenses"];
const OPERATING_INCOME: &[&str] = &["OperatingIncomeLoss", "OperatingIncome"];
const NET_INCOME: &[&str] = &["NetIncomeLoss", "NetIncome", "ProfitLoss"];
const OPERATING_CASH: &[&str] = &[
    "NetCashProvidedByUsedInOperatingActivities",
    "CashFlowFromOperatingActivities",
];
const INVESTING_CASH: &[&str] = &[
    "NetCashProvidedByUsedInInvestingActivities",
    "CashFlowFromInvestingActivities",
];
const FINANCING_CASH: &[&str] = &[
    "NetCashProvidedByUsedInFinancingActivities",
    "CashFlowFromFinancingActivities",
];
const CASH_CHANGE: &[&str] = &[
    "CashCashEquivalentsRestrictedCashAndRestrictedCashEquivalentsPeriodIncreaseDecreaseIncludingExchangeRateEffect",
    "CashAndCashEquivalentsPeriodIncreaseDecrease",
    "CashAndCashEquivalentsAtCarryingValuePeriodIncreaseDecrease",
];

/// One calculation-linkbase group: a parent in one role and one context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationCheck {
    pub role: String,
    pub parent_concept: String,
    pub period: String,
    pub context_ref: String,
    pub reported: f64,
    pub computed: f64,
    pub difference: f64,
    pub relative_difference: f64,
    pub is_valid: bool,
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EquationStatus {
    Balanced,
    Unbalanced,
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSheetEquation {
    pub period: String,
    pub assets: Option<f64>,
    pub liabilities: Option<f64>,
    pub equity: Option<f64>,
    pub liabilities_and_equity: Option<f64>,
    pub difference: Option<f64>,
    pub relative_difference: Option<f64>,
    pub status: EquationStatus,
}

impl BalanceSheetEquation {
    pub fn is_balanced(&self) -> bool {
        self.status == EquationStatus::Balanced
    }
}

/// A simplified identity check such as gross profit = revenue - cost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub name: &'static str,
    pub period: String,
    pub reported: Option<f64>,
    pub computed: Option<f64>,
    pub difference: Option<f64>,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalculationReport {
    pub checks: Vec<CalculationCheck>,
    pub validated: usize,
    pub failed: usize,
    pub accuracy: f64,
    pub critical_errors: usize,
    pub balance_sheet: Vec<BalanceSheetEquation>,
    pub reconciliations: Vec<Reconciliation>,
}

impl CalculationReport {
    pub fn failures(&self) -> impl Iterator<Item = &CalculationCheck> {
        self.checks.iter().filter(|c| !c.is_valid)
    }

    /// Every period with a decidable equation balances.
    pub fn is_balanced(&self) -> bool {
        self.balance_sheet
            .iter()
            .filter(|e| e.status != EquationStatus::Incomplete)
            .all(BalanceSheetEquation::is_balanced)
    }

    /// Fails when critical linkbase mismatches exceed `ceiling`.
    pub fn enforce(&self, ceiling: usize) -> Result<()> {
        if self.critical_errors > ceiling && self.validated > 0 {
            return Err(Error::Calculation {
                message: format!(
                    "Calculation validation failed: {} critical errors, {:.1}% accuracy",
                    self.critical_errors,
                    self.accuracy * 100.0
                ),
                critical_errors: self.critical_errors,
            });
        }
        Ok(())
    }
}

pub struct CalculationValidator {
    tolerance: Tolerance,
}

impl Default for CalculationValidator {
    fn default() -> Self {
        Self::new(Tolerance::default())
    }
}

impl CalculationValidator {
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Tolerance::from_config(config))
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Linkbase checks restricted to one statement's facts and calculations.
    pub fn validate_statement(&self, statement: &FinancialStatement) -> Vec<CalculationCheck> {
        self.check_calculations(&statement.facts, &statement.calculations)
    }

    pub fn validate_filing(&self, filing: &FilingData) -> CalculationReport {
        let checks = self.check_calculations(&filing.facts, &filing.linkbases.calculations);
        let validated = checks.len();
        let failed = checks.iter().filter(|c| !c.is_valid).count();
        let critical_errors = checks
            .iter()
            .filter(|c| c.severity == Some(Severity::Critical))
            .count();
        let accuracy = if validated == 0 {
            1.0
        } else {
            (validated - failed) as f64 / validated as f64
        };

        let balance_sheet = filing
            .balance_sheet
            .as_ref()
            .map(|s| self.balance_sheet_equation(&s.facts))
            .unwrap_or_default();

        let mut reconciliations = Vec::new();
        if let Some(income) = &filing.income_statement {
            reconciliations.extend(self.reconcile_income(&income.facts));
        }
        if let Some(cash_flow) = &filing.cash_flow {
            reconciliations.extend(self.reconcile_cash_flow(&cash_flow.facts));
        }

        if failed > 0 {
            warn!(
                "{} of {} calculation checks failed ({} critical)",
                failed, validated, critical_errors
            );
        }

        CalculationReport {
            checks,
            validated,
            failed,
            accuracy,
            critical_errors,
            balance_sheet,
            reconciliations,
        }
    }

    /// Sums weighted children per (role, parent, context); a child fact counts once.
    pub fn check_calculations(
        &self,
        facts: &[Fact],
        calculations: &[CalculationRelationship],
    ) -> Vec<CalculationCheck> {
        let mut by_concept: AHashMap<&str, Vec<&Fact>> = AHashMap::new();
        for fact in facts.iter().filter(|f| f.is_numeric()) {
            by_concept.entry(fact.concept.as_str()).or_default().push(fact);
        }

        struct Group<'a> {
            parent: &'a Fact,
            computed: f64,
            children: AHashSet<&'a str>,
        }

        let mut groups: BTreeMap<(&str, &str, &str), Group> = BTreeMap::new();
        for rel in calculations {
            let Some(parents) = by_concept.get(rel.parent.as_str()) else {
                continue;
            };
            let children = by_concept.get(rel.child.as_str());
            for &parent in parents {
                let Some(child) = children
                    .and_then(|c| c.iter().find(|f| f.context_ref == parent.context_ref))
                else {
                    continue;
                };
                let Some(child_value) = child.scaled_value() else {
                    continue;
                };
                let key = (rel.role.as_str(), rel.parent.as_str(), parent.context_ref.as_str());
                let group = groups.entry(key).or_insert_with(|| Group {
                    parent,
                    computed: 0.0,
                    children: AHashSet::new(),
                });
                if group.children.insert(child.concept.as_str()) {
                    group.computed += child_value * rel.weight;
                }
            }
        }

        groups
            .into_iter()
            .filter_map(|((role, parent_concept, context_ref), group)| {
                let reported = group.parent.scaled_value()?;
                Some(self.check(role, parent_concept, context_ref, group.parent, reported, group.computed))
            })
            .collect()
    }

    fn check(
        &self,
        role: &str,
        parent_concept: &str,
        context_ref: &str,
        parent: &Fact,
        reported: f64,
        computed: f64,
    ) -> CalculationCheck {
        let is_valid = self.tolerance.approx_eq(reported, computed);
        let relative = relative_difference(reported, computed);
        let severity = (!is_valid).then(|| {
            if relative > CRITICAL_THRESHOLD {
                Severity::Critical
            } else {
                Severity::Warning
            }
        });
        if !is_valid {
            debug!(
                "Calculation mismatch for {} in {}: reported {}, computed {}",
                parent_concept, context_ref, reported, computed
            );
        }

        CalculationCheck {
            role: role.to_string(),
            parent_concept: parent_concept.to_string(),
            period: parent.period_key(),
            context_ref: context_ref.to_string(),
            reported,
            computed,
            difference: (reported - computed).abs(),
            relative_difference: relative,
            is_valid,
            severity,
        }
    }

    /// Assets against liabilities plus equity, or the combined concept, per period.
    pub fn balance_sheet_equation(&self, facts: &[Fact]) -> Vec<BalanceSheetEquation> {
        by_period(facts, Some(PeriodType::Instant))
            .into_iter()
            .map(|(period, facts)| {
                let assets = find_value(&facts, ASSETS);
                let liabilities = find_value(&facts, LIABILITIES);
                let equity = find_value(&facts, EQUITY);
                let combined = find_value(&facts, LIABILITIES_AND_EQUITY);

                let other_side = match (liabilities, equity) {
                    (Some(l), Some(e)) => Some(l + e),
                    _ => combined,
                };
                let (difference, relative, status) = match (assets, other_side) {
                    (Some(a), Some(b)) => {
                        let status = if self.tolerance.approx_eq(a, b) {
                            EquationStatus::Balanced
                        } else {
                            EquationStatus::Unbalanced
                        };
                        let relative = (a != 0.0).then(|| (a - b).abs() / a.abs());
                        (Some((a - b).abs()), relative, status)
                    }
                    _ => (None, None, EquationStatus::Incomplete),
                };

                BalanceSheetEquation {
                    period,
                    assets,
                    liabilities,
                    equity,
                    liabilities_and_equity: other_side,
                    difference,
                    relative_difference: relative,
                    status,
                }
            })
            .collect()
    }

    /// Gross profit, operating income and net income presence per duration period.
    pub fn reconcile_income(&self, facts: &[Fact]) -> Vec<Reconciliation> {
        let mut out = Vec::new();
        for (period, facts) in by_period(facts, Some(PeriodType::Duration)) {
            let revenue = find_value(&facts, REVENUE);
            let cost = find_value(&facts, COST_OF_REVENUE);
            let gross = find_value(&facts, GROSS_PROFIT);
            let opex = find_value(&facts, OPERATING_EXPENSES);
            let operating = find_value(&facts, OPERATING_INCOME);
            let net = find_value(&facts, NET_INCOME);

            if let (Some(r), Some(c), Some(g)) = (revenue, cost, gross) {
                out.push(self.reconciliation("gross_profit", &period, g, r - c));
            }
            if let (Some(g), Some(o), Some(oi)) = (gross, opex, operating) {
                out.push(self.reconciliation("operating_income", &period, oi, g - o));
            }
            if let (Some(_), Some(n)) = (operating, net) {
                // interest and tax detail is too sparse to reconcile, presence only
                out.push(Reconciliation {
                    name: "net_income",
                    period: period.clone(),
                    reported: Some(n),
                    computed: None,
                    difference: None,
                    is_valid: true,
                });
            }
        }
        out
    }

    /// Operating + investing + financing against the reported change in cash.
    pub fn reconcile_cash_flow(&self, facts: &[Fact]) -> Vec<Reconciliation> {
        let mut out = Vec::new();
        for (period, facts) in by_period(facts, Some(PeriodType::Duration)) {
            let (Some(op), Some(inv), Some(fin)) = (
                find_value(&facts, OPERATING_CASH),
                find_value(&facts, INVESTING_CASH),
                find_value(&facts, FINANCING_CASH),
            ) else {
                continue;
            };
            let computed = op + inv + fin;
            match find_value(&facts, CASH_CHANGE) {
                Some(reported) => {
                    out.push(self.reconciliation("cash_change", &period, reported, computed))
                }
                None => out.push(Reconciliation {
                    name: "cash_change",
                    period,
                    reported: None,
                    computed: Some(computed),
                    difference: None,
                    is_valid: true,
                }),
            }
        }
        out
    }

    fn reconciliation(&self, name: &'static str, period: &str, reported: f64, computed: f64) -> Reconciliation {
        Reconciliation {
            name,
            period: period.to_string(),
            reported: Some(reported),
            computed: Some(computed),
            difference: Some((reported - computed).abs()),
            is_valid: self.tolerance.approx_eq(reported, computed),
        }
    }
}

/// Non-dimensional facts grouped by period key, in key order.
fn by_period(facts: &[Fact], period_type: Option<PeriodType>) -> BTreeMap<String, Vec<&Fact>> {
    let mut grouped: BTreeMap<String, Vec<&Fact>> = BTreeMap::new();
    for fact in facts {
        if fact.has_dimensions() || period_type.is_some_and(|t| t != fact.period_type) {
            continue;
        }
        grouped.entry(fact.period_key()).or_default().push(fact);
    }
    grouped
}

/// First candidate name (in list order) with a numeric fact.
fn find_value(facts: &[&Fact], candidates: &[&str]) -> Option<f64> {
    candidates.iter().find_map(|name| {
        facts
            .iter()
            .filter(|f| concept_matches(&f.concept, name))
            .find_map(|f| f.scaled_value())
    })
}
