//! Statement construction.
//!
//! Facts are routed to statements by keyword tables, then laid out in a
//! canonical section order per statement type. Parents are synthesized from
//! nesting levels because linkbase coverage is often partial.

use crate::context::ContextMapper;
use crate::linkbase::LabelTable;
use crate::model::{
    contains_any, local_name, CalculationRelationship, Fact, FinancialStatement, LineItem,
    PeriodType, PresentationRelationship, StatementType,
};
use ahash::{AHashMap, AHashSet};
use chrono::{Datelike, NaiveDate};

// ============================================================================
// Keyword tables
// ============================================================================

pub const INCOME_KEYWORDS: &[&str] = &[
    "revenue", "income", "expense", "cost", "profit", "loss", "earnings", "tax", "interest",
    "operating", "gross", "net",
];

pub const BALANCE_SHEET_KEYWORDS: &[&str] = &[
    "assets",
    "liabilities",
    "equity",
    "cash",
    "receivables",
    "inventory",
    "property",
    "debt",
    "payable",
    "stockholders",
];

pub const CASH_FLOW_KEYWORDS: &[&str] = &[
    "cash",
    "operating",
    "investing",
    "financing",
    "depreciation",
    "amortization",
    "receivables",
    "inventory",
    "payables",
    "capex",
    "netincome",
    "netloss",
];

pub const EQUITY_KEYWORDS: &[&str] = &["equity", "stock", "shares", "dividend", "retained"];

pub const COMPREHENSIVE_INCOME_KEYWORDS: &[&str] = &["comprehensive"];

/// Concept-name fragments that mark subtotal and total lines.
pub const TOTAL_KEYWORDS: &[&str] = &[
    "total",
    "gross",
    "net",
    "income",
    "loss",
    "comprehensive",
    "assets",
    "liabilities",
    "equity",
    "stockholders",
];

pub fn is_total_concept(concept: &str) -> bool {
    contains_any(&local_name(concept).to_lowercase(), TOTAL_KEYWORDS)
}

/// Statements whose keyword table claims the fact.
pub fn classify(fact: &Fact) -> Vec<StatementType> {
    StatementType::ALL
        .into_iter()
        .filter(|kind| builder_for(*kind).matches(fact))
        .collect()
}

// ============================================================================
// Section layout
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum Level {
    Fixed(u8),
    /// First level when the concept contains any fragment, else the second.
    IfContains(&'static [&'static str], u8, u8),
}

#[derive(Debug, Clone, Copy)]
pub enum Total {
    No,
    Yes,
    IfContains(&'static [&'static str]),
    /// Decided by [`TOTAL_KEYWORDS`].
    Auto,
}

/// One canonical block of line items, matched on the lowercased local name.
#[derive(Debug, Clone, Copy)]
pub struct Section {
    pub name: &'static str,
    pub patterns: &'static [&'static str],
    pub require_any: &'static [&'static str],
    pub exclude: &'static [&'static str],
    pub level: Level,
    pub total: Total,
    /// Claim only the best match (shortest local name).
    pub single: bool,
    /// Lower claims first; emission still follows declaration order.
    pub priority: u8,
    /// Period type of the values; `None` follows the statement.
    pub period: Option<PeriodType>,
}

impl Section {
    const fn new(name: &'static str, patterns: &'static [&'static str], priority: u8) -> Self {
        Self {
            name,
            patterns,
            require_any: &[],
            exclude: &[],
            level: Level::Fixed(0),
            total: Total::No,
            single: false,
            priority,
            period: None,
        }
    }

    const fn level(mut self, level: u8) -> Self {
        self.level = Level::Fixed(level);
        self
    }

    const fn level_if(mut self, fragments: &'static [&'static str], hit: u8, miss: u8) -> Self {
        self.level = Level::IfContains(fragments, hit, miss);
        self
    }

    const fn total(mut self) -> Self {
        self.total = Total::Yes;
        self
    }

    const fn total_if(mut self, fragments: &'static [&'static str]) -> Self {
        self.total = Total::IfContains(fragments);
        self
    }

    const fn single(mut self) -> Self {
        self.single = true;
        self
    }

    const fn require(mut self, fragments: &'static [&'static str]) -> Self {
        self.require_any = fragments;
        self
    }

    const fn exclude(mut self, fragments: &'static [&'static str]) -> Self {
        self.exclude = fragments;
        self
    }

    const fn period(mut self, period: PeriodType) -> Self {
        self.period = Some(period);
        self
    }

    fn period_in(&self, statement: PeriodType) -> PeriodType {
        self.period.unwrap_or(statement)
    }

    pub fn matches(&self, concept: &str) -> bool {
        let name = local_name(concept).to_lowercase();
        contains_any(&name, self.patterns)
            && (self.require_any.is_empty() || contains_any(&name, self.require_any))
            && !contains_any(&name, self.exclude)
    }

    fn level_for(&self, concept: &str) -> u8 {
        match self.level {
            Level::Fixed(level) => level,
            Level::IfContains(fragments, hit, miss) => {
                if contains_any(&local_name(concept).to_lowercase(), fragments) {
                    hit
                } else {
                    miss
                }
            }
        }
    }

    fn is_total(&self, concept: &str) -> bool {
        match self.total {
            Total::No => false,
            Total::Yes => true,
            Total::IfContains(fragments) => {
                contains_any(&local_name(concept).to_lowercase(), fragments)
            }
            Total::Auto => is_total_concept(concept),
        }
    }
}

/// Sections sharing an optional header row.
#[derive(Debug, Clone, Copy)]
pub struct Group {
    pub header: Option<(&'static str, &'static str)>,
    pub sections: &'static [Section],
}

const INCOME_LAYOUT: &[Group] = &[Group {
    header: None,
    sections: &[
        Section::new("revenue", &["revenue", "sales"], 8),
        Section::new("cost_of_revenue", &["cost", "cogs"], 7).exclude(&["costsandexpenses"]),
        Section::new("gross_profit", &["grossprofit"], 0).total(),
        Section::new("operating_expenses", &["expense", "operating"], 9)
            .exclude(&["interest", "activities"])
            .level(1),
        Section::new("operating_income", &["operatingincome"], 1).total(),
        Section::new("interest", &["interest"], 6)
            .exclude(&["paid", "activities"])
            .level(1),
        Section::new(
            "pretax_income",
            &["incomebeforetax", "beforeincometax", "pretax"],
            2,
        )
        .total(),
        Section::new("income_tax", &["tax"], 5)
            .require(&["expense", "benefit"])
            .level(1),
        Section::new("net_income", &["netincome", "netloss"], 3).total(),
        Section::new("earnings_per_share", &["earningspershare"], 4).level(1),
    ],
}];

const CURRENT: &[&str] = &["current"];
const TOTAL_OR_STOCKHOLDERS: &[&str] = &["total", "stockholders"];

const BALANCE_SHEET_LAYOUT: &[Group] = &[
    Group {
        header: Some(("ASSETS_HEADER", "ASSETS")),
        sections: &[
            Section::new(
                "current_assets",
                &["assetscurrent", "currentassets", "cash", "receivable", "inventor", "prepaid"],
                2,
            )
            .level_if(CURRENT, 1, 2),
            Section::new(
                "noncurrent_assets",
                &["property", "equipment", "intangible", "goodwill"],
                3,
            )
            .level(1),
            Section::new("total_assets", &["assets"], 0)
                .exclude(CURRENT)
                .total()
                .single(),
        ],
    },
    Group {
        header: Some(("LIABILITIES_HEADER", "LIABILITIES AND STOCKHOLDERS' EQUITY")),
        sections: &[
            Section::new(
                "current_liabilities",
                &["liabilitiescurrent", "currentliabilities", "payable", "accrued"],
                4,
            )
            .level_if(CURRENT, 1, 2),
            Section::new("noncurrent_liabilities", &["longtermdebt", "noncurrent"], 5)
                .require(&["liabilit", "debt"])
                .level(1),
            Section::new("total_liabilities", &["liabilities"], 1)
                .exclude(&["current", "equity"])
                .total()
                .single(),
            Section::new(
                "equity",
                &["stockholdersequity", "equity", "retainedearnings", "commonstock"],
                6,
            )
            .level_if(TOTAL_OR_STOCKHOLDERS, 0, 1)
            .total_if(TOTAL_OR_STOCKHOLDERS),
        ],
    },
];

const CASH_FLOW_LAYOUT: &[Group] = &[
    Group {
        header: Some(("OPERATING_HEADER", "OPERATING ACTIVITIES")),
        sections: &[
            Section::new("net_income", &["netincome", "netloss", "profitloss"], 4)
                .level(1)
                .single(),
            Section::new("noncash_adjustments", &["depreciation", "amortization"], 5).level(1),
            Section::new(
                "working_capital",
                &["receivable", "inventor", "payable", "accrued"],
                6,
            )
            .require(&["change", "increase", "decrease"])
            .level(1),
            Section::new("net_operating", &["operatingactivities"], 0)
                .total()
                .single(),
        ],
    },
    Group {
        header: Some(("INVESTING_HEADER", "INVESTING ACTIVITIES")),
        sections: &[
            Section::new(
                "investing_items",
                &[
                    "capitalexpenditure",
                    "paymentstoacquire",
                    "investment",
                    "acquisition",
                    "disposal",
                    "proceedsfromsale",
                ],
                7,
            )
            .level(1),
            Section::new("net_investing", &["investingactivities"], 1)
                .total()
                .single(),
        ],
    },
    Group {
        header: Some(("FINANCING_HEADER", "FINANCING ACTIVITIES")),
        sections: &[
            Section::new(
                "financing_items",
                &["debt", "borrowing", "repayment", "dividend", "stock"],
                8,
            )
            .require(&["proceeds", "repayment", "issuance", "payment"])
            .level(1),
            Section::new("net_financing", &["financingactivities"], 2)
                .total()
                .single(),
        ],
    },
    Group {
        header: None,
        sections: &[
            Section::new(
                "net_change_in_cash",
                &["periodincreasedecrease", "netchangeincash", "cashchange"],
                3,
            )
            .require(&["cash"])
            .total()
            .single(),
            Section::new(
                "cash_balances",
                &["cashandcashequivalents", "cashcashequivalents"],
                9,
            )
            .period(PeriodType::Instant)
            .level(1),
        ],
    },
];

// ============================================================================
// Builders
// ============================================================================

/// Everything a builder reads; all borrowed from the filing being assembled.
pub struct StatementInputs<'a> {
    pub company_name: &'a str,
    pub period_end: Option<NaiveDate>,
    pub facts: &'a [Fact],
    pub contexts: &'a ContextMapper<'a>,
    pub calculations: &'a [CalculationRelationship],
    pub presentations: &'a [PresentationRelationship],
    pub labels: &'a LabelTable,
}

impl StatementInputs<'_> {
    fn fiscal_year(&self) -> Option<i32> {
        self.period_end.map(|d| d.year())
    }

    /// Canonical-context value for the filing year, only in `period`.
    fn value_of(&self, concept: &str, period: PeriodType) -> Option<f64> {
        let year = self.fiscal_year()?;
        self.contexts.value_for_year(concept, year, period)
    }

    fn label_of(&self, concept: &str, fact: &Fact, total: bool) -> String {
        let role = if total { "totalLabel" } else { "standard" };
        self.labels
            .resolve(concept, role)
            .map(str::to_string)
            .unwrap_or_else(|| fact.label.clone())
    }
}

pub trait StatementBuilder: Sync {
    fn statement_type(&self) -> StatementType;

    fn keywords(&self) -> &'static [&'static str];

    fn layout(&self) -> &'static [Group] {
        &[]
    }

    /// Keyword match on the concept name or its label.
    fn matches(&self, fact: &Fact) -> bool {
        let keywords = self.keywords();
        contains_any(&fact.concept.to_lowercase(), keywords)
            || contains_any(&fact.label.to_lowercase(), keywords)
    }

    fn line_items(&self, inputs: &StatementInputs<'_>, facts: &[Fact]) -> Vec<LineItem> {
        layout_sections(self.layout(), self.statement_type(), inputs, facts)
    }

    fn build(&self, inputs: &StatementInputs<'_>) -> FinancialStatement {
        let kind = self.statement_type();
        let facts: Vec<Fact> = inputs
            .facts
            .iter()
            .filter(|f| self.matches(f))
            .cloned()
            .collect();

        let concepts: AHashSet<&str> = facts.iter().map(|f| f.concept.as_str()).collect();
        let calculations = inputs
            .calculations
            .iter()
            .filter(|r| concepts.contains(r.parent.as_str()))
            .cloned()
            .collect();

        let line_items = link_parents(self.line_items(inputs, &facts));
        let presentation = synthesize_presentation(&line_items, kind);

        FinancialStatement {
            statement_type: kind,
            company_name: inputs.company_name.to_string(),
            period_end: inputs.period_end,
            facts,
            calculations,
            presentation,
            line_items,
        }
    }
}

pub struct IncomeStatementBuilder;
pub struct BalanceSheetBuilder;
pub struct CashFlowStatementBuilder;

/// Keyword-routed statement ordered by the presentation linkbase when it
/// covers the statement, otherwise flat in fact order.
pub struct KeywordStatementBuilder {
    kind: StatementType,
    keywords: &'static [&'static str],
    /// Period types tried in order for each concept.
    periods: &'static [PeriodType],
}

impl StatementBuilder for IncomeStatementBuilder {
    fn statement_type(&self) -> StatementType {
        StatementType::IncomeStatement
    }

    fn keywords(&self) -> &'static [&'static str] {
        INCOME_KEYWORDS
    }

    fn layout(&self) -> &'static [Group] {
        INCOME_LAYOUT
    }
}

impl StatementBuilder for BalanceSheetBuilder {
    fn statement_type(&self) -> StatementType {
        StatementType::BalanceSheet
    }

    fn keywords(&self) -> &'static [&'static str] {
        BALANCE_SHEET_KEYWORDS
    }

    fn layout(&self) -> &'static [Group] {
        BALANCE_SHEET_LAYOUT
    }
}

impl StatementBuilder for CashFlowStatementBuilder {
    fn statement_type(&self) -> StatementType {
        StatementType::CashFlow
    }

    fn keywords(&self) -> &'static [&'static str] {
        CASH_FLOW_KEYWORDS
    }

    fn layout(&self) -> &'static [Group] {
        CASH_FLOW_LAYOUT
    }
}

impl StatementBuilder for KeywordStatementBuilder {
    fn statement_type(&self) -> StatementType {
        self.kind
    }

    fn keywords(&self) -> &'static [&'static str] {
        self.keywords
    }

    fn line_items(&self, inputs: &StatementInputs<'_>, facts: &[Fact]) -> Vec<LineItem> {
        let candidates = collect_candidates(inputs, facts, self.periods);
        let ordered = presentation_order(inputs.presentations, &candidates);

        ordered
            .into_iter()
            .enumerate()
            .map(|(order, (candidate, level))| {
                let total = is_total_concept(&candidate.concept);
                LineItem {
                    label: inputs.label_of(&candidate.concept, candidate.fact, total),
                    concept: candidate.concept.clone(),
                    value: Some(candidate.value),
                    level,
                    is_total: total,
                    is_header: false,
                    parent: None,
                    order,
                }
            })
            .collect()
    }
}

static INCOME_BUILDER: IncomeStatementBuilder = IncomeStatementBuilder;
static BALANCE_SHEET_BUILDER: BalanceSheetBuilder = BalanceSheetBuilder;
static CASH_FLOW_BUILDER: CashFlowStatementBuilder = CashFlowStatementBuilder;
static EQUITY_BUILDER: KeywordStatementBuilder = KeywordStatementBuilder {
    kind: StatementType::Equity,
    keywords: EQUITY_KEYWORDS,
    periods: &[PeriodType::Duration, PeriodType::Instant],
};
static COMPREHENSIVE_INCOME_BUILDER: KeywordStatementBuilder = KeywordStatementBuilder {
    kind: StatementType::ComprehensiveIncome,
    keywords: COMPREHENSIVE_INCOME_KEYWORDS,
    periods: &[PeriodType::Duration],
};

/// Dispatch table from statement type to its builder.
pub fn builder_for(kind: StatementType) -> &'static dyn StatementBuilder {
    match kind {
        StatementType::IncomeStatement => &INCOME_BUILDER,
        StatementType::BalanceSheet => &BALANCE_SHEET_BUILDER,
        StatementType::CashFlow => &CASH_FLOW_BUILDER,
        StatementType::Equity => &EQUITY_BUILDER,
        StatementType::ComprehensiveIncome => &COMPREHENSIVE_INCOME_BUILDER,
    }
}

// ============================================================================
// Layout helpers
// ============================================================================

struct Candidate<'f> {
    concept: String,
    fact: &'f Fact,
    value: f64,
    period: PeriodType,
}

/// Distinct concepts in fact order that resolve to a value for the filing
/// year in one of `periods`, first hit wins.
fn collect_candidates<'f>(
    inputs: &StatementInputs<'_>,
    facts: &'f [Fact],
    periods: &[PeriodType],
) -> Vec<Candidate<'f>> {
    let mut seen = AHashSet::new();
    let mut out = Vec::new();
    for fact in facts {
        if !fact.is_numeric() || !seen.insert(fact.concept.as_str()) {
            continue;
        }
        let found = periods
            .iter()
            .find_map(|&period| inputs.value_of(&fact.concept, period).map(|v| (period, v)));
        if let Some((period, value)) = found {
            out.push(Candidate {
                concept: fact.concept.clone(),
                fact,
                value,
                period,
            });
        }
    }
    out
}

fn layout_sections(
    groups: &[Group],
    kind: StatementType,
    inputs: &StatementInputs<'_>,
    facts: &[Fact],
) -> Vec<LineItem> {
    let orientation = kind.orientation();
    let sections: Vec<&Section> = groups.iter().flat_map(|g| g.sections.iter()).collect();

    // Each section only sees values of its own period type
    let mut periods = vec![orientation];
    for section in &sections {
        let period = section.period_in(orientation);
        if !periods.contains(&period) {
            periods.push(period);
        }
    }
    let candidates: Vec<Candidate<'_>> = periods
        .iter()
        .flat_map(|&period| collect_candidates(inputs, facts, &[period]))
        .collect();

    let mut by_priority: Vec<usize> = (0..sections.len()).collect();
    by_priority.sort_by_key(|&i| sections[i].priority);

    let mut claimed = vec![false; candidates.len()];
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); sections.len()];
    for &s in &by_priority {
        let section = sections[s];
        let matching = (0..candidates.len())
            .filter(|&c| {
                !claimed[c]
                    && candidates[c].period == section.period_in(orientation)
                    && section.matches(&candidates[c].concept)
            });
        let chosen: Vec<usize> = if section.single {
            matching
                .min_by_key(|&c| local_name(&candidates[c].concept).len())
                .into_iter()
                .collect()
        } else {
            matching.collect()
        };
        for &c in &chosen {
            claimed[c] = true;
        }
        members[s] = chosen;
    }

    let mut items = Vec::new();
    let mut index = 0;
    for group in groups {
        let group_sections = index..index + group.sections.len();
        index += group.sections.len();

        let has_items = group_sections.clone().any(|s| !members[s].is_empty());
        if !has_items {
            continue;
        }
        if let Some((concept, label)) = group.header {
            items.push(LineItem {
                concept: concept.to_string(),
                label: label.to_string(),
                value: None,
                level: 0,
                is_total: false,
                is_header: true,
                parent: None,
                order: items.len(),
            });
        }
        for s in group_sections {
            let section = sections[s];
            for &c in &members[s] {
                let candidate = &candidates[c];
                let total = section.is_total(&candidate.concept);
                items.push(LineItem {
                    concept: candidate.concept.clone(),
                    label: inputs.label_of(&candidate.concept, candidate.fact, total),
                    value: Some(candidate.value),
                    level: section.level_for(&candidate.concept),
                    is_total: total,
                    is_header: false,
                    parent: None,
                    order: items.len(),
                });
            }
        }
    }
    items
}

/// Depth-first walk of the presentation forest over the candidates; concepts
/// the linkbase does not cover follow at level 0 in fact order.
fn presentation_order<'c, 'f>(
    presentations: &[PresentationRelationship],
    candidates: &'c [Candidate<'f>],
) -> Vec<(&'c Candidate<'f>, u8)> {
    let by_concept: AHashMap<&str, &Candidate<'f>> = candidates
        .iter()
        .map(|c| (c.concept.as_str(), c))
        .collect();

    let mut children: AHashMap<&str, Vec<&PresentationRelationship>> = AHashMap::new();
    let mut is_child = AHashSet::new();
    for rel in presentations {
        children.entry(rel.parent.as_str()).or_default().push(rel);
        is_child.insert(rel.child.as_str());
    }
    for list in children.values_mut() {
        list.sort_by(|a, b| a.order.total_cmp(&b.order));
    }

    let mut roots: Vec<&str> = Vec::new();
    for rel in presentations {
        let parent = rel.parent.as_str();
        if !is_child.contains(parent) && !roots.contains(&parent) {
            roots.push(parent);
        }
    }

    let mut ordered = Vec::new();
    let mut visited = AHashSet::new();
    let mut stack: Vec<(&str, u8)> = roots.into_iter().rev().map(|r| (r, 0)).collect();
    while let Some((concept, depth)) = stack.pop() {
        if !visited.insert(concept) {
            continue;
        }
        let next_depth = match by_concept.get(concept) {
            Some(candidate) => {
                ordered.push((*candidate, depth));
                depth.saturating_add(1)
            }
            None => depth,
        };
        if let Some(kids) = children.get(concept) {
            for rel in kids.iter().rev() {
                stack.push((rel.child.as_str(), next_depth));
            }
        }
    }

    for candidate in candidates {
        if !visited.contains(candidate.concept.as_str()) {
            ordered.push((candidate, 0));
        }
    }
    ordered
}

/// Parent is the nearest preceding item with a strictly lower level.
pub fn link_parents(mut items: Vec<LineItem>) -> Vec<LineItem> {
    for i in 0..items.len() {
        let level = items[i].level;
        let parent = items[..i]
            .iter()
            .rev()
            .find(|candidate| candidate.level < level)
            .map(|p| p.concept.clone());
        items[i].parent = parent;
    }
    items
}

/// Presentation records for the laid-out items; header rows are never parents.
pub fn synthesize_presentation(items: &[LineItem], kind: StatementType) -> Vec<PresentationRelationship> {
    let headers: AHashSet<&str> = items
        .iter()
        .filter(|i| i.is_header)
        .map(|i| i.concept.as_str())
        .collect();

    items
        .iter()
        .filter_map(|item| {
            let parent = item.parent.as_deref()?;
            if headers.contains(parent) {
                return None;
            }
            Some(PresentationRelationship {
                parent: parent.to_string(),
                child: item.concept.clone(),
                order: item.order as f64,
                preferred_label: None,
                role: kind.name().to_string(),
            })
        })
        .collect()
}
