//! Canonical context resolution.
//!
//! A filing reports the same concept under many contexts: the current year,
//! comparative years, quarters and dimensional breakdowns. [`ContextMapper`]
//! scores every context and picks one canonical context per fiscal year and
//! orientation, so "value of X for year Y" has exactly one answer.

use crate::model::{Fact, PeriodType};
use ahash::AHashMap;
use chrono::NaiveDate;
use compact_str::CompactString;
use serde::Serialize;
use std::collections::BTreeMap;

pub const SAMPLE_CONCEPTS: usize = 5;
pub const DURATION_KEYWORDS: &[&str] = &["revenue", "sales", "income"];
pub const INSTANT_KEYWORDS: &[&str] = &["asset", "liabilit", "equity", "cash", "debt"];
const KEYWORD_WEIGHT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextInfo {
    pub id: CompactString,
    pub period_type: PeriodType,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub fiscal_year: Option<i32>,
    pub fact_count: usize,
    pub sample_concepts: Vec<String>,
    pub has_dimensions: bool,
}

impl ContextInfo {
    /// `10 × keyword hits among the samples + fact count`.
    pub fn score(&self) -> usize {
        let keywords = match self.period_type {
            PeriodType::Duration => DURATION_KEYWORDS,
            PeriodType::Instant => INSTANT_KEYWORDS,
        };
        let hits = self
            .sample_concepts
            .iter()
            .filter(|c| {
                let lower = c.to_lowercase();
                keywords.iter().any(|k| lower.contains(k))
            })
            .count();
        KEYWORD_WEIGHT * hits + self.fact_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalContext {
    pub context_id: CompactString,
    pub score: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiscalYearSummary {
    pub fiscal_year: i32,
    pub contexts: usize,
    pub duration: Option<CanonicalContext>,
    pub instant: Option<CanonicalContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    pub total_contexts: usize,
    pub total_facts: usize,
    pub dimensional_contexts: usize,
    pub fiscal_years: Vec<FiscalYearSummary>,
}

pub struct ContextMapper<'a> {
    facts: &'a [Fact],
    /// Context ids in first-appearance order.
    order: Vec<CompactString>,
    infos: AHashMap<CompactString, ContextInfo>,
    members: AHashMap<CompactString, Vec<usize>>,
    canonical: BTreeMap<(i32, PeriodType), CanonicalContext>,
}

impl<'a> ContextMapper<'a> {
    pub fn new(facts: &'a [Fact]) -> Self {
        let mut order = Vec::new();
        let mut infos: AHashMap<CompactString, ContextInfo> = AHashMap::new();
        let mut members: AHashMap<CompactString, Vec<usize>> = AHashMap::new();

        for (index, fact) in facts.iter().enumerate() {
            let info = infos.entry(fact.context_ref.clone()).or_insert_with(|| {
                order.push(fact.context_ref.clone());
                ContextInfo {
                    id: fact.context_ref.clone(),
                    period_type: fact.period_type,
                    period_start: fact.period_start,
                    period_end: fact.period_end,
                    fiscal_year: fact.fiscal_year(),
                    fact_count: 0,
                    sample_concepts: Vec::new(),
                    has_dimensions: fact.has_dimensions(),
                }
            });
            info.fact_count += 1;
            if info.sample_concepts.len() < SAMPLE_CONCEPTS
                && !info.sample_concepts.contains(&fact.concept)
            {
                info.sample_concepts.push(fact.concept.clone());
            }
            members
                .entry(fact.context_ref.clone())
                .or_default()
                .push(index);
        }

        // Strict comparison keeps the earliest context on ties
        let mut canonical: BTreeMap<(i32, PeriodType), CanonicalContext> = BTreeMap::new();
        for id in &order {
            let info = &infos[id];
            let Some(year) = info.fiscal_year else {
                continue;
            };
            let score = info.score();
            let key = (year, info.period_type);
            let better = canonical.get(&key).map_or(true, |best| score > best.score);
            if better {
                canonical.insert(
                    key,
                    CanonicalContext {
                        context_id: id.clone(),
                        score,
                    },
                );
            }
        }

        Self {
            facts,
            order,
            infos,
            members,
            canonical,
        }
    }

    pub fn canonical_context(&self, fiscal_year: i32, orientation: PeriodType) -> Option<&str> {
        self.canonical
            .get(&(fiscal_year, orientation))
            .map(|c| c.context_id.as_str())
    }

    pub fn facts_in_context(&self, context_id: &str) -> Vec<&'a Fact> {
        let facts = self.facts;
        self.members
            .get(context_id)
            .map(|indices| indices.iter().map(|&i| &facts[i]).collect())
            .unwrap_or_default()
    }

    /// Scaled value of `concept` in the canonical context for the year.
    pub fn value_for_year(&self, concept: &str, fiscal_year: i32, orientation: PeriodType) -> Option<f64> {
        self.fact_for_year(concept, fiscal_year, orientation)
            .and_then(Fact::scaled_value)
    }

    pub fn fact_for_year(&self, concept: &str, fiscal_year: i32, orientation: PeriodType) -> Option<&'a Fact> {
        let context = self.canonical_context(fiscal_year, orientation)?;
        self.facts_in_context(context)
            .into_iter()
            .find(|f| f.is_numeric() && f.matches_concept(concept))
    }

    /// Preferred orientation first, then the other one, never another year.
    pub fn value_for_year_or_fallback(
        &self,
        concept: &str,
        fiscal_year: i32,
        preferred: PeriodType,
    ) -> Option<f64> {
        self.value_for_year(concept, fiscal_year, preferred)
            .or_else(|| self.value_for_year(concept, fiscal_year, preferred.other()))
    }

    /// Detaches the canonical selection from the borrowed facts.
    pub fn canonical_index(&self) -> CanonicalIndex {
        let contexts = self
            .canonical
            .iter()
            .map(|(key, c)| {
                let indices = self.members.get(&c.context_id).cloned().unwrap_or_default();
                (*key, indices)
            })
            .collect();
        CanonicalIndex { contexts }
    }

    pub fn context_info(&self, context_id: &str) -> Option<&ContextInfo> {
        self.infos.get(context_id)
    }

    pub fn contexts(&self) -> impl Iterator<Item = &ContextInfo> {
        self.order.iter().filter_map(move |id| self.infos.get(id))
    }

    pub fn fiscal_years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.canonical.keys().map(|(year, _)| *year).collect();
        years.dedup();
        years
    }

    pub fn summary(&self) -> ContextSummary {
        let fiscal_years = self
            .fiscal_years()
            .into_iter()
            .map(|year| FiscalYearSummary {
                fiscal_year: year,
                contexts: self
                    .contexts()
                    .filter(|c| c.fiscal_year == Some(year))
                    .count(),
                duration: self.canonical.get(&(year, PeriodType::Duration)).cloned(),
                instant: self.canonical.get(&(year, PeriodType::Instant)).cloned(),
            })
            .collect();

        ContextSummary {
            total_contexts: self.order.len(),
            total_facts: self.facts.len(),
            dimensional_contexts: self.contexts().filter(|c| c.has_dimensions).count(),
            fiscal_years,
        }
    }
}

/// Fact indices of every canonical context, keyed by (fiscal year,
/// orientation). Lookups against the same fact slice agree with
/// [`ContextMapper::value_for_year`] without rebuilding the mapper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalIndex {
    contexts: AHashMap<(i32, PeriodType), Vec<usize>>,
}

impl CanonicalIndex {
    pub fn fact_for_year<'f>(
        &self,
        facts: &'f [Fact],
        concept: &str,
        fiscal_year: i32,
        orientation: PeriodType,
    ) -> Option<&'f Fact> {
        self.contexts
            .get(&(fiscal_year, orientation))?
            .iter()
            .filter_map(|&i| facts.get(i))
            .find(|f| f.is_numeric() && f.matches_concept(concept))
    }

    pub fn value_for_year(
        &self,
        facts: &[Fact],
        concept: &str,
        fiscal_year: i32,
        orientation: PeriodType,
    ) -> Option<f64> {
        self.fact_for_year(facts, concept, fiscal_year, orientation)
            .and_then(Fact::scaled_value)
    }
}

// ============================================================================
// Filtering
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextFilter {
    pub fiscal_year: Option<i32>,
    pub period_type: Option<PeriodType>,
    pub period_end: Option<NaiveDate>,
    pub exclude_dimensions: bool,
}

impl ContextFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fiscal_year(mut self, year: i32) -> Self {
        self.fiscal_year = Some(year);
        self
    }

    pub fn period_type(mut self, period_type: PeriodType) -> Self {
        self.period_type = Some(period_type);
        self
    }

    pub fn period_end(mut self, date: NaiveDate) -> Self {
        self.period_end = Some(date);
        self
    }

    pub fn without_dimensions(mut self) -> Self {
        self.exclude_dimensions = true;
        self
    }

    pub fn matches(&self, fact: &Fact) -> bool {
        if self.exclude_dimensions && fact.has_dimensions() {
            return false;
        }
        if let Some(pt) = self.period_type {
            if fact.period_type != pt {
                return false;
            }
        }
        if let Some(year) = self.fiscal_year {
            if fact.fiscal_year() != Some(year) {
                return false;
            }
        }
        if let Some(end) = self.period_end {
            if fact.period_end != Some(end) {
                return false;
            }
        }
        true
    }
}

pub fn filter_facts<'a>(facts: &'a [Fact], filter: &ContextFilter) -> Vec<&'a Fact> {
    facts.iter().filter(|f| filter.matches(f)).collect()
}

/// Most recent non-dimensional numeric fact for `concept` passing the filter.
pub fn best_fact<'a>(facts: &'a [Fact], concept: &str, filter: &ContextFilter) -> Option<&'a Fact> {
    facts
        .iter()
        .filter(|f| f.is_numeric() && !f.has_dimensions())
        .filter(|f| f.matches_concept(concept) && filter.matches(f))
        .fold(None, |best: Option<&Fact>, f| match best {
            Some(b) if b.period_end >= f.period_end => Some(b),
            _ => Some(f),
        })
}

/// Reasons a fact cannot stand in for an annual revenue figure.
pub fn annual_duration_issues(fact: &Fact) -> Vec<String> {
    let mut issues = Vec::new();
    if fact.period_type != PeriodType::Duration {
        issues.push(format!("{} is reported for an instant, not a duration", fact.concept));
    }
    if let (Some(start), Some(end)) = (fact.period_start, fact.period_end) {
        let days = (end - start).num_days();
        if !(350..=380).contains(&days) {
            issues.push(format!("{} covers {} days, not a fiscal year", fact.concept, days));
        }
    }
    if fact.has_dimensions() {
        issues.push(format!(
            "{} is dimensional ({} axes)",
            fact.concept,
            fact.dimensions.len()
        ));
    }
    issues
}
