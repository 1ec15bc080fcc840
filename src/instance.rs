// Instance document parsing: contexts, units, then facts
use crate::model::{
    CompanyInfo, Context, Decimals, Entity, Fact, Member, Period, Unit, UnitMeasure,
};
use crate::xml::{self, Element, LINK_NS, XBRLDI_NS, XBRLI_NS, XLINK_NS, XSI_NS};
use crate::{Error, Result};
use ahash::AHashMap;
use chrono::NaiveDate;
use compact_str::CompactString;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::Path;

/// Namespaces whose elements are never facts.
const INFRASTRUCTURE_NAMESPACES: &[&str] = &[XBRLI_NS, LINK_NS, XLINK_NS, XBRLDI_NS, XSI_NS];

#[derive(Debug, Clone, Default)]
pub struct InstanceDocument {
    pub contexts: Vec<Context>,
    pub units: Vec<Unit>,
    pub facts: Vec<Fact>,
    pub company: CompanyInfo,
    /// Facts dropped because their context could not be resolved.
    pub dropped_facts: usize,
    /// Empty or nil facts.
    pub skipped_facts: usize,
}

impl InstanceDocument {
    pub fn context(&self, id: &str) -> Option<&Context> {
        self.contexts.iter().find(|c| c.id == id)
    }

    pub fn unit(&self, id: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == id)
    }
}

pub struct InstanceParser {
    max_file_size: u64,
}

impl Default for InstanceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceParser {
    pub fn new() -> Self {
        Self {
            max_file_size: crate::config::DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<InstanceDocument> {
        let path = path.as_ref();
        let root = xml::read_document(path, self.max_file_size)?;
        self.parse_element(&root, &path.display().to_string())
    }

    pub fn parse_str(&self, content: &str) -> Result<InstanceDocument> {
        let root = xml::parse_str(content, "<instance>")?;
        self.parse_element(&root, "<instance>")
    }

    pub fn parse_element(&self, root: &Element, source: &str) -> Result<InstanceDocument> {
        if !root.is(XBRLI_NS, "xbrl") {
            return Err(Error::parsing(
                source,
                format!("root element <{}> is not xbrli:xbrl", root.qualified_name()),
            ));
        }

        let mut doc = InstanceDocument::default();

        // Pass 1: contexts
        for node in root.children_named(XBRLI_NS, "context") {
            if let Some(context) = parse_context(node) {
                doc.contexts.push(context);
            }
        }

        // Pass 2: units
        for node in root.children_named(XBRLI_NS, "unit") {
            if let Some(unit) = parse_unit(node) {
                doc.units.push(unit);
            }
        }

        // Pass 3: facts
        let contexts: AHashMap<&str, &Context> =
            doc.contexts.iter().map(|c| (c.id.as_str(), c)).collect();
        let units: AHashMap<&str, &Unit> = doc.units.iter().map(|u| (u.id.as_str(), u)).collect();

        let mut extractor = FactExtractor {
            root,
            contexts: &contexts,
            units: &units,
            facts: Vec::new(),
            dropped: 0,
            skipped: 0,
        };
        for child in &root.children {
            extractor.visit(child);
        }
        let (facts, dropped, skipped) = (extractor.facts, extractor.dropped, extractor.skipped);

        doc.facts = facts;
        doc.dropped_facts = dropped;
        doc.skipped_facts = skipped;
        doc.company = extract_company_info(&doc.facts, &doc.contexts);

        info!(
            "Parsed instance {}: {} contexts, {} units, {} facts ({} dropped, {} empty)",
            source,
            doc.contexts.len(),
            doc.units.len(),
            doc.facts.len(),
            doc.dropped_facts,
            doc.skipped_facts
        );
        Ok(doc)
    }
}

struct FactExtractor<'a> {
    root: &'a Element,
    contexts: &'a AHashMap<&'a str, &'a Context>,
    units: &'a AHashMap<&'a str, &'a Unit>,
    facts: Vec<Fact>,
    dropped: usize,
    skipped: usize,
}

impl FactExtractor<'_> {
    fn visit(&mut self, node: &Element) {
        let infrastructure = node
            .namespace
            .as_deref()
            .map_or(false, |ns| INFRASTRUCTURE_NAMESPACES.contains(&ns));
        if infrastructure {
            return;
        }

        let Some(context_ref) = node.attr("contextRef") else {
            // Tuples group facts without carrying a context themselves
            for child in &node.children {
                self.visit(child);
            }
            return;
        };

        if node.attr_ns(XSI_NS, "nil") == Some("true") {
            self.skipped += 1;
            return;
        }
        let raw = node.deep_text();
        if raw.is_empty() {
            self.skipped += 1;
            return;
        }

        let concept = self.concept_name(node);
        let Some(context) = self.contexts.get(context_ref.trim()) else {
            warn!("Dropping fact {}: unknown contextRef {}", concept, context_ref);
            self.dropped += 1;
            return;
        };

        let mut fact = Fact::new(concept, &raw, context_ref.trim()).with_period(&context.period);
        fact.decimals = node.attr("decimals").and_then(Decimals::parse);
        fact.id = node.attr("id").map(str::to_string);
        fact.dimensions = context
            .dimensions
            .iter()
            .map(|(axis, member)| (axis.clone(), member.value().to_string()))
            .collect();

        if let Some(unit_ref) = node.attr("unitRef").map(str::trim) {
            fact.unit_ref = Some(CompactString::new(unit_ref));
            match self.units.get(unit_ref) {
                Some(unit) => fact.unit = Some(unit.display()),
                None => debug!("Fact {} references unknown unit {}", fact.concept, unit_ref),
            }
        }

        self.facts.push(fact);
    }

    fn concept_name(&self, node: &Element) -> String {
        if node.prefix.is_some() {
            return node.qualified_name();
        }
        // Default-namespace facts borrow whatever prefix the root binds
        match node.namespace.as_deref().and_then(|ns| self.root.prefix_for(ns)) {
            Some(prefix) => format!("{}:{}", prefix, node.local),
            None => node.local.clone(),
        }
    }
}

fn parse_context(node: &Element) -> Option<Context> {
    let Some(id) = node.attr("id") else {
        warn!("Skipping context without id");
        return None;
    };

    let entity_node = node.child(XBRLI_NS, "entity");
    let entity = entity_node
        .and_then(|e| e.child(XBRLI_NS, "identifier"))
        .map(|ident| Entity {
            identifier: ident.text().to_string(),
            scheme: ident.attr("scheme").unwrap_or_default().to_string(),
        })
        .unwrap_or(Entity {
            identifier: String::new(),
            scheme: String::new(),
        });

    let Some(period) = node.child(XBRLI_NS, "period").and_then(parse_period) else {
        warn!("Skipping context {}: missing or invalid period", id);
        return None;
    };

    let mut dimensions = BTreeMap::new();
    let segment = entity_node.and_then(|e| e.child(XBRLI_NS, "segment"));
    let scenario = node.child(XBRLI_NS, "scenario");
    for container in segment.into_iter().chain(scenario) {
        for member in &container.children {
            let Some(dimension) = member.attr("dimension") else {
                continue;
            };
            if member.is(XBRLDI_NS, "explicitMember") {
                dimensions.insert(dimension.to_string(), Member::Explicit(member.text().to_string()));
            } else if member.is(XBRLDI_NS, "typedMember") {
                dimensions.insert(dimension.to_string(), Member::Typed(member.deep_text()));
            }
        }
    }

    Some(Context {
        id: CompactString::new(id),
        entity,
        period,
        dimensions,
    })
}

fn parse_period(node: &Element) -> Option<Period> {
    if let Some(instant) = node.child(XBRLI_NS, "instant") {
        return parse_date(instant.text()).map(|date| Period::Instant { date });
    }
    if node.child(XBRLI_NS, "forever").is_some() {
        return Some(Period::Forever);
    }
    let start = parse_date(node.child(XBRLI_NS, "startDate")?.text())?;
    let end = parse_date(node.child(XBRLI_NS, "endDate")?.text())?;
    Some(Period::Duration { start, end })
}

/// Accepts `YYYY-MM-DD` and date-time forms.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn parse_unit(node: &Element) -> Option<Unit> {
    let id = node.attr("id")?;
    let measures = |parent: &Element| -> String {
        parent
            .children_named(XBRLI_NS, "measure")
            .map(|m| m.text().to_string())
            .collect::<Vec<_>>()
            .join("*")
    };

    let measure = match node.child(XBRLI_NS, "divide") {
        Some(divide) => UnitMeasure::Divide {
            numerator: measures(divide.child(XBRLI_NS, "unitNumerator")?),
            denominator: measures(divide.child(XBRLI_NS, "unitDenominator")?),
        },
        None => UnitMeasure::Simple {
            measure: measures(node),
        },
    };

    Some(Unit {
        id: CompactString::new(id),
        measure,
    })
}

fn extract_company_info(facts: &[Fact], contexts: &[Context]) -> CompanyInfo {
    let mut info = CompanyInfo::default();
    let mut cik_found = false;

    for fact in facts {
        let value = fact.raw_value.trim();
        match fact.local_name() {
            "EntityRegistrantName" if info.name == crate::model::UNKNOWN_COMPANY => {
                info.name = value.to_string();
            }
            "EntityCentralIndexKey" if !cik_found => {
                info.cik = value.to_string();
                cik_found = true;
            }
            "TradingSymbol" if info.ticker.is_none() => info.ticker = Some(value.to_string()),
            "CurrentFiscalYearEndDate" if info.fiscal_year_end.is_none() => {
                info.fiscal_year_end = Some(value.to_string());
            }
            "DocumentType" => info.form_type = value.to_string(),
            "DocumentPeriodEndDate" if info.document_period_end.is_none() => {
                info.document_period_end = parse_date(value);
            }
            _ => {}
        }
    }

    if !cik_found {
        if let Some(context) = contexts
            .iter()
            .find(|c| c.entity.scheme.contains("sec.gov/CIK") && !c.entity.identifier.is_empty())
        {
            info.cik = context.entity.identifier.clone();
        }
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PeriodType;
    use pretty_assertions::assert_eq;

    const INSTANCE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
            xmlns:xbrldi="http://xbrl.org/2006/xbrldi"
            xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
            xmlns:iso4217="http://www.xbrl.org/2003/iso4217"
            xmlns:us-gaap="http://fasb.org/us-gaap/2024"
            xmlns:dei="http://xbrl.sec.gov/dei/2024">
  <xbrli:context id="FY2024">
    <xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:startDate>2024-01-01</xbrli:startDate><xbrli:endDate>2024-12-31</xbrli:endDate></xbrli:period>
  </xbrli:context>
  <xbrli:context id="I2024">
    <xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:instant>2024-12-31</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:context id="I2024_Segment">
    <xbrli:entity>
      <xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier>
      <xbrli:segment><xbrldi:explicitMember dimension="us-gaap:StatementBusinessSegmentsAxis">acme:WidgetsMember</xbrldi:explicitMember></xbrli:segment>
    </xbrli:entity>
    <xbrli:period><xbrli:instant>2024-12-31</xbrli:instant></xbrli:period>
    <xbrli:scenario><xbrldi:typedMember dimension="acme:RegionAxis"><acme:region xmlns:acme="http://acme.example">EU</acme:region></xbrldi:typedMember></xbrli:scenario>
  </xbrli:context>
  <xbrli:unit id="usd"><xbrli:measure>iso4217:USD</xbrli:measure></xbrli:unit>
  <xbrli:unit id="usdPerShare">
    <xbrli:divide>
      <xbrli:unitNumerator><xbrli:measure>iso4217:USD</xbrli:measure></xbrli:unitNumerator>
      <xbrli:unitDenominator><xbrli:measure>xbrli:shares</xbrli:measure></xbrli:unitDenominator>
    </xbrli:divide>
  </xbrli:unit>
  <dei:EntityRegistrantName contextRef="FY2024">Acme Corp</dei:EntityRegistrantName>
  <dei:EntityCentralIndexKey contextRef="FY2024">0000320193</dei:EntityCentralIndexKey>
  <dei:TradingSymbol contextRef="FY2024">ACME</dei:TradingSymbol>
  <dei:DocumentType contextRef="FY2024">10-Q</dei:DocumentType>
  <us-gaap:Revenues contextRef="FY2024" unitRef="usd" decimals="-6">391035000000</us-gaap:Revenues>
  <us-gaap:EarningsPerShareBasic contextRef="FY2024" unitRef="usdPerShare" decimals="2">6.11</us-gaap:EarningsPerShareBasic>
  <us-gaap:Assets contextRef="I2024" unitRef="usd" decimals="INF">364980000000</us-gaap:Assets>
  <us-gaap:Assets contextRef="I2024_Segment" unitRef="usd" decimals="-6">1000000</us-gaap:Assets>
  <us-gaap:Liabilities contextRef="I2024" unitRef="usd" xsi:nil="true"/>
  <us-gaap:Goodwill contextRef="I2024" unitRef="usd"></us-gaap:Goodwill>
  <us-gaap:Cash contextRef="MISSING" unitRef="usd">5</us-gaap:Cash>
</xbrli:xbrl>"#;

    #[test]
    fn test_contexts_units_and_facts() {
        let doc = InstanceParser::new().parse_str(INSTANCE).unwrap();

        assert_eq!(doc.contexts.len(), 3);
        assert_eq!(doc.units.len(), 2);
        assert_eq!(doc.unit("usdPerShare").unwrap().display(), "iso4217:USD/xbrli:shares");

        let segment = doc.context("I2024_Segment").unwrap();
        assert_eq!(segment.dimensions.len(), 2);
        assert_eq!(
            segment.dimensions["acme:RegionAxis"],
            Member::Typed("EU".to_string())
        );

        assert_eq!(doc.facts.len(), 8);
        assert_eq!(doc.dropped_facts, 1);
        assert_eq!(doc.skipped_facts, 2);

        let revenue = doc.facts.iter().find(|f| f.concept == "us-gaap:Revenues").unwrap();
        assert_eq!(revenue.period_type, PeriodType::Duration);
        assert_eq!(revenue.scaled_value(), Some(391_035.0));
        assert_eq!(revenue.unit.as_deref(), Some("iso4217:USD"));

        let assets: Vec<_> = doc.facts.iter().filter(|f| f.concept == "us-gaap:Assets").collect();
        assert_eq!(assets[0].decimals, Some(Decimals::Infinite));
        assert_eq!(assets[0].scaled_value(), Some(364_980_000_000.0));
        assert!(assets[1].has_dimensions());
        assert_eq!(
            assets[1].dimensions["us-gaap:StatementBusinessSegmentsAxis"],
            "acme:WidgetsMember"
        );
    }

    #[test]
    fn test_company_info() {
        let doc = InstanceParser::new().parse_str(INSTANCE).unwrap();
        assert_eq!(doc.company.name, "Acme Corp");
        assert_eq!(doc.company.cik, "0000320193");
        assert_eq!(doc.company.ticker.as_deref(), Some("ACME"));
        assert_eq!(doc.company.form_type, "10-Q");
    }

    #[test]
    fn test_company_info_defaults() {
        let doc = InstanceParser::new()
            .parse_str(r#"<xbrl xmlns="http://www.xbrl.org/2003/instance"/>"#)
            .unwrap();
        assert_eq!(doc.company, CompanyInfo::default());
        assert!(doc.facts.is_empty());
    }

    #[test]
    fn test_non_instance_root_is_rejected() {
        let err = InstanceParser::new().parse_str("<html><body/></html>").unwrap_err();
        assert_eq!(err.kind(), "parsing_error");
    }

    #[test]
    fn test_parse_date_forms() {
        assert_eq!(parse_date("2024-09-28"), NaiveDate::from_ymd_opt(2024, 9, 28));
        assert_eq!(parse_date("2024-09-28T00:00:00"), NaiveDate::from_ymd_opt(2024, 9, 28));
        assert_eq!(parse_date("--09-28"), None);
    }
}
