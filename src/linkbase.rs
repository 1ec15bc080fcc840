// Linkbase processing for XBRL
use crate::model::{
    local_name, CalculationRelationship, DefinitionRelationship, PresentationRelationship,
};
use crate::xml::{self, Element, LINK_NS, XBRLDT_NS, XML_NS};
use crate::Result;
use ahash::AHashMap;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_LINK_ROLE: &str = "http://www.xbrl.org/2003/role/link";
pub const STANDARD_LABEL: &str = "standard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkbaseKind {
    Calculation,
    Presentation,
    Label,
    Definition,
}

impl LinkbaseKind {
    pub const ALL: [LinkbaseKind; 4] = [
        LinkbaseKind::Calculation,
        LinkbaseKind::Presentation,
        LinkbaseKind::Label,
        LinkbaseKind::Definition,
    ];

    /// From a `linkbaseRef` role such as `.../calculationLinkbaseRef`.
    pub fn from_ref_role(role: &str) -> Option<Self> {
        let role = role.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| role.contains(&format!("{}linkbaseref", k.name())))
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        Self::ALL.into_iter().find(|k| name.ends_with(k.suffix()))
    }

    pub fn name(self) -> &'static str {
        match self {
            LinkbaseKind::Calculation => "calculation",
            LinkbaseKind::Presentation => "presentation",
            LinkbaseKind::Label => "label",
            LinkbaseKind::Definition => "definition",
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            LinkbaseKind::Calculation => "_cal.xml",
            LinkbaseKind::Presentation => "_pre.xml",
            LinkbaseKind::Label => "_lab.xml",
            LinkbaseKind::Definition => "_def.xml",
        }
    }

    fn link_element(self) -> &'static str {
        match self {
            LinkbaseKind::Calculation => "calculationLink",
            LinkbaseKind::Presentation => "presentationLink",
            LinkbaseKind::Label => "labelLink",
            LinkbaseKind::Definition => "definitionLink",
        }
    }

    fn arc_element(self) -> &'static str {
        match self {
            LinkbaseKind::Calculation => "calculationArc",
            LinkbaseKind::Presentation => "presentationArc",
            LinkbaseKind::Label => "labelArc",
            LinkbaseKind::Definition => "definitionArc",
        }
    }
}

// ============================================================================
// Labels
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelEntry {
    pub text: String,
    pub lang: Option<String>,
}

/// concept → role → text, with roles normalized by [`label_role_key`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabelTable {
    entries: BTreeMap<String, BTreeMap<String, LabelEntry>>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// English text wins when a role carries several languages.
    pub fn insert(&mut self, concept: &str, role: Option<&str>, text: &str, lang: Option<&str>) {
        let roles = self.entries.entry(concept.to_string()).or_default();
        let key = label_role_key(role);
        let entry = LabelEntry {
            text: text.trim().to_string(),
            lang: lang.map(str::to_string),
        };
        match roles.get(&key) {
            Some(existing) if is_english(existing.lang.as_deref()) || !is_english(lang) => {}
            _ => {
                roles.insert(key, entry);
            }
        }
    }

    /// Exact role, then the standard label, then any label.
    pub fn resolve(&self, concept: &str, role: &str) -> Option<&str> {
        let roles = self.entries.get(concept)?;
        roles
            .get(&label_role_key(Some(role)))
            .or_else(|| roles.get(STANDARD_LABEL))
            .or_else(|| roles.values().next())
            .map(|e| e.text.as_str())
    }

    /// [`LabelTable::resolve`] falling back to the bare concept name.
    pub fn label_or_default(&self, concept: &str, role: &str) -> String {
        self.resolve(concept, role)
            .map(str::to_string)
            .unwrap_or_else(|| local_name(concept).to_string())
    }

    pub fn roles(&self, concept: &str) -> impl Iterator<Item = &str> {
        self.entries
            .get(concept)
            .into_iter()
            .flat_map(|roles| roles.keys().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn extend(&mut self, other: LabelTable) {
        for (concept, roles) in other.entries {
            let target = self.entries.entry(concept).or_default();
            for (role, entry) in roles {
                target.entry(role).or_insert(entry);
            }
        }
    }
}

fn is_english(lang: Option<&str>) -> bool {
    lang.map_or(false, |l| l.to_lowercase().starts_with("en"))
}

/// `…/role/label` and a missing role become `standard`; other role URIs keep
/// their last path segment (`…/role/terseLabel` → `terseLabel`).
pub fn label_role_key(role: Option<&str>) -> String {
    let role = match role {
        Some(r) if !r.trim().is_empty() => r.trim(),
        _ => return STANDARD_LABEL.to_string(),
    };
    let last = role.rsplit('/').next().unwrap_or(role);
    if last == "label" || last == STANDARD_LABEL {
        STANDARD_LABEL.to_string()
    } else {
        last.to_string()
    }
}

// ============================================================================
// Relationship sets
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Linkbases {
    pub calculations: Vec<CalculationRelationship>,
    pub presentations: Vec<PresentationRelationship>,
    pub definitions: Vec<DefinitionRelationship>,
    pub labels: LabelTable,
}

impl Linkbases {
    pub fn merge(&mut self, other: Linkbases) {
        self.calculations.extend(other.calculations);
        self.presentations.extend(other.presentations);
        self.definitions.extend(other.definitions);
        self.labels.extend(other.labels);
    }

    pub fn is_empty(&self) -> bool {
        self.calculations.is_empty()
            && self.presentations.is_empty()
            && self.definitions.is_empty()
            && self.labels.is_empty()
    }

    /// Calculation children of `parent`, optionally within one role, by order.
    pub fn calculation_children(&self, parent: &str, role: Option<&str>) -> Vec<&CalculationRelationship> {
        let mut children: Vec<_> = self
            .calculations
            .iter()
            .filter(|r| r.parent == parent && role.map_or(true, |role| r.role == role))
            .collect();
        children.sort_by(|a, b| a.order.total_cmp(&b.order));
        children
    }

    pub fn presentation_children(&self, parent: &str, role: Option<&str>) -> Vec<&PresentationRelationship> {
        let mut children: Vec<_> = self
            .presentations
            .iter()
            .filter(|r| r.parent == parent && role.map_or(true, |role| r.role == role))
            .collect();
        children.sort_by(|a, b| a.order.total_cmp(&b.order));
        children
    }
}

/// `us-gaap-2024.xsd#us-gaap_Assets` → `us-gaap:Assets`.
pub fn concept_from_href(href: &str) -> String {
    let fragment = href.rsplit_once('#').map_or(href, |(_, f)| f);
    if fragment.contains(':') {
        return fragment.to_string();
    }
    match fragment.split_once('_') {
        Some((prefix, name)) if !prefix.is_empty() && !name.is_empty() => {
            format!("{}:{}", prefix, name)
        }
        _ => fragment.to_string(),
    }
}

// ============================================================================
// Parser
// ============================================================================

/// One arc resolved against its link container.
struct ResolvedArc<'a> {
    arc: &'a Element,
    from: &'a str,
    to: &'a str,
    role: &'a str,
}

pub struct LinkbaseParser {
    max_file_size: u64,
}

impl Default for LinkbaseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkbaseParser {
    pub fn new() -> Self {
        Self {
            max_file_size: crate::config::DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn parse_file<P: AsRef<Path>>(&self, kind: LinkbaseKind, path: P) -> Result<Linkbases> {
        let root = xml::read_document(path.as_ref(), self.max_file_size)?;
        Ok(self.parse_element(kind, &root))
    }

    pub fn parse_str(&self, kind: LinkbaseKind, content: &str) -> Result<Linkbases> {
        let root = xml::parse_str(content, kind.name())?;
        Ok(self.parse_element(kind, &root))
    }

    pub fn parse_element(&self, kind: LinkbaseKind, root: &Element) -> Linkbases {
        let mut out = Linkbases::default();
        match kind {
            LinkbaseKind::Calculation => out.calculations = self.parse_calculation(root),
            LinkbaseKind::Presentation => out.presentations = self.parse_presentation(root),
            LinkbaseKind::Label => out.labels = self.parse_labels(root),
            LinkbaseKind::Definition => out.definitions = self.parse_definition(root),
        }
        out
    }

    pub fn parse_calculation(&self, root: &Element) -> Vec<CalculationRelationship> {
        let mut relationships = Vec::new();
        for_each_arc(root, LinkbaseKind::Calculation, |arc| {
            relationships.push(CalculationRelationship {
                parent: arc.from.to_string(),
                child: arc.to.to_string(),
                weight: parse_f64(arc.arc.attr("weight"), 1.0),
                order: parse_f64(arc.arc.attr("order"), 0.0),
                role: arc.role.to_string(),
            });
        });
        debug!("Parsed {} calculation relationships", relationships.len());
        relationships
    }

    pub fn parse_presentation(&self, root: &Element) -> Vec<PresentationRelationship> {
        let mut relationships = Vec::new();
        for_each_arc(root, LinkbaseKind::Presentation, |arc| {
            relationships.push(PresentationRelationship {
                parent: arc.from.to_string(),
                child: arc.to.to_string(),
                order: parse_f64(arc.arc.attr("order"), 0.0),
                preferred_label: arc.arc.attr("preferredLabel").map(str::to_string),
                role: arc.role.to_string(),
            });
        });
        debug!("Parsed {} presentation relationships", relationships.len());
        relationships
    }

    pub fn parse_definition(&self, root: &Element) -> Vec<DefinitionRelationship> {
        let mut relationships = Vec::new();
        for_each_arc(root, LinkbaseKind::Definition, |arc| {
            relationships.push(DefinitionRelationship {
                parent: arc.from.to_string(),
                child: arc.to.to_string(),
                arcrole: arc.arc.xlink("arcrole").unwrap_or_default().to_string(),
                order: parse_f64(arc.arc.attr("order"), 0.0),
                role: arc.role.to_string(),
                closed: arc.arc.attr_ns(XBRLDT_NS, "closed").map(|v| v == "true"),
                context_element: arc.arc.attr_ns(XBRLDT_NS, "contextElement").map(str::to_string),
                target_role: arc.arc.attr_ns(XBRLDT_NS, "targetRole").map(str::to_string),
            });
        });
        debug!("Parsed {} definition relationships", relationships.len());
        relationships
    }

    pub fn parse_labels(&self, root: &Element) -> LabelTable {
        let mut table = LabelTable::new();
        for link in extended_links(root, LinkbaseKind::Label) {
            let locators = locators(link);

            let mut resources: AHashMap<&str, Vec<&Element>> = AHashMap::new();
            for resource in link.children_named(LINK_NS, "label") {
                if let Some(label) = resource.xlink("label") {
                    resources.entry(label).or_default().push(resource);
                }
            }

            for arc in link.children_named(LINK_NS, LinkbaseKind::Label.arc_element()) {
                if is_prohibited(arc) {
                    continue;
                }
                let (Some(from), Some(to)) = (arc.xlink("from"), arc.xlink("to")) else {
                    continue;
                };
                let (Some(concepts), Some(targets)) = (locators.get(from), resources.get(to)) else {
                    continue;
                };
                for concept in concepts {
                    for resource in targets {
                        table.insert(
                            concept,
                            resource.xlink("role"),
                            &resource.deep_text(),
                            resource.attr_ns(XML_NS, "lang"),
                        );
                    }
                }
            }
        }
        debug!("Parsed labels for {} concepts", table.len());
        table
    }
}

fn extended_links(root: &Element, kind: LinkbaseKind) -> impl Iterator<Item = &Element> {
    let local = kind.link_element();
    root.descendants().filter(move |e| e.is(LINK_NS, local))
}

/// Locator label → concepts; XLink allows several locators per label.
fn locators(link: &Element) -> AHashMap<&str, Vec<String>> {
    let mut map: AHashMap<&str, Vec<String>> = AHashMap::new();
    for loc in link.children_named(LINK_NS, "loc") {
        if let (Some(label), Some(href)) = (loc.xlink("label"), loc.xlink("href")) {
            map.entry(label).or_default().push(concept_from_href(href));
        }
    }
    map
}

fn for_each_arc<F>(root: &Element, kind: LinkbaseKind, mut f: F)
where
    F: FnMut(&ResolvedArc<'_>),
{
    for link in extended_links(root, kind) {
        let role = link.xlink("role").unwrap_or(DEFAULT_LINK_ROLE);
        let locators = locators(link);

        for arc in link.children_named(LINK_NS, kind.arc_element()) {
            if is_prohibited(arc) {
                continue;
            }
            let (Some(from), Some(to)) = (arc.xlink("from"), arc.xlink("to")) else {
                debug!("Skipping {} without from/to", kind.arc_element());
                continue;
            };
            let (Some(parents), Some(children)) = (locators.get(from), locators.get(to)) else {
                debug!("Skipping {} with unresolved locator {} -> {}", kind.arc_element(), from, to);
                continue;
            };
            for parent in parents {
                for child in children {
                    f(&ResolvedArc {
                        arc,
                        from: parent,
                        to: child,
                        role,
                    });
                }
            }
        }
    }
}

fn is_prohibited(arc: &Element) -> bool {
    arc.attr("use") == Some("prohibited")
}

fn parse_f64(raw: Option<&str>, default: f64) -> f64 {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CALCULATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:calculationLink xlink:type="extended" xlink:role="http://acme.example/role/IncomeStatement">
    <link:loc xlink:type="locator" xlink:href="us-gaap.xsd#us-gaap_GrossProfit" xlink:label="gp"/>
    <link:loc xlink:type="locator" xlink:href="us-gaap.xsd#us-gaap_Revenues" xlink:label="rev"/>
    <link:loc xlink:type="locator" xlink:href="us-gaap.xsd#us-gaap_CostOfRevenue" xlink:label="cost"/>
    <link:calculationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/summation-item"
      xlink:from="gp" xlink:to="rev" weight="1.0" order="1.0"/>
    <link:calculationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/summation-item"
      xlink:from="gp" xlink:to="cost" weight="-1.0" order="2.0"/>
    <link:calculationArc xlink:type="arc" xlink:from="gp" xlink:to="cost" use="prohibited"/>
  </link:calculationLink>
</link:linkbase>"#;

    const LABELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:labelLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="us-gaap.xsd#us-gaap_Revenues" xlink:label="rev"/>
    <link:label xlink:type="resource" xlink:label="rev_lbl" xlink:role="http://www.xbrl.org/2003/role/label" xml:lang="de">Umsatz</link:label>
    <link:label xlink:type="resource" xlink:label="rev_lbl" xlink:role="http://www.xbrl.org/2003/role/label" xml:lang="en-US">Revenues</link:label>
    <link:label xlink:type="resource" xlink:label="rev_lbl" xlink:role="http://www.xbrl.org/2003/role/totalLabel" xml:lang="en-US">Total revenues</link:label>
    <link:labelArc xlink:type="arc" xlink:from="rev" xlink:to="rev_lbl"/>
  </link:labelLink>
</link:linkbase>"#;

    #[test]
    fn test_calculation_relationships() {
        let parsed = LinkbaseParser::new()
            .parse_str(LinkbaseKind::Calculation, CALCULATION)
            .unwrap();

        assert_eq!(parsed.calculations.len(), 2);
        let children = parsed.calculation_children("us-gaap:GrossProfit", None);
        assert_eq!(children[0].child, "us-gaap:Revenues");
        assert_eq!(children[0].weight, 1.0);
        assert_eq!(children[1].child, "us-gaap:CostOfRevenue");
        assert_eq!(children[1].weight, -1.0);
        assert_eq!(children[1].role, "http://acme.example/role/IncomeStatement");
    }

    #[test]
    fn test_label_resolution_order() {
        let parsed = LinkbaseParser::new()
            .parse_str(LinkbaseKind::Label, LABELS)
            .unwrap();
        let labels = &parsed.labels;

        assert_eq!(labels.resolve("us-gaap:Revenues", "totalLabel"), Some("Total revenues"));
        assert_eq!(
            labels.resolve("us-gaap:Revenues", "http://www.xbrl.org/2003/role/totalLabel"),
            Some("Total revenues")
        );
        // falls back to the English standard label
        assert_eq!(labels.resolve("us-gaap:Revenues", "terseLabel"), Some("Revenues"));
        assert_eq!(labels.label_or_default("us-gaap:Assets", "standard"), "Assets");
    }

    #[test]
    fn test_any_label_when_no_standard() {
        let mut table = LabelTable::new();
        table.insert("x:Foo", Some("http://www.xbrl.org/2003/role/verboseLabel"), "Verbose foo", None);
        assert_eq!(table.resolve("x:Foo", "terseLabel"), Some("Verbose foo"));
    }

    #[test]
    fn test_kind_detection() {
        assert_eq!(
            LinkbaseKind::from_ref_role("http://www.xbrl.org/2003/role/presentationLinkbaseRef"),
            Some(LinkbaseKind::Presentation)
        );
        assert_eq!(LinkbaseKind::from_file_name("aapl-20240928_def.xml"), Some(LinkbaseKind::Definition));
        assert_eq!(LinkbaseKind::from_file_name("aapl-20240928_htm.xml"), None);
        assert_eq!(concept_from_href("us-gaap-2024.xsd#us-gaap_Assets"), "us-gaap:Assets");
        assert_eq!(concept_from_href("#Assets"), "Assets");
    }

    #[test]
    fn test_malformed_linkbase_is_an_error() {
        let err = LinkbaseParser::new()
            .parse_str(LinkbaseKind::Presentation, "<link:linkbase xmlns:link='x'><a></b></link:linkbase>")
            .unwrap_err();
        assert_eq!(err.kind(), "parsing_error");
    }
}
