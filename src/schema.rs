// Taxonomy schema parsing
use crate::linkbase::LinkbaseKind;
use crate::model::{local_name, Balance, PeriodType, TaxonomyElement};
use crate::xml::{self, Element, LINK_NS, XBRLI_NS, XSD_NS};
use crate::Result;
use ahash::AHashMap;
use log::debug;
use std::path::{Path, PathBuf};

const INSTANT_TYPE_PATTERNS: &[&str] = &[
    "instant",
    "monetaryitemtype",
    "sharesitemtype",
    "percentitemtype",
];
const DEBIT_PATTERNS: &[&str] = &["asset", "expense", "loss"];
const CREDIT_PATTERNS: &[&str] = &["liabilit", "equity", "revenue", "income"];

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaImport {
    pub namespace: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkbaseRef {
    pub href: String,
    pub role: Option<String>,
    pub arcrole: Option<String>,
    pub kind: Option<LinkbaseKind>,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaDocument {
    pub target_namespace: Option<String>,
    pub prefix: Option<String>,
    pub elements: Vec<TaxonomyElement>,
    pub imports: Vec<SchemaImport>,
    pub linkbase_refs: Vec<LinkbaseRef>,
    index: AHashMap<String, usize>,
}

impl SchemaDocument {
    /// Lookup by qualified name, or by local name when unprefixed.
    pub fn element(&self, name: &str) -> Option<&TaxonomyElement> {
        if let Some(&i) = self.index.get(name) {
            return self.elements.get(i);
        }
        if name.contains(':') {
            return None;
        }
        self.elements.iter().find(|e| local_name(&e.name) == name)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Linkbase files referenced by the schema that exist next to it.
    pub fn linkbase_files(&self, schema_dir: &Path) -> Vec<(LinkbaseKind, PathBuf)> {
        self.linkbase_refs
            .iter()
            .filter_map(|r| {
                let kind = r.kind?;
                let path = local_path(schema_dir, &r.href)?;
                path.is_file().then_some((kind, path))
            })
            .collect()
    }

    /// Imported schemas that resolve to local files.
    pub fn local_imports(&self, schema_dir: &Path) -> Vec<PathBuf> {
        self.imports
            .iter()
            .filter_map(|i| local_path(schema_dir, i.location.as_deref()?))
            .filter(|p| p.is_file())
            .collect()
    }

    fn push(&mut self, element: TaxonomyElement) {
        if self.index.contains_key(&element.name) {
            debug!("Duplicate element declaration {}", element.name);
            return;
        }
        self.index.insert(element.name.clone(), self.elements.len());
        self.elements.push(element);
    }
}

fn local_path(base: &Path, href: &str) -> Option<PathBuf> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return None;
    }
    let file = href.split('#').next().filter(|f| !f.is_empty())?;
    Some(base.join(file))
}

pub struct SchemaParser {
    max_file_size: u64,
}

impl Default for SchemaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaParser {
    pub fn new() -> Self {
        Self {
            max_file_size: crate::config::DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<SchemaDocument> {
        let root = xml::read_document(path.as_ref(), self.max_file_size)?;
        Ok(self.parse_element(&root))
    }

    pub fn parse_str(&self, content: &str) -> Result<SchemaDocument> {
        let root = xml::parse_str(content, "<schema>")?;
        Ok(self.parse_element(&root))
    }

    pub fn parse_element(&self, root: &Element) -> SchemaDocument {
        if !root.is(XSD_NS, "schema") {
            debug!("Schema root is <{}>, not xs:schema", root.qualified_name());
        }

        let target_namespace = root.attr("targetNamespace").map(str::to_string);
        let prefix = target_namespace
            .as_deref()
            .and_then(|ns| root.prefix_for(ns))
            .map(str::to_string);

        let mut doc = SchemaDocument {
            target_namespace,
            prefix,
            ..SchemaDocument::default()
        };

        for node in root.descendants() {
            match (node.namespace.as_deref(), node.local.as_str()) {
                (Some(XSD_NS), "element") => {
                    if let Some(element) = self.parse_declaration(node, doc.prefix.as_deref()) {
                        doc.push(element);
                    }
                }
                (Some(XSD_NS), "import") => doc.imports.push(SchemaImport {
                    namespace: node.attr("namespace").map(str::to_string),
                    location: node.attr("schemaLocation").map(str::to_string),
                }),
                (Some(LINK_NS), "linkbaseRef") => {
                    if let Some(href) = node.xlink("href") {
                        let role = node.xlink("role").map(str::to_string);
                        let kind = role
                            .as_deref()
                            .and_then(LinkbaseKind::from_ref_role)
                            .or_else(|| LinkbaseKind::from_file_name(href));
                        doc.linkbase_refs.push(LinkbaseRef {
                            href: href.to_string(),
                            role,
                            arcrole: node.xlink("arcrole").map(str::to_string),
                            kind,
                        });
                    }
                }
                (Some(XSD_NS), _) => {}
                _ => debug!("Skipping unrecognized schema node <{}>", node.qualified_name()),
            }
        }

        debug!(
            "Parsed schema {:?}: {} elements, {} linkbase refs",
            doc.target_namespace,
            doc.elements.len(),
            doc.linkbase_refs.len()
        );
        doc
    }

    fn parse_declaration(&self, node: &Element, prefix: Option<&str>) -> Option<TaxonomyElement> {
        let name = node.attr("name")?;
        let element_type = node.attr("type").unwrap_or("xs:string").to_string();
        let substitution_group = node.attr("substitutionGroup").map(str::to_string);

        let period_type = match node.attr_ns(XBRLI_NS, "periodType") {
            Some("instant") => PeriodType::Instant,
            Some("duration") => PeriodType::Duration,
            _ => infer_period_type(&element_type, substitution_group.as_deref()),
        };
        let balance = match node.attr_ns(XBRLI_NS, "balance") {
            Some("debit") => Some(Balance::Debit),
            Some("credit") => Some(Balance::Credit),
            _ => infer_balance(name),
        };

        Some(TaxonomyElement {
            name: match prefix {
                Some(p) => format!("{}:{}", p, name),
                None => name.to_string(),
            },
            element_type,
            substitution_group,
            period_type,
            balance,
            is_abstract: node.attr("abstract") == Some("true"),
            nillable: node.attr("nillable") != Some("false"),
        })
    }
}

/// Duration unless the type or substitution group looks instant-style.
pub fn infer_period_type(element_type: &str, substitution_group: Option<&str>) -> PeriodType {
    let haystack = format!(
        "{} {}",
        element_type.to_lowercase(),
        substitution_group.unwrap_or("").to_lowercase()
    );
    if haystack.contains("duration") {
        PeriodType::Duration
    } else if INSTANT_TYPE_PATTERNS.iter().any(|p| haystack.contains(p)) {
        PeriodType::Instant
    } else {
        PeriodType::Duration
    }
}

/// Debit patterns are checked first, so `NetIncomeLoss` reads as debit.
pub fn infer_balance(name: &str) -> Option<Balance> {
    let lower = name.to_lowercase();
    if DEBIT_PATTERNS.iter().any(|p| lower.contains(p)) {
        Some(Balance::Debit)
    } else if CREDIT_PATTERNS.iter().any(|p| lower.contains(p)) {
        Some(Balance::Credit)
    } else {
        None
    }
}
