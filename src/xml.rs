// Namespace-aware element tree over quick-xml events
use crate::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;

pub const XBRLI_NS: &str = "http://www.xbrl.org/2003/instance";
pub const LINK_NS: &str = "http://www.xbrl.org/2003/linkbase";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XBRLDT_NS: &str = "http://xbrl.org/2005/xbrldt";
pub const XBRLDI_NS: &str = "http://xbrl.org/2006/xbrldi";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
    pub attributes: Vec<Attribute>,
    /// Namespace declarations made on this element, `""` for the default namespace.
    pub declarations: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == Some(namespace)
    }

    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace.as_deref() == Some(namespace)
    }

    /// `prefix:local` as written in the document.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }

    /// Unqualified attribute by local name.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local == local)
            .map(|a| a.value.as_str())
    }

    pub fn attr_ns(&self, namespace: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local == local && a.namespace.as_deref() == Some(namespace))
            .map(|a| a.value.as_str())
    }

    pub fn xlink(&self, local: &str) -> Option<&str> {
        self.attr_ns(XLINK_NS, local)
    }

    pub fn child(&self, namespace: &str, local: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(namespace, local))
    }

    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(namespace, local))
    }

    /// Depth-first iteration over every element below this one.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Text of this element and all of its descendants, in document order.
    pub fn deep_text(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            out.push_str(&child.deep_text());
        }
        out.trim().to_string()
    }

    /// Prefix bound to `namespace` by the declarations on this element.
    pub fn prefix_for(&self, namespace: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(prefix, uri)| uri == namespace && !prefix.is_empty())
            .map(|(prefix, _)| prefix.as_str())
    }

    pub fn declares_namespace(&self, namespace: &str) -> bool {
        self.declarations.iter().any(|(_, uri)| uri == namespace)
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// Reads and parses one document, rejecting files above `max_size` before reading.
pub fn read_document(path: &Path, max_size: u64) -> Result<Element> {
    let size = std::fs::metadata(path)?.len();
    if size > max_size {
        return Err(Error::data_validation(
            "file_size",
            format!(
                "{} is {} bytes, above the {} byte limit",
                path.display(),
                size,
                max_size
            ),
        ));
    }

    let label = path.display().to_string();

    #[cfg(feature = "mmap")]
    let parsed = {
        let file = std::fs::File::open(path)?;
        // SAFETY: the mapping is read-only and dropped before returning.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        parse_bytes(&mmap, &label)
    };

    #[cfg(not(feature = "mmap"))]
    let parsed = {
        let content = std::fs::read(path)?;
        parse_bytes(&content, &label)
    };

    parsed
}

pub fn parse_str(content: &str, source: &str) -> Result<Element> {
    parse_bytes(content.as_bytes(), source)
}

/// Builds the element tree; `source` names the document in errors.
pub fn parse_bytes(data: &[u8], source: &str) -> Result<Element> {
    // Skip BOM if present
    let data = if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    };

    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut builder = TreeBuilder::new(source);
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            Error::parsing(
                source,
                format!("{} at byte {}", e, reader.error_position()),
            )
        })?;

        match event {
            Event::Start(ref e) => {
                let element = builder.open(e)?;
                builder.stack.push(element);
            }
            Event::Empty(ref e) => {
                let element = builder.open(e)?;
                builder.scopes.pop();
                builder.attach(element)?;
            }
            Event::End(_) => {
                let element = builder
                    .stack
                    .pop()
                    .ok_or_else(|| Error::parsing(source, "unmatched closing tag"))?;
                builder.scopes.pop();
                builder.attach(element)?;
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| Error::parsing(source, err.to_string()))?;
                builder.push_text(&text)?;
            }
            Event::CData(e) => {
                let inner = e.into_inner();
                let text = std::str::from_utf8(&inner)
                    .map_err(|err| Error::parsing(source, err.to_string()))?;
                builder.push_text(text)?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    builder.finish()
}

struct TreeBuilder<'s> {
    source: &'s str,
    stack: Vec<Element>,
    /// One declaration list per open element.
    scopes: Vec<Vec<(String, String)>>,
    root: Option<Element>,
}

impl<'s> TreeBuilder<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            stack: Vec::new(),
            scopes: Vec::new(),
            root: None,
        }
    }

    fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// Creates the element and pushes its namespace scope.
    fn open(&mut self, start: &BytesStart<'_>) -> Result<Element> {
        let name = utf8(start.name().as_ref(), self.source)?.to_string();
        let (prefix, local) = split_name(&name);

        let mut declarations = Vec::new();
        let mut raw_attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::parsing(self.source, e.to_string()))?;
            let key = utf8(attr.key.as_ref(), self.source)?.to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| Error::parsing(self.source, e.to_string()))?
                .into_owned();
            if key == "xmlns" {
                declarations.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                declarations.push((prefix.to_string(), value));
            } else {
                raw_attributes.push((key, value));
            }
        }
        self.scopes.push(declarations.clone());

        let namespace = match prefix {
            Some(p) => Some(
                self.resolve(p)
                    .ok_or_else(|| {
                        Error::parsing(
                            self.source,
                            format!("namespace prefix '{}' on <{}> is not bound", p, name),
                        )
                    })?
                    .to_string(),
            ),
            None => self.resolve("").map(str::to_string),
        };

        let mut attributes = Vec::with_capacity(raw_attributes.len());
        for (key, value) in raw_attributes {
            let (attr_prefix, attr_local) = split_name(&key);
            // Unprefixed attributes carry no namespace
            let attr_namespace = match attr_prefix {
                Some(p) => Some(
                    self.resolve(p)
                        .ok_or_else(|| {
                            Error::parsing(
                                self.source,
                                format!("namespace prefix '{}' on attribute {} is not bound", p, key),
                            )
                        })?
                        .to_string(),
                ),
                None => None,
            };
            attributes.push(Attribute {
                prefix: attr_prefix.map(str::to_string),
                local: attr_local.to_string(),
                namespace: attr_namespace,
                value,
            });
        }

        Ok(Element {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
            namespace,
            attributes,
            declarations,
            children: Vec::new(),
            text: String::new(),
        })
    }

    fn attach(&mut self, element: Element) -> Result<()> {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None if self.root.is_none() => self.root = Some(element),
            None => {
                return Err(Error::parsing(
                    self.source,
                    "document has more than one root element",
                ))
            }
        }
        Ok(())
    }

    fn push_text(&mut self, text: &str) -> Result<()> {
        match self.stack.last_mut() {
            Some(current) => current.text.push_str(text),
            None if text.trim().is_empty() => {}
            None => {
                return Err(Error::parsing(
                    self.source,
                    "text content outside the root element",
                ))
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Element> {
        if let Some(open) = self.stack.last() {
            return Err(Error::parsing(
                self.source,
                format!("unexpected end of document inside <{}>", open.qualified_name()),
            ));
        }
        self.root
            .ok_or_else(|| Error::parsing(self.source, "document has no root element"))
    }
}

fn utf8<'a>(bytes: &'a [u8], source: &str) -> Result<&'a str> {
    std::str::from_utf8(bytes).map_err(|e| Error::parsing(source, e.to_string()))
}

fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}
