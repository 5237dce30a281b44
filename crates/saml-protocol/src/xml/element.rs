//! Namespace-resolved XML element tree.

use std::ops::Range;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};

/// Deepest element nesting accepted from the network.
const MAX_DEPTH: usize = 64;

/// An attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlAttribute {
    /// Namespace URI; `None` for unqualified attributes.
    pub namespace: Option<String>,
    /// Local name.
    pub name: String,
    /// Unescaped value.
    pub value: String,
}

impl XmlAttribute {
    /// Creates an attribute.
    #[must_use]
    pub fn new(namespace: Option<&str>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An element with its resolved namespace, attributes and children.
///
/// Trees produced by [`XmlElement::parse`] also record where each element
/// sits in the source text: `span` covers the whole element and
/// `content_start` is the offset just past its start tag. Built trees
/// have empty spans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlElement {
    /// Namespace URI; `None` if the element is in no namespace.
    pub namespace: Option<String>,
    /// Local name.
    pub name: String,
    /// Attributes, namespace declarations excluded.
    pub attributes: Vec<XmlAttribute>,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
    /// Concatenated, unescaped character data.
    pub text: String,
    /// Byte range of the element in the source.
    #[serde(skip)]
    pub span: Range<usize>,
    /// Byte offset just past the start tag.
    #[serde(skip)]
    pub content_start: usize,
}

impl XmlElement {
    /// Creates an empty element.
    #[must_use]
    pub fn new(namespace: &str, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a child element.
    #[must_use]
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: XmlAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Sets the text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Parses a document and returns its root element.
    ///
    /// Documents with a DTD are rejected.
    pub fn parse(xml: &str) -> SamlResult<Self> {
        let mut reader = NsReader::from_str(xml);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;

        loop {
            let start = position(&reader);
            let (resolved, event) = reader.read_resolved_event()?;
            let namespace = match event {
                Event::Start(_) | Event::Empty(_) => namespace_of(resolved)?,
                _ => None,
            };
            let end = position(&reader);

            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    if root.is_some() {
                        return Err(SamlError::XmlParse(
                            "content after the document element".to_string(),
                        ));
                    }
                    if stack.len() >= MAX_DEPTH {
                        return Err(SamlError::XmlParse("document nested too deeply".to_string()));
                    }
                    let mut element = start_element(&reader, namespace, e)?;
                    element.span = start..end;
                    element.content_start = end;

                    if matches!(event, Event::Start(_)) {
                        stack.push(element);
                    } else {
                        attach(&mut stack, &mut root, element);
                    }
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                    element.span.end = end;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(t) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&t.unescape()?);
                    } else if !t.iter().all(u8::is_ascii_whitespace) {
                        return Err(SamlError::XmlParse(
                            "text outside the document element".to_string(),
                        ));
                    }
                }
                Event::CData(c) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::DocType(_) => {
                    return Err(SamlError::XmlParse("DTDs are not allowed".to_string()));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(SamlError::XmlParse("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
    }

    /// Returns true if the element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// Returns an unqualified attribute value.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Returns a namespace-qualified attribute value.
    #[must_use]
    pub fn attr_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Returns the first child with the given name.
    #[must_use]
    pub fn child(&self, namespace: &str, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(namespace, name))
    }

    /// Iterates over children with the given name.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.is(namespace, name))
    }

    /// Returns the text of the first child with the given name.
    #[must_use]
    pub fn child_text(&self, namespace: &str, name: &str) -> Option<&str> {
        self.child(namespace, name).map(|c| c.text.as_str())
    }

    /// Text content with surrounding whitespace removed.
    #[must_use]
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    /// Depth-first iteration over this element and all descendants.
    pub fn descendants(&self) -> impl Iterator<Item = &XmlElement> {
        let mut pending = vec![self];
        std::iter::from_fn(move || {
            let next = pending.pop()?;
            pending.extend(next.children.iter().rev());
            Some(next)
        })
    }

    /// Finds every element whose `ID` attribute equals `id`.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Vec<&XmlElement> {
        self.descendants().filter(|e| e.attr("ID") == Some(id)).collect()
    }
}

fn position<R>(reader: &NsReader<R>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn namespace_of(resolved: ResolveResult<'_>) -> SamlResult<Option<String>> {
    match resolved {
        ResolveResult::Bound(ns) => std::str::from_utf8(ns.into_inner())
            .map(|s| Some(s.to_string()))
            .map_err(|e| SamlError::XmlParse(e.to_string())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(SamlError::XmlParse(format!(
            "undeclared namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn utf8(bytes: &[u8]) -> SamlResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| SamlError::XmlParse(e.to_string()))
}

fn start_element<R>(
    reader: &NsReader<R>,
    namespace: Option<String>,
    start: &BytesStart<'_>,
) -> SamlResult<XmlElement> {
    let mut element = XmlElement {
        namespace,
        name: utf8(start.local_name().as_ref())?,
        ..XmlElement::default()
    };

    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (resolved, local) = reader.resolve_attribute(attr.key);
        element.attributes.push(XmlAttribute {
            namespace: namespace_of(resolved)?,
            name: utf8(local.as_ref())?,
            value: attr.unescape_value()?.into_owned(),
        });
    }

    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SAML_NS, XMLDSIG_NS};

    const DOC: &str = r#"<?xml version="1.0"?>
<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a1" Version="2.0">
  <saml:Issuer>urn:idp</saml:Issuer>
  <ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"/>
  <saml:Subject><saml:NameID a:ext="1" xmlns:a="urn:ext">x &amp; y</saml:NameID></saml:Subject>
</saml:Assertion>"#;

    #[test]
    fn parses_names_and_attributes() {
        let root = XmlElement::parse(DOC).unwrap();
        assert!(root.is(SAML_NS, "Assertion"));
        assert_eq!(root.attr("ID"), Some("_a1"));
        assert_eq!(root.child_text(SAML_NS, "Issuer"), Some("urn:idp"));
        assert!(root.child(XMLDSIG_NS, "Signature").is_some());

        let name_id = root.child(SAML_NS, "Subject").unwrap().child(SAML_NS, "NameID").unwrap();
        assert_eq!(name_id.text, "x & y");
        assert_eq!(name_id.attr_ns("urn:ext", "ext"), Some("1"));
        assert_eq!(name_id.attr("ext"), None);
    }

    #[test]
    fn records_spans() {
        let root = XmlElement::parse(DOC).unwrap();
        assert!(DOC[root.span.clone()].starts_with("<saml:Assertion"));
        assert!(DOC[root.span.clone()].ends_with("</saml:Assertion>"));

        let issuer = root.child(SAML_NS, "Issuer").unwrap();
        assert_eq!(&DOC[issuer.span.clone()], "<saml:Issuer>urn:idp</saml:Issuer>");
        assert_eq!(&DOC[issuer.content_start..issuer.content_start + 7], "urn:idp");

        let sig = root.child(XMLDSIG_NS, "Signature").unwrap();
        assert!(DOC[sig.span.clone()].ends_with("/>"));
    }

    #[test]
    fn finds_elements_by_id() {
        let root = XmlElement::parse(DOC).unwrap();
        assert_eq!(root.find_by_id("_a1").len(), 1);
        assert!(root.find_by_id("_missing").is_empty());
    }

    #[test]
    fn rejects_bad_documents() {
        assert!(XmlElement::parse("").is_err());
        assert!(XmlElement::parse("<a><b></a>").is_err());
        assert!(XmlElement::parse("<p:a/>").is_err());
        assert!(XmlElement::parse("<a/><b/>").is_err());
        assert!(XmlElement::parse("<!DOCTYPE a [<!ENTITY x \"y\">]><a/>").is_err());
    }
}
