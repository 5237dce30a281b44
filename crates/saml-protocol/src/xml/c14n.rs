//! Canonical XML for signature digests.
//!
//! Renders one element of a parsed document in canonical form, resolving
//! namespace prefixes against the whole document so that an element keeps
//! the declarations it inherits from its ancestors. Comments are dropped.
//!
//! Exclusive canonicalization only declares the prefixes an element
//! visibly uses (its own prefix, its attributes' prefixes and any listed
//! in `InclusiveNamespaces`). Inclusive canonicalization declares every
//! binding in scope that the nearest rendered ancestor has not already
//! declared.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ops::Range;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{SamlError, SamlResult};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Canonicalization flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum C14nMethod {
    /// Canonical XML 1.0 without comments.
    Inclusive,
    /// Exclusive Canonical XML 1.0 without comments, with the
    /// `InclusiveNamespaces` prefix list (`#default` names the default
    /// namespace).
    Exclusive { inclusive_prefixes: Vec<String> },
}

impl C14nMethod {
    /// Exclusive canonicalization with an empty prefix list.
    #[must_use]
    pub const fn exclusive() -> Self {
        Self::Exclusive {
            inclusive_prefixes: Vec::new(),
        }
    }
}

/// Canonicalizes the element occupying `span` in `xml`.
///
/// Content inside `exclude` is left out, which is how the enveloped
/// signature transform removes the `ds:Signature` element. Both ranges are
/// byte spans as recorded by [`super::XmlElement::parse`].
pub fn canonicalize(
    xml: &str,
    span: Range<usize>,
    exclude: Option<Range<usize>>,
    method: &C14nMethod,
) -> SamlResult<String> {
    let mut reader = Reader::from_str(xml);
    let mut canonical = Canonicalizer::new(method);

    loop {
        let start = offset(&reader);
        let event = reader.read_event()?;
        let end = offset(&reader);

        let visible = start >= span.start
            && end <= span.end
            && !exclude
                .as_ref()
                .is_some_and(|skip| start >= skip.start && end <= skip.end);

        match event {
            Event::Start(ref e) => canonical.open(e, visible, false)?,
            Event::Empty(ref e) => canonical.open(e, visible, true)?,
            Event::End(_) => canonical.close(),
            Event::Text(ref t) if visible => {
                let raw = std::str::from_utf8(t).map_err(|e| SamlError::XmlParse(e.to_string()))?;
                let text = unescape(&normalize_newlines(raw))?;
                escape_text(&text, &mut canonical.out);
            }
            Event::CData(ref c) if visible => {
                let text = String::from_utf8_lossy(c);
                escape_text(&normalize_newlines(&text), &mut canonical.out);
            }
            Event::PI(ref pi) if visible => {
                canonical.out.push_str("<?");
                canonical.out.push_str(&String::from_utf8_lossy(pi).replace('\r', "&#xD;"));
                canonical.out.push_str("?>");
            }
            Event::DocType(_) => {
                return Err(SamlError::XmlParse("DTDs are not allowed".to_string()));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(canonical.out)
}

struct Frame {
    qname: String,
    visible: bool,
    /// Bindings in scope, `""` being the default namespace.
    in_scope: BTreeMap<String, String>,
    /// Bindings already present on rendered ancestors.
    rendered: BTreeMap<String, String>,
}

struct Canonicalizer<'m> {
    method: &'m C14nMethod,
    stack: Vec<Frame>,
    out: String,
}

impl<'m> Canonicalizer<'m> {
    fn new(method: &'m C14nMethod) -> Self {
        Self {
            method,
            stack: Vec::new(),
            out: String::new(),
        }
    }

    fn open(&mut self, start: &BytesStart<'_>, visible: bool, empty: bool) -> SamlResult<()> {
        let (mut in_scope, rendered) = match self.stack.last() {
            Some(parent) => (parent.in_scope.clone(), parent.rendered.clone()),
            None => (BTreeMap::new(), BTreeMap::new()),
        };

        let qname = utf8(start.name().as_ref())?;
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = utf8(attr.key.as_ref())?;
            let raw = std::str::from_utf8(&attr.value).map_err(|e| SamlError::XmlParse(e.to_string()))?;
            let value = unescape(&normalize_attribute(raw))?;
            if key == "xmlns" {
                in_scope.insert(String::new(), value);
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                in_scope.insert(prefix.to_string(), value);
            } else {
                attributes.push((key, value));
            }
        }

        let mut frame = Frame {
            qname,
            visible,
            in_scope,
            rendered,
        };
        if visible {
            self.render_start(&mut frame, &attributes)?;
            if empty {
                self.render_end(&frame.qname);
            }
        }
        if !empty {
            self.stack.push(frame);
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(frame) = self.stack.pop() {
            if frame.visible {
                self.render_end(&frame.qname);
            }
        }
    }

    fn render_start(&mut self, frame: &mut Frame, attributes: &[(String, String)]) -> SamlResult<()> {
        let mut sorted = Vec::with_capacity(attributes.len());
        for (qname, value) in attributes {
            let (namespace, local) = match qname.split_once(':') {
                Some(("xml", local)) => (XML_NS.to_string(), local),
                Some((prefix, local)) => {
                    let uri = frame.in_scope.get(prefix).ok_or_else(|| undeclared(prefix))?;
                    (uri.clone(), local)
                }
                None => (String::new(), qname.as_str()),
            };
            sorted.push((namespace, local.to_string(), qname.as_str(), value.as_str()));
        }
        sorted.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

        let element_prefix = frame
            .qname
            .split_once(':')
            .map_or("", |(prefix, _)| prefix)
            .to_string();
        if !element_prefix.is_empty() && element_prefix != "xml" && !frame.in_scope.contains_key(&element_prefix) {
            return Err(undeclared(&element_prefix));
        }

        let candidates: Vec<String> = match self.method {
            C14nMethod::Inclusive => {
                let mut all: Vec<String> = frame.in_scope.keys().cloned().collect();
                all.push(String::new());
                all
            }
            C14nMethod::Exclusive { inclusive_prefixes } => {
                let mut used = vec![element_prefix];
                used.extend(
                    attributes
                        .iter()
                        .filter_map(|(qname, _)| qname.split_once(':').map(|(p, _)| p.to_string())),
                );
                used.extend(inclusive_prefixes.iter().map(|p| {
                    if p == "#default" { String::new() } else { p.clone() }
                }));
                used
            }
        };

        let mut declarations: BTreeMap<String, String> = BTreeMap::new();
        for prefix in candidates {
            if prefix == "xml" || declarations.contains_key(&prefix) {
                continue;
            }
            let uri = frame.in_scope.get(&prefix).map_or("", String::as_str);
            let already = frame.rendered.get(&prefix).map_or("", String::as_str);
            if prefix.is_empty() {
                if uri != already {
                    declarations.insert(prefix, uri.to_string());
                }
            } else if !uri.is_empty() && frame.rendered.get(&prefix).map(String::as_str) != Some(uri) {
                declarations.insert(prefix, uri.to_string());
            }
        }

        self.out.push('<');
        self.out.push_str(&frame.qname);
        for (prefix, uri) in &declarations {
            if prefix.is_empty() {
                self.out.push_str(" xmlns=\"");
            } else {
                self.out.push_str(" xmlns:");
                self.out.push_str(prefix);
                self.out.push_str("=\"");
            }
            escape_attribute(uri, &mut self.out);
            self.out.push('"');
        }
        for (_, _, qname, value) in &sorted {
            self.out.push(' ');
            self.out.push_str(qname);
            self.out.push_str("=\"");
            escape_attribute(value, &mut self.out);
            self.out.push('"');
        }
        self.out.push('>');

        frame.rendered.extend(declarations);
        Ok(())
    }

    fn render_end(&mut self, qname: &str) {
        self.out.push_str("</");
        self.out.push_str(qname);
        self.out.push('>');
    }
}

fn offset(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

fn utf8(bytes: &[u8]) -> SamlResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| SamlError::XmlParse(e.to_string()))
}

fn undeclared(prefix: &str) -> SamlError {
    SamlError::XmlParse(format!("undeclared namespace prefix '{prefix}'"))
}

fn unescape(raw: &str) -> SamlResult<String> {
    quick_xml::escape::unescape(raw)
        .map(Cow::into_owned)
        .map_err(|e| SamlError::XmlParse(e.to_string()))
}

fn normalize_newlines(raw: &str) -> Cow<'_, str> {
    if raw.contains('\r') {
        Cow::Owned(raw.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Literal whitespace in attribute values reads as a space.
fn normalize_attribute(raw: &str) -> Cow<'_, str> {
    let raw = normalize_newlines(raw);
    if raw.contains(['\t', '\n']) {
        Cow::Owned(raw.replace(['\t', '\n'], " "))
    } else {
        raw
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}
