//! Lightweight XML element tree over `quick-xml` events.
//!
//! OAI-PMH envelopes and CERIF payloads are read into an [`XmlElement`] tree
//! once, and the protocol and dialect layers navigate it by local name. Element
//! and attribute names keep their qualified form as well, because the CERIF
//! dialect detection depends on whether the feed uses prefixes.
//!
//! # Examples
//!
//! ```ignore
//! use cerif_harvest::xml::parse_document;
//!
//! let root = parse_document(r#"<cerif:OrgUnit xmlns:cerif="urn:x" id="o1">
//!     <cerif:Name xml:lang="en">Faculty</cerif:Name>
//! </cerif:OrgUnit>"#)?;
//! assert_eq!(root.local_name, "OrgUnit");
//! assert_eq!(root.text_at(&["Name"]).as_deref(), Some("Faculty"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Error produced while reading an XML document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("XML error at byte {position}: {message}")]
pub struct XmlReadError {
    /// Byte offset where reading stopped.
    pub position: usize,
    /// Reader diagnostic.
    pub message: String,
}

/// An attribute with both its qualified and local name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Qualified name, e.g. `xml:lang`.
    pub name: String,
    /// Local name, e.g. `lang`.
    pub local_name: String,
    /// Unescaped value.
    pub value: String,
}

/// An element with its attributes, children and concatenated text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name, e.g. `cerif:Person`.
    pub name: String,
    /// Local name, e.g. `Person`.
    pub local_name: String,
    /// Attributes in document order.
    pub attributes: Vec<XmlAttribute>,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
    /// Text content directly inside this element.
    pub text: String,
}

impl XmlElement {
    /// Namespace prefix of the element name, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Attribute value by local name (the first match).
    #[must_use]
    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Attribute value by exact qualified name.
    #[must_use]
    pub fn attr_qualified(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// First child with the given local name.
    #[must_use]
    pub fn child(&self, local_name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.local_name == local_name)
    }

    /// All children with the given local name.
    pub fn children_named<'a>(
        &'a self,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.local_name == local_name)
    }

    /// First descendant reached by following local names.
    #[must_use]
    pub fn find_path(&self, path: &[&str]) -> Option<&XmlElement> {
        path.iter()
            .try_fold(self, |element, step| element.child(step))
    }

    /// Every descendant reached by following local names, fanning out at each step.
    #[must_use]
    pub fn find_all(&self, path: &[&str]) -> Vec<&XmlElement> {
        let mut current = vec![self];
        for step in path {
            current = current
                .into_iter()
                .flat_map(|element| element.children.iter().filter(|c| c.local_name == *step))
                .collect();
        }
        current
    }

    /// Trimmed text of the element, `None` when blank.
    #[must_use]
    pub fn trimmed_text(&self) -> Option<String> {
        let text = self.text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    /// Trimmed, non-blank text of the first element at `path`.
    #[must_use]
    pub fn text_at(&self, path: &[&str]) -> Option<String> {
        self.find_path(path).and_then(XmlElement::trimmed_text)
    }
}

/// Parses a complete document and returns its root element.
///
/// # Errors
///
/// Returns an error for malformed XML, mismatched end tags, or a document
/// without a root element.
pub fn parse_document(xml: &str) -> Result<XmlElement, XmlReadError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let position = reader.buffer_position();
        let event = reader.read_event().map_err(|e| XmlReadError {
            position,
            message: e.to_string(),
        })?;
        match event {
            Event::Start(start) => stack.push(element_from_start(&start, position)?),
            Event::Empty(start) => {
                let element = element_from_start(&start, position)?;
                attach(&mut stack, &mut root, element, position)?;
            },
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| XmlReadError {
                    position,
                    message: "unexpected end tag".to_string(),
                })?;
                attach(&mut stack, &mut root, element, position)?;
            },
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| XmlReadError {
                    position,
                    message: e.to_string(),
                })?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            },
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            },
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctype
            _ => {},
        }
    }

    if !stack.is_empty() {
        return Err(XmlReadError {
            position: xml.len(),
            message: format!("unclosed element <{}>", stack[stack.len() - 1].name),
        });
    }
    root.ok_or_else(|| XmlReadError {
        position: 0,
        message: "document has no root element".to_string(),
    })
}

fn element_from_start(start: &BytesStart<'_>, position: usize) -> Result<XmlElement, XmlReadError> {
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| XmlReadError {
            position,
            message: e.to_string(),
        })?;
        let value = attribute.unescape_value().map_err(|e| XmlReadError {
            position,
            message: e.to_string(),
        })?;
        attributes.push(XmlAttribute {
            name: String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
            local_name: String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned(),
            value: value.into_owned(),
        });
    }
    Ok(XmlElement {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        local_name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
    position: usize,
) -> Result<(), XmlReadError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlReadError {
            position,
            message: "multiple root elements".to_string(),
        });
    }
    *root = Some(element);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefixed_document() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <cerif:OrgUnit xmlns:cerif="https://www.openaire.eu/cerif-profile/1.1/" id="o1">
            <cerif:Acronym>FTN</cerif:Acronym>
            <cerif:Name xml:lang="en">Faculty of Technical Sciences</cerif:Name>
            <cerif:Name xml:lang="sr">Fakultet tehničkih nauka</cerif:Name>
        </cerif:OrgUnit>"#;

        let root = parse_document(xml).unwrap();
        assert_eq!(root.name, "cerif:OrgUnit");
        assert_eq!(root.local_name, "OrgUnit");
        assert_eq!(root.prefix(), Some("cerif"));
        assert_eq!(root.attr("id"), Some("o1"));
        assert_eq!(root.text_at(&["Acronym"]).as_deref(), Some("FTN"));

        let names: Vec<_> = root.children_named("Name").collect();
        assert_eq!(names.len(), 2);
        assert_eq!(names[1].attr_qualified("xml:lang"), Some("sr"));
        assert_eq!(names[1].attr("lang"), Some("sr"));
    }

    #[test]
    fn test_find_all_fans_out() {
        let xml = r#"<Publication>
            <Authors>
                <Author><Person id="p1"/></Author>
                <Author><DisplayName>Anon</DisplayName></Author>
                <Author><Person id="p2"/></Author>
            </Authors>
        </Publication>"#;
        let root = parse_document(xml).unwrap();
        let people = root.find_all(&["Authors", "Author", "Person"]);
        let ids: Vec<_> = people.iter().filter_map(|p| p.attr("id")).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[test]
    fn test_find_all_results_outlive_path() {
        let root = parse_document("<Person><Affiliation><OrgUnit id=\"o1\"/></Affiliation></Person>").unwrap();
        let units = {
            let owned = vec!["Affiliation".to_string(), "OrgUnit".to_string()];
            let path: Vec<&str> = owned.iter().map(String::as_str).collect();
            root.find_all(&path)
        };
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].attr("id"), Some("o1"));
    }

    #[test]
    fn test_entities_and_cdata_are_decoded() {
        let xml = "<Record><Title>Fish &amp; Chips</Title><Note><![CDATA[<raw>]]></Note></Record>";
        let root = parse_document(xml).unwrap();
        assert_eq!(root.text_at(&["Title"]).as_deref(), Some("Fish & Chips"));
        assert_eq!(root.text_at(&["Note"]).as_deref(), Some("<raw>"));
    }

    #[test]
    fn test_mismatched_tags_fail() {
        assert!(parse_document("<a><b></a>").is_err());
    }

    #[test]
    fn test_unclosed_document_fails() {
        assert!(parse_document("<a><b></b>").is_err());
    }

    #[test]
    fn test_empty_document_fails() {
        assert!(parse_document("").is_err());
    }
}
