//! SAX Boundary
//!
//! The core neither parses nor prints XML itself: documents arrive as
//! SAX events from an external parser and leave as SAX events through
//! `to_sax`. This module defines the owned event type and the handler
//! traits both directions speak. Events are owned values (not input
//! spans) because they cross the trigger pipeline, which rewrites them.

pub mod collector;

pub use collector::{EventCollector, XmlWriter};

use crate::dom::node::AttrType;
use crate::dom::qname::QName;
use crate::error::Result;

/// An attribute as it appears on a start-element event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaxAttribute {
    pub name: QName,
    pub value: String,
    pub attr_type: AttrType,
}

/// Attribute list of a start-element event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeList {
    attrs: Vec<SaxAttribute>,
}

impl AttributeList {
    /// The empty list.
    pub fn empty() -> Self {
        AttributeList { attrs: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SaxAttribute> {
        self.attrs.iter()
    }

    /// Value of the attribute with the given local name.
    pub fn value_of(&self, local_name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name.local_name() == local_name)
            .map(|a| a.value.as_str())
    }
}

impl From<Vec<SaxAttribute>> for AttributeList {
    fn from(attrs: Vec<SaxAttribute>) -> Self {
        AttributeList { attrs }
    }
}

impl<'a> IntoIterator for &'a AttributeList {
    type Item = &'a SaxAttribute;
    type IntoIter = std::slice::Iter<'a, SaxAttribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attrs.iter()
    }
}

/// Receiver for the structural half of a SAX stream.
///
/// Every callback may fail; failures propagate back through the emitting
/// walk unchanged.
pub trait ContentHandler {
    fn start_document(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_prefix_mapping(&mut self, _prefix: &str, _uri: &str) -> Result<()> {
        Ok(())
    }

    fn end_prefix_mapping(&mut self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    fn start_element(&mut self, name: &QName, attributes: &AttributeList) -> Result<()>;

    fn end_element(&mut self, name: &QName) -> Result<()>;

    fn characters(&mut self, text: &str) -> Result<()>;

    fn processing_instruction(&mut self, _target: &str, _data: &str) -> Result<()> {
        Ok(())
    }
}

/// Receiver for the lexical half of a SAX stream (comments).
pub trait LexicalHandler {
    fn comment(&mut self, text: &str) -> Result<()>;
}

/// An owned SAX event, as recorded by [`EventCollector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaxEvent {
    StartDocument,
    EndDocument,
    StartPrefixMapping { prefix: String, uri: String },
    EndPrefixMapping { prefix: String },
    StartElement {
        name: QName,
        attributes: Vec<SaxAttribute>,
    },
    EndElement { name: QName },
    Characters(String),
    ProcessingInstruction { target: String, data: String },
    Comment(String),
}

impl SaxEvent {
    /// Check if this is a start element event.
    #[inline]
    pub fn is_start_element(&self) -> bool {
        matches!(self, SaxEvent::StartElement { .. })
    }

    /// Check if this is a characters event.
    #[inline]
    pub fn is_characters(&self) -> bool {
        matches!(self, SaxEvent::Characters(_))
    }

    /// Element name of a start or end element event.
    pub fn element_name(&self) -> Option<&QName> {
        match self {
            SaxEvent::StartElement { name, .. } => Some(name),
            SaxEvent::EndElement { name } => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_lookup() {
        let attrs = AttributeList::from(vec![
            SaxAttribute {
                name: QName::local("key"),
                value: "product_model".to_string(),
                attr_type: AttrType::Cdata,
            },
            SaxAttribute {
                name: QName::local("lang"),
                value: "en".to_string(),
                attr_type: AttrType::Cdata,
            },
        ]);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.value_of("key"), Some("product_model"));
        assert_eq!(attrs.value_of("missing"), None);
    }

    #[test]
    fn test_event_predicates() {
        let start = SaxEvent::StartElement {
            name: QName::local("a"),
            attributes: Vec::new(),
        };
        assert!(start.is_start_element());
        assert_eq!(start.element_name().unwrap().local_name(), "a");
        assert!(SaxEvent::Characters("x".to_string()).is_characters());
    }
}
