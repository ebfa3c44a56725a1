//! XPath Value Types
//!
//! The four XPath 1.0 data types. Node sets carry GIDs; turning one into
//! a string means decoding the first node, so that coercion lives in
//! [`string_value`] where a document is available.

use crate::dom::document::Document;
use crate::error::Result;
use crate::storage::gid::Gid;

/// An XPath 1.0 value.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Value {
    /// A set of nodes, by GID, in document order
    NodeSet(Vec<Gid>),
    /// Boolean value
    Boolean(bool),
    /// Floating-point number
    Number(f64),
    /// String value
    String(String),
}

impl Value {
    /// Create an empty node set.
    pub fn empty_nodeset() -> Self {
        Value::NodeSet(Vec::new())
    }

    /// XPath `boolean()` coercion.
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::Boolean(b) => *b,
            Value::Number(n) => !n.is_nan() && *n != 0.0,
            Value::String(s) => !s.is_empty(),
        }
    }

    /// XPath `number()` coercion. Node sets have no string value without
    /// a document and coerce to NaN here.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::NodeSet(_) => f64::NAN,
            Value::Boolean(true) => 1.0,
            Value::Boolean(false) => 0.0,
            Value::Number(n) => *n,
            Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }

    /// XPath `string()` coercion.
    ///
    /// Node sets answer the empty string: their string value is the
    /// string value of the first node in document order, which requires
    /// decoding it. Callers holding a document use [`string_value`].
    pub fn to_string_value(&self) -> String {
        match self {
            Value::NodeSet(_) => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
        }
    }

    /// Check if this is a node set.
    pub fn is_nodeset(&self) -> bool {
        matches!(self, Value::NodeSet(_))
    }

    /// Get as node set, or None.
    pub fn as_nodeset(&self) -> Option<&Vec<Gid>> {
        match self {
            Value::NodeSet(nodes) => Some(nodes),
            _ => None,
        }
    }
}

/// Full XPath `string()` coercion, node sets included: the string value
/// of the first node of the set (in document order), decoded from the
/// given document.
pub fn string_value(value: &Value, doc: &Document) -> Result<String> {
    let Value::NodeSet(nodes) = value else {
        return Ok(value.to_string_value());
    };
    let Some(&first) = nodes.first() else {
        return Ok(String::new());
    };
    let node = doc.get_node(first)?;
    doc.string_value(&node)
}

/// XPath 1.0 number-to-string rules: integral values print without a
/// decimal point, NaN and the infinities by name.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == n.trunc() && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    format!("{}", n)
}

impl Default for Value {
    fn default() -> Self {
        Value::empty_nodeset()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Gid>> for Value {
    fn from(nodes: Vec<Gid>) -> Self {
        Value::NodeSet(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::dom::builder::DocumentBuilder;
    use crate::dom::document::DocId;
    use crate::dom::qname::QName;
    use crate::sax::{AttributeList, ContentHandler};
    use crate::storage::broker::MemoryBroker;

    #[test]
    fn test_boolean_coercion() {
        assert!(Value::from(vec![4u64]).to_boolean());
        assert!(!Value::empty_nodeset().to_boolean());
        assert!(!Value::Number(f64::NAN).to_boolean());
        assert!(!Value::Number(0.0).to_boolean());
        assert!(Value::Number(-0.5).to_boolean());
        assert!(Value::from("x").to_boolean());
        assert!(!Value::from("").to_boolean());
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(Value::from(true).to_number(), 1.0);
        assert_eq!(Value::from(" 42 ".to_string()).to_number(), 42.0);
        assert!(Value::from("forty-two").to_number().is_nan());
        assert!(Value::empty_nodeset().to_number().is_nan());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(Value::Number(42.0).to_string_value(), "42");
        assert_eq!(Value::Number(-3.25).to_string_value(), "-3.25");
        assert_eq!(Value::Number(f64::NAN).to_string_value(), "NaN");
        assert_eq!(Value::Number(f64::INFINITY).to_string_value(), "Infinity");
        assert_eq!(Value::Boolean(false).to_string_value(), "false");
    }

    #[test]
    fn test_nodeset_string_value_through_document() {
        let broker = Arc::new(MemoryBroker::new());
        let mut b = DocumentBuilder::new(DocId(1), "/db/test");
        b.start_element(&QName::local("greeting"), &AttributeList::empty())
            .unwrap();
        b.characters("hello").unwrap();
        b.end_element(&QName::local("greeting")).unwrap();
        let doc = b.finish(broker).unwrap();

        let set = Value::from(vec![1u64]);
        assert_eq!(string_value(&set, &doc).unwrap(), "hello");
        assert_eq!(string_value(&Value::empty_nodeset(), &doc).unwrap(), "");
        assert_eq!(set.to_string_value(), "", "no document, no string value");
    }
}
