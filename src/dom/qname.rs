//! Qualified Names
//!
//! Immutable (namespace URI, local name, prefix) triple. Equality and
//! hashing consider only the URI and local name; the prefix is lexical
//! decoration and two names that differ only in prefix are the same name.

use std::fmt;
use std::hash::{Hash, Hasher};

use once_cell::sync::Lazy;

/// An immutable XML qualified name.
#[derive(Debug, Clone, Eq)]
pub struct QName {
    namespace_uri: String,
    local_name: String,
    prefix: Option<String>,
}

/// Stand-in name for text nodes, which carry no XML name.
pub static TEXT_QNAME: Lazy<QName> = Lazy::new(|| QName::new("", "#text", None));

/// Stand-in name for comment nodes.
pub static COMMENT_QNAME: Lazy<QName> = Lazy::new(|| QName::new("", "#comment", None));

impl QName {
    /// Create a qualified name from its three parts.
    pub fn new(
        namespace_uri: impl Into<String>,
        local_name: impl Into<String>,
        prefix: Option<&str>,
    ) -> Self {
        QName {
            namespace_uri: namespace_uri.into(),
            local_name: local_name.into(),
            prefix: prefix.map(str::to_string),
        }
    }

    /// Create a name in no namespace, without a prefix.
    pub fn local(local_name: impl Into<String>) -> Self {
        QName::new("", local_name, None)
    }

    /// Split a lexical qualified name (`prefix:local` or `local`) and attach
    /// the given namespace URI.
    pub fn from_qualified(qualified: &str, namespace_uri: &str) -> Self {
        match memchr::memchr(b':', qualified.as_bytes()) {
            Some(pos) => QName::new(
                namespace_uri,
                &qualified[pos + 1..],
                Some(&qualified[..pos]),
            ),
            None => QName::new(namespace_uri, qualified, None),
        }
    }

    /// The namespace URI; empty string for "no namespace".
    #[inline]
    pub fn namespace_uri(&self) -> &str {
        &self.namespace_uri
    }

    /// The local part of the name.
    #[inline]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The lexical prefix, if the name was written with one.
    #[inline]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Return a copy of this name carrying a different prefix.
    ///
    /// Names are values; the stored node's name field is replaced rather
    /// than mutated in place.
    pub fn with_prefix(&self, prefix: Option<&str>) -> Self {
        QName {
            namespace_uri: self.namespace_uri.clone(),
            local_name: self.local_name.clone(),
            prefix: prefix.map(str::to_string),
        }
    }

    /// Check whether this is the text stand-in name.
    #[inline]
    pub fn is_text(&self) -> bool {
        self == &*TEXT_QNAME
    }

    /// Check whether this is the comment stand-in name.
    #[inline]
    pub fn is_comment(&self) -> bool {
        self == &*COMMENT_QNAME
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace_uri == other.namespace_uri && self.local_name == other.local_name
    }
}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace_uri.hash(state);
        self.local_name.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) if !p.is_empty() => write!(f, "{}:{}", p, self.local_name),
            _ => f.write_str(&self.local_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(q: &QName) -> u64 {
        let mut h = DefaultHasher::new();
        q.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_equality_ignores_prefix() {
        let a = QName::new("urn:x", "item", Some("a"));
        let b = QName::new("urn:x", "item", Some("b"));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_inequality_on_uri() {
        let a = QName::new("urn:x", "item", None);
        let b = QName::new("urn:y", "item", None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_qualified() {
        let q = QName::from_qualified("svg:rect", "http://www.w3.org/2000/svg");
        assert_eq!(q.prefix(), Some("svg"));
        assert_eq!(q.local_name(), "rect");

        let plain = QName::from_qualified("rect", "");
        assert_eq!(plain.prefix(), None);
        assert_eq!(plain.local_name(), "rect");
    }

    #[test]
    fn test_with_prefix_is_a_new_value() {
        let q = QName::new("urn:x", "item", None);
        let p = q.with_prefix(Some("x"));
        assert_eq!(q.prefix(), None);
        assert_eq!(p.prefix(), Some("x"));
        assert_eq!(q, p);
    }

    #[test]
    fn test_singletons() {
        assert!(TEXT_QNAME.is_text());
        assert!(COMMENT_QNAME.is_comment());
        assert_ne!(&*TEXT_QNAME, &*COMMENT_QNAME);
    }

    #[test]
    fn test_display() {
        assert_eq!(QName::new("", "item", Some("x")).to_string(), "x:item");
        assert_eq!(QName::local("item").to_string(), "item");
    }
}
