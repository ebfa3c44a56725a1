//! Symbol Table
//!
//! Per-document interning of qualified names. Element and attribute
//! payloads store a 32-bit name reference instead of the name itself;
//! this table maps between the two. Append-only during ingest, read-only
//! during query, and persisted as part of the document metadata.

use std::collections::HashMap;

use crate::dom::qname::QName;
use crate::error::{Error, Result};
use crate::storage::codec::wire;

/// Interning table mapping qualified names to 32-bit references.
///
/// Reference 0 is reserved for "no name"; real entries start at 1. Two
/// names that differ only in prefix intern to the same reference (name
/// equality ignores the prefix).
#[derive(Debug, Clone)]
pub struct SymbolTable {
    /// Entry 0 is the reserved empty name
    entries: Vec<QName>,
    /// Name -> reference
    index: HashMap<QName, u32>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        SymbolTable {
            entries: vec![QName::local("")],
            index: HashMap::new(),
        }
    }

    /// Intern a name, returning its reference.
    ///
    /// Returns the existing reference if the name was seen before.
    pub fn intern(&mut self, name: &QName) -> u32 {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.entries.len() as u32;
        self.entries.push(name.clone());
        self.index.insert(name.clone(), id);
        id
    }

    /// Resolve a reference back to its name.
    pub fn lookup(&self, name_ref: u32) -> Option<&QName> {
        if name_ref == 0 {
            return None;
        }
        self.entries.get(name_ref as usize)
    }

    /// Resolve a reference, failing on dangling references from corrupt
    /// payloads.
    pub fn resolve(&self, name_ref: u32) -> Result<&QName> {
        self.lookup(name_ref).ok_or(Error::SymbolNotFound(name_ref))
    }

    /// Number of interned names, the reserved entry excluded.
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    /// Check whether any names have been interned.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Append the table to a metadata buffer.
    pub fn encode(&self, out: &mut Vec<u8>) {
        wire::put_u32(out, self.len() as u32);
        for name in &self.entries[1..] {
            wire::put_str(out, name.namespace_uri());
            wire::put_str(out, name.local_name());
            wire::put_str(out, name.prefix().unwrap_or(""));
        }
    }

    /// Read a table back from a metadata buffer.
    pub fn decode(data: &[u8], pos: &mut usize) -> Result<Self> {
        let count = wire::get_u32(data, pos)
            .ok_or(Error::InvalidMetadata("symbol table count"))? as usize;
        let mut table = SymbolTable::new();
        for _ in 0..count {
            let uri = wire::get_str(data, pos).ok_or(Error::InvalidMetadata("symbol uri"))?;
            let local = wire::get_str(data, pos).ok_or(Error::InvalidMetadata("symbol name"))?;
            let prefix = wire::get_str(data, pos).ok_or(Error::InvalidMetadata("symbol prefix"))?;
            let prefix = if prefix.is_empty() {
                None
            } else {
                Some(prefix.as_str())
            };
            // Insert positionally so references survive the round trip even
            // for prefix-only variants of an existing name.
            let name = QName::new(uri, local, prefix);
            let id = table.entries.len() as u32;
            table.entries.push(name.clone());
            table.index.entry(name).or_insert(id);
        }
        Ok(table)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_lookup() {
        let mut t = SymbolTable::new();
        let id = t.intern(&QName::local("item"));
        assert!(id > 0);
        assert_eq!(t.lookup(id).unwrap().local_name(), "item");
    }

    #[test]
    fn test_intern_duplicate() {
        let mut t = SymbolTable::new();
        let a = t.intern(&QName::new("urn:x", "item", None));
        let b = t.intern(&QName::new("urn:x", "item", Some("x")));
        assert_eq!(a, b, "prefix variants intern to the same reference");
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_reserved_reference() {
        let t = SymbolTable::new();
        assert!(t.lookup(0).is_none());
        assert!(t.resolve(0).is_err());
        assert!(t.is_empty());
    }

    #[test]
    fn test_dangling_reference() {
        let t = SymbolTable::new();
        assert_eq!(t.resolve(7), Err(Error::SymbolNotFound(7)));
    }

    #[test]
    fn test_metadata_round_trip() {
        let mut t = SymbolTable::new();
        let a = t.intern(&QName::new("urn:x", "item", Some("x")));
        let b = t.intern(&QName::local("value"));

        let mut buf = Vec::new();
        t.encode(&mut buf);
        let mut pos = 0;
        let back = SymbolTable::decode(&buf, &mut pos).unwrap();
        assert_eq!(pos, buf.len());
        assert_eq!(back.len(), 2);
        assert_eq!(back.lookup(a).unwrap().local_name(), "item");
        assert_eq!(back.lookup(a).unwrap().prefix(), Some("x"));
        assert_eq!(back.lookup(b).unwrap().local_name(), "value");
    }
}
