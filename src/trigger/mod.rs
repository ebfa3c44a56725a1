//! Trigger Pipeline
//!
//! Triggers are SAX filters configured per collection: they sit in front
//! of the storage ingest path, observe the event stream and may rewrite
//! it before it reaches the document builder. Configuration parameters
//! arrive semi-structured (named lists of strings or nested parameter
//! maps), mirroring how collection configuration documents nest.

pub mod csv;

pub use csv::CsvExtractingTrigger;

use std::collections::HashMap;

use crate::dom::document::Document;
use crate::error::Result;
use crate::sax::{ContentHandler, LexicalHandler};
use crate::storage::broker::Broker;

/// Opaque transaction handle, passed through to triggers untouched. The
/// transaction layer owns its meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Txn(pub u64);

/// The collection event a trigger fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    Store,
    Update,
    Remove,
}

/// A single configuration parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A plain string value
    Text(String),
    /// A nested parameter map
    Nested(Parameters),
}

/// Named, ordered trigger parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    entries: HashMap<String, Vec<ParamValue>>,
}

impl Parameters {
    pub fn new() -> Self {
        Parameters {
            entries: HashMap::new(),
        }
    }

    /// Append a string value under `name`.
    pub fn add_text(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries
            .entry(name.into())
            .or_default()
            .push(ParamValue::Text(value.into()));
        self
    }

    /// Append a nested parameter map under `name`.
    pub fn add_nested(&mut self, name: impl Into<String>, nested: Parameters) -> &mut Self {
        self.entries
            .entry(name.into())
            .or_default()
            .push(ParamValue::Nested(nested));
        self
    }

    /// All values stored under `name`.
    pub fn get(&self, name: &str) -> &[ParamValue] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The single string value under `name`, if there is exactly one and
    /// it is a string.
    pub fn single_text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            [ParamValue::Text(value)] => Some(value),
            _ => None,
        }
    }
}

/// A document trigger: configured once per collection, then driven as a
/// SAX filter for each document event.
pub trait DocumentTrigger: ContentHandler + LexicalHandler {
    /// Validate and absorb the collection configuration. Malformed
    /// parameters abort the collection configuration.
    fn configure(
        &mut self,
        broker: &dyn Broker,
        collection: &str,
        parameters: &Parameters,
    ) -> Result<()>;

    /// Called before the document event is processed.
    fn prepare(
        &mut self,
        event: TriggerEvent,
        broker: &dyn Broker,
        txn: &Txn,
        document_path: &str,
        existing: Option<&Document>,
    ) -> Result<()>;

    /// Called after the document event completed.
    fn finish(
        &mut self,
        event: TriggerEvent,
        broker: &dyn Broker,
        txn: &Txn,
        document_path: &str,
        document: Option<&Document>,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_lookup() {
        let mut p = Parameters::new();
        p.add_text("separator", "|");
        assert_eq!(p.single_text("separator"), Some("|"));
        assert_eq!(p.single_text("missing"), None);
        assert!(p.get("missing").is_empty());
    }

    #[test]
    fn test_single_text_rejects_lists_and_nesting() {
        let mut p = Parameters::new();
        p.add_text("separator", "|");
        p.add_text("separator", ",");
        assert_eq!(p.single_text("separator"), None, "two values are not one");

        let mut q = Parameters::new();
        q.add_nested("separator", Parameters::new());
        assert_eq!(q.single_text("separator"), None);
    }
}
