//! xyledb - Native XML database storage core
//!
//! Represents XML documents as node records in an append-oriented page
//! store, reconstructs DOM navigation from a single integer identifier
//! per node, and round-trips individual nodes through a tagged byte
//! format:
//!
//! - `storage::gid`: level-indexed addressing - parent, sibling and child
//!   queries answered by integer arithmetic over a per-document fan-out
//!   table
//! - `storage::codec`: the on-disk `[signature | payload]` record format
//! - `storage::broker`: the page-store interface (and an in-memory one)
//! - `dom`: node records, qualified names, symbol table, document model
//!   and the SAX ingest builder
//! - `sax`: the event boundary the core consumes and exposes
//! - `trigger`: ingest-time SAX filters (CSV value extraction)
//! - `xpath`: value model and the axis-free function surface
//!
//! Ingest flows SAX events through the trigger pipeline into the
//! builder, which assigns GIDs and appends serialized records to the
//! broker; queries go the other way, decoding byte spans on demand.

pub mod dom;
pub mod error;
pub mod sax;
pub mod storage;
pub mod trigger;
pub mod xpath;

pub use dom::{
    DocId, Document, DocumentBuilder, DocumentRegistry, NodeKind, NodeRead, QName, StoredNode,
};
pub use error::{Error, Result};
pub use storage::{Broker, Gid, InternalAddress, LevelOrder, MemoryBroker, NodeProxy};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::dom::node::AttrType;
    use crate::sax::{AttributeList, ContentHandler, SaxAttribute, XmlWriter};
    use crate::trigger::{CsvExtractingTrigger, DocumentTrigger, Parameters};
    use crate::{DocumentBuilder, MemoryBroker, NodeKind, QName};

    /// Ingest with the CSV trigger filtering in front of the document
    /// builder - the full write path, SAX to page store.
    #[test]
    fn test_trigger_feeds_builder_end_to_end() {
        let broker = Arc::new(MemoryBroker::new());

        let mut path = Parameters::new();
        path.add_text("xpath", "/content/properties/value[@key eq \"product_model\"]");
        let mut first = Parameters::new();
        first.add_text("index", "0");
        first.add_text("element-name", "product_name");
        path.add_nested("extract", first);
        let mut second = Parameters::new();
        second.add_text("index", "1");
        second.add_text("element-name", "product_code");
        path.add_nested("extract", second);
        let mut params = Parameters::new();
        params.add_text("separator", "|");
        params.add_nested("path", path);

        let builder = DocumentBuilder::new(crate::DocId(1), "/db/products");
        let mut pipeline = CsvExtractingTrigger::new(builder);
        pipeline
            .configure(broker.as_ref(), "/db/products", &params)
            .unwrap();

        pipeline
            .start_element(&QName::local("content"), &AttributeList::empty())
            .unwrap();
        pipeline
            .start_element(&QName::local("properties"), &AttributeList::empty())
            .unwrap();
        pipeline
            .start_element(
                &QName::local("value"),
                &AttributeList::from(vec![SaxAttribute {
                    name: QName::local("key"),
                    value: "product_model".to_string(),
                    attr_type: AttrType::Cdata,
                }]),
            )
            .unwrap();
        pipeline.characters("SomeName|SomeCode12345").unwrap();
        pipeline.end_element(&QName::local("value")).unwrap();
        pipeline.end_element(&QName::local("properties")).unwrap();
        pipeline.end_element(&QName::local("content")).unwrap();

        let doc = pipeline.into_output().finish(broker).unwrap();

        // The separated values landed as stored child elements.
        let root = doc.root_element().unwrap().unwrap();
        let value = doc
            .get_node(root.gid())
            .and_then(|n| n.first_child(&doc))
            .unwrap()
            .unwrap()
            .first_child(&doc)
            .unwrap()
            .unwrap();
        assert_eq!(value.name().local_name(), "value");
        let children = value.child_nodes(&doc).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name().local_name(), "product_name");
        assert_eq!(doc.string_value(&children[0]).unwrap(), "SomeName");
        assert_eq!(children[1].name().local_name(), "product_code");
        assert_eq!(doc.string_value(&children[1]).unwrap(), "SomeCode12345");
        assert!(children
            .iter()
            .all(|c| c.kind() == NodeKind::Element));

        // And the document serializes back with the extraction applied.
        let mut writer = XmlWriter::new();
        doc.to_sax(&mut writer, None).unwrap();
        assert_eq!(
            writer.as_str(),
            "<content><properties><value key=\"product_model\">\
             <product_name>SomeName</product_name>\
             <product_code>SomeCode12345</product_code>\
             </value></properties></content>"
        );
    }
}
