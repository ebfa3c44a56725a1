//! Document Ingest
//!
//! Builds a stored document from SAX events in two phases: the handler
//! callbacks record a transient event tree and the per-level branching it
//! exhibits; `finish` then derives the level order table, assigns GIDs
//! depth-first (attributes occupy the leading child slots), serializes
//! every record through the codec and appends it to the broker in
//! document order.
//!
//! The order table is fixed at this point and persisted with the
//! document; a fixed table handed in up front makes ingest reject any
//! document whose branching overflows it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::dom::document::{DocId, Document};
use crate::dom::node::StoredNode;
use crate::dom::qname::QName;
use crate::dom::symbols::SymbolTable;
use crate::error::{Error, Result};
use crate::sax::{AttributeList, ContentHandler, LexicalHandler, SaxAttribute};
use crate::storage::broker::{Broker, InternalAddress};
use crate::storage::codec;
use crate::storage::gid::{Gid, LevelOrder};

/// Transient node recorded during the SAX phase.
#[derive(Debug)]
enum TransientNode {
    Element {
        name: QName,
        attrs: Vec<SaxAttribute>,
        children: Vec<usize>,
    },
    Text(String),
    Comment(String),
    Pi { target: String, data: String },
}

impl TransientNode {
    fn slot_count(&self) -> u64 {
        match self {
            TransientNode::Element { attrs, children, .. } => {
                attrs.len() as u64 + children.len() as u64
            }
            _ => 0,
        }
    }
}

/// SAX-driven document builder.
pub struct DocumentBuilder {
    id: DocId,
    collection: String,
    fixed_order: Option<Vec<u64>>,
    slack: u64,
    nodes: Vec<TransientNode>,
    /// Open element indices
    stack: Vec<usize>,
    /// Document-level node indices
    top_level: Vec<usize>,
    /// Coalesces split `characters` callbacks into one text node
    pending_text: String,
}

impl DocumentBuilder {
    /// Create a builder for a document in the given collection.
    pub fn new(id: DocId, collection: impl Into<String>) -> Self {
        DocumentBuilder {
            id,
            collection: collection.into(),
            fixed_order: None,
            slack: 0,
            nodes: Vec::with_capacity(64),
            stack: Vec::with_capacity(16),
            top_level: Vec::new(),
            pending_text: String::new(),
        }
    }

    /// Fix the order table up front instead of observing it. Ingest then
    /// fails with `OverflowingLevel` if the document branches wider.
    pub fn with_order_table(mut self, order: Vec<u64>) -> Self {
        self.fixed_order = Some(order);
        self
    }

    /// Additive headroom on every observed fan-out, leaving unassigned
    /// GID slots for documents that may grow through higher layers.
    pub fn slack(mut self, slack: u64) -> Self {
        self.slack = slack;
        self
    }

    fn flush_text(&mut self) {
        if self.pending_text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending_text);
        let idx = self.nodes.len();
        self.nodes.push(TransientNode::Text(text));
        self.attach(idx);
    }

    fn attach(&mut self, idx: usize) {
        match self.stack.last() {
            Some(&parent) => {
                if let TransientNode::Element { children, .. } = &mut self.nodes[parent] {
                    children.push(idx);
                }
            }
            None => self.top_level.push(idx),
        }
    }

    /// Consume the recorded events: derive the order table, assign GIDs
    /// and write every record to the broker.
    pub fn finish(mut self, broker: Arc<dyn Broker>) -> Result<Document> {
        self.flush_text();
        if self.top_level.is_empty() {
            return Err(Error::EmptyDocument);
        }

        // Phase 2a: tree depth and the branching per level.
        let mut observed: Vec<u64> = Vec::new();
        let mut max_depth = 0usize;
        for &top in &self.top_level {
            measure(&self.nodes, top, 0, &mut observed, &mut max_depth);
        }

        // Phase 2b: the order table, fixed or observed.
        let order = match self.fixed_order.take() {
            Some(fixed) => {
                for (level, &branching) in observed.iter().enumerate() {
                    if branching == 0 {
                        continue;
                    }
                    let allowed = fixed.get(level).copied().unwrap_or(0);
                    if branching > allowed {
                        return Err(Error::OverflowingLevel {
                            level,
                            order: allowed,
                            observed: branching,
                        });
                    }
                }
                fixed
            }
            None => {
                let mut order = Vec::with_capacity(max_depth + 1);
                for level in 0..=max_depth {
                    let branching = observed.get(level).copied().unwrap_or(0);
                    order.push(branching.max(1) + self.slack);
                }
                order
            }
        };
        let order = LevelOrder::with_document_fanout(order, self.top_level.len() as u64)?;

        // Phase 2c: GID assignment and record serialization, depth-first.
        let mut symbols = SymbolTable::new();
        let mut records: Vec<(Gid, InternalAddress)> = Vec::with_capacity(self.nodes.len());
        let mut top_gids = Vec::with_capacity(self.top_level.len());
        let level_start = match order.level_start(0) {
            Some(start) => start,
            None => return Err(Error::EmptyDocument),
        };
        for (slot, &top) in self.top_level.iter().enumerate() {
            let gid = level_start + slot as u64;
            top_gids.push(gid);
            persist(
                &self.nodes,
                top,
                gid,
                &order,
                &mut symbols,
                broker.as_ref(),
                &mut records,
            )?;
        }

        debug!(
            doc = %self.id,
            nodes = records.len(),
            depth = max_depth,
            "document ingested"
        );
        Ok(Document::assemble(
            self.id,
            self.collection,
            order,
            symbols,
            broker,
            records,
            top_gids,
        ))
    }
}

/// Record the tree depth and the widest slot usage per level.
fn measure(
    nodes: &[TransientNode],
    idx: usize,
    level: usize,
    observed: &mut Vec<u64>,
    max_depth: &mut usize,
) {
    *max_depth = (*max_depth).max(level);
    let slots = nodes[idx].slot_count();
    if slots > 0 {
        if observed.len() <= level {
            observed.resize(level + 1, 0);
        }
        observed[level] = observed[level].max(slots);
    }
    if let TransientNode::Element { children, .. } = &nodes[idx] {
        for &child in children {
            measure(nodes, child, level + 1, observed, max_depth);
        }
    }
}

/// Serialize a subtree in document order, assigning child GIDs from the
/// node's slot window: attributes first, content children after.
fn persist(
    nodes: &[TransientNode],
    idx: usize,
    gid: Gid,
    order: &LevelOrder,
    symbols: &mut SymbolTable,
    broker: &dyn Broker,
    records: &mut Vec<(Gid, InternalAddress)>,
) -> Result<()> {
    match &nodes[idx] {
        TransientNode::Text(text) => {
            append(records, broker, gid, &StoredNode::text(text.as_bytes()))?;
        }
        TransientNode::Comment(text) => {
            append(records, broker, gid, &StoredNode::comment(text.clone()))?;
        }
        TransientNode::Pi { target, data } => {
            append(
                records,
                broker,
                gid,
                &StoredNode::processing_instruction(target.clone(), data.clone()),
            )?;
        }
        TransientNode::Element {
            name,
            attrs,
            children,
        } => {
            let attr_count = u8::try_from(attrs.len())
                .map_err(|_| Error::RecordLimit("more than 255 attributes on one element"))?;
            let child_count = attrs.len() as u32 + children.len() as u32;
            let mut element = StoredNode::element(name.clone(), attr_count, child_count);
            element.set_name_ref(symbols.intern(name));
            append(records, broker, gid, &element)?;

            if child_count > 0 {
                let first = order
                    .first_child(gid)
                    .ok_or(Error::InvalidMetadata("order table too shallow for stored children"))?;
                for (slot, attr) in attrs.iter().enumerate() {
                    let mut node =
                        StoredNode::attribute(attr.name.clone(), attr.value.clone(), attr.attr_type);
                    node.set_name_ref(symbols.intern(&attr.name));
                    append(records, broker, first + slot as u64, &node)?;
                }
                let content_base = first + attrs.len() as u64;
                for (slot, &child) in children.iter().enumerate() {
                    persist(
                        nodes,
                        child,
                        content_base + slot as u64,
                        order,
                        symbols,
                        broker,
                        records,
                    )?;
                }
            }
        }
    }
    Ok(())
}

fn append(
    records: &mut Vec<(Gid, InternalAddress)>,
    broker: &dyn Broker,
    gid: Gid,
    node: &StoredNode,
) -> Result<()> {
    let bytes = codec::serialize(node)?;
    let address = broker.append(&bytes)?;
    records.push((gid, address));
    Ok(())
}

impl ContentHandler for DocumentBuilder {
    fn start_element(&mut self, name: &QName, attributes: &AttributeList) -> Result<()> {
        self.flush_text();
        let idx = self.nodes.len();
        self.nodes.push(TransientNode::Element {
            name: name.clone(),
            attrs: attributes.iter().cloned().collect(),
            children: Vec::new(),
        });
        self.attach(idx);
        self.stack.push(idx);
        Ok(())
    }

    fn end_element(&mut self, _name: &QName) -> Result<()> {
        self.flush_text();
        self.stack.pop();
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if self.stack.is_empty() {
            // Character data outside the root element; only whitespace is
            // legal there and neither is stored.
            if !text.trim().is_empty() {
                warn!(doc = %self.id, "dropping character data outside the root element");
            }
            return Ok(());
        }
        self.pending_text.push_str(text);
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.flush_text();
        let idx = self.nodes.len();
        self.nodes.push(TransientNode::Pi {
            target: target.to_string(),
            data: data.to_string(),
        });
        self.attach(idx);
        Ok(())
    }
}

impl LexicalHandler for DocumentBuilder {
    fn comment(&mut self, text: &str) -> Result<()> {
        self.flush_text();
        let idx = self.nodes.len();
        self.nodes.push(TransientNode::Comment(text.to_string()));
        self.attach(idx);
        Ok(())
    }
}
