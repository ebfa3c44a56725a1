//! Document Model
//!
//! A document owns its level order table, its symbol table, the gid to
//! address map and an LRU over fetched byte spans. Node records hold only
//! a weak document id; every navigation query comes back here, where GID
//! arithmetic picks the slot and the codec decodes the bytes on demand.
//!
//! Construction happens two ways: the ingest builder assembles a fresh
//! document from SAX events, or `from_metadata` restores one persisted
//! earlier against a broker that still holds its records.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::dom::node::{NodeKind, NodePool, NodePayload, StoredNode};
use crate::dom::symbols::SymbolTable;
use crate::error::{Error, Result};
use crate::storage::broker::{Broker, InternalAddress, NodeProxy, RecordCursor};
use crate::storage::codec::{self, wire};
use crate::storage::gid::{Gid, LevelOrder};
use crate::sax::{ContentHandler, LexicalHandler};

/// Weak handle to a document in a [`DocumentRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub u32);

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Decoded byte spans kept per document.
const SPAN_CACHE_CAPACITY: usize = 256;

/// Version tag of the persisted metadata layout.
const METADATA_VERSION: u8 = 1;

/// A stored XML document.
pub struct Document {
    id: DocId,
    collection: String,
    order: LevelOrder,
    symbols: SymbolTable,
    broker: Arc<dyn Broker>,
    /// (gid, address) pairs in document order
    records: Vec<(Gid, InternalAddress)>,
    /// gid -> index into `records`
    by_gid: BTreeMap<Gid, usize>,
    /// gid -> fetched byte span
    cache: Mutex<LruCache<Gid, Arc<[u8]>>>,
    /// Document-level children (root element, plus comments and
    /// processing instructions outside it) in document order
    top_level: Vec<Gid>,
}

impl Document {
    /// Assemble a document from its parts. Used by the ingest builder and
    /// the metadata loader.
    pub(crate) fn assemble(
        id: DocId,
        collection: String,
        order: LevelOrder,
        symbols: SymbolTable,
        broker: Arc<dyn Broker>,
        records: Vec<(Gid, InternalAddress)>,
        top_level: Vec<Gid>,
    ) -> Self {
        let by_gid = records
            .iter()
            .enumerate()
            .map(|(i, &(gid, _))| (gid, i))
            .collect();
        Document {
            id,
            collection,
            order,
            symbols,
            broker,
            records,
            by_gid,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(SPAN_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
            top_level,
        }
    }

    #[inline]
    pub fn id(&self) -> DocId {
        self.id
    }

    /// Path of the collection this document belongs to.
    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[inline]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    #[inline]
    pub fn order(&self) -> &LevelOrder {
        &self.order
    }

    /// Number of stored node records.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.records.len()
    }

    /// Document-level children in document order.
    #[inline]
    pub fn top_level(&self) -> &[Gid] {
        &self.top_level
    }

    // ------------------------------------------------------------------
    // Level arithmetic wrappers
    // ------------------------------------------------------------------

    /// Tree level of a GID.
    #[inline]
    pub fn tree_level(&self, gid: Gid) -> Option<usize> {
        self.order.tree_level(gid)
    }

    /// First GID of a level.
    #[inline]
    pub fn level_start(&self, level: usize) -> Option<Gid> {
        self.order.level_start(level)
    }

    /// Configured fan-out at a level.
    #[inline]
    pub fn level_order(&self, level: usize) -> Option<u64> {
        self.order.level_order(level)
    }

    /// Parent GID, or `None` when the parent is the document itself.
    #[inline]
    pub fn parent_gid(&self, gid: Gid) -> Option<Gid> {
        self.order.parent(gid)
    }

    // ------------------------------------------------------------------
    // Node access
    // ------------------------------------------------------------------

    /// Decode the node stored under `gid`.
    pub fn get_node(&self, gid: Gid) -> Result<StoredNode> {
        let (bytes, address) = self.fetch_span(gid)?;
        let mut node = codec::deserialize(&bytes, self.id, &self.symbols)?;
        node.set_gid(gid);
        node.set_address(address);
        Ok(node)
    }

    /// Address of the record stored under `gid`.
    pub fn address_of(&self, gid: Gid) -> Result<InternalAddress> {
        let idx = *self.by_gid.get(&gid).ok_or(Error::UnknownGid(gid))?;
        Ok(self.records[idx].1)
    }

    /// Whether a record exists under `gid`.
    #[inline]
    pub fn contains(&self, gid: Gid) -> bool {
        self.by_gid.contains_key(&gid)
    }

    fn fetch_span(&self, gid: Gid) -> Result<(Arc<[u8]>, InternalAddress)> {
        let address = self.address_of(gid)?;
        if let Some(bytes) = self.cache.lock().get(&gid) {
            return Ok((Arc::clone(bytes), address));
        }
        trace!(doc = %self.id, gid, "page store fetch");
        let bytes: Arc<[u8]> = self.broker.fetch(address)?.into();
        self.cache.lock().put(gid, Arc::clone(&bytes));
        Ok((bytes, address))
    }

    /// The root element of the document.
    pub fn root_element(&self) -> Result<Option<StoredNode>> {
        for &gid in &self.top_level {
            let node = self.get_node(gid)?;
            if node.kind() == NodeKind::Element {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Sibling navigation
    // ------------------------------------------------------------------

    /// Preceding sibling of a node. Document-level nodes scan the ordered
    /// top-level list; deeper nodes use GID arithmetic.
    pub fn previous_sibling_of(&self, node: &StoredNode) -> Result<Option<StoredNode>> {
        let gid = node.gid();
        match self.order.tree_level(gid) {
            Some(0) => {
                let Some(pos) = self.top_level.iter().position(|&g| g == gid) else {
                    return Ok(None);
                };
                match pos.checked_sub(1) {
                    Some(prev) => Ok(Some(self.get_node(self.top_level[prev])?)),
                    None => Ok(None),
                }
            }
            Some(_) => match self.order.previous_sibling(gid) {
                Some(prev) if self.contains(prev) => Ok(Some(self.get_node(prev)?)),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Following sibling of a node; see
    /// [`previous_sibling_of`](Self::previous_sibling_of).
    pub fn following_sibling_of(&self, node: &StoredNode) -> Result<Option<StoredNode>> {
        let gid = node.gid();
        match self.order.tree_level(gid) {
            Some(0) => {
                let Some(pos) = self.top_level.iter().position(|&g| g == gid) else {
                    return Ok(None);
                };
                match self.top_level.get(pos + 1) {
                    Some(&next) => Ok(Some(self.get_node(next)?)),
                    None => Ok(None),
                }
            }
            Some(_) => match self.order.next_sibling(gid) {
                // The window may be wider than the actual child list;
                // only occupied slots count.
                Some(next) if self.contains(next) => Ok(Some(self.get_node(next)?)),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// GIDs of an element's content children (attribute slots skipped).
    pub fn child_gids(&self, node: &StoredNode) -> Result<Vec<Gid>> {
        if node.slot_count() == 0 {
            return Ok(Vec::new());
        }
        let first = self.occupied_window_start(node)?;
        let from = first + node.attributes_count() as u64;
        let to = first + node.slot_count() as u64;
        Ok((from..to).collect())
    }

    /// GIDs of an element's attribute children.
    pub fn attribute_gids(&self, node: &StoredNode) -> Result<Vec<Gid>> {
        if node.attributes_count() == 0 {
            return Ok(Vec::new());
        }
        let first = self.occupied_window_start(node)?;
        let to = first + node.attributes_count() as u64;
        Ok((first..to).collect())
    }

    fn occupied_window_start(&self, node: &StoredNode) -> Result<Gid> {
        self.order
            .first_child(node.gid())
            .ok_or(Error::InvalidMetadata("order table too shallow for stored children"))
    }

    // ------------------------------------------------------------------
    // Document-order iteration
    // ------------------------------------------------------------------

    /// Lazy decoded walk over this document's records in document order,
    /// starting at `proxy`. The sequence is finite and not restartable;
    /// use [`NodeIterator::seek`] to jump to another GID.
    pub fn node_iterator(&self, proxy: NodeProxy) -> Result<NodeIterator<'_>> {
        let address = if proxy.address.is_null() {
            self.address_of(proxy.gid)?
        } else {
            proxy.address
        };
        Ok(NodeIterator {
            doc: self,
            cursor: self.broker.cursor(address)?,
            pool: NodePool::new(),
        })
    }

    /// Rightmost deepest descendant of `node`, found by a depth-first
    /// walk over the record stream. Higher layers use this to locate the
    /// end of a subtree's byte range.
    pub fn last_descendant(&self, node: &StoredNode) -> Result<StoredNode> {
        if !node.has_children() {
            return Ok(node.clone());
        }
        let proxy = NodeProxy::new(self.id, node.gid(), node.address());
        let mut iter = self.node_iterator(proxy)?;
        // The cursor stands on the node itself; step past it.
        match iter.next_node()? {
            Some(own) => iter.recycle(own),
            None => {
                return Err(Error::TruncatedSubtree { gid: node.gid() });
            }
        }
        self.last_node(&mut iter, node.clone())
    }

    /// Depth-first descent over an already positioned iterator, assigning
    /// GIDs from the arithmetic as the record stream is consumed. The
    /// iterator must stand on the record after `node`.
    pub fn last_node(&self, iter: &mut NodeIterator<'_>, node: StoredNode) -> Result<StoredNode> {
        if !node.has_children() {
            return Ok(node);
        }
        let first = self.occupied_window_start(&node)?;
        let end = first + node.slot_count() as u64;
        let mut last: Option<StoredNode> = None;
        for gid in first..end {
            let mut next = match iter.next_node()? {
                Some(n) => n,
                None => return Err(Error::TruncatedSubtree { gid }),
            };
            next.set_gid(gid);
            let deep = self.last_node(iter, next)?;
            if let Some(done) = last.replace(deep) {
                iter.recycle(done);
            }
        }
        iter.recycle(node);
        match last {
            Some(n) => Ok(n),
            None => Err(Error::TruncatedSubtree { gid: first }),
        }
    }

    // ------------------------------------------------------------------
    // String value and SAX serialization
    // ------------------------------------------------------------------

    /// XPath string-value of a node: for elements, the concatenated text
    /// descendants; for every other kind, the node value.
    pub fn string_value(&self, node: &StoredNode) -> Result<String> {
        match node.kind() {
            NodeKind::Element => {
                let mut out = String::new();
                self.collect_text(node, &mut out)?;
                Ok(out)
            }
            _ => Ok(node.node_value().into_owned()),
        }
    }

    fn collect_text(&self, node: &StoredNode, out: &mut String) -> Result<()> {
        for child in node.child_nodes(self)? {
            match child.payload() {
                NodePayload::Text(data) => out.push_str(&String::from_utf8_lossy(data)),
                NodePayload::Element { .. } => self.collect_text(&child, out)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Re-emit the whole document as SAX events.
    pub fn to_sax(
        &self,
        content: &mut dyn ContentHandler,
        lexical: Option<&mut dyn LexicalHandler>,
    ) -> Result<()> {
        content.start_document()?;
        let mut lexical = lexical;
        for &gid in &self.top_level {
            let node = self.get_node(gid)?;
            lexical = node.to_sax_threaded(self, content, lexical, true)?;
        }
        content.end_document()
    }

    // ------------------------------------------------------------------
    // Metadata persistence
    // ------------------------------------------------------------------

    /// Encode everything needed to reopen this document against the same
    /// broker: id, collection path, order table, symbol table, the gid to
    /// address map and the top-level child list.
    pub fn encode_metadata(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.push(METADATA_VERSION);
        wire::put_u32(&mut out, self.id.0);
        wire::put_str(&mut out, &self.collection);
        wire::put_u64(&mut out, self.order.document_fanout());
        wire::put_u16(&mut out, self.order.order_table().len() as u16);
        for &fanout in self.order.order_table() {
            wire::put_u64(&mut out, fanout);
        }
        self.symbols.encode(&mut out);
        wire::put_u32(&mut out, self.records.len() as u32);
        for &(gid, address) in &self.records {
            wire::put_u64(&mut out, gid);
            wire::put_i64(&mut out, address.raw());
        }
        wire::put_u32(&mut out, self.top_level.len() as u32);
        for &gid in &self.top_level {
            wire::put_u64(&mut out, gid);
        }
        out
    }

    /// Reopen a persisted document against a broker.
    pub fn from_metadata(data: &[u8], broker: Arc<dyn Broker>) -> Result<Self> {
        let mut pos = 0usize;
        let version = *data.first().ok_or(Error::InvalidMetadata("empty"))?;
        pos += 1;
        if version != METADATA_VERSION {
            return Err(Error::InvalidMetadata("unknown version"));
        }
        let id = wire::get_u32(data, &mut pos).ok_or(Error::InvalidMetadata("doc id"))?;
        let collection =
            wire::get_str(data, &mut pos).ok_or(Error::InvalidMetadata("collection"))?;
        let doc_fanout =
            wire::get_u64(data, &mut pos).ok_or(Error::InvalidMetadata("document fanout"))?;
        let order_len =
            wire::get_u16(data, &mut pos).ok_or(Error::InvalidMetadata("order length"))? as usize;
        let mut order = Vec::with_capacity(order_len);
        for _ in 0..order_len {
            order.push(wire::get_u64(data, &mut pos).ok_or(Error::InvalidMetadata("order entry"))?);
        }
        let order = LevelOrder::with_document_fanout(order, doc_fanout)?;
        let symbols = SymbolTable::decode(data, &mut pos)?;
        let record_count =
            wire::get_u32(data, &mut pos).ok_or(Error::InvalidMetadata("record count"))? as usize;
        let mut records = Vec::with_capacity(record_count);
        for _ in 0..record_count {
            let gid = wire::get_u64(data, &mut pos).ok_or(Error::InvalidMetadata("record gid"))?;
            let raw =
                wire::get_i64(data, &mut pos).ok_or(Error::InvalidMetadata("record address"))?;
            records.push((gid, InternalAddress::from_raw(raw)));
        }
        let top_count =
            wire::get_u32(data, &mut pos).ok_or(Error::InvalidMetadata("top-level count"))? as usize;
        let mut top_level = Vec::with_capacity(top_count);
        for _ in 0..top_count {
            top_level
                .push(wire::get_u64(data, &mut pos).ok_or(Error::InvalidMetadata("top-level gid"))?);
        }
        debug!(doc = id, nodes = record_count, "document reopened from metadata");
        Ok(Document::assemble(
            DocId(id),
            collection,
            order,
            symbols,
            broker,
            records,
            top_level,
        ))
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("collection", &self.collection)
            .field("nodes", &self.records.len())
            .finish()
    }
}

/// Lazy decoded sequence of a document's records in document order.
///
/// Finite and forward-only; `seek` starts over from another GID. Consumed
/// records can be handed back through `recycle` so the walk reuses them
/// instead of allocating per node.
pub struct NodeIterator<'a> {
    doc: &'a Document,
    cursor: Box<dyn RecordCursor + 'a>,
    pool: NodePool,
}

impl NodeIterator<'_> {
    /// Decode the next record. The GID is left unassigned (0); callers
    /// that know the walk order stamp it themselves.
    pub fn next_node(&mut self) -> Result<Option<StoredNode>> {
        match self.cursor.next_record() {
            None => Ok(None),
            Some(item) => {
                let (address, bytes) = item?;
                let mut node = self.pool.acquire();
                codec::deserialize_into(&mut node, &bytes, self.doc.id, &self.doc.symbols)?;
                node.set_address(address);
                Ok(Some(node))
            }
        }
    }

    /// Reposition the sequence onto the record stored under `gid`.
    pub fn seek(&mut self, gid: Gid) -> Result<()> {
        let address = self.doc.address_of(gid)?;
        self.cursor = self.doc.broker.cursor(address)?;
        Ok(())
    }

    /// Return a consumed record for reuse.
    pub fn recycle(&mut self, node: StoredNode) {
        self.pool.release(node);
    }
}

/// Per-process registry giving documents stable weak ids.
///
/// Node records refer to their owner through a [`DocId`] index into this
/// registry rather than a strong reference; dropping the document here is
/// what destroys it.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    docs: HashMap<u32, Document>,
    next_id: u32,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        DocumentRegistry {
            docs: HashMap::new(),
            next_id: 1,
        }
    }

    /// Reserve an id for a document under construction.
    pub fn allocate_id(&mut self) -> DocId {
        let id = self.next_id;
        self.next_id += 1;
        DocId(id)
    }

    /// Register a document under its own id.
    pub fn insert(&mut self, doc: Document) -> DocId {
        let id = doc.id();
        self.next_id = self.next_id.max(id.0 + 1);
        self.docs.insert(id.0, doc);
        id
    }

    pub fn get(&self, id: DocId) -> Option<&Document> {
        self.docs.get(&id.0)
    }

    /// Evict a document, destroying its in-memory state.
    pub fn remove(&mut self, id: DocId) -> Option<Document> {
        self.docs.remove(&id.0)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::node::NodeKind;
    use crate::dom::qname::QName;
    use crate::storage::broker::MemoryBroker;

    /// Hand-assemble a document whose element header promises more child
    /// slots than the broker actually holds.
    fn truncated_document() -> Document {
        let broker = Arc::new(MemoryBroker::new());
        let mut symbols = SymbolTable::new();
        let name_ref = symbols.intern(&QName::local("root"));

        let mut root = StoredNode::element(QName::local("root"), 0, 2);
        root.set_name_ref(name_ref);
        let root_addr = broker.append(&codec::serialize(&root).unwrap()).unwrap();
        // Only one of the two promised children is ever written.
        let child_addr = broker
            .append(&codec::serialize(&StoredNode::text("only")).unwrap())
            .unwrap();

        let order = LevelOrder::new(vec![2, 1]).unwrap();
        Document::assemble(
            DocId(9),
            "/db/broken".to_string(),
            order,
            symbols,
            broker,
            vec![(1, root_addr), (2, child_addr)],
            vec![1],
        )
    }

    #[test]
    fn test_unknown_gid() {
        let doc = truncated_document();
        assert_eq!(doc.get_node(77).unwrap_err(), Error::UnknownGid(77));
        assert!(!doc.contains(77));
        assert!(doc.contains(1));
    }

    #[test]
    fn test_get_node_is_cached_and_repeatable() {
        let doc = truncated_document();
        let first = doc.get_node(1).unwrap();
        let second = doc.get_node(1).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.kind(), NodeKind::Element);
        assert_eq!(first.gid(), 1);
        assert!(!first.address().is_null());
        assert_eq!(first.document(), Some(DocId(9)));
    }

    #[test]
    fn test_truncated_subtree() {
        let doc = truncated_document();
        let root = doc.get_node(1).unwrap();
        let err = doc.last_descendant(&root).unwrap_err();
        assert_eq!(err, Error::TruncatedSubtree { gid: 3 });
    }

    #[test]
    fn test_registry_weak_handles() {
        let mut registry = DocumentRegistry::new();
        let doc = truncated_document();
        let node = doc.get_node(1).unwrap();
        let id = registry.insert(doc);

        // The node finds its owner through the registry handle.
        let owner = registry.get(node.document().unwrap_or(id)).unwrap();
        assert_eq!(owner.collection(), "/db/broken");

        // Eviction destroys the document; the handle dangles harmlessly.
        registry.remove(id).unwrap();
        assert!(registry.get(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_allocates_fresh_ids() {
        let mut registry = DocumentRegistry::new();
        let a = registry.allocate_id();
        let b = registry.allocate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_metadata_decode_errors() {
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        assert!(matches!(
            Document::from_metadata(&[], Arc::clone(&broker)),
            Err(Error::InvalidMetadata(_))
        ));
        assert!(matches!(
            Document::from_metadata(&[99], Arc::clone(&broker)),
            Err(Error::InvalidMetadata("unknown version"))
        ));
        // Version byte alone, then nothing.
        assert!(matches!(
            Document::from_metadata(&[1], broker),
            Err(Error::InvalidMetadata(_))
        ));
    }
}
