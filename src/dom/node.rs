//! Stored Node Records
//!
//! A node is a tagged value: the common header (GID, storage address,
//! name, owning document) plus a variant payload per node kind. Records
//! are immutable once persisted; navigation defers to the owning
//! document, which answers from GID arithmetic and decodes byte spans on
//! demand. The mutation half of the DOM contract is a separate trait that
//! stored records reject.

use std::borrow::Cow;
use std::collections::BTreeSet;

use crate::dom::document::{DocId, Document};
use crate::dom::qname::{QName, COMMENT_QNAME, TEXT_QNAME};
use crate::error::{Error, Result};
use crate::sax::{AttributeList, ContentHandler, LexicalHandler, SaxAttribute};
use crate::storage::broker::InternalAddress;
use crate::storage::gid::Gid;

/// Kind of a stored node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

impl NodeKind {
    /// DOM node-type code, as used in the signature byte's high nibble.
    #[inline]
    pub const fn dom_code(self) -> u8 {
        match self {
            NodeKind::Element => 1,
            NodeKind::Attribute => 2,
            NodeKind::Text => 3,
            NodeKind::ProcessingInstruction => 7,
            NodeKind::Comment => 8,
        }
    }

    /// Reverse of [`dom_code`](Self::dom_code).
    pub const fn from_dom_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(NodeKind::Element),
            2 => Some(NodeKind::Attribute),
            3 => Some(NodeKind::Text),
            7 => Some(NodeKind::ProcessingInstruction),
            8 => Some(NodeKind::Comment),
            _ => None,
        }
    }
}

/// Declared type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttrType {
    #[default]
    Cdata,
    Id,
    Idref,
}

impl AttrType {
    #[inline]
    pub const fn code(self) -> u8 {
        match self {
            AttrType::Cdata => 0,
            AttrType::Id => 1,
            AttrType::Idref => 2,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(AttrType::Cdata),
            1 => Some(AttrType::Id),
            2 => Some(AttrType::Idref),
            _ => None,
        }
    }
}

/// Variant-specific part of a stored node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodePayload {
    /// Raw character data bytes (UTF-8)
    Text(Vec<u8>),
    /// Comment text
    Comment(String),
    /// Attribute value and declared type
    Attribute { value: String, attr_type: AttrType },
    /// Processing instruction target and data
    ProcessingInstruction { target: String, data: String },
    /// Element header. Children are not inline; `child_count` counts the
    /// occupied child GID slots, attributes first.
    Element {
        child_count: u32,
        attr_count: u8,
        flags: u8,
    },
}

/// A DOM node as stored in the page store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNode {
    gid: Gid,
    address: InternalAddress,
    doc: Option<DocId>,
    name: QName,
    name_ref: Option<u32>,
    payload: NodePayload,
}

impl StoredNode {
    /// Create a text node from its character data.
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        StoredNode {
            gid: 0,
            address: InternalAddress::NULL,
            doc: None,
            name: TEXT_QNAME.clone(),
            name_ref: None,
            payload: NodePayload::Text(data.into()),
        }
    }

    /// Create a comment node.
    pub fn comment(text: impl Into<String>) -> Self {
        StoredNode {
            gid: 0,
            address: InternalAddress::NULL,
            doc: None,
            name: COMMENT_QNAME.clone(),
            name_ref: None,
            payload: NodePayload::Comment(text.into()),
        }
    }

    /// Create an attribute node.
    pub fn attribute(name: QName, value: impl Into<String>, attr_type: AttrType) -> Self {
        StoredNode {
            gid: 0,
            address: InternalAddress::NULL,
            doc: None,
            name,
            name_ref: None,
            payload: NodePayload::Attribute {
                value: value.into(),
                attr_type,
            },
        }
    }

    /// Create a processing instruction node.
    pub fn processing_instruction(target: impl Into<String>, data: impl Into<String>) -> Self {
        let target = target.into();
        StoredNode {
            gid: 0,
            address: InternalAddress::NULL,
            doc: None,
            name: QName::local(target.clone()),
            name_ref: None,
            payload: NodePayload::ProcessingInstruction {
                target,
                data: data.into(),
            },
        }
    }

    /// Create an element header node.
    pub fn element(name: QName, attr_count: u8, child_count: u32) -> Self {
        StoredNode {
            gid: 0,
            address: InternalAddress::NULL,
            doc: None,
            name,
            name_ref: None,
            payload: NodePayload::Element {
                child_count,
                attr_count,
                flags: 0,
            },
        }
    }

    /// Create an element header carrying a decoded flags byte.
    pub fn element_with_flags(name: QName, attr_count: u8, child_count: u32, flags: u8) -> Self {
        StoredNode {
            gid: 0,
            address: InternalAddress::NULL,
            doc: None,
            name,
            name_ref: None,
            payload: NodePayload::Element {
                child_count,
                attr_count,
                flags,
            },
        }
    }

    /// Reset every field to its initial state so the record can be reused
    /// by a pool instead of allocating per node.
    pub fn clear(&mut self) {
        self.gid = 0;
        self.address = InternalAddress::NULL;
        self.doc = None;
        self.name = TEXT_QNAME.clone();
        self.name_ref = None;
        self.payload = NodePayload::Text(Vec::new());
    }

    /// The node kind, derived from the payload variant.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        match self.payload {
            NodePayload::Text(_) => NodeKind::Text,
            NodePayload::Comment(_) => NodeKind::Comment,
            NodePayload::Attribute { .. } => NodeKind::Attribute,
            NodePayload::ProcessingInstruction { .. } => NodeKind::ProcessingInstruction,
            NodePayload::Element { .. } => NodeKind::Element,
        }
    }

    /// The node's global identifier; 0 until one is assigned.
    #[inline]
    pub fn gid(&self) -> Gid {
        self.gid
    }

    /// Assign the global identifier under which this record lives.
    #[inline]
    pub fn set_gid(&mut self, gid: Gid) {
        self.gid = gid;
    }

    /// The internal storage address; NULL until persisted.
    #[inline]
    pub fn address(&self) -> InternalAddress {
        self.address
    }

    #[inline]
    pub fn set_address(&mut self, address: InternalAddress) {
        self.address = address;
    }

    /// Weak back reference to the owning document.
    #[inline]
    pub fn document(&self) -> Option<DocId> {
        self.doc
    }

    #[inline]
    pub fn set_document(&mut self, doc: DocId) {
        self.doc = Some(doc);
    }

    /// The node name. Text and comment nodes answer their stand-in names.
    #[inline]
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Replace the node name. Used to attach a re-prefixed name; names
    /// themselves are immutable values.
    pub fn set_name(&mut self, name: QName) {
        self.name = name;
    }

    /// Symbol-table reference of the name, if interned.
    #[inline]
    pub fn name_ref(&self) -> Option<u32> {
        self.name_ref
    }

    #[inline]
    pub fn set_name_ref(&mut self, name_ref: u32) {
        self.name_ref = Some(name_ref);
    }

    /// Payload variant.
    #[inline]
    pub fn payload(&self) -> &NodePayload {
        &self.payload
    }

    /// Number of attribute children. 0 for non-elements.
    #[inline]
    pub fn attributes_count(&self) -> u8 {
        match self.payload {
            NodePayload::Element { attr_count, .. } => attr_count,
            _ => 0,
        }
    }

    /// Number of occupied child GID slots, attributes included.
    #[inline]
    pub fn slot_count(&self) -> u32 {
        match self.payload {
            NodePayload::Element { child_count, .. } => child_count,
            _ => 0,
        }
    }

    /// Number of content children (child slots minus attribute slots).
    #[inline]
    pub fn content_child_count(&self) -> u32 {
        self.slot_count() - self.attributes_count() as u32
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        self.slot_count() > 0
    }

    #[inline]
    pub fn has_attributes(&self) -> bool {
        self.attributes_count() > 0
    }

    /// The node value: character data, attribute value, comment text or
    /// processing instruction data. Elements answer an empty string (use
    /// [`Document::string_value`] for the subtree string value).
    pub fn node_value(&self) -> Cow<'_, str> {
        match &self.payload {
            NodePayload::Text(data) => String::from_utf8_lossy(data),
            NodePayload::Comment(text) => Cow::Borrowed(text.as_str()),
            NodePayload::Attribute { value, .. } => Cow::Borrowed(value.as_str()),
            NodePayload::ProcessingInstruction { data, .. } => Cow::Borrowed(data.as_str()),
            NodePayload::Element { .. } => Cow::Borrowed(""),
        }
    }

    // ------------------------------------------------------------------
    // Navigation (deferred to the owning document)
    // ------------------------------------------------------------------

    /// Parent node, or `None` when the parent is the document itself.
    pub fn parent(&self, doc: &Document) -> Result<Option<StoredNode>> {
        match doc.parent_gid(self.gid) {
            Some(pid) => Ok(Some(doc.get_node(pid)?)),
            None => Ok(None),
        }
    }

    /// Preceding sibling in document order.
    pub fn previous_sibling(&self, doc: &Document) -> Result<Option<StoredNode>> {
        doc.previous_sibling_of(self)
    }

    /// Following sibling in document order.
    pub fn next_sibling(&self, doc: &Document) -> Result<Option<StoredNode>> {
        doc.following_sibling_of(self)
    }

    /// First content child (attribute slots are skipped).
    pub fn first_child(&self, doc: &Document) -> Result<Option<StoredNode>> {
        let gids = doc.child_gids(self)?;
        match gids.first() {
            Some(&gid) => Ok(Some(doc.get_node(gid)?)),
            None => Ok(None),
        }
    }

    /// Last content child.
    pub fn last_child(&self, doc: &Document) -> Result<Option<StoredNode>> {
        let gids = doc.child_gids(self)?;
        match gids.last() {
            Some(&gid) => Ok(Some(doc.get_node(gid)?)),
            None => Ok(None),
        }
    }

    /// All content children in document order.
    pub fn child_nodes(&self, doc: &Document) -> Result<Vec<StoredNode>> {
        doc.child_gids(self)?
            .into_iter()
            .map(|gid| doc.get_node(gid))
            .collect()
    }

    /// Attribute children in document order.
    pub fn attributes(&self, doc: &Document) -> Result<Vec<StoredNode>> {
        doc.attribute_gids(self)?
            .into_iter()
            .map(|gid| doc.get_node(gid))
            .collect()
    }

    /// The `/`-joined local names of the ancestor-or-self element chain,
    /// from the document root down. Non-element nodes end the path at
    /// their nearest element ancestor; the document root alone is `/`.
    pub fn path(&self, doc: &Document) -> Result<String> {
        let mut ancestors: Vec<StoredNode> = Vec::new();
        let mut gid = self.gid;
        while let Some(pid) = doc.parent_gid(gid) {
            ancestors.push(doc.get_node(pid)?);
            gid = pid;
        }
        let mut parts: Vec<&str> = ancestors.iter().rev().map(|n| n.name().local_name()).collect();
        if self.kind() == NodeKind::Element {
            parts.push(self.name.local_name());
        }
        if parts.is_empty() {
            return Ok("/".to_string());
        }
        Ok(format!("/{}", parts.join("/")))
    }

    // ------------------------------------------------------------------
    // SAX serialization
    // ------------------------------------------------------------------

    /// Re-emit this subtree as SAX events.
    ///
    /// `lexical` receives comments when present; `first` marks the
    /// outermost call, which closes the prefix mappings it opened.
    pub fn to_sax(
        &self,
        doc: &Document,
        content: &mut dyn ContentHandler,
        lexical: Option<&mut dyn LexicalHandler>,
        first: bool,
    ) -> Result<()> {
        self.to_sax_threaded(doc, content, lexical, first)?;
        Ok(())
    }

    /// Like [`Self::to_sax`] but hands the lexical handler reference back so
    /// callers emitting a sequence of siblings can thread it through without
    /// reborrowing across loop iterations.
    pub(crate) fn to_sax_threaded<'a>(
        &self,
        doc: &Document,
        content: &mut dyn ContentHandler,
        lexical: Option<&'a mut dyn LexicalHandler>,
        first: bool,
    ) -> Result<Option<&'a mut dyn LexicalHandler>> {
        let mut prefixes = BTreeSet::new();
        let lexical = self.emit_sax(doc, content, lexical, &mut prefixes)?;
        if first {
            for prefix in prefixes.iter().rev() {
                content.end_prefix_mapping(prefix)?;
            }
        }
        Ok(lexical)
    }

    fn emit_sax<'a>(
        &self,
        doc: &Document,
        content: &mut dyn ContentHandler,
        lexical: Option<&'a mut dyn LexicalHandler>,
        prefixes: &mut BTreeSet<String>,
    ) -> Result<Option<&'a mut dyn LexicalHandler>> {
        match &self.payload {
            NodePayload::Text(data) => {
                content.characters(&String::from_utf8_lossy(data))?;
                Ok(lexical)
            }
            NodePayload::Comment(text) => match lexical {
                Some(l) => {
                    l.comment(text)?;
                    Ok(Some(l))
                }
                None => Ok(None),
            },
            NodePayload::ProcessingInstruction { target, data } => {
                content.processing_instruction(target, data)?;
                Ok(lexical)
            }
            NodePayload::Attribute { value, attr_type } => {
                // A detached attribute re-emits as an element-shaped event
                // pair carrying only itself; normally attributes ride on
                // their element's start event.
                let attrs = AttributeList::from(vec![SaxAttribute {
                    name: self.name.clone(),
                    value: value.clone(),
                    attr_type: *attr_type,
                }]);
                content.start_element(&self.name, &attrs)?;
                content.end_element(&self.name)?;
                Ok(lexical)
            }
            NodePayload::Element { .. } => {
                self.declare_prefix(content, prefixes)?;
                let attr_nodes = self.attributes(doc)?;
                let mut attrs = Vec::with_capacity(attr_nodes.len());
                for attr in &attr_nodes {
                    attr.declare_prefix(content, prefixes)?;
                    if let NodePayload::Attribute { value, attr_type } = attr.payload() {
                        attrs.push(SaxAttribute {
                            name: attr.name().clone(),
                            value: value.clone(),
                            attr_type: *attr_type,
                        });
                    }
                }
                let attrs = AttributeList::from(attrs);
                content.start_element(&self.name, &attrs)?;
                let mut lexical = lexical;
                for child in self.child_nodes(doc)? {
                    lexical = child.emit_sax(doc, content, lexical, prefixes)?;
                }
                content.end_element(&self.name)?;
                Ok(lexical)
            }
        }
    }

    fn declare_prefix(
        &self,
        content: &mut dyn ContentHandler,
        prefixes: &mut BTreeSet<String>,
    ) -> Result<()> {
        if let Some(prefix) = self.name.prefix() {
            if !prefix.is_empty() && prefixes.insert(prefix.to_string()) {
                content.start_prefix_mapping(prefix, self.name.namespace_uri())?;
            }
        }
        Ok(())
    }
}

/// The read half of the DOM contract, satisfied by stored records.
pub trait NodeRead {
    fn kind(&self) -> NodeKind;
    fn gid(&self) -> Gid;
    fn name(&self) -> &QName;
    fn local_name(&self) -> &str;
    fn namespace_uri(&self) -> &str;
    fn prefix(&self) -> Option<&str>;
    fn node_value(&self) -> Cow<'_, str>;
    fn has_children(&self) -> bool;
    fn has_attributes(&self) -> bool;
}

impl NodeRead for StoredNode {
    fn kind(&self) -> NodeKind {
        StoredNode::kind(self)
    }

    fn gid(&self) -> Gid {
        self.gid
    }

    fn name(&self) -> &QName {
        &self.name
    }

    fn local_name(&self) -> &str {
        self.name.local_name()
    }

    fn namespace_uri(&self) -> &str {
        self.name.namespace_uri()
    }

    fn prefix(&self) -> Option<&str> {
        self.name.prefix()
    }

    fn node_value(&self) -> Cow<'_, str> {
        StoredNode::node_value(self)
    }

    fn has_children(&self) -> bool {
        StoredNode::has_children(self)
    }

    fn has_attributes(&self) -> bool {
        StoredNode::has_attributes(self)
    }
}

/// The mutation half of the DOM contract. Stored records are immutable
/// once persisted; every operation here answers `NotSupported`. An
/// editable overlay layer would implement this for its own node type.
pub trait NodeMutate {
    fn append_child(&mut self, _child: StoredNode) -> Result<()> {
        Err(Error::NotSupported { op: "append_child" })
    }

    fn insert_before(&mut self, _new: StoredNode, _ref_gid: Gid) -> Result<()> {
        Err(Error::NotSupported { op: "insert_before" })
    }

    fn remove_child(&mut self, _child_gid: Gid) -> Result<()> {
        Err(Error::NotSupported { op: "remove_child" })
    }

    fn replace_child(&mut self, _new: StoredNode, _old_gid: Gid) -> Result<()> {
        Err(Error::NotSupported { op: "replace_child" })
    }

    fn update_child(&mut self, _new: StoredNode, _old_gid: Gid) -> Result<()> {
        Err(Error::NotSupported { op: "update_child" })
    }
}

impl NodeMutate for StoredNode {}

/// Pool of cleared node records.
///
/// The ingest reader walks thousands of records per document; recycling
/// through the pool keeps it from allocating a fresh record per node.
#[derive(Debug, Default)]
pub struct NodePool {
    free: Vec<StoredNode>,
}

impl NodePool {
    /// Create an empty pool.
    pub fn new() -> Self {
        NodePool {
            free: Vec::with_capacity(16),
        }
    }

    /// Take a cleared record from the pool, or allocate one.
    pub fn acquire(&mut self) -> StoredNode {
        self.free
            .pop()
            .unwrap_or_else(|| StoredNode::text(Vec::new()))
    }

    /// Return a record to the pool for reuse.
    pub fn release(&mut self, mut node: StoredNode) {
        node.clear();
        self.free.push(node);
    }

    /// Number of records currently pooled.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_payload() {
        assert_eq!(StoredNode::text("x").kind(), NodeKind::Text);
        assert_eq!(StoredNode::comment("c").kind(), NodeKind::Comment);
        assert_eq!(
            StoredNode::attribute(QName::local("id"), "1", AttrType::Id).kind(),
            NodeKind::Attribute
        );
        assert_eq!(
            StoredNode::processing_instruction("xml-stylesheet", "href=\"a\"").kind(),
            NodeKind::ProcessingInstruction
        );
        assert_eq!(
            StoredNode::element(QName::local("e"), 0, 0).kind(),
            NodeKind::Element
        );
    }

    #[test]
    fn test_nameless_kinds_use_singletons() {
        assert!(StoredNode::text("x").name().is_text());
        assert!(StoredNode::comment("c").name().is_comment());
    }

    #[test]
    fn test_child_slot_accounting() {
        let e = StoredNode::element(QName::local("e"), 2, 5);
        assert_eq!(e.attributes_count(), 2);
        assert_eq!(e.slot_count(), 5);
        assert_eq!(e.content_child_count(), 3);
        assert!(e.has_children());
        assert!(e.has_attributes());

        let t = StoredNode::text("x");
        assert_eq!(t.slot_count(), 0);
        assert!(!t.has_children());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut n = StoredNode::element(QName::new("urn:x", "e", Some("x")), 1, 3);
        n.set_gid(42);
        n.set_name_ref(7);
        n.set_address(InternalAddress::pack(1, 100));
        n.clear();
        assert_eq!(n.gid(), 0);
        assert_eq!(n.address(), InternalAddress::NULL);
        assert_eq!(n.document(), None);
        assert_eq!(n.name_ref(), None);
        assert_eq!(n.kind(), NodeKind::Text);
        assert_eq!(n.node_value(), "");
    }

    #[test]
    fn test_mutation_is_not_supported() {
        let mut n = StoredNode::element(QName::local("e"), 0, 0);
        let err = n.append_child(StoredNode::text("x")).unwrap_err();
        assert!(matches!(err, Error::NotSupported { .. }));
        assert!(n.remove_child(2).is_err());
        assert!(n.update_child(StoredNode::text("y"), 2).is_err());
    }

    #[test]
    fn test_pool_recycles() {
        let mut pool = NodePool::new();
        let mut n = pool.acquire();
        n.set_gid(9);
        pool.release(n);
        assert_eq!(pool.available(), 1);
        let n = pool.acquire();
        assert_eq!(n.gid(), 0, "pooled records come back cleared");
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_node_value() {
        assert_eq!(StoredNode::text("hello").node_value(), "hello");
        assert_eq!(
            StoredNode::attribute(QName::local("k"), "v", AttrType::Cdata).node_value(),
            "v"
        );
        assert_eq!(StoredNode::processing_instruction("t", "d").node_value(), "d");
        assert_eq!(StoredNode::element(QName::local("e"), 0, 0).node_value(), "");
    }
}
