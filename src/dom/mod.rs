//! DOM Module - Stored Document Model
//!
//! The node-record side of the storage core:
//! - Qualified names with value semantics
//! - Tagged node records decoded on demand from the page store
//! - Per-document symbol table for name interning
//! - The document model tying GID arithmetic to byte spans
//! - The SAX ingest builder

pub mod builder;
pub mod document;
pub mod node;
pub mod qname;
pub mod symbols;

pub use builder::DocumentBuilder;
pub use document::{DocId, Document, DocumentRegistry, NodeIterator};
pub use node::{AttrType, NodeKind, NodeMutate, NodePayload, NodePool, NodeRead, StoredNode};
pub use qname::{QName, COMMENT_QNAME, TEXT_QNAME};
pub use symbols::SymbolTable;
