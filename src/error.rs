//! Crate Error Type
//!
//! Every fallible core operation returns `Result<T, Error>`. Codec errors
//! surface through the document model to the caller unchanged; they are
//! never swallowed.

use crate::storage::broker::InternalAddress;
use crate::storage::gid::Gid;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the storage core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A DOM mutation was attempted on an immutable stored node.
    #[error("operation not supported on a stored node: {op}")]
    NotSupported {
        /// The DOM operation that was attempted
        op: &'static str,
    },

    /// The signature byte of a serialized node has no known node type.
    #[error("corrupt node record: unknown signature byte 0x{signature:02x}")]
    CorruptNodeRecord { signature: u8 },

    /// A declared length runs past the end of the record buffer.
    #[error("truncated node record: need {expected} bytes, {available} available")]
    TruncatedRecord { expected: usize, available: usize },

    /// A subtree iterator ended before the expected child count was reached.
    #[error("truncated subtree: iterator ended before node {gid}")]
    TruncatedSubtree { gid: Gid },

    /// Trigger parameters are missing or malformed.
    #[error("invalid trigger configuration: {0}")]
    InvalidTriggerConfig(String),

    /// A document's observed branching exceeds the configured level order.
    #[error("level {level} overflows: order allows {order} children, observed {observed}")]
    OverflowingLevel {
        level: usize,
        order: u64,
        observed: u64,
    },

    /// The order table addresses more GID slots than a u64 can hold.
    #[error("order table overflows 64-bit GID space at level {level}")]
    OrderTableOverflow { level: usize },

    /// The broker has no record at the given address.
    #[error("no record stored at address {0}")]
    UnknownAddress(InternalAddress),

    /// The document has no node with the given GID.
    #[error("document has no node with gid {0}")]
    UnknownGid(Gid),

    /// A name reference in a node payload is not present in the symbol table.
    #[error("symbol table has no entry for name reference {0}")]
    SymbolNotFound(u32),

    /// A node was serialized before its name was interned.
    #[error("node name has not been interned into the symbol table")]
    UnresolvedName,

    /// A fixed limit of the record format was exceeded.
    #[error("record format limit exceeded: {0}")]
    RecordLimit(&'static str),

    /// Persisted document metadata failed to decode.
    #[error("invalid document metadata: {0}")]
    InvalidMetadata(&'static str),

    /// Ingest finished without any document content.
    #[error("document is empty")]
    EmptyDocument,

    /// An XPath function call failed (unknown name, wrong arity).
    #[error("xpath function error: {0}")]
    Function(String),
}
