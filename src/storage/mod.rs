//! Storage Module - Addressing and Byte Formats
//!
//! - `gid`: the level-indexed addressing grid (GID arithmetic)
//! - `codec`: the tagged byte format of individual node records
//! - `broker`: the page-store interface the core reads through

pub mod broker;
pub mod codec;
pub mod gid;

pub use broker::{Broker, InternalAddress, MemoryBroker, NodeProxy, RecordCursor};
pub use gid::{Gid, LevelOrder};
