//! Page Store Interface
//!
//! The core reads node records through a broker: an append-oriented page
//! store addressed by opaque 64-bit page/offset handles. Real deployments
//! put a page cache and BTree files behind this trait; `MemoryBroker`
//! keeps records in in-process pages for tests and light embedding.

use parking_lot::Mutex;

use crate::dom::document::DocId;
use crate::error::{Error, Result};
use crate::storage::gid::Gid;

/// Opaque page/offset handle into the page store.
///
/// The special `NULL` value (-1) marks a record that has not been
/// persisted yet. An address is not a GID: the GID is the logical key,
/// the address says where the bytes physically live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InternalAddress(i64);

impl InternalAddress {
    /// "Not yet persisted".
    pub const NULL: InternalAddress = InternalAddress(-1);

    /// Pack a page number and a byte offset within the page.
    #[inline]
    pub fn pack(page: u32, offset: u32) -> Self {
        InternalAddress(((page as i64) << 32) | offset as i64)
    }

    #[inline]
    pub fn page(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn offset(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 < 0
    }

    /// The raw 64-bit form, as persisted in document metadata.
    #[inline]
    pub fn raw(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: i64) -> Self {
        InternalAddress(raw)
    }
}

impl std::fmt::Display for InternalAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            f.write_str("<null>")
        } else {
            write!(f, "{}:{}", self.page(), self.offset())
        }
    }
}

/// A lightweight handle to a node: enough to locate it without decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeProxy {
    pub doc: DocId,
    pub gid: Gid,
    pub address: InternalAddress,
}

impl NodeProxy {
    pub fn new(doc: DocId, gid: Gid, address: InternalAddress) -> Self {
        NodeProxy { doc, gid, address }
    }
}

/// The page store as seen by the core.
///
/// `append` is used by the single ingest writer; `fetch` and `cursor`
/// serve any number of parallel readers.
pub trait Broker: Send + Sync {
    /// Read the record stored at `address`.
    fn fetch(&self, address: InternalAddress) -> Result<Vec<u8>>;

    /// Append a record, returning its address. Records of one document
    /// are appended in document order.
    fn append(&self, record: &[u8]) -> Result<InternalAddress>;

    /// Walk records in storage (document) order, starting at `start`.
    fn cursor(&self, start: InternalAddress) -> Result<Box<dyn RecordCursor + '_>>;
}

/// Forward-only walk over stored records.
pub trait RecordCursor {
    /// The next record and its address, or `None` at the end.
    fn next_record(&mut self) -> Option<Result<(InternalAddress, Vec<u8>)>>;
}

// ======================================================================
// In-memory broker
// ======================================================================

/// Soft page size; a record larger than this gets a page of its own.
const PAGE_FILL: usize = 4096;

#[derive(Debug, Default)]
struct Pages {
    pages: Vec<Vec<u8>>,
}

/// Append-only in-memory page store.
///
/// Each record is stored as `[len: u32][bytes]` inside a page; pages are
/// sealed once they pass the fill mark. Addresses are (page, offset)
/// pairs.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    inner: Mutex<Pages>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        MemoryBroker {
            inner: Mutex::new(Pages::default()),
        }
    }

    /// Total number of pages allocated so far.
    pub fn page_count(&self) -> usize {
        self.inner.lock().pages.len()
    }
}

impl Broker for MemoryBroker {
    fn fetch(&self, address: InternalAddress) -> Result<Vec<u8>> {
        if address.is_null() {
            return Err(Error::UnknownAddress(address));
        }
        let inner = self.inner.lock();
        let page = inner
            .pages
            .get(address.page() as usize)
            .ok_or(Error::UnknownAddress(address))?;
        let offset = address.offset() as usize;
        let header = page
            .get(offset..offset + 4)
            .ok_or(Error::UnknownAddress(address))?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let bytes = page
            .get(offset + 4..offset + 4 + len)
            .ok_or(Error::UnknownAddress(address))?;
        Ok(bytes.to_vec())
    }

    fn append(&self, record: &[u8]) -> Result<InternalAddress> {
        let mut inner = self.inner.lock();
        let needs_new_page = match inner.pages.last() {
            Some(page) => page.len() >= PAGE_FILL,
            None => true,
        };
        if needs_new_page {
            inner.pages.push(Vec::with_capacity(PAGE_FILL));
        }
        let page_no = inner.pages.len() - 1;
        let page = &mut inner.pages[page_no];
        let offset = page.len();
        page.extend_from_slice(&(record.len() as u32).to_be_bytes());
        page.extend_from_slice(record);
        Ok(InternalAddress::pack(page_no as u32, offset as u32))
    }

    fn cursor(&self, start: InternalAddress) -> Result<Box<dyn RecordCursor + '_>> {
        if start.is_null() {
            return Err(Error::UnknownAddress(start));
        }
        Ok(Box::new(MemoryCursor {
            broker: self,
            page: start.page() as usize,
            offset: start.offset() as usize,
        }))
    }
}

/// Cursor over `MemoryBroker` pages.
///
/// Locks per step rather than across the walk, so readers can fetch and
/// iterate the same broker concurrently.
struct MemoryCursor<'a> {
    broker: &'a MemoryBroker,
    page: usize,
    offset: usize,
}

impl RecordCursor for MemoryCursor<'_> {
    fn next_record(&mut self) -> Option<Result<(InternalAddress, Vec<u8>)>> {
        let inner = self.broker.inner.lock();
        loop {
            let page = inner.pages.get(self.page)?;
            if self.offset + 4 > page.len() {
                self.page += 1;
                self.offset = 0;
                continue;
            }
            let header = &page[self.offset..self.offset + 4];
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let address = InternalAddress::pack(self.page as u32, self.offset as u32);
            let Some(bytes) = page.get(self.offset + 4..self.offset + 4 + len) else {
                return Some(Err(Error::UnknownAddress(address)));
            };
            let bytes = bytes.to_vec();
            self.offset += 4 + len;
            return Some(Ok((address, bytes)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_packing() {
        let a = InternalAddress::pack(7, 4096);
        assert_eq!(a.page(), 7);
        assert_eq!(a.offset(), 4096);
        assert!(!a.is_null());
        assert!(InternalAddress::NULL.is_null());
        assert_eq!(InternalAddress::from_raw(a.raw()), a);
    }

    #[test]
    fn test_append_fetch_round_trip() {
        let broker = MemoryBroker::new();
        let a = broker.append(b"first").unwrap();
        let b = broker.append(b"second").unwrap();
        assert_eq!(broker.fetch(a).unwrap(), b"first");
        assert_eq!(broker.fetch(b).unwrap(), b"second");
    }

    #[test]
    fn test_fetch_null_address() {
        let broker = MemoryBroker::new();
        assert!(matches!(
            broker.fetch(InternalAddress::NULL),
            Err(Error::UnknownAddress(_))
        ));
    }

    #[test]
    fn test_fetch_bogus_address() {
        let broker = MemoryBroker::new();
        broker.append(b"x").unwrap();
        let bogus = InternalAddress::pack(9, 9);
        assert!(matches!(
            broker.fetch(bogus),
            Err(Error::UnknownAddress(_))
        ));
    }

    #[test]
    fn test_cursor_walks_in_append_order() {
        let broker = MemoryBroker::new();
        let first = broker.append(b"a").unwrap();
        broker.append(b"bb").unwrap();
        broker.append(b"ccc").unwrap();

        let mut cursor = broker.cursor(first).unwrap();
        let mut seen = Vec::new();
        while let Some(item) = cursor.next_record() {
            seen.push(item.unwrap().1);
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);
    }

    #[test]
    fn test_cursor_crosses_page_boundary() {
        let broker = MemoryBroker::new();
        let big = vec![0u8; PAGE_FILL];
        let first = broker.append(&big).unwrap();
        let second = broker.append(b"next-page").unwrap();
        assert_ne!(first.page(), second.page());

        let mut cursor = broker.cursor(first).unwrap();
        assert_eq!(cursor.next_record().unwrap().unwrap().1.len(), PAGE_FILL);
        assert_eq!(cursor.next_record().unwrap().unwrap().1, b"next-page");
        assert!(cursor.next_record().is_none());
    }

    #[test]
    fn test_cursor_from_mid_stream() {
        let broker = MemoryBroker::new();
        broker.append(b"skipped").unwrap();
        let mid = broker.append(b"start-here").unwrap();
        broker.append(b"tail").unwrap();

        let mut cursor = broker.cursor(mid).unwrap();
        assert_eq!(cursor.next_record().unwrap().unwrap().1, b"start-here");
        assert_eq!(cursor.next_record().unwrap().unwrap().1, b"tail");
        assert!(cursor.next_record().is_none());
    }
}
