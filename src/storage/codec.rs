//! Node Codec
//!
//! Each node persists as `[signature byte | variant payload]`. The
//! signature's high nibble is the DOM node-type code (element 1,
//! attribute 2, text 3, processing instruction 7, comment 8); the low
//! nibble carries variant flags:
//!
//! - bits 0-1: width of every length prefix in the payload
//!   (`00` = u8, `01` = u16, `10` = u32), the smallest width that fits
//!   the longest length in the record;
//! - bit 2: element has attribute children.
//!
//! Multi-byte integers are big-endian. Payload contracts:
//!
//! - text / comment: `[len][utf8 bytes]`
//! - processing instruction: `[target_len][target][data_len][data]`
//! - attribute: `[name_ref: u32][attr_type: u8][value_len][value]`
//! - element: `[name_ref: u32][attr_count: u8][child_count: u32][flags: u8]`
//!
//! An element record does not embed its children: they are located by GID
//! arithmetic and fetched separately. The GID itself is never part of the
//! payload either; it is the key under which the record lives in the page
//! store, supplied by the caller at decode time.

use crate::dom::document::DocId;
use crate::dom::node::{AttrType, NodeKind, NodePayload, StoredNode};
use crate::dom::symbols::SymbolTable;
use crate::error::{Error, Result};

/// Element flag: the record has attribute children.
pub const FLAG_HAS_ATTRIBUTES: u8 = 0b0100;

const WIDTH_MASK: u8 = 0b0011;

/// Serialize a node to its byte record.
///
/// Elements and attributes must have their name interned first; the
/// payload stores the symbol reference, not the name.
pub fn serialize(node: &StoredNode) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(16);
    match node.payload() {
        NodePayload::Text(data) => {
            let width = width_for(data.len());
            out.push(signature(NodeKind::Text, width, 0));
            put_len(&mut out, width, data.len());
            out.extend_from_slice(data);
        }
        NodePayload::Comment(text) => {
            let width = width_for(text.len());
            out.push(signature(NodeKind::Comment, width, 0));
            put_len(&mut out, width, text.len());
            out.extend_from_slice(text.as_bytes());
        }
        NodePayload::ProcessingInstruction { target, data } => {
            let width = width_for(target.len().max(data.len()));
            out.push(signature(NodeKind::ProcessingInstruction, width, 0));
            put_len(&mut out, width, target.len());
            out.extend_from_slice(target.as_bytes());
            put_len(&mut out, width, data.len());
            out.extend_from_slice(data.as_bytes());
        }
        NodePayload::Attribute { value, attr_type } => {
            let name_ref = node.name_ref().ok_or(Error::UnresolvedName)?;
            let width = width_for(value.len());
            out.push(signature(NodeKind::Attribute, width, 0));
            wire::put_u32(&mut out, name_ref);
            out.push(attr_type.code());
            put_len(&mut out, width, value.len());
            out.extend_from_slice(value.as_bytes());
        }
        NodePayload::Element {
            child_count,
            attr_count,
            flags,
        } => {
            let name_ref = node.name_ref().ok_or(Error::UnresolvedName)?;
            let attr_flag = if *attr_count > 0 {
                FLAG_HAS_ATTRIBUTES
            } else {
                0
            };
            out.push(signature(NodeKind::Element, 0, attr_flag));
            wire::put_u32(&mut out, name_ref);
            out.push(*attr_count);
            wire::put_u32(&mut out, *child_count);
            out.push(*flags);
        }
    }
    Ok(out)
}

/// Decode a byte record into a fresh node.
///
/// The caller supplies the owning document and assigns the GID afterward;
/// neither is present in the record.
pub fn deserialize(data: &[u8], doc: DocId, symbols: &SymbolTable) -> Result<StoredNode> {
    let mut node = StoredNode::text(Vec::new());
    deserialize_into(&mut node, data, doc, symbols)?;
    Ok(node)
}

/// Decode a byte record into an existing (pooled) node, replacing every
/// field.
pub fn deserialize_into(
    node: &mut StoredNode,
    data: &[u8],
    doc: DocId,
    symbols: &SymbolTable,
) -> Result<()> {
    let mut r = Reader::new(data);
    let sig = r.byte()?;
    let kind = NodeKind::from_dom_code(sig >> 4)
        .ok_or(Error::CorruptNodeRecord { signature: sig })?;
    let width = sig & WIDTH_MASK;
    if width == 0b11 {
        return Err(Error::CorruptNodeRecord { signature: sig });
    }

    match kind {
        NodeKind::Text => {
            let len = r.len_prefix(width)?;
            let data = r.take(len)?.to_vec();
            *node = StoredNode::text(data);
        }
        NodeKind::Comment => {
            let len = r.len_prefix(width)?;
            let text = r.utf8(len, sig)?;
            *node = StoredNode::comment(text);
        }
        NodeKind::ProcessingInstruction => {
            let target_len = r.len_prefix(width)?;
            let target = r.utf8(target_len, sig)?;
            let data_len = r.len_prefix(width)?;
            let data = r.utf8(data_len, sig)?;
            *node = StoredNode::processing_instruction(target, data);
        }
        NodeKind::Attribute => {
            let name_ref = r.u32()?;
            let type_code = r.byte()?;
            let attr_type = AttrType::from_code(type_code)
                .ok_or(Error::CorruptNodeRecord { signature: sig })?;
            let len = r.len_prefix(width)?;
            let value = r.utf8(len, sig)?;
            let name = symbols.resolve(name_ref)?.clone();
            *node = StoredNode::attribute(name, value, attr_type);
            node.set_name_ref(name_ref);
        }
        NodeKind::Element => {
            let name_ref = r.u32()?;
            let attr_count = r.byte()?;
            let child_count = r.u32()?;
            let flags = r.byte()?;
            let name = symbols.resolve(name_ref)?.clone();
            *node = StoredNode::element_with_flags(name, attr_count, child_count, flags);
            node.set_name_ref(name_ref);
        }
    }
    node.set_document(doc);
    Ok(())
}

#[inline]
fn signature(kind: NodeKind, width: u8, flags: u8) -> u8 {
    (kind.dom_code() << 4) | (width & WIDTH_MASK) | flags
}

#[inline]
fn width_for(len: usize) -> u8 {
    if len <= u8::MAX as usize {
        0
    } else if len <= u16::MAX as usize {
        1
    } else {
        2
    }
}

fn put_len(out: &mut Vec<u8>, width: u8, len: usize) {
    match width {
        0 => out.push(len as u8),
        1 => wire::put_u16(out, len as u16),
        _ => wire::put_u32(out, len as u32),
    }
}

/// Cursor over a record buffer with truncation-checked reads.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let available = self.data.len() - self.pos;
        if n > available {
            return Err(Error::TruncatedRecord {
                expected: n,
                available,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn len_prefix(&mut self, width: u8) -> Result<usize> {
        match width {
            0 => Ok(self.byte()? as usize),
            1 => {
                let b = self.take(2)?;
                Ok(u16::from_be_bytes([b[0], b[1]]) as usize)
            }
            _ => Ok(self.u32()? as usize),
        }
    }

    fn utf8(&mut self, len: usize, sig: u8) -> Result<String> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::CorruptNodeRecord { signature: sig })
    }
}

/// Big-endian byte helpers shared with the document metadata codec.
pub(crate) mod wire {
    pub fn put_u16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(out: &mut Vec<u8>, v: u64) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i64(out: &mut Vec<u8>, v: i64) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_str(out: &mut Vec<u8>, s: &str) {
        put_u16(out, s.len() as u16);
        out.extend_from_slice(s.as_bytes());
    }

    pub fn get_u16(data: &[u8], pos: &mut usize) -> Option<u16> {
        let b = data.get(*pos..*pos + 2)?;
        *pos += 2;
        Some(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_u32(data: &[u8], pos: &mut usize) -> Option<u32> {
        let b = data.get(*pos..*pos + 4)?;
        *pos += 4;
        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(data: &[u8], pos: &mut usize) -> Option<u64> {
        let b = data.get(*pos..*pos + 8)?;
        *pos += 8;
        Some(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn get_i64(data: &[u8], pos: &mut usize) -> Option<i64> {
        get_u64(data, pos).map(|v| v as i64)
    }

    pub fn get_str(data: &[u8], pos: &mut usize) -> Option<String> {
        let len = get_u16(data, pos)? as usize;
        let b = data.get(*pos..*pos + len)?;
        *pos += len;
        String::from_utf8(b.to_vec()).ok()
    }
}
