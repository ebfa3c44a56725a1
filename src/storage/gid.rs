//! Level-Indexed Node Addressing
//!
//! Every potential node position in a document maps to a unique integer
//! identifier (GID). The document carries one fan-out value per tree
//! level; parent, sibling and child positions are then answered with
//! integer arithmetic instead of pointer chasing.
//!
//! The grid: level 0 holds the document-level children (usually just the
//! root element), and a node at level L owns a window of `order[L]` child
//! slots at level L+1. Level starts and slot counts are precomputed at
//! table construction so navigation is division and multiplication only.

use std::cmp::Ordering;

use crate::error::{Error, Result};

/// Global node identifier. `0` is never a valid GID; the root element of
/// a document with a single top-level node is GID 1.
pub type Gid = u64;

/// Per-document level order table with precomputed level boundaries.
///
/// `order[L]` is the maximum branching factor assumed for a node at tree
/// level L. The table is fixed at document creation and cannot change for
/// an existing document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelOrder {
    /// Fan-out per level: `order[L]` children for each level-L node
    order: Vec<u64>,
    /// First GID of each level; `starts[0] == 1`
    starts: Vec<u64>,
    /// Number of GID slots reserved at each level
    slots: Vec<u64>,
}

impl LevelOrder {
    /// Build a table for a document with a single top-level node.
    pub fn new(order: Vec<u64>) -> Result<Self> {
        Self::with_document_fanout(order, 1)
    }

    /// Build a table reserving `doc_fanout` slots at level 0 for the
    /// document-level children (root element plus any comments or
    /// processing instructions outside it).
    pub fn with_document_fanout(order: Vec<u64>, doc_fanout: u64) -> Result<Self> {
        if doc_fanout == 0 {
            return Err(Error::OrderTableOverflow { level: 0 });
        }
        let mut starts = Vec::with_capacity(order.len() + 1);
        let mut slots = Vec::with_capacity(order.len() + 1);
        starts.push(1u64);
        slots.push(doc_fanout);

        for (level, &fanout) in order.iter().enumerate() {
            if fanout == 0 {
                return Err(Error::OrderTableOverflow { level });
            }
            let prev_slots = slots[level];
            let next_slots = prev_slots
                .checked_mul(fanout)
                .ok_or(Error::OrderTableOverflow { level })?;
            let next_start = starts[level]
                .checked_add(prev_slots)
                .ok_or(Error::OrderTableOverflow { level })?;
            // The deepest level must still fit entirely below u64::MAX.
            next_start
                .checked_add(next_slots)
                .ok_or(Error::OrderTableOverflow { level })?;
            starts.push(next_start);
            slots.push(next_slots);
        }

        Ok(LevelOrder {
            order,
            starts,
            slots,
        })
    }

    /// Number of addressable tree levels (level 0 through `depth() - 1`).
    #[inline]
    pub fn depth(&self) -> usize {
        self.starts.len()
    }

    /// The fan-out configured for nodes at `level`.
    #[inline]
    pub fn level_order(&self, level: usize) -> Option<u64> {
        self.order.get(level).copied()
    }

    /// First GID belonging to `level`.
    #[inline]
    pub fn level_start(&self, level: usize) -> Option<Gid> {
        self.starts.get(level).copied()
    }

    /// Number of GID slots reserved at `level`.
    #[inline]
    pub fn level_slots(&self, level: usize) -> Option<u64> {
        self.slots.get(level).copied()
    }

    /// Largest GID addressable by this table.
    #[inline]
    pub fn max_gid(&self) -> Gid {
        // Construction guarantees the sum fits.
        self.starts[self.starts.len() - 1] + self.slots[self.slots.len() - 1] - 1
    }

    /// The raw fan-out table, as persisted in document metadata.
    #[inline]
    pub fn order_table(&self) -> &[u64] {
        &self.order
    }

    /// Slots reserved for document-level children.
    #[inline]
    pub fn document_fanout(&self) -> u64 {
        self.slots[0]
    }

    /// Compute the tree level a GID addresses, or `None` for GID 0 and
    /// identifiers beyond the grid.
    pub fn tree_level(&self, gid: Gid) -> Option<usize> {
        if gid == 0 {
            return None;
        }
        for level in 0..self.starts.len() {
            if gid < self.starts[level] + self.slots[level] {
                return Some(level);
            }
        }
        None
    }

    /// GID of the parent slot. `None` for document-level nodes: their
    /// parent is the document itself, not an element.
    pub fn parent(&self, gid: Gid) -> Option<Gid> {
        let level = self.tree_level(gid)?;
        if level == 0 {
            return None;
        }
        let fanout = self.order[level - 1];
        Some((gid - self.starts[level]) / fanout + self.starts[level - 1])
    }

    /// First GID of the child window owned by `gid`.
    ///
    /// Defined even for leaves; callers must consult the node's child
    /// count to learn whether the slot is occupied. `None` once the table
    /// has no deeper level.
    pub fn first_child(&self, gid: Gid) -> Option<Gid> {
        let level = self.tree_level(gid)?;
        if level >= self.order.len() {
            return None;
        }
        let fanout = self.order[level];
        Some((gid - self.starts[level]) * fanout + self.starts[level + 1])
    }

    /// Preceding sibling slot, or `None` at the start of the window.
    ///
    /// Document-level nodes always answer `None` here; the document
    /// wrapper consults its ordered top-level child list instead.
    pub fn previous_sibling(&self, gid: Gid) -> Option<Gid> {
        let level = self.tree_level(gid)?;
        if level == 0 {
            return None;
        }
        let first = self.first_child(self.parent(gid)?)?;
        if gid > first {
            Some(gid - 1)
        } else {
            None
        }
    }

    /// Following sibling slot, or `None` at the end of the window.
    ///
    /// Document-level nodes always answer `None` here, as for
    /// [`previous_sibling`](Self::previous_sibling).
    pub fn next_sibling(&self, gid: Gid) -> Option<Gid> {
        let level = self.tree_level(gid)?;
        if level == 0 {
            return None;
        }
        let first = self.first_child(self.parent(gid)?)?;
        if gid + 1 < first + self.order[level - 1] {
            Some(gid + 1)
        } else {
            None
        }
    }

    /// Document order of two GIDs of the same document.
    #[inline]
    pub fn document_order(a: Gid, b: Gid) -> Ordering {
        a.cmp(&b)
    }
}
