//! The on-disk node layout: common header, leaf body, internal body.
//!
//! Pure accessors over a `[u8; PAGE_SIZE]` buffer. Nothing here touches the
//! Pager — a `Node` just interprets bytes that some page slot owns. The
//! layout is little-endian so the file format is portable across hosts.
use crate::errors::Error;
use crate::row::ROW_SIZE;

pub const PAGE_SIZE: usize = 4096;

/// Sentinel for "no child" (spec §3). Also doubles as "not yet initialized".
pub const INVALID_PAGE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Leaf,
    Internal,
}

// --- Common header ---------------------------------------------------
const NODE_TYPE_OFFSET: usize = 0;
const NODE_TYPE_SIZE: usize = 1;
const IS_ROOT_OFFSET: usize = NODE_TYPE_OFFSET + NODE_TYPE_SIZE;
const IS_ROOT_SIZE: usize = 1;
const PARENT_OFFSET: usize = IS_ROOT_OFFSET + IS_ROOT_SIZE;
const PARENT_SIZE: usize = 4;
pub const COMMON_NODE_HEADER_SIZE: usize = NODE_TYPE_SIZE + IS_ROOT_SIZE + PARENT_SIZE;

// --- Leaf header -------------------------------------------------------
const LEAF_NODE_NUM_CELLS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const LEAF_NODE_NUM_CELLS_SIZE: usize = 4;
const LEAF_NODE_NEXT_LEAF_OFFSET: usize = LEAF_NODE_NUM_CELLS_OFFSET + LEAF_NODE_NUM_CELLS_SIZE;
const LEAF_NODE_NEXT_LEAF_SIZE: usize = 4;
pub const LEAF_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + LEAF_NODE_NUM_CELLS_SIZE + LEAF_NODE_NEXT_LEAF_SIZE;

// --- Leaf body -----------------------------------------------------------
pub const LEAF_NODE_KEY_SIZE: usize = 4;
pub const LEAF_NODE_VALUE_SIZE: usize = ROW_SIZE;
pub const LEAF_NODE_CELL_SIZE: usize = LEAF_NODE_KEY_SIZE + LEAF_NODE_VALUE_SIZE;
const LEAF_NODE_SPACE_FOR_CELLS: usize = PAGE_SIZE - LEAF_NODE_HEADER_SIZE;
pub const LEAF_NODE_MAX_CELLS: usize = LEAF_NODE_SPACE_FOR_CELLS / LEAF_NODE_CELL_SIZE;
pub const LEAF_NODE_RIGHT_SPLIT_COUNT: usize = (LEAF_NODE_MAX_CELLS + 1) / 2;
pub const LEAF_NODE_LEFT_SPLIT_COUNT: usize =
    (LEAF_NODE_MAX_CELLS + 1) - LEAF_NODE_RIGHT_SPLIT_COUNT;

// --- Internal header -----------------------------------------------------
const INTERNAL_NODE_NUM_KEYS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const INTERNAL_NODE_NUM_KEYS_SIZE: usize = 4;
const INTERNAL_NODE_RIGHT_CHILD_OFFSET: usize =
    INTERNAL_NODE_NUM_KEYS_OFFSET + INTERNAL_NODE_NUM_KEYS_SIZE;
const INTERNAL_NODE_RIGHT_CHILD_SIZE: usize = 4;
pub const INTERNAL_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + INTERNAL_NODE_NUM_KEYS_SIZE + INTERNAL_NODE_RIGHT_CHILD_SIZE;

// --- Internal body ---------------------------------------------------------
pub const INTERNAL_NODE_CHILD_SIZE: usize = 4;
pub const INTERNAL_NODE_KEY_SIZE: usize = 4;
pub const INTERNAL_NODE_CELL_SIZE: usize = INTERNAL_NODE_CHILD_SIZE + INTERNAL_NODE_KEY_SIZE;

/// Kept small (spec §3) so a handful of inserts exercises internal splits.
pub const INTERNAL_NODE_MAX_CELLS: usize = 3;

/// A single 4KB page, interpreted as either a leaf or an internal node.
///
/// Owns its buffer so it can live in a Pager slot or a transaction shadow
/// slot interchangeably; every accessor here is a pure function of `data`.
#[derive(Debug, Clone)]
pub struct Node {
    pub data: [u8; PAGE_SIZE],
}

impl Node {
    pub fn from_bytes(data: [u8; PAGE_SIZE]) -> Self {
        Node { data }
    }

    pub fn zeroed() -> Self {
        Node {
            data: [0u8; PAGE_SIZE],
        }
    }

    // ---- common header ----

    pub fn node_type(&self) -> Result<NodeType, Error> {
        match self.data[NODE_TYPE_OFFSET] {
            0 => Ok(NodeType::Leaf),
            1 => Ok(NodeType::Internal),
            other => Err(Error::CorruptFile(format!(
                "invalid node type byte {other}"
            ))),
        }
    }

    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.data[NODE_TYPE_OFFSET] = match node_type {
            NodeType::Leaf => 0,
            NodeType::Internal => 1,
        };
    }

    pub fn is_root(&self) -> bool {
        self.data[IS_ROOT_OFFSET] == 1
    }

    pub fn set_is_root(&mut self, is_root: bool) {
        self.data[IS_ROOT_OFFSET] = is_root as u8;
    }

    pub fn parent(&self) -> u32 {
        read_u32(&self.data, PARENT_OFFSET)
    }

    pub fn set_parent(&mut self, parent: u32) {
        write_u32(&mut self.data, PARENT_OFFSET, parent);
    }

    // ---- leaf header ----

    pub fn leaf_num_cells(&self) -> u32 {
        read_u32(&self.data, LEAF_NODE_NUM_CELLS_OFFSET)
    }

    pub fn set_leaf_num_cells(&mut self, n: u32) {
        write_u32(&mut self.data, LEAF_NODE_NUM_CELLS_OFFSET, n);
    }

    pub fn leaf_next_leaf(&self) -> u32 {
        read_u32(&self.data, LEAF_NODE_NEXT_LEAF_OFFSET)
    }

    pub fn set_leaf_next_leaf(&mut self, next: u32) {
        write_u32(&mut self.data, LEAF_NODE_NEXT_LEAF_OFFSET, next);
    }

    fn leaf_cell_offset(&self, cell_num: usize) -> usize {
        LEAF_NODE_HEADER_SIZE + cell_num * LEAF_NODE_CELL_SIZE
    }

    pub fn leaf_key(&self, cell_num: usize) -> u32 {
        let off = self.leaf_cell_offset(cell_num);
        read_u32(&self.data, off)
    }

    pub fn set_leaf_key(&mut self, cell_num: usize, key: u32) {
        let off = self.leaf_cell_offset(cell_num);
        write_u32(&mut self.data, off, key);
    }

    pub fn leaf_value(&self, cell_num: usize) -> &[u8] {
        let off = self.leaf_cell_offset(cell_num) + LEAF_NODE_KEY_SIZE;
        &self.data[off..off + LEAF_NODE_VALUE_SIZE]
    }

    pub fn set_leaf_value(&mut self, cell_num: usize, value: &[u8]) {
        debug_assert_eq!(value.len(), LEAF_NODE_VALUE_SIZE);
        let off = self.leaf_cell_offset(cell_num) + LEAF_NODE_KEY_SIZE;
        self.data[off..off + LEAF_NODE_VALUE_SIZE].copy_from_slice(value);
    }

    pub fn leaf_cell(&self, cell_num: usize) -> &[u8] {
        let off = self.leaf_cell_offset(cell_num);
        &self.data[off..off + LEAF_NODE_CELL_SIZE]
    }

    pub fn copy_leaf_cell(&mut self, dest: usize, src_cell: &[u8]) {
        let off = self.leaf_cell_offset(dest);
        self.data[off..off + LEAF_NODE_CELL_SIZE].copy_from_slice(src_cell);
    }

    // ---- internal header ----

    pub fn internal_num_keys(&self) -> u32 {
        read_u32(&self.data, INTERNAL_NODE_NUM_KEYS_OFFSET)
    }

    pub fn set_internal_num_keys(&mut self, n: u32) {
        write_u32(&mut self.data, INTERNAL_NODE_NUM_KEYS_OFFSET, n);
    }

    pub fn internal_right_child(&self) -> u32 {
        read_u32(&self.data, INTERNAL_NODE_RIGHT_CHILD_OFFSET)
    }

    pub fn set_internal_right_child(&mut self, child: u32) {
        write_u32(&mut self.data, INTERNAL_NODE_RIGHT_CHILD_OFFSET, child);
    }

    fn internal_cell_offset(&self, cell_num: usize) -> usize {
        INTERNAL_NODE_HEADER_SIZE + cell_num * INTERNAL_NODE_CELL_SIZE
    }

    pub fn internal_child(&self, cell_num: usize) -> Result<u32, Error> {
        let num_keys = self.internal_num_keys() as usize;
        if cell_num > num_keys {
            return Err(Error::InvalidPageAccess(format!(
                "internal child index {cell_num} exceeds num_keys {num_keys}"
            )));
        }
        let child = if cell_num == num_keys {
            self.internal_right_child()
        } else {
            let off = self.internal_cell_offset(cell_num);
            read_u32(&self.data, off)
        };
        if child == INVALID_PAGE {
            return Err(Error::InvalidPageAccess(
                "dereferenced INVALID_PAGE child".into(),
            ));
        }
        Ok(child)
    }

    pub fn set_internal_child(&mut self, cell_num: usize, child: u32) {
        let off = self.internal_cell_offset(cell_num);
        write_u32(&mut self.data, off, child);
    }

    pub fn internal_key(&self, cell_num: usize) -> u32 {
        let off = self.internal_cell_offset(cell_num) + INTERNAL_NODE_CHILD_SIZE;
        read_u32(&self.data, off)
    }

    pub fn set_internal_key(&mut self, cell_num: usize, key: u32) {
        let off = self.internal_cell_offset(cell_num) + INTERNAL_NODE_CHILD_SIZE;
        write_u32(&mut self.data, off, key);
    }

    pub fn internal_cell(&self, cell_num: usize) -> &[u8] {
        let off = self.internal_cell_offset(cell_num);
        &self.data[off..off + INTERNAL_NODE_CELL_SIZE]
    }

    pub fn copy_internal_cell(&mut self, dest: usize, src_cell: &[u8]) {
        let off = self.internal_cell_offset(dest);
        self.data[off..off + INTERNAL_NODE_CELL_SIZE].copy_from_slice(src_cell);
    }

    /// Binary search an internal node for the smallest cell whose key is
    /// `>= target`; returns `num_keys` when every cell's key is smaller
    /// (meaning `right_child` is the subtree to descend into).
    pub fn internal_find_child_index(&self, target: u32) -> usize {
        let mut lo = 0usize;
        let mut hi = self.internal_num_keys() as usize;
        while lo != hi {
            let mid = (lo + hi) / 2;
            if self.internal_key(mid) >= target {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    // ---- shared ----

    pub fn init_leaf(&mut self) {
        self.set_node_type(NodeType::Leaf);
        self.set_is_root(false);
        self.set_leaf_num_cells(0);
        self.set_leaf_next_leaf(0);
    }

    pub fn init_internal(&mut self) {
        self.set_node_type(NodeType::Internal);
        self.set_is_root(false);
        self.set_internal_num_keys(0);
        self.set_internal_right_child(INVALID_PAGE);
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_roundtrips_key_and_value() {
        let mut node = Node::zeroed();
        node.init_leaf();
        node.set_leaf_num_cells(1);
        node.set_leaf_key(0, 42);
        let value = [7u8; LEAF_NODE_VALUE_SIZE];
        node.set_leaf_value(0, &value);
        assert_eq!(node.leaf_key(0), 42);
        assert_eq!(node.leaf_value(0), &value[..]);
    }

    #[test]
    fn internal_right_child_is_distinct_from_cells() {
        let mut node = Node::zeroed();
        node.init_internal();
        node.set_internal_num_keys(1);
        node.set_internal_child(0, 5);
        node.set_internal_key(0, 100);
        node.set_internal_right_child(9);
        assert_eq!(node.internal_child(0).unwrap(), 5);
        assert_eq!(node.internal_child(1).unwrap(), 9);
        assert_eq!(node.internal_key(0), 100);
    }

    #[test]
    fn leaf_max_cells_matches_classic_layout() {
        // This is the textbook db_tutorial layout: a 293-byte value plus a
        // 4-byte key packs 13 cells into a 4KB page after a 14-byte header.
        assert_eq!(LEAF_NODE_HEADER_SIZE, 14);
        assert_eq!(LEAF_NODE_MAX_CELLS, 13);
    }
}
