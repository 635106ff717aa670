//! B+tree core: search, insert with leaf/internal split and root
//! promotion, delete with leaf merge, parent-pointer maintenance (spec
//! §4.3). Grounded on the teacher's `storage/table.rs` split/promote
//! logic, extended to actually descend internal nodes on search (the
//! teacher's `storage/cursor.rs::find` only ever looked at one level) and
//! to define the handful of `Node` accessors `storage/table.rs` called
//! but `storage/btree.rs` never defined.
use tracing::{debug, trace, warn};

use crate::cursor::Cursor;
use crate::errors::Error;
use crate::node::{
    NodeType, INTERNAL_NODE_MAX_CELLS, INVALID_PAGE, LEAF_NODE_LEFT_SPLIT_COUNT,
    LEAF_NODE_MAX_CELLS, LEAF_NODE_RIGHT_SPLIT_COUNT,
};
use crate::row::ROW_SIZE;
use crate::transaction::Transaction;

pub const ROOT_PAGE: u32 = 0;

/// Ensure page 0 exists and is initialised as an empty root leaf. Called
/// once when a brand-new database file is opened.
pub fn init_if_empty(txn: &mut Transaction) -> Result<(), Error> {
    if txn.num_pages() == 0 {
        let page = txn.allocate_unused_page()?;
        debug_assert_eq!(page, ROOT_PAGE);
        let root = txn.page_for_write(ROOT_PAGE)?;
        root.init_leaf();
        root.set_is_root(true);
        debug!("initialised empty root leaf");
    }
    Ok(())
}

/// Descend from the root to the leaf that contains (or should contain)
/// `key`, returning a cursor positioned at the matching cell or at the
/// insertion point.
pub fn find(txn: &mut Transaction, key: u32) -> Result<Cursor, Error> {
    let mut page = ROOT_PAGE;
    loop {
        let node = txn.page_for_read(page)?;
        match node.node_type()? {
            NodeType::Leaf => return Ok(leaf_find(txn, page, key)?),
            NodeType::Internal => {
                let idx = node.internal_find_child_index(key);
                page = node.internal_child(idx)?;
            }
        }
    }
}

fn leaf_find(txn: &mut Transaction, page: u32, key: u32) -> Result<Cursor, Error> {
    let node = txn.page_for_read(page)?;
    let num_cells = node.leaf_num_cells() as usize;
    let mut lo = 0usize;
    let mut hi = num_cells;
    while lo != hi {
        let mid = (lo + hi) / 2;
        let mid_key = node.leaf_key(mid);
        if mid_key == key {
            return Ok(Cursor::new(page, mid, false));
        }
        if key < mid_key {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    Ok(Cursor::new(page, lo, lo >= num_cells))
}

fn max_key(txn: &mut Transaction, page: u32) -> Result<u32, Error> {
    let node = txn.page_for_read(page)?;
    match node.node_type()? {
        NodeType::Leaf => {
            let n = node.leaf_num_cells() as usize;
            Ok(node.leaf_key(n - 1))
        }
        NodeType::Internal => {
            let right_child = node.internal_right_child();
            max_key(txn, right_child)
        }
    }
}

/// Insert `{key, row}`. Duplicate keys are rejected (spec §4.3 failure
/// semantics, I5).
pub fn insert(txn: &mut Transaction, key: u32, row: &[u8; ROW_SIZE]) -> Result<(), Error> {
    let cursor = find(txn, key)?;
    let node = txn.page_for_read(cursor.page)?;
    let num_cells = node.leaf_num_cells() as usize;
    if !cursor.end && cursor.cell < num_cells && node.leaf_key(cursor.cell) == key {
        return Err(Error::DuplicateKey(key));
    }

    let node = txn.page_for_write(cursor.page)?;
    let num_cells = node.leaf_num_cells() as usize;
    if num_cells < LEAF_NODE_MAX_CELLS {
        shift_leaf_cells_right(node, cursor.cell, num_cells);
        node.set_leaf_key(cursor.cell, key);
        node.set_leaf_value(cursor.cell, row);
        node.set_leaf_num_cells(num_cells as u32 + 1);
        return Ok(());
    }

    leaf_split_and_insert(txn, cursor.page, cursor.cell, key, row)
}

fn shift_leaf_cells_right(node: &mut crate::node::Node, insert_at: usize, num_cells: usize) {
    for i in (insert_at..num_cells).rev() {
        let cell = node.leaf_cell(i).to_vec();
        node.copy_leaf_cell(i + 1, &cell);
    }
}

/// Split a full leaf `old` into `old` and a new leaf `R`, then either
/// promote (if `old` was the root) or insert a separator into the
/// parent (spec §4.3 "Insert").
fn leaf_split_and_insert(
    txn: &mut Transaction,
    old_page: u32,
    insert_at: usize,
    key: u32,
    row: &[u8; ROW_SIZE],
) -> Result<(), Error> {
    warn!(page = old_page, "leaf full, splitting");
    let new_page = txn.allocate_unused_page()?;
    let old_next_leaf = txn.page_for_read(old_page)?.leaf_next_leaf();
    let old_parent = txn.page_for_read(old_page)?.parent();
    let was_root = txn.page_for_read(old_page)?.is_root();

    // Snapshot the old node's current cells before any mutation; the
    // redistribution below reads `old[i]` positions that shift meaning
    // as we write into `old` and `R` in the same pass otherwise.
    let old_cells: Vec<[u8; crate::node::LEAF_NODE_CELL_SIZE]> = {
        let old = txn.page_for_read(old_page)?;
        (0..LEAF_NODE_MAX_CELLS)
            .map(|i| old.leaf_cell(i).try_into().unwrap())
            .collect()
    };

    {
        let new_node = txn.page_for_write(new_page)?;
        new_node.init_leaf();
        new_node.set_leaf_next_leaf(old_next_leaf);
        new_node.set_parent(old_parent);
    }

    for i in (0..=LEAF_NODE_MAX_CELLS).rev() {
        let dest_page = if i >= LEAF_NODE_LEFT_SPLIT_COUNT {
            new_page
        } else {
            old_page
        };
        let dest_index = i % LEAF_NODE_LEFT_SPLIT_COUNT;
        let dest = txn.page_for_write(dest_page)?;
        if i == insert_at {
            dest.set_leaf_key(dest_index, key);
            dest.set_leaf_value(dest_index, row);
        } else {
            let src_index = if i > insert_at { i - 1 } else { i };
            let cell = old_cells[src_index];
            dest.copy_leaf_cell(dest_index, &cell);
        }
    }

    txn.page_for_write(old_page)?
        .set_leaf_num_cells(LEAF_NODE_LEFT_SPLIT_COUNT as u32);
    txn.page_for_write(new_page)?
        .set_leaf_num_cells(LEAF_NODE_RIGHT_SPLIT_COUNT as u32);
    txn.page_for_write(old_page)?.set_leaf_next_leaf(new_page);

    if was_root {
        create_new_root(txn, old_page, new_page)?;
        return Ok(());
    }

    let parent = old_parent;
    let old_max_before = max_key_leaf_at(txn, old_page)?;
    update_separator(txn, parent, old_max_before, max_key(txn, old_page)?)?;
    internal_insert(txn, parent, new_page)
}

fn max_key_leaf_at(txn: &mut Transaction, page: u32) -> Result<u32, Error> {
    // After a split, `old`'s new max is its last cell; callers need the
    // separator it's replacing, which is the split node's own prior max.
    // We recompute it from the just-written left half.
    let node = txn.page_for_read(page)?;
    let n = node.leaf_num_cells() as usize;
    Ok(node.leaf_key(n - 1))
}

/// Find the cell in `parent` whose child is `child_page` (or the
/// right-child slot) and rewrite its separator key.
fn update_separator(
    txn: &mut Transaction,
    parent: u32,
    old_key: u32,
    new_key: u32,
) -> Result<(), Error> {
    if old_key == new_key {
        return Ok(());
    }
    let node = txn.page_for_read(parent)?;
    let idx = node.internal_find_child_index(old_key);
    let num_keys = node.internal_num_keys() as usize;
    let node = txn.page_for_write(parent)?;
    if idx < num_keys && node.internal_key(idx) == old_key {
        node.set_internal_key(idx, new_key);
    }
    Ok(())
}

/// Copy the root page into a fresh left child, then reinitialise the
/// root as an internal node with one separator (spec §4.3
/// "new-root promotion").
fn create_new_root(txn: &mut Transaction, root: u32, right: u32) -> Result<(), Error> {
    let left = txn.allocate_unused_page()?;
    let root_copy = txn.page_for_read(root)?.clone();
    {
        let left_node = txn.page_for_write(left)?;
        *left_node = root_copy;
        left_node.set_is_root(false);
        left_node.set_parent(root);
    }
    if txn.page_for_read(left)?.node_type()? == NodeType::Internal {
        reparent_children(txn, left)?;
    }

    let left_max = max_key(txn, left)?;
    let root_node = txn.page_for_write(root)?;
    root_node.init_internal();
    root_node.set_is_root(true);
    root_node.set_internal_num_keys(1);
    root_node.set_internal_child(0, left);
    root_node.set_internal_key(0, left_max);
    root_node.set_internal_right_child(right);

    txn.page_for_write(right)?.set_parent(root);
    trace!(root, left, right, "promoted new root");
    Ok(())
}

fn reparent_children(txn: &mut Transaction, parent: u32) -> Result<(), Error> {
    let node = txn.page_for_read(parent)?;
    let num_keys = node.internal_num_keys() as usize;
    let mut children = Vec::with_capacity(num_keys + 1);
    for i in 0..=num_keys {
        children.push(node.internal_child(i)?);
    }
    for child in children {
        txn.page_for_write(child)?.set_parent(parent);
    }
    Ok(())
}

/// Insert a `{child, max_key(child)}` separator into `parent` (spec
/// §4.3 "internal_insert").
fn internal_insert(txn: &mut Transaction, parent: u32, child: u32) -> Result<(), Error> {
    let child_max = max_key(txn, child)?;
    let node = txn.page_for_read(parent)?;
    let num_keys = node.internal_num_keys() as usize;
    let right_child = node.internal_right_child();

    if num_keys >= INTERNAL_NODE_MAX_CELLS {
        return internal_split_and_insert(txn, parent, child);
    }

    let node = txn.page_for_write(parent)?;
    if right_child == INVALID_PAGE {
        node.set_internal_right_child(child);
        txn.page_for_write(child)?.set_parent(parent);
        return Ok(());
    }

    let right_child_max = max_key(txn, right_child)?;
    let node = txn.page_for_write(parent)?;
    if child_max > right_child_max {
        node.set_internal_child(num_keys, right_child);
        node.set_internal_key(num_keys, right_child_max);
        node.set_internal_num_keys(num_keys as u32 + 1);
        node.set_internal_right_child(child);
    } else {
        let idx = node.internal_find_child_index(child_max);
        for i in (idx..num_keys).rev() {
            let cell = node.internal_cell(i).to_vec();
            node.copy_internal_cell(i + 1, &cell);
        }
        node.set_internal_child(idx, child);
        node.set_internal_key(idx, child_max);
        node.set_internal_num_keys(num_keys as u32 + 1);
    }
    txn.page_for_write(child)?.set_parent(parent);
    Ok(())
}

/// Split a full internal node, moving its upper half (plus the old
/// right child) into a new sibling, then insert the inbound child on
/// whichever side it belongs (spec §4.3 "internal_split_and_insert").
fn internal_split_and_insert(txn: &mut Transaction, old: u32, child: u32) -> Result<(), Error> {
    warn!(page = old, "internal node full, splitting");
    let was_root = txn.page_for_read(old)?.is_root();
    let new_node = txn.allocate_unused_page()?;
    txn.page_for_write(new_node)?.init_internal();

    // `working` is the node whose cells we actually redistribute: `old`
    // itself, or — if `old` is the root — a fresh page holding a copy of
    // `old`'s contents, with `old` reinitialised to reference it via
    // `right_child` (no separator key needed yet: a lone right_child is
    // a well-formed one-child internal node, and the `internal_insert`
    // below that places `new_node` appends it as cell 0 when it sees a
    // non-INVALID right_child already occupied).
    let working = if was_root {
        let left = txn.allocate_unused_page()?;
        let old_copy = txn.page_for_read(old)?.clone();
        {
            let left_node = txn.page_for_write(left)?;
            *left_node = old_copy;
            left_node.set_is_root(false);
            left_node.set_parent(old);
        }
        if txn.page_for_read(left)?.node_type()? == NodeType::Internal {
            reparent_children(txn, left)?;
        }
        let root_node = txn.page_for_write(old)?;
        root_node.init_internal();
        root_node.set_is_root(true);
        root_node.set_internal_num_keys(0);
        root_node.set_internal_right_child(left);
        left
    } else {
        old
    };
    let grandparent = if was_root {
        old
    } else {
        txn.page_for_read(working)?.parent()
    };

    let old_right_child = txn.page_for_read(working)?.internal_right_child();
    let old_max_before_split = max_key(txn, old_right_child)?;
    let num_keys = txn.page_for_read(working)?.internal_num_keys() as usize;
    let split_start = num_keys / 2 + 1;

    let moved: Vec<u32> = {
        let node = txn.page_for_read(working)?;
        (split_start..num_keys)
            .map(|i| node.internal_child(i).unwrap())
            .collect()
    };
    txn.page_for_write(working)?
        .set_internal_num_keys(split_start as u32);

    for moved_child in moved.into_iter().rev() {
        internal_insert(txn, new_node, moved_child)?;
    }
    internal_insert(txn, new_node, old_right_child)?;

    let remaining = txn.page_for_read(working)?.internal_num_keys() as usize;
    let last_child = txn.page_for_read(working)?.internal_child(remaining - 1)?;
    {
        let node = txn.page_for_write(working)?;
        node.set_internal_right_child(last_child);
        node.set_internal_num_keys(remaining as u32 - 1);
    }

    let working_max = max_key(txn, working)?;
    if max_key(txn, child)? > working_max {
        internal_insert(txn, new_node, child)?;
    } else {
        internal_insert(txn, working, child)?;
    }

    // `grandparent` is `old` itself in the root case (now a bare
    // `right_child` pointing at `working`, no separator to fix up) and
    // `working`'s real parent otherwise. Either way `new_node` still
    // needs to be attached — skipping this for the root case would leave
    // it floating with nothing in the tree pointing at it.
    if !was_root {
        update_separator(txn, grandparent, old_max_before_split, working_max)?;
    }
    internal_insert(txn, grandparent, new_node)?;
    Ok(())
}

/// Delete `key`. Missing key on a non-empty tree is `KeyNotFound` (spec
/// §4.3 failure semantics). Merge is attempted opportunistically when a
/// leaf empties (spec explicitly permits deferring merge entirely).
pub fn delete(txn: &mut Transaction, key: u32) -> Result<(), Error> {
    let cursor = find(txn, key)?;
    let node = txn.page_for_read(cursor.page)?;
    let num_cells = node.leaf_num_cells() as usize;
    if cursor.end || cursor.cell >= num_cells || node.leaf_key(cursor.cell) != key {
        return Err(Error::KeyNotFound(key));
    }

    let node = txn.page_for_write(cursor.page)?;
    for i in cursor.cell..num_cells - 1 {
        let cell = node.leaf_cell(i + 1).to_vec();
        node.copy_leaf_cell(i, &cell);
    }
    node.set_leaf_num_cells(num_cells as u32 - 1);
    debug!(key, page = cursor.page, "deleted row");

    let node = txn.page_for_read(cursor.page)?;
    if node.leaf_num_cells() == 0 && !node.is_root() {
        try_merge_with_left_sibling(txn, cursor.page)?;
    }
    Ok(())
}

/// Best-effort `leaf_merge(left, self)` when `self` just went empty
/// (spec §4.3 "Delete"/"leaf_merge"). Silently does nothing if there is
/// no left sibling in the parent, which leaves an empty leaf reachable
/// only via `next_leaf` — an accepted consequence of deferring merge.
fn try_merge_with_left_sibling(txn: &mut Transaction, page: u32) -> Result<(), Error> {
    let parent = txn.page_for_read(page)?.parent();
    let node = txn.page_for_read(parent)?;
    let num_keys = node.internal_num_keys() as usize;
    let mut my_index = None;
    for i in 0..=num_keys {
        if node.internal_child(i)? == page {
            my_index = Some(i);
            break;
        }
    }
    let Some(my_index) = my_index else {
        return Ok(());
    };
    if my_index == 0 {
        return Ok(());
    }
    let left_page = txn.page_for_read(parent)?.internal_child(my_index - 1)?;
    let left_count = txn.page_for_read(left_page)?.leaf_num_cells() as usize;
    if left_count >= LEAF_NODE_MAX_CELLS {
        return Ok(());
    }
    leaf_merge(txn, left_page, page, parent, my_index - 1)
}

/// Merge empty/near-empty `right` into `left` (spec §4.3 "leaf_merge").
fn leaf_merge(
    txn: &mut Transaction,
    left: u32,
    right: u32,
    parent: u32,
    left_index: usize,
) -> Result<(), Error> {
    let right_cells: Vec<[u8; crate::node::LEAF_NODE_CELL_SIZE]> = {
        let r = txn.page_for_read(right)?;
        (0..r.leaf_num_cells() as usize)
            .map(|i| r.leaf_cell(i).try_into().unwrap())
            .collect()
    };
    let right_next_leaf = txn.page_for_read(right)?.leaf_next_leaf();

    let left_node = txn.page_for_write(left)?;
    let mut n = left_node.leaf_num_cells() as usize;
    for cell in &right_cells {
        left_node.copy_leaf_cell(n, cell);
        n += 1;
    }
    left_node.set_leaf_num_cells(n as u32);
    left_node.set_leaf_next_leaf(right_next_leaf);

    let num_keys = txn.page_for_read(parent)?.internal_num_keys() as usize;
    let right_index = left_index + 1;
    if right_index == num_keys {
        // `right` was the right_child sentinel: drop `left`'s own cell
        // and promote `left` into the right_child slot.
        let parent_node = txn.page_for_write(parent)?;
        for i in (left_index..num_keys.saturating_sub(1)).rev() {
            let cell = parent_node.internal_cell(i + 1).to_vec();
            parent_node.copy_internal_cell(i, &cell);
        }
        parent_node.set_internal_num_keys(num_keys as u32 - 1);
        parent_node.set_internal_right_child(left);
    } else {
        // `right` owns cell `right_index`; drop it and shift the tail left.
        let parent_node = txn.page_for_write(parent)?;
        for i in right_index..num_keys.saturating_sub(1) {
            let cell = parent_node.internal_cell(i + 1).to_vec();
            parent_node.copy_internal_cell(i, &cell);
        }
        parent_node.set_internal_num_keys(num_keys as u32 - 1);
        let left_max = max_key(txn, left)?;
        let node = txn.page_for_write(parent)?;
        if left_index < node.internal_num_keys() as usize {
            node.set_internal_key(left_index, left_max);
        }
    }

    warn!(left, right, "merged empty leaf into left sibling");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::Pager;
    use crate::row::Row;

    fn open_txn() -> (tempfile::TempDir, Transaction) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let pager = Pager::open(&path).unwrap();
        let mut txn = Transaction::new(pager);
        init_if_empty(&mut txn).unwrap();
        (dir, txn)
    }

    fn put(txn: &mut Transaction, id: u32) {
        let row = Row::new(id, format!("user{id}"), format!("user{id}@example.com")).unwrap();
        insert(txn, id, &row.serialize()).unwrap();
    }

    #[test]
    fn insert_and_find_single_row() {
        let (_dir, mut txn) = open_txn();
        put(&mut txn, 7);
        let cursor = find(&mut txn, 7).unwrap();
        assert!(!cursor.end);
        let row = Row::deserialize(cursor.value_bytes(&mut txn).unwrap()).unwrap();
        assert_eq!(row.id, 7);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let (_dir, mut txn) = open_txn();
        put(&mut txn, 1);
        let row = Row::new(1, "dup", "dup@example.com").unwrap();
        assert!(matches!(
            insert(&mut txn, 1, &row.serialize()),
            Err(Error::DuplicateKey(1))
        ));
    }

    #[test]
    fn insert_many_rows_triggers_leaf_and_internal_splits() {
        let (_dir, mut txn) = open_txn();
        for id in 1..=200u32 {
            put(&mut txn, id);
        }
        for id in 1..=200u32 {
            let cursor = find(&mut txn, id).unwrap();
            assert!(!cursor.end, "key {id} should be found");
            let row = Row::deserialize(cursor.value_bytes(&mut txn).unwrap()).unwrap();
            assert_eq!(row.id, id);
        }
    }

    #[test]
    fn leaf_chain_visits_keys_in_ascending_order() {
        let (_dir, mut txn) = open_txn();
        for id in (1..=100u32).rev() {
            put(&mut txn, id);
        }
        let mut cursor = find(&mut txn, 1).unwrap();
        let mut seen = Vec::new();
        loop {
            seen.push(cursor.key(&mut txn).unwrap());
            cursor.advance(&mut txn).unwrap();
            if cursor.end {
                break;
            }
        }
        let expected: Vec<u32> = (1..=100).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn delete_missing_key_is_key_not_found() {
        let (_dir, mut txn) = open_txn();
        put(&mut txn, 1);
        assert!(matches!(delete(&mut txn, 99), Err(Error::KeyNotFound(99))));
    }

    #[test]
    fn delete_then_find_returns_nothing() {
        let (_dir, mut txn) = open_txn();
        put(&mut txn, 1);
        put(&mut txn, 2);
        delete(&mut txn, 1).unwrap();
        assert!(matches!(delete(&mut txn, 1), Err(Error::KeyNotFound(1))));
        let cursor = find(&mut txn, 2).unwrap();
        assert!(!cursor.end);
    }
}
