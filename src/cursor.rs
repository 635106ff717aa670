//! Cursor: `{page, cell, end}`, advancing along the leaf chain (spec
//! §4.3 "Cursor"). Grounded on the teacher's `storage/cursor.rs`, but
//! `Btree::find` (not this type) does the internal-node descent the
//! teacher's version never implemented.
use crate::errors::Error;
use crate::row::ROW_SIZE;
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    pub page: u32,
    pub cell: usize,
    pub end: bool,
}

impl Cursor {
    pub fn new(page: u32, cell: usize, end: bool) -> Self {
        Cursor { page, cell, end }
    }

    /// Move to the next cell, following `next_leaf` at a leaf boundary.
    pub fn advance(&mut self, txn: &mut Transaction) -> Result<(), Error> {
        let node = txn.page_for_read(self.page)?;
        let num_cells = node.leaf_num_cells() as usize;
        let next_leaf = node.leaf_next_leaf();
        self.cell += 1;
        if self.cell >= num_cells {
            if next_leaf == 0 {
                self.end = true;
            } else {
                self.page = next_leaf;
                self.cell = 0;
            }
        }
        Ok(())
    }

    /// The key at the cursor's current position.
    pub fn key(&self, txn: &mut Transaction) -> Result<u32, Error> {
        let node = txn.page_for_read(self.page)?;
        Ok(node.leaf_key(self.cell))
    }

    /// The serialised row at the cursor's current position.
    pub fn value_bytes<'a>(&self, txn: &'a mut Transaction) -> Result<&'a [u8], Error> {
        let node = txn.page_for_read(self.page)?;
        let bytes = node.leaf_value(self.cell);
        debug_assert_eq!(bytes.len(), ROW_SIZE);
        Ok(bytes)
    }
}
