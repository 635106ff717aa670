//! In-memory table statistics (spec §4.5): row count, id range, and
//! approximate per-column cardinality via a hashed 1024-bit bitset.
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tracing::trace;

use crate::btree::ROOT_PAGE;
use crate::errors::Error;
use crate::node::NodeType;
use crate::row::Row;
use crate::transaction::Transaction;

const BITSET_BITS: usize = 1024;
const BITSET_WORDS: usize = BITSET_BITS / 64;

#[derive(Debug, Clone)]
struct Bitset {
    words: [u64; BITSET_WORDS],
    popcount: u32,
}

impl Bitset {
    fn new() -> Self {
        Bitset {
            words: [0u64; BITSET_WORDS],
            popcount: 0,
        }
    }

    fn insert(&mut self, value: impl Hash) {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        let bit = (hasher.finish() as usize) % BITSET_BITS;
        let word = bit / 64;
        let mask = 1u64 << (bit % 64);
        if self.words[word] & mask == 0 {
            self.words[word] |= mask;
            self.popcount += 1;
        }
    }

    fn clear(&mut self) {
        self.words = [0u64; BITSET_WORDS];
        self.popcount = 0;
    }
}

/// Row-count, id range, and cardinality estimates, seeded by a full
/// `collect()` walk and kept approximately fresh by the insert/delete
/// executors afterward.
#[derive(Debug, Clone)]
pub struct Stats {
    pub total_rows: u64,
    pub id_min: u32,
    pub id_max: u32,
    pub id_card: u32,
    pub username_card: u32,
    pub email_card: u32,
    pub valid: bool,
    id_bits: Bitset,
    username_bits: Bitset,
    email_bits: Bitset,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            total_rows: 0,
            id_min: u32::MAX,
            id_max: 0,
            id_card: 0,
            username_card: 0,
            email_card: 0,
            valid: false,
            id_bits: Bitset::new(),
            username_bits: Bitset::new(),
            email_bits: Bitset::new(),
        }
    }
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk the leaf chain from the leftmost leaf, rebuilding every
    /// field from scratch.
    pub fn collect(&mut self, txn: &mut Transaction) -> Result<(), Error> {
        *self = Stats::default();
        let mut page = leftmost_leaf(txn, ROOT_PAGE)?;
        loop {
            let node = txn.page_for_read(page)?;
            let num_cells = node.leaf_num_cells() as usize;
            let next_leaf = node.leaf_next_leaf();
            for i in 0..num_cells {
                let node = txn.page_for_read(page)?;
                let row = Row::deserialize(node.leaf_value(i))?;
                self.absorb(&row);
            }
            if next_leaf == 0 {
                break;
            }
            page = next_leaf;
        }
        self.valid = true;
        trace!(total_rows = self.total_rows, "collected statistics");
        Ok(())
    }

    fn absorb(&mut self, row: &Row) {
        self.total_rows += 1;
        self.id_min = self.id_min.min(row.id);
        self.id_max = self.id_max.max(row.id);
        self.id_bits.insert(row.id);
        self.username_bits.insert(&row.username);
        self.email_bits.insert(&row.email);
        self.id_card = self.id_bits.popcount;
        self.username_card = self.username_bits.popcount;
        self.email_card = self.email_bits.popcount;
    }

    /// Bumps `total_rows`, stretches the id range, and non-decreasingly
    /// tracks cardinality (spec §4.5).
    pub fn update_on_insert(&mut self, row: &Row) {
        if self.total_rows == 0 {
            self.id_min = row.id;
            self.id_max = row.id;
        }
        self.absorb(row);
    }

    /// Decrements `total_rows`; resets everything when the table goes
    /// empty (spec §4.5).
    pub fn update_on_delete(&mut self, _row: &Row) {
        self.total_rows = self.total_rows.saturating_sub(1);
        if self.total_rows == 0 {
            *self = Stats::default();
            self.valid = true;
        }
    }

    /// Persistence hook: a no-op, as spec.md §4.5 documents. A
    /// reimplementation that wants stats to survive a restart should
    /// store this struct in a reserved page instead of recomputing it.
    pub fn persist(&self, _txn: &mut Transaction) -> Result<(), Error> {
        Ok(())
    }
}

fn leftmost_leaf(txn: &mut Transaction, mut page: u32) -> Result<u32, Error> {
    loop {
        let node = txn.page_for_read(page)?;
        match node.node_type()? {
            NodeType::Leaf => return Ok(page),
            NodeType::Internal => {
                page = node.internal_child(0)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::{init_if_empty, insert};
    use crate::pager::Pager;

    fn open_txn() -> (tempfile::TempDir, Transaction) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let pager = Pager::open(&path).unwrap();
        let mut txn = Transaction::new(pager);
        init_if_empty(&mut txn).unwrap();
        (dir, txn)
    }

    #[test]
    fn collect_over_empty_table_is_valid_with_zero_rows() {
        let (_dir, mut txn) = open_txn();
        let mut stats = Stats::new();
        stats.collect(&mut txn).unwrap();
        assert!(stats.valid);
        assert_eq!(stats.total_rows, 0);
    }

    #[test]
    fn collect_tracks_id_min_and_max() {
        let (_dir, mut txn) = open_txn();
        for id in [5u32, 1, 9, 3] {
            let row = Row::new(id, "u", "e@x.com").unwrap();
            insert(&mut txn, id, &row.serialize()).unwrap();
        }
        let mut stats = Stats::new();
        stats.collect(&mut txn).unwrap();
        assert_eq!(stats.total_rows, 4);
        assert_eq!(stats.id_min, 1);
        assert_eq!(stats.id_max, 9);
    }

    #[test]
    fn cardinality_never_exceeds_total_rows_for_unique_ids() {
        let (_dir, mut txn) = open_txn();
        for id in 1..=50u32 {
            let row = Row::new(id, format!("u{id}"), "e@x.com").unwrap();
            insert(&mut txn, id, &row.serialize()).unwrap();
        }
        let mut stats = Stats::new();
        stats.collect(&mut txn).unwrap();
        assert!(stats.id_card <= stats.total_rows as u32);
        assert!(stats.id_card > 0);
    }

    #[test]
    fn update_on_delete_resets_when_table_goes_empty() {
        let mut stats = Stats::new();
        let row = Row::new(1, "a", "b").unwrap();
        stats.update_on_insert(&row);
        assert_eq!(stats.total_rows, 1);
        stats.update_on_delete(&row);
        assert_eq!(stats.total_rows, 0);
        assert_eq!(stats.id_min, u32::MAX);
    }
}
