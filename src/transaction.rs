//! Shadow-page transactions (spec §4.4): the first write to a page within
//! a transaction copies it into a private shadow slot; commit overwrites
//! the originals and fsyncs; rollback just discards the shadows. No WAL —
//! multi-page commit atomicity is not guaranteed under crash (spec §4.4,
//! §9 "Shadow paging vs. WAL").
use std::collections::HashMap;

use tracing::{debug, info};

use crate::errors::Error;
use crate::node::Node;
use crate::pager::Pager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    None,
    Active,
    Committed,
    Aborted,
}

/// Routes every page read/write for the B+tree and owns the single
/// `Pager`. All core code reads/writes pages exclusively through this
/// type so the read-your-writes guarantee (spec §5) holds even when no
/// transaction is active.
pub struct Transaction {
    pager: Pager,
    state: TxnState,
    shadows: HashMap<u32, Node>,
    modified: Vec<u32>,
}

impl Transaction {
    pub fn new(pager: Pager) -> Self {
        Transaction {
            pager,
            state: TxnState::None,
            shadows: HashMap::new(),
            modified: Vec::new(),
        }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn begin(&mut self) -> Result<(), Error> {
        if self.state == TxnState::Active {
            return Err(Error::TransactionAlreadyActive);
        }
        self.state = TxnState::Active;
        self.shadows.clear();
        self.modified.clear();
        debug!("transaction begin");
        Ok(())
    }

    /// Outside a transaction, a thin pass-through to the Pager. Inside
    /// one, materialises a shadow copy on first write and returns that.
    pub fn page_for_write(&mut self, n: u32) -> Result<&mut Node, Error> {
        if self.state != TxnState::Active {
            return self.pager.get(n);
        }
        if !self.shadows.contains_key(&n) {
            let original = self.pager.get(n)?.clone();
            self.shadows.insert(n, original);
            self.modified.push(n);
        }
        Ok(self.shadows.get_mut(&n).unwrap())
    }

    /// Reads see their own transaction's shadow if one exists, else the
    /// committed original — the read-your-writes guarantee.
    pub fn page_for_read(&mut self, n: u32) -> Result<&Node, Error> {
        if self.state == TxnState::Active && self.shadows.contains_key(&n) {
            return Ok(self.shadows.get(&n).unwrap());
        }
        Ok(self.pager.get(n)?)
    }

    pub fn allocate_unused_page(&mut self) -> Result<u32, Error> {
        self.pager.allocate_unused_page()
    }

    pub fn num_pages(&self) -> u32 {
        self.pager.num_pages
    }

    pub fn commit(&mut self) -> Result<(), Error> {
        if self.state != TxnState::Active {
            return Err(Error::NoActiveTransaction);
        }
        for n in self.modified.drain(..) {
            if let Some(shadow) = self.shadows.remove(&n) {
                *self.pager.get(n)? = shadow;
                self.pager.flush(n)?;
            }
        }
        self.pager.fsync()?;
        self.shadows.clear();
        self.state = TxnState::Committed;
        info!("transaction committed");
        self.state = TxnState::None;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<(), Error> {
        if self.state != TxnState::Active {
            return Err(Error::NoActiveTransaction);
        }
        self.shadows.clear();
        self.modified.clear();
        self.state = TxnState::Aborted;
        info!("transaction rolled back");
        self.state = TxnState::None;
        Ok(())
    }

    pub fn close(self) -> Result<(), Error> {
        self.pager.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_txn() -> (tempfile::TempDir, Transaction) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let pager = Pager::open(&path).unwrap();
        (dir, Transaction::new(pager))
    }

    #[test]
    fn writes_outside_a_transaction_go_straight_to_the_pager() {
        let (_dir, mut txn) = open_txn();
        txn.page_for_write(0).unwrap().init_leaf();
        assert_eq!(txn.page_for_read(0).unwrap().leaf_num_cells(), 0);
    }

    #[test]
    fn rollback_discards_shadow_writes() {
        let (_dir, mut txn) = open_txn();
        txn.page_for_write(0).unwrap().init_leaf();
        txn.begin().unwrap();
        txn.page_for_write(0).unwrap().set_leaf_num_cells(5);
        assert_eq!(txn.page_for_read(0).unwrap().leaf_num_cells(), 5);
        txn.rollback().unwrap();
        assert_eq!(txn.page_for_read(0).unwrap().leaf_num_cells(), 0);
    }

    #[test]
    fn commit_makes_shadow_writes_durable() {
        let (_dir, mut txn) = open_txn();
        txn.page_for_write(0).unwrap().init_leaf();
        txn.begin().unwrap();
        txn.page_for_write(0).unwrap().set_leaf_num_cells(5);
        txn.commit().unwrap();
        assert_eq!(txn.page_for_read(0).unwrap().leaf_num_cells(), 5);
        assert_eq!(txn.state(), TxnState::None);
    }

    #[test]
    fn double_begin_is_rejected() {
        let (_dir, mut txn) = open_txn();
        txn.begin().unwrap();
        assert!(matches!(
            txn.begin(),
            Err(Error::TransactionAlreadyActive)
        ));
    }

    #[test]
    fn commit_without_begin_is_rejected() {
        let (_dir, mut txn) = open_txn();
        assert!(matches!(txn.commit(), Err(Error::NoActiveTransaction)));
    }
}
