//! Glues the Pager, Transaction, and Stats together behind the single
//! hard-coded table the spec's Non-goals call for (no multi-table
//! catalog). This is the type `main.rs` actually talks to.
use std::path::Path;

use tracing::info;

use crate::btree::{self, ROOT_PAGE};
use crate::errors::Error;
use crate::executor::{self, ExecResult};
use crate::node::{
    NodeType, COMMON_NODE_HEADER_SIZE, INTERNAL_NODE_CELL_SIZE, INTERNAL_NODE_HEADER_SIZE,
    INTERNAL_NODE_MAX_CELLS, LEAF_NODE_CELL_SIZE, LEAF_NODE_HEADER_SIZE, LEAF_NODE_MAX_CELLS,
    PAGE_SIZE,
};
use crate::pager::{Pager, TABLE_MAX_PAGES};
use crate::row::ROW_SIZE;
use crate::sql::Statement;
use crate::stats::Stats;
use crate::transaction::Transaction;

pub struct Table {
    txn: Transaction,
    stats: Stats,
}

impl Table {
    /// Opens (creating if absent) the database file and ensures page 0
    /// is an initialised root leaf.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let pager = Pager::open(path)?;
        let mut txn = Transaction::new(pager);
        btree::init_if_empty(&mut txn)?;
        Ok(Table {
            txn,
            stats: Stats::new(),
        })
    }

    pub fn execute(&mut self, statement: &Statement) -> Result<ExecResult, Error> {
        executor::execute(&mut self.txn, &mut self.stats, statement)
    }

    pub fn begin(&mut self) -> Result<(), Error> {
        self.txn.begin()
    }

    pub fn commit(&mut self) -> Result<(), Error> {
        self.txn.commit()
    }

    pub fn rollback(&mut self) -> Result<(), Error> {
        self.txn.rollback()
    }

    /// Recompute statistics from a full leaf-chain walk (`.stats` /
    /// `.analyze` / `analyze`, spec §6).
    pub fn analyze(&mut self) -> Result<&Stats, Error> {
        self.stats.collect(&mut self.txn)?;
        Ok(&self.stats)
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// `.btree`: a recursive, indented dump matching the original
    /// `print_tree`'s exact shape (spec SPEC_FULL §C).
    pub fn print_tree(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        print_node(&mut self.txn, ROOT_PAGE, 0, &mut out)?;
        Ok(out)
    }

    /// `.constants`: every layout constant by name, one per line (spec
    /// SPEC_FULL §C, following the original's `print_constants`).
    pub fn print_constants() -> String {
        format!(
            "ROW_SIZE: {ROW_SIZE}\n\
             COMMON_NODE_HEADER_SIZE: {COMMON_NODE_HEADER_SIZE}\n\
             LEAF_NODE_HEADER_SIZE: {LEAF_NODE_HEADER_SIZE}\n\
             LEAF_NODE_CELL_SIZE: {LEAF_NODE_CELL_SIZE}\n\
             LEAF_NODE_SPACE_FOR_CELLS: {space}\n\
             LEAF_NODE_MAX_CELLS: {LEAF_NODE_MAX_CELLS}\n\
             INTERNAL_NODE_HEADER_SIZE: {INTERNAL_NODE_HEADER_SIZE}\n\
             INTERNAL_NODE_CELL_SIZE: {INTERNAL_NODE_CELL_SIZE}\n\
             INTERNAL_NODE_MAX_CELLS: {INTERNAL_NODE_MAX_CELLS}\n\
             PAGE_SIZE: {PAGE_SIZE}\n\
             TABLE_MAX_PAGES: {TABLE_MAX_PAGES}",
            space = PAGE_SIZE - LEAF_NODE_HEADER_SIZE,
        )
    }

    /// Flush every cached page and close the file. Per spec §4.4 "forced
    /// commit on close", an active transaction is committed (with a
    /// warning) rather than silently discarded.
    pub fn close(mut self) -> Result<(), Error> {
        if self.txn.state() == crate::transaction::TxnState::Active {
            tracing::warn!("closing with an active transaction; forcing commit");
            self.txn.commit()?;
        }
        self.txn.close()?;
        info!("table closed");
        Ok(())
    }
}

fn print_node(
    txn: &mut Transaction,
    page: u32,
    depth: usize,
    out: &mut String,
) -> Result<(), Error> {
    let indent = "  ".repeat(depth);
    let node = txn.page_for_read(page)?;
    match node.node_type()? {
        NodeType::Leaf => {
            let n = node.leaf_num_cells();
            out.push_str(&format!("{indent}- leaf (size {n})\n"));
            for i in 0..n as usize {
                let key = node.leaf_key(i);
                out.push_str(&format!("{indent}  - {key}\n"));
            }
        }
        NodeType::Internal => {
            let n = node.internal_num_keys() as usize;
            out.push_str(&format!("{indent}- internal (size {n})\n"));
            let children: Vec<u32> = (0..=n).map(|i| node.internal_child(i).unwrap()).collect();
            let keys: Vec<u32> = (0..n).map(|i| node.internal_key(i)).collect();
            for i in 0..n {
                print_node(txn, children[i], depth + 1, out)?;
                out.push_str(&format!("{}- key {}\n", "  ".repeat(depth + 1), keys[i]));
            }
            print_node(txn, children[n], depth + 1, out)?;
        }
    }
    Ok(())
}
