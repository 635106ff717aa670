//! Drives a cursor through the plan the planner chose, applies the WHERE
//! predicate, and performs the mutation the statement describes (spec
//! §4.7 "Execution", "Delete executor", "Update executor").
use tracing::debug;

use crate::btree::{self, ROOT_PAGE};
use crate::cursor::Cursor;
use crate::errors::Error;
use crate::node::NodeType;
use crate::planner::{choose_plan, Plan};
use crate::row::Row;
use crate::sql::statement::{Statement, StatementKind, UpdateSpec};
use crate::sql::where_expr::ExprArena;
use crate::stats::Stats;
use crate::transaction::Transaction;

/// Per-statement bound on the number of ids a delete collects before
/// acting, to avoid unbounded buffering (spec §4.7).
pub const MAX_DELETE_BATCH: usize = 1000;

pub fn execute(
    txn: &mut Transaction,
    stats: &mut Stats,
    statement: &Statement,
) -> Result<ExecResult, Error> {
    match statement.kind {
        StatementKind::Insert => {
            let row = statement.row.as_ref().expect("insert statement carries a row");
            execute_insert(txn, stats, row)?;
            Ok(ExecResult::Inserted)
        }
        StatementKind::Select => {
            let rows = execute_select(txn, stats, statement.where_expr.as_ref())?;
            Ok(ExecResult::Rows(rows))
        }
        StatementKind::Update => {
            let n = execute_update(txn, stats, statement)?;
            Ok(ExecResult::Affected(n))
        }
        StatementKind::Delete => {
            let n = execute_delete(txn, stats, statement)?;
            Ok(ExecResult::Affected(n))
        }
    }
}

#[derive(Debug)]
pub enum ExecResult {
    Inserted,
    Rows(Vec<Row>),
    Affected(usize),
}

fn execute_insert(txn: &mut Transaction, stats: &mut Stats, row: &Row) -> Result<(), Error> {
    btree::insert(txn, row.id, &row.serialize())?;
    stats.update_on_insert(row);
    Ok(())
}

fn execute_select(
    txn: &mut Transaction,
    stats: &Stats,
    where_expr: Option<&(ExprArena, u32)>,
) -> Result<Vec<Row>, Error> {
    let plan = choose_plan(where_expr.map(|(a, r)| (a, *r)), stats);
    debug!(?plan, "selected plan");
    let mut rows = Vec::new();
    match plan {
        Plan::IndexLookup { key } => {
            let cursor = btree::find(txn, key)?;
            if !cursor.end {
                if let Some(row) = read_row_if_matching(txn, &cursor, key, where_expr)? {
                    rows.push(row);
                }
            }
        }
        Plan::RangeScan { start_key, forward } => {
            debug_assert!(forward, "reverse range scans are not produced by this planner");
            let mut cursor = if start_key == 0 {
                table_start(txn)?
            } else {
                btree::find(txn, start_key)?
            };
            walk_applying_where(txn, &mut cursor, where_expr, &mut rows)?;
        }
        Plan::FullScan => {
            let mut cursor = table_start(txn)?;
            walk_applying_where(txn, &mut cursor, where_expr, &mut rows)?;
        }
    }
    Ok(rows)
}

fn read_row_if_matching(
    txn: &mut Transaction,
    cursor: &Cursor,
    expected_key: u32,
    where_expr: Option<&(ExprArena, u32)>,
) -> Result<Option<Row>, Error> {
    let key = cursor.key(txn)?;
    if key != expected_key {
        return Ok(None);
    }
    let row = Row::deserialize(cursor.value_bytes(txn)?)?;
    match where_expr {
        Some((arena, root)) if !arena.eval(*root, &row) => Ok(None),
        _ => Ok(Some(row)),
    }
}

fn walk_applying_where(
    txn: &mut Transaction,
    cursor: &mut Cursor,
    where_expr: Option<&(ExprArena, u32)>,
    out: &mut Vec<Row>,
) -> Result<(), Error> {
    while !cursor.end {
        let row = Row::deserialize(cursor.value_bytes(txn)?)?;
        let matches = match where_expr {
            Some((arena, root)) => arena.eval(*root, &row),
            None => true,
        };
        if matches {
            out.push(row);
        }
        cursor.advance(txn)?;
    }
    Ok(())
}

/// Cursor positioned at the first cell of the leftmost leaf.
fn table_start(txn: &mut Transaction) -> Result<Cursor, Error> {
    let mut page = ROOT_PAGE;
    loop {
        let node = txn.page_for_read(page)?;
        match node.node_type()? {
            NodeType::Leaf => return Ok(Cursor::new(page, 0, node.leaf_num_cells() == 0)),
            NodeType::Internal => page = node.internal_child(0)?,
        }
    }
}

fn execute_update(
    txn: &mut Transaction,
    stats: &mut Stats,
    statement: &Statement,
) -> Result<usize, Error> {
    let update = statement
        .update
        .as_ref()
        .expect("update statement carries update flags");

    let ids = if let Some(id) = update.legacy_id {
        vec![id]
    } else {
        let rows = execute_select(txn, stats, statement.where_expr.as_ref())?;
        rows.into_iter().map(|r| r.id).collect()
    };

    let mut affected = 0;
    for id in ids {
        if apply_update(txn, id, update)? {
            affected += 1;
        }
    }
    Ok(affected)
}

fn apply_update(txn: &mut Transaction, id: u32, update: &UpdateSpec) -> Result<bool, Error> {
    let cursor = btree::find(txn, id)?;
    if cursor.end || cursor.key(txn)? != id {
        if update.legacy_id.is_some() {
            return Err(Error::KeyNotFound(id));
        }
        return Ok(false);
    }
    let mut row = Row::deserialize(cursor.value_bytes(txn)?)?;
    if let Some(username) = &update.new_username {
        row.username = username.clone();
    }
    if let Some(email) = &update.new_email {
        row.email = email.clone();
    }
    row.validate()?;
    let serialized = row.serialize();
    let node = txn.page_for_write(cursor.page)?;
    node.set_leaf_value(cursor.cell, &serialized);
    Ok(true)
}

fn execute_delete(
    txn: &mut Transaction,
    stats: &mut Stats,
    statement: &Statement,
) -> Result<usize, Error> {
    let ids: Vec<u32> = if let Some(id) = statement.delete_id {
        vec![id]
    } else {
        let rows = execute_select(txn, stats, statement.where_expr.as_ref())?;
        let mut ids: Vec<u32> = rows.into_iter().map(|r| r.id).collect();
        if ids.len() > MAX_DELETE_BATCH {
            ids.truncate(MAX_DELETE_BATCH);
        }
        ids
    };

    // Delete in descending order so that removing one leaf cell never
    // invalidates the position of another pending delete (spec §4.7).
    let mut sorted = ids;
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let mut affected = 0;
    for id in sorted {
        let row = {
            let cursor = btree::find(txn, id)?;
            if cursor.end || cursor.key(txn)? != id {
                None
            } else {
                Some(Row::deserialize(cursor.value_bytes(txn)?)?)
            }
        };
        match (row, statement.delete_id) {
            (Some(row), _) => {
                btree::delete(txn, id)?;
                stats.update_on_delete(&row);
                affected += 1;
            }
            (None, Some(_)) => return Err(Error::KeyNotFound(id)),
            (None, None) => {}
        }
    }
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::init_if_empty;
    use crate::pager::Pager;

    fn open() -> (tempfile::TempDir, Transaction, Stats) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let pager = Pager::open(&path).unwrap();
        let mut txn = Transaction::new(pager);
        init_if_empty(&mut txn).unwrap();
        (dir, txn, Stats::new())
    }

    fn insert_ids(txn: &mut Transaction, stats: &mut Stats, ids: impl IntoIterator<Item = u32>) {
        for id in ids {
            let row = Row::new(id, format!("u{id}"), format!("u{id}@x.com")).unwrap();
            execute_insert(txn, stats, &row).unwrap();
        }
    }

    #[test]
    fn select_without_where_returns_rows_in_id_order() {
        let (_dir, mut txn, mut stats) = open();
        insert_ids(&mut txn, &mut stats, (1..=15).rev());
        let stmt = Statement::prepare("select").unwrap();
        let ExecResult::Rows(rows) = execute(&mut txn, &mut stats, &stmt).unwrap() else {
            panic!("expected rows");
        };
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=15).collect::<Vec<_>>());
    }

    #[test]
    fn range_scan_scenario_yields_expected_subset() {
        let (_dir, mut txn, mut stats) = open();
        insert_ids(&mut txn, &mut stats, 1..=20);
        let stmt = Statement::prepare("select where id >= 10 and id < 13").unwrap();
        let ExecResult::Rows(rows) = execute(&mut txn, &mut stats, &stmt).unwrap() else {
            panic!("expected rows");
        };
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![10, 11, 12]);
    }

    #[test]
    fn partial_update_preserves_untouched_field() {
        let (_dir, mut txn, mut stats) = open();
        let row = Row::new(5, "alice", "a@x").unwrap();
        execute_insert(&mut txn, &mut stats, &row).unwrap();
        let stmt = Statement::prepare("update - b@x where id = 5").unwrap();
        execute(&mut txn, &mut stats, &stmt).unwrap();
        let stmt = Statement::prepare("select where id = 5").unwrap();
        let ExecResult::Rows(rows) = execute(&mut txn, &mut stats, &stmt).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows[0].username, "alice");
        assert_eq!(rows[0].email, "b@x");
    }

    #[test]
    fn delete_with_where_leaves_matching_complement() {
        let (_dir, mut txn, mut stats) = open();
        insert_ids(&mut txn, &mut stats, 1..=5);
        let stmt = Statement::prepare("delete where id > 2").unwrap();
        execute(&mut txn, &mut stats, &stmt).unwrap();
        let stmt = Statement::prepare("select").unwrap();
        let ExecResult::Rows(rows) = execute(&mut txn, &mut stats, &stmt).unwrap() else {
            panic!("expected rows");
        };
        let ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn delete_by_missing_id_is_key_not_found() {
        let (_dir, mut txn, mut stats) = open();
        let stmt = Statement::prepare("delete 42").unwrap();
        assert!(matches!(
            execute(&mut txn, &mut stats, &stmt),
            Err(Error::KeyNotFound(42))
        ));
    }
}
