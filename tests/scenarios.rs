//! End-to-end scenarios (spec §8). Each drives `Table` the way the REPL
//! collaborator would, through `Statement::prepare` + `Table::execute`.
use minidb::{ExecResult, Statement, Table};

fn open() -> (tempfile::TempDir, Table) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.db");
    let table = Table::open(&path).unwrap();
    (dir, table)
}

fn insert(table: &mut Table, id: u32, username: &str, email: &str) {
    let stmt = Statement::prepare(&format!("insert {id} {username} {email}")).unwrap();
    table.execute(&stmt).unwrap();
}

fn select_ids(table: &mut Table, sql: &str) -> Vec<u32> {
    let stmt = Statement::prepare(sql).unwrap();
    let ExecResult::Rows(rows) = table.execute(&stmt).unwrap() else {
        panic!("expected a Rows result from '{sql}'");
    };
    rows.into_iter().map(|r| r.id).collect()
}

#[test]
fn scenario_1_splits_up_a_chain() {
    let (_dir, mut table) = open();
    for id in 1..=15u32 {
        insert(&mut table, id, &format!("u{id}"), &format!("u{id}@x.com"));
    }
    let tree = table.print_tree().unwrap();
    assert!(tree.contains("internal"), "tree should have split into an internal root:\n{tree}");
    assert_eq!(select_ids(&mut table, "select"), (1..=15).collect::<Vec<_>>());
}

#[test]
fn scenario_2_range_scan() {
    let (_dir, mut table) = open();
    for id in 1..=20u32 {
        insert(&mut table, id, "u", "e@x.com");
    }
    assert_eq!(
        select_ids(&mut table, "select where id >= 10 and id < 13"),
        vec![10, 11, 12]
    );
}

#[test]
fn scenario_3_update_partial() {
    let (_dir, mut table) = open();
    insert(&mut table, 5, "alice", "a@x");
    let stmt = Statement::prepare("update - b@x where id = 5").unwrap();
    table.execute(&stmt).unwrap();
    let stmt = Statement::prepare("select where id=5").unwrap();
    let ExecResult::Rows(rows) = table.execute(&stmt).unwrap() else {
        panic!("expected rows");
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].username, "alice");
    assert_eq!(rows[0].email, "b@x");
}

#[test]
fn scenario_4_delete_with_where() {
    let (_dir, mut table) = open();
    for id in 1..=5u32 {
        insert(&mut table, id, "u", "e@x.com");
    }
    let stmt = Statement::prepare("delete where id > 2").unwrap();
    table.execute(&stmt).unwrap();
    assert_eq!(select_ids(&mut table, "select"), vec![1, 2]);
}

#[test]
fn scenario_5_rollback() {
    let (_dir, mut table) = open();
    table.begin().unwrap();
    insert(&mut table, 7, "u", "e@x.com");
    table.rollback().unwrap();
    assert_eq!(select_ids(&mut table, "select where id=7"), Vec::<u32>::new());
}

#[test]
fn scenario_6_planner_chooses_lookup_over_full_scan() {
    use minidb::Plan;
    use minidb::sql::where_expr::Parser;

    let (_dir, mut table) = open();
    for id in 1..=1000u32 {
        insert(&mut table, id, "u", "e@x.com");
    }
    table.analyze().unwrap();
    let stats = table.stats().clone();

    let (arena, root) = Parser::parse("id = 500").unwrap();
    let plan = minidb::planner::choose_plan(Some((&arena, root)), &stats);
    assert_eq!(plan, Plan::IndexLookup { key: 500 });

    let (arena, root) = Parser::parse("username = \"x\"").unwrap();
    let plan = minidb::planner::choose_plan(Some((&arena, root)), &stats);
    assert_eq!(plan, Plan::FullScan);
}

#[test]
fn commit_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.db");
    {
        let mut table = Table::open(&path).unwrap();
        table.begin().unwrap();
        insert(&mut table, 9, "persisted", "p@x.com");
        table.commit().unwrap();
        table.close().unwrap();
    }
    let mut table = Table::open(&path).unwrap();
    assert_eq!(select_ids(&mut table, "select where id=9"), vec![9]);
}

#[test]
fn duplicate_insert_is_rejected_without_corrupting_existing_rows() {
    let (_dir, mut table) = open();
    insert(&mut table, 1, "a", "a@x.com");
    let stmt = Statement::prepare("insert 1 b b@x.com").unwrap();
    assert!(table.execute(&stmt).is_err());
    assert_eq!(select_ids(&mut table, "select"), vec![1]);
}
