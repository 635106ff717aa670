//! Cost-based plan selection (spec §4.7): choose between a point lookup,
//! a range scan, and a full scan using row-count and selectivity
//! estimates seeded by `Stats`.
use crate::sql::where_expr::ExprArena;
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    FullScan,
    IndexLookup { key: u32 },
    RangeScan { start_key: u32, forward: bool },
}

const NO_STATS_RANGE_COST: f64 = 10.0;
const NO_STATS_SCAN_COST: f64 = 100.0;

/// Choose a plan for `where_expr` (rooted at `root`, or `None` for a
/// bare `select`), following spec §4.7's cost formulas.
pub fn choose_plan(where_expr: Option<(&ExprArena, u32)>, stats: &Stats) -> Plan {
    let Some((arena, root)) = where_expr else {
        return Plan::FullScan;
    };

    if let Some(key) = arena.top_level_id_eq(root) {
        return Plan::IndexLookup { key };
    }

    let range = arena.top_level_id_range(root);
    if range.is_none() {
        return Plan::FullScan;
    }
    let (start_key, forward) = range.unwrap();

    let (range_cost, scan_cost) = if stats.valid && stats.total_rows > 0 {
        let n = stats.total_rows as f64;
        let log2_n = n.max(1.0).log2();
        let id_span = (stats.id_max - stats.id_min) as f64 + 1.0;
        let rows = n * ((id_span - start_key as f64).max(0.0) / id_span).clamp(0.0, 1.0);
        (log2_n + rows, n + 0.1 * n)
    } else {
        (NO_STATS_RANGE_COST, NO_STATS_SCAN_COST)
    };

    if range_cost <= scan_cost {
        Plan::RangeScan { start_key, forward }
    } else {
        Plan::FullScan
    }
}

/// Estimated output row count for `plan` (spec §4.7 "Row estimation").
pub fn estimate_rows(plan: Plan, where_expr: Option<(&ExprArena, u32)>, stats: &Stats) -> f64 {
    match plan {
        Plan::IndexLookup { .. } => 1.0,
        Plan::RangeScan { start_key, .. } => {
            if !stats.valid || stats.total_rows == 0 {
                return 1.0;
            }
            let n = stats.total_rows as f64;
            let id_span = (stats.id_max - stats.id_min) as f64 + 1.0;
            n * ((id_span - start_key as f64).max(0.0) / id_span).clamp(0.0, 1.0)
        }
        Plan::FullScan => {
            let n = stats.total_rows as f64;
            let Some((arena, root)) = where_expr else {
                return n;
            };
            let selectivity = selectivity_for(arena, root, stats);
            n * selectivity
        }
    }
}

fn selectivity_for(arena: &ExprArena, root: u32, stats: &Stats) -> f64 {
    use crate::sql::where_expr::{ExprNode, Field, Op};
    match arena.get(root) {
        ExprNode::Basic { field, op: Op::Eq, .. } => {
            let card = match field {
                Field::Id => stats.id_card,
                Field::Username => stats.username_card,
                Field::Email => stats.email_card,
            };
            if card == 0 {
                1.0
            } else {
                1.0 / card as f64
            }
        }
        ExprNode::Basic { field: Field::Id, .. } => 0.5,
        ExprNode::Basic { .. } => 0.5,
        ExprNode::And { .. } | ExprNode::Or { .. } => 0.1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Row;
    use crate::sql::where_expr::Parser;

    fn seeded_stats(total_rows: u64, id_min: u32, id_max: u32) -> Stats {
        let mut stats = Stats::new();
        for id in id_min..=id_max {
            stats.update_on_insert(&Row::new(id, "u", "e@x.com").unwrap());
        }
        stats.total_rows = total_rows;
        stats.valid = true;
        stats
    }

    #[test]
    fn top_level_id_equality_chooses_index_lookup() {
        let (arena, root) = Parser::parse("id = 500").unwrap();
        let stats = seeded_stats(1000, 1, 1000);
        assert_eq!(
            choose_plan(Some((&arena, root)), &stats),
            Plan::IndexLookup { key: 500 }
        );
    }

    #[test]
    fn non_id_equality_chooses_full_scan() {
        let (arena, root) = Parser::parse("username = \"x\"").unwrap();
        let stats = seeded_stats(1000, 1, 1000);
        assert_eq!(choose_plan(Some((&arena, root)), &stats), Plan::FullScan);
    }

    #[test]
    fn bare_select_chooses_full_scan() {
        let stats = seeded_stats(10, 1, 10);
        assert_eq!(choose_plan(None, &stats), Plan::FullScan);
    }

    #[test]
    fn id_range_chooses_range_scan_with_correct_start() {
        let (arena, root) = Parser::parse("id >= 10 and id < 13").unwrap();
        let stats = seeded_stats(1000, 1, 1000);
        match choose_plan(Some((&arena, root)), &stats) {
            Plan::RangeScan { start_key, forward } => {
                assert_eq!(start_key, 10);
                assert!(forward);
            }
            other => panic!("expected RangeScan, got {other:?}"),
        }
    }
}
