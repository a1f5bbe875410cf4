/// Relation-level pushdown planning.
///
/// Builds a `RemoteRelationInfo` per candidate base, join, or upper
/// relation: partitions restriction clauses through the safety classifier,
/// decides eligibility, and attaches row/width/cost estimates split into
/// relation-only work and wrapper transfer overhead so the host can weigh
/// pushing down against fetching raw rows and filtering locally.
///
/// Disqualification is never an error; an ineligible relation comes back
/// with `pushdown_safe` unset and the host plans a local path instead.
use std::cmp::Ordering;

use log::debug;

use crate::core::options::SqliteFdwOptions;
use crate::query::expr::{AttrNumber, BinaryOp, BoolOp, Expr, RelId, TargetEntry};
use crate::query::relation::{
    AttrSet, JoinType, RelationShape, RemoteRelationInfo, TableDesc,
};
use crate::query::safety::{expr_is_shippable, partition_conds};

/// Row estimate for a base relation when no statistics are available.
pub const DEFAULT_BASE_ROWS: f64 = 1000.0;
/// Width estimate when no fetched column is known.
pub const DEFAULT_BASE_WIDTH: u32 = 32;
/// Per-row processing cost on the remote side.
pub const DEFAULT_CPU_TUPLE_COST: f64 = 0.01;
/// Fraction of input rows assumed to survive grouping.
const DEFAULT_GROUPS_FRACTION: f64 = 0.1;

/// Statistics sampled from the remote store, fetched through the bridge
/// when `use_remote_estimate` is on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteStats {
    pub rows: f64,
}

/// Pushed-sort / pushed-limit markers recorded next to a finished plan so
/// later introspection can report what the remote query includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathFlags {
    pub has_final_sort: bool,
    pub has_limit: bool,
}

impl PathFlags {
    /// Flags for a finished plan. A requested sort or limit rides along
    /// only when the relation qualifies for it.
    pub fn for_rel(rel: &RemoteRelationInfo, want_sort: bool, want_limit: bool) -> PathFlags {
        let pushable = can_push_sort_and_limit(rel);
        PathFlags {
            has_final_sort: want_sort && pushable,
            has_limit: want_limit && pushable,
        }
    }
}

/// True when a final sort or LIMIT/OFFSET may ride on this relation's
/// remote query. A locally re-checked condition filters rows after they
/// arrive, so a remote ordering or row-count cut would apply to the wrong
/// set.
pub fn can_push_sort_and_limit(rel: &RemoteRelationInfo) -> bool {
    rel.pushdown_safe && rel.local_conds.is_empty()
}

/// Default selectivity of one already-classified clause, used when no
/// remote statistics exist: equality 0.005, range comparisons 1/3, pattern
/// matches 0.1, boolean connectives composed from their arguments, anything
/// else 0.5.
fn clause_selectivity(expr: &Expr) -> f64 {
    match expr {
        Expr::Binary { op, .. } => match op {
            BinaryOp::Eq => 0.005,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 1.0 / 3.0,
            BinaryOp::Like | BinaryOp::ILike => 0.1,
            _ => 0.5,
        },
        Expr::Bool { op, args } => match op {
            BoolOp::And => args.iter().map(clause_selectivity).product(),
            BoolOp::Or => args.iter().map(clause_selectivity).sum::<f64>().min(1.0),
            BoolOp::Not => 1.0 - args.first().map_or(0.5, clause_selectivity),
        },
        _ => 0.5,
    }
}

fn selectivity(conds: &[Expr]) -> f64 {
    conds
        .iter()
        .map(clause_selectivity)
        .product::<f64>()
        .clamp(0.0, 1.0)
}

/// Plan a base relation scan.
///
/// `target_attrs` are the attributes the host needs from this relation's
/// output; attributes referenced by locally re-checked clauses are added,
/// since those rows must carry enough columns for the re-check.
pub fn plan_base_rel(
    relid: RelId,
    table: &TableDesc,
    restrictions: &[Expr],
    target_attrs: &AttrSet,
    opts: &SqliteFdwOptions,
    remote_stats: Option<&RemoteStats>,
) -> RemoteRelationInfo {
    let relids = std::iter::once(relid).collect();
    let (remote_conds, local_conds) = partition_conds(&relids, restrictions);

    let mut attrs_used: AttrSet = target_attrs.clone();
    for cond in &local_conds {
        cond.collect_attrs(relid, &mut attrs_used);
    }

    // System attributes and columns missing from the mapped table cannot be
    // produced by the remote scan.
    let pushdown_safe = attrs_used
        .iter()
        .all(|attno| *attno > 0 && table.column(*attno).is_some());
    if !pushdown_safe {
        debug!(
            "relation \"{}\" not pushdown-safe: unfetchable attribute required",
            table.local_name
        );
    }

    let raw_rows = remote_stats.map_or(DEFAULT_BASE_ROWS, |s| s.rows);
    let retrieved_rows = (raw_rows * selectivity(&remote_conds)).max(1.0);
    let rows = (retrieved_rows * selectivity(&local_conds)).max(1.0);

    let width: u32 = attrs_used
        .iter()
        .filter_map(|attno| table.column(*attno))
        .map(|c| c.ty.width_estimate())
        .sum();
    let width = if width == 0 { DEFAULT_BASE_WIDTH } else { width };

    let rel_startup_cost = 0.0;
    let rel_total_cost = raw_rows * DEFAULT_CPU_TUPLE_COST;
    let startup_cost = rel_startup_cost + opts.fdw_startup_cost;
    let total_cost = rel_total_cost + opts.fdw_startup_cost + opts.fdw_tuple_cost * retrieved_rows;

    RemoteRelationInfo {
        pushdown_safe,
        remote_conds,
        local_conds,
        rows,
        width,
        startup_cost,
        total_cost,
        rel_startup_cost,
        rel_total_cost,
        attrs_used,
        relation_label: table.local_name.clone(),
        shape: RelationShape::Base {
            relid,
            table: table.clone(),
        },
    }
}

/// Plan a join of two already-planned relations.
///
/// Eligible only when both inputs are pushdown-safe, the join type has a
/// remote spelling (semi and anti joins have none), every join clause
/// classifies as safe against the combined relation, and, for anything but
/// an inner join, both inputs' restrictions run fully remotely; a
/// null-extended row cannot be told apart from one a local re-check would
/// have removed before joining. The inputs' remote and local condition
/// sets merge into the join's.
pub fn plan_join_rel(
    outer: RemoteRelationInfo,
    inner: RemoteRelationInfo,
    join_type: JoinType,
    join_clauses: Vec<Expr>,
    opts: &SqliteFdwOptions,
) -> RemoteRelationInfo {
    let mut relids = outer.relids();
    relids.extend(inner.relids());

    let type_ok = join_type.sql_token().is_some();
    let clauses_ok = join_clauses.iter().all(|c| expr_is_shippable(c, &relids));
    let inputs_clean = join_type == JoinType::Inner
        || (outer.local_conds.is_empty() && inner.local_conds.is_empty());
    let pushdown_safe =
        outer.pushdown_safe && inner.pushdown_safe && type_ok && clauses_ok && inputs_clean;
    if !pushdown_safe {
        debug!(
            "join of \"{}\" and \"{}\" not pushdown-safe (inputs {} / {}, type ok: {type_ok}, clauses ok: {clauses_ok}, inputs fully remote: {inputs_clean})",
            outer.relation_label,
            inner.relation_label,
            outer.pushdown_safe,
            inner.pushdown_safe,
        );
    }

    let mut remote_conds = outer.remote_conds.clone();
    remote_conds.extend(inner.remote_conds.iter().cloned());
    let mut local_conds = outer.local_conds.clone();
    local_conds.extend(inner.local_conds.iter().cloned());

    let mut attrs_used = outer.attrs_used.clone();
    attrs_used.extend(inner.attrs_used.iter().copied());

    let retrieved_rows = (outer.rows * inner.rows * selectivity(&join_clauses)).max(1.0);
    let rows = (retrieved_rows * selectivity(&local_conds)).max(1.0);
    let width = outer.width + inner.width;

    let rel_startup_cost = outer.rel_startup_cost + inner.rel_startup_cost;
    let rel_total_cost =
        outer.rel_total_cost + inner.rel_total_cost + retrieved_rows * DEFAULT_CPU_TUPLE_COST;
    let startup_cost = rel_startup_cost + opts.fdw_startup_cost;
    let total_cost = rel_total_cost + opts.fdw_startup_cost + opts.fdw_tuple_cost * retrieved_rows;

    let relation_label = format!(
        "({}) {} JOIN ({})",
        outer.relation_label,
        join_type.label(),
        inner.relation_label
    );

    RemoteRelationInfo {
        pushdown_safe,
        remote_conds,
        local_conds,
        rows,
        width,
        startup_cost,
        total_cost,
        rel_startup_cost,
        rel_total_cost,
        attrs_used,
        relation_label,
        shape: RelationShape::Join {
            outer: Box::new(outer),
            inner: Box::new(inner),
            join_type,
            join_clauses,
        },
    }
}

/// Plan a grouping/aggregation stage over an already-planned relation.
///
/// Eligible only when the input is pushdown-safe with every restriction
/// running remotely, and every grouping expression and output entry
/// classifies as safe; a locally re-checked input condition cannot be
/// re-applied once rows are aggregated. HAVING clauses partition into the
/// stage's remote and local sets the same way base restrictions do.
pub fn plan_upper_rel(
    input: RemoteRelationInfo,
    grouped_tlist: Vec<TargetEntry>,
    group_exprs: Vec<Expr>,
    having: Vec<Expr>,
    opts: &SqliteFdwOptions,
) -> RemoteRelationInfo {
    let relids = input.relids();

    let input_clean = input.local_conds.is_empty();
    let groups_ok = group_exprs.iter().all(|e| expr_is_shippable(e, &relids));
    let tlist_ok = grouped_tlist
        .iter()
        .all(|te| expr_is_shippable(&te.expr, &relids));
    let pushdown_safe = input.pushdown_safe && input_clean && groups_ok && tlist_ok;
    if !pushdown_safe {
        debug!(
            "grouping over \"{}\" not pushdown-safe (input {}, input fully remote: {input_clean}, groups ok: {groups_ok}, outputs ok: {tlist_ok})",
            input.relation_label, input.pushdown_safe,
        );
    }

    let (remote_conds, local_conds) = partition_conds(&relids, &having);

    let n_groups = if group_exprs.is_empty() {
        1.0
    } else {
        (input.rows * DEFAULT_GROUPS_FRACTION).max(1.0)
    };
    let retrieved_rows = (n_groups * selectivity(&remote_conds)).max(1.0);
    let rows = (retrieved_rows * selectivity(&local_conds)).max(1.0);

    let width: u32 = grouped_tlist
        .iter()
        .map(|te| te.expr.static_type().map_or(8, |ty| ty.width_estimate()))
        .sum::<u32>()
        .max(8);

    let rel_startup_cost = input.rel_total_cost;
    let rel_total_cost = input.rel_total_cost + input.rows * DEFAULT_CPU_TUPLE_COST;
    let startup_cost = rel_startup_cost + opts.fdw_startup_cost;
    let total_cost = rel_total_cost + opts.fdw_startup_cost + opts.fdw_tuple_cost * retrieved_rows;

    let relation_label = format!("Aggregate on ({})", input.relation_label);

    RemoteRelationInfo {
        pushdown_safe,
        remote_conds,
        local_conds,
        rows,
        width,
        startup_cost,
        total_cost,
        rel_startup_cost,
        rel_total_cost,
        attrs_used: input.attrs_used.clone(),
        relation_label,
        shape: RelationShape::Upper {
            input: Box::new(input),
            grouped_tlist,
            group_exprs,
        },
    }
}

/// Order two candidate plans: cheaper total cost wins, and equal estimates
/// prefer the plan with fewer locally re-checked conditions.
pub fn compare_paths(a: &RemoteRelationInfo, b: &RemoteRelationInfo) -> Ordering {
    match a.total_cost.partial_cmp(&b.total_cost) {
        Some(Ordering::Equal) | None => a.local_conds.len().cmp(&b.local_conds.len()),
        Some(ord) => ord,
    }
}

/// Attribute numbers of every column in a table, the usual seed for
/// `plan_base_rel` when the host wants whole rows.
pub fn all_attrs(table: &TableDesc) -> AttrSet {
    table.columns.iter().map(|c| c.attno).collect()
}

/// Attribute set helper for explicit column lists.
pub fn attrs_of(attnos: &[AttrNumber]) -> AttrSet {
    attnos.iter().copied().collect()
}
