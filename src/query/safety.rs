/// Expression safety classification.
///
/// Decides, per expression tree, whether evaluating it on the SQLite side
/// produces the same result the host would compute. Anything that might
/// drift (unknown operators or functions, non-default collations, volatile
/// functions, subqueries, lossy casts) is kept local. Classification never
/// fails: an unsafe verdict simply routes the clause into the local set.
use log::debug;

use crate::query::expr::{
    AggFunc, BinaryOp, Collation, EquivalenceClass, Expr, PathKey, RelIdSet, SortKey, TargetEntry,
    Volatility,
};
use crate::query::relation::RemoteRelationInfo;
use crate::value::cell::TypeId;

/// Scalar functions known to behave identically in SQLite for the argument
/// types the classifier lets through. Case-folding functions are absent on
/// purpose: SQLite folds ASCII only.
const SAFE_FUNCTIONS: &[&str] = &[
    "abs", "round", "length", "substr", "replace", "instr", "trim", "ltrim", "rtrim", "coalesce",
    "nullif", "ifnull", "date", "time", "datetime", "strftime",
];

pub fn is_safe_function(name: &str) -> bool {
    SAFE_FUNCTIONS.iter().any(|f| name.eq_ignore_ascii_case(f))
}

fn is_safe_operator(op: BinaryOp) -> bool {
    // SQLite's LIKE folds ASCII case by default, so both pattern operators
    // match under different case rules than the host's.
    !matches!(op, BinaryOp::Like | BinaryOp::ILike)
}

/// Casts that keep their exact host semantics remotely. Widening between
/// integer types and integer-to-double are value-preserving; everything
/// else (double-to-integer truncates differently, text formatting drifts)
/// stays local.
fn is_safe_cast(from: Option<TypeId>, to: TypeId) -> bool {
    let Some(from) = from else {
        return false;
    };
    if from == to {
        return true;
    }
    match (from, to) {
        (f, t) if f.is_integer() && t.is_integer() => true,
        (f, TypeId::Double) if f.is_integer() => true,
        _ => false,
    }
}

/// Can `expr` be translated into remote SQL for a relation covering exactly
/// `relids`?
pub fn expr_is_shippable(expr: &Expr, relids: &RelIdSet) -> bool {
    match expr {
        Expr::Column(col) => relids.contains(&col.rel) && col.collation == Collation::Default,
        Expr::Const { .. } => true,
        Expr::Param { .. } => true,
        Expr::Unary { arg, .. } => expr_is_shippable(arg, relids),
        Expr::Binary {
            op,
            left,
            right,
            collation,
        } => {
            is_safe_operator(*op)
                && *collation == Collation::Default
                && expr_is_shippable(left, relids)
                && expr_is_shippable(right, relids)
        }
        Expr::Bool { args, .. } => args.iter().all(|a| expr_is_shippable(a, relids)),
        Expr::Func {
            name,
            args,
            volatility,
            collation,
        } => {
            *volatility != Volatility::Volatile
                && *collation == Collation::Default
                && is_safe_function(name)
                && args.iter().all(|a| expr_is_shippable(a, relids))
        }
        Expr::Aggregate { func, arg, .. } => {
            let arg_ok = arg.as_deref().map_or(true, |a| expr_is_shippable(a, relids));
            // COUNT may omit its argument; the others may not.
            (arg.is_some() || *func == AggFunc::Count) && arg_ok
        }
        Expr::Cast { arg, target } => {
            expr_is_shippable(arg, relids) && is_safe_cast(arg.static_type(), *target)
        }
        Expr::NullTest { arg, .. } => expr_is_shippable(arg, relids),
        Expr::Subquery { .. } => false,
    }
}

/// Per-relation entry point over `expr_is_shippable`.
pub fn is_foreign_expr(rel: &RemoteRelationInfo, expr: &Expr) -> bool {
    expr_is_shippable(expr, &rel.relids())
}

/// Split restriction clauses into the remotely-evaluated and locally
/// re-checked sets. Every clause lands in exactly one of the two.
pub fn partition_conds(relids: &RelIdSet, conds: &[Expr]) -> (Vec<Expr>, Vec<Expr>) {
    let mut remote = Vec::new();
    let mut local = Vec::new();
    for cond in conds {
        if expr_is_shippable(cond, relids) {
            remote.push(cond.clone());
        } else {
            debug!("keeping clause local: {cond:?}");
            local.push(cond.clone());
        }
    }
    (remote, local)
}

/// Walk state for equivalence-class resolution: the member found for the
/// current lookup plus every member already consumed by earlier lookups, so
/// the same logical expression is never translated twice when one class
/// backs multiple clauses.
#[derive(Debug, Clone, Default)]
pub struct EcMatchState {
    pub current: Option<Expr>,
    pub already_used: Vec<Expr>,
}

impl EcMatchState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Find an equivalence-class member usable for a relation covering
/// `relids`, skipping members already consumed. On success the member is
/// recorded in `state` and returned.
pub fn find_em_expr_for_rel(
    ec: &EquivalenceClass,
    relids: &RelIdSet,
    state: &mut EcMatchState,
) -> Option<Expr> {
    state.current = None;
    for member in &ec.members {
        if !member.relids.is_subset(relids) {
            continue;
        }
        if state.already_used.contains(&member.expr) {
            continue;
        }
        state.current = Some(member.expr.clone());
        state.already_used.push(member.expr.clone());
        return state.current.clone();
    }
    None
}

/// Find an equivalence-class member that appears in a grouped output list.
/// Sort keys above an aggregation stage must order by something the stage
/// actually emits, so plain relation coverage is not enough there.
pub fn find_em_expr_for_input_target(
    ec: &EquivalenceClass,
    target: &[TargetEntry],
) -> Option<Expr> {
    ec.members
        .iter()
        .find(|member| target.iter().any(|te| te.expr == member.expr))
        .map(|member| member.expr.clone())
}

/// Resolve requested path keys into concrete, shippable sort keys for a
/// relation. Returns `None` when the relation carries locally re-checked
/// conditions, and as soon as any key has no safe member, since a partially
/// pushed sort is no sort at all.
pub fn resolve_pathkeys(
    rel: &RemoteRelationInfo,
    pathkeys: &[PathKey],
    state: &mut EcMatchState,
) -> Option<Vec<SortKey>> {
    // A relation with locally re-checked conditions takes no pushed sort:
    // the remote ordering would cover rows the local filter then removes.
    if !rel.local_conds.is_empty() {
        return None;
    }
    let relids = rel.relids();
    let mut out = Vec::with_capacity(pathkeys.len());
    for pk in pathkeys {
        let expr = find_em_expr_for_rel(&pk.ec, &relids, state)?;
        if !expr_is_shippable(&expr, &relids) {
            return None;
        }
        out.push(SortKey {
            expr,
            descending: pk.descending,
            nulls_first: pk.nulls_first,
        });
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::EquivalenceMember;

    fn relids(ids: &[usize]) -> RelIdSet {
        ids.iter().copied().collect()
    }

    #[test]
    fn volatile_function_is_unsafe() {
        let expr = Expr::Func {
            name: "random".into(),
            args: vec![],
            volatility: Volatility::Volatile,
            collation: Collation::Default,
        };
        assert!(!expr_is_shippable(&expr, &relids(&[1])));
    }

    #[test]
    fn pattern_operators_are_unsafe() {
        for op in [BinaryOp::Like, BinaryOp::ILike] {
            let expr = Expr::binary(
                op,
                Expr::column(1, 1, TypeId::Text),
                Expr::text_const("foo%"),
            );
            assert!(!expr_is_shippable(&expr, &relids(&[1])), "{op:?}");
        }
    }

    #[test]
    fn named_collation_is_unsafe() {
        let expr = Expr::Binary {
            op: BinaryOp::Lt,
            left: Box::new(Expr::column(1, 1, TypeId::Text)),
            right: Box::new(Expr::text_const("m")),
            collation: Collation::Named("de_DE".into()),
        };
        assert!(!expr_is_shippable(&expr, &relids(&[1])));
    }

    #[test]
    fn column_outside_relation_is_unsafe() {
        let expr = Expr::column(2, 1, TypeId::Integer);
        assert!(!expr_is_shippable(&expr, &relids(&[1])));
    }

    #[test]
    fn double_to_integer_cast_is_unsafe() {
        let expr = Expr::Cast {
            arg: Box::new(Expr::column(1, 1, TypeId::Double)),
            target: TypeId::Integer,
        };
        assert!(!expr_is_shippable(&expr, &relids(&[1])));

        let widening = Expr::Cast {
            arg: Box::new(Expr::column(1, 1, TypeId::Integer)),
            target: TypeId::BigInt,
        };
        assert!(expr_is_shippable(&widening, &relids(&[1])));
    }

    #[test]
    fn input_target_lookup_requires_an_emitted_member() {
        let name = Expr::column(1, 2, TypeId::Text);
        let price = Expr::column(1, 3, TypeId::Double);
        let ec = EquivalenceClass {
            members: vec![EquivalenceMember {
                expr: name.clone(),
                relids: relids(&[1]),
            }],
        };

        let grouped = vec![TargetEntry::new(name.clone())];
        assert_eq!(find_em_expr_for_input_target(&ec, &grouped), Some(name));

        let other = vec![TargetEntry::new(price)];
        assert_eq!(find_em_expr_for_input_target(&ec, &other), None);
    }

    #[test]
    fn already_used_members_are_skipped() {
        let a = Expr::column(1, 1, TypeId::Integer);
        let b = Expr::column(1, 2, TypeId::Integer);
        let ec = EquivalenceClass {
            members: vec![
                EquivalenceMember {
                    expr: a.clone(),
                    relids: relids(&[1]),
                },
                EquivalenceMember {
                    expr: b.clone(),
                    relids: relids(&[1]),
                },
            ],
        };

        let mut state = EcMatchState::new();
        assert_eq!(find_em_expr_for_rel(&ec, &relids(&[1]), &mut state), Some(a));
        assert_eq!(find_em_expr_for_rel(&ec, &relids(&[1]), &mut state), Some(b));
        assert_eq!(find_em_expr_for_rel(&ec, &relids(&[1]), &mut state), None);
    }
}
