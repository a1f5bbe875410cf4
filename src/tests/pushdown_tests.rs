/// Safety classification and clause partitioning across whole relations.
use crate::query::expr::{
    BinaryOp, BoolOp, Collation, EquivalenceClass, EquivalenceMember, Expr, PathKey, Volatility,
};
use crate::query::planner::{all_attrs, plan_base_rel};
use crate::query::safety::{
    expr_is_shippable, find_em_expr_for_rel, is_foreign_expr, partition_conds, resolve_pathkeys,
    EcMatchState,
};
use crate::tests::support::{description_ilike, items_table, options_for, price_gt_100};
use crate::value::cell::TypeId;

fn relids_of(ids: &[usize]) -> std::collections::BTreeSet<usize> {
    ids.iter().copied().collect()
}

#[test]
fn every_clause_lands_in_exactly_one_set() {
    let clauses = vec![
        price_gt_100(),
        description_ilike(),
        Expr::binary(
            BinaryOp::Eq,
            Expr::column(1, 2, TypeId::Text),
            Expr::text_const("widget"),
        ),
        Expr::Func {
            name: "random".to_string(),
            args: vec![],
            volatility: Volatility::Volatile,
            collation: Collation::Default,
        },
    ];

    let relids = relids_of(&[1]);
    let (remote, local) = partition_conds(&relids, &clauses);

    assert_eq!(remote.len() + local.len(), clauses.len());
    for clause in &clauses {
        let in_remote = remote.contains(clause);
        let in_local = local.contains(clause);
        assert!(in_remote ^ in_local, "clause must be in exactly one set");
        assert_eq!(in_remote, expr_is_shippable(clause, &relids));
    }
}

#[test]
fn price_and_ilike_scenario_splits_as_expected() {
    let table = items_table();
    let opts = options_for(":memory:");
    let info = plan_base_rel(
        1,
        &table,
        &[price_gt_100(), description_ilike()],
        &all_attrs(&table),
        &opts,
        None,
    );

    assert_eq!(info.remote_conds, vec![price_gt_100()]);
    assert_eq!(info.local_conds, vec![description_ilike()]);
    // Partially pushed restrictions leave the scan itself eligible.
    assert!(info.pushdown_safe);
}

#[test]
fn classifier_is_purely_advisory_for_planned_relations() {
    let table = items_table();
    let opts = options_for(":memory:");
    let info = plan_base_rel(1, &table, &[], &all_attrs(&table), &opts, None);

    assert!(is_foreign_expr(&info, &price_gt_100()));
    assert!(!is_foreign_expr(&info, &description_ilike()));
    assert!(!is_foreign_expr(&info, &Expr::Subquery { correlated: true }));
    assert!(!is_foreign_expr(&info, &Expr::Subquery { correlated: false }));
}

#[test]
fn boolean_connectives_are_safe_only_when_all_arms_are() {
    let relids = relids_of(&[1]);
    let safe_pair = Expr::Bool {
        op: BoolOp::And,
        args: vec![price_gt_100(), price_gt_100()],
    };
    let mixed = Expr::Bool {
        op: BoolOp::Or,
        args: vec![price_gt_100(), description_ilike()],
    };
    assert!(expr_is_shippable(&safe_pair, &relids));
    assert!(!expr_is_shippable(&mixed, &relids));
}

#[test]
fn stable_function_over_safe_args_is_safe() {
    let relids = relids_of(&[1]);
    let expr = Expr::Func {
        name: "length".to_string(),
        args: vec![Expr::column(1, 2, TypeId::Text)],
        volatility: Volatility::Stable,
        collation: Collation::Default,
    };
    assert!(expr_is_shippable(&expr, &relids));

    let unknown = Expr::Func {
        name: "host_specific".to_string(),
        args: vec![Expr::column(1, 2, TypeId::Text)],
        volatility: Volatility::Immutable,
        collation: Collation::Default,
    };
    assert!(!expr_is_shippable(&unknown, &relids));
}

#[test]
fn ec_members_resolve_once_across_pathkey_lookups() {
    let member_a = Expr::column(1, 1, TypeId::BigInt);
    let member_b = Expr::column(2, 2, TypeId::BigInt);
    let ec = EquivalenceClass {
        members: vec![
            EquivalenceMember {
                expr: member_a.clone(),
                relids: relids_of(&[1]),
            },
            EquivalenceMember {
                expr: member_b.clone(),
                relids: relids_of(&[2]),
            },
        ],
    };

    let mut state = EcMatchState::new();
    let found = find_em_expr_for_rel(&ec, &relids_of(&[1, 2]), &mut state);
    assert_eq!(found, Some(member_a.clone()));
    assert_eq!(state.current, Some(member_a.clone()));

    // The first member is consumed; the next lookup falls through to the
    // other one instead of translating the same expression twice.
    let found = find_em_expr_for_rel(&ec, &relids_of(&[1, 2]), &mut state);
    assert_eq!(found, Some(member_b));
    assert_eq!(state.already_used.len(), 2);

    // A relation covering neither member resolves nothing.
    let mut fresh = EcMatchState::new();
    assert_eq!(find_em_expr_for_rel(&ec, &relids_of(&[3]), &mut fresh), None);
}

#[test]
fn locally_filtered_relations_take_no_pushed_sort() {
    let table = items_table();
    let opts = options_for(":memory:");
    let info = plan_base_rel(
        1,
        &table,
        &[description_ilike()],
        &all_attrs(&table),
        &opts,
        None,
    );

    let id_ec = EquivalenceClass {
        members: vec![EquivalenceMember {
            expr: Expr::column(1, 1, TypeId::BigInt),
            relids: relids_of(&[1]),
        }],
    };
    let pathkeys = vec![PathKey {
        ec: id_ec,
        descending: false,
        nulls_first: false,
    }];
    let mut state = EcMatchState::new();
    assert_eq!(resolve_pathkeys(&info, &pathkeys, &mut state), None);
}

#[test]
fn pathkeys_resolve_only_when_every_key_is_safe() {
    let table = items_table();
    let opts = options_for(":memory:");
    let info = plan_base_rel(1, &table, &[], &all_attrs(&table), &opts, None);

    let id_ec = EquivalenceClass {
        members: vec![EquivalenceMember {
            expr: Expr::column(1, 1, TypeId::BigInt),
            relids: relids_of(&[1]),
        }],
    };
    let pathkeys = vec![PathKey {
        ec: id_ec.clone(),
        descending: true,
        nulls_first: false,
    }];
    let mut state = EcMatchState::new();
    let resolved = resolve_pathkeys(&info, &pathkeys, &mut state).unwrap();
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].descending);

    // A key backed only by a foreign relation's member kills the whole
    // pushed sort.
    let foreign_ec = EquivalenceClass {
        members: vec![EquivalenceMember {
            expr: Expr::column(9, 1, TypeId::BigInt),
            relids: relids_of(&[9]),
        }],
    };
    let mixed = vec![
        PathKey {
            ec: id_ec,
            descending: false,
            nulls_first: false,
        },
        PathKey {
            ec: foreign_ec,
            descending: false,
            nulls_first: false,
        },
    ];
    let mut state = EcMatchState::new();
    assert_eq!(resolve_pathkeys(&info, &mixed, &mut state), None);
}
