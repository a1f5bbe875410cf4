//! Pushdown core for delegating query plan fragments to an embedded SQLite
//! store.
//!
//! The host query engine hands relation metadata and expression trees to
//! the planner ([`query::planner`]), which classifies every clause through
//! the safety analyzer ([`query::safety`]) and decides what can run
//! remotely. Chosen plans are rendered to SQLite SQL by the deparser
//! ([`query::deparse`]) and executed through the bridge
//! ([`core::state`] / [`core::modify`]), which converts result values back
//! into host types ([`value`]).

// Core execution bridge
pub mod core;

// Query planning, safety classification, and SQL generation
pub mod query;

// Local values and wire conversion
pub mod value;

// All tests organized by functionality
#[cfg(test)]
mod tests;

pub use crate::core::errors::{FdwError, FdwResult};
pub use crate::core::modify::{extract_key_values, resolve_junk_indexes, SqliteFdwModifyState};
pub use crate::core::options::SqliteFdwOptions;
pub use crate::core::registry::{ConnectionHandle, ConnectionRegistry};
pub use crate::core::state::{
    fetch_remote_stats, output_types_for_base, ScanPhase, SqliteFdwScanState,
};
pub use crate::query::deparse::{
    deparse_analyze, deparse_delete, deparse_insert, deparse_select_for_rel, deparse_update,
    DeparsedQuery,
};
pub use crate::query::expr::{
    AggFunc, AttrNumber, BinaryOp, BoolOp, Collation, ColumnRef, EquivalenceClass,
    EquivalenceMember, Expr, PathKey, RelId, RelIdSet, SortKey, TargetEntry, UnaryOp, Volatility,
};
pub use crate::query::planner::{
    all_attrs, attrs_of, can_push_sort_and_limit, compare_paths, plan_base_rel, plan_join_rel,
    plan_upper_rel, PathFlags, RemoteStats,
};
pub use crate::query::relation::{
    ColumnDesc, JoinType, RelationShape, RemoteRelationInfo, TableDesc,
};
pub use crate::query::safety::{
    find_em_expr_for_input_target, find_em_expr_for_rel, is_foreign_expr, partition_conds,
    resolve_pathkeys, EcMatchState,
};
pub use crate::value::cell::{Cell, TypeId};
pub use crate::value::row::{FdwRow, FdwValue};
