/// Relation metadata and the per-relation planning record.
use std::collections::BTreeSet;

use crate::query::expr::{AttrNumber, Collation, Expr, RelId, RelIdSet, TargetEntry};
use crate::value::cell::TypeId;

/// Set of attribute numbers a scan must fetch.
pub type AttrSet = BTreeSet<AttrNumber>;

/// One column of a remote table as known to the host catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDesc {
    pub name: String,
    pub attno: AttrNumber,
    pub ty: TypeId,
    pub collation: Collation,
}

/// A remote table the host has mapped.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDesc {
    /// Name the host knows the relation by, used in diagnostics.
    pub local_name: String,
    /// Table name on the SQLite side.
    pub remote_name: String,
    pub columns: Vec<ColumnDesc>,
}

impl TableDesc {
    pub fn column(&self, attno: AttrNumber) -> Option<&ColumnDesc> {
        self.columns.iter().find(|c| c.attno == attno)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDesc> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
}

impl JoinType {
    /// SQL keyword sequence, for the join types the remote dialect accepts.
    pub fn sql_token(self) -> Option<&'static str> {
        match self {
            JoinType::Inner => Some("INNER JOIN"),
            JoinType::Left => Some("LEFT JOIN"),
            JoinType::Right => Some("RIGHT JOIN"),
            JoinType::Full => Some("FULL JOIN"),
            JoinType::Semi | JoinType::Anti => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
            JoinType::Semi => "SEMI",
            JoinType::Anti => "ANTI",
        }
    }
}

/// Stage-specific payload of a planned relation. Join fields exist only for
/// joins and grouping fields only for upper relations, so a caller cannot
/// read the wrong set for the shape at hand.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationShape {
    Base {
        relid: RelId,
        table: TableDesc,
    },
    Join {
        outer: Box<RemoteRelationInfo>,
        inner: Box<RemoteRelationInfo>,
        join_type: JoinType,
        join_clauses: Vec<Expr>,
    },
    Upper {
        input: Box<RemoteRelationInfo>,
        grouped_tlist: Vec<TargetEntry>,
        group_exprs: Vec<Expr>,
    },
}

/// Per-relation planning state: the restriction-clause partition, size and
/// cost estimates, the fetched-attribute set, and the stage-specific shape.
///
/// Created once per candidate relation during planning; cost fields may be
/// refined as better estimates arrive, everything else is settled at build
/// time.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRelationInfo {
    /// True when the relation itself may run remotely. A base relation is
    /// eligible even when some of its restrictions stay local.
    pub pushdown_safe: bool,

    /// Restriction clauses that translate safely and run remotely.
    pub remote_conds: Vec<Expr>,
    /// Restriction clauses re-checked locally after rows arrive.
    pub local_conds: Vec<Expr>,

    /// Estimated output rows after all filtering.
    pub rows: f64,
    /// Estimated output row width in bytes.
    pub width: u32,
    pub startup_cost: f64,
    pub total_cost: f64,
    /// Cost of the remote work alone, excluding row transfer overhead.
    pub rel_startup_cost: f64,
    pub rel_total_cost: f64,

    /// Attribute numbers fetched from the remote side, per base relation.
    pub attrs_used: AttrSet,

    /// Human-readable shape description used in diagnostics.
    pub relation_label: String,

    pub shape: RelationShape,
}

impl RemoteRelationInfo {
    /// Base relation ids covered by this relation.
    pub fn relids(&self) -> RelIdSet {
        let mut out = RelIdSet::new();
        self.collect_relids(&mut out);
        out
    }

    fn collect_relids(&self, out: &mut RelIdSet) {
        match &self.shape {
            RelationShape::Base { relid, .. } => {
                out.insert(*relid);
            }
            RelationShape::Join { outer, inner, .. } => {
                outer.collect_relids(out);
                inner.collect_relids(out);
            }
            RelationShape::Upper { input, .. } => input.collect_relids(out),
        }
    }

    /// Look up the base table backing a relation id anywhere in this shape.
    pub fn find_base(&self, relid: RelId) -> Option<&TableDesc> {
        match &self.shape {
            RelationShape::Base { relid: r, table } => (*r == relid).then_some(table),
            RelationShape::Join { outer, inner, .. } => {
                outer.find_base(relid).or_else(|| inner.find_base(relid))
            }
            RelationShape::Upper { input, .. } => input.find_base(relid),
        }
    }

    pub fn is_join(&self) -> bool {
        matches!(self.shape, RelationShape::Join { .. })
    }

    pub fn is_upper(&self) -> bool {
        matches!(self.shape, RelationShape::Upper { .. })
    }
}
