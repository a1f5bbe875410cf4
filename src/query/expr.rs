/// Expression trees handed to the planner by the host engine.
///
/// The host's own node format never crosses into this crate; planning,
/// classification, and deparsing all operate on this IR.
use std::collections::BTreeSet;

use crate::value::cell::{Cell, TypeId};

/// Planner-assigned relation index. Base relations in one query carry
/// distinct ids; join and upper shapes are identified by their set of base
/// ids.
pub type RelId = usize;

/// 1-based attribute number within a relation. Zero and negative numbers
/// identify system attributes, which are never fetchable remotely.
pub type AttrNumber = i16;

pub type RelIdSet = BTreeSet<RelId>;

/// Collation attached to a textual expression. Anything other than the
/// database default makes comparisons and ordering unsafe to evaluate
/// remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collation {
    Default,
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    Immutable,
    Stable,
    Volatile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    /// Case-sensitive pattern match. SQLite folds ASCII case in its LIKE,
    /// so neither pattern operator translates remotely.
    Like,
    /// Case-insensitive LIKE in the host dialect.
    ILike,
}

impl BinaryOp {
    pub fn sql_token(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "||",
            BinaryOp::Like => "LIKE",
            BinaryOp::ILike => "ILIKE",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFunc {
    pub fn sql_name(self) -> &'static str {
        match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
        }
    }
}

/// Reference to one column of a base relation.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub rel: RelId,
    pub attno: AttrNumber,
    pub ty: TypeId,
    pub collation: Collation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Const {
        value: Option<Cell>,
        ty: TypeId,
    },
    /// Runtime-evaluated placeholder; its value is bound positionally before
    /// each execution.
    Param {
        ordinal: usize,
        ty: TypeId,
    },
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        collation: Collation,
    },
    Bool {
        op: BoolOp,
        args: Vec<Expr>,
    },
    Func {
        name: String,
        args: Vec<Expr>,
        volatility: Volatility,
        collation: Collation,
    },
    Aggregate {
        func: AggFunc,
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    Cast {
        arg: Box<Expr>,
        target: TypeId,
    },
    NullTest {
        arg: Box<Expr>,
        negated: bool,
    },
    /// Opaque subquery marker. Subqueries are never translated remotely.
    Subquery {
        correlated: bool,
    },
}

impl Expr {
    /// Base relations referenced anywhere in this tree.
    pub fn relids(&self) -> RelIdSet {
        let mut out = RelIdSet::new();
        self.collect_relids(&mut out);
        out
    }

    fn collect_relids(&self, out: &mut RelIdSet) {
        match self {
            Expr::Column(c) => {
                out.insert(c.rel);
            }
            Expr::Const { .. } | Expr::Param { .. } | Expr::Subquery { .. } => {}
            Expr::Unary { arg, .. } | Expr::Cast { arg, .. } | Expr::NullTest { arg, .. } => {
                arg.collect_relids(out)
            }
            Expr::Binary { left, right, .. } => {
                left.collect_relids(out);
                right.collect_relids(out);
            }
            Expr::Bool { args, .. } | Expr::Func { args, .. } => {
                for a in args {
                    a.collect_relids(out);
                }
            }
            Expr::Aggregate { arg, .. } => {
                if let Some(a) = arg {
                    a.collect_relids(out);
                }
            }
        }
    }

    /// Attribute numbers this tree references for the given relation.
    pub fn collect_attrs(&self, rel: RelId, out: &mut BTreeSet<AttrNumber>) {
        match self {
            Expr::Column(c) => {
                if c.rel == rel {
                    out.insert(c.attno);
                }
            }
            Expr::Const { .. } | Expr::Param { .. } | Expr::Subquery { .. } => {}
            Expr::Unary { arg, .. } | Expr::Cast { arg, .. } | Expr::NullTest { arg, .. } => {
                arg.collect_attrs(rel, out)
            }
            Expr::Binary { left, right, .. } => {
                left.collect_attrs(rel, out);
                right.collect_attrs(rel, out);
            }
            Expr::Bool { args, .. } | Expr::Func { args, .. } => {
                for a in args {
                    a.collect_attrs(rel, out);
                }
            }
            Expr::Aggregate { arg, .. } => {
                if let Some(a) = arg {
                    a.collect_attrs(rel, out);
                }
            }
        }
    }

    /// Static result type, where one can be known without full inference.
    pub fn static_type(&self) -> Option<TypeId> {
        match self {
            Expr::Column(c) => Some(c.ty),
            Expr::Const { ty, .. } => Some(*ty),
            Expr::Param { ty, .. } => Some(*ty),
            Expr::Cast { target, .. } => Some(*target),
            Expr::Unary { arg, .. } => arg.static_type(),
            Expr::Binary { op, left, right, .. } => {
                if op.is_comparison() || matches!(op, BinaryOp::Like | BinaryOp::ILike) {
                    Some(TypeId::Bool)
                } else if matches!(op, BinaryOp::Concat) {
                    Some(TypeId::Text)
                } else {
                    match (left.static_type(), right.static_type()) {
                        (Some(TypeId::Double), _) | (_, Some(TypeId::Double)) => {
                            Some(TypeId::Double)
                        }
                        (Some(l), Some(r)) if l.is_integer() && r.is_integer() => {
                            Some(TypeId::BigInt)
                        }
                        _ => None,
                    }
                }
            }
            Expr::Bool { .. } | Expr::NullTest { .. } => Some(TypeId::Bool),
            Expr::Func { .. } | Expr::Aggregate { .. } | Expr::Subquery { .. } => None,
        }
    }
}

/// One output expression of a relation's target list.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetEntry {
    pub expr: Expr,
    pub name: Option<String>,
}

impl TargetEntry {
    pub fn new(expr: Expr) -> Self {
        TargetEntry { expr, name: None }
    }

    pub fn named(expr: Expr, name: impl Into<String>) -> Self {
        TargetEntry {
            expr,
            name: Some(name.into()),
        }
    }
}

/// One requested sort ordering, already resolved to a concrete expression.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub descending: bool,
    pub nulls_first: bool,
}

/// A set of expressions the host planner proved equal, any of which may
/// stand in for the group within a relation that covers its member.
#[derive(Debug, Clone, PartialEq)]
pub struct EquivalenceClass {
    pub members: Vec<EquivalenceMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquivalenceMember {
    pub expr: Expr,
    pub relids: RelIdSet,
}

/// A requested ordering expressed through an equivalence class, before it is
/// resolved against a concrete relation.
#[derive(Debug, Clone, PartialEq)]
pub struct PathKey {
    pub ec: EquivalenceClass,
    pub descending: bool,
    pub nulls_first: bool,
}

/// Convenience constructors used throughout planning and tests.
impl Expr {
    pub fn column(rel: RelId, attno: AttrNumber, ty: TypeId) -> Expr {
        Expr::Column(ColumnRef {
            rel,
            attno,
            ty,
            collation: Collation::Default,
        })
    }

    pub fn int_const(v: i64) -> Expr {
        Expr::Const {
            value: Some(Cell::I64(v)),
            ty: TypeId::BigInt,
        }
    }

    pub fn text_const(v: impl Into<String>) -> Expr {
        Expr::Const {
            value: Some(Cell::Text(v.into())),
            ty: TypeId::Text,
        }
    }

    pub fn null_const(ty: TypeId) -> Expr {
        Expr::Const { value: None, ty }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            collation: Collation::Default,
        }
    }
}
