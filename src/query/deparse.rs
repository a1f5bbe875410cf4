/// SQL text generation for the remote dialect.
///
/// Everything here is purely textual: the deparser receives relations and
/// clauses the safety classifier already approved and renders SQLite SQL
/// plus the two side lists that describe how to consume it, the retrieved
/// attribute order and the positional parameter list. It never talks to a
/// connection and never re-validates safety; feeding it an untranslatable
/// expression is a caller bug.
///
/// The emitted bytes are the wire artifact: identifier quoting, literal
/// escaping, and placeholder ordering must match SQLite exactly.
use crate::query::expr::{AggFunc, AttrNumber, BoolOp, Expr, SortKey, TargetEntry, UnaryOp};
use crate::query::relation::{RelationShape, RemoteRelationInfo, TableDesc};
use crate::value::cell::Cell;

/// A finished remote statement: the SQL text, the attribute numbers the
/// SELECT returns in column order, the expressions whose runtime values bind
/// the placeholders in emission order, and the pushed-sort/pushed-limit
/// flags kept for plan introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct DeparsedQuery {
    pub sql: String,
    pub retrieved_attrs: Vec<AttrNumber>,
    pub params: Vec<Expr>,
    pub has_final_sort: bool,
    pub has_limit: bool,
}

struct DeparseContext<'a> {
    rel: &'a RemoteRelationInfo,
    buf: String,
    params: Vec<Expr>,
    /// Qualify column references with a relation alias; required whenever
    /// more than one base relation is in scope.
    qualify: bool,
}

impl<'a> DeparseContext<'a> {
    fn new(rel: &'a RemoteRelationInfo) -> Self {
        DeparseContext {
            rel,
            buf: String::new(),
            params: Vec::new(),
            qualify: rel.relids().len() > 1,
        }
    }
}

/// Quote an identifier for the remote dialect, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for ch in name.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Append a string literal, doubling embedded single quotes bit-for-bit.
pub fn append_string_literal(buf: &mut String, val: &str) {
    buf.push('\'');
    for ch in val.chars() {
        if ch == '\'' {
            buf.push('\'');
        }
        buf.push(ch);
    }
    buf.push('\'');
}

/// Count placeholders in generated text, skipping string literals.
pub fn placeholder_count(sql: &str) -> usize {
    let mut count = 0;
    let mut in_literal = false;
    for ch in sql.chars() {
        match ch {
            '\'' => in_literal = !in_literal,
            '?' if !in_literal => count += 1,
            _ => {}
        }
    }
    count
}

/// Default target list for a relation: the fetched columns of a base scan
/// in attribute order, both sides' defaults for a join, or the grouped
/// output for an upper relation.
pub fn build_tlist_to_deparse(rel: &RemoteRelationInfo) -> Vec<TargetEntry> {
    match &rel.shape {
        RelationShape::Base { relid, table } => rel
            .attrs_used
            .iter()
            .filter_map(|attno| table.column(*attno))
            .map(|col| {
                TargetEntry::new(Expr::Column(crate::query::expr::ColumnRef {
                    rel: *relid,
                    attno: col.attno,
                    ty: col.ty,
                    collation: col.collation.clone(),
                }))
            })
            .collect(),
        RelationShape::Join { outer, inner, .. } => {
            let mut out = build_tlist_to_deparse(outer);
            out.extend(build_tlist_to_deparse(inner));
            out
        }
        RelationShape::Upper { grouped_tlist, .. } => grouped_tlist.clone(),
    }
}

/// Render a SELECT over a base, join, or grouped relation.
///
/// `tlist` overrides the default target list when the host needs a specific
/// output shape. `remote_conds` must already be classified safe. The sort
/// and limit flags are recorded on the result so later introspection can
/// report what was pushed.
#[allow(clippy::too_many_arguments)]
pub fn deparse_select_for_rel(
    rel: &RemoteRelationInfo,
    tlist: Option<&[TargetEntry]>,
    remote_conds: &[Expr],
    pathkeys: &[SortKey],
    has_final_sort: bool,
    has_limit: bool,
    limit_count: Option<i64>,
    limit_offset: Option<i64>,
    is_subquery: bool,
) -> DeparsedQuery {
    let mut ctx = DeparseContext::new(rel);
    let owned_tlist;
    let tlist = match tlist {
        Some(t) => t,
        None => {
            owned_tlist = build_tlist_to_deparse(rel);
            &owned_tlist
        }
    };

    ctx.buf.push_str("SELECT ");
    let retrieved_attrs = deparse_target_list(&mut ctx, tlist);

    ctx.buf.push_str(" FROM ");
    deparse_from_clause(&mut ctx, rel);

    match &rel.shape {
        RelationShape::Upper {
            input, group_exprs, ..
        } => {
            // A grouped shape only reaches the deparser when every input
            // restriction runs remotely; those filter rows before grouping,
            // while the stage's own safe clauses become HAVING.
            append_where_clause(&mut ctx, &input.remote_conds);
            if !group_exprs.is_empty() {
                ctx.buf.push_str(" GROUP BY ");
                for (i, expr) in group_exprs.iter().enumerate() {
                    if i > 0 {
                        ctx.buf.push_str(", ");
                    }
                    deparse_expr(&mut ctx, expr);
                }
            }
            if !remote_conds.is_empty() {
                ctx.buf.push_str(" HAVING ");
                for (i, cond) in remote_conds.iter().enumerate() {
                    if i > 0 {
                        ctx.buf.push_str(" AND ");
                    }
                    deparse_expr(&mut ctx, cond);
                }
            }
        }
        _ => append_where_clause(&mut ctx, remote_conds),
    }

    if has_final_sort && !pathkeys.is_empty() {
        ctx.buf.push_str(" ORDER BY ");
        for (i, key) in pathkeys.iter().enumerate() {
            if i > 0 {
                ctx.buf.push_str(", ");
            }
            deparse_expr(&mut ctx, &key.expr);
            ctx.buf.push_str(if key.descending { " DESC" } else { " ASC" });
            ctx.buf
                .push_str(if key.nulls_first { " NULLS FIRST" } else { " NULLS LAST" });
        }
    }

    if has_limit {
        ctx.buf.push_str(" LIMIT ");
        match limit_count {
            Some(n) => ctx.buf.push_str(&n.to_string()),
            None => ctx.buf.push_str("-1"),
        }
        if let Some(off) = limit_offset {
            ctx.buf.push_str(" OFFSET ");
            ctx.buf.push_str(&off.to_string());
        }
    }

    let sql = if is_subquery {
        let alias = rel.relids().iter().next().copied().unwrap_or(0);
        format!("({}) ss{}", ctx.buf, alias)
    } else {
        ctx.buf
    };

    DeparsedQuery {
        sql,
        retrieved_attrs,
        params: ctx.params,
        has_final_sort,
        has_limit,
    }
}

/// Emit the SELECT list; returns the retrieved-attribute order. A plain
/// base-column list reports real attribute numbers, anything else reports
/// 1-based output positions.
fn deparse_target_list(ctx: &mut DeparseContext<'_>, tlist: &[TargetEntry]) -> Vec<AttrNumber> {
    if tlist.is_empty() {
        // Nothing to fetch (e.g. SELECT COUNT pushed elsewhere, or a scan
        // used only for row existence): still a valid single-column SELECT.
        ctx.buf.push_str("NULL");
        return Vec::new();
    }

    let base_columns_only = matches!(&ctx.rel.shape, RelationShape::Base { relid, .. }
        if tlist.iter().all(|te| matches!(&te.expr, Expr::Column(c) if c.rel == *relid)));

    let mut retrieved = Vec::with_capacity(tlist.len());
    for (i, te) in tlist.iter().enumerate() {
        if i > 0 {
            ctx.buf.push_str(", ");
        }
        deparse_expr(ctx, &te.expr);
        if base_columns_only {
            if let Expr::Column(c) = &te.expr {
                retrieved.push(c.attno);
            }
        } else {
            retrieved.push((i + 1) as AttrNumber);
        }
    }
    retrieved
}

fn deparse_from_clause(ctx: &mut DeparseContext<'_>, rel: &RemoteRelationInfo) {
    match &rel.shape {
        RelationShape::Base { relid, table } => {
            ctx.buf.push_str(&quote_identifier(&table.remote_name));
            if ctx.qualify {
                ctx.buf.push_str(&format!(" r{relid}"));
            }
        }
        RelationShape::Join {
            outer,
            inner,
            join_type,
            join_clauses,
        } => {
            let token = join_type
                .sql_token()
                .unwrap_or_else(|| panic!("{} join reached the deparser", join_type.label()));
            ctx.buf.push('(');
            deparse_from_clause(ctx, outer);
            ctx.buf.push(' ');
            ctx.buf.push_str(token);
            ctx.buf.push(' ');
            deparse_from_clause(ctx, inner);
            ctx.buf.push_str(" ON ");
            if join_clauses.is_empty() {
                ctx.buf.push_str("(1 = 1)");
            } else {
                for (i, clause) in join_clauses.iter().enumerate() {
                    if i > 0 {
                        ctx.buf.push_str(" AND ");
                    }
                    deparse_expr(ctx, clause);
                }
            }
            ctx.buf.push(')');
        }
        RelationShape::Upper { input, .. } => deparse_from_clause(ctx, input),
    }
}

/// Append safe clauses as a WHERE list, tracking whether the connective or
/// the keyword is due next. Compound expressions parenthesize themselves,
/// so clauses are emitted bare.
fn append_where_clause(ctx: &mut DeparseContext<'_>, conds: &[Expr]) {
    let mut is_first = true;
    for cond in conds {
        if is_first {
            ctx.buf.push_str(" WHERE ");
            is_first = false;
        } else {
            ctx.buf.push_str(" AND ");
        }
        deparse_expr(ctx, cond);
    }
}

fn deparse_column(ctx: &mut DeparseContext<'_>, rel_id: usize, attno: AttrNumber) {
    let table = ctx
        .rel
        .find_base(rel_id)
        .unwrap_or_else(|| panic!("relation {rel_id} is not part of the deparsed shape"));
    let col = table
        .column(attno)
        .unwrap_or_else(|| panic!("relation {rel_id} has no attribute {attno}"));
    if ctx.qualify {
        ctx.buf.push_str(&format!("r{rel_id}."));
    }
    ctx.buf.push_str(&quote_identifier(&col.name));
}

fn deparse_const(buf: &mut String, value: &Option<Cell>) {
    match value {
        None => buf.push_str("NULL"),
        Some(Cell::Bool(b)) => buf.push_str(if *b { "1" } else { "0" }),
        Some(Cell::I16(i)) => buf.push_str(&i.to_string()),
        Some(Cell::I32(i)) => buf.push_str(&i.to_string()),
        Some(Cell::I64(i)) => buf.push_str(&i.to_string()),
        Some(Cell::F64(f)) => buf.push_str(&format!("{f:?}")),
        Some(Cell::Text(s)) => append_string_literal(buf, s),
        Some(Cell::Date(s)) | Some(Cell::Timestamp(s)) => append_string_literal(buf, s),
        Some(Cell::Blob(bytes)) => {
            buf.push_str("X'");
            for b in bytes {
                buf.push_str(&format!("{b:02X}"));
            }
            buf.push('\'');
        }
    }
}

fn deparse_expr(ctx: &mut DeparseContext<'_>, expr: &Expr) {
    match expr {
        Expr::Column(c) => deparse_column(ctx, c.rel, c.attno),
        Expr::Const { value, .. } => deparse_const(&mut ctx.buf, value),
        Expr::Param { .. } => {
            ctx.buf.push('?');
            ctx.params.push(expr.clone());
        }
        Expr::Unary { op: UnaryOp::Neg, arg } => {
            ctx.buf.push_str("(- ");
            deparse_expr(ctx, arg);
            ctx.buf.push(')');
        }
        Expr::Binary { op, left, right, .. } => {
            ctx.buf.push('(');
            deparse_expr(ctx, left);
            ctx.buf.push(' ');
            ctx.buf.push_str(op.sql_token());
            ctx.buf.push(' ');
            deparse_expr(ctx, right);
            ctx.buf.push(')');
        }
        Expr::Bool { op: BoolOp::Not, args } => {
            ctx.buf.push_str("(NOT ");
            deparse_expr(ctx, &args[0]);
            ctx.buf.push(')');
        }
        Expr::Bool { op, args } => {
            let token = match op {
                BoolOp::And => " AND ",
                BoolOp::Or => " OR ",
                BoolOp::Not => unreachable!(),
            };
            ctx.buf.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    ctx.buf.push_str(token);
                }
                deparse_expr(ctx, arg);
            }
            ctx.buf.push(')');
        }
        Expr::Func { name, args, .. } => {
            ctx.buf.push_str(name.as_str());
            ctx.buf.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    ctx.buf.push_str(", ");
                }
                deparse_expr(ctx, arg);
            }
            ctx.buf.push(')');
        }
        Expr::Aggregate { func, arg, distinct } => {
            ctx.buf.push_str(func.sql_name());
            ctx.buf.push('(');
            match arg {
                None => {
                    debug_assert_eq!(*func, AggFunc::Count);
                    ctx.buf.push('*');
                }
                Some(a) => {
                    if *distinct {
                        ctx.buf.push_str("DISTINCT ");
                    }
                    deparse_expr(ctx, a);
                }
            }
            ctx.buf.push(')');
        }
        Expr::Cast { arg, target } => {
            ctx.buf.push_str("CAST(");
            deparse_expr(ctx, arg);
            ctx.buf.push_str(" AS ");
            ctx.buf.push_str(target.remote_cast_name());
            ctx.buf.push(')');
        }
        Expr::NullTest { arg, negated } => {
            ctx.buf.push('(');
            deparse_expr(ctx, arg);
            ctx.buf
                .push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            ctx.buf.push(')');
        }
        Expr::Subquery { .. } => panic!("subquery reached the deparser"),
    }
}

/// Resolve attribute numbers to their columns, panicking on unknowns
/// (callers deparse against the same catalog they plan with).
fn columns_for<'t>(
    table: &'t TableDesc,
    attrs: &[AttrNumber],
) -> Vec<&'t crate::query::relation::ColumnDesc> {
    attrs
        .iter()
        .map(|attno| {
            table.column(*attno).unwrap_or_else(|| {
                panic!("relation \"{}\" has no attribute {attno}", table.local_name)
            })
        })
        .collect()
}

/// Render an INSERT with one placeholder per target attribute, in the given
/// order. The parameter list carries one placeholder expression per
/// attribute so binding order is fixed by construction.
pub fn deparse_insert(table: &TableDesc, target_attrs: &[AttrNumber]) -> DeparsedQuery {
    let cols = columns_for(table, target_attrs);
    let mut sql = String::from("INSERT INTO ");
    sql.push_str(&quote_identifier(&table.remote_name));
    sql.push_str(" (");
    for (i, col) in cols.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&quote_identifier(&col.name));
    }
    sql.push_str(") VALUES (");
    let mut params = Vec::with_capacity(cols.len());
    for (i, col) in cols.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
        params.push(Expr::Param {
            ordinal: i,
            ty: col.ty,
        });
    }
    sql.push(')');

    DeparsedQuery {
        sql,
        retrieved_attrs: Vec::new(),
        params,
        has_final_sort: false,
        has_limit: false,
    }
}

/// Render an UPDATE: SET placeholders for `target_attrs` in order, then key
/// placeholders for `key_attrs` identifying the rows to change.
pub fn deparse_update(
    table: &TableDesc,
    target_attrs: &[AttrNumber],
    key_attrs: &[AttrNumber],
) -> DeparsedQuery {
    let mut sql = String::from("UPDATE ");
    sql.push_str(&quote_identifier(&table.remote_name));
    sql.push_str(" SET ");

    let mut params = Vec::new();
    for (i, col) in columns_for(table, target_attrs).iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&quote_identifier(&col.name));
        sql.push_str(" = ?");
        params.push(Expr::Param {
            ordinal: params.len(),
            ty: col.ty,
        });
    }

    append_key_clause(table, key_attrs, &mut sql, &mut params);

    DeparsedQuery {
        sql,
        retrieved_attrs: Vec::new(),
        params,
        has_final_sort: false,
        has_limit: false,
    }
}

/// Render a DELETE keyed on `key_attrs`.
pub fn deparse_delete(table: &TableDesc, key_attrs: &[AttrNumber]) -> DeparsedQuery {
    let mut sql = String::from("DELETE FROM ");
    sql.push_str(&quote_identifier(&table.remote_name));

    let mut params = Vec::new();
    append_key_clause(table, key_attrs, &mut sql, &mut params);

    DeparsedQuery {
        sql,
        retrieved_attrs: Vec::new(),
        params,
        has_final_sort: false,
        has_limit: false,
    }
}

fn append_key_clause(
    table: &TableDesc,
    key_attrs: &[AttrNumber],
    sql: &mut String,
    params: &mut Vec<Expr>,
) {
    for (i, col) in columns_for(table, key_attrs).iter().enumerate() {
        sql.push_str(if i == 0 { " WHERE " } else { " AND " });
        sql.push_str(&quote_identifier(&col.name));
        sql.push_str(" = ?");
        params.push(Expr::Param {
            ordinal: params.len(),
            ty: col.ty,
        });
    }
}

/// Row-count sampling statement used for remote-estimate calibration.
pub fn deparse_analyze(remote_name: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_identifier(remote_name))
}
