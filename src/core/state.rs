/// Per-scan execution state
///
/// Owns the connection checkout, the finalized query text, parameter
/// metadata, and the decoded row buffer for one foreign scan. The scan
/// moves through `Unopened → Prepared → Open → Exhausted → Closed`;
/// `Closed` is reachable from every phase on error or explicit
/// termination.
///
/// Driver result cursors borrow their statement and cannot be carried
/// across iterator-pull calls, so the statement is drained through the
/// per-column converters (resolved once at construction) into an owned
/// buffer when it first executes; rows are then served by cursor index,
/// and the scan reports end-of-data deterministically on every call past
/// the last row.
use log::debug;
use rusqlite::params_from_iter;

use crate::core::connection::SqliteConnection;
use crate::core::errors::{FdwError, FdwResult};
use crate::core::options::SqliteFdwOptions;
use crate::core::registry::{ConnectionHandle, ConnectionRegistry};
use crate::query::deparse::{deparse_analyze, DeparsedQuery};
use crate::query::expr::{AttrNumber, Expr};
use crate::query::planner::RemoteStats;
use crate::query::relation::TableDesc;
use crate::value::cell::{Cell, TypeId};
use crate::value::marshal::{resolve_converters, to_wire, ColumnConverter, WireValue};
use crate::value::row::FdwRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Unopened,
    Prepared,
    Open,
    Exhausted,
    Closed,
}

impl ScanPhase {
    pub fn name(self) -> &'static str {
        match self {
            ScanPhase::Unopened => "unopened",
            ScanPhase::Prepared => "prepared",
            ScanPhase::Open => "open",
            ScanPhase::Exhausted => "exhausted",
            ScanPhase::Closed => "closed",
        }
    }
}

/// Parameter slots registered for the scan: the originating expressions in
/// placeholder order, their declared types, and the currently bound wire
/// values.
#[derive(Debug, Default)]
struct ScanParams {
    exprs: Vec<Expr>,
    types: Vec<TypeId>,
    values: Vec<WireValue>,
}

pub struct SqliteFdwScanState {
    conn: Option<ConnectionHandle>,
    query: String,
    retrieved_attrs: Vec<AttrNumber>,
    converters: Vec<ColumnConverter>,
    params: ScanParams,
    rows: Vec<FdwRow>,
    rowidx: usize,
    for_update: bool,
    phase: ScanPhase,
}

/// Declared types of a base scan's retrieved attributes, in SELECT order.
pub fn output_types_for_base(table: &TableDesc, retrieved_attrs: &[AttrNumber]) -> Vec<TypeId> {
    retrieved_attrs
        .iter()
        .map(|attno| {
            table
                .column(*attno)
                .unwrap_or_else(|| {
                    panic!("relation \"{}\" has no attribute {attno}", table.local_name)
                })
                .ty
        })
        .collect()
}

impl SqliteFdwScanState {
    /// Build scan state from a deparsed SELECT and the declared types of
    /// its output columns. Output converters are resolved here, once, not
    /// per row.
    pub fn new(query: DeparsedQuery, output_types: Vec<TypeId>, opts: &SqliteFdwOptions) -> Self {
        let param_types = query
            .params
            .iter()
            .map(|e| e.static_type().unwrap_or(TypeId::Text))
            .collect();
        SqliteFdwScanState {
            conn: None,
            converters: resolve_converters(&output_types, opts.max_blob_size),
            retrieved_attrs: query.retrieved_attrs,
            params: ScanParams {
                exprs: query.params,
                types: param_types,
                values: Vec::new(),
            },
            query: query.sql,
            rows: Vec::new(),
            rowidx: 0,
            for_update: false,
            phase: ScanPhase::Unopened,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn retrieved_attrs(&self) -> &[AttrNumber] {
        &self.retrieved_attrs
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn param_exprs(&self) -> &[Expr] {
        &self.params.exprs
    }

    pub fn param_types(&self) -> &[TypeId] {
        &self.params.types
    }

    /// Mark this scan as the row source of an UPDATE or DELETE.
    pub fn set_for_update(&mut self, for_update: bool) {
        self.for_update = for_update;
    }

    pub fn is_for_update(&self) -> bool {
        self.for_update
    }

    fn expect_phase(&self, allowed: &[ScanPhase], expected: &'static str) -> FdwResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(FdwError::ScanPhase {
                expected,
                actual: self.phase.name(),
            })
        }
    }

    /// Acquire a connection and verify the statement prepares remotely.
    /// Plan-time constants are already inlined in the text; slots fed by
    /// runtime expressions stay open until `rebind`.
    pub fn open(
        &mut self,
        registry: &mut ConnectionRegistry,
        opts: &SqliteFdwOptions,
    ) -> FdwResult<()> {
        self.expect_phase(&[ScanPhase::Unopened], "unopened")?;

        let handle = match registry.acquire(opts) {
            Ok(h) => h,
            Err(e) => {
                self.phase = ScanPhase::Closed;
                return Err(e);
            }
        };

        if let Err(e) = handle.validate_statement(&self.query) {
            if handle.is_broken() {
                let key = handle.server_key().to_string();
                drop(handle);
                registry.evict(&key);
            }
            self.phase = ScanPhase::Closed;
            return Err(e);
        }

        self.conn = Some(handle);
        self.phase = ScanPhase::Prepared;
        Ok(())
    }

    /// Bind runtime parameter values positionally, in registered order, and
    /// reset the scan for (re-)execution. Used before the first execution
    /// of a parameterized scan and before each outer row in a nested-loop
    /// pushdown. A `None` value binds a remote NULL.
    pub fn rebind(&mut self, values: &[Option<Cell>]) -> FdwResult<()> {
        self.expect_phase(
            &[ScanPhase::Prepared, ScanPhase::Open, ScanPhase::Exhausted],
            "prepared or executed",
        )?;
        if values.len() != self.params.exprs.len() {
            return Err(FdwError::ParamCount {
                expected: self.params.exprs.len(),
                got: values.len(),
            });
        }
        self.params.values = values.iter().map(|v| to_wire(v.as_ref())).collect();
        self.rows.clear();
        self.rowidx = 0;
        self.phase = ScanPhase::Prepared;
        Ok(())
    }

    /// Restart the scan with its current parameter bindings.
    pub fn rescan(&mut self) -> FdwResult<()> {
        self.expect_phase(
            &[ScanPhase::Prepared, ScanPhase::Open, ScanPhase::Exhausted],
            "prepared or executed",
        )?;
        self.rows.clear();
        self.rowidx = 0;
        self.phase = ScanPhase::Prepared;
        Ok(())
    }

    /// Produce the next row, executing the remote statement on first call.
    /// Past the end of the result set this returns `Ok(None)` on every
    /// call, never an error.
    pub fn fetch_next(&mut self) -> FdwResult<Option<FdwRow>> {
        match self.phase {
            ScanPhase::Unopened | ScanPhase::Closed => Err(FdwError::ScanPhase {
                expected: "open",
                actual: self.phase.name(),
            }),
            ScanPhase::Exhausted => Ok(None),
            ScanPhase::Prepared => {
                self.execute()?;
                self.phase = ScanPhase::Open;
                Ok(self.next_buffered())
            }
            ScanPhase::Open => Ok(self.next_buffered()),
        }
    }

    fn next_buffered(&mut self) -> Option<FdwRow> {
        if self.rowidx < self.rows.len() {
            let row = std::mem::take(&mut self.rows[self.rowidx]);
            self.rowidx += 1;
            Some(row)
        } else {
            self.rows.clear();
            self.rowidx = 0;
            self.phase = ScanPhase::Exhausted;
            None
        }
    }

    fn execute(&mut self) -> FdwResult<()> {
        if self.params.values.len() != self.params.exprs.len() {
            return Err(FdwError::ParamCount {
                expected: self.params.exprs.len(),
                got: self.params.values.len(),
            });
        }
        let conn = self.conn.as_ref().ok_or(FdwError::ScanPhase {
            expected: "open",
            actual: "unopened",
        })?;
        self.rows = run_query(conn, &self.query, &self.params.values, &self.converters)?;
        self.rowidx = 0;
        Ok(())
    }

    /// Finalize the scan. The connection goes back to the registry's idle
    /// set, or is evicted when its channel broke. Closing twice is fine.
    pub fn close(&mut self, registry: &mut ConnectionRegistry) {
        if let Some(handle) = self.conn.take() {
            if handle.is_broken() {
                let key = handle.server_key().to_string();
                drop(handle);
                registry.evict(&key);
            }
        }
        self.rows.clear();
        self.rowidx = 0;
        self.phase = ScanPhase::Closed;
    }
}

/// Execute a statement and decode its whole result through the given
/// converters into an owned row buffer.
fn run_query(
    conn: &SqliteConnection,
    sql: &str,
    values: &[WireValue],
    converters: &[ColumnConverter],
) -> FdwResult<Vec<FdwRow>> {
    let mut stmt = conn
        .raw()
        .prepare_cached(sql)
        .map_err(|e| map_exec_error(conn, e, sql))?;

    if (stmt.column_count() as usize) < converters.len() {
        return Err(FdwError::Statement {
            code: None,
            message: format!(
                "statement returns {} columns, {} expected",
                stmt.column_count(),
                converters.len()
            ),
            sql: sql.to_owned(),
        });
    }

    let mut rows = stmt
        .query(params_from_iter(values.iter()))
        .map_err(|e| map_exec_error(conn, e, sql))?;

    let mut out: Vec<FdwRow> = Vec::new();
    loop {
        let row = match rows.next() {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => return Err(map_exec_error(conn, e, sql)),
        };
        let mut decoded = FdwRow {
            values: Vec::with_capacity(converters.len()),
        };
        for (i, converter) in converters.iter().enumerate() {
            let value_ref = row.get_ref(i).map_err(|e| map_exec_error(conn, e, sql))?;
            let wire = WireValue::from_value_ref(value_ref)
                .map_err(|source| FdwError::Data { column: i, source })?;
            let value = converter
                .to_local(wire)
                .map_err(|source| FdwError::Data { column: i, source })?;
            decoded.values.push(value);
        }
        out.push(decoded);
    }
    debug!("scan decoded {} rows", out.len());
    Ok(out)
}

pub(crate) fn map_exec_error(conn: &SqliteConnection, e: rusqlite::Error, sql: &str) -> FdwError {
    if FdwError::indicates_broken_connection(&e) {
        conn.mark_broken();
        FdwError::Connection {
            server: conn.server_key().to_owned(),
            message: e.to_string(),
        }
    } else {
        FdwError::statement(e, sql)
    }
}

/// Sample the remote row count for estimate calibration, through the same
/// registry the scans use.
pub fn fetch_remote_stats(
    registry: &mut ConnectionRegistry,
    opts: &SqliteFdwOptions,
    table: &TableDesc,
) -> FdwResult<RemoteStats> {
    let handle = registry.acquire(opts)?;
    let sql = deparse_analyze(&table.remote_name);
    let result = handle.raw().query_row(&sql, [], |r| r.get::<_, i64>(0));
    match result {
        Ok(n) => Ok(RemoteStats { rows: n as f64 }),
        Err(e) => {
            let err = map_exec_error(&handle, e, &sql);
            if handle.is_broken() {
                let key = handle.server_key().to_string();
                drop(handle);
                registry.evict(&key);
            }
            Err(err)
        }
    }
}
