/// Per-statement modify state
///
/// Drives deparsed INSERT, UPDATE, and DELETE statements: one connection
/// checkout per modify, per-row positional binding in registered parameter
/// order, and rows-affected accounting. UPDATE and DELETE statements are
/// fed their key values after the SET values, exactly as their placeholders
/// were emitted; the key cells come out of the for-update scan's rows
/// through junk indexes resolved once per modify.
use rusqlite::params_from_iter;

use crate::core::errors::{FdwError, FdwResult};
use crate::core::options::SqliteFdwOptions;
use crate::core::registry::{ConnectionHandle, ConnectionRegistry};
use crate::core::state::map_exec_error;
use crate::query::deparse::DeparsedQuery;
use crate::query::expr::{AttrNumber, Expr};
use crate::value::cell::{Cell, TypeId};
use crate::value::marshal::to_wire;
use crate::value::row::FdwRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModifyPhase {
    Unopened,
    Ready,
    Closed,
}

pub struct SqliteFdwModifyState {
    conn: Option<ConnectionHandle>,
    query: String,
    param_exprs: Vec<Expr>,
    param_types: Vec<TypeId>,
    phase: ModifyPhase,
    rows_affected: u64,
}

impl SqliteFdwModifyState {
    pub fn new(query: DeparsedQuery) -> Self {
        let param_types = query
            .params
            .iter()
            .map(|e| e.static_type().unwrap_or(TypeId::Text))
            .collect();
        SqliteFdwModifyState {
            conn: None,
            param_exprs: query.params,
            param_types,
            query: query.sql,
            phase: ModifyPhase::Unopened,
            rows_affected: 0,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn param_types(&self) -> &[TypeId] {
        &self.param_types
    }

    /// Total rows changed across all executions of this statement.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn open(
        &mut self,
        registry: &mut ConnectionRegistry,
        opts: &SqliteFdwOptions,
    ) -> FdwResult<()> {
        if self.phase != ModifyPhase::Unopened {
            return Err(FdwError::ScanPhase {
                expected: "unopened",
                actual: match self.phase {
                    ModifyPhase::Unopened => "unopened",
                    ModifyPhase::Ready => "open",
                    ModifyPhase::Closed => "closed",
                },
            });
        }

        let handle = match registry.acquire(opts) {
            Ok(h) => h,
            Err(e) => {
                self.phase = ModifyPhase::Closed;
                return Err(e);
            }
        };
        if let Err(e) = handle.validate_statement(&self.query) {
            if handle.is_broken() {
                let key = handle.server_key().to_string();
                drop(handle);
                registry.evict(&key);
            }
            self.phase = ModifyPhase::Closed;
            return Err(e);
        }

        self.conn = Some(handle);
        self.phase = ModifyPhase::Ready;
        Ok(())
    }

    /// Bind one row's parameter values and execute. Every slot is rebound
    /// on every call; a `None` value binds a remote NULL. Returns the rows
    /// changed by this execution.
    pub fn exec_row(&mut self, values: &[Option<Cell>]) -> FdwResult<usize> {
        if self.phase != ModifyPhase::Ready {
            return Err(FdwError::ScanPhase {
                expected: "open",
                actual: match self.phase {
                    ModifyPhase::Unopened => "unopened",
                    ModifyPhase::Ready => "open",
                    ModifyPhase::Closed => "closed",
                },
            });
        }
        if values.len() != self.param_exprs.len() {
            return Err(FdwError::ParamCount {
                expected: self.param_exprs.len(),
                got: values.len(),
            });
        }

        let conn = self.conn.as_ref().ok_or(FdwError::ScanPhase {
            expected: "open",
            actual: "unopened",
        })?;
        let wire: Vec<_> = values.iter().map(|v| to_wire(v.as_ref())).collect();
        let mut stmt = conn
            .raw()
            .prepare_cached(&self.query)
            .map_err(|e| map_exec_error(conn, e, &self.query))?;
        let changed = stmt
            .execute(params_from_iter(wire.iter()))
            .map_err(|e| map_exec_error(conn, e, &self.query))?;
        self.rows_affected += changed as u64;
        Ok(changed)
    }

    /// Finalize the statement and hand the connection back (or evict it if
    /// the channel broke). Closing twice is fine.
    pub fn close(&mut self, registry: &mut ConnectionRegistry) {
        if let Some(handle) = self.conn.take() {
            if handle.is_broken() {
                let key = handle.server_key().to_string();
                drop(handle);
                registry.evict(&key);
            }
        }
        self.phase = ModifyPhase::Closed;
    }
}

/// Positions of the key attributes within a for-update scan's retrieved
/// attribute list. Resolved once per modify, not per row; `None` when the
/// scan does not fetch one of the keys, in which case rows cannot be
/// identified and the caller must widen the scan's target list.
pub fn resolve_junk_indexes(
    key_attrs: &[AttrNumber],
    retrieved_attrs: &[AttrNumber],
) -> Option<Vec<usize>> {
    key_attrs
        .iter()
        .map(|key| retrieved_attrs.iter().position(|attno| attno == key))
        .collect()
}

/// Pull one fetched row's key cells through resolved junk indexes, in key
/// declaration order, ready to append after the SET values of an UPDATE or
/// to bind a DELETE.
pub fn extract_key_values(row: &FdwRow, junk_idx: &[usize]) -> Vec<Option<Cell>> {
    junk_idx.iter().map(|i| row.values[*i].cell.clone()).collect()
}
