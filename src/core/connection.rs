/// One open SQLite handle together with the bookkeeping the registry needs:
/// which server it belongs to, whether a scan currently owns it, and
/// whether its channel is known broken.
use std::cell::Cell;

use crate::core::errors::{FdwError, FdwResult};

pub struct SqliteConnection {
    conn: rusqlite::Connection,
    server_key: String,
    in_use: Cell<bool>,
    broken: Cell<bool>,
}

impl SqliteConnection {
    pub(crate) fn new(conn: rusqlite::Connection, server_key: String) -> Self {
        SqliteConnection {
            conn,
            server_key,
            in_use: Cell::new(false),
            broken: Cell::new(false),
        }
    }

    pub fn raw(&self) -> &rusqlite::Connection {
        &self.conn
    }

    pub fn server_key(&self) -> &str {
        &self.server_key
    }

    /// Claim the connection for one scan. At most one open scan may own a
    /// connection at a time; a second scan against the same server gets its
    /// own connection instead.
    pub(crate) fn try_checkout(&self) -> bool {
        if self.in_use.get() || self.broken.get() {
            return false;
        }
        self.in_use.set(true);
        true
    }

    pub(crate) fn release(&self) {
        self.in_use.set(false);
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.get()
    }

    /// Flag the channel as unusable; the registry drops broken connections
    /// instead of handing them out again.
    pub fn mark_broken(&self) {
        self.broken.set(true);
    }

    pub fn is_broken(&self) -> bool {
        self.broken.get()
    }

    /// Prepare a statement once to verify the remote side accepts it.
    /// The statement cache keeps the compiled form for the execution that
    /// follows.
    pub fn validate_statement(&self, sql: &str) -> FdwResult<()> {
        match self.conn.prepare_cached(sql) {
            Ok(_) => Ok(()),
            Err(e) => {
                if FdwError::indicates_broken_connection(&e) {
                    self.mark_broken();
                    return Err(FdwError::Connection {
                        server: self.server_key.clone(),
                        message: e.to_string(),
                    });
                }
                Err(FdwError::statement(e, sql))
            }
        }
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("server_key", &self.server_key)
            .field("in_use", &self.in_use.get())
            .field("broken", &self.broken.get())
            .finish()
    }
}
