/// Session-scoped connection registry
///
/// Caches connections by server identity so scans within one session reuse
/// channels instead of reopening the database per query. The registry is an
/// explicit object owned by the session context and passed by handle;
/// lifecycle is create-on-miss, evict-on-error, teardown at session end.
///
/// A connection is exclusively owned by at most one open scan. Concurrent
/// scans against the same server each get a distinct connection; idle ones
/// are handed out first.
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::core::connection::SqliteConnection;
use crate::core::connection_factory::SqliteConnectionFactory;
use crate::core::errors::FdwResult;
use crate::core::options::SqliteFdwOptions;

/// Exclusive checkout of one registry connection. Dropping the handle
/// returns the connection to the idle set; a handle whose connection was
/// marked broken leaves nothing reusable behind.
pub struct ConnectionHandle {
    inner: Rc<SqliteConnection>,
}

impl ConnectionHandle {
    pub fn server_key(&self) -> &str {
        self.inner.server_key()
    }
}

impl std::ops::Deref for ConnectionHandle {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        &self.inner
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectionHandle").field(&self.inner).finish()
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<String, Vec<Rc<SqliteConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a connection for the given server: reuse an idle cached
    /// one, or open a new connection on miss.
    pub fn acquire(&mut self, opts: &SqliteFdwOptions) -> FdwResult<ConnectionHandle> {
        let key = opts.server_key();
        let entry = self.connections.entry(key.clone()).or_default();

        // Broken channels are dropped here rather than handed out again.
        entry.retain(|c| !c.is_broken());

        if let Some(conn) = entry.iter().find(|c| c.try_checkout()) {
            debug!("reusing cached connection for {key}");
            return Ok(ConnectionHandle {
                inner: Rc::clone(conn),
            });
        }

        debug!("no idle connection for {key}, opening a new one");
        let conn = Rc::new(SqliteConnectionFactory::connect(opts)?);
        let claimed = conn.try_checkout();
        debug_assert!(claimed);
        entry.push(Rc::clone(&conn));
        Ok(ConnectionHandle { inner: conn })
    }

    /// Drop every cached connection for a server, typically after a
    /// connection-level failure.
    pub fn evict(&mut self, server_key: &str) {
        if self.connections.remove(server_key).is_some() {
            debug!("evicted connections for {server_key}");
        }
    }

    /// Tear down the whole cache at session end.
    pub fn shutdown(&mut self) {
        debug!("closing {} cached server entries", self.connections.len());
        self.connections.clear();
    }

    /// Number of cached connections for a server, idle or checked out.
    pub fn cached_count(&self, server_key: &str) -> usize {
        self.connections.get(server_key).map_or(0, Vec::len)
    }
}
