/// SQLite connection factory
///
/// Creates connections from resolved options: opens the database file,
/// applies the one-time initialization statement, and reports failures with
/// enough context for the host to surface them verbatim. An embedded open
/// either succeeds or fails; there is no retry layer here.
use log::debug;

use crate::core::connection::SqliteConnection;
use crate::core::errors::{FdwError, FdwResult};
use crate::core::options::SqliteFdwOptions;

pub struct SqliteConnectionFactory;

impl SqliteConnectionFactory {
    /// Open a new connection for the given server options and run its init
    /// command, if any.
    pub fn connect(opts: &SqliteFdwOptions) -> FdwResult<SqliteConnection> {
        let server = opts.server_key();
        debug!("opening sqlite database {}", opts.database);

        let conn = rusqlite::Connection::open(&opts.database).map_err(|e| FdwError::Connection {
            server: server.clone(),
            message: e.to_string(),
        })?;

        if let Some(init) = &opts.init_command {
            debug!("running init command on new connection: {init}");
            conn.execute_batch(init).map_err(|e| FdwError::Connection {
                server: server.clone(),
                message: format!("init command failed: {e}"),
            })?;
        }

        Ok(SqliteConnection::new(conn, server))
    }
}
