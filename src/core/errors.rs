/// Error taxonomy for the execution side of the wrapper.
///
/// Planning-time disqualifications never surface here; they are control
/// decisions. Everything that does surface carries enough remote context
/// (result code, message, offending SQL) for the host to report verbatim.
use crate::value::marshal::ConversionError;

#[derive(Debug, thiserror::Error)]
pub enum FdwError {
    /// Transport-level failure to establish or keep a channel. Fatal to the
    /// current scan; the connection is evicted from the registry.
    #[error("connection to sqlite database \"{server}\" failed: {message}")]
    Connection { server: String, message: String },

    /// Remote-side rejection of a statement. Fatal to the statement, the
    /// connection stays usable.
    #[error("remote statement failed{}: {message}\nstatement: {sql}", fmt_code(.code))]
    Statement {
        code: Option<i32>,
        message: String,
        sql: String,
    },

    /// Value conversion failure while decoding or binding a row.
    #[error("value conversion failed for column {column}: {source}")]
    Data {
        column: usize,
        source: ConversionError,
    },

    #[error("invalid server or table options: {0}")]
    Options(#[from] crate::core::options::OptionsError),

    /// Operation invoked in a scan phase that does not allow it.
    #[error("scan is {actual}, expected {expected}")]
    ScanPhase {
        expected: &'static str,
        actual: &'static str,
    },

    /// Mismatch between bound values and registered parameter slots.
    #[error("statement expects {expected} parameters, {got} were bound")]
    ParamCount { expected: usize, got: usize },
}

fn fmt_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!(" (code {c})"),
        None => String::new(),
    }
}

pub type FdwResult<T> = Result<T, FdwError>;

impl FdwError {
    /// Wrap a driver error raised while executing `sql`, keeping the
    /// extended result code when the driver exposes one.
    pub fn statement(err: rusqlite::Error, sql: &str) -> FdwError {
        match err {
            rusqlite::Error::SqliteFailure(e, message) => FdwError::Statement {
                code: Some(e.extended_code),
                message: message.unwrap_or_else(|| e.to_string()),
                sql: sql.to_owned(),
            },
            other => FdwError::Statement {
                code: None,
                message: other.to_string(),
                sql: sql.to_owned(),
            },
        }
    }

    /// True when the underlying channel should be treated as broken and the
    /// connection discarded rather than returned to the registry.
    pub fn indicates_broken_connection(err: &rusqlite::Error) -> bool {
        use rusqlite::ffi::ErrorCode;
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    ErrorCode::CannotOpen
                        | ErrorCode::NotADatabase
                        | ErrorCode::DatabaseCorrupt
                        | ErrorCode::DiskFull
                )
        )
    }
}
