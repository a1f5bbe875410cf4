/// Server and table configuration.
///
/// Options arrive as a flat string map resolved by the host's catalog
/// layer; they are validated once here and immutable afterwards. Both the
/// planner (estimate source, cost knobs) and the bridge (database, init
/// statement, blob cap) read the same resolved struct.
use std::collections::HashMap;

/// Largest blob read back without truncation.
pub const DEFAULT_MAX_BLOB_SIZE: usize = 64 * 1024;
const DEFAULT_FDW_STARTUP_COST: f64 = 100.0;
const DEFAULT_FDW_TUPLE_COST: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("missing required option: {0}")]
    MissingOption(&'static str),

    #[error("invalid value for option {option}: {value}")]
    InvalidValue { option: &'static str, value: String },
}

pub type OptionsResult<T> = Result<T, OptionsError>;

/// Resolved server/table options.
#[derive(Debug, Clone, PartialEq)]
pub struct SqliteFdwOptions {
    /// Database file path (or `:memory:`).
    pub database: String,
    /// Table name on the remote side.
    pub table: String,
    /// Optional address/port pair; kept as part of the server identity for
    /// deployments that mount the database over a network path.
    pub address: Option<String>,
    pub port: Option<u16>,
    /// Statement executed once on every newly created connection.
    pub init_command: Option<String>,
    /// Largest blob read without truncation.
    pub max_blob_size: usize,
    /// Trust remote-side row sampling over local heuristics.
    pub use_remote_estimate: bool,
    pub fdw_startup_cost: f64,
    pub fdw_tuple_cost: f64,
}

impl SqliteFdwOptions {
    /// Resolve and validate options from the host's string map.
    pub fn from_options(opts: &HashMap<String, String>) -> OptionsResult<Self> {
        let database = opts
            .get("database")
            .ok_or(OptionsError::MissingOption("database"))?
            .clone();
        if database.trim().is_empty() {
            return Err(OptionsError::InvalidValue {
                option: "database",
                value: database,
            });
        }

        let table = opts
            .get("table")
            .ok_or(OptionsError::MissingOption("table"))?
            .clone();
        if table.trim().is_empty() {
            return Err(OptionsError::InvalidValue {
                option: "table",
                value: table,
            });
        }

        let port = opts
            .get("port")
            .map(|v| {
                v.parse::<u16>().map_err(|_| OptionsError::InvalidValue {
                    option: "port",
                    value: v.clone(),
                })
            })
            .transpose()?;

        let max_blob_size = parse_clamped(opts, "max_blob_size", DEFAULT_MAX_BLOB_SIZE, 1, usize::MAX)?;

        let use_remote_estimate = opts
            .get("use_remote_estimate")
            .map(|v| parse_bool("use_remote_estimate", v))
            .transpose()?
            .unwrap_or(false);

        let fdw_startup_cost =
            parse_cost(opts, "fdw_startup_cost", DEFAULT_FDW_STARTUP_COST)?;
        let fdw_tuple_cost = parse_cost(opts, "fdw_tuple_cost", DEFAULT_FDW_TUPLE_COST)?;

        Ok(SqliteFdwOptions {
            database,
            table,
            address: opts.get("address").cloned(),
            port,
            init_command: opts.get("init_command").cloned(),
            max_blob_size,
            use_remote_estimate,
            fdw_startup_cost,
            fdw_tuple_cost,
        })
    }

    /// Identity of the server these options point at; connections are
    /// cached under this key.
    pub fn server_key(&self) -> String {
        match (&self.address, self.port) {
            (Some(addr), Some(port)) => format!("{addr}:{port}/{}", self.database),
            (Some(addr), None) => format!("{addr}/{}", self.database),
            _ => self.database.clone(),
        }
    }
}

fn parse_clamped(
    opts: &HashMap<String, String>,
    option: &'static str,
    default: usize,
    min: usize,
    max: usize,
) -> OptionsResult<usize> {
    match opts.get(option) {
        None => Ok(default),
        Some(v) => v
            .parse::<usize>()
            .map(|n| n.clamp(min, max))
            .map_err(|_| OptionsError::InvalidValue {
                option,
                value: v.clone(),
            }),
    }
}

fn parse_cost(
    opts: &HashMap<String, String>,
    option: &'static str,
    default: f64,
) -> OptionsResult<f64> {
    match opts.get(option) {
        None => Ok(default),
        Some(v) => match v.parse::<f64>() {
            Ok(c) if c >= 0.0 => Ok(c),
            _ => Err(OptionsError::InvalidValue {
                option,
                value: v.clone(),
            }),
        },
    }
}

fn parse_bool(option: &'static str, value: &str) -> OptionsResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => Err(OptionsError::InvalidValue {
            option,
            value: value.to_owned(),
        }),
    }
}
