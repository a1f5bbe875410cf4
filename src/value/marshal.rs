/// Conversion layer between local `Cell` values and SQLite storage-class
/// values.
///
/// SQLite exposes five storage classes (NULL, INTEGER, REAL, TEXT, BLOB);
/// every local type maps onto one of them. Integer and double conversions
/// are exact, text is carried byte-verbatim, and blobs wider than the
/// configured cap are truncated on read with an explicit flag so callers
/// can tell a short blob from a clipped one.
use rusqlite::types::{ToSqlOutput, Value, ValueRef};

use crate::value::cell::{Cell, TypeId};
use crate::value::row::FdwValue;

/// A value in SQLite's own type system, as bound to or read from a
/// statement.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl WireValue {
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    pub fn storage_class(&self) -> &'static str {
        match self {
            WireValue::Null => "NULL",
            WireValue::Integer(_) => "INTEGER",
            WireValue::Real(_) => "REAL",
            WireValue::Text(_) => "TEXT",
            WireValue::Blob(_) => "BLOB",
        }
    }

    /// Decode a driver-level value reference into an owned wire value.
    pub fn from_value_ref(value: ValueRef<'_>) -> Result<Self, ConversionError> {
        match value {
            ValueRef::Null => Ok(WireValue::Null),
            ValueRef::Integer(i) => Ok(WireValue::Integer(i)),
            ValueRef::Real(f) => Ok(WireValue::Real(f)),
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => Ok(WireValue::Text(s.to_owned())),
                Err(_) => Err(ConversionError::InvalidText),
            },
            ValueRef::Blob(bytes) => Ok(WireValue::Blob(bytes.to_vec())),
        }
    }
}

impl rusqlite::ToSql for WireValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            WireValue::Null => ToSqlOutput::Owned(Value::Null),
            WireValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            WireValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            WireValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            WireValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Errors raised while converting a remote value into a local one.
///
/// Truncation is not represented here: it is non-fatal and reported through
/// `FdwValue::truncated` instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("remote value {value} does not fit into {target}")]
    OutOfRange { value: i64, target: &'static str },

    #[error("remote {got} value cannot be read as {expected}")]
    StorageClassMismatch {
        expected: &'static str,
        got: &'static str,
    },

    #[error("remote text value is not valid UTF-8")]
    InvalidText,
}

/// Convert a local value to its remote wire representation. A missing cell
/// binds a remote NULL.
pub fn to_wire(cell: Option<&Cell>) -> WireValue {
    match cell {
        None => WireValue::Null,
        Some(Cell::Bool(b)) => WireValue::Integer(i64::from(*b)),
        Some(Cell::I16(i)) => WireValue::Integer(i64::from(*i)),
        Some(Cell::I32(i)) => WireValue::Integer(i64::from(*i)),
        Some(Cell::I64(i)) => WireValue::Integer(*i),
        Some(Cell::F64(f)) => WireValue::Real(*f),
        Some(Cell::Text(s)) => WireValue::Text(s.clone()),
        Some(Cell::Blob(b)) => WireValue::Blob(b.clone()),
        Some(Cell::Date(s)) | Some(Cell::Timestamp(s)) => WireValue::Text(s.clone()),
    }
}

/// Output conversion for one result column.
///
/// Resolved once per attribute when a scan or modify starts, then invoked
/// per value; resolving carries the target type and the blob cap so the per
/// value path is a plain match.
#[derive(Debug, Clone, Copy)]
pub struct ColumnConverter {
    target: TypeId,
    max_blob_size: usize,
}

impl ColumnConverter {
    pub fn new(target: TypeId, max_blob_size: usize) -> Self {
        ColumnConverter {
            target,
            max_blob_size,
        }
    }

    pub fn target(&self) -> TypeId {
        self.target
    }

    /// Convert one remote value into a local `FdwValue`.
    ///
    /// NULL always converts to a null cell. Narrowing an integer that does
    /// not fit the target is an error; clipping an oversized blob is not,
    /// but sets the truncation flag.
    pub fn to_local(&self, wire: WireValue) -> Result<FdwValue, ConversionError> {
        if wire.is_null() {
            return Ok(FdwValue::new(None));
        }
        let got = wire.storage_class();
        let mismatch = || ConversionError::StorageClassMismatch {
            expected: self.target.remote_cast_name(),
            got,
        };

        let cell = match (self.target, wire) {
            (TypeId::Bool, WireValue::Integer(0)) => Cell::Bool(false),
            (TypeId::Bool, WireValue::Integer(1)) => Cell::Bool(true),
            (TypeId::Bool, WireValue::Integer(other)) => {
                return Err(ConversionError::OutOfRange {
                    value: other,
                    target: "boolean",
                })
            }
            (TypeId::SmallInt, WireValue::Integer(i)) => Cell::I16(
                i16::try_from(i).map_err(|_| ConversionError::OutOfRange {
                    value: i,
                    target: "smallint",
                })?,
            ),
            (TypeId::Integer, WireValue::Integer(i)) => Cell::I32(
                i32::try_from(i).map_err(|_| ConversionError::OutOfRange {
                    value: i,
                    target: "integer",
                })?,
            ),
            (TypeId::BigInt, WireValue::Integer(i)) => Cell::I64(i),
            (TypeId::Double, WireValue::Real(f)) => Cell::F64(f),
            // Integer-valued doubles may come back under INTEGER storage.
            (TypeId::Double, WireValue::Integer(i)) => Cell::F64(i as f64),
            (TypeId::Text, WireValue::Text(s)) => Cell::Text(s),
            (TypeId::Date, WireValue::Text(s)) => Cell::Date(s),
            (TypeId::Timestamp, WireValue::Text(s)) => Cell::Timestamp(s),
            (TypeId::Blob, WireValue::Blob(mut bytes)) => {
                if bytes.len() > self.max_blob_size {
                    bytes.truncate(self.max_blob_size);
                    return Ok(FdwValue {
                        cell: Some(Cell::Blob(bytes)),
                        truncated: true,
                    });
                }
                Cell::Blob(bytes)
            }
            _ => return Err(mismatch()),
        };
        Ok(FdwValue::new(Some(cell)))
    }
}

/// Resolve output converters for an ordered list of target column types.
pub fn resolve_converters(types: &[TypeId], max_blob_size: usize) -> Vec<ColumnConverter> {
    types
        .iter()
        .map(|ty| ColumnConverter::new(*ty, max_blob_size))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_round_trip() {
        let conv = ColumnConverter::new(TypeId::Text, 64);
        let out = conv.to_local(to_wire(None)).unwrap();
        assert!(out.is_null());
        assert!(!out.truncated);
    }

    #[test]
    fn integer_narrowing_overflow_is_an_error() {
        let conv = ColumnConverter::new(TypeId::SmallInt, 64);
        let err = conv.to_local(WireValue::Integer(40_000)).unwrap_err();
        assert_eq!(
            err,
            ConversionError::OutOfRange {
                value: 40_000,
                target: "smallint"
            }
        );
    }

    #[test]
    fn blob_truncation_sets_flag() {
        let conv = ColumnConverter::new(TypeId::Blob, 4);
        let out = conv.to_local(WireValue::Blob(vec![1, 2, 3, 4, 5, 6])).unwrap();
        assert!(out.truncated);
        assert_eq!(out.cell, Some(Cell::Blob(vec![1, 2, 3, 4])));
    }

    #[test]
    fn storage_class_mismatch_is_an_error() {
        let conv = ColumnConverter::new(TypeId::Text, 64);
        assert!(conv.to_local(WireValue::Blob(vec![0])).is_err());
    }
}
