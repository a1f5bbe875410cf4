/// Wire conversion round-trips and failure modes.
use crate::value::cell::{Cell, TypeId};
use crate::value::marshal::{to_wire, ColumnConverter, ConversionError, WireValue};

const BLOB_CAP: usize = 16;

fn converter(ty: TypeId) -> ColumnConverter {
    ColumnConverter::new(ty, BLOB_CAP)
}

#[test]
fn representative_values_round_trip() {
    let cases = vec![
        (TypeId::Bool, Cell::Bool(true)),
        (TypeId::Bool, Cell::Bool(false)),
        (TypeId::SmallInt, Cell::I16(-32_768)),
        (TypeId::Integer, Cell::I32(2_147_483_647)),
        (TypeId::BigInt, Cell::I64(i64::MIN)),
        (TypeId::Double, Cell::F64(3.141592653589793)),
        (TypeId::Double, Cell::F64(-0.0)),
        (TypeId::Text, Cell::Text("it's a \"test\"".to_string())),
        (TypeId::Text, Cell::Text(String::new())),
        (TypeId::Blob, Cell::Blob(vec![0, 1, 2, 255])),
        (TypeId::Date, Cell::Date("2024-02-29".to_string())),
        (
            TypeId::Timestamp,
            Cell::Timestamp("2024-02-29 12:34:56.789".to_string()),
        ),
    ];

    for (ty, cell) in cases {
        assert_eq!(cell.type_id(), ty);
        let wire = to_wire(Some(&cell));
        let back = converter(ty).to_local(wire).unwrap();
        assert_eq!(back.cell, Some(cell.clone()), "{ty:?} / {cell:?}");
        assert!(!back.truncated);
    }
}

#[test]
fn null_round_trips_for_every_type() {
    for ty in [
        TypeId::Bool,
        TypeId::SmallInt,
        TypeId::Integer,
        TypeId::BigInt,
        TypeId::Double,
        TypeId::Text,
        TypeId::Blob,
        TypeId::Date,
        TypeId::Timestamp,
    ] {
        let back = converter(ty).to_local(to_wire(None)).unwrap();
        assert!(back.is_null(), "{ty:?}");
    }
}

#[test]
fn oversized_blob_round_trips_to_its_prefix_with_the_flag_set() {
    let payload: Vec<u8> = (0..40u8).collect();
    let wire = to_wire(Some(&Cell::Blob(payload.clone())));
    let back = converter(TypeId::Blob).to_local(wire).unwrap();

    assert!(back.truncated);
    assert_eq!(back.cell, Some(Cell::Blob(payload[..BLOB_CAP].to_vec())));
}

#[test]
fn text_bytes_are_carried_verbatim() {
    let tricky = "line1\nline2\t\u{00e9}\u{4e2d}' OR 1=1 --";
    let wire = to_wire(Some(&Cell::Text(tricky.to_string())));
    assert_eq!(wire, WireValue::Text(tricky.to_string()));
    let back = converter(TypeId::Text).to_local(wire).unwrap();
    assert_eq!(back.cell, Some(Cell::Text(tricky.to_string())));
}

#[test]
fn narrowing_overflow_is_fatal_to_the_value() {
    for (ty, value) in [
        (TypeId::SmallInt, 1 << 20),
        (TypeId::Integer, 1 << 40),
        (TypeId::Bool, 2),
    ] {
        let err = converter(ty).to_local(WireValue::Integer(value)).unwrap_err();
        assert!(
            matches!(err, ConversionError::OutOfRange { .. }),
            "{ty:?}: {err:?}"
        );
    }
}

#[test]
fn integer_storage_feeds_double_columns_exactly() {
    let back = converter(TypeId::Double).to_local(WireValue::Integer(42)).unwrap();
    assert_eq!(back.cell, Some(Cell::F64(42.0)));
}

#[test]
fn booleans_travel_as_remote_integers() {
    assert_eq!(to_wire(Some(&Cell::Bool(true))), WireValue::Integer(1));
    assert_eq!(to_wire(Some(&Cell::Bool(false))), WireValue::Integer(0));
    assert_eq!(to_wire(None), WireValue::Null);
}
