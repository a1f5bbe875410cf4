/// Shared fixtures for the test suite.
use std::collections::HashMap;

use crate::core::options::SqliteFdwOptions;
use crate::query::expr::{BinaryOp, Collation, Expr};
use crate::query::relation::{ColumnDesc, TableDesc};
use crate::value::cell::TypeId;

/// Install the test logger once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn col(name: &str, attno: i16, ty: TypeId) -> ColumnDesc {
    ColumnDesc {
        name: name.to_string(),
        attno,
        ty,
        collation: Collation::Default,
    }
}

/// The relation most tests scan: items(id, name, price, description,
/// payload).
pub fn items_table() -> TableDesc {
    TableDesc {
        local_name: "items".to_string(),
        remote_name: "items".to_string(),
        columns: vec![
            col("id", 1, TypeId::BigInt),
            col("name", 2, TypeId::Text),
            col("price", 3, TypeId::Double),
            col("description", 4, TypeId::Text),
            col("payload", 5, TypeId::Blob),
        ],
    }
}

pub fn orders_table() -> TableDesc {
    TableDesc {
        local_name: "orders".to_string(),
        remote_name: "orders".to_string(),
        columns: vec![
            col("order_id", 1, TypeId::BigInt),
            col("item_id", 2, TypeId::BigInt),
            col("quantity", 3, TypeId::Integer),
        ],
    }
}

pub const ITEMS_DDL: &str = "CREATE TABLE IF NOT EXISTS items (\
     id INTEGER, name TEXT, price REAL, description TEXT, payload BLOB)";

pub fn options_map(database: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    map.insert("database".to_string(), database.to_string());
    map.insert("table".to_string(), "items".to_string());
    map
}

pub fn options_for(database: &str) -> SqliteFdwOptions {
    SqliteFdwOptions::from_options(&options_map(database)).unwrap()
}

/// `price > 100`: an immutable comparison the remote side evaluates
/// identically.
pub fn price_gt_100() -> Expr {
    Expr::binary(
        BinaryOp::Gt,
        Expr::column(1, 3, TypeId::Double),
        Expr::int_const(100),
    )
}

/// `description ILIKE '%x%'`: case folding the remote dialect cannot
/// reproduce.
pub fn description_ilike() -> Expr {
    Expr::binary(
        BinaryOp::ILike,
        Expr::column(1, 4, TypeId::Text),
        Expr::text_const("%x%"),
    )
}
