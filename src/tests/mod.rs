/// Test suite organized by functionality area
///
/// Unit tests for individual helpers live next to their modules; the
/// modules here cover cross-component behavior and end-to-end execution
/// against real SQLite databases.
pub mod support;

pub mod marshal_tests;
pub mod pushdown_tests;
