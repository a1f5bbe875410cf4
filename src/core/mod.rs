/// Core execution bridge module
///
/// This module contains the execution-side components of the wrapper:
/// - Connection management for SQLite databases
/// - Connection factory for validated connection creation
/// - Session-scoped connection registry with exclusive per-scan checkout
/// - Scan state driving remote SELECTs and the decoded row buffer
/// - Modify state driving remote INSERT/UPDATE/DELETE
pub mod connection;
pub mod connection_factory;
pub mod errors;
pub mod modify;
pub mod options;
pub mod registry;
pub mod state;
