//! Database module
//!
//! - `sqlite.rs`: Database struct, connection management, schema
//! - `models/`: operations grouped by table

pub mod models;
pub mod sqlite;

pub use sqlite::Database;
