//! Database layer - target connection, table schema and insert statements

pub mod connection;
pub mod insert;
pub mod schema;

pub use connection::{AuthMode, Connection, ConnectionTarget, Dialect, connect};
pub use insert::InsertStatement;
pub use schema::{Column, Schema, SemanticType};
