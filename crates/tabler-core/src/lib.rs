//! Tabler Core - Core abstractions for the table browser/editor
//!
//! This crate provides the fundamental traits and types that all other
//! Tabler crates depend on. It defines:
//!
//! - `DatabaseDriver` - Trait for database driver implementations
//! - `Connection` - Trait for database connections
//! - `SchemaIntrospection` - Trait for catalog inspection
//! - `Dialect` - SQL syntax capabilities (quoting, placeholders, paging)
//! - Common types like `Value`, `Row`, `TableSchema`, etc.

mod connection;
mod dialect;
mod driver;
mod error;
mod schema;
mod types;

pub use connection::*;
pub use dialect::*;
pub use driver::*;
pub use error::*;
pub use schema::*;
pub use types::*;
