//! MS SQL Server driver for Tabler
//!
//! Provides the tiberius-backed connection, catalog introspection against
//! `sys.*` and `INFORMATION_SCHEMA`, and the T-SQL [`MssqlDialect`].

mod connection;
mod dialect;
mod driver;
mod schema;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod dialect_tests;
#[cfg(test)]
mod driver_tests;
#[cfg(test)]
mod schema_tests;

pub use connection::{MssqlConnection, MssqlConnectionError, MssqlTransaction};
pub use dialect::MssqlDialect;
pub use driver::MssqlDriver;
