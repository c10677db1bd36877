//! Tabler Services Layer
//!
//! Browse and edit one table of a live database: describe it, page through
//! filtered rows, buffer edits and write them back as a single transaction.
//!
//! # Architecture
//!
//! ```text
//! Front end (tabler-cli)
//!     ↓
//! Service Layer (tabler-services) ← This crate
//!     ↓
//! Infrastructure Layer (tabler-core, tabler-driver-mssql)
//! ```
//!
//! # Services
//!
//! - [`SchemaService`] - Table description with caching
//! - [`CatalogService`] - Database and table listing
//! - [`FilterBuilder`] - Parameterized WHERE clauses from filter slots
//! - [`PagePlanner`] - Count and row-numbered page queries
//! - [`diff`] - Change set between the loaded page and the edit buffer
//! - [`AutoIncrementResolver`] - Values for integer columns the server does not fill
//! - [`ChangeWriter`] - INSERT/UPDATE/DELETE generation and transactional save
//! - [`KeyPromotion`] - Turning a column into the primary key
//! - [`TableSession`] - The edit session tying the above together
//!
//! All SQL is produced through the connection's [`tabler_core::Dialect`];
//! values are always bound as parameters.

mod auto_increment;
mod cancel;
mod catalog_service;
mod change_writer;
mod entity;
mod error;
mod filter_builder;
mod key_promotion;
mod page_planner;
mod schema_service;
mod snapshot;
mod table_session;
mod value_parser;

pub use auto_increment::{AutoIncrementPlan, AutoIncrementResolver, is_eligible, needs_value};
pub use catalog_service::CatalogService;
pub use change_writer::{ChangeWriter, SaveSummary, Statement, StatementKind};
pub use entity::{EntityProfile, FieldRule, Rule, filter_rows};
pub use error::{ServiceError, ServiceResult};
pub use filter_builder::{BoundParameter, FilterBuilder, FilterEntry, FilterSpec, MAX_FILTERS, Predicate};
pub use key_promotion::KeyPromotion;
pub use page_planner::{DEFAULT_PAGE_SIZE, PagePlan, PagePlanner, PageRequest, strip_row_number, total_pages};
pub use schema_service::{SchemaService, TableRef};
pub use snapshot::{ChangeSet, ColumnSelection, ModifiedRow, RowSnapshot, RowState, changed_columns, diff};
pub use table_session::{DiscardPolicy, SessionState, TableSession, validate_record};
pub use value_parser::{parse_bool, parse_cell_value, parse_date, parse_decimal, parse_integer};

pub use tokio_util::sync::CancellationToken;
