//! Change writer
//!
//! Turns a [`ChangeSet`] into parameterized INSERT, UPDATE and DELETE
//! statements and runs them as one transaction. Deletes go first, then
//! updates, then inserts. Any failure rolls the whole batch back.

use tabler_core::{Connection, Dialect, Row, TableSchema, Transaction, Value};
use tokio_util::sync::CancellationToken;

use crate::cancel::checkpoint;
use crate::error::{ServiceError, ServiceResult};
use crate::snapshot::{ChangeSet, ModifiedRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
}

/// One generated statement with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<Value>,
    /// Zero affected rows means the target row changed underneath us
    pub expect_rows: bool,
}

/// Rows written by a successful save
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SaveSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Collects parameters and hands out placeholders in binding order.
///
/// Nulls are written as a `NULL` literal. An untyped null parameter reaches
/// SQL Server as `int`, which does not convert to date, time or guid columns.
struct ParamList<'a> {
    dialect: &'a dyn Dialect,
    values: Vec<Value>,
}

impl<'a> ParamList<'a> {
    fn new(dialect: &'a dyn Dialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    fn bind(&mut self, value: Value) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }
}

pub struct ChangeWriter;

impl ChangeWriter {
    /// Generate the statements for `changes`, deletes first, then updates,
    /// then inserts.
    ///
    /// Updates and deletes need a key; with an empty key set they fail with
    /// `PrimaryKeyRequired`.
    pub fn plan(
        schema: &TableSchema,
        dialect: &dyn Dialect,
        changes: &ChangeSet,
    ) -> ServiceResult<Vec<Statement>> {
        if !schema.has_primary_key() {
            if !changes.modified.is_empty() {
                return Err(ServiceError::PrimaryKeyRequired("update rows".into()));
            }
            if !changes.deleted.is_empty() {
                return Err(ServiceError::PrimaryKeyRequired("delete rows".into()));
            }
        }

        let table_sql = dialect.qualified_table(schema.schema(), schema.name());
        let mut statements = Vec::with_capacity(changes.len());

        for row in &changes.deleted {
            statements.push(Self::delete(schema, dialect, &table_sql, row));
        }
        for modified in &changes.modified {
            if let Some(statement) = Self::update(schema, dialect, &table_sql, modified) {
                statements.push(statement);
            }
        }
        for row in &changes.added {
            statements.push(Self::insert(schema, dialect, &table_sql, row));
        }

        Ok(statements)
    }

    fn insert(schema: &TableSchema, dialect: &dyn Dialect, table_sql: &str, row: &Row) -> Statement {
        let mut params = ParamList::new(dialect);
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();

        for column in schema.columns().iter().filter(|c| !c.is_identity) {
            let value = row.get_by_name(&column.name).cloned().unwrap_or(Value::Null);
            if value.is_null() && column.has_server_value() {
                continue;
            }
            columns.push(dialect.quote_identifier(&column.name));
            placeholders.push(params.bind(value));
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table_sql)
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table_sql,
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        Statement {
            kind: StatementKind::Insert,
            sql,
            params: params.values,
            expect_rows: false,
        }
    }

    fn update(
        schema: &TableSchema,
        dialect: &dyn Dialect,
        table_sql: &str,
        modified: &ModifiedRow,
    ) -> Option<Statement> {
        let mut params = ParamList::new(dialect);
        let assignments: Vec<String> = modified
            .changed_columns
            .iter()
            .filter_map(|name| schema.column(name))
            .filter(|c| !c.is_identity && !c.is_primary_key)
            .map(|c| {
                let value = modified
                    .current
                    .get_by_name(&c.name)
                    .cloned()
                    .unwrap_or(Value::Null);
                format!("{} = {}", dialect.quote_identifier(&c.name), params.bind(value))
            })
            .collect();

        if assignments.is_empty() {
            tracing::debug!("only key or identity columns changed, no update generated");
            return None;
        }

        let where_sql = Self::key_condition(schema, dialect, &modified.original, &mut params);
        Some(Statement {
            kind: StatementKind::Update,
            sql: format!(
                "UPDATE {} SET {} WHERE {}",
                table_sql,
                assignments.join(", "),
                where_sql
            ),
            params: params.values,
            expect_rows: true,
        })
    }

    fn delete(schema: &TableSchema, dialect: &dyn Dialect, table_sql: &str, row: &Row) -> Statement {
        let mut params = ParamList::new(dialect);
        let where_sql = Self::key_condition(schema, dialect, row, &mut params);
        Statement {
            kind: StatementKind::Delete,
            sql: format!("DELETE FROM {} WHERE {}", table_sql, where_sql),
            params: params.values,
            expect_rows: true,
        }
    }

    fn key_condition(
        schema: &TableSchema,
        dialect: &dyn Dialect,
        original: &Row,
        params: &mut ParamList<'_>,
    ) -> String {
        schema
            .primary_key()
            .iter()
            .map(|key| {
                let column_sql = dialect.quote_identifier(key);
                match original.get_by_name(key) {
                    None | Some(Value::Null) => format!("{} IS NULL", column_sql),
                    Some(value) => format!("{} = {}", column_sql, params.bind(value.clone())),
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Write `changes` in one transaction.
    ///
    /// Any statement error, and any update or delete that affects no row,
    /// rolls everything back and fails with `SaveFailed`. A statement already
    /// sent always runs to completion; cancellation is seen before the next one
    /// and before commit, and rolls back with `Cancelled`.
    #[tracing::instrument(skip_all, fields(table = %schema.name(), changes = changes.len()))]
    pub async fn persist(
        connection: &dyn Connection,
        schema: &TableSchema,
        changes: &ChangeSet,
        token: &CancellationToken,
    ) -> ServiceResult<SaveSummary> {
        let statements = Self::plan(schema, connection.dialect(), changes)?;
        if statements.is_empty() {
            return Ok(SaveSummary::default());
        }

        checkpoint(token)?;
        let transaction = connection
            .begin_transaction()
            .await
            .map_err(|e| ServiceError::SaveFailed(e.to_string()))?;

        match Self::run_statements(transaction.as_ref(), &statements, token).await {
            Ok(summary) => {
                transaction
                    .commit()
                    .await
                    .map_err(|e| ServiceError::SaveFailed(e.to_string()))?;
                tracing::info!(
                    inserted = summary.inserted,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    "changes saved"
                );
                Ok(summary)
            }
            Err(err) => {
                if let Err(rollback_err) = transaction.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                tracing::warn!(error = %err, "save rolled back");
                Err(match err {
                    ServiceError::Cancelled | ServiceError::SaveFailed(_) => err,
                    other => ServiceError::SaveFailed(other.to_string()),
                })
            }
        }
    }

    async fn run_statements(
        transaction: &dyn Transaction,
        statements: &[Statement],
        token: &CancellationToken,
    ) -> ServiceResult<SaveSummary> {
        let mut summary = SaveSummary::default();
        for statement in statements {
            checkpoint(token)?;
            let result = transaction
                .execute(&statement.sql, &statement.params)
                .await
                .map_err(|e| ServiceError::SaveFailed(e.to_string()))?;

            if statement.expect_rows && result.affected_rows == 0 {
                return Err(ServiceError::SaveFailed(format!(
                    "row was changed or removed by someone else: {}",
                    statement.sql
                )));
            }

            match statement.kind {
                StatementKind::Insert => summary.inserted += 1,
                StatementKind::Update => summary.updated += 1,
                StatementKind::Delete => summary.deleted += 1,
            }
        }
        checkpoint(token)?;
        Ok(summary)
    }
}
