//! Promote an existing column to the table's primary key
//!
//! Only runs on an explicit request. The column is made non-nullable with its
//! declared type and then becomes the single-column key `PK_<table>`.

use tabler_core::{Connection, Dialect, TableSchema};
use tokio_util::sync::CancellationToken;

use crate::cancel::checkpoint;
use crate::error::{ServiceError, ServiceResult};

pub struct KeyPromotion;

impl KeyPromotion {
    /// Constraint name used for promoted keys
    pub fn constraint_name(schema: &TableSchema) -> String {
        format!("PK_{}", schema.name())
    }

    /// DDL for promoting `column`, in execution order
    pub fn plan(
        schema: &TableSchema,
        dialect: &dyn Dialect,
        column: &str,
    ) -> ServiceResult<Vec<String>> {
        if schema.has_primary_key() {
            return Err(ServiceError::InvalidState(format!(
                "{} already has a primary key ({})",
                schema.name(),
                schema.primary_key().join(", ")
            )));
        }

        let column = schema.validate_identifier(column)?;
        let table_sql = dialect.qualified_table(schema.schema(), schema.name());

        let mut statements = Vec::with_capacity(2);
        if column.nullable {
            statements.push(dialect.set_not_null_ddl(&table_sql, column)?);
        }
        statements.push(dialect.add_primary_key_ddl(
            &table_sql,
            &Self::constraint_name(schema),
            &[dialect.quote_identifier(&column.name)],
        ));
        Ok(statements)
    }

    /// Run the promotion DDL in one transaction
    #[tracing::instrument(skip(connection, schema, token), fields(table = %schema.name()))]
    pub async fn promote(
        connection: &dyn Connection,
        schema: &TableSchema,
        column: &str,
        token: &CancellationToken,
    ) -> ServiceResult<()> {
        let statements = Self::plan(schema, connection.dialect(), column)?;

        checkpoint(token)?;
        let transaction = connection.begin_transaction().await?;

        let mut outcome = Ok(());
        for sql in &statements {
            let result = match checkpoint(token) {
                Ok(()) => transaction.execute(sql, &[]).await.map_err(ServiceError::from),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                outcome = Err(err);
                break;
            }
        }
        if outcome.is_ok() {
            outcome = checkpoint(token);
        }

        match outcome {
            Ok(()) => {
                transaction.commit().await?;
                tracing::info!(constraint = %Self::constraint_name(schema), "primary key added");
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = transaction.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tabler_core::{ColumnInfo, GenericDialect, TypeCategory};

    fn keyless() -> TableSchema {
        TableSchema::new(
            None,
            "Imports",
            vec![
                ColumnInfo::new("Code", 0, "int").with_category(TypeCategory::Integer),
                ColumnInfo::new("Name", 1, "varchar")
                    .with_category(TypeCategory::Text)
                    .not_null(),
            ],
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_plan_nullable_column() {
        let statements = KeyPromotion::plan(&keyless(), &GenericDialect, "code").unwrap();
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE \"Imports\" ALTER COLUMN \"Code\" SET NOT NULL".to_string(),
                "ALTER TABLE \"Imports\" ADD CONSTRAINT \"PK_Imports\" PRIMARY KEY (\"Code\")"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_plan_not_null_column_skips_alter() {
        let statements = KeyPromotion::plan(&keyless(), &GenericDialect, "Name").unwrap();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("PRIMARY KEY (\"Name\")"));
    }

    #[test]
    fn test_plan_rejects_existing_key_and_unknown_column() {
        let keyed = keyless().with_key_columns(&["Name".to_string()]).unwrap();
        assert!(matches!(
            KeyPromotion::plan(&keyed, &GenericDialect, "Code"),
            Err(ServiceError::InvalidState(_))
        ));
        assert!(matches!(
            KeyPromotion::plan(&keyless(), &GenericDialect, "Missing"),
            Err(ServiceError::InvalidIdentifier(_))
        ));
    }
}
