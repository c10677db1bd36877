//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tabler_core::{
    ColumnInfo, ColumnMeta, Connection, DatabaseInfo, Dialect, GenericDialect, PrimaryKeyInfo,
    QueryResult, Result, Row, SchemaIntrospection, StatementResult, TableInfo, TablerError,
    Transaction, Value,
};
use tabler_services::CancellationToken;

/// What the mock transaction saw
#[derive(Debug, Default)]
pub struct TransactionLog {
    pub begun: usize,
    pub statements: Vec<(String, Vec<Value>)>,
    pub committed: usize,
    pub rolled_back: usize,
}

/// Mock connection for testing service-layer logic without a real database.
///
/// Uses the generic dialect. Queries are answered by SQL pattern; statements
/// run inside transactions are recorded and can be made to fail or to affect
/// no rows.
pub struct MockConnection {
    dialect: GenericDialect,
    pub should_fail: bool,
    /// SQL-pattern-based responses: if a query contains the pattern string,
    /// the corresponding result is returned instead of an empty one.
    pub query_responses: Vec<(String, QueryResult)>,
    /// Transaction statements containing this pattern fail
    pub fail_execute_on: Option<String>,
    /// Transaction statements containing this pattern affect no rows
    pub zero_rows_on: Option<String>,
    /// Cancelled by each transaction statement while it runs
    pub cancel_on_execute: Option<CancellationToken>,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub databases: Vec<String>,
    pub tables: Vec<String>,
    /// Log of all SQL queries executed, for assertion in tests
    pub query_log: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
    pub transactions: Arc<Mutex<TransactionLog>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            dialect: GenericDialect,
            should_fail: false,
            query_responses: vec![],
            fail_execute_on: None,
            zero_rows_on: None,
            cancel_on_execute: None,
            columns: vec![],
            primary_key: vec![],
            databases: vec![],
            tables: vec![],
            query_log: Arc::new(Mutex::new(Vec::new())),
            transactions: Arc::new(Mutex::new(TransactionLog::default())),
        }
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Register a response for queries containing the given SQL pattern.
    pub fn with_query_response(
        mut self,
        sql_contains: impl Into<String>,
        result: QueryResult,
    ) -> Self {
        self.query_responses.push((sql_contains.into(), result));
        self
    }

    pub fn with_table(mut self, columns: Vec<ColumnInfo>, primary_key: &[&str]) -> Self {
        self.columns = columns;
        self.primary_key = primary_key.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_catalog(mut self, databases: &[&str], tables: &[&str]) -> Self {
        self.databases = databases.iter().map(|d| d.to_string()).collect();
        self.tables = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn failing_execute_on(mut self, pattern: impl Into<String>) -> Self {
        self.fail_execute_on = Some(pattern.into());
        self
    }

    pub fn zero_rows_on(mut self, pattern: impl Into<String>) -> Self {
        self.zero_rows_on = Some(pattern.into());
        self
    }

    /// Cancel `token` while a transaction statement is in flight
    pub fn cancelling_on_execute(mut self, token: CancellationToken) -> Self {
        self.cancel_on_execute = Some(token);
        self
    }

    pub fn query_log(&self) -> Vec<String> {
        self.query_log.lock().iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub fn query_params(&self) -> Vec<Vec<Value>> {
        self.query_log.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn executed(&self) -> Vec<String> {
        self.transactions
            .lock()
            .statements
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.query_log.lock().push((sql.to_string(), params.to_vec()));
        if self.should_fail {
            return Err(TablerError::Query("Execute failed".into()));
        }
        Ok(StatementResult { affected_rows: 1 })
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.query_log.lock().push((sql.to_string(), params.to_vec()));

        if self.should_fail {
            return Err(TablerError::Query("Query failed".into()));
        }

        for (pattern, result) in &self.query_responses {
            if sql.contains(pattern.as_str()) {
                return Ok(result.clone());
            }
        }
        Ok(QueryResult::empty())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        if self.should_fail {
            return Err(TablerError::Connection("Connection lost".into()));
        }
        self.transactions.lock().begun += 1;
        Ok(Box::new(MockTransaction {
            log: self.transactions.clone(),
            fail_on: self.fail_execute_on.clone(),
            zero_rows_on: self.zero_rows_on.clone(),
            cancel_on_execute: self.cancel_on_execute.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        Some(self)
    }
}

#[async_trait]
impl SchemaIntrospection for MockConnection {
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        if self.should_fail {
            return Err(TablerError::Schema("Failed to list databases".into()));
        }
        Ok(self
            .databases
            .iter()
            .map(|name| DatabaseInfo { name: name.clone() })
            .collect())
    }

    async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<TableInfo>> {
        if self.should_fail {
            return Err(TablerError::Schema("Failed to list tables".into()));
        }
        Ok(self
            .tables
            .iter()
            .map(|name| TableInfo {
                schema: schema.map(str::to_string),
                name: name.clone(),
                row_count: None,
            })
            .collect())
    }

    async fn get_columns(&self, _schema: Option<&str>, _table: &str) -> Result<Vec<ColumnInfo>> {
        if self.should_fail {
            return Err(TablerError::Schema("Failed to get columns".into()));
        }
        Ok(self.columns.clone())
    }

    async fn get_primary_key(
        &self,
        _schema: Option<&str>,
        _table: &str,
    ) -> Result<Option<PrimaryKeyInfo>> {
        if self.primary_key.is_empty() {
            return Ok(None);
        }
        Ok(Some(PrimaryKeyInfo {
            name: Some("PK_mock".into()),
            columns: self.primary_key.clone(),
        }))
    }
}

pub struct MockTransaction {
    log: Arc<Mutex<TransactionLog>>,
    fail_on: Option<String>,
    zero_rows_on: Option<String>,
    cancel_on_execute: Option<CancellationToken>,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.log.lock().committed += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.log.lock().rolled_back += 1;
        Ok(())
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        if let Some(token) = &self.cancel_on_execute {
            token.cancel();
            tokio::task::yield_now().await;
        }
        self.log.lock().statements.push((sql.to_string(), params.to_vec()));
        if self.fail_on.as_deref().is_some_and(|p| sql.contains(p)) {
            return Err(TablerError::Query(format!("constraint violation: {}", sql)));
        }
        let affected_rows = if self.zero_rows_on.as_deref().is_some_and(|p| sql.contains(p)) {
            0
        } else {
            1
        };
        Ok(StatementResult { affected_rows })
    }
}

/// Helper to create a mock query result with column names and row data
pub fn mock_query_result(column_names: Vec<&str>, row_data: Vec<Vec<Value>>) -> QueryResult {
    let columns: Vec<ColumnMeta> = column_names
        .iter()
        .enumerate()
        .map(|(i, name)| ColumnMeta {
            name: name.to_string(),
            data_type: "TEXT".to_string(),
            nullable: true,
            ordinal: i,
        })
        .collect();

    let rows: Vec<Row> = row_data
        .into_iter()
        .map(|values| Row::new(column_names.iter().map(|s| s.to_string()).collect(), values))
        .collect();

    QueryResult {
        columns,
        rows,
        ..QueryResult::empty()
    }
}

/// Helper to create a single-value query result (e.g. `SELECT COUNT(*)`)
pub fn mock_single_value_result(column_name: &str, value: Value) -> QueryResult {
    mock_query_result(vec![column_name], vec![vec![value]])
}

/// `Cars(Id identity, Make, Model, Year, Price)` keyed on `Id`
pub fn car_columns() -> Vec<ColumnInfo> {
    vec![
        ColumnInfo::new("Id", 0, "int").identity(),
        ColumnInfo::new("Make", 1, "nvarchar").not_null(),
        ColumnInfo::new("Model", 2, "nvarchar").not_null(),
        ColumnInfo::new("Year", 3, "int").not_null(),
        ColumnInfo::new("Price", 4, "decimal"),
    ]
}

pub fn car_row(id: i32, make: &str, model: &str, year: i32, price: &str) -> Vec<Value> {
    vec![
        Value::Int32(id),
        Value::String(make.into()),
        Value::String(model.into()),
        Value::Int32(year),
        Value::Decimal(price.into()),
    ]
}

pub const CAR_COLUMNS: [&str; 5] = ["Id", "Make", "Model", "Year", "Price"];

/// A cars table with `total` rows, answering page queries with `rows`
pub fn cars_connection(total: i64, rows: Vec<Vec<Value>>) -> MockConnection {
    MockConnection::new()
        .with_table(car_columns(), &["Id"])
        .with_query_response(
            "COUNT(*)",
            mock_single_value_result("count", Value::Int64(total)),
        )
        .with_query_response("ROW_NUMBER()", mock_query_result(CAR_COLUMNS.to_vec(), rows))
}

/// `Employees(ID, EmployeeNumber, Surname)` keyed on `ID`, where
/// `EmployeeNumber` is filled by the auto-increment resolver
pub fn employee_columns() -> Vec<ColumnInfo> {
    vec![
        ColumnInfo::new("ID", 0, "int").not_null(),
        ColumnInfo::new("EmployeeNumber", 1, "int").not_null(),
        ColumnInfo::new("Surname", 2, "nvarchar").not_null(),
    ]
}
