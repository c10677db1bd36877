//! MS SQL Server connection implementation using tiberius

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tabler_core::{
    ColumnMeta, Connection, ConnectionConfig, Dialect, QueryResult, Result, Row,
    SchemaIntrospection, StatementResult, TablerError, Transaction, Value,
};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, Row as TiberiusRow, ToSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use uuid::Uuid;

use crate::MssqlDialect;

/// Default SQL Server port
pub(crate) const DEFAULT_PORT: u16 = 1433;

/// MS SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MssqlConnectionError> for TablerError {
    fn from(err: MssqlConnectionError) -> Self {
        match err {
            MssqlConnectionError::ConnectionFailed(_)
            | MssqlConnectionError::AuthenticationFailed(_)
            | MssqlConnectionError::ConnectionClosed => TablerError::Connection(err.to_string()),
            MssqlConnectionError::QueryFailed(_) => TablerError::Query(err.to_string()),
            _ => TablerError::Driver(err.to_string()),
        }
    }
}

type SharedClient = Arc<Mutex<Client<Compat<TcpStream>>>>;

/// MS SQL Server connection using tiberius
///
/// The client sits behind an async mutex, so statements from one connection
/// are serialized. A transaction shares the same client.
pub struct MssqlConnection {
    client: SharedClient,
    closed: AtomicBool,
    database: Option<String>,
    dialect: MssqlDialect,
}

impl MssqlConnection {
    /// Create a new MS SQL Server connection
    ///
    /// # Arguments
    /// * `host` - Server hostname
    /// * `port` - Server port (default 1433)
    /// * `database` - Database name (optional)
    /// * `username` - Username (None for integrated auth)
    /// * `password` - Password
    /// * `trust_cert` - Whether to trust server certificate (for dev/testing)
    #[tracing::instrument(skip(password))]
    pub async fn connect(
        host: &str,
        port: u16,
        database: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
        trust_cert: bool,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        tracing::debug!("connecting to MS SQL Server at {}:{}", host, port);

        let mut config = Config::new();
        config.host(host);
        config.port(port);

        if let Some(db) = database {
            config.database(db);
        }

        if trust_cert {
            config.trust_cert();
        }

        config.encryption(EncryptionLevel::Required);

        match (username, password) {
            (Some(user), pass) if !user.is_empty() => {
                config.authentication(AuthMethod::sql_server(user, pass.unwrap_or("")));
            }
            _ => {
                #[cfg(windows)]
                {
                    config.authentication(AuthMethod::Integrated);
                }
                #[cfg(not(windows))]
                {
                    return Err(MssqlConnectionError::AuthenticationFailed(
                        "integrated authentication is only supported on Windows".to_string(),
                    ));
                }
            }
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tcp.set_nodelay(true)?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tracing::info!(host = %host, port, database = ?database, "connected to MS SQL Server");

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            closed: AtomicBool::new(false),
            database: database.map(String::from),
            dialect: MssqlDialect::new(),
        })
    }

    /// Create connection from config with standard keys
    pub async fn from_config(
        config: &ConnectionConfig,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        let host = match config.host.trim() {
            "" => "localhost".to_string(),
            host => host.to_string(),
        };
        let port = if config.port > 0 {
            config.port
        } else {
            DEFAULT_PORT
        };

        Self::connect(
            &host,
            port,
            config.database.as_deref(),
            config.username.as_deref(),
            config.password.as_deref(),
            config.get_bool("trust_cert"),
        )
        .await
    }

    /// Database this connection was opened against
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn ensure_not_closed(&self) -> std::result::Result<(), MssqlConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MssqlConnectionError::ConnectionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.ensure_not_closed()?;
        run_execute(&self.client, sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_not_closed()?;
        run_query(&self.client, sql, params).await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.ensure_not_closed()?;
        run_batch(&self.client, "SET XACT_ABORT ON; BEGIN TRANSACTION").await?;
        tracing::debug!("transaction started");
        Ok(Box::new(MssqlTransaction {
            client: Arc::clone(&self.client),
            finished: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("MS SQL Server connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        Some(self)
    }
}

/// A transaction on an [`MssqlConnection`]
pub struct MssqlTransaction {
    client: SharedClient,
    finished: AtomicBool,
}

#[async_trait]
impl Transaction for MssqlTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.finished.store(true, Ordering::SeqCst);
        run_batch(&self.client, "COMMIT TRANSACTION").await?;
        tracing::debug!("transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finished.store(true, Ordering::SeqCst);
        // XACT_ABORT may already have rolled the transaction back
        run_batch(&self.client, "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        run_query(&self.client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        run_execute(&self.client, sql, params).await
    }
}

impl Drop for MssqlTransaction {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::SeqCst) {
            tracing::warn!("transaction dropped without commit or rollback");
        }
    }
}

/// Run a parameterless batch (transaction control) outside `sp_executesql`
async fn run_batch(client: &SharedClient, sql: &str) -> Result<()> {
    let mut client = client.lock().await;
    let stream = client
        .simple_query(sql)
        .await
        .map_err(|e| MssqlConnectionError::QueryFailed(e.to_string()))?;
    stream
        .into_results()
        .await
        .map_err(|e| MssqlConnectionError::QueryFailed(e.to_string()))?;
    Ok(())
}

async fn run_execute(client: &SharedClient, sql: &str, params: &[Value]) -> Result<StatementResult> {
    let start = std::time::Instant::now();
    let tiberius_params = values_to_tiberius_params(params)?;
    let param_refs: Vec<&dyn ToSql> = tiberius_params.iter().map(|p| p as &dyn ToSql).collect();

    let mut client = client.lock().await;
    match client.execute(sql, &param_refs[..]).await {
        Ok(exec_result) => {
            let affected_rows = exec_result.rows_affected().iter().sum::<u64>();
            tracing::debug!(
                affected_rows,
                duration_ms = start.elapsed().as_millis() as u64,
                "execute completed"
            );
            Ok(StatementResult { affected_rows })
        }
        Err(e) => {
            tracing::error!(error = %e, "execute failed");
            Err(MssqlConnectionError::QueryFailed(e.to_string()).into())
        }
    }
}

async fn run_query(client: &SharedClient, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start = std::time::Instant::now();
    let tiberius_params = values_to_tiberius_params(params)?;
    let param_refs: Vec<&dyn ToSql> = tiberius_params.iter().map(|p| p as &dyn ToSql).collect();

    let mut client = client.lock().await;
    let stream = client.query(sql, &param_refs[..]).await.map_err(|e| {
        tracing::error!(error = %e, "query failed");
        MssqlConnectionError::QueryFailed(e.to_string())
    })?;

    let tib_rows = stream
        .into_first_result()
        .await
        .map_err(|e| MssqlConnectionError::QueryFailed(e.to_string()))?;

    let columns: Vec<ColumnMeta> = tib_rows
        .first()
        .map(|first| {
            first
                .columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| tiberius_column_to_meta(col, idx))
                .collect()
        })
        .unwrap_or_default();
    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let mut rows = Vec::with_capacity(tib_rows.len());
    for tib_row in tib_rows {
        rows.push(Row::new(column_names.clone(), tiberius_row_to_values(tib_row)?));
    }

    let execution_time_ms = start.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        duration_ms = execution_time_ms,
        "query completed"
    );

    Ok(QueryResult {
        id: Uuid::new_v4(),
        columns,
        rows,
        total_rows: None,
        affected_rows: 0,
        execution_time_ms,
    })
}

/// Convert a tiberius column to ColumnMeta
fn tiberius_column_to_meta(col: &tiberius::Column, ordinal: usize) -> ColumnMeta {
    ColumnMeta {
        name: col.name().to_string(),
        data_type: format!("{:?}", col.column_type()),
        nullable: true,
        ordinal,
    }
}

/// Convert a tiberius row to a vector of Values by consuming the row
fn tiberius_row_to_values(row: TiberiusRow) -> Result<Vec<Value>> {
    row.into_iter().map(column_data_to_value).collect()
}

fn date_from_days(epoch_year: i32, days: i64) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(epoch_year, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days)))
        .ok_or_else(|| {
            MssqlConnectionError::TypeConversion(format!(
                "{} days after {}-01-01 is out of range",
                days, epoch_year
            ))
            .into()
        })
}

/// Time of day from `increments` units of 10^-scale seconds
fn time_from_increments(increments: u64, scale: u8) -> NaiveTime {
    let nanos_per_increment = 10u64.pow(9u32.saturating_sub(scale as u32));
    let total_nanos = increments.saturating_mul(nanos_per_increment);
    NaiveTime::from_num_seconds_from_midnight_opt(
        (total_nanos / 1_000_000_000) as u32,
        (total_nanos % 1_000_000_000) as u32,
    )
    .unwrap_or_default()
}

/// Convert tiberius ColumnData to a Tabler Value
pub(crate) fn column_data_to_value(col_data: ColumnData<'static>) -> Result<Value> {
    let value = match col_data {
        ColumnData::Bit(v) => v.map(Value::Bool),
        ColumnData::U8(v) => v.map(|v| Value::Int16(v as i16)),
        ColumnData::I16(v) => v.map(Value::Int16),
        ColumnData::I32(v) => v.map(Value::Int32),
        ColumnData::I64(v) => v.map(Value::Int64),
        ColumnData::F32(v) => v.map(Value::Float32),
        ColumnData::F64(v) => v.map(Value::Float64),
        ColumnData::String(v) => v.map(|s| Value::String(s.into_owned())),
        ColumnData::Guid(v) => v.map(Value::Uuid),
        ColumnData::Binary(v) => v.map(|b| Value::Bytes(b.into_owned())),
        ColumnData::Numeric(v) => v.map(|n| Value::Decimal(n.to_string())),
        ColumnData::Xml(v) => v.map(|x| Value::String(x.into_owned().into_string())),
        ColumnData::DateTime(None)
        | ColumnData::SmallDateTime(None)
        | ColumnData::DateTime2(None)
        | ColumnData::DateTimeOffset(None)
        | ColumnData::Date(None)
        | ColumnData::Time(None) => None,
        ColumnData::DateTime(Some(v)) => {
            // 1/300 second ticks
            let nanos = v.seconds_fragments() as u64 * 1_000_000_000 / 300;
            let time = NaiveTime::from_num_seconds_from_midnight_opt(
                (nanos / 1_000_000_000) as u32,
                (nanos % 1_000_000_000) as u32,
            )
            .unwrap_or_default();
            Some(Value::DateTime(NaiveDateTime::new(
                date_from_days(1900, v.days() as i64)?,
                time,
            )))
        }
        ColumnData::SmallDateTime(Some(v)) => {
            let time =
                NaiveTime::from_num_seconds_from_midnight_opt(v.seconds_fragments() as u32 * 60, 0)
                    .unwrap_or_default();
            Some(Value::DateTime(NaiveDateTime::new(
                date_from_days(1900, v.days() as i64)?,
                time,
            )))
        }
        ColumnData::DateTime2(Some(v)) => {
            let date = date_from_days(1, v.date().days() as i64)?;
            let time = time_from_increments(v.time().increments(), v.time().scale());
            Some(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        ColumnData::DateTimeOffset(Some(v)) => {
            let dt2 = v.datetime2();
            let date = date_from_days(1, dt2.date().days() as i64)?;
            let time = time_from_increments(dt2.time().increments(), dt2.time().scale());
            Some(Value::DateTimeUtc(
                chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(
                    NaiveDateTime::new(date, time),
                    chrono::Utc,
                ),
            ))
        }
        ColumnData::Date(Some(v)) => Some(Value::Date(date_from_days(1, v.days() as i64)?)),
        ColumnData::Time(Some(v)) => Some(Value::Time(time_from_increments(v.increments(), v.scale()))),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Container for tiberius parameter values
#[derive(Debug)]
pub(crate) enum TiberiusParam {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
}

impl ToSql for TiberiusParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            TiberiusParam::Null => ColumnData::I32(None),
            TiberiusParam::Bool(v) => ColumnData::Bit(Some(*v)),
            TiberiusParam::I16(v) => ColumnData::I16(Some(*v)),
            TiberiusParam::I32(v) => ColumnData::I32(Some(*v)),
            TiberiusParam::I64(v) => ColumnData::I64(Some(*v)),
            TiberiusParam::F32(v) => ColumnData::F32(Some(*v)),
            TiberiusParam::F64(v) => ColumnData::F64(Some(*v)),
            TiberiusParam::String(v) => {
                ColumnData::String(Some(std::borrow::Cow::Borrowed(v.as_str())))
            }
            TiberiusParam::Bytes(v) => {
                ColumnData::Binary(Some(std::borrow::Cow::Borrowed(v.as_slice())))
            }
            TiberiusParam::Uuid(v) => ColumnData::Guid(Some(*v)),
            TiberiusParam::Date(v) => v.to_sql(),
            TiberiusParam::Time(v) => v.to_sql(),
            TiberiusParam::DateTime(v) => v.to_sql(),
            TiberiusParam::DateTimeUtc(v) => v.to_sql(),
        }
    }
}

/// Convert Tabler Values to tiberius parameters.
///
/// Decimals travel as strings and are converted server side, so no precision
/// is lost on the way.
pub(crate) fn values_to_tiberius_params(values: &[Value]) -> Result<Vec<TiberiusParam>> {
    values
        .iter()
        .map(|v| {
            let param = match v {
                Value::Null => TiberiusParam::Null,
                Value::Bool(b) => TiberiusParam::Bool(*b),
                Value::Int16(i) => TiberiusParam::I16(*i),
                Value::Int32(i) => TiberiusParam::I32(*i),
                Value::Int64(i) => TiberiusParam::I64(*i),
                Value::Float32(f) => TiberiusParam::F32(*f),
                Value::Float64(f) => TiberiusParam::F64(*f),
                Value::Decimal(d) => TiberiusParam::String(d.clone()),
                Value::String(s) => TiberiusParam::String(s.clone()),
                Value::Bytes(b) => TiberiusParam::Bytes(b.clone()),
                Value::Uuid(u) => TiberiusParam::Uuid(*u),
                Value::Date(d) => TiberiusParam::Date(*d),
                Value::Time(t) => TiberiusParam::Time(*t),
                Value::DateTime(dt) => TiberiusParam::DateTime(*dt),
                Value::DateTimeUtc(dt) => TiberiusParam::DateTimeUtc(*dt),
            };
            Ok(param)
        })
        .collect()
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("database", &self.database)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
