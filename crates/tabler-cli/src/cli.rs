//! `tabler`: browse and edit SQL Server tables from the terminal

mod edit_script;
mod logging;
mod output;
mod settings;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tabler_core::{Connection, ConnectionConfig, DatabaseDriver};
use tabler_driver_mssql::MssqlDriver;
use tabler_services::{
    CancellationToken, CatalogService, DiscardPolicy, EntityProfile, FilterEntry, FilterSpec,
    SchemaService, TableRef, TableSession,
};

use crate::edit_script::EditScript;
use crate::logging::LoggingConfig;
use crate::settings::{LoggingPreset, TablerSettings};

#[derive(Parser, Debug)]
#[command(name = "tabler", version, about = "Browse and edit SQL Server tables")]
struct Cli {
    /// Server host name
    #[arg(long, global = true, env = "TABLER_HOST")]
    host: Option<String>,

    /// Server port
    #[arg(long, global = true, env = "TABLER_PORT")]
    port: Option<u16>,

    /// Database to connect to
    #[arg(long, short = 'd', global = true, env = "TABLER_DATABASE")]
    database: Option<String>,

    /// SQL login; integrated authentication when absent
    #[arg(long, short = 'U', global = true, env = "TABLER_USER")]
    username: Option<String>,

    #[arg(long, global = true, env = "TABLER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Accept the server certificate without validation
    #[arg(long, global = true)]
    trust_cert: bool,

    /// Logging preset; overrides the settings file
    #[arg(long, global = true, value_enum)]
    log: Option<LoggingPreset>,

    /// Settings file to use instead of the default location
    #[arg(long, global = true, env = "TABLER_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List databases on the server
    Databases,

    /// List tables in the connected database
    Tables {
        #[arg(long)]
        schema: Option<String>,
    },

    /// Show a table's columns and primary key
    Describe {
        table: String,
        #[arg(long)]
        schema: Option<String>,
    },

    /// Show one page of a table
    Browse {
        table: String,
        #[arg(long)]
        schema: Option<String>,
        #[arg(long, short = 'p', default_value_t = 1)]
        page: i64,
        /// Rows per page; the settings file default when absent
        #[arg(long)]
        page_size: Option<u64>,
        /// `Column=text` filter, up to three
        #[arg(long = "filter", short = 'f', value_parser = parse_filter)]
        filters: Vec<FilterEntry>,
        /// Ignore the built-in entity profile for this table
        #[arg(long)]
        no_profile: bool,
    },

    /// Apply a JSON edit script to a table in one transaction
    Apply {
        table: String,
        script: PathBuf,
        #[arg(long)]
        schema: Option<String>,
        /// Show what would be written without saving
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        no_profile: bool,
    },

    /// Make a column the table's primary key
    PromoteKey {
        table: String,
        column: String,
        #[arg(long)]
        schema: Option<String>,
        /// Confirm the schema change
        #[arg(long)]
        yes: bool,
    },
}

fn parse_filter(raw: &str) -> Result<FilterEntry, String> {
    match raw.split_once('=') {
        Some((column, text)) if !column.trim().is_empty() => {
            Ok(FilterEntry::new(column.trim(), text))
        }
        _ => Err(format!("expected Column=text, got '{}'", raw)),
    }
}

impl Cli {
    /// Settings defaults overridden by whatever was given on the command line
    fn connection_config(&self, settings: &TablerSettings) -> ConnectionConfig {
        let mut defaults = settings.connection.clone();
        if let Some(host) = &self.host {
            defaults.host = host.clone();
        }
        if let Some(port) = self.port {
            defaults.port = port;
        }
        if self.database.is_some() {
            defaults.database = self.database.clone();
        }
        if self.username.is_some() {
            defaults.username = self.username.clone();
        }
        defaults.trust_cert |= self.trust_cert;
        defaults.to_config(self.password.as_deref())
    }

    fn load_settings(&self) -> Result<TablerSettings> {
        match &self.settings {
            Some(path) => TablerSettings::load_from(path),
            None => TablerSettings::load(),
        }
    }

    fn table_ref(&self, table: &str, schema: Option<&str>) -> TableRef {
        let mut table = TableRef::new(table);
        if let Some(schema) = schema {
            table = table.in_schema(schema);
        }
        if let Some(database) = &self.database {
            table = table.in_database(database.clone());
        }
        table
    }
}

/// Run a read-only request unless Ctrl-C was pressed.
///
/// A request already sent runs to completion so the connection stays usable
/// for the rollback and close that follow.
async fn cancellable<T, E, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    if token.is_cancelled() {
        bail!("Operation cancelled");
    }
    let result = fut.await?;
    if token.is_cancelled() {
        bail!("Operation cancelled");
    }
    Ok(result)
}

async fn open_session(
    connection: Arc<dyn Connection>,
    table: TableRef,
    page_size: u64,
    use_profile: bool,
    token: &CancellationToken,
) -> Result<TableSession> {
    let schema_service = Arc::new(SchemaService::new());
    let schema = cancellable(token, schema_service.describe(connection.as_ref(), &table)).await?;
    let profile = EntityProfile::builtin(&table.name).filter(|_| use_profile);
    let mut session = TableSession::new(connection, schema_service, table, schema, page_size);
    if let Some(profile) = profile {
        session = session.with_profile(profile)?;
        if let Some(applied) = session.profile() {
            tracing::debug!(profile = %applied.name, "using entity profile");
        }
    }
    Ok(session)
}

async fn run(
    cli: &Cli,
    settings: &TablerSettings,
    connection: Arc<dyn Connection>,
    token: &CancellationToken,
) -> Result<()> {
    match &cli.command {
        Command::Databases => {
            let names = cancellable(token, CatalogService::list_databases(connection.as_ref())).await?;
            println!("{}", output::databases_table(&names));
        }

        Command::Tables { schema } => {
            let tables = cancellable(
                token,
                CatalogService::list_tables(connection.as_ref(), schema.as_deref()),
            )
            .await?;
            println!("{}", output::tables_table(&tables));
        }

        Command::Describe { table, schema } => {
            let table = cli.table_ref(table, schema.as_deref());
            let described = cancellable(
                token,
                SchemaService::new().describe(connection.as_ref(), &table),
            )
            .await?;
            println!("{}", output::schema_table(&described));
            if !described.has_primary_key() {
                println!(
                    "{} has no primary key; existing rows can only be edited with key_columns or after promote-key",
                    table
                );
            }
        }

        Command::Browse {
            table,
            schema,
            page,
            page_size,
            filters,
            no_profile,
        } => {
            let table = cli.table_ref(table, schema.as_deref());
            let use_profile = settings.browse.use_entity_profiles && !no_profile;
            let page_size = page_size.unwrap_or(settings.browse.page_size);
            let mut session = open_session(connection, table, page_size, use_profile, token).await?;

            if filters.is_empty() {
                session.load_page(*page, DiscardPolicy::KeepPending, token).await?;
            } else {
                let spec = FilterSpec::from_pairs(
                    filters.iter().map(|f| (f.column.clone(), f.text.clone())),
                )?;
                session.apply_filters(spec, DiscardPolicy::KeepPending, token).await?;
                if *page != 1 {
                    session.load_page(*page, DiscardPolicy::KeepPending, token).await?;
                }
            }

            let columns: Vec<String> = session.schema().column_names().map(str::to_string).collect();
            println!("{}", output::rows_table(&columns, session.rows()));
            println!(
                "{}",
                output::page_footer(session.page().page, session.total_pages(), session.total_records())
            );
        }

        Command::Apply {
            table,
            script,
            schema,
            dry_run,
            no_profile,
        } => {
            let script = EditScript::from_path(script)?;
            let table = cli.table_ref(table, schema.as_deref());
            let use_profile = settings.browse.use_entity_profiles && !no_profile;
            let mut session =
                open_session(connection, table, settings.browse.page_size, use_profile, token).await?;
            script.apply(&mut session, token).await?;

            let changes = session.pending_changes();
            if changes.is_empty() {
                println!("No changes to save");
                return Ok(());
            }
            for line in output::change_lines(&changes, session.key_columns()) {
                println!("{}", line);
            }
            if *dry_run {
                session.cancel();
                println!("Dry run: {} change(s) not written", changes.len());
                return Ok(());
            }

            let summary = session
                .save(token)
                .await
                .context("No changes were written")?;
            println!("{}", output::save_summary(&summary));
        }

        Command::PromoteKey {
            table,
            column,
            schema,
            yes,
        } => {
            let table = cli.table_ref(table, schema.as_deref());
            if !yes {
                bail!(
                    "promoting {} to the primary key of {} alters the table; pass --yes to confirm",
                    column,
                    table
                );
            }
            let mut session = open_session(
                connection,
                table.clone(),
                settings.browse.page_size,
                false,
                token,
            )
            .await?;
            session.promote_key(column, token).await?;
            println!("{} is now the primary key of {}", column, table);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    let preset = cli.log.unwrap_or(settings.logging);
    let _log_guard = logging::init(&LoggingConfig::from_preset(preset))?;

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let config = cli.connection_config(&settings);
    let connection = cancellable(&token, MssqlDriver::new().connect(&config))
        .await
        .with_context(|| format!("Could not connect to {}", config.host))?;

    let result = run(&cli, &settings, connection.clone(), &token).await;
    if let Err(err) = connection.close().await {
        tracing::debug!(error = %err, "close failed");
    }
    result
}
