//! Edit session over one table
//!
//! A [`TableSession`] owns the loaded page (`original`) and the edit buffer
//! (`current`). Reads replace both generations; edits touch only `current`;
//! a successful save makes `current` the new `original`.
//!
//! ```text
//! Unloaded ──load──▶ Loaded ──edit──▶ Editing ──save ok──▶ Loaded
//!                      ▲                 │  │
//!                      └────cancel───────┘  └─save error──▶ SaveFailed
//! ```
//!
//! Every database round-trip takes a [`CancellationToken`]; a cancelled
//! operation leaves the session as it was.

use std::sync::Arc;
use tabler_core::{Connection, Row, TableSchema, Value};
use tokio_util::sync::CancellationToken;

use crate::auto_increment::{AutoIncrementResolver, is_eligible};
use crate::cancel::run_cancellable;
use crate::change_writer::{ChangeWriter, SaveSummary};
use crate::entity::EntityProfile;
use crate::error::{ServiceError, ServiceResult};
use crate::filter_builder::{FilterBuilder, FilterSpec, Predicate};
use crate::key_promotion::KeyPromotion;
use crate::page_planner::{PagePlanner, PageRequest, strip_row_number, total_pages};
use crate::schema_service::{SchemaService, TableRef};
use crate::snapshot::{
    ChangeSet, ColumnSelection, ModifiedRow, RowSnapshot, RowState, changed_columns, diff,
};
use crate::value_parser::parse_cell_value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unloaded,
    Loaded,
    Editing,
    SaveFailed,
}

/// What to do with pending edits when the loaded page is about to be replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscardPolicy {
    /// Refuse with `UnsavedChanges`
    #[default]
    KeepPending,
    /// Drop the edits and continue
    DiscardPending,
}

/// Null checks the database would otherwise reject, plus the profile's rules.
///
/// A non-nullable column must be filled unless the server or the
/// auto-increment resolver supplies the value.
pub fn validate_record(
    schema: &TableSchema,
    row: &Row,
    profile: Option<&EntityProfile>,
) -> Vec<String> {
    let mut errors: Vec<String> = schema
        .columns()
        .iter()
        .filter(|c| !c.nullable && !c.has_server_value() && !is_eligible(c))
        .filter(|c| row.get_by_name(&c.name).is_none_or(Value::is_null))
        .map(|c| format!("{} cannot be empty", c.name))
        .collect();
    if let Some(profile) = profile {
        for message in profile.validate(row) {
            if !errors.contains(&message) {
                errors.push(message);
            }
        }
    }
    errors
}

pub struct TableSession {
    connection: Arc<dyn Connection>,
    schema_service: Arc<SchemaService>,
    table: TableRef,
    /// As described by the catalog
    described: TableSchema,
    /// `described` with the effective key columns
    schema: TableSchema,
    compare: ColumnSelection,
    profile: Option<EntityProfile>,
    filters: FilterSpec,
    predicate: Predicate,
    page: PageRequest,
    total_records: u64,
    original: Vec<Row>,
    current: Vec<RowSnapshot>,
    state: SessionState,
    last_error: Option<String>,
}

impl TableSession {
    /// Session over an already described table, nothing loaded yet
    pub fn new(
        connection: Arc<dyn Connection>,
        schema_service: Arc<SchemaService>,
        table: TableRef,
        schema: TableSchema,
        page_size: u64,
    ) -> Self {
        Self {
            connection,
            schema_service,
            table,
            described: schema.clone(),
            schema,
            compare: ColumnSelection::All,
            profile: None,
            filters: FilterSpec::new(),
            predicate: Predicate::none(),
            page: PageRequest::first(page_size),
            total_records: 0,
            original: Vec::new(),
            current: Vec::new(),
            state: SessionState::Unloaded,
            last_error: None,
        }
    }

    /// Describe `table` and load its first page
    #[tracing::instrument(skip(connection, schema_service, token), fields(table = %table))]
    pub async fn open(
        connection: Arc<dyn Connection>,
        schema_service: Arc<SchemaService>,
        table: TableRef,
        page_size: u64,
        token: &CancellationToken,
    ) -> ServiceResult<Self> {
        let schema = run_cancellable(
            token,
            schema_service.describe(connection.as_ref(), &table),
        )
        .await?;
        let mut session = Self::new(connection, schema_service, table, schema, page_size);
        session.load_page(1, DiscardPolicy::KeepPending, token).await?;
        Ok(session)
    }

    /// Use a profile's key columns, compared columns and rules.
    ///
    /// A profile naming columns the table does not have is skipped with a
    /// warning and the session keeps the described key.
    pub fn with_profile(mut self, profile: EntityProfile) -> ServiceResult<Self> {
        let missing = profile.missing_columns(&self.described);
        if !missing.is_empty() {
            tracing::warn!(
                profile = %profile.name,
                table = %self.table,
                ?missing,
                "table does not match entity profile, profile not applied"
            );
            return Ok(self);
        }
        self.select_key_columns(&profile.key_columns)?;
        self.compare = profile.compare_selection();
        self.profile = Some(profile);
        Ok(self)
    }

    pub fn profile(&self) -> Option<&EntityProfile> {
        self.profile.as_ref()
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn rows(&self) -> &[RowSnapshot] {
        &self.current
    }

    pub fn original_rows(&self) -> &[Row] {
        &self.original
    }

    pub fn key_columns(&self) -> &[String] {
        self.schema.primary_key()
    }

    pub fn filters(&self) -> &FilterSpec {
        &self.filters
    }

    pub fn page(&self) -> PageRequest {
        self.page
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn total_pages(&self) -> u64 {
        total_pages(self.total_records, self.page.page_size)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // ============ Reading ============

    async fn fetch(
        &self,
        predicate: &Predicate,
        request: PageRequest,
        token: &CancellationToken,
    ) -> ServiceResult<(u64, Vec<Row>)> {
        let connection = self.connection.as_ref();
        let plan = PagePlanner::plan(&self.schema, connection.dialect(), predicate, request);

        run_cancellable(token, async {
            let count = connection.query(&plan.count_sql, &plan.params).await?;
            let total = count.scalar().and_then(Value::as_i64).unwrap_or(0).max(0) as u64;
            let mut page = connection.query(&plan.page_sql, &plan.params).await?;
            strip_row_number(&mut page);
            Ok::<_, ServiceError>((total, page.rows))
        })
        .await
    }

    fn guard_pending(&self, policy: DiscardPolicy) -> ServiceResult<()> {
        let pending = self.pending_changes().len();
        if pending > 0 && policy == DiscardPolicy::KeepPending {
            return Err(ServiceError::UnsavedChanges(pending));
        }
        if pending > 0 {
            tracing::info!(pending, "discarding unsaved changes");
        }
        Ok(())
    }

    fn replace_page(&mut self, request: PageRequest, total: u64, rows: Vec<Row>) {
        self.page = request;
        self.total_records = total;
        self.current = rows.iter().cloned().map(RowSnapshot::unchanged).collect();
        self.original = rows;
        self.state = SessionState::Loaded;
        self.last_error = None;
    }

    async fn load(
        &mut self,
        predicate: Predicate,
        page: i64,
        token: &CancellationToken,
    ) -> ServiceResult<()> {
        let mut request = PageRequest::new(page, self.page.page_size);
        let (mut total, mut rows) = self.fetch(&predicate, request, token).await?;

        // Past the end (rows removed since the last count): show the last page
        let last_page = total_pages(total, request.page_size);
        if rows.is_empty() && last_page > 0 && request.page > last_page {
            request = PageRequest::new(last_page as i64, request.page_size);
            (total, rows) = self.fetch(&predicate, request, token).await?;
        }

        tracing::debug!(
            table = %self.table,
            page = request.page,
            rows = rows.len(),
            total,
            "page loaded"
        );
        self.predicate = predicate;
        self.replace_page(request, total, rows);
        Ok(())
    }

    /// Load `page` (clamped to at least 1) under the current filters
    pub async fn load_page(
        &mut self,
        page: i64,
        policy: DiscardPolicy,
        token: &CancellationToken,
    ) -> ServiceResult<()> {
        self.guard_pending(policy)?;
        self.load(self.predicate.clone(), page, token).await
    }

    /// Replace the filters and load the first page
    pub async fn apply_filters(
        &mut self,
        filters: FilterSpec,
        policy: DiscardPolicy,
        token: &CancellationToken,
    ) -> ServiceResult<()> {
        self.guard_pending(policy)?;
        let predicate = FilterBuilder::build(&self.schema, &filters, self.connection.dialect())?;
        self.load(predicate, 1, token).await?;
        self.filters = filters;
        Ok(())
    }

    pub async fn clear_filters(
        &mut self,
        policy: DiscardPolicy,
        token: &CancellationToken,
    ) -> ServiceResult<()> {
        self.apply_filters(FilterSpec::new(), policy, token).await
    }

    /// Move forward one page; `false` when already on the last page
    pub async fn next_page(
        &mut self,
        policy: DiscardPolicy,
        token: &CancellationToken,
    ) -> ServiceResult<bool> {
        if self.page.page >= self.total_pages() {
            return Ok(false);
        }
        self.load_page(self.page.page as i64 + 1, policy, token).await?;
        Ok(true)
    }

    /// Move back one page; `false` when already on the first page
    pub async fn previous_page(
        &mut self,
        policy: DiscardPolicy,
        token: &CancellationToken,
    ) -> ServiceResult<bool> {
        if self.page.page <= 1 {
            return Ok(false);
        }
        self.load_page(self.page.page as i64 - 1, policy, token).await?;
        Ok(true)
    }

    /// Clear the filters and reload the first page
    pub async fn refresh(
        &mut self,
        policy: DiscardPolicy,
        token: &CancellationToken,
    ) -> ServiceResult<()> {
        self.clear_filters(policy, token).await
    }

    // ============ Editing ============

    /// Build a full row from `(column, text)` pairs, parsing each value for
    /// its column. Columns not mentioned are null.
    pub fn parse_record<'a, I>(&self, fields: I) -> ServiceResult<Row>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut row = self.blank_row();
        for (name, text) in fields {
            let column = self.schema.validate_identifier(name)?;
            row.set(&column.name, parse_cell_value(column, text)?);
        }
        Ok(row)
    }

    fn blank_row(&self) -> Row {
        Row::new(
            self.schema.column_names().map(str::to_string).collect(),
            vec![Value::Null; self.schema.columns().len()],
        )
    }

    /// Append a new row to the buffer; returns its index.
    ///
    /// Values are taken by column name; the row is rejected with
    /// `ValidationFailed` when a required field is empty.
    pub fn add_row(&mut self, values: Row) -> ServiceResult<usize> {
        let mut row = self.blank_row();
        for (name, value) in values.iter() {
            let column = self.schema.validate_identifier(name)?;
            row.set(&column.name, value.clone());
        }

        let errors = validate_record(&self.schema, &row, self.profile.as_ref());
        if !errors.is_empty() {
            return Err(ServiceError::ValidationFailed(errors));
        }

        self.current.push(RowSnapshot::added(row));
        self.state = SessionState::Editing;
        Ok(self.current.len() - 1)
    }

    /// Set one cell from user-entered text
    pub fn update_cell(&mut self, index: usize, column: &str, text: &str) -> ServiceResult<()> {
        let column = self.schema.validate_identifier(column)?;
        if column.is_identity {
            return Err(ServiceError::ValidationFailed(vec![format!(
                "{} is generated by the database and cannot be edited",
                column.name
            )]));
        }
        let value = parse_cell_value(column, text)?;
        let name = column.name.clone();

        let snapshot = self.editable_row(index)?;
        snapshot.row.set(&name, value);
        if snapshot.state == RowState::Unchanged {
            snapshot.state = RowState::Modified;
        }
        self.state = SessionState::Editing;
        Ok(())
    }

    /// Mark a loaded row deleted, or drop a row added in this session
    pub fn delete_row(&mut self, index: usize) -> ServiceResult<()> {
        let snapshot = self.editable_row(index)?;
        if snapshot.state == RowState::Added {
            self.current.remove(index);
        } else {
            snapshot.state = RowState::Deleted;
        }
        self.state = SessionState::Editing;
        Ok(())
    }

    fn editable_row(&mut self, index: usize) -> ServiceResult<&mut RowSnapshot> {
        match self.current.get_mut(index) {
            Some(snapshot) if snapshot.state != RowState::Deleted => Ok(snapshot),
            Some(_) => Err(ServiceError::InvalidState(format!(
                "row {} is marked for deletion",
                index
            ))),
            None => Err(ServiceError::InvalidState(format!(
                "row {} does not exist",
                index
            ))),
        }
    }

    fn changes_for(&self, current: &[RowSnapshot]) -> ChangeSet {
        let keys = self.schema.primary_key();
        if !keys.is_empty() {
            return diff(&self.original, current, keys, &self.compare);
        }

        // Without a key, rows can only be matched by buffer position.
        // Loaded rows keep their index; added rows are appended after them.
        let mut changes = ChangeSet::default();
        for (index, snapshot) in current.iter().enumerate() {
            match (snapshot.state, self.original.get(index)) {
                (RowState::Added, _) | (_, None) => changes.added.push(snapshot.row.clone()),
                (RowState::Deleted, Some(original)) => changes.deleted.push(original.clone()),
                (RowState::Modified, Some(original)) => {
                    let changed = changed_columns(original, &snapshot.row, &self.compare);
                    if !changed.is_empty() {
                        changes.modified.push(ModifiedRow {
                            original: original.clone(),
                            current: snapshot.row.clone(),
                            changed_columns: changed,
                        });
                    }
                }
                (RowState::Unchanged, Some(_)) => {}
            }
        }
        changes
    }

    /// What a save would write right now
    pub fn pending_changes(&self) -> ChangeSet {
        if matches!(self.state, SessionState::Unloaded | SessionState::Loaded) {
            return ChangeSet::default();
        }
        self.changes_for(&self.current)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending_changes().is_empty()
    }

    /// Write the pending changes in one transaction.
    ///
    /// On success the saved buffer becomes the loaded page, re-read from the
    /// database when rows were inserted. On failure the
    /// buffer is kept as it was and the session moves to `SaveFailed`;
    /// cancellation leaves the state untouched.
    #[tracing::instrument(skip_all, fields(table = %self.table))]
    pub async fn save(&mut self, token: &CancellationToken) -> ServiceResult<SaveSummary> {
        if self.pending_changes().is_empty() {
            if self.state != SessionState::Unloaded {
                self.state = SessionState::Loaded;
            }
            return Ok(SaveSummary::default());
        }

        match self.write(token).await {
            Ok((summary, saved)) => {
                self.total_records = (self.total_records + summary.inserted as u64)
                    .saturating_sub(summary.deleted as u64);
                let rows: Vec<Row> = saved.into_iter().map(|s| s.row).collect();
                self.replace_page(self.page, self.total_records, rows);
                if summary.inserted > 0 {
                    // Inserted rows lack identity and default values until re-read
                    let page = self.page.page as i64;
                    if let Err(err) = self.load(self.predicate.clone(), page, token).await {
                        tracing::warn!(error = %err, "reload after save failed, showing saved rows");
                    }
                }
                Ok(summary)
            }
            Err(ServiceError::Cancelled) => Err(ServiceError::Cancelled),
            Err(err) => {
                tracing::warn!(error = %err, "save failed, edits kept");
                self.state = SessionState::SaveFailed;
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    async fn write(
        &self,
        token: &CancellationToken,
    ) -> ServiceResult<(SaveSummary, Vec<RowSnapshot>)> {
        let mut staged = self.current.clone();

        let mut errors = Vec::new();
        if let Some(profile) = &self.profile {
            for snapshot in staged
                .iter()
                .filter(|s| matches!(s.state, RowState::Added | RowState::Modified))
            {
                errors.extend(profile.validate(&snapshot.row));
            }
        }
        if !errors.is_empty() {
            return Err(ServiceError::ValidationFailed(errors));
        }

        let connection = self.connection.as_ref();
        let mut added: Vec<Row> = staged
            .iter()
            .filter(|s| s.state == RowState::Added)
            .map(|s| s.row.clone())
            .collect();
        let plan = run_cancellable(
            token,
            AutoIncrementResolver::resolve(connection, &self.schema, &added),
        )
        .await?;
        if AutoIncrementResolver::apply(&plan, &mut added) > 0 {
            let targets = staged.iter_mut().filter(|s| s.state == RowState::Added);
            for (snapshot, row) in targets.zip(added) {
                snapshot.row = row;
            }
        }

        let changes = self.changes_for(&staged);
        let summary = ChangeWriter::persist(connection, &self.schema, &changes, token).await?;

        staged.retain(|s| s.state != RowState::Deleted);
        Ok((summary, staged))
    }

    /// Throw away every edit
    pub fn cancel(&mut self) {
        self.current = self.original.iter().cloned().map(RowSnapshot::unchanged).collect();
        if self.state != SessionState::Unloaded {
            self.state = SessionState::Loaded;
        }
        self.last_error = None;
    }

    // ============ Keys ============

    /// Use `keys` as row identity instead of the declared primary key
    pub fn select_key_columns(&mut self, keys: &[String]) -> ServiceResult<()> {
        for key in keys {
            self.described.validate_identifier(key)?;
        }
        self.schema = self.described.with_key_columns(keys)?;
        tracing::debug!(keys = ?self.schema.primary_key(), "key columns selected");
        Ok(())
    }

    /// Make `column` the table's primary key and re-describe the table
    pub async fn promote_key(&mut self, column: &str, token: &CancellationToken) -> ServiceResult<()> {
        let connection = self.connection.as_ref();
        KeyPromotion::promote(connection, &self.described, column, token).await?;

        self.schema_service.invalidate(&self.table);
        let described = run_cancellable(
            token,
            self.schema_service.describe(connection, &self.table),
        )
        .await?;
        self.schema = described.clone();
        self.described = described;
        Ok(())
    }
}
