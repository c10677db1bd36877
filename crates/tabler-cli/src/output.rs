//! Terminal rendering with comfy-table

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use tabler_core::{TableInfo, TableSchema, Value, sized_type_sql};
use tabler_services::{ChangeSet, RowSnapshot, RowState, SaveSummary};

fn new_table<I, S>(header: I) -> Table
where
    I: IntoIterator<Item = S>,
    S: ToString,
{
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.into_iter().map(|h| h.to_string()).collect::<Vec<_>>());
    table
}

fn flag(set: bool) -> &'static str {
    if set { "yes" } else { "" }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(value) => value.to_string(),
    }
}

pub fn databases_table(names: &[String]) -> Table {
    let mut table = new_table(["Database"]);
    for name in names {
        table.add_row(vec![name.clone()]);
    }
    table
}

pub fn tables_table(tables: &[TableInfo]) -> Table {
    let mut table = new_table(["Schema", "Table", "Rows"]);
    for info in tables {
        table.add_row(vec![
            info.schema.clone().unwrap_or_default(),
            info.name.clone(),
            info.row_count.map(|c| c.to_string()).unwrap_or_default(),
        ]);
    }
    table
}

pub fn schema_table(schema: &TableSchema) -> Table {
    let mut table = new_table(["Column", "Type", "Category", "Nullable", "Key", "Identity", "Default"]);
    for column in schema.columns() {
        let declared = sized_type_sql(column).unwrap_or_else(|| column.data_type.clone());
        table.add_row(vec![
            column.name.clone(),
            declared,
            column.category.to_string(),
            flag(column.nullable).to_string(),
            flag(schema.primary_key().contains(&column.name)).to_string(),
            flag(column.is_identity).to_string(),
            column.default_value.clone().unwrap_or_default(),
        ]);
    }
    table
}

fn state_marker(state: RowState) -> &'static str {
    match state {
        RowState::Unchanged => "",
        RowState::Added => "+",
        RowState::Modified => "*",
        RowState::Deleted => "-",
    }
}

/// Buffered rows with their index and edit marker
pub fn rows_table(columns: &[String], rows: &[RowSnapshot]) -> Table {
    let header = ["#".to_string(), String::new()]
        .into_iter()
        .chain(columns.iter().cloned());
    let mut table = new_table(header);
    for (index, snapshot) in rows.iter().enumerate() {
        let mut line = vec![index.to_string(), state_marker(snapshot.state).to_string()];
        line.extend(columns.iter().map(|c| cell(snapshot.row.get_by_name(c))));
        table.add_row(line);
    }
    table
}

pub fn page_footer(page: u64, total_pages: u64, total_records: u64) -> String {
    let noun = if total_records == 1 { "record" } else { "records" };
    format!(
        "Page {} of {} ({} {})",
        page,
        total_pages.max(1),
        total_records,
        noun
    )
}

/// What a save would write, one line per row
pub fn change_lines(changes: &ChangeSet, key_columns: &[String]) -> Vec<String> {
    let key_text = |row: &tabler_core::Row| {
        key_columns
            .iter()
            .map(|k| format!("{}={}", k, cell(row.get_by_name(k))))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut lines = Vec::with_capacity(changes.len());
    for row in &changes.deleted {
        lines.push(format!("delete  {}", key_text(row)));
    }
    for modified in &changes.modified {
        let sets = modified
            .changed_columns
            .iter()
            .map(|c| format!("{}={}", c, cell(modified.current.get_by_name(c))))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("update  {} set {}", key_text(&modified.original), sets));
    }
    for row in &changes.added {
        let values = row
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(c, v)| format!("{}={}", c, v))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("insert  {}", values));
    }
    lines
}

pub fn save_summary(summary: &SaveSummary) -> String {
    format!(
        "Saved: {} inserted, {} updated, {} deleted",
        summary.inserted, summary.updated, summary.deleted
    )
}
