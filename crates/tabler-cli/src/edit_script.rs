//! JSON edit scripts for `tabler apply`
//!
//! ```json
//! {
//!   "page": 2,
//!   "filters": [{ "column": "Make", "text": "ford" }],
//!   "key_columns": ["Vin"],
//!   "edits": [
//!     { "op": "add", "values": { "Make": "Kia", "Price": 18500 } },
//!     { "op": "update", "row": 0, "values": { "Price": "21000.50" } },
//!     { "op": "delete", "row": 3 }
//!   ]
//! }
//! ```
//!
//! Row indexes refer to the loaded page, starting at 0. Rows added by the
//! script are appended after the loaded rows.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tabler_services::{CancellationToken, DiscardPolicy, FilterEntry, FilterSpec, TableSession};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditScript {
    /// Page to load before editing; the first page when absent
    pub page: Option<i64>,
    pub filters: Vec<FilterEntry>,
    /// Row identity override for tables without a usable primary key
    pub key_columns: Vec<String>,
    pub edits: Vec<Edit>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Edit {
    Add {
        values: BTreeMap<String, serde_json::Value>,
    },
    Update {
        row: usize,
        values: BTreeMap<String, serde_json::Value>,
    },
    Delete {
        row: usize,
    },
}

impl EditScript {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read edit script {:?}", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse edit script")
    }

    /// Load the page the script names into a fresh session and buffer every
    /// edit. Nothing is written.
    pub async fn apply(&self, session: &mut TableSession, token: &CancellationToken) -> Result<()> {
        if !self.key_columns.is_empty() {
            session.select_key_columns(&self.key_columns)?;
        }

        if !self.filters.is_empty() {
            let mut spec = FilterSpec::new();
            for entry in &self.filters {
                spec.push(entry.clone())?;
            }
            session
                .apply_filters(spec, DiscardPolicy::KeepPending, token)
                .await?;
        }
        match self.page {
            Some(page) => {
                session
                    .load_page(page, DiscardPolicy::KeepPending, token)
                    .await?
            }
            None if self.filters.is_empty() => {
                session
                    .load_page(1, DiscardPolicy::KeepPending, token)
                    .await?
            }
            None => {}
        }

        for (position, edit) in self.edits.iter().enumerate() {
            apply_edit(session, edit)
                .with_context(|| format!("edit #{} ({}) rejected", position + 1, edit.op()))?;
        }
        Ok(())
    }
}

impl Edit {
    pub fn op(&self) -> &'static str {
        match self {
            Edit::Add { .. } => "add",
            Edit::Update { .. } => "update",
            Edit::Delete { .. } => "delete",
        }
    }
}

fn apply_edit(session: &mut TableSession, edit: &Edit) -> Result<()> {
    match edit {
        Edit::Add { values } => {
            let texts = to_texts(values);
            let row = session.parse_record(texts.iter().map(|(c, t)| (c.as_str(), t.as_str())))?;
            let index = session.add_row(row)?;
            tracing::debug!(index, "row added");
        }
        Edit::Update { row, values } => {
            if values.is_empty() {
                bail!("update of row {} sets no columns", row);
            }
            for (column, text) in to_texts(values) {
                session.update_cell(*row, &column, &text)?;
            }
        }
        Edit::Delete { row } => session.delete_row(*row)?,
    }
    Ok(())
}

/// Script values are entered like typed cell text: strings as written,
/// numbers and booleans in their JSON spelling, null as an empty cell.
fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_texts(values: &BTreeMap<String, serde_json::Value>) -> Vec<(String, String)> {
    values
        .iter()
        .map(|(column, value)| (column.clone(), cell_text(value)))
        .collect()
}
