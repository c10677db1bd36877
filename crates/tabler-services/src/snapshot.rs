//! Row snapshots and the differ that turns two generations into a change set

use serde::{Deserialize, Serialize};
use tabler_core::{Row, Value};

/// Edit state of one buffered row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowState {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

/// A buffered row and its edit state
#[derive(Debug, Clone, PartialEq)]
pub struct RowSnapshot {
    pub row: Row,
    pub state: RowState,
}

impl RowSnapshot {
    pub fn unchanged(row: Row) -> Self {
        Self {
            row,
            state: RowState::Unchanged,
        }
    }

    pub fn added(row: Row) -> Self {
        Self {
            row,
            state: RowState::Added,
        }
    }
}

/// Which columns decide whether a matched row changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnSelection {
    /// Every column present in either generation
    All,
    /// Only the listed columns
    Only(Vec<String>),
}

impl ColumnSelection {
    fn columns(&self, original: &Row, current: &Row) -> Vec<String> {
        match self {
            ColumnSelection::Only(columns) => columns.clone(),
            ColumnSelection::All => {
                let mut columns: Vec<String> = original.columns().to_vec();
                for name in current.columns() {
                    if original.column_index(name).is_none() {
                        columns.push(name.clone());
                    }
                }
                columns
            }
        }
    }
}

/// A matched row whose compared values differ
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedRow {
    pub original: Row,
    pub current: Row,
    /// Compared columns whose values differ, in comparison order
    pub changed_columns: Vec<String>,
}

/// Rows to insert, update and delete
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub added: Vec<Row>,
    pub modified: Vec<ModifiedRow>,
    pub deleted: Vec<Row>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }
}

fn value_of<'a>(row: &'a Row, column: &str) -> &'a Value {
    row.get_by_name(column).unwrap_or(&Value::Null)
}

/// Compared columns whose values differ between two versions of a row
pub fn changed_columns(original: &Row, current: &Row, compare: &ColumnSelection) -> Vec<String> {
    compare
        .columns(original, current)
        .into_iter()
        .filter(|c| !value_of(original, c).same_as(value_of(current, c)))
        .collect()
}

fn same_key(a: &Row, b: &Row, key_columns: &[String]) -> bool {
    key_columns
        .iter()
        .all(|k| value_of(a, k).same_as(value_of(b, k)))
}

/// Compare the loaded generation with the edited one.
///
/// Rows are matched by their key values. With an empty key set nothing can
/// be matched, so every current row is added and every original row deleted.
/// Rows marked `Added` are always inserts; rows marked `Deleted` delete the
/// original they match. Originals with no surviving match are deleted.
/// Matched rows whose compared values are all equal are left out.
pub fn diff(
    original: &[Row],
    current: &[RowSnapshot],
    key_columns: &[String],
    compare: &ColumnSelection,
) -> ChangeSet {
    let mut changes = ChangeSet::default();
    let mut matched = vec![false; original.len()];

    let find_original = |row: &Row, matched: &mut [bool]| -> Option<usize> {
        if key_columns.is_empty() {
            return None;
        }
        let index = original
            .iter()
            .enumerate()
            .position(|(i, candidate)| !matched[i] && same_key(candidate, row, key_columns))?;
        matched[index] = true;
        Some(index)
    };

    for snapshot in current {
        match snapshot.state {
            RowState::Added => changes.added.push(snapshot.row.clone()),
            RowState::Deleted => {
                // An added row deleted before saving has no original to remove
                if let Some(index) = find_original(&snapshot.row, &mut matched) {
                    changes.deleted.push(original[index].clone());
                }
            }
            RowState::Unchanged | RowState::Modified => {
                match find_original(&snapshot.row, &mut matched) {
                    Some(index) => {
                        let before = &original[index];
                        let changed_columns = changed_columns(before, &snapshot.row, compare);
                        if !changed_columns.is_empty() {
                            changes.modified.push(ModifiedRow {
                                original: before.clone(),
                                current: snapshot.row.clone(),
                                changed_columns,
                            });
                        }
                    }
                    None => changes.added.push(snapshot.row.clone()),
                }
            }
        }
    }

    changes.deleted.extend(
        original
            .iter()
            .zip(matched)
            .filter(|(_, was_matched)| !was_matched)
            .map(|(row, _)| row.clone()),
    );

    changes
}
