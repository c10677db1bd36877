//! Integration tests for transactional saves and key promotion

mod common;

use pretty_assertions::assert_eq;
use tabler_core::{ColumnInfo, Row, TableSchema, TypeCategory, Value};
use tabler_services::{
    CancellationToken, ChangeSet, ChangeWriter, KeyPromotion, ModifiedRow, SaveSummary,
    ServiceError,
};

use common::MockConnection;

fn cars_schema() -> TableSchema {
    TableSchema::new(
        None,
        "Cars",
        vec![
            ColumnInfo::new("Id", 0, "int")
                .with_category(TypeCategory::Integer)
                .identity(),
            ColumnInfo::new("Make", 1, "nvarchar")
                .with_category(TypeCategory::Text)
                .not_null(),
            ColumnInfo::new("Year", 2, "int").with_category(TypeCategory::Integer),
        ],
        vec!["Id".into()],
    )
    .unwrap()
}

fn car(id: i32, make: &str, year: i32) -> Row {
    Row::from_pairs([
        ("Id", Value::Int32(id)),
        ("Make", Value::String(make.into())),
        ("Year", Value::Int32(year)),
    ])
}

fn mixed_changes() -> ChangeSet {
    let original = car(2, "Audi", 2019);
    let mut current = original.clone();
    current.set("Year", Value::Int32(2020));
    ChangeSet {
        added: vec![car(0, "Kia", 2024)],
        modified: vec![ModifiedRow {
            original,
            current,
            changed_columns: vec!["Year".into()],
        }],
        deleted: vec![car(1, "Ford", 2015)],
    }
}

// ============ Persist Tests ============

#[tokio::test]
async fn persist_runs_one_transaction_in_order() {
    let conn = MockConnection::new();
    let summary = ChangeWriter::persist(&conn, &cars_schema(), &mixed_changes(), &CancellationToken::new())
        .await
        .expect("save should succeed");

    assert_eq!(
        summary,
        SaveSummary {
            inserted: 1,
            updated: 1,
            deleted: 1
        }
    );
    assert_eq!(
        conn.executed(),
        vec![
            "DELETE FROM \"Cars\" WHERE \"Id\" = ?",
            "UPDATE \"Cars\" SET \"Year\" = ? WHERE \"Id\" = ?",
            "INSERT INTO \"Cars\" (\"Make\", \"Year\") VALUES (?, ?)",
        ]
    );

    let log = conn.transactions.lock();
    assert_eq!(log.begun, 1);
    assert_eq!(log.committed, 1);
    assert_eq!(log.rolled_back, 0);
    assert_eq!(log.statements[1].1, vec![Value::Int32(2020), Value::Int32(2)]);
}

#[tokio::test]
async fn persist_rolls_back_on_statement_error() {
    let conn = MockConnection::new().failing_execute_on("INSERT");
    let err = ChangeWriter::persist(&conn, &cars_schema(), &mixed_changes(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::SaveFailed(msg) if msg.contains("constraint violation")));
    let log = conn.transactions.lock();
    assert_eq!(log.committed, 0);
    assert_eq!(log.rolled_back, 1);
}

#[tokio::test]
async fn persist_treats_missing_row_as_conflict() {
    let conn = MockConnection::new().zero_rows_on("UPDATE");
    let err = ChangeWriter::persist(&conn, &cars_schema(), &mixed_changes(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::SaveFailed(_)));
    // The insert after the failed update never runs
    assert_eq!(conn.executed().len(), 2);
    assert_eq!(conn.transactions.lock().rolled_back, 1);
}

#[tokio::test]
async fn persist_with_nothing_to_do_skips_transaction() {
    let conn = MockConnection::new();
    let summary = ChangeWriter::persist(&conn, &cars_schema(), &ChangeSet::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.total(), 0);
    assert_eq!(conn.transactions.lock().begun, 0);
}

#[tokio::test]
async fn persist_cancelled_before_start_writes_nothing() {
    let conn = MockConnection::new();
    let token = CancellationToken::new();
    token.cancel();
    let err = ChangeWriter::persist(&conn, &cars_schema(), &mixed_changes(), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Cancelled));
    assert_eq!(conn.transactions.lock().begun, 0);
}

#[tokio::test]
async fn persist_cancelled_mid_statement_finishes_it_then_rolls_back() {
    let token = CancellationToken::new();
    let conn = MockConnection::new().cancelling_on_execute(token.clone());
    let err = ChangeWriter::persist(&conn, &cars_schema(), &mixed_changes(), &token)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Cancelled));
    // The DELETE in flight completes; the UPDATE and INSERT are never sent
    assert_eq!(conn.executed(), vec!["DELETE FROM \"Cars\" WHERE \"Id\" = ?"]);
    let log = conn.transactions.lock();
    assert_eq!(log.committed, 0);
    assert_eq!(log.rolled_back, 1);
}

#[tokio::test]
async fn persist_writes_nulls_as_literals() {
    let conn = MockConnection::new();
    let mut added = car(0, "Kia", 0);
    added.set("Year", Value::Null);
    let changes = ChangeSet {
        added: vec![added],
        ..Default::default()
    };
    ChangeWriter::persist(&conn, &cars_schema(), &changes, &CancellationToken::new())
        .await
        .unwrap();

    let log = conn.transactions.lock();
    assert_eq!(
        log.statements[0].0,
        "INSERT INTO \"Cars\" (\"Make\", \"Year\") VALUES (?, NULL)"
    );
    assert_eq!(log.statements[0].1, vec![Value::String("Kia".into())]);
}

#[tokio::test]
async fn persist_connection_failure_is_save_failure() {
    let conn = MockConnection::new().with_failure();
    let err = ChangeWriter::persist(&conn, &cars_schema(), &mixed_changes(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SaveFailed(_)));
}

// ============ Key Promotion Tests ============

#[tokio::test]
async fn promote_runs_ddl_in_transaction() {
    let conn = MockConnection::new();
    let schema = cars_schema().with_key_columns(&[]).unwrap();

    KeyPromotion::promote(&conn, &schema, "Year", &CancellationToken::new())
        .await
        .expect("promotion should succeed");

    assert_eq!(
        conn.executed(),
        vec![
            "ALTER TABLE \"Cars\" ALTER COLUMN \"Year\" SET NOT NULL",
            "ALTER TABLE \"Cars\" ADD CONSTRAINT \"PK_Cars\" PRIMARY KEY (\"Year\")",
        ]
    );
    assert_eq!(conn.transactions.lock().committed, 1);
}

#[tokio::test]
async fn promote_failure_rolls_back() {
    let conn = MockConnection::new().failing_execute_on("ADD CONSTRAINT");
    let schema = cars_schema().with_key_columns(&[]).unwrap();

    let err = KeyPromotion::promote(&conn, &schema, "Year", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TableOperationFailed(_)));
    assert_eq!(conn.transactions.lock().rolled_back, 1);
}

#[tokio::test]
async fn promote_cancelled_between_statements_rolls_back() {
    let token = CancellationToken::new();
    let conn = MockConnection::new().cancelling_on_execute(token.clone());
    let schema = cars_schema().with_key_columns(&[]).unwrap();

    let err = KeyPromotion::promote(&conn, &schema, "Year", &token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Cancelled));
    assert_eq!(
        conn.executed(),
        vec!["ALTER TABLE \"Cars\" ALTER COLUMN \"Year\" SET NOT NULL"]
    );
    let log = conn.transactions.lock();
    assert_eq!(log.committed, 0);
    assert_eq!(log.rolled_back, 1);
}
