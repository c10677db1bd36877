//! Integration tests for SchemaService and CatalogService

mod common;

use pretty_assertions::assert_eq;
use tabler_core::{ColumnInfo, TypeCategory};
use tabler_services::{CatalogService, SchemaService, ServiceError, TableRef};

use common::{MockConnection, car_columns};

// ============ Describe Tests ============

#[tokio::test]
async fn describe_categorizes_columns_and_flags_keys() {
    let conn = MockConnection::new().with_table(car_columns(), &["Id"]);
    let service = SchemaService::new();

    let schema = service
        .describe(&conn, &TableRef::new("Cars").in_schema("dbo"))
        .await
        .expect("should describe table");

    assert_eq!(schema.name(), "Cars");
    assert_eq!(schema.schema(), Some("dbo"));
    assert_eq!(schema.primary_key(), &["Id".to_string()]);

    let categories: Vec<_> = schema.columns().iter().map(|c| c.category).collect();
    assert_eq!(
        categories,
        vec![
            TypeCategory::Integer,
            TypeCategory::Text,
            TypeCategory::Text,
            TypeCategory::Integer,
            TypeCategory::Decimal,
        ]
    );
    assert!(schema.column("Id").is_some_and(|c| c.is_identity && c.is_primary_key));
    assert!(schema.column("Price").is_some_and(|c| c.nullable));
}

#[tokio::test]
async fn describe_table_without_primary_key() {
    let conn = MockConnection::new().with_table(
        vec![
            ColumnInfo::new("Code", 0, "varchar"),
            ColumnInfo::new("Amount", 1, "money"),
        ],
        &[],
    );
    let schema = SchemaService::new()
        .describe(&conn, &TableRef::new("Imports"))
        .await
        .expect("keyless tables are valid");

    assert!(!schema.has_primary_key());
    assert!(schema.columns().iter().all(|c| !c.is_primary_key));
}

#[tokio::test]
async fn describe_missing_table_is_not_found() {
    let conn = MockConnection::new();
    let err = SchemaService::new()
        .describe(&conn, &TableRef::new("Nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TableNotFound(name) if name == "Nope"));
}

#[tokio::test]
async fn describe_surfaces_catalog_failures() {
    let conn = MockConnection::new().with_failure();
    let err = SchemaService::new()
        .describe(&conn, &TableRef::new("Cars"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SchemaLoadFailed(_)));
}

// ============ Cache Tests ============

#[tokio::test]
async fn describe_is_cached_until_invalidated() {
    let conn = MockConnection::new().with_table(car_columns(), &["Id"]);
    let service = SchemaService::new();
    let table = TableRef::new("Cars").in_database("Garage");

    service.describe(&conn, &table).await.unwrap();
    assert!(service.is_cached(&table));
    assert!(!service.is_cached(&TableRef::new("Cars")));

    // A cached description survives the catalog going away
    let broken = MockConnection::new().with_failure();
    assert!(service.describe(&broken, &table).await.is_ok());

    service.invalidate(&table);
    assert!(!service.is_cached(&table));
    assert!(service.describe(&broken, &table).await.is_err());
}

#[tokio::test]
async fn clear_drops_every_entry() {
    let conn = MockConnection::new().with_table(car_columns(), &["Id"]);
    let service = SchemaService::new();
    service.describe(&conn, &TableRef::new("Cars")).await.unwrap();
    service.describe(&conn, &TableRef::new("Trucks")).await.unwrap();

    service.clear();
    assert!(!service.is_cached(&TableRef::new("Cars")));
    assert!(!service.is_cached(&TableRef::new("Trucks")));
}

// ============ Catalog Tests ============

#[tokio::test]
async fn list_databases_sorted() {
    let conn = MockConnection::new().with_catalog(&["Sales", "Garage", "HR"], &[]);
    let names = CatalogService::list_databases(&conn).await.unwrap();
    assert_eq!(names, vec!["Garage", "HR", "Sales"]);
}

#[tokio::test]
async fn list_tables_sorted_by_name() {
    let conn = MockConnection::new().with_catalog(&[], &["Employees", "Cars"]);
    let tables = CatalogService::list_tables(&conn, Some("dbo")).await.unwrap();
    let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Cars", "Employees"]);
    assert!(tables.iter().all(|t| t.schema.as_deref() == Some("dbo")));
}

#[tokio::test]
async fn catalog_failures_are_schema_errors() {
    let conn = MockConnection::new().with_failure();
    assert!(matches!(
        CatalogService::list_databases(&conn).await,
        Err(ServiceError::SchemaLoadFailed(_))
    ));
}
