//! Tests for MS SQL Server value conversion

use crate::connection::{
    MssqlConnectionError, TiberiusParam, column_data_to_value, values_to_tiberius_params,
};
use chrono::{NaiveDate, NaiveTime};
use std::borrow::Cow;
use tabler_core::{TablerError, Value};
use tiberius::{ColumnData, ToSql};

// Value -> parameter conversion

#[test]
fn test_params_keep_position_and_count() {
    let params = values_to_tiberius_params(&[
        Value::Null,
        Value::Int32(7),
        Value::String("Ford".into()),
    ])
    .unwrap();
    assert_eq!(params.len(), 3);
    assert!(matches!(params[0], TiberiusParam::Null));
    assert!(matches!(params[1], TiberiusParam::I32(7)));
    assert!(matches!(&params[2], TiberiusParam::String(s) if s == "Ford"));
}

#[test]
fn test_decimal_param_travels_as_text() {
    let params = values_to_tiberius_params(&[Value::Decimal("12.50".into())]).unwrap();
    match params[0].to_sql() {
        ColumnData::String(Some(s)) => assert_eq!(s, "12.50"),
        other => panic!("unexpected column data: {:?}", other),
    }
}

#[test]
fn test_date_param_uses_native_type() {
    let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let params = values_to_tiberius_params(&[Value::Date(date)]).unwrap();
    assert!(matches!(params[0], TiberiusParam::Date(d) if d == date));
    assert!(matches!(params[0].to_sql(), ColumnData::Date(Some(_))));
}

#[test]
fn test_null_param_is_typed_null() {
    let params = values_to_tiberius_params(&[Value::Null]).unwrap();
    assert!(matches!(params[0].to_sql(), ColumnData::I32(None)));
}

// ColumnData -> Value conversion

#[test]
fn test_null_column_data_becomes_null() {
    assert_eq!(column_data_to_value(ColumnData::I32(None)).unwrap(), Value::Null);
    assert_eq!(column_data_to_value(ColumnData::String(None)).unwrap(), Value::Null);
    assert_eq!(column_data_to_value(ColumnData::Date(None)).unwrap(), Value::Null);
}

#[test]
fn test_scalar_column_data() {
    assert_eq!(
        column_data_to_value(ColumnData::U8(Some(200))).unwrap(),
        Value::Int16(200)
    );
    assert_eq!(
        column_data_to_value(ColumnData::I64(Some(9_000_000_000))).unwrap(),
        Value::Int64(9_000_000_000)
    );
    assert_eq!(
        column_data_to_value(ColumnData::Bit(Some(true))).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        column_data_to_value(ColumnData::String(Some(Cow::Owned("Focus".into())))).unwrap(),
        Value::String("Focus".into())
    );
}

#[test]
fn test_date_round_trips_through_column_data() {
    let date = NaiveDate::from_ymd_opt(2023, 11, 5).unwrap();
    let data = match date.to_sql() {
        ColumnData::Date(d) => ColumnData::Date(d),
        other => panic!("unexpected column data: {:?}", other),
    };
    assert_eq!(column_data_to_value(data).unwrap(), Value::Date(date));
}

#[test]
fn test_time_respects_scale() {
    let time = NaiveTime::from_hms_milli_opt(13, 45, 30, 250).unwrap();
    let data = match time.to_sql() {
        ColumnData::Time(t) => ColumnData::Time(t),
        other => panic!("unexpected column data: {:?}", other),
    };
    assert_eq!(column_data_to_value(data).unwrap(), Value::Time(time));
}

// Error mapping

#[test]
fn test_connection_errors_map_to_connection() {
    let err: TablerError = MssqlConnectionError::ConnectionClosed.into();
    assert!(matches!(err, TablerError::Connection(_)));

    let err: TablerError = MssqlConnectionError::QueryFailed("deadlock".into()).into();
    assert!(matches!(err, TablerError::Query(msg) if msg.contains("deadlock")));

    let err: TablerError = MssqlConnectionError::TypeConversion("bad".into()).into();
    assert!(matches!(err, TablerError::Driver(_)));
}
