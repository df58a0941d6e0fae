//! End-to-end shaping through the engine with a canned-row adapter: type
//! coercion, JSON relation decoding, and unwrap modes.

mod common;

use serde_json::json;

use common::{engine, row, StubAdapter};
use sqlweave::ast::Method;
use sqlweave::dialect::Dialect;
use sqlweave::error::QueryError;
use sqlweave_values::values::Value;

#[tokio::test]
async fn rows_become_typed_objects() -> anyhow::Result<()> {
    let adapter = StubAdapter::new(vec![
        row(&[
            ("id", Value::Int64(1)),
            ("email", Value::String("ada@lovelace.dev".into())),
            ("createdAt", Value::String("2024-03-01 10:30:00".into())),
        ]),
        row(&[
            ("id", Value::Int64(2)),
            ("email", Value::String("grace@hopper.dev".into())),
            ("createdAt", Value::String("2024-03-02T08:00:00Z".into())),
        ]),
    ]);
    let shaped = engine(Dialect::Sqlite)
        .query(
            &adapter,
            "User",
            Method::FindMany,
            &json!({"select": {"id": true, "email": true, "createdAt": true}}),
        )
        .await?;
    assert_eq!(
        shaped,
        json!([
            {"id": 1, "email": "ada@lovelace.dev", "createdAt": "2024-03-01T10:30:00.000Z"},
            {"id": 2, "email": "grace@hopper.dev", "createdAt": "2024-03-02T08:00:00.000Z"}
        ])
    );
    Ok(())
}

#[tokio::test]
async fn postgres_datetime_values_canonicalize() -> anyhow::Result<()> {
    use chrono::TimeZone;

    let created = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
    let adapter = StubAdapter::new(vec![row(&[
        ("id", Value::Int64(1)),
        ("createdAt", Value::DateTime(created)),
    ])]);
    let shaped = engine(Dialect::Postgres)
        .query(
            &adapter,
            "User",
            Method::FindMany,
            &json!({"select": {"id": true, "createdAt": true}}),
        )
        .await?;
    assert_eq!(shaped, json!([{"id": 1, "createdAt": "2024-03-01T10:30:00.000Z"}]));
    Ok(())
}

#[tokio::test]
async fn adapter_receives_the_compiled_statement() -> anyhow::Result<()> {
    let adapter = StubAdapter::new(vec![]);
    let engine = engine(Dialect::Postgres);
    let args = json!({"where": {"status": "ACTIVE"}});
    let compiled = engine.compile("User", Method::FindMany, &args)?;
    engine.query(&adapter, "User", Method::FindMany, &args).await?;

    let captured = adapter.captured.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].0, compiled.sql);
    assert_eq!(captured[0].1, compiled.params);
    Ok(())
}

#[tokio::test]
async fn json_relation_columns_decode_from_text_and_json() -> anyhow::Result<()> {
    let args = json!({
        "select": {"id": true, "assignedTasks": {"select": {"id": true, "title": true}}}
    });
    let expected = json!([
        {"id": 1, "assignedTasks": [{"id": 7, "title": "Ship it"}, {"id": 9, "title": "Fix it"}]}
    ]);

    // SQLite: JSON arrives as text.
    let adapter = StubAdapter::new(vec![row(&[
        ("id", Value::Int64(1)),
        (
            "assignedTasks",
            Value::String(r#"[{"id":7,"title":"Ship it"},{"id":9,"title":"Fix it"}]"#.into()),
        ),
    ])]);
    let shaped = engine(Dialect::Sqlite)
        .query(&adapter, "User", Method::FindMany, &args)
        .await?;
    assert_eq!(shaped, expected);

    // PostgreSQL: JSON arrives structured.
    let adapter = StubAdapter::new(vec![row(&[
        ("id", Value::Int64(1)),
        (
            "assignedTasks",
            Value::Json(json!([{"id": 7, "title": "Ship it"}, {"id": 9, "title": "Fix it"}])),
        ),
    ])]);
    let shaped = engine(Dialect::Postgres)
        .query(&adapter, "User", Method::FindMany, &args)
        .await?;
    assert_eq!(shaped, expected);
    Ok(())
}

#[tokio::test]
async fn malformed_relation_json_is_a_shape_mismatch() {
    let adapter = StubAdapter::new(vec![row(&[
        ("id", Value::Int64(1)),
        ("assignedTasks", Value::String("[oops".into())),
    ])]);
    let err = engine(Dialect::Sqlite)
        .query(
            &adapter,
            "User",
            Method::FindMany,
            &json!({"select": {"id": true, "assignedTasks": true}}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::ShapeMismatch { .. }), "{err}");
}

#[tokio::test]
async fn sqlite_booleans_and_decimals_normalize() -> anyhow::Result<()> {
    let adapter = StubAdapter::new(vec![row(&[
        ("id", Value::Int64(1)),
        ("budget", Value::String("12500.750000001".into())),
        ("archived", Value::Int64(0)),
    ])]);
    let shaped = engine(Dialect::Sqlite)
        .query(
            &adapter,
            "Project",
            Method::FindMany,
            &json!({"select": {"id": true, "budget": true, "archived": true}}),
        )
        .await?;
    assert_eq!(
        shaped,
        json!([{"id": 1, "budget": "12500.750000001", "archived": false}])
    );
    Ok(())
}

#[tokio::test]
async fn find_first_unwraps_to_a_singleton_or_null() -> anyhow::Result<()> {
    let engine = engine(Dialect::Postgres);
    let args = json!({"select": {"id": true}});

    let adapter = StubAdapter::new(vec![row(&[("id", Value::Int64(3))])]);
    let shaped = engine
        .query(&adapter, "User", Method::FindFirst, &args)
        .await?;
    assert_eq!(shaped, json!({"id": 3}));

    let adapter = StubAdapter::new(vec![]);
    let shaped = engine
        .query(&adapter, "User", Method::FindFirst, &args)
        .await?;
    assert_eq!(shaped, json!(null));
    Ok(())
}

#[tokio::test]
async fn count_unwraps_to_an_integer() -> anyhow::Result<()> {
    let adapter = StubAdapter::new(vec![row(&[("_count._all", Value::Int64(42))])]);
    let shaped = engine(Dialect::Postgres)
        .query(&adapter, "Task", Method::Count, &json!(null))
        .await?;
    assert_eq!(shaped, json!(42));
    Ok(())
}

#[tokio::test]
async fn aggregate_folds_dotted_columns_into_nested_objects() -> anyhow::Result<()> {
    let adapter = StubAdapter::new(vec![row(&[
        ("_count._all", Value::Int64(10)),
        ("_sum.position", Value::Int64(55)),
        ("_avg.position", Value::DecimalStr("5.5".into())),
    ])]);
    let shaped = engine(Dialect::Postgres)
        .query(
            &adapter,
            "Task",
            Method::Aggregate,
            &json!({"_count": {"_all": true}, "_sum": {"position": true}, "_avg": {"position": true}}),
        )
        .await?;
    assert_eq!(
        shaped,
        json!({"_count": {"_all": 10}, "_sum": {"position": 55}, "_avg": {"position": "5.5"}})
    );
    Ok(())
}

#[tokio::test]
async fn group_rows_carry_keys_and_aggregates() -> anyhow::Result<()> {
    let adapter = StubAdapter::new(vec![
        row(&[
            ("status", Value::String("DONE".into())),
            ("_count._all", Value::Int64(7)),
        ]),
        row(&[
            ("status", Value::String("OPEN".into())),
            ("_count._all", Value::Int64(2)),
        ]),
    ]);
    let shaped = engine(Dialect::Postgres)
        .query(
            &adapter,
            "Task",
            Method::GroupBy,
            &json!({"by": ["status"], "_count": {"_all": true}}),
        )
        .await?;
    assert_eq!(
        shaped,
        json!([
            {"status": "DONE", "_count": {"_all": 7}},
            {"status": "OPEN", "_count": {"_all": 2}}
        ])
    );
    Ok(())
}

#[tokio::test]
async fn relation_counts_shape_into_a_count_object() -> anyhow::Result<()> {
    let adapter = StubAdapter::new(vec![row(&[
        ("id", Value::Int64(1)),
        ("_count.assignedTasks", Value::Int64(4)),
    ])]);
    let shaped = engine(Dialect::Postgres)
        .query(
            &adapter,
            "User",
            Method::FindMany,
            &json!({"select": {"id": true, "_count": {"select": {"assignedTasks": true}}}}),
        )
        .await?;
    assert_eq!(shaped, json!([{"id": 1, "_count": {"assignedTasks": 4}}]));
    Ok(())
}

#[tokio::test]
async fn nested_to_one_objects_decode_recursively() -> anyhow::Result<()> {
    let adapter = StubAdapter::new(vec![row(&[
        ("id", Value::Int64(7)),
        (
            "assignee",
            Value::Json(json!({"id": 1, "email": "ada@lovelace.dev"})),
        ),
    ])]);
    let shaped = engine(Dialect::Postgres)
        .query(
            &adapter,
            "Task",
            Method::FindMany,
            &json!({"select": {"id": true, "assignee": {"select": {"id": true, "email": true}}}}),
        )
        .await?;
    assert_eq!(
        shaped,
        json!([{"id": 7, "assignee": {"id": 1, "email": "ada@lovelace.dev"}}])
    );

    let adapter = StubAdapter::new(vec![row(&[
        ("id", Value::Int64(8)),
        ("assignee", Value::Null),
    ])]);
    let shaped = engine(Dialect::Postgres)
        .query(
            &adapter,
            "Task",
            Method::FindMany,
            &json!({"select": {"id": true, "assignee": {"select": {"id": true, "email": true}}}}),
        )
        .await?;
    assert_eq!(shaped, json!([{"id": 8, "assignee": null}]));
    Ok(())
}

#[tokio::test]
async fn driver_errors_pass_through_untouched() {
    struct FailingAdapter;

    #[async_trait::async_trait]
    impl sqlweave::adapter::Adapter for FailingAdapter {
        async fn execute(
            &self,
            _sql: &str,
            _params: &[Value],
        ) -> Result<Vec<sqlweave_values::values::Row>, sqlweave::adapter::DriverError> {
            Err(sqlweave::adapter::DriverError::with_payload(
                "connection reset",
                json!({"code": "57P01"}),
            ))
        }
    }

    let err = engine(Dialect::Postgres)
        .query(&FailingAdapter, "User", Method::FindMany, &json!(null))
        .await
        .unwrap_err();
    let QueryError::Driver(driver) = err else {
        panic!("expected a driver error, got {err}");
    };
    assert_eq!(driver.payload, Some(json!({"code": "57P01"})));
}
