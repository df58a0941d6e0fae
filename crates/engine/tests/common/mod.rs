//! Shared fixture: a small task-tracker catalog plus a canned-row adapter.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use sqlweave::adapter::{Adapter, DriverError};
use sqlweave::dialect::Dialect;
use sqlweave::query::Engine;
use sqlweave_schema::catalog::Catalog;
use sqlweave_schema::document::CatalogDocument;
use sqlweave_values::values::{Row, Value};

pub static CATALOG: Lazy<Arc<Catalog>> = Lazy::new(|| {
    let document: CatalogDocument = serde_json::from_value(serde_json::json!({
        "models": [
            {
                "name": "User",
                "table": "users",
                "fields": [
                    {"name": "id", "type": "Int"},
                    {"name": "email", "type": "String"},
                    {"name": "name", "type": "String", "nullable": true},
                    {"name": "status", "type": "Enum"},
                    {"name": "createdAt", "type": "DateTime"},
                    {"name": "settings", "type": "Json", "nullable": true}
                ],
                "primaryKey": ["id"],
                "uniqueKeys": [["email"]],
                "relations": [
                    {
                        "name": "assignedTasks",
                        "kind": "oneToMany",
                        "model": "Task",
                        "localColumn": "id",
                        "foreignColumn": "assigneeId",
                        "backReference": "assignee"
                    }
                ]
            },
            {
                "name": "Project",
                "table": "projects",
                "fields": [
                    {"name": "id", "type": "Int"},
                    {"name": "name", "type": "String"},
                    {"name": "budget", "type": "Decimal", "nullable": true},
                    {"name": "archived", "type": "Bool"}
                ],
                "primaryKey": ["id"],
                "relations": [
                    {
                        "name": "tasks",
                        "kind": "oneToMany",
                        "model": "Task",
                        "localColumn": "id",
                        "foreignColumn": "projectId",
                        "backReference": "project"
                    }
                ]
            },
            {
                "name": "Task",
                "table": "tasks",
                "fields": [
                    {"name": "id", "type": "Int"},
                    {"name": "title", "type": "String"},
                    {"name": "status", "type": "Enum"},
                    {"name": "position", "type": "Int", "nullable": true},
                    {"name": "dueAt", "type": "DateTime", "nullable": true},
                    {"name": "assigneeId", "type": "Int", "nullable": true},
                    {"name": "projectId", "type": "Int"}
                ],
                "primaryKey": ["id"],
                "relations": [
                    {
                        "name": "assignee",
                        "kind": "manyToOne",
                        "model": "User",
                        "localColumn": "assigneeId",
                        "foreignColumn": "id",
                        "backReference": "assignedTasks"
                    },
                    {
                        "name": "project",
                        "kind": "manyToOne",
                        "model": "Project",
                        "localColumn": "projectId",
                        "foreignColumn": "id",
                        "backReference": "tasks"
                    },
                    {
                        "name": "tags",
                        "kind": "manyToMany",
                        "model": "Tag",
                        "joinModel": "TaskTag",
                        "sourceColumn": "taskId",
                        "targetColumn": "tagId",
                        "sourceKey": "id",
                        "targetKey": "id"
                    }
                ]
            },
            {
                "name": "Tag",
                "table": "tags",
                "fields": [
                    {"name": "id", "type": "Int"},
                    {"name": "name", "type": "String"}
                ],
                "primaryKey": ["id"],
                "relations": [
                    {
                        "name": "tasks",
                        "kind": "manyToMany",
                        "model": "Task",
                        "joinModel": "TaskTag",
                        "sourceColumn": "tagId",
                        "targetColumn": "taskId",
                        "sourceKey": "id",
                        "targetKey": "id"
                    }
                ]
            },
            {
                "name": "TaskTag",
                "table": "task_tags",
                "fields": [
                    {"name": "taskId", "type": "Int"},
                    {"name": "tagId", "type": "Int"}
                ],
                "primaryKey": ["taskId", "tagId"]
            }
        ]
    }))
    .expect("fixture document parses");
    Arc::new(Catalog::from_document(&document).expect("fixture catalog links"))
});

pub fn engine(dialect: Dialect) -> Engine {
    Engine::new(CATALOG.clone(), dialect)
}

/// Run tests with `RUST_LOG=sqlweave=info` to see the generated SQL.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Checks the §-observable placeholder contract: PostgreSQL indices are the
/// contiguous sequence `1..=N`, SQLite has exactly N `?`.
pub fn assert_placeholders(dialect: Dialect, sql: &str, param_count: usize) {
    match dialect {
        Dialect::Postgres => {
            let mut indices = Vec::new();
            let bytes = sql.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'$' {
                    let start = i + 1;
                    let mut end = start;
                    while end < bytes.len() && bytes[end].is_ascii_digit() {
                        end += 1;
                    }
                    if end > start {
                        indices.push(sql[start..end].parse::<usize>().unwrap());
                    }
                    i = end;
                } else {
                    i += 1;
                }
            }
            indices.sort_unstable();
            let expected: Vec<usize> = (1..=param_count).collect();
            assert_eq!(indices, expected, "placeholders in: {sql}");
        }
        Dialect::Sqlite => {
            let count = sql.matches('?').count();
            assert_eq!(count, param_count, "placeholders in: {sql}");
        }
    }
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), value.clone()))
        .collect()
}

/// Adapter returning canned rows and recording every statement it was handed.
pub struct StubAdapter {
    rows: Vec<Row>,
    pub captured: Mutex<Vec<(String, Vec<Value>)>>,
}

impl StubAdapter {
    pub fn new(rows: Vec<Row>) -> StubAdapter {
        StubAdapter {
            rows,
            captured: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Adapter for StubAdapter {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError> {
        self.captured
            .lock()
            .expect("capture lock")
            .push((sql.to_string(), params.to_vec()));
        Ok(self.rows.clone())
    }
}
