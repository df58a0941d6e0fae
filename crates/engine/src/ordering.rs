//! # Ordering, cursor continuation
//!
//! Multi-key `ORDER BY` rendering plus the cursor translation: the cursor row
//! becomes a seek comparison over its keys (inclusive on the last key, `>=`
//! ascending / `<=` descending) and one extra row of `OFFSET` so the cursor
//! row itself is excluded.

use sqlweave_schema::catalog::Model;
use sqlweave_values::values::Value;

use crate::ast::{Direction, OrderSpec};
use crate::context::CompileCtx;
use crate::dialect::Dialect;
use crate::error::Result;

/// Ordered `(expression, direction)` pairs for the given specs.
pub fn order_exprs(
    model: &Model,
    specs: &[OrderSpec],
    qualifier: &str,
    dialect: Dialect,
) -> Vec<(String, Direction)> {
    specs
        .iter()
        .map(|spec| {
            let column = &model.fields[spec.field].column;
            (dialect.column(qualifier, column), spec.direction)
        })
        .collect()
}

/// Renders `ORDER BY ...`, or an empty string for no specs.
pub fn order_clause(model: &Model, specs: &[OrderSpec], qualifier: &str, dialect: Dialect) -> String {
    if specs.is_empty() {
        return String::new();
    }
    let body = order_exprs(model, specs, qualifier, dialect)
        .into_iter()
        .map(|(expr, dir)| format!("{expr} {}", dir.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" ORDER BY {body}")
}

/// Deterministic fallback ordering: primary key ascending.
pub fn default_order(model: &Model) -> Vec<OrderSpec> {
    model
        .primary_key
        .iter()
        .map(|&field| OrderSpec {
            field,
            direction: Direction::Asc,
        })
        .collect()
}

/// Compiles the cursor into a seek comparison over its ordered key set.
///
/// A single-field cursor is the plain inclusive bound. A cursor spanning
/// several `orderBy` keys expands lexicographically: each disjunct holds the
/// leading keys by equality and compares the next key strictly, with the last
/// key inclusive, so `{status: 'B', id: 5}` under `status asc, id asc`
/// becomes `(status > 'B' OR (status = 'B' AND id >= 5))`. The comparison
/// direction of every key follows its `orderBy` entry; parsing has already
/// guaranteed one exists.
pub fn cursor_condition(
    model: &Model,
    cursor: &[(usize, Value)],
    order_by: &[OrderSpec],
    qualifier: &str,
    ctx: &mut CompileCtx,
) -> Result<String> {
    let dialect = ctx.dialect();
    let position = |field: usize| {
        order_by
            .iter()
            .position(|spec| spec.field == field)
            .unwrap_or(usize::MAX)
    };
    let direction = |field: usize| {
        order_by
            .iter()
            .find(|spec| spec.field == field)
            .map_or(Direction::Asc, |spec| spec.direction)
    };

    // Seek keys compare in orderBy order regardless of cursor document order.
    let mut entries: Vec<(usize, Value)> = cursor.to_vec();
    entries.sort_by_key(|(field, _)| position(*field));

    let mut disjuncts = Vec::new();
    for (i, (field_idx, value)) in entries.iter().enumerate() {
        let mut parts = Vec::new();
        for (prev_idx, prev_value) in &entries[..i] {
            let column = dialect.column(qualifier, &model.fields[*prev_idx].column);
            let placeholder = ctx.push(prev_value.clone());
            parts.push(format!("{column} = {placeholder}"));
        }
        let inclusive = i + 1 == entries.len();
        let op = match (direction(*field_idx), inclusive) {
            (Direction::Asc, true) => ">=",
            (Direction::Asc, false) => ">",
            (Direction::Desc, true) => "<=",
            (Direction::Desc, false) => "<",
        };
        let column = dialect.column(qualifier, &model.fields[*field_idx].column);
        let placeholder = ctx.push(value.clone());
        parts.push(format!("{column} {op} {placeholder}"));
        disjuncts.push(if parts.len() == 1 {
            parts.into_iter().next().expect("one part")
        } else {
            format!("({})", parts.join(" AND "))
        });
    }
    Ok(if disjuncts.len() == 1 {
        disjuncts.into_iter().next().expect("one part")
    } else {
        format!("({})", disjuncts.join(" OR "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlweave_schema::catalog::Catalog;
    use sqlweave_schema::document::CatalogDocument;

    fn model() -> Model {
        let doc: CatalogDocument = serde_json::from_value(serde_json::json!({
            "models": [{
                "name": "Task",
                "table": "tasks",
                "fields": [
                    {"name": "id", "type": "Int"},
                    {"name": "dueAt", "column": "due_at", "type": "DateTime", "nullable": true}
                ],
                "primaryKey": ["id"]
            }]
        }))
        .unwrap();
        Catalog::from_document(&doc).unwrap().model_at(0).clone()
    }

    #[test]
    fn multi_key_order_renders_in_sequence() {
        let model = model();
        let specs = vec![
            OrderSpec { field: 1, direction: Direction::Desc },
            OrderSpec { field: 0, direction: Direction::Asc },
        ];
        assert_eq!(
            order_clause(&model, &specs, "tasks", Dialect::Postgres),
            " ORDER BY \"tasks\".\"due_at\" DESC, \"tasks\".\"id\" ASC"
        );
    }

    #[test]
    fn cursor_direction_follows_order_by() {
        let model = model();
        let order = vec![OrderSpec { field: 0, direction: Direction::Desc }];
        let mut ctx = CompileCtx::new(Dialect::Postgres);
        let cond = cursor_condition(&model, &[(0, Value::Int64(10))], &order, "tasks", &mut ctx)
            .unwrap();
        assert_eq!(cond, "\"tasks\".\"id\" <= $1");
        assert_eq!(ctx.into_params(), vec![Value::Int64(10)]);
    }

    #[test]
    fn multi_field_cursor_expands_lexicographically() {
        let model = model();
        let order = vec![
            OrderSpec { field: 1, direction: Direction::Desc },
            OrderSpec { field: 0, direction: Direction::Asc },
        ];
        // Cursor document order differs from orderBy order on purpose.
        let cursor = vec![
            (0, Value::Int64(5)),
            (1, Value::String("2024-03-01 10:30:00".into())),
        ];
        let mut ctx = CompileCtx::new(Dialect::Postgres);
        let cond = cursor_condition(&model, &cursor, &order, "tasks", &mut ctx).unwrap();
        assert_eq!(
            cond,
            "(\"tasks\".\"due_at\" < $1 OR (\"tasks\".\"due_at\" = $2 AND \"tasks\".\"id\" >= $3))"
        );
        assert_eq!(
            ctx.into_params(),
            vec![
                Value::String("2024-03-01 10:30:00".into()),
                Value::String("2024-03-01 10:30:00".into()),
                Value::Int64(5),
            ]
        );
    }
}
