//! # Dialect layer
//!
//! Everything that differs between the two backends lives here: identifier
//! quoting, placeholder style, case-insensitive text matching, JSON
//! aggregation primitives, and boolean literals. The rest of the compiler is
//! dialect-blind.

use std::borrow::Cow;

use sqlweave_schema::catalog::Model;

/// Target SQL dialect. Per-engine state, never global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Renders the placeholder for the 1-based parameter `index`.
    ///
    /// PostgreSQL placeholders are numbered (`$1`, `$2`, ...); SQLite
    /// placeholders are positional (`?`).
    pub fn placeholder(self, index: usize) -> Cow<'static, str> {
        match self {
            Dialect::Postgres => Cow::Owned(format!("${index}")),
            Dialect::Sqlite => Cow::Borrowed("?"),
        }
    }

    /// Double-quotes an identifier, doubling any embedded quote.
    pub fn quote(self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Qualified table reference: schema-prefixed on PostgreSQL when the model
    /// declares a schema, bare elsewhere.
    pub fn table_ref(self, model: &Model) -> String {
        match (self, &model.schema) {
            (Dialect::Postgres, Some(schema)) => {
                format!("{}.{}", self.quote(schema), self.quote(&model.table))
            }
            _ => self.quote(&model.table),
        }
    }

    /// A qualified column reference, `"qualifier"."column"`.
    pub fn column(self, qualifier: &str, column: &str) -> String {
        format!("{}.{}", self.quote(qualifier), self.quote(column))
    }

    /// FROM-clause item for a model under the given qualifier. Plain table
    /// reference when the qualifier is the table name; aliased when a scope
    /// collision forced a rename.
    pub fn from_item(self, model: &Model, qualifier: &str) -> String {
        let table = self.table_ref(model);
        if qualifier == model.table {
            table
        } else {
            format!("{table} AS {}", self.quote(qualifier))
        }
    }

    pub fn bool_literal(self, value: bool) -> &'static str {
        match (self, value) {
            (Dialect::Postgres, true) => "TRUE",
            (Dialect::Postgres, false) => "FALSE",
            (Dialect::Sqlite, true) => "1",
            (Dialect::Sqlite, false) => "0",
        }
    }

    /// Text-match predicate over an already-parameterized pattern.
    ///
    /// Insensitive matching uses `ILIKE` on PostgreSQL and lowercases both
    /// sides on SQLite; the SQLite form folds ASCII only. Patterns are
    /// backslash-escaped by the caller, hence the explicit `ESCAPE`.
    pub fn like(self, expr: &str, placeholder: &str, insensitive: bool) -> String {
        match (self, insensitive) {
            (Dialect::Postgres, true) => format!("{expr} ILIKE {placeholder} ESCAPE '\\'"),
            (Dialect::Sqlite, true) => {
                format!("LOWER({expr}) LIKE LOWER({placeholder}) ESCAPE '\\'")
            }
            (_, false) => format!("{expr} LIKE {placeholder} ESCAPE '\\'"),
        }
    }

    /// Casts an expression to text, used to carry decimals through JSON
    /// losslessly.
    pub fn cast_text(self, expr: &str) -> String {
        match self {
            Dialect::Postgres => format!("{expr}::TEXT"),
            Dialect::Sqlite => format!("CAST({expr} AS TEXT)"),
        }
    }

    /// Builds a JSON object from `('key', value-expression)` pairs.
    pub fn json_object(self, pairs: &[(String, String)]) -> String {
        let body = pairs
            .iter()
            .map(|(key, value)| format!("{}, {}", quote_string(key), value))
            .collect::<Vec<_>>()
            .join(", ");
        match self {
            Dialect::Postgres => format!("JSON_BUILD_OBJECT({body})"),
            Dialect::Sqlite => format!("JSON_OBJECT({body})"),
        }
    }

    /// Aggregates a per-row JSON expression into a JSON array, empty-array on
    /// no rows. `order_by` re-orders inside the aggregate (PostgreSQL only;
    /// SQLite relies on the feeding subquery's order).
    pub fn json_agg(self, expr: &str, order_by: Option<&str>) -> String {
        match self {
            Dialect::Postgres => {
                let order = order_by
                    .map(|o| format!(" ORDER BY {o}"))
                    .unwrap_or_default();
                format!("COALESCE(JSON_AGG({expr}{order}), '[]')")
            }
            Dialect::Sqlite => format!("COALESCE(JSON_GROUP_ARRAY(JSON({expr})), '[]')"),
        }
    }

    /// Wraps a subquery producing JSON text so it embeds as structured JSON
    /// rather than a quoted string. A no-op on PostgreSQL, whose JSON builders
    /// already return `json`.
    pub fn json_embed(self, expr: &str) -> String {
        match self {
            Dialect::Postgres => expr.to_string(),
            Dialect::Sqlite => format!("JSON({expr})"),
        }
    }

    /// `LIMIT`/`OFFSET` clause. SQLite cannot express a bare `OFFSET`, so an
    /// unbounded limit is spelled `LIMIT -1`.
    pub fn limit_clause(self, take: Option<u64>, skip: u64) -> String {
        let mut clause = String::new();
        match (take, skip) {
            (Some(take), 0) => clause.push_str(&format!(" LIMIT {take}")),
            (Some(take), skip) => clause.push_str(&format!(" LIMIT {take} OFFSET {skip}")),
            (None, 0) => {}
            (None, skip) => match self {
                Dialect::Postgres => clause.push_str(&format!(" OFFSET {skip}")),
                Dialect::Sqlite => clause.push_str(&format!(" LIMIT -1 OFFSET {skip}")),
            },
        }
        clause
    }
}

/// Single-quoted SQL string literal.
fn quote_string(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_per_dialect() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
    }

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(Dialect::Postgres.quote(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn insensitive_like_forms() {
        assert_eq!(
            Dialect::Postgres.like("\"u\".\"name\"", "$1", true),
            "\"u\".\"name\" ILIKE $1 ESCAPE '\\'"
        );
        assert_eq!(
            Dialect::Sqlite.like("\"u\".\"name\"", "?", true),
            "LOWER(\"u\".\"name\") LIKE LOWER(?) ESCAPE '\\'"
        );
    }

    #[test]
    fn sqlite_offset_without_limit() {
        assert_eq!(Dialect::Sqlite.limit_clause(None, 4), " LIMIT -1 OFFSET 4");
        assert_eq!(Dialect::Postgres.limit_clause(None, 4), " OFFSET 4");
        assert_eq!(Dialect::Postgres.limit_clause(Some(5), 2), " LIMIT 5 OFFSET 2");
    }
}
