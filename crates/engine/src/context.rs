//! # Compilation context
//!
//! One context per statement. It owns the append-only parameter vector; every
//! push returns the matching placeholder, so placeholder indices and vector
//! positions cannot drift apart. It also tracks the table qualifiers in scope
//! (self-relations need a disambiguating alias) and the relation nesting
//! depth.

use sqlweave_values::values::Value;

use crate::dialect::Dialect;

/// Relation nesting limit before compilation fails with `DepthExceeded`.
/// Enforced while the query description is parsed.
pub const MAX_DEPTH: usize = 8;

pub struct CompileCtx {
    dialect: Dialect,
    params: Vec<Value>,
    /// First placeholder index minus one; non-zero when a batch rebases.
    offset: usize,
    scopes: Vec<String>,
}

impl CompileCtx {
    pub fn new(dialect: Dialect) -> CompileCtx {
        CompileCtx::with_offset(dialect, 0)
    }

    /// A context whose placeholders start at `offset + 1`, used by the batch
    /// combinator to keep indices globally unique across fused statements.
    pub fn with_offset(dialect: Dialect, offset: usize) -> CompileCtx {
        CompileCtx {
            dialect,
            params: Vec::new(),
            offset,
            scopes: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Appends a parameter and returns its placeholder.
    pub fn push(&mut self, value: Value) -> String {
        self.params.push(value);
        self.dialect
            .placeholder(self.offset + self.params.len())
            .into_owned()
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Enters a table scope and returns the qualifier to use for its columns:
    /// the table name itself, or an aliased form when an enclosing scope
    /// already uses that name (self-relations).
    pub fn push_scope(&mut self, table: &str) -> String {
        let shadowed = self.scopes.iter().filter(|s| shares_base(s, table)).count();
        let qualifier = if shadowed == 0 {
            table.to_string()
        } else {
            format!("{table}_{shadowed}")
        };
        self.scopes.push(qualifier.clone());
        qualifier
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }
}

fn shares_base(scope: &str, table: &str) -> bool {
    scope == table
        || scope
            .strip_prefix(table)
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|n| n.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_follow_the_arena() {
        let mut ctx = CompileCtx::new(Dialect::Postgres);
        assert_eq!(ctx.push(Value::Int64(1)), "$1");
        assert_eq!(ctx.push(Value::Int64(2)), "$2");
        assert_eq!(ctx.into_params().len(), 2);
    }

    #[test]
    fn offset_rebases_placeholder_indices() {
        let mut ctx = CompileCtx::with_offset(Dialect::Postgres, 4);
        assert_eq!(ctx.push(Value::Int64(1)), "$5");
    }

    #[test]
    fn self_relation_scopes_get_aliases() {
        let mut ctx = CompileCtx::new(Dialect::Postgres);
        assert_eq!(ctx.push_scope("employees"), "employees");
        assert_eq!(ctx.push_scope("tasks"), "tasks");
        assert_eq!(ctx.push_scope("employees"), "employees_1");
        ctx.pop_scope();
        ctx.pop_scope();
        assert_eq!(ctx.push_scope("employees"), "employees_1");
    }
}
