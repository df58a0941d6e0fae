//! # Result plan
//!
//! The structured description produced next to every compiled statement. The
//! shaper follows it to rebuild objects: which column aliases are scalars and
//! of what type, which hold JSON-embedded relations, which dotted aliases are
//! aggregates, and how to unwrap the row set.

use sqlweave_values::scalar::ScalarType;

/// How the shaper collapses the row set of a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unwrap {
    /// `findMany` / `groupBy`: every row, as an array.
    Array,
    /// `findFirst` / `findUnique`: the first row or `null`.
    FirstOrNull,
    /// `count`: the single aggregate cell as an integer.
    ScalarCount,
    /// `aggregate`: the single row folded into a nested object.
    SingleObject,
}

/// One scalar output column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedColumn {
    pub name: String,
    pub scalar: ScalarType,
    pub list: bool,
}

/// One JSON-embedded relation column.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedRelation {
    pub name: String,
    /// Array for to-many edges, object-or-null for to-one.
    pub array: bool,
    pub plan: ResultPlan,
}

/// One aggregate output, aliased with its dotted path (`_sum.position`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedAggregate {
    pub name: String,
    pub scalar: ScalarType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResultPlan {
    pub unwrap: Unwrap,
    pub columns: Vec<PlannedColumn>,
    pub relations: Vec<PlannedRelation>,
    /// Relation names selected through `_count`; their columns are aliased
    /// `"_count.<name>"`.
    pub relation_counts: Vec<String>,
    pub aggregates: Vec<PlannedAggregate>,
    /// Grouping key names, in `by` order (groupBy only).
    pub group_keys: Vec<String>,
}

impl ResultPlan {
    pub fn new(unwrap: Unwrap) -> ResultPlan {
        ResultPlan {
            unwrap,
            columns: Vec::new(),
            relations: Vec::new(),
            relation_counts: Vec::new(),
            aggregates: Vec::new(),
            group_keys: Vec::new(),
        }
    }
}
